//! Page retrieval with retry, backoff and a rendered fallback.
//!
//! # Architecture
//!
//! - [`PageFetch`]: core trait, "give me the HTML for this URL"
//! - [`HttpFetch`]: plain HTTP GET through `reqwest`
//! - [`NoRender`]: placeholder when no rendering backend is available
//! - [`Fetcher`]: drives a plain fetcher and an optional rendering fetcher
//!   through the retry ladder
//!
//! # Retry Ladder
//!
//! - HTTP 403 means plain requests are being blocked. When a rendering
//!   fetcher is configured the next attempt goes through it immediately
//!   instead of repeating the same request. That rendered attempt is made
//!   even when the 403 used up the last attempt.
//! - Any other failure (404, 5xx, timeout, transport) waits
//!   `attempt × base_delay` plus a random jitter and tries again.
//! - After `max_attempts` the last error is wrapped in
//!   [`FetchError::Exhausted`].

use crate::config::FetchConfig;
use crate::error::FetchError;
use rand::{Rng, rng};
use reqwest::{Client, ClientBuilder, StatusCode, header};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Something that can turn a URL into page HTML.
#[allow(async_fn_in_trait)]
pub trait PageFetch {
    /// Short label for logs.
    fn mode(&self) -> &'static str;

    /// Retrieve the full body of `url`.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Plain HTTP fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetch {
    client: Client,
}

impl HttpFetch {
    /// Build a client with the configured timeout and a user agent picked at
    /// random from the configured pool.
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        Self::from_builder(config, Client::builder())
    }

    /// Same as [`HttpFetch::new`], starting from a caller-supplied builder.
    fn from_builder(config: &FetchConfig, builder: ClientBuilder) -> Result<Self, FetchError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT_LANGUAGE,
            header::HeaderValue::from_static("es-ES,es;q=0.9,en-US;q=0.8,en;q=0.7"),
        );
        let mut builder = builder
            .timeout(config.timeout())
            .default_headers(headers);
        if !config.user_agents.is_empty() {
            let pick = rng().random_range(0..config.user_agents.len());
            builder = builder.user_agent(config.user_agents[pick].clone());
        }
        Ok(HttpFetch {
            client: builder.build().map_err(FetchError::Transport)?,
        })
    }
}

impl PageFetch for HttpFetch {
    fn mode(&self) -> &'static str {
        "plain"
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(FetchError::Blocked);
        }
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        Ok(response.text().await?)
    }
}

/// Stand-in rendering fetcher for builds without a browser backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRender;

impl PageFetch for NoRender {
    fn mode(&self) -> &'static str {
        "none"
    }

    async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
        Err(FetchError::Render("no rendering backend configured".to_string()))
    }
}

/// Plain fetcher plus optional rendering fallback, with retries.
pub struct Fetcher<P, R = NoRender> {
    plain: P,
    rendered: Option<R>,
    max_attempts: usize,
    base_delay: Duration,
    jitter_ms: u64,
}

impl<P, R> fmt::Debug for Fetcher<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("rendered", &self.rendered.is_some())
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("jitter_ms", &self.jitter_ms)
            .finish()
    }
}

impl<P, R> Fetcher<P, R>
where
    P: PageFetch,
    R: PageFetch,
{
    pub fn new(plain: P, rendered: Option<R>, config: &FetchConfig) -> Self {
        Fetcher {
            plain,
            rendered,
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            jitter_ms: config.jitter_ms,
        }
    }

    /// Delay before the attempt following failed attempt number `attempt`.
    fn backoff(&self, attempt: usize) -> Duration {
        let jitter = if self.jitter_ms > 0 {
            rng().random_range(0..=self.jitter_ms)
        } else {
            0
        };
        self.base_delay.saturating_mul(attempt as u32) + Duration::from_millis(jitter)
    }

    /// Fetch `url`, walking the retry ladder.
    #[instrument(level = "info", skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;
        let mut escalated = false;

        loop {
            attempt += 1;
            let attempt_t0 = Instant::now();
            let (mode, result) = match (&self.rendered, escalated) {
                (Some(rendered), true) => (rendered.mode(), rendered.fetch(url).await),
                _ => (self.plain.mode(), self.plain.fetch(url).await),
            };

            let e = match result {
                Ok(body) => {
                    info!(
                        attempt,
                        mode,
                        bytes = body.len(),
                        elapsed_ms_total = total_t0.elapsed().as_millis(),
                        "Fetched page"
                    );
                    return Ok(body);
                }
                Err(e) => e,
            };

            if e.is_blocked() && !escalated && self.rendered.is_some() {
                warn!(attempt, "Plain request blocked; escalating to rendered fetch");
                escalated = true;
                continue;
            }

            if attempt >= self.max_attempts {
                error!(
                    attempt,
                    max = self.max_attempts,
                    mode,
                    elapsed_ms_total = total_t0.elapsed().as_millis(),
                    error = %e,
                    "fetch exhausted retries"
                );
                return Err(FetchError::Exhausted {
                    attempts: attempt,
                    last: Box::new(e),
                });
            }

            let delay = self.backoff(attempt);
            warn!(
                attempt,
                max = self.max_attempts,
                mode,
                elapsed_ms_attempt = attempt_t0.elapsed().as_millis(),
                ?delay,
                error = %e,
                "fetch attempt failed; backing off"
            );
            sleep(delay).await;
            debug!(attempt = attempt + 1, "Retrying fetch");
        }
    }
}

/// In-memory fetchers for tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays canned results in order; errors once the script runs out.
    pub(crate) struct Scripted {
        label: &'static str,
        script: Mutex<VecDeque<Result<String, FetchError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        pub(crate) fn new(label: &'static str, script: Vec<Result<String, FetchError>>) -> Self {
            Scripted {
                label,
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PageFetch for &Scripted {
        fn mode(&self) -> &'static str {
            self.label
        }

        async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(FetchError::Timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::Scripted;
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(max_attempts: usize) -> FetchConfig {
        FetchConfig {
            max_attempts,
            base_delay_ms: 0,
            jitter_ms: 0,
            ..FetchConfig::default()
        }
    }

    #[tokio::test]
    async fn test_forbidden_escalates_to_rendered_fetch() {
        let plain = Scripted::new("plain", vec![Err(FetchError::Blocked)]);
        let rendered = Scripted::new("rendered", vec![Ok("<html>ok</html>".to_string())]);
        let fetcher = Fetcher::new(&plain, Some(&rendered), &config(3));

        let body = fetcher.fetch("https://federation.example/").await.unwrap();
        assert_eq!(body, "<html>ok</html>");
        assert_eq!(plain.calls(), 1);
        assert_eq!(rendered.calls(), 1);
    }

    #[tokio::test]
    async fn test_forbidden_without_renderer_retries_plain() {
        let plain = Scripted::new(
            "plain",
            vec![Err(FetchError::Blocked), Err(FetchError::Blocked), Err(FetchError::Blocked)],
        );
        let fetcher: Fetcher<&Scripted> = Fetcher::new(&plain, None, &config(3));

        let err = fetcher.fetch("https://federation.example/").await.unwrap_err();
        match err {
            FetchError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(last.is_blocked());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(plain.calls(), 3);
    }

    #[tokio::test]
    async fn test_not_found_and_server_errors_are_retried() {
        let plain = Scripted::new(
            "plain",
            vec![
                Err(FetchError::Status(StatusCode::NOT_FOUND)),
                Err(FetchError::Status(StatusCode::SERVICE_UNAVAILABLE)),
                Ok("body".to_string()),
            ],
        );
        let fetcher: Fetcher<&Scripted> = Fetcher::new(&plain, None, &config(3));
        assert_eq!(fetcher.fetch("u").await.unwrap(), "body");
        assert_eq!(plain.calls(), 3);
    }

    #[tokio::test]
    async fn test_rendered_failures_exhaust_with_last_error() {
        let plain = Scripted::new("plain", vec![Err(FetchError::Blocked)]);
        let rendered = Scripted::new(
            "rendered",
            vec![
                Err(FetchError::Render("session".to_string())),
                Err(FetchError::Render("navigation".to_string())),
            ],
        );
        let fetcher = Fetcher::new(&plain, Some(&rendered), &config(3));

        let err = fetcher.fetch("u").await.unwrap_err();
        match err {
            FetchError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(last.to_string(), "rendered fetch failed: navigation");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(plain.calls(), 1);
        assert_eq!(rendered.calls(), 2);
    }

    #[tokio::test]
    async fn test_single_attempt_budget() {
        let plain = Scripted::new("plain", vec![Err(FetchError::Timeout)]);
        let fetcher: Fetcher<&Scripted> = Fetcher::new(&plain, None, &config(0));
        let err = fetcher.fetch("u").await.unwrap_err();
        assert!(matches!(err, FetchError::Exhausted { attempts: 1, .. }));
    }

    #[test]
    fn test_backoff_is_linear_in_attempts() {
        let plain = Scripted::new("plain", vec![]);
        let cfg = FetchConfig {
            base_delay_ms: 500,
            jitter_ms: 0,
            ..FetchConfig::default()
        };
        let fetcher: Fetcher<&Scripted> = Fetcher::new(&plain, None, &cfg);
        assert_eq!(fetcher.backoff(1), Duration::from_millis(500));
        assert_eq!(fetcher.backoff(3), Duration::from_millis(1500));
    }

    #[test]
    fn test_backoff_jitter_is_bounded() {
        let plain = Scripted::new("plain", vec![]);
        let cfg = FetchConfig {
            base_delay_ms: 100,
            jitter_ms: 50,
            ..FetchConfig::default()
        };
        let fetcher: Fetcher<&Scripted> = Fetcher::new(&plain, None, &cfg);
        for _ in 0..20 {
            let d = fetcher.backoff(2);
            assert!(d >= Duration::from_millis(200) && d <= Duration::from_millis(250));
        }
    }

    #[tokio::test]
    async fn test_blocked_on_last_attempt_still_tries_renderer() {
        let plain = Scripted::new("plain", vec![Err(FetchError::Blocked)]);
        let rendered = Scripted::new("rendered", vec![Ok("<html>ok</html>".to_string())]);
        let fetcher = Fetcher::new(&plain, Some(&rendered), &config(1));

        let body = fetcher.fetch("u").await.unwrap();
        assert_eq!(body, "<html>ok</html>");
        assert_eq!(plain.calls(), 1);
        assert_eq!(rendered.calls(), 1);
    }

    #[tokio::test]
    async fn test_blocked_on_last_attempt_exhausts_with_render_error() {
        let plain = Scripted::new("plain", vec![Err(FetchError::Blocked)]);
        let failure = FetchError::Render("session".to_string());
        let rendered = Scripted::new("rendered", vec![Err(failure)]);
        let fetcher = Fetcher::new(&plain, Some(&rendered), &config(1));

        match fetcher.fetch("u").await.unwrap_err() {
            FetchError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, FetchError::Render(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    /// Serves canned responses keyed by request path on a loopback port.
    async fn serve_canned() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let mut read = 0;
                    while read < buf.len() {
                        let n = socket.read(&mut buf[read..]).await.unwrap_or(0);
                        if n == 0 {
                            break;
                        }
                        read += n;
                        if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                    let request = String::from_utf8_lossy(&buf[..read]).to_string();
                    let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let (status, body) = match path.as_str() {
                        "/ok" => ("200 OK", "<html>ok</html>"),
                        "/forbidden" => ("403 Forbidden", "blocked"),
                        "/missing" => ("404 Not Found", "missing"),
                        "/slow" => {
                            sleep(Duration::from_secs(10)).await;
                            ("200 OK", "late")
                        }
                        _ => ("503 Service Unavailable", "down"),
                    };
                    let response = format!(
                        "HTTP/1.1 {status}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{addr}")
    }

    fn local_client(timeout_secs: u64) -> HttpFetch {
        let cfg = FetchConfig {
            timeout_secs,
            ..FetchConfig::default()
        };
        HttpFetch::from_builder(&cfg, Client::builder().no_proxy()).unwrap()
    }

    #[tokio::test]
    async fn test_http_responses_are_classified() {
        let base = serve_canned().await;
        let http = local_client(5);

        assert_eq!(http.fetch(&format!("{base}/ok")).await.unwrap(), "<html>ok</html>");
        assert!(matches!(
            http.fetch(&format!("{base}/forbidden")).await,
            Err(FetchError::Blocked)
        ));
        assert!(matches!(
            http.fetch(&format!("{base}/missing")).await,
            Err(FetchError::Status(StatusCode::NOT_FOUND))
        ));
        assert!(matches!(
            http.fetch(&format!("{base}/unavailable")).await,
            Err(FetchError::Status(StatusCode::SERVICE_UNAVAILABLE))
        ));
    }

    #[tokio::test]
    async fn test_http_slow_response_times_out() {
        let base = serve_canned().await;
        let http = local_client(1);
        let t0 = Instant::now();
        assert!(matches!(http.fetch(&format!("{base}/slow")).await, Err(FetchError::Timeout)));
        assert!(t0.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_http_refused_connection_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let http = local_client(5);
        assert!(matches!(
            http.fetch(&format!("http://{addr}/")).await,
            Err(FetchError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_no_render_always_fails() {
        assert!(matches!(NoRender.fetch("u").await, Err(FetchError::Render(_))));
    }
}
