//! Browser-rendered page fetch through a WebDriver server.
//!
//! Only compiled with the `render` feature. Requires a running driver, e.g.
//! `chromedriver --port=9515`, whose URL goes in `fetch.webdriver_url`.
//!
//! Each fetch opens one browser session, loads the page, waits for the
//! fixture table to appear, and returns the rendered source. The session is
//! quit on every exit path, including failures and timeouts.

use crate::error::FetchError;
use crate::fetch::PageFetch;
use serde_json::json;
use std::time::Duration;
use thirtyfour::prelude::*;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

/// Polls for the wait selector before giving up and taking the source as is.
const WAIT_POLLS: usize = 40;
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Run `fut` for at most `limit`.
async fn within<F: Future>(limit: Duration, fut: F) -> Result<F::Output, FetchError> {
    timeout(limit, fut).await.map_err(|_| FetchError::Timeout)
}

#[derive(Debug, Clone)]
pub struct WebDriverFetch {
    server_url: String,
    wait_selector: String,
    timeout: Duration,
}

impl WebDriverFetch {
    pub fn new(
        server_url: impl Into<String>,
        wait_selector: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        WebDriverFetch {
            server_url: server_url.into(),
            wait_selector: wait_selector.into(),
            timeout,
        }
    }

    async fn start_driver(&self) -> Result<WebDriver, FetchError> {
        let mut caps = DesiredCapabilities::chrome();
        let chrome_options = json!({
            "args": [
                "--headless",
                "--disable-gpu",
                "--no-sandbox",
                "--disable-dev-shm-usage",
                "--disable-blink-features=AutomationControlled",
                "--lang=es-ES"
            ]
        });
        caps.insert("goog:chromeOptions".to_string(), chrome_options);
        WebDriver::new(self.server_url.as_str(), caps)
            .await
            .map_err(|e| FetchError::Render(format!("session: {e}")))
    }

    async fn render(&self, driver: &WebDriver, url: &str) -> Result<String, FetchError> {
        driver
            .goto(url)
            .await
            .map_err(|e| FetchError::Render(format!("navigation: {e}")))?;

        let mut found = false;
        for poll in 0..WAIT_POLLS {
            match driver.find_all(By::Css(self.wait_selector.as_str())).await {
                Ok(elements) if !elements.is_empty() => {
                    debug!(poll, count = elements.len(), "Fixture table rendered");
                    found = true;
                    break;
                }
                _ => sleep(WAIT_POLL_INTERVAL).await,
            }
        }
        if !found {
            warn!(selector = %self.wait_selector, "Table never appeared; using page source as is");
        }

        driver
            .source()
            .await
            .map_err(|e| FetchError::Render(format!("page source: {e}")))
    }
}

impl PageFetch for WebDriverFetch {
    fn mode(&self) -> &'static str {
        "rendered"
    }

    #[instrument(level = "info", skip(self), fields(server = %self.server_url))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let driver = within(self.timeout, self.start_driver()).await??;
        let result = within(self.timeout, self.render(&driver, url)).await.and_then(|r| r);
        match within(self.timeout, driver.quit()).await {
            Ok(Ok(())) => info!("Browser session closed"),
            Ok(Err(e)) => warn!(error = %e, "Failed to quit browser session"),
            Err(_) => warn!(
                limit = ?self.timeout,
                "Browser session did not quit in time; abandoning it"
            ),
        }
        result
    }
}
