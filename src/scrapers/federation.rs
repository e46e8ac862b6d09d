//! Federation calendar/results table parser.
//!
//! The federation page groups matches into sections: a header element naming
//! the category, followed by a table whose rows are the matches. The parser
//! walks headers and rows together in document order, so each row is
//! attributed to the most recent header above it.
//!
//! Two column layouts are supported (see [`TableLayout`]):
//!
//! | Layout | Teams | Scores | Schedule | Venue |
//! |--------|-------|--------|----------|-------|
//! | calendar | `td[0]`, `td[3]` | `td[1]`, `td[2]` | `td[4]` | `td[5]` |
//! | results | `td[0]` (one per line) | `td[1]` as `85 - 78` | `td[2]` | `td[3]` |
//!
//! Date/time cells hold the date on the first line and an optional time on
//! the second, separated by `<br>`.

use crate::config::TableConfig;
use crate::error::{ConfigError, ParseRowError};
use crate::models::{DATE_FORMAT, FixtureRow};
use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("static selector"));
static HEADING: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("h1, .titulo_seccion h2, .titulo_seccion h1").expect("static selector")
});
static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}/\d{2}/\d{4}$").expect("static regex"));
static TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,2}):(\d{2})").expect("static regex"));
static SCORE_PAIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*[-–]\s*(\d+)").expect("static regex"));
static LEADING_INT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+").expect("static regex"));

/// Marker the federation uses for the team resting in a bye week.
const BYE_MARKER: &str = "descansa";

/// Where the team names live in a row.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamColumns {
    /// One cell per team.
    Split { home: usize, away: usize },
    /// Both teams in one cell, home first, separated by a line break.
    Stacked { cell: usize },
}

/// Where the scores live in a row.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreColumns {
    /// One numeric cell per team.
    Split { home: usize, away: usize },
    /// A single cell holding `home - away`.
    Combined { cell: usize },
}

/// Column map for a results/schedule table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TableLayout {
    pub teams: TeamColumns,
    pub scores: ScoreColumns,
    /// Cell with the date and optional time.
    pub schedule: usize,
    #[serde(default)]
    pub venue: Option<usize>,
}

impl TableLayout {
    /// Rows with fewer cells than this are skipped.
    pub fn min_columns(&self) -> usize {
        let teams = match self.teams {
            TeamColumns::Split { home, away } => home.max(away),
            TeamColumns::Stacked { cell } => cell,
        };
        let scores = match self.scores {
            ScoreColumns::Split { home, away } => home.max(away),
            ScoreColumns::Combined { cell } => cell,
        };
        [teams, scores, self.schedule, self.venue.unwrap_or(0)]
            .into_iter()
            .max()
            .unwrap_or(0)
            + 1
    }
}

/// Result of parsing one page.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    /// Rows in document order, unfiltered and not deduplicated.
    pub rows: Vec<FixtureRow>,
    /// Rows dropped, with the reason.
    pub skipped: Vec<ParseRowError>,
    /// The page's main heading, if any.
    pub heading: Option<String>,
}

/// Accumulator threaded through the document-order scan.
#[derive(Default)]
struct ScanState {
    section: Option<String>,
    rows: Vec<FixtureRow>,
    skipped: Vec<ParseRowError>,
}

pub struct FixtureParser {
    header: Selector,
    header_or_row: Selector,
    layout: TableLayout,
    competition: Option<String>,
    fallback_competition: Option<String>,
}

fn parse_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::Selector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

impl FixtureParser {
    pub fn new(table: &TableConfig) -> Result<Self, ConfigError> {
        let header = parse_selector(&table.header_selector)?;
        parse_selector(&table.row_selector)?;
        let header_or_row =
            parse_selector(&format!("{}, {}", table.header_selector, table.row_selector))?;
        Ok(FixtureParser {
            header,
            header_or_row,
            layout: table.layout.resolve(),
            competition: None,
            fallback_competition: None,
        })
    }

    /// Competition label that takes precedence over the page heading.
    pub fn with_competition(mut self, competition: Option<String>) -> Self {
        self.competition = competition;
        self
    }

    /// Competition label used when neither the config nor the page has one.
    pub fn with_fallback_competition(mut self, competition: Option<String>) -> Self {
        self.fallback_competition = competition;
        self
    }

    /// Parse every match row in `html`.
    ///
    /// Never fails as a whole: malformed rows are skipped independently and
    /// reported in [`ParseOutcome::skipped`].
    #[instrument(level = "info", skip_all, fields(bytes = html.len()))]
    pub fn parse(&self, html: &str) -> ParseOutcome {
        let document = Html::parse_document(html);
        let heading = document
            .select(&HEADING)
            .map(|h| collapse_ws(&h.text().collect::<String>()))
            .find(|h| !h.is_empty());
        let competition = self
            .competition
            .clone()
            .or_else(|| heading.clone())
            .or_else(|| self.fallback_competition.clone());

        let state = document
            .select(&self.header_or_row)
            .fold(ScanState::default(), |mut state, element| {
                if self.header.matches(&element) {
                    let title = collapse_ws(&element.text().collect::<String>());
                    debug!(section = %title, "Entering section");
                    state.section = Some(title);
                    return state;
                }
                let category = state.section.as_deref().unwrap_or_default();
                match self.parse_row(element, category, competition.as_deref()) {
                    Ok(row) => state.rows.push(row),
                    Err(e) => {
                        match &e {
                            ParseRowError::TooFewColumns { .. } | ParseRowError::Bye => {
                                debug!(%category, reason = %e, "Skipping row")
                            }
                            _ => warn!(%category, reason = %e, "Skipping malformed row"),
                        }
                        state.skipped.push(e);
                    }
                }
                state
            });

        info!(
            rows = state.rows.len(),
            skipped = state.skipped.len(),
            competition = competition.as_deref().unwrap_or(""),
            "Parsed fixture tables"
        );
        ParseOutcome {
            rows: state.rows,
            skipped: state.skipped,
            heading,
        }
    }

    /// Extract one match from a table row.
    pub fn parse_row(
        &self,
        row: ElementRef,
        category: &str,
        competition: Option<&str>,
    ) -> Result<FixtureRow, ParseRowError> {
        let cells: Vec<ElementRef> = row.select(&CELL).collect();
        let required = self.layout.min_columns();
        if cells.len() < required {
            return Err(ParseRowError::TooFewColumns {
                found: cells.len(),
                required,
            });
        }

        let (home_team, away_team) = match self.layout.teams {
            TeamColumns::Split { home, away } => (cell_text(cells[home]), cell_text(cells[away])),
            TeamColumns::Stacked { cell } => {
                let mut lines = cell_lines(cells[cell]).into_iter();
                (lines.next().unwrap_or_default(), lines.next().unwrap_or_default())
            }
        };
        if home_team.is_empty() || away_team.is_empty() {
            return Err(ParseRowError::MissingTeam);
        }
        if is_bye(&home_team) || is_bye(&away_team) {
            return Err(ParseRowError::Bye);
        }

        let (home_score, away_score) = match self.layout.scores {
            ScoreColumns::Split { home, away } => (
                parse_score(&cell_text(cells[home])),
                parse_score(&cell_text(cells[away])),
            ),
            ScoreColumns::Combined { cell } => parse_score_pair(&cell_text(cells[cell])),
        };

        let (date, time) = parse_schedule(&cell_lines(cells[self.layout.schedule]))?;
        let venue = self
            .layout
            .venue
            .and_then(|v| cells.get(v))
            .map(|c| cell_text(*c))
            .unwrap_or_default();

        Ok(FixtureRow {
            category: category.to_string(),
            competition: competition.map(str::to_string),
            home_team,
            away_team,
            date,
            time,
            venue,
            home_score,
            away_score,
        })
    }
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_line(s: &str) -> String {
    collapse_ws(&s.replace('"', ""))
}

fn cell_text(cell: ElementRef) -> String {
    clean_line(&cell.text().collect::<String>())
}

/// Split a cell's text on `<br>` elements, dropping empty lines.
fn cell_lines(cell: ElementRef) -> Vec<String> {
    let mut lines = vec![String::new()];
    for node in cell.descendants() {
        match node.value() {
            Node::Text(text) => {
                if let Some(line) = lines.last_mut() {
                    line.push_str(text);
                }
            }
            Node::Element(el) if el.name() == "br" => lines.push(String::new()),
            _ => {}
        }
    }
    lines
        .iter()
        .map(|l| clean_line(l))
        .filter(|l| !l.is_empty())
        .collect()
}

fn is_bye(team: &str) -> bool {
    team.to_lowercase().contains(BYE_MARKER)
}

fn parse_score(text: &str) -> Option<u32> {
    LEADING_INT_RE.find(text.trim())?.as_str().parse().ok()
}

fn parse_score_pair(text: &str) -> (Option<u32>, Option<u32>) {
    SCORE_PAIR_RE
        .captures(text)
        .and_then(|caps| Some((caps[1].parse().ok()?, caps[2].parse().ok()?)))
        .map_or((None, None), |(h, a)| (Some(h), Some(a)))
}

/// Date from the first line (strict `DD/MM/YYYY`), time from the second.
fn parse_schedule(lines: &[String]) -> Result<(NaiveDate, Option<NaiveTime>), ParseRowError> {
    let raw_date = lines.first().map(String::as_str).unwrap_or_default();
    if !DATE_RE.is_match(raw_date) {
        return Err(ParseRowError::InvalidDate(raw_date.to_string()));
    }
    let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT)
        .map_err(|_| ParseRowError::InvalidDate(raw_date.to_string()))?;
    let time = lines.get(1).and_then(|t| {
        let caps = TIME_RE.captures(t)?;
        NaiveTime::from_hms_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, 0)
    });
    Ok((date, time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LayoutChoice, LayoutPreset};

    const CALENDAR_HTML: &str = r#"
<html><body>
<h1>Liga  Provincial Cádiz</h1>
<div id="calendario">
  <header class="nombre_tabla"><h5>Cadete   Masculino</h5></header>
  <div class="table-responsive"><table>
    <thead><tr><th>Local</th><th></th><th></th><th>Visitante</th><th>Fecha</th><th>Pabellón</th></tr></thead>
    <tbody>
      <tr><td>ADESA 80</td><td>85</td><td>78</td><td>ISAVAL CBA</td><td><strong>"14/02/2026"<br>"18:30"</strong></td><td>Pabellón Municipal</td></tr>
      <tr><td>ISAVAL CBA</td><td></td><td></td><td>CB Jerez</td><td><strong>21/02/2026<br/>10:00</strong></td><td>Polideportivo</td></tr>
      <tr><td>DESCANSA</td><td></td><td></td><td>CB Rota</td><td><strong>21/02/2026</strong></td><td></td></tr>
    </tbody>
  </table></div>
  <header class="nombre_tabla"><h5>Junior Femenino</h5></header>
  <div class="table-responsive"><table><tbody>
      <tr><td>CB Chiclana</td><td></td><td></td><td>ISAVAL CBA</td><td><strong>aplazado</strong></td><td>X</td></tr>
      <tr><td>CB Chiclana &amp; Co</td><td>60</td><td>61</td><td>CB Rota</td><td><strong>28/02/2026<br>12:15</strong></td><td>Y</td></tr>
  </tbody></table></div>
</div>
</body></html>
"#;

    const RESULTS_HTML: &str = r#"
<html><body>
<h2 class="categoria">Cadete Masculino</h2>
<table><tbody>
  <tr><td>ADESA 80<br>ISAVAL CBA</td><td>85 - 78</td><td>14/02/2026<br>18:30</td><td>Pabellón</td></tr>
  <tr><td>ISAVAL CBA<br>CB Jerez</td><td>-</td><td>21/02/2026</td><td>Polideportivo</td></tr>
  <tr><td>broken</td><td>1</td><td>2</td></tr>
</tbody></table>
<h2 class="categoria">Infantil Masculino</h2>
<table><tbody>
  <tr><td><span>CB Rota</span><br><span>ISAVAL CBA</span></td><td>40-52</td><td>01/03/2026<br>sin hora</td><td>Rota</td></tr>
</tbody></table>
</body></html>
"#;

    fn calendar_parser() -> FixtureParser {
        FixtureParser::new(&TableConfig::default()).unwrap()
    }

    fn results_parser() -> FixtureParser {
        let table = TableConfig {
            header_selector: "h2.categoria".to_string(),
            row_selector: "table tr".to_string(),
            layout: LayoutChoice::Preset(LayoutPreset::Results),
        };
        FixtureParser::new(&table).unwrap()
    }

    #[test]
    fn test_calendar_rows_follow_their_section() {
        let out = calendar_parser().parse(CALENDAR_HTML);
        assert_eq!(out.rows.len(), 3);
        assert_eq!(out.rows[0].category, "Cadete Masculino");
        assert_eq!(out.rows[1].category, "Cadete Masculino");
        assert_eq!(out.rows[2].category, "Junior Femenino");
        assert_eq!(out.heading.as_deref(), Some("Liga Provincial Cádiz"));
    }

    #[test]
    fn test_calendar_split_scores_are_literal() {
        let out = calendar_parser().parse(CALENDAR_HTML);
        let first = &out.rows[0];
        assert_eq!(first.home_team, "ADESA 80");
        assert_eq!(first.away_team, "ISAVAL CBA");
        assert_eq!(first.home_score, Some(85));
        assert_eq!(first.away_score, Some(78));
        assert!(first.has_result());
        assert_eq!(first.date_text(), "14/02/2026");
        assert_eq!(first.time, NaiveTime::from_hms_opt(18, 30, 0));
        assert_eq!(first.venue, "Pabellón Municipal");

        let second = &out.rows[1];
        assert_eq!(second.home_score, None);
        assert_eq!(second.away_score, None);
        assert_eq!(second.time, NaiveTime::from_hms_opt(10, 0, 0));
    }

    #[test]
    fn test_calendar_skips_bye_and_bad_dates() {
        let out = calendar_parser().parse(CALENDAR_HTML);
        assert_eq!(
            out.skipped,
            vec![
                ParseRowError::Bye,
                ParseRowError::InvalidDate("aplazado".to_string()),
            ]
        );
        assert_eq!(out.rows[2].home_team, "CB Chiclana & Co");
    }

    #[test]
    fn test_heading_used_as_competition_unless_configured() {
        let out = calendar_parser().parse(CALENDAR_HTML);
        assert_eq!(out.rows[0].competition.as_deref(), Some("Liga Provincial Cádiz"));

        let out = calendar_parser()
            .with_competition(Some("Copa".to_string()))
            .parse(CALENDAR_HTML);
        assert_eq!(out.rows[0].competition.as_deref(), Some("Copa"));
    }

    #[test]
    fn test_fallback_competition_when_page_has_no_heading() {
        let out = results_parser()
            .with_fallback_competition(Some("Liga Provincial".to_string()))
            .parse(RESULTS_HTML);
        assert_eq!(out.heading, None);
        assert_eq!(out.rows[0].competition.as_deref(), Some("Liga Provincial"));
    }

    #[test]
    fn test_results_layout_stacked_teams_and_combined_score() {
        let out = results_parser().parse(RESULTS_HTML);
        assert_eq!(out.rows.len(), 3);

        let first = &out.rows[0];
        assert_eq!(first.home_team, "ADESA 80");
        assert_eq!(first.away_team, "ISAVAL CBA");
        assert_eq!((first.home_score, first.away_score), (Some(85), Some(78)));

        let second = &out.rows[1];
        assert_eq!((second.home_score, second.away_score), (None, None));
        assert_eq!(second.time, None);

        let third = &out.rows[2];
        assert_eq!(third.category, "Infantil Masculino");
        assert_eq!(third.home_team, "CB Rota");
        assert_eq!((third.home_score, third.away_score), (Some(40), Some(52)));
        assert_eq!(third.time, None);
    }

    #[test]
    fn test_short_row_is_skipped_and_parse_continues() {
        let out = results_parser().parse(RESULTS_HTML);
        // four rows in the page, the three-column one is dropped
        assert_eq!(out.rows.len(), 3);
        assert_eq!(
            out.skipped,
            vec![ParseRowError::TooFewColumns { found: 3, required: 4 }]
        );
    }

    #[test]
    fn test_rows_before_any_header_have_empty_category() {
        let html = r#"<table><tbody>
            <tr><td>A<br>B</td><td>1-2</td><td>01/01/2026</td><td>V</td></tr>
        </tbody></table>"#;
        let out = results_parser().parse(html);
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].category, "");
    }

    #[test]
    fn test_invalid_selector_is_a_config_error() {
        let table = TableConfig {
            header_selector: "h5[".to_string(),
            ..TableConfig::default()
        };
        assert!(matches!(
            FixtureParser::new(&table),
            Err(ConfigError::Selector { .. })
        ));
    }

    #[test]
    fn test_parse_schedule_is_strict() {
        let lines = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(parse_schedule(&lines(&["14/02/2026", "18:30"])).is_ok());
        assert!(parse_schedule(&lines(&["4/2/2026"])).is_err());
        assert!(parse_schedule(&lines(&["2026-02-14"])).is_err());
        assert!(parse_schedule(&lines(&["31/02/2026"])).is_err());
        assert!(parse_schedule(&lines(&[])).is_err());
        let (_, time) = parse_schedule(&lines(&["14/02/2026", "9:05h"])).unwrap();
        assert_eq!(time, NaiveTime::from_hms_opt(9, 5, 0));
    }

    #[test]
    fn test_score_helpers() {
        assert_eq!(parse_score("85"), Some(85));
        assert_eq!(parse_score(" 7 "), Some(7));
        assert_eq!(parse_score("-"), None);
        assert_eq!(parse_score(""), None);
        assert_eq!(parse_score_pair("85 - 78"), (Some(85), Some(78)));
        assert_eq!(parse_score_pair("85–78"), (Some(85), Some(78)));
        assert_eq!(parse_score_pair("vs"), (None, None));
    }
}
