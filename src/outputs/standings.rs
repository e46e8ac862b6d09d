//! League tables computed from finished matches.
//!
//! Basketball scoring: a win is worth 2 points and a loss 1. Teams are ranked
//! by points, then point difference, then points scored. Bye rows never reach
//! this module (the parser drops them).

use crate::error::PersistError;
use crate::models::FixtureRow;
use crate::outputs::json::write_json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{info, instrument};

const POINTS_WIN: u32 = 2;
const POINTS_LOSS: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
    pub position: usize,
    pub team: String,
    pub played: u32,
    pub won: u32,
    pub lost: u32,
    pub points_for: u32,
    pub points_against: u32,
    pub difference: i64,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStandings {
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competition: Option<String>,
    pub table: Vec<Standing>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandingsDocument {
    pub last_updated: DateTime<Utc>,
    pub categories: Vec<CategoryStandings>,
}

fn entry<'a>(stats: &'a mut HashMap<String, Standing>, team: &str) -> &'a mut Standing {
    stats.entry(team.to_string()).or_insert_with(|| Standing {
        team: team.to_string(),
        ..Standing::default()
    })
}

fn table_for(rows: &[&FixtureRow]) -> Vec<Standing> {
    let mut stats: HashMap<String, Standing> = HashMap::new();

    for row in rows {
        let (Some(home_pts), Some(away_pts)) = (row.home_score, row.away_score) else {
            continue;
        };
        let home = entry(&mut stats, &row.home_team);
        home.played += 1;
        home.points_for += home_pts;
        home.points_against += away_pts;
        if home_pts > away_pts {
            home.won += 1;
            home.points += POINTS_WIN;
        } else if home_pts < away_pts {
            home.lost += 1;
            home.points += POINTS_LOSS;
        }

        let away = entry(&mut stats, &row.away_team);
        away.played += 1;
        away.points_for += away_pts;
        away.points_against += home_pts;
        if away_pts > home_pts {
            away.won += 1;
            away.points += POINTS_WIN;
        } else if away_pts < home_pts {
            away.lost += 1;
            away.points += POINTS_LOSS;
        }
    }

    let mut table: Vec<Standing> = stats
        .into_values()
        .map(|mut s| {
            s.difference = i64::from(s.points_for) - i64::from(s.points_against);
            s
        })
        .collect();
    table.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then(b.difference.cmp(&a.difference))
            .then(b.points_for.cmp(&a.points_for))
            .then(a.team.cmp(&b.team))
    });
    for (i, s) in table.iter_mut().enumerate() {
        s.position = i + 1;
    }
    table
}

/// One table per category, from every row with both scores.
///
/// Categories without any finished match are omitted. Expects rows already
/// deduplicated, otherwise repeated matches count twice.
#[instrument(level = "info", skip_all, fields(rows = rows.len()))]
pub fn compute_standings(rows: &[FixtureRow]) -> Vec<CategoryStandings> {
    let mut by_category: BTreeMap<&str, Vec<&FixtureRow>> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.has_result()) {
        by_category.entry(row.category.as_str()).or_default().push(row);
    }

    let standings: Vec<CategoryStandings> = by_category
        .into_iter()
        .map(|(category, rows)| CategoryStandings {
            category: category.to_string(),
            competition: rows.iter().find_map(|r| r.competition.clone()),
            table: table_for(&rows),
        })
        .collect();
    info!(categories = standings.len(), "Computed standings");
    standings
}

pub async fn write_standings(doc: &StandingsDocument, path: &Path) -> Result<(), PersistError> {
    write_json(doc, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn result(category: &str, home: &str, away: &str, scores: Option<(u32, u32)>) -> FixtureRow {
        FixtureRow {
            category: category.to_string(),
            competition: Some("Liga".to_string()),
            home_team: home.to_string(),
            away_team: away.to_string(),
            date: NaiveDate::from_ymd_opt(2026, 2, 14).unwrap(),
            time: None,
            venue: String::new(),
            home_score: scores.map(|s| s.0),
            away_score: scores.map(|s| s.1),
        }
    }

    #[test]
    fn test_win_is_two_points_loss_is_one() {
        let rows = vec![result("Cadete", "A", "B", Some((80, 70)))];
        let standings = compute_standings(&rows);
        assert_eq!(standings.len(), 1);
        let table = &standings[0].table;
        assert_eq!(table[0].team, "A");
        assert_eq!((table[0].won, table[0].lost, table[0].points), (1, 0, 2));
        assert_eq!(table[0].difference, 10);
        assert_eq!(table[1].team, "B");
        assert_eq!((table[1].won, table[1].lost, table[1].points), (0, 1, 1));
        assert_eq!(table[1].difference, -10);
    }

    #[test]
    fn test_ranking_tiebreaks() {
        let rows = vec![
            result("Cadete", "A", "B", Some((60, 50))),
            result("Cadete", "B", "C", Some((90, 40))),
            result("Cadete", "C", "A", Some((70, 65))),
        ];
        // every team 1-1 with 3 points; difference: A +5, B +40, C -45
        let table = &compute_standings(&rows)[0].table;
        let order: Vec<&str> = table.iter().map(|s| s.team.as_str()).collect();
        assert_eq!(order, vec!["B", "A", "C"]);
        assert_eq!(
            table.iter().map(|s| s.position).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(table.iter().all(|s| s.points == 3 && s.played == 2));
    }

    #[test]
    fn test_unplayed_matches_and_categories_are_ignored() {
        let rows = vec![
            result("Cadete", "A", "B", None),
            result("Junior", "C", "D", Some((50, 49))),
        ];
        let standings = compute_standings(&rows);
        assert_eq!(standings.len(), 1);
        assert_eq!(standings[0].category, "Junior");
        assert_eq!(standings[0].competition.as_deref(), Some("Liga"));
    }

    #[test]
    fn test_document_shape() {
        let doc = StandingsDocument {
            last_updated: Utc::now(),
            categories: compute_standings(&[result("Cadete", "A", "B", Some((1, 0)))]),
        };
        let value = serde_json::to_value(&doc).unwrap();
        assert!(value["lastUpdated"].is_string());
        assert_eq!(value["categories"][0]["table"][0]["pointsFor"], 1);
    }
}
