use std::cmp::Ordering;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::json::{float_or_none, truthy_or_false, u64_or_none};
use crate::model::{PlayerRecord, RoundBlob, TotwEntry, TotwGrouping};
use crate::remote::RemoteClient;
use crate::round_cache::RoundCache;
use crate::store::LocalStore;
use crate::view::Row;

pub struct Aggregator<'a, R> {
    client: &'a R,
    store: &'a LocalStore,
    rounds: &'a RoundCache,
    round_delay: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct ViewBuild {
    pub rows: Vec<ViewRow>,
    pub skipped: Vec<u64>,
}

impl<'a, R: RemoteClient> Aggregator<'a, R> {
    pub fn new(
        client: &'a R,
        store: &'a LocalStore,
        rounds: &'a RoundCache,
        round_delay: Duration,
    ) -> Self {
        Self {
            client,
            store,
            rounds,
            round_delay,
        }
    }

    pub fn group_totw(&self, league_id: u64, season_year: i32) -> Result<TotwGrouping> {
        let blobs =
            self.rounds
                .load_or_build(self.client, league_id, season_year, self.round_delay)?;
        Ok(group_rounds(&blobs))
    }

    /// Seasons `from..=until`, each read once, merged oldest first.
    pub fn group_totw_range(&self, league_id: u64, from: i32, until: i32) -> Result<TotwGrouping> {
        let mut groupings = Vec::new();
        for season in from..=until {
            let grouping = self.group_totw(league_id, season)?;
            info!(
                league_id,
                season,
                players = grouping.len(),
                entries = grouping.total_entries(),
                "season grouped"
            );
            groupings.push(grouping);
        }
        Ok(merge_groupings(groupings))
    }

    pub fn build_player_view(&self, ids: &[u64], grouping: &TotwGrouping) -> Result<ViewBuild> {
        let mut out = ViewBuild::default();
        let total = ids.len();
        for (idx, id) in ids.iter().enumerate() {
            match self.store.get_or_fetch(self.client, *id)? {
                Some(record) => out.rows.push(ViewRow::from_record(&record, grouping.count(*id))),
                None => {
                    warn!(player_id = *id, "{}/{} player omitted from view", idx + 1, total);
                    out.skipped.push(*id);
                }
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Deserialize)]
struct TotwPlayer {
    #[serde(rename = "participantId", default, deserialize_with = "u64_or_none")]
    participant_id: Option<u64>,
    #[serde(rename = "matchId", default, deserialize_with = "u64_or_none")]
    match_id: Option<u64>,
    #[serde(default, deserialize_with = "float_or_none")]
    rating: Option<f64>,
    #[serde(default, deserialize_with = "truthy_or_false")]
    motm: bool,
    #[serde(rename = "teamId", default, deserialize_with = "u64_or_none")]
    team_id: Option<u64>,
}

pub fn group_rounds(blobs: &[RoundBlob]) -> TotwGrouping {
    let mut grouping = TotwGrouping::new();
    for blob in blobs {
        for raw in &blob.players {
            let player = match TotwPlayer::deserialize(raw) {
                Ok(player) => player,
                Err(err) => {
                    warn!(round = %blob.round, error = %err, "unreadable TOTW entry skipped");
                    continue;
                }
            };
            let Some(participant_id) = player.participant_id else {
                warn!(round = %blob.round, "TOTW entry without participantId skipped");
                continue;
            };
            grouping.push(TotwEntry {
                participant_id,
                match_id: player.match_id,
                rating: player.rating,
                motm: player.motm,
                round: blob.round.clone(),
                team_id: player.team_id,
            });
        }
    }
    grouping
}

pub fn merge_groupings(groupings: impl IntoIterator<Item = TotwGrouping>) -> TotwGrouping {
    let mut merged = TotwGrouping::new();
    for grouping in groupings {
        merged.extend(grouping);
    }
    merged
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewRow {
    pub id: u64,
    pub name: String,
    pub age: Option<u32>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub positions: String,
    pub team_name: Option<String>,
    pub on_loan: Option<bool>,
    pub apps: u64,
    pub totw_count: usize,
    pub market_value: Option<String>,
    pub market_value_eur: Option<f64>,
}

impl ViewRow {
    pub fn from_record(record: &PlayerRecord, totw_count: usize) -> Self {
        let market_value = record.prop_string("market_value");
        Self {
            id: record.id,
            name: record.name.clone(),
            age: record.age(),
            country: record.prop_string("country"),
            country_code: record.prop_string("country_code"),
            positions: record.positions_label(),
            team_name: record.team_name.clone(),
            on_loan: record.on_loan,
            apps: record.total_apps(),
            totw_count,
            market_value_eur: market_value.as_deref().and_then(parse_market_value),
            market_value,
        }
    }

    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.push("id", self.id.to_string());
        row.push("name", self.name.clone());
        row.push("age", opt_to_string(self.age));
        row.push("country", self.country.clone().unwrap_or_default());
        row.push("country_code", self.country_code.clone().unwrap_or_default());
        row.push("positions", self.positions.clone());
        row.push("team_name", self.team_name.clone().unwrap_or_default());
        row.push("on_loan", opt_to_string(self.on_loan));
        row.push("apps", self.apps.to_string());
        row.push("totw", self.totw_count.to_string());
        row.push("market_value", self.market_value.clone().unwrap_or_default());
        row.push(
            "market_value_eur",
            self.market_value_eur
                .map(|v| format!("{v:.0}"))
                .unwrap_or_default(),
        );
        row
    }
}

/// Age ascending (missing counts as 0), then apps descending.
pub fn sort_rows(rows: &mut [ViewRow]) {
    rows.sort_by(compare_rows);
}

fn compare_rows(a: &ViewRow, b: &ViewRow) -> Ordering {
    a.age
        .unwrap_or(0)
        .cmp(&b.age.unwrap_or(0))
        .then_with(|| b.apps.cmp(&a.apps))
}

/// "€1.5M" -> 1_500_000, "€850K" -> 850_000, "€1.2B" -> 1_200_000_000.
pub fn parse_market_value(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let start = trimmed.find(|c: char| c.is_ascii_digit())?;
    let rest = &trimmed[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .unwrap_or(rest.len());
    let number = rest[..end].replace(',', "").parse::<f64>().ok()?;
    let multiplier = match rest[end..].trim_start().chars().next() {
        Some('k' | 'K') => 1_000.0,
        Some('m' | 'M') => 1_000_000.0,
        Some('b' | 'B') => 1_000_000_000.0,
        _ => 1.0,
    };
    Some(number * multiplier)
}

/// Optional inclusive bounds. A row missing a bounded field never matches.
#[derive(Debug, Clone, Default)]
pub struct ViewFilter {
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    pub min_apps: Option<u64>,
    pub max_apps: Option<u64>,
    pub min_totw: Option<usize>,
    pub max_totw: Option<usize>,
    pub min_market_value: Option<f64>,
    pub max_market_value: Option<f64>,
    pub position: Option<String>,
}

impl ViewFilter {
    pub fn matches(&self, row: &ViewRow) -> bool {
        in_range(row.age, self.min_age, self.max_age)
            && in_range(Some(row.apps), self.min_apps, self.max_apps)
            && in_range(Some(row.totw_count), self.min_totw, self.max_totw)
            && in_range(
                row.market_value_eur,
                self.min_market_value,
                self.max_market_value,
            )
            && self.position.as_deref().is_none_or(|wanted| {
                row.positions
                    .split('/')
                    .any(|p| p.eq_ignore_ascii_case(wanted.trim()))
            })
    }

    pub fn apply(&self, rows: Vec<ViewRow>) -> Vec<ViewRow> {
        rows.into_iter().filter(|row| self.matches(row)).collect()
    }
}

fn in_range<T: PartialOrd>(value: Option<T>, min: Option<T>, max: Option<T>) -> bool {
    if min.is_none() && max.is_none() {
        return true;
    }
    let Some(value) = value else {
        return false;
    };
    min.is_none_or(|min| value >= min) && max.is_none_or(|max| value <= max)
}

fn opt_to_string<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(id: u64, age: Option<u32>, apps: u64) -> ViewRow {
        ViewRow {
            id,
            name: format!("p{id}"),
            age,
            country: None,
            country_code: None,
            positions: "CB/RB".to_string(),
            team_name: None,
            on_loan: None,
            apps,
            totw_count: 1,
            market_value: None,
            market_value_eur: None,
        }
    }

    fn entry(id: u64, round: &str) -> TotwEntry {
        TotwEntry {
            participant_id: id,
            match_id: Some(100),
            rating: Some(8.1),
            motm: false,
            round: round.to_string(),
            team_id: Some(9),
        }
    }

    #[test]
    fn merge_concatenates_without_dedup() {
        let mut left = TotwGrouping::new();
        left.push(entry(1, "a"));
        let mut right = TotwGrouping::new();
        right.push(entry(1, "b"));

        let mut expected = TotwGrouping::new();
        expected.push(entry(1, "a"));
        expected.push(entry(1, "b"));

        assert_eq!(merge_groupings([left, right]), expected);
    }

    #[test]
    fn merging_the_same_grouping_twice_keeps_both_copies() {
        let mut g = TotwGrouping::new();
        g.push(entry(4, "1"));
        let merged = merge_groupings([g.clone(), g]);
        assert_eq!(merged.count(4), 2);
    }

    #[test]
    fn group_rounds_preserves_round_then_source_order() {
        let blobs = vec![
            RoundBlob {
                round: "1".to_string(),
                players: vec![
                    json!({"participantId": 10, "matchId": 1, "rating": 8.4, "motm": 1, "teamId": 3}),
                    json!({"participantId": 11, "matchId": 2, "rating": "7.9", "motm": 0, "teamId": 4}),
                ],
                rest: Default::default(),
            },
            RoundBlob {
                round: "2".to_string(),
                players: vec![
                    json!({"participantId": 11, "matchId": 5, "rating": 9.0, "motm": true, "teamId": 4}),
                    json!({"matchId": 6}),
                ],
                rest: Default::default(),
            },
        ];
        let g = group_rounds(&blobs);
        assert_eq!(g.player_ids(), &[10, 11]);
        assert!(g.get(10)[0].motm);
        let eleven = g.get(11);
        assert_eq!(eleven.len(), 2);
        assert_eq!(eleven[0].round, "1");
        assert_eq!(eleven[0].rating, Some(7.9));
        assert!(!eleven[0].motm);
        assert_eq!(eleven[1].round, "2");
        assert!(eleven[1].motm);
        assert_eq!(g.total_entries(), 3);
    }

    #[test]
    fn sort_is_age_ascending_then_apps_descending() {
        let mut rows = vec![
            row(1, Some(24), 10),
            row(2, None, 5),
            row(3, Some(21), 40),
            row(4, Some(21), 90),
        ];
        sort_rows(&mut rows);
        let ids: Vec<u64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 4, 3, 1]);
    }

    #[test]
    fn market_values_parse_with_suffixes() {
        assert_eq!(parse_market_value("€1.5M"), Some(1_500_000.0));
        assert_eq!(parse_market_value("€850K"), Some(850_000.0));
        assert_eq!(parse_market_value("€12m"), Some(12_000_000.0));
        assert_eq!(parse_market_value("2500000"), Some(2_500_000.0));
        assert_eq!(parse_market_value("n/a"), None);
    }

    #[test]
    fn filter_excludes_missing_fields_only_when_bounded() {
        let rows = vec![row(1, Some(19), 0), row(2, Some(22), 0), row(3, None, 0)];
        let open = ViewFilter::default();
        assert_eq!(open.apply(rows.clone()).len(), 3);

        let bounded = ViewFilter {
            min_age: Some(20),
            ..ViewFilter::default()
        };
        let kept = bounded.apply(rows);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 2);
    }

    #[test]
    fn position_filter_matches_any_listed_code() {
        let filter = ViewFilter {
            position: Some("rb".to_string()),
            ..ViewFilter::default()
        };
        assert!(filter.matches(&row(1, None, 0)));
        let other = ViewFilter {
            position: Some("ST".to_string()),
            ..ViewFilter::default()
        };
        assert!(!other.matches(&row(1, None, 0)));
    }
}
