use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::json::value_to_string;

/// Field names owned by [`PlayerRecord`]; extras may never shadow them.
pub const CORE_FIELDS: &[&str] = &[
    "id",
    "name",
    "on_loan",
    "team_id",
    "team_name",
    "positions",
    "clubs",
    "recent_matches",
    "career_statistics",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub on_loan: Option<bool>,
    #[serde(default)]
    pub team_id: Option<u64>,
    #[serde(default)]
    pub team_name: Option<String>,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub clubs: Vec<Club>,
    #[serde(default)]
    pub recent_matches: Vec<RecentMatch>,
    #[serde(default)]
    pub career_statistics: Vec<CareerStatistic>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub position: String,
    pub apps: u32,
    pub main: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Club {
    pub team: String,
    #[serde(default)]
    pub team_id: Option<u64>,
    #[serde(default)]
    pub transfer_type: Option<String>,
    pub start_date: String,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub appearances: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentMatch {
    pub match_id: Option<u64>,
    pub rating: Option<f64>,
    pub rating_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareerStatistic {
    pub name: String,
    pub season_start: Option<i64>,
    pub season_stats: BTreeMap<String, Value>,
}

impl Club {
    pub fn appearance_count(&self) -> u64 {
        self.appearances
            .as_deref()
            .and_then(parse_leading_int)
            .unwrap_or(0)
    }
}

impl PlayerRecord {
    pub fn primary_position(&self) -> Option<&Position> {
        self.positions
            .iter()
            .find(|p| p.main)
            .or_else(|| self.positions.first())
    }

    pub fn positions_label(&self) -> String {
        let mut ordered: Vec<&Position> = self.positions.iter().collect();
        ordered.sort_by_key(|p| !p.main);
        ordered
            .iter()
            .map(|p| p.position.as_str())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.extra.get(key).filter(|v| !v.is_null())
    }

    pub fn prop_string(&self, key: &str) -> Option<String> {
        let rendered = value_to_string(self.prop(key)?);
        if rendered.is_empty() {
            None
        } else {
            Some(rendered)
        }
    }

    pub fn age(&self) -> Option<u32> {
        let raw = self.prop_string("age")?;
        parse_leading_int(&raw).and_then(|n| u32::try_from(n).ok())
    }

        pub fn total_apps(&self) -> u64 {
        self.clubs.iter().map(Club::appearance_count).sum()
    }
}

pub fn parse_leading_int(raw: &str) -> Option<u64> {
    let trimmed = raw.trim_start();
    let end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    trimmed[..end].parse::<u64>().ok()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotwEntry {
    pub participant_id: u64,
    pub match_id: Option<u64>,
    pub rating: Option<f64>,
    pub motm: bool,
    pub round: String,
    pub team_id: Option<u64>,
}

/// TOTW appearances per player. Entries keep insertion order and keys keep
/// first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TotwGrouping {
    order: Vec<u64>,
    entries: HashMap<u64, Vec<TotwEntry>>,
}

impl TotwGrouping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TotwEntry) {
        let id = entry.participant_id;
        match self.entries.get_mut(&id) {
            Some(list) => list.push(entry),
            None => {
                self.order.push(id);
                self.entries.insert(id, vec![entry]);
            }
        }
    }

    pub fn extend(&mut self, other: TotwGrouping) {
        let TotwGrouping { order, mut entries } = other;
        for id in order {
            for entry in entries.remove(&id).unwrap_or_default() {
                self.push(entry);
            }
        }
    }

    pub fn get(&self, participant_id: u64) -> &[TotwEntry] {
        self.entries
            .get(&participant_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn count(&self, participant_id: u64) -> usize {
        self.get(participant_id).len()
    }

    pub fn player_ids(&self) -> &[u64] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn total_entries(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &[TotwEntry])> + '_ {
        self.order.iter().map(|id| (*id, self.get(*id)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundBlob {
    pub round: String,
    #[serde(default)]
    pub players: Vec<Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatLink {
    pub name: String,
    pub fetch_all_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonLink {
    pub name: String,
    pub totw_rounds_link: Option<String>,
    pub tournament_id: Option<u64>,
    pub relative_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueSummary {
    pub id: u64,
    pub name: Option<String>,
    pub country: Option<String>,
    pub stat_links: Vec<StatLink>,
    pub seasons: BTreeMap<i32, SeasonLink>,
    #[serde(default)]
    pub teams: Vec<String>,
    #[serde(default)]
    pub transfers: Vec<Transfer>,
}

/// A league transfer with the display-only fields removed and `fee` reduced
/// to its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub player_id: Option<u64>,
    pub name: Option<String>,
    pub from_club: Option<String>,
    pub to_club: Option<String>,
    pub transfer_date: Option<String>,
    pub on_loan: Option<bool>,
    pub fee: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LeagueSummary {
    pub fn season(&self, year: i32) -> Option<&SeasonLink> {
        self.seasons.get(&year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64, round: &str) -> TotwEntry {
        TotwEntry {
            participant_id: id,
            match_id: None,
            rating: Some(8.0),
            motm: false,
            round: round.to_string(),
            team_id: None,
        }
    }

    #[test]
    fn leading_int_parses_prefix_only() {
        assert_eq!(parse_leading_int("45 (3)"), Some(45));
        assert_eq!(parse_leading_int("  12"), Some(12));
        assert_eq!(parse_leading_int("(3)"), None);
        assert_eq!(parse_leading_int(""), None);
    }

    #[test]
    fn grouping_keeps_first_seen_key_order() {
        let mut g = TotwGrouping::new();
        g.push(entry(7, "1"));
        g.push(entry(3, "1"));
        g.push(entry(7, "2"));
        assert_eq!(g.player_ids(), &[7, 3]);
        assert_eq!(g.count(7), 2);
        assert_eq!(g.get(7)[1].round, "2");
        assert_eq!(g.count(99), 0);
        assert_eq!(g.total_entries(), 3);
    }

    #[test]
    fn positions_label_puts_primary_first() {
        let record = PlayerRecord {
            id: 1,
            name: "A".to_string(),
            on_loan: None,
            team_id: None,
            team_name: None,
            positions: vec![
                Position {
                    position: "RB".to_string(),
                    apps: 3,
                    main: false,
                },
                Position {
                    position: "CB".to_string(),
                    apps: 20,
                    main: true,
                },
            ],
            clubs: Vec::new(),
            recent_matches: Vec::new(),
            career_statistics: Vec::new(),
            extra: BTreeMap::new(),
        };
        assert_eq!(record.positions_label(), "CB/RB");
        assert_eq!(record.primary_position().map(|p| p.position.as_str()), Some("CB"));
    }
}
