#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use serde_json::{Value, json};

use totw_scout::error::{Error, Result};
use totw_scout::model::PlayerRecord;
use totw_scout::remote::{LeagueParams, RemoteClient};

pub fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

pub fn fixture_json(name: &str) -> Value {
    serde_json::from_str(&read_fixture(name)).expect("fixture should be valid json")
}

/// Canned responses keyed by player id, league id and URL. Every call is
/// recorded so tests can assert on what was (not) fetched.
#[derive(Default)]
pub struct FakeClient {
    pub players: HashMap<u64, Value>,
    pub leagues: HashMap<u64, Value>,
    pub urls: HashMap<String, Value>,
    pub calls: RefCell<Vec<String>>,
    pub call_times: RefCell<Vec<Instant>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_player(mut self, raw: Value) -> Self {
        let id = raw["id"].as_u64().expect("fixture player has an id");
        self.players.insert(id, raw);
        self
    }

    pub fn with_league(mut self, id: u64, raw: Value) -> Self {
        self.leagues.insert(id, raw);
        self
    }

    pub fn with_url(mut self, url: &str, raw: Value) -> Self {
        self.urls.insert(url.to_string(), raw);
        self
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
        self.call_times.borrow_mut().push(Instant::now());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

impl RemoteClient for FakeClient {
    fn fetch_player(&self, id: u64) -> Result<Value> {
        self.record(format!("player:{id}"));
        self.players.get(&id).cloned().ok_or(Error::NotFound {
            what: format!("player {id}"),
        })
    }

    fn fetch_league(&self, id: u64, _params: &LeagueParams) -> Result<Value> {
        self.record(format!("league:{id}"));
        self.leagues.get(&id).cloned().ok_or(Error::Network {
            url: format!("league {id}"),
            message: "http 503".to_string(),
        })
    }

    fn fetch_round(&self, url: &str) -> Result<Value> {
        self.record(format!("round:{url}"));
        self.urls.get(url).cloned().ok_or(Error::Network {
            url: url.to_string(),
            message: "http 500".to_string(),
        })
    }

    fn time_zone(&self) -> &str {
        "UTC"
    }
}

/// Minimal valid `playerData` payload.
pub fn raw_player(id: u64, name: &str, age: u32, clubs: Vec<Value>) -> Value {
    json!({
        "id": id,
        "name": name,
        "origin": {
            "teamId": 100 + id,
            "teamName": format!("Club {id}"),
            "onLoan": false,
            "positionDesc": {
                "positions": [
                    {"strPosShort": {"label": "CM"}, "occurences": 10, "isMainPosition": true}
                ]
            }
        },
        "playerProps": [
            {"title": "Age", "value": {"key": null, "fallback": age}},
            {"title": "Market value", "value": {"key": null, "fallback": "€1.5M"}}
        ],
        "careerHistory": {
            "fullCareer": true,
            "careerData": {"careerItems": {"senior": clubs}}
        }
    })
}

/// Serves a normalized record back in the raw API shape.
pub fn reserve(record: &PlayerRecord) -> Value {
    let positions: Vec<Value> = record
        .positions
        .iter()
        .map(|p| {
            json!({
                "strPosShort": {"label": p.position},
                "occurences": p.apps,
                "isMainPosition": p.main
            })
        })
        .collect();
    let props: Vec<Value> = record
        .extra
        .iter()
        .map(|(key, value)| json!({"title": key, "value": {"key": null, "fallback": value}}))
        .collect();
    let clubs: Vec<Value> = record
        .clubs
        .iter()
        .map(|c| {
            json!({
                "team": c.team,
                "teamId": c.team_id,
                "transferType": c.transfer_type,
                "startDate": c.start_date,
                "endDate": c.end_date,
                "appearances": c.appearances,
                "hasUncertainData": false
            })
        })
        .collect();
    let recent: Vec<Value> = record
        .recent_matches
        .iter()
        .map(|m| {
            json!({
                "versus": {"matchId": m.match_id},
                "ratingProps": {"num": m.rating, "bgcolor": m.rating_color}
            })
        })
        .collect();
    let career_stats: Vec<Value> = record
        .career_statistics
        .iter()
        .map(|season| {
            let mut stats = Vec::new();
            for (key, value) in &season.season_stats {
                match key.as_str() {
                    "rating_color" => {}
                    "rating" => stats.push(json!(["Rating", {
                        "key": "rating_title",
                        "value": {"num": value, "bgcolor": season.season_stats.get("rating_color")}
                    }])),
                    _ => stats.push(json!([key, {"key": key, "value": value}])),
                }
            }
            json!({
                "name": season.name,
                "seasons": [{"stats": [{"startTS": season.season_start, "statsArr": stats}]}]
            })
        })
        .collect();
    json!({
        "id": record.id,
        "name": record.name,
        "recentMatches": {"All competitions": recent},
        "careerStatistics": career_stats,
        "origin": {
            "onLoan": record.on_loan,
            "teamId": record.team_id,
            "teamName": record.team_name,
            "positionDesc": {"positions": positions}
        },
        "playerProps": props,
        "careerHistory": {
            "fullCareer": true,
            "careerData": {"careerItems": {"senior": clubs}}
        }
    })
}
