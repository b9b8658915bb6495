use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::json::{
    as_i64_any, float_or_none, non_null, shape_or_none, string_or_none, truthy_or_false,
    u64_or_none, vec_or_default,
};
use crate::model::{
    CORE_FIELDS, CareerStatistic, Club, LeagueSummary, PlayerRecord, Position, RecentMatch,
    SeasonLink, StatLink, Transfer,
};

const ALL_COMPETITIONS: &str = "All competitions";
const RATING_STAT: &str = "rating_title";
const TRANSFER_DISPLAY_FIELDS: &[&str] = &["position", "transferText", "transferType"];

#[derive(Debug, Deserialize)]
struct PlayerDataResponse {
    #[serde(default, deserialize_with = "u64_or_none")]
    id: Option<u64>,
    name: Option<String>,
    origin: Option<PlayerOrigin>,
    #[serde(rename = "playerProps")]
    player_props: Option<Vec<PlayerProp>>,
    #[serde(rename = "careerHistory")]
    career_history: Option<PlayerCareerHistory>,
    #[serde(rename = "recentMatches", default, deserialize_with = "shape_or_none")]
    recent_matches: Option<RecentMatches>,
    #[serde(rename = "careerStatistics", default, deserialize_with = "shape_or_none")]
    career_statistics: Option<Vec<CareerStatsLeague>>,
}

#[derive(Debug, Deserialize)]
struct PlayerOrigin {
    #[serde(rename = "onLoan")]
    on_loan: Option<bool>,
    #[serde(rename = "teamId", default, deserialize_with = "u64_or_none")]
    team_id: Option<u64>,
    #[serde(rename = "teamName", default, deserialize_with = "string_or_none")]
    team_name: Option<String>,
    #[serde(rename = "positionDesc")]
    position_desc: Option<PositionDesc>,
}

#[derive(Debug, Deserialize)]
struct PositionDesc {
    #[serde(default, deserialize_with = "vec_or_default")]
    positions: Vec<PositionEntry>,
    #[serde(rename = "primaryPosition")]
    primary_position: Option<Label>,
    #[serde(rename = "nonPrimaryPositions", default, deserialize_with = "vec_or_default")]
    non_primary_positions: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct PositionEntry {
    #[serde(rename = "strPosShort")]
    short: Option<Label>,
    #[serde(rename = "strPos")]
    long: Option<Label>,
    #[serde(default, deserialize_with = "u64_or_none")]
    occurences: Option<u64>,
    #[serde(rename = "isMainPosition", default, deserialize_with = "truthy_or_false")]
    is_main: bool,
}

#[derive(Debug, Deserialize)]
struct Label {
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlayerProp {
    title: Option<String>,
    value: Option<Value>,
    #[serde(rename = "countryCode")]
    country_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlayerCareerHistory {
    #[serde(rename = "fullCareer", default, deserialize_with = "truthy_or_false")]
    full_career: bool,
    #[serde(rename = "careerData")]
    career_data: Option<PlayerCareerData>,
}

#[derive(Debug, Deserialize)]
struct PlayerCareerData {
    #[serde(rename = "careerItems")]
    career_items: Option<PlayerCareerItems>,
}

#[derive(Debug, Deserialize)]
struct PlayerCareerItems {
    #[serde(default, deserialize_with = "vec_or_default")]
    senior: Vec<PlayerCareerTeamEntry>,
}

#[derive(Debug, Deserialize)]
struct PlayerCareerTeamEntry {
    #[serde(default, deserialize_with = "string_or_none")]
    team: Option<String>,
    #[serde(rename = "teamId", default, deserialize_with = "u64_or_none")]
    team_id: Option<u64>,
    #[serde(rename = "transferType", default, deserialize_with = "string_or_none")]
    transfer_type: Option<String>,
    #[serde(rename = "startDate", default, deserialize_with = "string_or_none")]
    start_date: Option<String>,
    #[serde(rename = "endDate", default, deserialize_with = "string_or_none")]
    end_date: Option<String>,
    #[serde(default, deserialize_with = "string_or_none")]
    appearances: Option<String>,
    #[serde(rename = "hasUncertainData", default, deserialize_with = "truthy_or_false")]
    has_uncertain_data: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecentMatches {
    ByCompetition(HashMap<String, Vec<RecentMatchEntry>>),
    Flat(Vec<RecentMatchEntry>),
}

#[derive(Debug, Deserialize)]
struct RecentMatchEntry {
    versus: Option<Versus>,
    #[serde(rename = "ratingProps")]
    rating_props: Option<RatingProps>,
}

#[derive(Debug, Deserialize)]
struct Versus {
    #[serde(rename = "matchId", default, deserialize_with = "u64_or_none")]
    match_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RatingProps {
    #[serde(default, deserialize_with = "float_or_none")]
    num: Option<f64>,
    bgcolor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CareerStatsLeague {
    name: Option<String>,
    #[serde(default, deserialize_with = "vec_or_default")]
    seasons: Vec<CareerStatsSeason>,
}

#[derive(Debug, Deserialize)]
struct CareerStatsSeason {
    #[serde(default, deserialize_with = "vec_or_default")]
    stats: Vec<CareerStatsBlock>,
}

#[derive(Debug, Deserialize)]
struct CareerStatsBlock {
    #[serde(rename = "startTS")]
    start_ts: Option<Value>,
    // [title, ..., {key, value}]
    #[serde(rename = "statsArr", default, deserialize_with = "vec_or_default")]
    stats_arr: Vec<Vec<Value>>,
}

pub fn normalize_player(raw: &Value) -> Result<PlayerRecord> {
    let data = PlayerDataResponse::deserialize(raw)
        .map_err(|err| Error::malformed("player payload", err.to_string()))?;

    let id = data
        .id
        .ok_or_else(|| Error::malformed("player payload", "id"))?;
    let name = data
        .name
        .ok_or_else(|| Error::malformed("player payload", "name"))?;
    let origin = data
        .origin
        .ok_or_else(|| Error::malformed("player payload", "origin"))?;
    let props = data
        .player_props
        .ok_or_else(|| Error::malformed("player payload", "playerProps"))?;
    let history = data
        .career_history
        .ok_or_else(|| Error::malformed("player payload", "careerHistory"))?;

    Ok(PlayerRecord {
        id,
        name,
        on_loan: origin.on_loan,
        team_id: origin.team_id,
        team_name: origin.team_name,
        positions: parse_positions(origin.position_desc),
        clubs: parse_clubs(history, id),
        recent_matches: data
            .recent_matches
            .map(parse_recent_matches)
            .unwrap_or_default(),
        career_statistics: data
            .career_statistics
            .map(parse_career_statistics)
            .unwrap_or_default(),
        extra: parse_props(props, id),
    })
}

/// Uppercase first letter of every word: "Centre Back" -> "CB".
pub fn position_initialism(label: &str) -> String {
    label
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .collect()
}

pub fn prop_key(title: &str) -> String {
    title
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

fn parse_positions(desc: Option<PositionDesc>) -> Vec<Position> {
    let Some(desc) = desc else {
        return Vec::new();
    };

    if !desc.positions.is_empty() {
        return desc
            .positions
            .into_iter()
            .filter_map(parse_position_entry)
            .collect();
    }

    let mut out = Vec::new();
    if let Some(label) = desc.primary_position.and_then(|p| p.label) {
        out.push(Position {
            position: position_initialism(&label),
            apps: 0,
            main: true,
        });
    }
    for label in desc.non_primary_positions.into_iter().filter_map(|p| p.label) {
        out.push(Position {
            position: position_initialism(&label),
            apps: 0,
            main: false,
        });
    }
    out
}

fn parse_position_entry(entry: PositionEntry) -> Option<Position> {
    let position = match entry.short.and_then(|l| l.label) {
        Some(short) => short,
        None => position_initialism(&entry.long?.label?),
    };
    Some(Position {
        position,
        apps: entry
            .occurences
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0),
        main: entry.is_main,
    })
}

fn parse_props(props: Vec<PlayerProp>, player_id: u64) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    for prop in props {
        let Some(title) = prop.title else {
            continue;
        };
        let key = prop_key(&title);
        if key.is_empty() {
            continue;
        }
        if CORE_FIELDS.contains(&key.as_str()) {
            debug!(player_id, key = %key, "dropping prop that shadows a core field");
            continue;
        }
        if let Some(code) = prop.country_code {
            out.insert("country_code".to_string(), Value::String(code));
        }
        out.insert(key, prop_value(prop.value));
    }
    out
}

/// `value.key` unless null or empty, otherwise `value.fallback`.
fn prop_value(value: Option<Value>) -> Value {
    match value {
        Some(Value::Object(mut v)) => {
            let use_key = match non_null(v.get("key")) {
                Some(Value::String(s)) => !s.is_empty(),
                Some(_) => true,
                None => false,
            };
            v.remove(if use_key { "key" } else { "fallback" })
                .unwrap_or(Value::Null)
        }
        Some(other) => other,
        None => Value::Null,
    }
}

fn parse_clubs(history: PlayerCareerHistory, player_id: u64) -> Vec<Club> {
    if !history.full_career {
        return Vec::new();
    }
    let Some(items) = history.career_data.and_then(|d| d.career_items) else {
        return Vec::new();
    };

    items
        .senior
        .into_iter()
        .filter(|entry| !entry.has_uncertain_data)
        .map(|entry| Club {
            team: entry.team.unwrap_or_else(|| {
                debug!(player_id, "career entry without a team name");
                String::new()
            }),
            team_id: entry.team_id,
            transfer_type: entry.transfer_type,
            start_date: entry.start_date.unwrap_or_default(),
            end_date: entry.end_date,
            appearances: entry.appearances,
        })
        .collect()
}

fn parse_recent_matches(matches: RecentMatches) -> Vec<RecentMatch> {
    let entries = match matches {
        RecentMatches::ByCompetition(mut by) => by.remove(ALL_COMPETITIONS).unwrap_or_default(),
        RecentMatches::Flat(list) => list,
    };
    entries
        .into_iter()
        .map(|entry| {
            let (rating, rating_color) = match entry.rating_props {
                Some(props) => (props.num, props.bgcolor),
                None => (None, None),
            };
            RecentMatch {
                match_id: entry.versus.and_then(|v| v.match_id),
                rating,
                rating_color,
            }
        })
        .collect()
}

fn parse_career_statistics(leagues: Vec<CareerStatsLeague>) -> Vec<CareerStatistic> {
    let mut out = Vec::new();
    for league in leagues {
        let name = league.name.unwrap_or_default();
        for season in league.seasons {
            // Seasons without a stats block carry nothing worth keeping.
            let Some(block) = season.stats.into_iter().next() else {
                continue;
            };
            out.push(CareerStatistic {
                name: name.clone(),
                season_start: block.start_ts.as_ref().and_then(as_i64_any),
                season_stats: parse_season_stats(block.stats_arr),
            });
        }
    }
    out
}

fn parse_season_stats(stats: Vec<Vec<Value>>) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    for stat in stats {
        let Some(Value::Object(mut last)) = stat.last().cloned() else {
            continue;
        };
        let Some(key) = last.get("key").and_then(|k| k.as_str()).map(str::to_string) else {
            continue;
        };
        let value = last.remove("value").unwrap_or(Value::Null);

        if key == RATING_STAT {
            out.insert(
                "rating".to_string(),
                value.get("num").cloned().unwrap_or(Value::Null),
            );
            out.insert(
                "rating_color".to_string(),
                value.get("bgcolor").cloned().unwrap_or(Value::Null),
            );
        } else if is_snake_key(&key) {
            out.insert(key, value);
        } else {
            let title = stat.first().and_then(|t| t.as_str()).unwrap_or(key.as_str());
            out.insert(prop_key(title), value);
        }
    }
    out
}

/// `^[a-z_][a-z0-9_]*$`
fn is_snake_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[derive(Debug, Deserialize)]
struct LeagueResponse {
    details: Option<LeagueDetails>,
    #[serde(default, deserialize_with = "u64_or_none")]
    id: Option<u64>,
    stats: Option<LeagueStats>,
    #[serde(default, deserialize_with = "shape_or_none")]
    table: Option<Vec<LeagueTable>>,
    #[serde(default, deserialize_with = "shape_or_none")]
    transfers: Option<LeagueTransfers>,
}

#[derive(Debug, Deserialize)]
struct LeagueDetails {
    #[serde(default, deserialize_with = "u64_or_none")]
    id: Option<u64>,
    #[serde(default, deserialize_with = "string_or_none")]
    name: Option<String>,
    #[serde(default, deserialize_with = "string_or_none")]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LeagueStats {
    #[serde(default, deserialize_with = "vec_or_default")]
    players: Vec<LeagueStatLink>,
    #[serde(rename = "seasonStatLinks", default, deserialize_with = "vec_or_default")]
    season_stat_links: Vec<LeagueSeasonLink>,
}

#[derive(Debug, Deserialize)]
struct LeagueStatLink {
    name: Option<String>,
    header: Option<String>,
    #[serde(rename = "fetchAllUrl")]
    fetch_all_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LeagueSeasonLink {
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "TotwRoundsLink", default, deserialize_with = "string_or_none")]
    totw_rounds_link: Option<String>,
    #[serde(rename = "TournamentId", default, deserialize_with = "u64_or_none")]
    tournament_id: Option<u64>,
    #[serde(rename = "RelativePath", default, deserialize_with = "string_or_none")]
    relative_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LeagueTable {
    data: Option<LeagueTableData>,
}

#[derive(Debug, Deserialize)]
struct LeagueTableData {
    table: Option<LeagueTableGroups>,
}

#[derive(Debug, Deserialize)]
struct LeagueTableGroups {
    #[serde(default, deserialize_with = "vec_or_default")]
    all: Vec<LeagueTableTeam>,
}

#[derive(Debug, Deserialize)]
struct LeagueTableTeam {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LeagueTransfers {
    #[serde(default, deserialize_with = "vec_or_default")]
    data: Vec<LeagueTransferEntry>,
}

#[derive(Debug, Deserialize)]
struct LeagueTransferEntry {
    #[serde(rename = "playerId", default, deserialize_with = "u64_or_none")]
    player_id: Option<u64>,
    #[serde(default, deserialize_with = "string_or_none")]
    name: Option<String>,
    #[serde(rename = "fromClub", default, deserialize_with = "string_or_none")]
    from_club: Option<String>,
    #[serde(rename = "toClub", default, deserialize_with = "string_or_none")]
    to_club: Option<String>,
    #[serde(rename = "transferDate", default, deserialize_with = "string_or_none")]
    transfer_date: Option<String>,
    #[serde(rename = "onLoan")]
    on_loan: Option<bool>,
    fee: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

pub fn normalize_league(raw: &Value) -> Result<LeagueSummary> {
    let data = LeagueResponse::deserialize(raw)
        .map_err(|err| Error::malformed("league payload", err.to_string()))?;

    let (details_id, name, country) = match data.details {
        Some(d) => (d.id, d.name, d.country),
        None => (None, None, None),
    };
    let id = details_id
        .or(data.id)
        .ok_or_else(|| Error::malformed("league payload", "details.id"))?;

    let (players, season_links) = match data.stats {
        Some(stats) => (stats.players, stats.season_stat_links),
        None => (Vec::new(), Vec::new()),
    };
    let stat_links = players
        .into_iter()
        .filter_map(|link| {
            Some(StatLink {
                fetch_all_url: link.fetch_all_url?,
                name: link.name.or(link.header).unwrap_or_default(),
            })
        })
        .collect();

    let mut seasons = BTreeMap::new();
    for link in season_links {
        let Some(name) = link.name else {
            continue;
        };
        let Some(year) = season_start_year(&name) else {
            debug!(league_id = id, name = %name, "season name has no leading year");
            continue;
        };
        // First listed season for a year wins.
        seasons.entry(year).or_insert(SeasonLink {
            name,
            totw_rounds_link: link.totw_rounds_link,
            tournament_id: link.tournament_id,
            relative_path: link.relative_path,
        });
    }

    let teams = data
        .table
        .and_then(|tables| tables.into_iter().next())
        .and_then(|t| t.data)
        .and_then(|d| d.table)
        .map(|groups| groups.all.into_iter().filter_map(|t| t.name).collect())
        .unwrap_or_default();

    let transfers = data
        .transfers
        .map(|t| t.data.into_iter().map(clean_transfer).collect())
        .unwrap_or_default();

    Ok(LeagueSummary {
        id,
        name,
        country,
        stat_links,
        seasons,
        teams,
        transfers,
    })
}

fn clean_transfer(entry: LeagueTransferEntry) -> Transfer {
    let mut extra = entry.extra;
    for field in TRANSFER_DISPLAY_FIELDS {
        extra.remove(*field);
    }
    let fee = match entry.fee {
        Some(Value::Object(fee)) if !fee.is_empty() => fee.get("value").cloned(),
        other => other,
    };
    Transfer {
        player_id: entry.player_id,
        name: entry.name,
        from_club: entry.from_club,
        to_club: entry.to_club,
        transfer_date: entry.transfer_date,
        on_loan: entry.on_loan,
        fee,
        extra,
    }
}

pub fn season_start_year(name: &str) -> Option<i32> {
    name.split('/').next()?.trim().parse::<i32>().ok()
}

/// 2023 -> "2023/2024".
pub fn season_label(start_year: i32) -> String {
    format!("{start_year}/{}", start_year.saturating_add(1))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn initialism_uses_first_letter_of_each_word() {
        assert_eq!(position_initialism("Centre Back"), "CB");
        assert_eq!(position_initialism("left wing back"), "LWB");
        assert_eq!(position_initialism("Striker"), "S");
        assert_eq!(position_initialism(""), "");
    }

    #[test]
    fn prop_keys_are_snake_case() {
        assert_eq!(prop_key("Market value"), "market_value");
        assert_eq!(prop_key("  Preferred   foot "), "preferred_foot");
    }

    #[test]
    fn season_year_reads_leading_component() {
        assert_eq!(season_start_year("2023/2024"), Some(2023));
        assert_eq!(season_start_year("2024"), Some(2024));
        assert_eq!(season_start_year("Spring"), None);
        assert_eq!(season_start_year(" 2019 / 2020"), Some(2019));
    }

    #[test]
    fn season_label_spans_two_years() {
        assert_eq!(season_label(2023), "2023/2024");
        assert_eq!(season_label(i32::MAX), format!("{}/{}", i32::MAX, i32::MAX));
    }

    #[test]
    fn snake_keys_follow_identifier_rules() {
        assert!(is_snake_key("goals"));
        assert!(is_snake_key("_xg_90"));
        assert!(!is_snake_key("Goals"));
        assert!(!is_snake_key("9lives"));
        assert!(!is_snake_key("expected goals"));
        assert!(!is_snake_key(""));
    }

    #[test]
    fn missing_required_key_is_malformed() {
        let raw = json!({"id": 1, "name": "X", "origin": {}, "playerProps": []});
        let err = normalize_player(&raw).unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedResponse { ref missing, .. } if missing == "careerHistory"
        ));
    }

    #[test]
    fn falls_back_to_primary_and_secondary_labels() {
        let raw = json!({
            "id": 5,
            "name": "Fallback",
            "origin": {
                "positionDesc": {
                    "primaryPosition": {"label": "Centre Back"},
                    "nonPrimaryPositions": [{"label": "Right Back"}]
                }
            },
            "playerProps": [],
            "careerHistory": {"fullCareer": false}
        });
        let record = normalize_player(&raw).expect("valid payload");
        assert_eq!(record.positions_label(), "CB/RB");
        assert!(record.positions[0].main);
        assert!(record.clubs.is_empty());
        assert_eq!(record.on_loan, None);
        assert_eq!(record.team_id, None);
    }

    #[test]
    fn prop_value_prefers_key_over_fallback() {
        let raw = json!({
            "id": 9,
            "name": "Props",
            "origin": {},
            "playerProps": [
                {"title": "Age", "value": {"key": null, "fallback": 23}},
                {"title": "Country", "value": {"key": "England", "fallback": "ENG"}, "countryCode": "ENG"},
                {"title": "Name", "value": {"key": "Shadow", "fallback": null}}
            ],
            "careerHistory": {"fullCareer": false}
        });
        let record = normalize_player(&raw).expect("valid payload");
        assert_eq!(record.prop("age"), Some(&json!(23)));
        assert_eq!(record.prop_string("country").as_deref(), Some("England"));
        assert_eq!(record.prop_string("country_code").as_deref(), Some("ENG"));
        assert_eq!(record.name, "Props");
        assert!(!record.extra.contains_key("name"));
    }

    #[test]
    fn odd_recent_matches_shape_is_ignored() {
        let raw = json!({
            "id": 3,
            "name": "Odd",
            "origin": {},
            "playerProps": [],
            "careerHistory": {"fullCareer": false},
            "recentMatches": "unavailable",
            "careerStatistics": {"not": "a list"}
        });
        let record = normalize_player(&raw).expect("valid payload");
        assert!(record.recent_matches.is_empty());
        assert!(record.career_statistics.is_empty());
    }

    #[test]
    fn transfer_fee_is_reduced_to_its_value() {
        let raw = json!({
            "details": {"id": 1},
            "transfers": {"data": [
                {
                    "name": "A",
                    "playerId": 10,
                    "fee": {"feeText": "fee", "value": 25000000},
                    "position": {"label": "CB"},
                    "transferText": ["x"],
                    "transferType": {"text": "transfer"},
                    "marketValue": 20000000
                },
                {"name": "B", "fee": null, "onLoan": true}
            ]}
        });
        let league = normalize_league(&raw).expect("league");
        assert_eq!(league.transfers.len(), 2);
        let first = &league.transfers[0];
        assert_eq!(first.player_id, Some(10));
        assert_eq!(first.fee, Some(json!(25000000)));
        assert!(!first.extra.contains_key("position"));
        assert!(!first.extra.contains_key("transferText"));
        assert!(!first.extra.contains_key("transferType"));
        assert_eq!(first.extra.get("marketValue"), Some(&json!(20000000)));
        assert_eq!(league.transfers[1].fee, None);
        assert_eq!(league.transfers[1].on_loan, Some(true));
    }
}
