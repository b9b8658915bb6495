use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::json::{string_or_none, vec_or_default};
use crate::model::RoundBlob;
use crate::normalize::normalize_league;
use crate::remote::{LeagueParams, RemoteClient, round_id_from_link};

/// Write-once TOTW cache: one JSON document per (league, season) under
/// `<data-root>/totw/<league>/<season>.json`. Delete a file to force a refetch.
#[derive(Debug, Clone)]
pub struct RoundCache {
    root: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RoundsIndex {
    #[serde(default, deserialize_with = "vec_or_default")]
    rounds: Vec<RoundsIndexEntry>,
}

#[derive(Debug, Deserialize)]
struct RoundsIndexEntry {
    #[serde(default, deserialize_with = "string_or_none")]
    link: Option<String>,
    #[serde(rename = "roundId", default, deserialize_with = "string_or_none")]
    round_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub rounds_listed: usize,
    pub rounds_fetched: usize,
    pub errors: Vec<String>,
}

impl RoundCache {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            root: data_root.into(),
        }
    }

    pub fn path(&self, league_id: u64, season_year: i32) -> PathBuf {
        self.root
            .join("totw")
            .join(league_id.to_string())
            .join(format!("{season_year}.json"))
    }

    pub fn load(&self, league_id: u64, season_year: i32) -> Result<Option<Vec<RoundBlob>>> {
        let path = self.path(league_id, season_year);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Error::io(&path, err)),
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let blobs: Vec<RoundBlob> =
            serde_json::from_str(&raw).map_err(|err| Error::CacheCorrupt {
                path: path.clone(),
                message: err.to_string(),
            })?;
        if blobs.is_empty() {
            return Ok(None);
        }
        Ok(Some(blobs))
    }

    pub fn store(&self, league_id: u64, season_year: i32, blobs: &[RoundBlob]) -> Result<()> {
        let path = self.path(league_id, season_year);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|err| Error::io(dir, err))?;
        }
        let json = serde_json::to_string(blobs).map_err(|err| Error::CacheCorrupt {
            path: path.clone(),
            message: format!("serialize rounds: {err}"),
        })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|err| Error::io(&tmp, err))?;
        fs::rename(&tmp, &path).map_err(|err| Error::io(&path, err))?;
        Ok(())
    }

    pub fn load_or_build<R: RemoteClient>(
        &self,
        client: &R,
        league_id: u64,
        season_year: i32,
        delay: Duration,
    ) -> Result<Vec<RoundBlob>> {
        if let Some(blobs) = self.load(league_id, season_year)? {
            return Ok(blobs);
        }

        let (blobs, report) = build_season_rounds(client, league_id, season_year, delay)?;
        info!(
            league_id,
            season_year,
            fetched = report.rounds_fetched,
            listed = report.rounds_listed,
            failed = report.errors.len(),
            "season rounds fetched"
        );
        if !blobs.is_empty() {
            self.store(league_id, season_year, &blobs)?;
        }
        Ok(blobs)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Walks league metadata -> rounds index -> every round, in order. Item-level
/// failures end up in the report; resource failures propagate.
pub fn build_season_rounds<R: RemoteClient>(
    client: &R,
    league_id: u64,
    season_year: i32,
    delay: Duration,
) -> Result<(Vec<RoundBlob>, BuildReport)> {
    let mut report = BuildReport::default();

    let params = LeagueParams::overview(client.time_zone());
    let league = match client
        .fetch_league(league_id, &params)
        .and_then(|raw| normalize_league(&raw))
    {
        Ok(league) => league,
        Err(err) if err.is_item_failure() => {
            warn!(league_id, error = %err, "league metadata unavailable");
            report.errors.push(format!("league {league_id}: {err}"));
            return Ok((Vec::new(), report));
        }
        Err(err) => return Err(err),
    };

    let Some(rounds_link) = league
        .season(season_year)
        .and_then(|s| s.totw_rounds_link.clone())
    else {
        warn!(league_id, season_year, "no TOTW rounds link for season");
        report
            .errors
            .push(format!("season {season_year}: no rounds link"));
        return Ok((Vec::new(), report));
    };

    info!(league_id, season_year, url = %rounds_link, "fetching TOTW rounds index");
    let index = match client.fetch_round(&rounds_link) {
        Ok(index) => index,
        Err(err) if err.is_item_failure() => {
            warn!(url = %rounds_link, error = %err, "rounds index unavailable");
            report.errors.push(format!("rounds index: {err}"));
            return Ok((Vec::new(), report));
        }
        Err(err) => return Err(err),
    };

    let listed = match RoundsIndex::deserialize(&index) {
        Ok(index) => index.rounds,
        Err(err) => {
            warn!(url = %rounds_link, error = %err, "rounds index unreadable");
            report.errors.push(format!("rounds index: {err}"));
            return Ok((Vec::new(), report));
        }
    };
    report.rounds_listed = listed.len();

    let mut blobs = Vec::new();
    let mut attempted = 0usize;
    for (idx, entry) in listed.into_iter().enumerate() {
        let Some(link) = entry.link else {
            report.errors.push(format!("round #{idx}: missing link"));
            continue;
        };
        let round = round_id_from_link(&link)
            .or(entry.round_id)
            .unwrap_or_else(|| (idx + 1).to_string());

        if attempted > 0 && !delay.is_zero() {
            std::thread::sleep(delay);
        }
        attempted += 1;

        match client.fetch_round(&link) {
            Ok(body) => {
                info!(league_id, season_year, round = %round, "TOTW round fetched");
                blobs.push(round_blob(round, body));
                report.rounds_fetched += 1;
            }
            Err(err) if err.is_item_failure() => {
                warn!(round = %round, url = %link, error = %err, "round skipped");
                report.errors.push(format!("round {round}: {err}"));
            }
            Err(err) => return Err(err),
        }
    }

    Ok((blobs, report))
}

fn round_blob(round: String, body: Value) -> RoundBlob {
    let mut rest = match body {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    rest.remove("round");
    let players = match rest.remove("players") {
        Some(Value::Array(list)) => list,
        _ => Vec::new(),
    };
    RoundBlob {
        round,
        players,
        rest,
    }
}
