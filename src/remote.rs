use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CACHE_CONTROL, USER_AGENT};
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeagueParams {
    pub tab: String,
    pub kind: String,
    pub time_zone: String,
}

impl LeagueParams {
    pub fn overview(time_zone: &str) -> Self {
        Self {
            tab: "overview".to_string(),
            kind: "league".to_string(),
            time_zone: time_zone.to_string(),
        }
    }
}

/// Raw access to the statistics API. No caching and no retries happen at this
/// layer; callers own both.
pub trait RemoteClient {
    fn fetch_player(&self, id: u64) -> Result<Value>;
    fn fetch_league(&self, id: u64, params: &LeagueParams) -> Result<Value>;
    fn fetch_round(&self, url: &str) -> Result<Value>;
    fn time_zone(&self) -> &str;
}

impl<T: RemoteClient + ?Sized> RemoteClient for &T {
    fn fetch_player(&self, id: u64) -> Result<Value> {
        (**self).fetch_player(id)
    }

    fn fetch_league(&self, id: u64, params: &LeagueParams) -> Result<Value> {
        (**self).fetch_league(id, params)
    }

    fn fetch_round(&self, url: &str) -> Result<Value> {
        (**self).fetch_round(url)
    }

    fn time_zone(&self) -> &str {
        (**self).time_zone()
    }
}

pub struct FotmobClient {
    client: Client,
    api_host: String,
    time_zone: String,
}

impl FotmobClient {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_host(&config.api_host, &config.time_zone, config.request_timeout)
    }

    pub fn with_host(api_host: &str, time_zone: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| Error::Network {
                url: api_host.to_string(),
                message: format!("failed to build http client: {err}"),
            })?;
        Ok(Self {
            client,
            api_host: api_host.trim_end_matches('/').to_string(),
            time_zone: time_zone.to_string(),
        })
    }

    fn get_json(&self, url: &str, query: &[(&str, String)], what: &str) -> Result<Value> {
        debug!(url, "GET");
        let resp = self
            .client
            .get(url)
            .query(query)
            .header(USER_AGENT, "Mozilla/5.0")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .map_err(|err| network(url, err))?;
        let status = resp.status();
        let body = resp.text().map_err(|err| network(url, err))?;
        if !status.is_success() {
            return Err(Error::Network {
                url: url.to_string(),
                message: format!("http {status}"),
            });
        }
        parse_body(&body, url, what)
    }
}

impl RemoteClient for FotmobClient {
    fn fetch_player(&self, id: u64) -> Result<Value> {
        let url = format!("{}/playerData", self.api_host);
        self.get_json(&url, &[("id", id.to_string())], &format!("player {id}"))
    }

    fn fetch_league(&self, id: u64, params: &LeagueParams) -> Result<Value> {
        let url = format!("{}/leagues", self.api_host);
        let query = [
            ("id", id.to_string()),
            ("tab", params.tab.clone()),
            ("type", params.kind.clone()),
            ("timeZone", params.time_zone.clone()),
        ];
        self.get_json(&url, &query, &format!("league {id}"))
    }

    fn fetch_round(&self, url: &str) -> Result<Value> {
        self.get_json(url, &[], url)
    }

    fn time_zone(&self) -> &str {
        &self.time_zone
    }
}

fn network(url: &str, err: reqwest::Error) -> Error {
    Error::Network {
        url: url.to_string(),
        message: err.to_string(),
    }
}

/// An empty body or a bare `null` means the remote has nothing for this id.
pub fn parse_body(body: &str, url: &str, what: &str) -> Result<Value> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Err(Error::NotFound {
            what: what.to_string(),
        });
    }
    let value: Value = serde_json::from_str(trimmed).map_err(|err| Error::Network {
        url: url.to_string(),
        message: format!("invalid json: {err}"),
    })?;
    match &value {
        Value::Object(map) if map.is_empty() => Err(Error::NotFound {
            what: what.to_string(),
        }),
        _ => Ok(value),
    }
}

pub fn round_id_from_link(link: &str) -> Option<String> {
    let url = reqwest::Url::parse(link).ok()?;
    url.query_pairs()
        .find(|(k, _)| k.eq_ignore_ascii_case("roundid"))
        .map(|(_, v)| v.into_owned())
}
