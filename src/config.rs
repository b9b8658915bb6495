use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_HOST: &str = "https://www.fotmob.com/api";
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_DB_PATH: &str = "./fotmob.sqlite";
const DEFAULT_TIME_ZONE: &str = "America/Los_Angeles";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub views_dir: PathBuf,
    pub time_zone: String,
    pub request_timeout: Duration,
    pub round_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from(DEFAULT_DATA_DIR);
        Self {
            api_host: DEFAULT_API_HOST.to_string(),
            views_dir: data_dir.join("views"),
            data_dir,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            time_zone: DEFAULT_TIME_ZONE.to_string(),
            request_timeout: Duration::from_secs(10),
            round_delay: Duration::from_millis(100),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Config::default();

        let data_dir = env_path("TOTW_DATA_DIR").unwrap_or(defaults.data_dir);
        let views_dir = env_path("TOTW_VIEWS_DIR").unwrap_or_else(|| data_dir.join("views"));
        let timeout_secs = env_u64("TOTW_REQUEST_TIMEOUT_SECS")
            .unwrap_or(defaults.request_timeout.as_secs())
            .clamp(1, 120);
        let delay_ms = env_u64("TOTW_ROUND_DELAY_MS")
            .unwrap_or(defaults.round_delay.as_millis() as u64)
            .min(5_000);

        Self {
            api_host: env_string("TOTW_API_HOST")
                .map(|host| host.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_host),
            db_path: env_path("TOTW_DB_PATH").unwrap_or(defaults.db_path),
            time_zone: env_string("TOTW_TIME_ZONE").unwrap_or(defaults.time_zone),
            request_timeout: Duration::from_secs(timeout_secs),
            round_delay: Duration::from_millis(delay_ms),
            data_dir,
            views_dir,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    let raw = env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    env_string(key).map(PathBuf::from)
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key).and_then(|v| v.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_views_under_data_dir() {
        let cfg = Config::default();
        assert_eq!(cfg.views_dir, PathBuf::from("./data").join("views"));
        assert_eq!(cfg.round_delay, Duration::from_millis(100));
        assert_eq!(cfg.api_host, DEFAULT_API_HOST);
    }
}
