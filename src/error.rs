use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("malformed {what}: missing `{missing}`")]
    MalformedResponse { what: String, missing: String },

    #[error("cache file {path} is unreadable: {message}")]
    CacheCorrupt { path: PathBuf, message: String },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("player store: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("csv error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("xlsx export: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(what: impl Into<String>, missing: impl Into<String>) -> Self {
        Error::MalformedResponse {
            what: what.into(),
            missing: missing.into(),
        }
    }

    /// Per-item failures that batch loops log and skip. Anything else is a
    /// resource failure and ends the run.
    pub fn is_item_failure(&self) -> bool {
        matches!(
            self,
            Error::Network { .. } | Error::NotFound { .. } | Error::MalformedResponse { .. }
        )
    }
}
