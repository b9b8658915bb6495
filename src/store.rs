use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::PlayerRecord;
use crate::normalize::normalize_player;
use crate::remote::RemoteClient;

/// Single-file player document store. One process, one writer.
pub struct LocalStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl LocalStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
        }
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, id: u64) -> Result<Option<PlayerRecord>> {
        let document = self
            .conn
            .query_row(
                "SELECT document FROM players WHERE id = ?1",
                params![id as i64],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        let Some(document) = document else {
            return Ok(None);
        };
        let record = serde_json::from_str::<PlayerRecord>(&document).map_err(|err| {
            Error::CacheCorrupt {
                path: self.display_path(),
                message: format!("player {id}: {err}"),
            }
        })?;
        Ok(Some(record))
    }

    pub fn upsert(&self, record: &PlayerRecord) -> Result<()> {
        let document = serde_json::to_string(record).map_err(|err| Error::CacheCorrupt {
            path: self.display_path(),
            message: format!("serialize player {}: {err}", record.id),
        })?;
        self.conn.execute(
            r#"
            INSERT INTO players (id, name, document, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                document = excluded.document,
                updated_at = excluded.updated_at
            "#,
            params![
                record.id as i64,
                record.name,
                document,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM players", [], |row| row.get::<_, i64>(0))?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn ids(&self) -> Result<Vec<u64>> {
        let mut stmt = self.conn.prepare("SELECT id FROM players ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row? as u64);
        }
        Ok(out)
    }

    /// Store hit, or fetch + normalize + upsert on a miss. Item-level failures
    /// are logged and come back as `None`; store failures propagate.
    pub fn get_or_fetch<R: RemoteClient>(
        &self,
        client: &R,
        id: u64,
    ) -> Result<Option<PlayerRecord>> {
        if let Some(record) = self.get(id)? {
            return Ok(Some(record));
        }

        info!(player_id = id, "fetching player from api");
        let fetched = client
            .fetch_player(id)
            .and_then(|raw| normalize_player(&raw));
        let record = match fetched {
            Ok(record) => record,
            Err(err) if err.is_item_failure() => {
                warn!(player_id = id, error = %err, "player skipped");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        if record.id != id {
            warn!(
                player_id = id,
                fetched_id = record.id,
                "fetched player id does not match the requested id"
            );
            return Ok(None);
        }

        self.upsert(&record)?;
        Ok(Some(record))
    }

    fn display_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from(":memory:"))
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS players (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            document TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_players_name ON players(name);
        "#,
    )?;
    Ok(())
}
