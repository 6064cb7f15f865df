use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::path::Path;

use super::{HistoryBackend, Solve, SolveId, StoreError, UserId};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS solves (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        elapsed_ms INTEGER NOT NULL,
        recorded_at TEXT NOT NULL
    )
"#;

/// Solve collection persisted in SQLite, one row per solve
#[derive(Debug)]
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Open (or create) the database at `path`, creating parent directories
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(SCHEMA, [])?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_solves_user ON solves(user_id)",
            [],
        )?;
        Ok(Self { conn })
    }
}

impl HistoryBackend for SqliteBackend {
    fn insert(
        &mut self,
        user: &UserId,
        elapsed_ms: u64,
        recorded_at: DateTime<Utc>,
    ) -> Result<SolveId, StoreError> {
        self.conn.execute(
            "INSERT INTO solves (user_id, elapsed_ms, recorded_at) VALUES (?1, ?2, ?3)",
            params![
                user.as_str(),
                elapsed_ms,
                recorded_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            ],
        )?;
        Ok(SolveId(self.conn.last_insert_rowid()))
    }

    fn list(&self, user: &UserId) -> Result<Vec<Solve>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, elapsed_ms, recorded_at FROM solves WHERE user_id = ?1")?;

        let rows = stmt.query_map([user.as_str()], |row| {
            let recorded_at: String = row.get(2)?;
            let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
                .map_err(|_| {
                    rusqlite::Error::InvalidColumnType(
                        2,
                        "recorded_at".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })?
                .with_timezone(&Utc);

            Ok(Solve {
                id: Some(SolveId(row.get(0)?)),
                elapsed_ms: row.get(1)?,
                recorded_at: Some(recorded_at),
            })
        })?;

        let mut solves = Vec::new();
        for solve in rows {
            solves.push(solve?);
        }
        Ok(solves)
    }

    fn delete(&mut self, user: &UserId, id: SolveId) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM solves WHERE id = ?1 AND user_id = ?2",
            params![id.0, user.as_str()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn insert_and_list_roundtrip() {
        let mut db = SqliteBackend::open_in_memory().unwrap();
        let user = UserId::new("racer");
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();

        let id = db.insert(&user, 9876, at).unwrap();
        let list = db.list(&user).unwrap();

        assert_eq!(
            list,
            vec![Solve {
                id: Some(id),
                elapsed_ms: 9876,
                recorded_at: Some(at),
            }]
        );
    }

    #[test]
    fn list_only_returns_own_records() {
        let mut db = SqliteBackend::open_in_memory().unwrap();
        let a = UserId::new("a");
        let b = UserId::new("b");
        db.insert(&a, 1, Utc::now()).unwrap();
        db.insert(&b, 2, Utc::now()).unwrap();
        db.insert(&b, 3, Utc::now()).unwrap();

        assert_eq!(db.list(&a).unwrap().len(), 1);
        assert_eq!(db.list(&b).unwrap().len(), 2);
    }

    #[test]
    fn delete_is_scoped_to_owner() {
        let mut db = SqliteBackend::open_in_memory().unwrap();
        let a = UserId::new("a");
        let b = UserId::new("b");
        let id = db.insert(&a, 1, Utc::now()).unwrap();

        db.delete(&b, id).unwrap();
        assert_eq!(db.list(&a).unwrap().len(), 1);

        db.delete(&a, id).unwrap();
        assert!(db.list(&a).unwrap().is_empty());
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("history.db");
        let user = UserId::new("u");

        {
            let mut db = SqliteBackend::open(&path).unwrap();
            db.insert(&user, 42, Utc::now()).unwrap();
        }

        let db = SqliteBackend::open(&path).unwrap();
        assert_eq!(db.list(&user).unwrap()[0].elapsed_ms, 42);
    }
}
