pub mod memory;
pub mod sqlite;
pub mod store;
pub mod view;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;
pub use store::{HistoryStore, StoreSink, Subscription};
pub use view::{newest_first, HistoryView};

/// Opaque identity the history is scoped to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store-assigned record id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SolveId(pub i64);

/// One completed solve.
///
/// `id` and `recorded_at` stay empty while the write is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solve {
    pub id: Option<SolveId>,
    pub elapsed_ms: u64,
    pub recorded_at: Option<DateTime<Utc>>,
}

impl Solve {
    pub fn pending(elapsed_ms: u64) -> Self {
        Self {
            id: None,
            elapsed_ms,
            recorded_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.recorded_at.is_none()
    }

    /// Ordering key: server time in millis, or 0 for records without one
    pub fn order_key(&self) -> i64 {
        self.recorded_at.map_or(0, |t| t.timestamp_millis())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not signed in; solve kept locally")]
    NoIdentity,
    #[error("database error: {0}")]
    Backend(#[from] rusqlite::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cleared {deleted} solves but {failed} could not be deleted")]
    PartialClear { deleted: usize, failed: usize },
    #[error("history store is not running")]
    Unavailable,
    #[error("store rejected the request: {0}")]
    Rejected(String),
}

/// A per-user collection of solve documents.
///
/// Implementations only need single-record operations; the adapter in
/// [`store`] layers subscriptions and bulk clearing on top.
pub trait HistoryBackend: Send {
    fn insert(
        &mut self,
        user: &UserId,
        elapsed_ms: u64,
        recorded_at: DateTime<Utc>,
    ) -> Result<SolveId, StoreError>;

    /// Every record for `user`, in no particular order
    fn list(&self, user: &UserId) -> Result<Vec<Solve>, StoreError>;

    fn delete(&mut self, user: &UserId, id: SolveId) -> Result<(), StoreError>;
}
