use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use super::{HistoryBackend, Solve, SolveId, StoreError, UserId};

#[derive(Debug, Default)]
struct Faults {
    fail_inserts: bool,
    fail_lists: bool,
    fail_deletes: HashSet<SolveId>,
}

/// In-memory collection with switchable failures, for tests and dry runs.
///
/// Clones share the same records and fault switches, so a test can keep a
/// handle after moving the backend into a [`super::HistoryStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    records: Arc<Mutex<BTreeMap<SolveId, (UserId, Solve)>>>,
    faults: Arc<Mutex<Faults>>,
    next_id: Arc<Mutex<i64>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_inserts(&self, fail: bool) {
        if let Ok(mut f) = self.faults.lock() {
            f.fail_inserts = fail;
        }
    }

    pub fn fail_lists(&self, fail: bool) {
        if let Ok(mut f) = self.faults.lock() {
            f.fail_lists = fail;
        }
    }

    pub fn fail_delete_of(&self, id: SolveId) {
        if let Ok(mut f) = self.faults.lock() {
            f.fail_deletes.insert(id);
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> StoreError {
        StoreError::Rejected("memory backend lock poisoned".to_string())
    }
}

impl HistoryBackend for MemoryBackend {
    fn insert(
        &mut self,
        user: &UserId,
        elapsed_ms: u64,
        recorded_at: DateTime<Utc>,
    ) -> Result<SolveId, StoreError> {
        if self.faults.lock().map_err(|_| Self::poisoned())?.fail_inserts {
            return Err(StoreError::Rejected("insert refused".to_string()));
        }

        let mut next_id = self.next_id.lock().map_err(|_| Self::poisoned())?;
        *next_id += 1;
        let id = SolveId(*next_id);

        let solve = Solve {
            id: Some(id),
            elapsed_ms,
            recorded_at: Some(recorded_at),
        };
        self.records
            .lock()
            .map_err(|_| Self::poisoned())?
            .insert(id, (user.clone(), solve));
        Ok(id)
    }

    fn list(&self, user: &UserId) -> Result<Vec<Solve>, StoreError> {
        if self.faults.lock().map_err(|_| Self::poisoned())?.fail_lists {
            return Err(StoreError::Rejected("read refused".to_string()));
        }

        Ok(self
            .records
            .lock()
            .map_err(|_| Self::poisoned())?
            .values()
            .filter(|(owner, _)| owner == user)
            .map(|(_, solve)| solve.clone())
            .collect())
    }

    fn delete(&mut self, user: &UserId, id: SolveId) -> Result<(), StoreError> {
        if self
            .faults
            .lock()
            .map_err(|_| Self::poisoned())?
            .fail_deletes
            .contains(&id)
        {
            return Err(StoreError::Rejected(format!("delete of {} refused", id.0)));
        }

        let mut records = self.records.lock().map_err(|_| Self::poisoned())?;
        if records.get(&id).is_some_and(|(owner, _)| owner == user) {
            records.remove(&id);
        }
        Ok(())
    }
}
