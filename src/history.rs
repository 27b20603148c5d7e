//! Command history: one record per dispatched invocation.
//!
//! Guests share an in-memory log under [`GUEST_ID`]; registered users are
//! written to the persistent store.

use crate::store::StoreError;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Actor id reserved for the unauthenticated guest.
pub const GUEST_ID: i64 = -1;

/// A recorded invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandHistory {
    pub id: i64,
    pub user_id: i64,
    pub command: String,
    pub created_at: DateTime<Utc>,
}

/// How many times a command line was run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStats {
    pub command: String,
    pub count: u64,
}

/// Storage operations on history records.
pub trait HistoryRepository: Send + Sync {
    fn save_command(&self, user_id: i64, command: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
    /// Newest first; `limit == 0` means no limit.
    fn user_history(&self, user_id: i64, limit: usize) -> Result<Vec<CommandHistory>, StoreError>;
    /// Per-command counts, most recently used command first.
    fn user_command_stats(&self, user_id: i64) -> Result<Vec<CommandStats>, StoreError>;
    fn clear_user_history(&self, user_id: i64) -> Result<(), StoreError>;
}

/// Routes history operations to the guest cache or the persistent store.
pub struct HistoryService {
    history_repo: Arc<dyn HistoryRepository>,
    guest_cache: Arc<dyn HistoryRepository>,
    guest_id: i64,
}

impl HistoryService {
    pub fn new(history_repo: Arc<dyn HistoryRepository>, guest_cache: Arc<dyn HistoryRepository>) -> Self {
        Self {
            history_repo,
            guest_cache,
            guest_id: GUEST_ID,
        }
    }

    fn route(&self, actor: Option<i64>) -> (&dyn HistoryRepository, i64) {
        match actor {
            Some(id) => (self.history_repo.as_ref(), id),
            None => (self.guest_cache.as_ref(), self.guest_id),
        }
    }

    pub fn save_command_history(&self, actor: Option<i64>, text: &str) -> Result<(), StoreError> {
        let (repo, user_id) = self.route(actor);
        debug!(user_id, command = %text, "recording history");
        repo.save_command(user_id, text, Utc::now())
    }

    /// Usage counts for `actor`, truncated to `limit` entries when non-zero.
    pub fn command_history_stats(&self, actor: Option<i64>, limit: usize) -> Result<Vec<CommandStats>, StoreError> {
        let (repo, user_id) = self.route(actor);
        let mut stats = repo.user_command_stats(user_id)?;
        if limit > 0 {
            stats.truncate(limit);
        }
        Ok(stats)
    }

    /// Recorded invocations of `actor`, newest first; `limit == 0` means all.
    pub fn recent_commands(&self, actor: Option<i64>, limit: usize) -> Result<Vec<CommandHistory>, StoreError> {
        let (repo, user_id) = self.route(actor);
        repo.user_history(user_id, limit)
    }

    pub fn clear_command_history(&self, actor: Option<i64>) -> Result<(), StoreError> {
        let (repo, user_id) = self.route(actor);
        repo.clear_user_history(user_id)
    }
}

#[derive(Default)]
struct MemoryLog {
    last_id: i64,
    records: HashMap<i64, VecDeque<CommandHistory>>,
}

/// History kept only for the lifetime of the process.
///
/// Each user keeps at most `capacity` records, oldest evicted first.
pub struct InMemoryHistoryRepository {
    log: Mutex<MemoryLog>,
    capacity: usize,
}

impl InMemoryHistoryRepository {
    /// `capacity == 0` keeps everything.
    pub fn new(capacity: usize) -> Self {
        Self {
            log: Mutex::new(MemoryLog::default()),
            capacity,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryLog>, StoreError> {
        self.log.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl HistoryRepository for InMemoryHistoryRepository {
    fn save_command(&self, user_id: i64, command: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut log = self.lock()?;
        log.last_id += 1;
        let record = CommandHistory {
            id: log.last_id,
            user_id,
            command: command.to_string(),
            created_at: at,
        };

        let records = log.records.entry(user_id).or_default();
        records.push_back(record);
        if self.capacity > 0 {
            while records.len() > self.capacity {
                records.pop_front();
            }
        }
        Ok(())
    }

    fn user_history(&self, user_id: i64, limit: usize) -> Result<Vec<CommandHistory>, StoreError> {
        let log = self.lock()?;
        let Some(records) = log.records.get(&user_id) else {
            return Ok(Vec::new());
        };
        let take = if limit == 0 { records.len() } else { limit };
        Ok(records.iter().rev().take(take).cloned().collect())
    }

    fn user_command_stats(&self, user_id: i64) -> Result<Vec<CommandStats>, StoreError> {
        let log = self.lock()?;
        let Some(records) = log.records.get(&user_id) else {
            return Ok(Vec::new());
        };

        // command -> (count, id of the latest run)
        let mut counts: HashMap<&str, (u64, i64)> = HashMap::new();
        for record in records {
            let entry = counts.entry(record.command.as_str()).or_insert((0, record.id));
            entry.0 += 1;
            entry.1 = entry.1.max(record.id);
        }

        let mut stats: Vec<_> = counts.into_iter().collect();
        stats.sort_by(|a, b| b.1.1.cmp(&a.1.1));
        Ok(stats
            .into_iter()
            .map(|(command, (count, _))| CommandStats {
                command: command.to_string(),
                count,
            })
            .collect())
    }

    fn clear_user_history(&self, user_id: i64) -> Result<(), StoreError> {
        self.lock()?.records.remove(&user_id);
        Ok(())
    }
}
