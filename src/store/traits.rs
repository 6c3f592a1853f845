//! Task store contract — row types and the async trait every backend
//! implements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// Lifecycle state of a decompilation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Waiting to be claimed.
    Pending,
    /// Claimed by a worker; outcome not yet recorded.
    InFlight,
    /// Terminal success; `decompiled_source` is present.
    Completed,
    /// Terminal failure; `error_message` is present.
    Failed,
}

/// A persisted decompilation task.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: i64,
    pub class_name: String,
    pub symbol_name: String,
    pub assembly_code: String,
    pub status: TaskStatus,
    pub retries: u32,
    pub decompiled_source: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A task to insert at seeding time. `(class_name, symbol_name)` is the
/// stable identity; duplicates are ignored on insert.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub class_name: String,
    pub symbol_name: String,
    pub assembly_code: String,
}

/// Completion counters for the progress reporter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Progress {
    pub completed: u64,
    pub total: u64,
}

/// Backend-agnostic store for the durable work queue.
///
/// All mutations are transactional; `claim` in particular is serialized
/// against concurrent claimers so two callers never receive the same row.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a batch of new tasks atomically, skipping duplicates.
    /// Returns the number of rows actually inserted.
    async fn seed(&self, tasks: &[NewTask]) -> Result<u64, StoreError>;

    /// Move every in-flight row back to pending. Recovery for work orphaned
    /// by an ungraceful shutdown; returns the number of rows recovered.
    async fn reset_in_flight(&self) -> Result<u64, StoreError>;

    /// Atomically claim up to `batch_size` pending tasks, flipping them to
    /// in-flight. Returns the rows as read at claim time, in ascending id
    /// order; empty when no pending work remains. Never blocks on an empty
    /// queue.
    async fn claim(&self, batch_size: usize) -> Result<Vec<Task>, StoreError>;

    /// Record a terminal success with the decompiled source.
    async fn complete(&self, id: i64, source: &str) -> Result<(), StoreError>;

    /// Record a terminal failure. The store does not interpret `retries`;
    /// the caller decides the value.
    async fn fail(&self, id: i64, error: &str, retries: u32) -> Result<(), StoreError>;

    /// Read-only completion counters.
    async fn progress(&self) -> Result<Progress, StoreError>;

    /// All completed rows with a source, ordered by `(class_name,
    /// symbol_name)` so assembly output is deterministic.
    async fn completed_tasks(&self) -> Result<Vec<Task>, StoreError>;
}
