//! libSQL task store — durable backend for the work queue.
//!
//! One connection is shared by all workers. Mutating statements take a
//! store-level async lock so a single-statement update can never interleave
//! into an open claim transaction; the claim itself runs SELECT + UPDATE
//! inside one immediate transaction, which keeps concurrent claimers
//! disjoint and makes the pending → in-flight flip atomic across crashes.
//! Read-only queries (`progress`) take no lock.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{params, Connection, TransactionBehavior};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::migrations;
use crate::store::traits::{NewTask, Progress, Task, TaskStatus, TaskStore};

/// libSQL-backed task store.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<libsql::Database>,
    conn: Connection,
    write_lock: Mutex<()>,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!("Failed to create database directory: {e}"))
                })?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to open database: {e}")))?;

        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Task store opened");
        Ok(store)
    }

    /// Create an in-memory store (for tests).
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Unavailable(format!("Failed to create in-memory database: {e}"))
            })?;

        Self::from_database(db).await
    }

    async fn from_database(db: libsql::Database) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::Unavailable(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        };
        migrations::run_migrations(&store.conn).await?;
        Ok(store)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn count(&self, sql: &str) -> Result<u64, StoreError> {
        let mut rows = self
            .conn()
            .query(sql, ())
            .await
            .map_err(|e| StoreError::Query(format!("count: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("count parse: {e}")))?;
                Ok(count as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(StoreError::Query(format!("count: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    // datetime('now') output, with and without fractional seconds
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn status_to_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::InFlight => "in_flight",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
    }
}

fn str_to_status(s: &str) -> TaskStatus {
    match s {
        "in_flight" => TaskStatus::InFlight,
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        _ => TaskStatus::Pending,
    }
}

const TASK_COLUMNS: &str = "id, class_name, symbol_name, assembly_code, status, retries, decompiled_source, error_message, created_at, updated_at";

/// Map a libsql Row to a Task. Column order matches TASK_COLUMNS.
fn row_to_task(row: &libsql::Row) -> Result<Task, libsql::Error> {
    let status_str: String = row.get(4)?;
    let created_str: String = row.get(8)?;
    let updated_str: String = row.get(9)?;

    Ok(Task {
        id: row.get(0)?,
        class_name: row.get(1)?,
        symbol_name: row.get(2)?,
        assembly_code: row.get(3)?,
        status: str_to_status(&status_str),
        retries: row.get::<i64>(5)? as u32,
        decompiled_source: row.get(6).ok(),
        error_message: row.get(7).ok(),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl TaskStore for LibSqlStore {
    async fn seed(&self, tasks: &[NewTask]) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();

        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| StoreError::Unavailable(format!("seed: begin transaction: {e}")))?;

        let mut inserted = 0u64;
        for task in tasks {
            inserted += tx
                .execute(
                    "INSERT OR IGNORE INTO decompilation_tasks
                        (class_name, symbol_name, assembly_code, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                    params![
                        task.class_name.clone(),
                        task.symbol_name.clone(),
                        task.assembly_code.clone(),
                        status_to_str(TaskStatus::Pending),
                        now.clone(),
                    ],
                )
                .await
                .map_err(|e| StoreError::Query(format!("seed {}: {e}", task.symbol_name)))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Query(format!("seed: commit: {e}")))?;

        debug!(count = inserted, skipped = tasks.len() as u64 - inserted, "Seeded tasks");
        Ok(inserted)
    }

    async fn reset_in_flight(&self) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();

        let recovered = self
            .conn()
            .execute(
                "UPDATE decompilation_tasks SET status = ?1, updated_at = ?2
                 WHERE status = ?3",
                params![
                    status_to_str(TaskStatus::Pending),
                    now,
                    status_to_str(TaskStatus::InFlight)
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("reset_in_flight: {e}")))?;

        if recovered > 0 {
            info!(count = recovered, "Reset in-flight tasks to pending");
        }
        Ok(recovered)
    }

    async fn claim(&self, batch_size: usize) -> Result<Vec<Task>, StoreError> {
        let _guard = self.write_lock.lock().await;

        let tx = self
            .conn()
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(|e| StoreError::Unavailable(format!("claim: begin transaction: {e}")))?;

        let mut rows = tx
            .query(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM decompilation_tasks
                     WHERE status = ?1 ORDER BY id LIMIT ?2"
                ),
                params![status_to_str(TaskStatus::Pending), batch_size as i64],
            )
            .await
            .map_err(|e| StoreError::Query(format!("claim: {e}")))?;

        let mut tasks = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => {
                    let task = row_to_task(&row)
                        .map_err(|e| StoreError::Query(format!("claim row parse: {e}")))?;
                    tasks.push(task);
                }
                Ok(None) => break,
                Err(e) => return Err(StoreError::Query(format!("claim: {e}"))),
            }
        }

        if tasks.is_empty() {
            tx.commit()
                .await
                .map_err(|e| StoreError::Query(format!("claim: commit: {e}")))?;
            return Ok(tasks);
        }

        // Ids originate from the SELECT above, never from input.
        let ids = tasks
            .iter()
            .map(|t| t.id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let now = Utc::now().to_rfc3339();
        tx.execute(
            &format!(
                "UPDATE decompilation_tasks SET status = ?1, updated_at = ?2
                 WHERE id IN ({ids})"
            ),
            params![status_to_str(TaskStatus::InFlight), now],
        )
        .await
        .map_err(|e| StoreError::Query(format!("claim: mark in_flight: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Query(format!("claim: commit: {e}")))?;

        debug!(count = tasks.len(), "Claimed batch");
        Ok(tasks)
    }

    async fn complete(&self, id: i64, source: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();

        let updated = self
            .conn()
            .execute(
                "UPDATE decompilation_tasks
                 SET status = ?1, decompiled_source = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![status_to_str(TaskStatus::Completed), source, now, id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("complete: {e}")))?;

        if updated == 0 {
            return Err(StoreError::UnknownTask(id));
        }
        Ok(())
    }

    async fn fail(&self, id: i64, error: &str, retries: u32) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();

        let updated = self
            .conn()
            .execute(
                "UPDATE decompilation_tasks
                 SET status = ?1, error_message = ?2, retries = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    status_to_str(TaskStatus::Failed),
                    error,
                    retries as i64,
                    now,
                    id
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("fail: {e}")))?;

        if updated == 0 {
            return Err(StoreError::UnknownTask(id));
        }
        Ok(())
    }

    async fn progress(&self) -> Result<Progress, StoreError> {
        let completed = self
            .count("SELECT COUNT(*) FROM decompilation_tasks WHERE status = 'completed'")
            .await?;
        let total = self.count("SELECT COUNT(*) FROM decompilation_tasks").await?;
        Ok(Progress { completed, total })
    }

    async fn completed_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM decompilation_tasks
                     WHERE status = 'completed' AND decompiled_source IS NOT NULL
                     ORDER BY class_name, symbol_name"
                ),
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("completed_tasks: {e}")))?;

        let mut tasks = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => match row_to_task(&row) {
                    Ok(task) => tasks.push(task),
                    Err(e) => {
                        tracing::warn!("Skipping completed task row: {e}");
                    }
                },
                Ok(None) => break,
                Err(e) => return Err(StoreError::Query(format!("completed_tasks: {e}"))),
            }
        }
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn new_task(class: &str, symbol: &str) -> NewTask {
        NewTask {
            class_name: class.to_string(),
            symbol_name: symbol.to_string(),
            assembly_code: format!("asm for {symbol}"),
        }
    }

    #[tokio::test]
    async fn open_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("dir").join("tasks.db");
        let store = LibSqlStore::open(&db_path).await.unwrap();
        assert!(db_path.exists());
        drop(store);
    }

    #[tokio::test]
    async fn seed_ignores_duplicates() {
        let store = LibSqlStore::open_in_memory().await.unwrap();
        let batch = vec![new_task("T", "m1"), new_task("T", "m2")];

        assert_eq!(store.seed(&batch).await.unwrap(), 2);
        assert_eq!(store.seed(&batch).await.unwrap(), 0);

        let progress = store.progress().await.unwrap();
        assert_eq!(progress.total, 2);
    }

    #[tokio::test]
    async fn claim_flips_status_and_orders_by_id() {
        let store = LibSqlStore::open_in_memory().await.unwrap();
        store
            .seed(&[new_task("T", "m1"), new_task("T", "m2"), new_task("T", "m3")])
            .await
            .unwrap();

        let first = store.claim(2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(first[0].id < first[1].id);
        assert_eq!(first[0].symbol_name, "m1");

        // Claimed rows are in_flight now, so only m3 remains claimable.
        let second = store.claim(10).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].symbol_name, "m3");

        assert!(store.claim(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_claims_are_disjoint() {
        let store = std::sync::Arc::new(LibSqlStore::open_in_memory().await.unwrap());
        store
            .seed(&[
                new_task("Test", "method1"),
                new_task("Test", "method2"),
                new_task("Test", "method3"),
                new_task("Test", "method4"),
            ])
            .await
            .unwrap();

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.claim(2).await.unwrap() })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.claim(2).await.unwrap() })
        };
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
        let ids: HashSet<i64> = a.iter().chain(b.iter()).map(|t| t.id).collect();
        assert_eq!(ids.len(), 4, "claims overlapped");
    }

    #[tokio::test]
    async fn complete_records_source() {
        let store = LibSqlStore::open_in_memory().await.unwrap();
        store.seed(&[new_task("T", "m1")]).await.unwrap();
        let claimed = store.claim(1).await.unwrap();

        store.complete(claimed[0].id, "int main() {}").await.unwrap();

        let done = store.completed_tasks().await.unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].status, TaskStatus::Completed);
        assert_eq!(done[0].decompiled_source.as_deref(), Some("int main() {}"));

        // Terminal rows are no longer claimable.
        assert!(store.claim(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn complete_unknown_task_errs() {
        let store = LibSqlStore::open_in_memory().await.unwrap();
        let err = store.complete(42, "src").await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownTask(42)));
    }

    #[tokio::test]
    async fn fail_records_error_and_retries() {
        let store = LibSqlStore::open_in_memory().await.unwrap();
        store.seed(&[new_task("T", "m1")]).await.unwrap();
        let claimed = store.claim(1).await.unwrap();

        store.fail(claimed[0].id, "timeout", 2).await.unwrap();

        // Failed rows are terminal until an explicit reset.
        assert!(store.claim(10).await.unwrap().is_empty());
        assert!(store.completed_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reset_in_flight_requeues_orphans() {
        let store = LibSqlStore::open_in_memory().await.unwrap();
        store
            .seed(&[new_task("T", "m1"), new_task("T", "m2")])
            .await
            .unwrap();
        store.claim(1).await.unwrap();

        assert_eq!(store.reset_in_flight().await.unwrap(), 1);
        assert_eq!(store.claim(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn completed_tasks_ordered_by_class_then_symbol() {
        let store = LibSqlStore::open_in_memory().await.unwrap();
        store
            .seed(&[new_task("B", "b"), new_task("A", "z"), new_task("A", "a")])
            .await
            .unwrap();

        // Complete in an unrelated order.
        for task in store.claim(10).await.unwrap() {
            store.complete(task.id, "src").await.unwrap();
        }

        let done = store.completed_tasks().await.unwrap();
        let keys: Vec<(String, String)> = done
            .into_iter()
            .map(|t| (t.class_name, t.symbol_name))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("A".to_string(), "a".to_string()),
                ("A".to_string(), "z".to_string()),
                ("B".to_string(), "b".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn progress_counts_completed_and_total() {
        let store = LibSqlStore::open_in_memory().await.unwrap();
        store
            .seed(&[new_task("T", "m1"), new_task("T", "m2"), new_task("T", "m3")])
            .await
            .unwrap();
        let claimed = store.claim(2).await.unwrap();
        store.complete(claimed[0].id, "src").await.unwrap();
        store.fail(claimed[1].id, "nope", 0).await.unwrap();

        let progress = store.progress().await.unwrap();
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.total, 3);
    }

    #[test]
    fn status_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InFlight,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(str_to_status(status_to_str(status)), status);
        }
    }
}
