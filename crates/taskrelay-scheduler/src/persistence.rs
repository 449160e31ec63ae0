//! SQLite-backed task store.
//!
//! One table, `tasks`. Timestamps are stored as fixed-width UTC RFC 3339
//! strings so `scheduled_at <= ?` compares correctly as text.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use taskrelay_core::error::{RelayError, Result};
use taskrelay_core::task::{NewTask, Task, TaskStatus, TaskType};
use taskrelay_core::time;

const TASK_COLUMNS: &str =
    "id, target, message, task_type, status, scheduled_at, extra_data, created_at, updated_at";

/// Task database shared by the HTTP gateway and the dispatch worker.
pub struct TaskDb {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> RelayError {
    RelayError::Database(e.to_string())
}

impl TaskDb {
    /// Open or create the task database. `:memory:` gives a private in-memory store.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = if path.as_os_str() == ":memory:" {
            Connection::open_in_memory().map_err(db_err)?
        } else {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            let conn = Connection::open(path).map_err(db_err)?;
            // WAL lets the gateway read while the worker writes
            conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
            conn
        };
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    /// In-memory store, for tests and throwaway runs.
    pub fn in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RelayError::Database(format!("Lock: {e}")))
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                target TEXT NOT NULL,
                message TEXT NOT NULL,
                task_type TEXT NOT NULL,       -- call, sms, whatsapp, email, calendar_event, outlook_event
                status TEXT NOT NULL DEFAULT 'pending',
                scheduled_at TEXT NOT NULL,    -- UTC, microsecond precision, 'Z' suffix
                extra_data TEXT,               -- JSON object
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_status_scheduled
                ON tasks (status, scheduled_at);
            ",
        )
        .map_err(|e| RelayError::Database(format!("Migration: {e}")))
    }

    /// Persist a submission as `pending` and return the stored row.
    pub fn insert(&self, task: &NewTask) -> Result<Task> {
        let now = time::to_storage(&Utc::now());
        let extra = task
            .extra_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO tasks (target, message, task_type, status, scheduled_at, extra_data, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?6, ?6)",
            params![
                task.target,
                task.message,
                task.task_type.as_str(),
                time::to_storage(&task.scheduled_at),
                extra,
                now,
            ],
        )
        .map_err(db_err)?;
        let id = conn.last_insert_rowid();
        let row = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                StoredRow::read,
            )
            .map_err(db_err)?;
        row.into_task()
    }

    pub fn get(&self, id: i64) -> Result<Option<Task>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                StoredRow::read,
            )
            .optional()
            .map_err(db_err)?;
        row.map(StoredRow::into_task).transpose()
    }

    /// Newest first, optionally filtered by status.
    pub fn list(&self, status: Option<TaskStatus>, limit: u32) -> Result<Vec<Task>> {
        let conn = self.lock()?;
        let rows = match status {
            Some(status) => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {TASK_COLUMNS} FROM tasks WHERE status = ?1 ORDER BY id DESC LIMIT ?2"
                    ))
                    .map_err(db_err)?;
                stmt.query_map(params![status.as_str(), limit], StoredRow::read)
                    .map_err(db_err)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(db_err)?
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY id DESC LIMIT ?1"))
                    .map_err(db_err)?;
                stmt.query_map(params![limit], StoredRow::read)
                    .map_err(db_err)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(db_err)?
            }
        };
        Ok(decode_rows(rows))
    }

    /// Pending tasks of the given types due at `now`, oldest first.
    ///
    /// A due row that cannot be decoded is marked `failed` on the spot so it
    /// never holds a batch slot again; the scan then refills the batch.
    pub fn due_tasks(&self, now: DateTime<Utc>, types: &[TaskType], limit: u32) -> Result<Vec<Task>> {
        if types.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let placeholders = (0..types.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let mut values = vec![time::to_storage(&now)];
        values.extend(types.iter().map(|t| t.as_str().to_string()));

        let conn = self.lock()?;
        let mut due = Vec::new();
        loop {
            let remaining = limit as usize - due.len();
            let sql = format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE status = 'pending' AND scheduled_at <= ?1 AND task_type IN ({placeholders})
                 ORDER BY scheduled_at ASC, id ASC
                 LIMIT {remaining}"
            );
            let mut stmt = conn.prepare(&sql).map_err(db_err)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), StoredRow::read)
                .map_err(db_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(db_err)?;

            let fetched = rows.len();
            let mut unreadable = 0;
            for row in rows {
                let id = row.id;
                match row.into_task() {
                    Ok(task) => due.push(task),
                    Err(e) => {
                        tracing::error!("❌ Task {id} is unreadable, marking failed: {e}");
                        conn.execute(
                            "UPDATE tasks SET status = 'failed', updated_at = ?1 WHERE id = ?2 AND status = 'pending'",
                            params![time::to_storage(&Utc::now()), id],
                        )
                        .map_err(db_err)?;
                        unreadable += 1;
                    }
                }
            }
            if unreadable == 0 || fetched < remaining || due.len() >= limit as usize {
                break;
            }
        }
        Ok(due)
    }

    /// Move a pending task to a terminal status. Returns false if no pending row matched.
    pub fn mark(&self, id: i64, status: TaskStatus) -> Result<bool> {
        if !status.is_terminal() {
            return Err(RelayError::Validation(format!(
                "task {id} cannot move back to {status}"
            )));
        }
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'pending'",
                params![status.as_str(), time::to_storage(&Utc::now()), id],
            )
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    /// Row count per status, for the startup banner.
    pub fn count_by_status(&self, status: TaskStatus) -> Result<u64> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE status = ?1",
            params![status.as_str()],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as u64)
        .map_err(db_err)
    }
}

/// A row as stored, before the text columns are parsed.
struct StoredRow {
    id: i64,
    target: String,
    message: String,
    task_type: String,
    status: String,
    scheduled_at: String,
    extra_data: Option<String>,
    created_at: String,
    updated_at: String,
}

impl StoredRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            target: row.get(1)?,
            message: row.get(2)?,
            task_type: row.get(3)?,
            status: row.get(4)?,
            scheduled_at: row.get(5)?,
            extra_data: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_task(self) -> Result<Task> {
        let id = self.id;
        let corrupt =
            |what: &str, e: RelayError| RelayError::Database(format!("task {id}: bad {what}: {e}"));
        Ok(Task {
            id: self.id,
            task_type: self.task_type.parse().map_err(|e| corrupt("task_type", e))?,
            status: self.status.parse().map_err(|e| corrupt("status", e))?,
            scheduled_at: time::parse_timestamp(&self.scheduled_at)
                .map_err(|e| corrupt("scheduled_at", e))?,
            extra_data: match &self.extra_data {
                Some(raw) => Some(
                    serde_json::from_str(raw).map_err(|e| corrupt("extra_data", e.into()))?,
                ),
                None => None,
            },
            created_at: time::parse_timestamp(&self.created_at)
                .map_err(|e| corrupt("created_at", e))?,
            updated_at: time::parse_timestamp(&self.updated_at)
                .map_err(|e| corrupt("updated_at", e))?,
            target: self.target,
            message: self.message,
        })
    }
}

/// Rows written by other tools may not parse; skip them rather than fail the read.
fn decode_rows(rows: Vec<StoredRow>) -> Vec<Task> {
    rows.into_iter()
        .filter_map(|row| match row.into_task() {
            Ok(task) => Some(task),
            Err(e) => {
                tracing::warn!("⚠️ Skipping unreadable row: {e}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn db() -> TaskDb {
        TaskDb::in_memory().unwrap()
    }

    fn sms_at(at: DateTime<Utc>) -> NewTask {
        NewTask::new("+15551234567", "hello", TaskType::Sms, at)
    }

    #[test]
    fn test_insert_is_pending_with_id() {
        let db = db();
        let now = Utc::now();
        let task = db.insert(&sms_at(now)).unwrap();
        assert!(task.id > 0);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.target, "+15551234567");
        assert_eq!(task.scheduled_at.timestamp_micros(), now.timestamp_micros());
        assert_eq!(task.created_at, task.updated_at);
    }

    #[test]
    fn test_past_and_future_are_both_pending() {
        let db = db();
        let now = Utc::now();
        let past = db.insert(&sms_at(now - Duration::days(2))).unwrap();
        let future = db.insert(&sms_at(now + Duration::days(2))).unwrap();
        assert_eq!(past.status, TaskStatus::Pending);
        assert_eq!(future.status, TaskStatus::Pending);
    }

    #[test]
    fn test_extra_data_roundtrip() {
        let db = db();
        let new = NewTask::new("a@b.com", "body", TaskType::Email, Utc::now())
            .with_extra(json!({"subject": "Hi", "nested": {"k": [1, 2]}}));
        let stored = db.insert(&new).unwrap();
        let fetched = db.get(stored.id).unwrap().unwrap();
        assert_eq!(fetched.extra_data, Some(json!({"subject": "Hi", "nested": {"k": [1, 2]}})));
    }

    #[test]
    fn test_get_missing() {
        assert!(db().get(999).unwrap().is_none());
    }

    #[test]
    fn test_due_tasks_filters_time_status_and_type() {
        let db = db();
        let now = Utc::now();
        let due = db.insert(&sms_at(now - Duration::seconds(5))).unwrap();
        let _future = db.insert(&sms_at(now + Duration::seconds(30))).unwrap();
        let email = db
            .insert(&NewTask::new("a@b.com", "x", TaskType::Email, now - Duration::seconds(5)))
            .unwrap();
        let done = db.insert(&sms_at(now - Duration::seconds(10))).unwrap();
        db.mark(done.id, TaskStatus::Done).unwrap();

        let rows = db.due_tasks(now, &[TaskType::Sms], 100).unwrap();
        assert_eq!(rows.iter().map(|t| t.id).collect::<Vec<_>>(), vec![due.id]);

        let rows = db.due_tasks(now, &[TaskType::Sms, TaskType::Email], 100).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|t| t.id == email.id));
    }

    #[test]
    fn test_due_tasks_boundary_is_inclusive() {
        let db = db();
        let now = Utc::now();
        let exact = db.insert(&sms_at(now)).unwrap();
        let rows = db.due_tasks(now, &[TaskType::Sms], 10).unwrap();
        assert_eq!(rows[0].id, exact.id);
    }

    #[test]
    fn test_due_tasks_ordered_and_capped() {
        let db = db();
        let now = Utc::now();
        let late = db.insert(&sms_at(now - Duration::seconds(1))).unwrap();
        let early = db.insert(&sms_at(now - Duration::seconds(100))).unwrap();
        let _mid = db.insert(&sms_at(now - Duration::seconds(50))).unwrap();

        let rows = db.due_tasks(now, &[TaskType::Sms], 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, early.id);
        assert!(rows.iter().all(|t| t.id != late.id));
    }

    #[test]
    fn test_due_tasks_empty_types() {
        let db = db();
        db.insert(&sms_at(Utc::now() - Duration::seconds(1))).unwrap();
        assert!(db.due_tasks(Utc::now(), &[], 10).unwrap().is_empty());
    }

    #[test]
    fn test_mark_transitions_exactly_once() {
        let db = db();
        let task = db.insert(&sms_at(Utc::now())).unwrap();
        assert!(db.mark(task.id, TaskStatus::Failed).unwrap());
        assert!(!db.mark(task.id, TaskStatus::Done).unwrap());
        assert_eq!(db.get(task.id).unwrap().unwrap().status, TaskStatus::Failed);
        assert!(db.mark(task.id, TaskStatus::Pending).is_err());
    }

    #[test]
    fn test_list_newest_first_with_filter() {
        let db = db();
        let a = db.insert(&sms_at(Utc::now())).unwrap();
        let b = db.insert(&sms_at(Utc::now())).unwrap();
        db.mark(a.id, TaskStatus::Done).unwrap();

        let all = db.list(None, 10).unwrap();
        assert_eq!(all.iter().map(|t| t.id).collect::<Vec<_>>(), vec![b.id, a.id]);

        let pending = db.list(Some(TaskStatus::Pending), 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);
        assert_eq!(db.count_by_status(TaskStatus::Done).unwrap(), 1);
    }

    #[test]
    fn test_unknown_type_rows_are_never_due() {
        let db = db();
        {
            let conn = db.lock().unwrap();
            conn.execute(
                "INSERT INTO tasks (target, message, task_type, status, scheduled_at, created_at, updated_at)
                 VALUES ('x', 'y', 'fax', 'pending', '2000-01-01T00:00:00.000000Z', '2000-01-01T00:00:00.000000Z', '2000-01-01T00:00:00.000000Z')",
                [],
            )
            .unwrap();
        }
        assert!(db.due_tasks(Utc::now(), &TaskType::ALL, 10).unwrap().is_empty());
        // listed rows that don't parse are skipped, not fatal
        assert!(db.list(None, 10).unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_due_row_is_failed_and_does_not_block() {
        let db = db();
        let now = Utc::now();
        {
            let conn = db.lock().unwrap();
            conn.execute(
                "INSERT INTO tasks (target, message, task_type, status, scheduled_at, extra_data, created_at, updated_at)
                 VALUES ('+1', 'broken', 'sms', 'pending', '2000-01-01T00:00:00.000000Z', '{bad', '2000-01-01T00:00:00.000000Z', '2000-01-01T00:00:00.000000Z')",
                [],
            )
            .unwrap();
        }
        let good = db.insert(&sms_at(now - Duration::seconds(5))).unwrap();

        let due = db.due_tasks(now, &[TaskType::Sms], 1).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, good.id);

        let status: String = db
            .lock()
            .unwrap()
            .query_row("SELECT status FROM tasks WHERE message = 'broken'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(status, "failed");
    }

    #[test]
    fn test_file_database_persists() {
        let dir = std::env::temp_dir().join(format!("taskrelay-test-{}", std::process::id()));
        let path = dir.join("tasks.db");
        let id = {
            let db = TaskDb::open(&path).unwrap();
            db.insert(&sms_at(Utc::now())).unwrap().id
        };
        let db = TaskDb::open(&path).unwrap();
        assert!(db.get(id).unwrap().is_some());
        drop(db);
        std::fs::remove_dir_all(&dir).ok();
    }
}
