use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tasktool_domain::{Priority, Task, TaskError, TaskResult, TaskStatus};

/// The mutation kind a queued row replays against the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
        }
    }

    fn parse(value: &str) -> TaskResult<Self> {
        match value {
            "create" => Ok(OperationType::Create),
            "update" => Ok(OperationType::Update),
            "delete" => Ok(OperationType::Delete),
            other => Err(TaskError::Sql(format!("unknown queued operation type: {other}"))),
        }
    }
}

/// A flattened, serializable stand-in for `Task`, since the domain type
/// itself carries no `serde` impls (only backends need to cross a wire
/// boundary, and each backend speaks its own format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub backend_id: String,
    pub list_id: String,
    pub parent_id: Option<String>,
    pub summary: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: u8,
    pub due_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub tags: Vec<String>,
}

impl From<&Task> for TaskSnapshot {
    fn from(task: &Task) -> Self {
        TaskSnapshot {
            id: task.id.clone(),
            backend_id: task.backend_id.clone(),
            list_id: task.list_id.clone(),
            parent_id: task.parent_id.clone(),
            summary: task.summary.clone(),
            description: task.description.clone(),
            status: task.status.as_str().to_string(),
            priority: task.priority.get(),
            due_date: task.due_date,
            start_date: task.start_date,
            completed_at: task.completed_at,
            created_at: task.created_at,
            modified_at: task.modified_at,
            tags: task.tags.iter().map(str::to_string).collect(),
        }
    }
}

impl TaskSnapshot {
    pub fn into_task(self) -> TaskResult<Task> {
        Ok(Task {
            id: self.id,
            backend_id: self.backend_id,
            list_id: self.list_id,
            parent_id: self.parent_id,
            summary: self.summary,
            description: self.description,
            status: self.status.parse().map_err(TaskError::Sql)?,
            priority: Priority::new(self.priority).map_err(TaskError::Sql)?,
            due_date: self.due_date,
            start_date: self.start_date,
            completed_at: self.completed_at,
            created_at: self.created_at,
            modified_at: self.modified_at,
            tags: self.tags.into_iter().collect(),
        })
    }
}

/// A recorded `manual`-policy conflict: both copies are kept, and this row
/// is the caller-visible trace of the disagreement.
#[derive(Debug, Clone)]
pub struct ConflictRecord {
    pub list_id: String,
    pub task_id: String,
    pub local: TaskSnapshot,
    pub remote: TaskSnapshot,
    pub detected_at: DateTime<Utc>,
}

/// One row of the durable offline queue.
#[derive(Debug, Clone)]
pub struct PendingOperation {
    pub id: i64,
    pub backend_name: String,
    pub operation_type: OperationType,
    pub list_id: String,
    pub task_id: String,
    pub payload: Option<TaskSnapshot>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub parked: bool,
}

/// A separate SQLite database (distinct from the task cache file) recording
/// operations applied locally while offline, so they can be replayed
/// against a remote once reachable. Same WAL + busy-timeout discipline as
/// the task cache.
pub struct QueueStore {
    conn: Connection,
}

/// `QueueStore` wraps a plain `rusqlite::Connection`, which is `Send` but
/// not `Sync`; sharing one instance across the bounded pull worker pool
/// goes through a blocking mutex instead (every call is a handful of
/// synchronous statements, never an `.await`).
pub type SharedQueue = Arc<Mutex<QueueStore>>;

pub fn shared(store: QueueStore) -> SharedQueue {
    Arc::new(Mutex::new(store))
}

impl QueueStore {
    pub fn open_or_create(path: &Path) -> TaskResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let existed = path.exists();
        let conn = Connection::open(path).map_err(sql_err)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(sql_err)?;
        conn.pragma_update(None, "busy_timeout", 5_000u32).map_err(sql_err)?;
        if !existed {
            conn.execute_batch(
                r#"
                CREATE TABLE pending_operations(
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  backend_name TEXT NOT NULL,
                  operation_type TEXT NOT NULL,
                  list_id TEXT NOT NULL,
                  task_id TEXT NOT NULL,
                  payload_snapshot TEXT,
                  attempts INTEGER NOT NULL DEFAULT 0,
                  created_at TEXT NOT NULL,
                  last_error TEXT,
                  next_attempt_at TEXT NOT NULL,
                  parked INTEGER NOT NULL DEFAULT 0
                );
                CREATE INDEX pending_operations_backend_idx ON pending_operations(backend_name, created_at);

                CREATE TABLE sync_watermarks(
                  backend_name TEXT UNIQUE NOT NULL PRIMARY KEY,
                  last_synced_at TEXT NOT NULL
                );

                CREATE TABLE conflicts(
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  backend_name TEXT NOT NULL,
                  list_id TEXT NOT NULL,
                  task_id TEXT NOT NULL,
                  local_snapshot TEXT NOT NULL,
                  remote_snapshot TEXT NOT NULL,
                  detected_at TEXT NOT NULL
                );
                "#,
            )
            .map_err(sql_err)?;
        }
        Ok(QueueStore { conn })
    }

    pub fn enqueue(
        &self,
        backend_name: &str,
        operation_type: OperationType,
        list_id: &str,
        task_id: &str,
        payload: Option<&TaskSnapshot>,
    ) -> TaskResult<i64> {
        let payload_json = payload.map(serde_json::to_string).transpose().map_err(|e| TaskError::Sql(e.to_string()))?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO pending_operations
                   (backend_name, operation_type, list_id, task_id, payload_snapshot, attempts, created_at, next_attempt_at, parked)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6, 0)",
                (backend_name, operation_type.as_str(), list_id, task_id, payload_json, now),
            )
            .map_err(sql_err)?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Pending (not parked) rows whose `next_attempt_at` has elapsed,
    /// ordered by `created_at` ascending as the push algorithm requires.
    pub fn due_operations(&self, backend_name: &str) -> TaskResult<Vec<PendingOperation>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, backend_name, operation_type, list_id, task_id, payload_snapshot,
                        attempts, created_at, last_error, next_attempt_at, parked
                 FROM pending_operations
                 WHERE backend_name = ?1 AND parked = 0 AND next_attempt_at <= ?2
                 ORDER BY created_at ASC",
            )
            .map_err(sql_err)?;
        let now = Utc::now().to_rfc3339();
        let rows = stmt
            .query_map((backend_name, now), row_to_operation)
            .map_err(sql_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_err)?;
        rows.into_iter().collect()
    }

    pub fn parked_operations(&self, backend_name: &str) -> TaskResult<Vec<PendingOperation>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, backend_name, operation_type, list_id, task_id, payload_snapshot,
                        attempts, created_at, last_error, next_attempt_at, parked
                 FROM pending_operations
                 WHERE backend_name = ?1 AND parked = 1
                 ORDER BY created_at ASC",
            )
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([backend_name], row_to_operation)
            .map_err(sql_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_err)?;
        rows.into_iter().collect()
    }

    pub fn remove(&self, id: i64) -> TaskResult<()> {
        self.conn
            .execute("DELETE FROM pending_operations WHERE id = ?1", [id])
            .map_err(sql_err)?;
        Ok(())
    }

    pub fn record_failure(&self, id: i64, attempts: u32, error: &str, next_attempt_at: DateTime<Utc>, park: bool) -> TaskResult<()> {
        self.conn
            .execute(
                "UPDATE pending_operations
                 SET attempts = ?1, last_error = ?2, next_attempt_at = ?3, parked = ?4
                 WHERE id = ?5",
                (attempts, error, next_attempt_at.to_rfc3339(), park as i64, id),
            )
            .map_err(sql_err)?;
        Ok(())
    }

    pub fn last_synced_at(&self, backend_name: &str) -> TaskResult<Option<DateTime<Utc>>> {
        self.conn
            .query_row(
                "SELECT last_synced_at FROM sync_watermarks WHERE backend_name = ?1",
                [backend_name],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(sql_err)?
            .map(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map(|d| d.with_timezone(&Utc))
                    .map_err(|e| TaskError::Sql(e.to_string()))
            })
            .transpose()
    }

    pub fn set_last_synced_at(&self, backend_name: &str, at: DateTime<Utc>) -> TaskResult<()> {
        self.conn
            .execute(
                "INSERT INTO sync_watermarks(backend_name, last_synced_at) VALUES (?1, ?2)
                 ON CONFLICT(backend_name) DO UPDATE SET last_synced_at = excluded.last_synced_at",
                (backend_name, at.to_rfc3339()),
            )
            .map_err(sql_err)?;
        Ok(())
    }

    pub fn record_conflict(
        &self,
        backend_name: &str,
        list_id: &str,
        task_id: &str,
        local: &TaskSnapshot,
        remote: &TaskSnapshot,
    ) -> TaskResult<()> {
        let local_json = serde_json::to_string(local).map_err(|e| TaskError::Sql(e.to_string()))?;
        let remote_json = serde_json::to_string(remote).map_err(|e| TaskError::Sql(e.to_string()))?;
        self.conn
            .execute(
                "INSERT INTO conflicts(backend_name, list_id, task_id, local_snapshot, remote_snapshot, detected_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (backend_name, list_id, task_id, local_json, remote_json, Utc::now().to_rfc3339()),
            )
            .map_err(sql_err)?;
        Ok(())
    }

    pub fn conflicts(&self, backend_name: &str) -> TaskResult<Vec<ConflictRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT list_id, task_id, local_snapshot, remote_snapshot, detected_at
                 FROM conflicts WHERE backend_name = ?1 ORDER BY detected_at ASC",
            )
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([backend_name], |row| {
                let local_json: String = row.get(2)?;
                let remote_json: String = row.get(3)?;
                let detected_at: String = row.get(4)?;
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, local_json, remote_json, detected_at))
            })
            .map_err(sql_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_err)?;

        rows.into_iter()
            .map(|(list_id, task_id, local_json, remote_json, detected_at)| {
                Ok(ConflictRecord {
                    list_id,
                    task_id,
                    local: serde_json::from_str(&local_json).map_err(|e| TaskError::Sql(e.to_string()))?,
                    remote: serde_json::from_str(&remote_json).map_err(|e| TaskError::Sql(e.to_string()))?,
                    detected_at: DateTime::parse_from_rfc3339(&detected_at)
                        .map(|d| d.with_timezone(&Utc))
                        .map_err(|e| TaskError::Sql(e.to_string()))?,
                })
            })
            .collect()
    }

    pub fn clear_parked(&self, backend_name: &str) -> TaskResult<u64> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM pending_operations WHERE backend_name = ?1 AND parked = 1",
                [backend_name],
            )
            .map_err(sql_err)?;
        Ok(changed as u64)
    }
}

fn row_to_operation(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskResult<PendingOperation>> {
    let operation_type: String = row.get(2)?;
    let payload_json: Option<String> = row.get(5)?;
    let created_at: String = row.get(7)?;
    let next_attempt_at: String = row.get(9)?;
    let parked: i64 = row.get(10)?;

    let operation = (|| -> TaskResult<PendingOperation> {
        let payload = payload_json
            .map(|json| serde_json::from_str::<TaskSnapshot>(&json).map_err(|e| TaskError::Sql(e.to_string())))
            .transpose()?;
        Ok(PendingOperation {
            id: row.get(0).map_err(sql_err)?,
            backend_name: row.get(1).map_err(sql_err)?,
            operation_type: OperationType::parse(&operation_type)?,
            list_id: row.get(3).map_err(sql_err)?,
            task_id: row.get(4).map_err(sql_err)?,
            payload,
            attempts: row.get::<_, i64>(6).map_err(sql_err)? as u32,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| TaskError::Sql(e.to_string()))?,
            last_error: row.get(8).map_err(sql_err)?,
            next_attempt_at: DateTime::parse_from_rfc3339(&next_attempt_at)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| TaskError::Sql(e.to_string()))?,
            parked: parked != 0,
        })
    })();
    Ok(operation)
}

fn sql_err(err: rusqlite::Error) -> TaskError {
    TaskError::Sql(err.to_string())
}
