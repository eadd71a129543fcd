use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use tasktool_domain::{Priority, Task, TaskList, TaskStatus, TaskResult, TaskError};

/// Owns the SQLite connection backing one cache partition. Mirrors the
/// embedded key/value + relational layout of a task tracker's local store:
/// a `metadata` table for schema/vacuum bookkeeping plus the `task_lists`
/// and `tasks` tables proper.
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    pub fn open_or_create(path: &Path) -> TaskResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let existed = path.exists();
        let conn = Connection::open(path).map_err(sql_err)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(sql_err)?;
        conn.pragma_update(None, "busy_timeout", 5_000u32).map_err(sql_err)?;
        conn.pragma_update(None, "foreign_keys", true).map_err(sql_err)?;
        conn.pragma_update(None, "synchronous", "NORMAL").map_err(sql_err)?;
        if !existed {
            Self::create_schema(&conn)?;
        }
        Ok(Store {
            conn,
            path: path.to_path_buf(),
        })
    }

    fn create_schema(conn: &Connection) -> TaskResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE metadata(
              key TEXT UNIQUE NOT NULL PRIMARY KEY,
              value TEXT
            );
            INSERT INTO metadata(key, value) VALUES ('cache_schema_version', '1');

            CREATE TABLE task_lists(
              id TEXT NOT NULL,
              backend_id TEXT NOT NULL,
              name TEXT NOT NULL,
              color TEXT,
              description TEXT,
              modified_at TEXT NOT NULL,
              deleted_at TEXT,
              PRIMARY KEY (backend_id, id)
            );

            CREATE TABLE tasks(
              id TEXT NOT NULL,
              backend_id TEXT NOT NULL,
              list_id TEXT NOT NULL,
              parent_id TEXT,
              summary TEXT NOT NULL,
              description TEXT,
              status TEXT NOT NULL,
              priority INTEGER NOT NULL,
              due_date TEXT,
              start_date TEXT,
              completed_at TEXT,
              created_at TEXT NOT NULL,
              modified_at TEXT NOT NULL,
              tags TEXT NOT NULL DEFAULT '',
              PRIMARY KEY (backend_id, id),
              FOREIGN KEY (backend_id, list_id)
                REFERENCES task_lists(backend_id, id)
                ON DELETE CASCADE,
              FOREIGN KEY (backend_id, parent_id)
                REFERENCES tasks(backend_id, id)
                ON DELETE CASCADE
            );

            CREATE INDEX tasks_list_idx ON tasks(backend_id, list_id);
            CREATE INDEX tasks_status_idx ON tasks(backend_id, status);
            CREATE INDEX tasks_parent_idx ON tasks(backend_id, parent_id);
            "#,
        )
        .map_err(sql_err)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_size(&self) -> TaskResult<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> TaskResult<()> {
        self.conn
            .execute(
                "INSERT INTO metadata(key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                (key, value),
            )
            .map_err(sql_err)?;
        Ok(())
    }

    pub fn get_metadata(&self, key: &str) -> TaskResult<Option<String>> {
        self.conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .map_err(sql_err)
    }

    pub fn vacuum(&self) -> TaskResult<()> {
        self.conn.execute_batch("VACUUM").map_err(sql_err)
    }

    // Lists
    // ----------------------------------------------------------------

    pub fn insert_list(&self, backend_id: &str, list: &TaskList) -> TaskResult<()> {
        self.conn
            .execute(
                "INSERT INTO task_lists(id, backend_id, name, color, description, modified_at, deleted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                (
                    &list.id,
                    backend_id,
                    &list.name,
                    &list.color,
                    &list.description,
                    list.modified_at.to_rfc3339(),
                    list.deleted_at.map(|d| d.to_rfc3339()),
                ),
            )
            .map_err(sql_err)?;
        Ok(())
    }

    pub fn upsert_list(&self, backend_id: &str, list: &TaskList) -> TaskResult<()> {
        self.conn
            .execute(
                "INSERT INTO task_lists(id, backend_id, name, color, description, modified_at, deleted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(backend_id, id) DO UPDATE SET
                   name = excluded.name,
                   color = excluded.color,
                   description = excluded.description,
                   modified_at = excluded.modified_at,
                   deleted_at = excluded.deleted_at",
                (
                    &list.id,
                    backend_id,
                    &list.name,
                    &list.color,
                    &list.description,
                    list.modified_at.to_rfc3339(),
                    list.deleted_at.map(|d| d.to_rfc3339()),
                ),
            )
            .map_err(sql_err)?;
        Ok(())
    }

    pub fn get_list(&self, backend_id: &str, id: &str) -> TaskResult<Option<TaskList>> {
        self.conn
            .query_row(
                "SELECT id, backend_id, name, color, description, modified_at, deleted_at
                 FROM task_lists WHERE backend_id = ?1 AND id = ?2",
                (backend_id, id),
                row_to_list,
            )
            .optional()
            .map_err(sql_err)
    }

    pub fn lists(&self, backend_id: &str, include_deleted: bool) -> TaskResult<Vec<TaskList>> {
        let sql = if include_deleted {
            "SELECT id, backend_id, name, color, description, modified_at, deleted_at
             FROM task_lists WHERE backend_id = ?1 AND deleted_at IS NOT NULL"
        } else {
            "SELECT id, backend_id, name, color, description, modified_at, deleted_at
             FROM task_lists WHERE backend_id = ?1 AND deleted_at IS NULL"
        };
        let mut stmt = self.conn.prepare(sql).map_err(sql_err)?;
        let rows = stmt
            .query_map([backend_id], row_to_list)
            .map_err(sql_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_err)?;
        Ok(rows)
    }

    pub fn set_list_deleted_at(&self, backend_id: &str, id: &str, deleted_at: Option<DateTime<Utc>>) -> TaskResult<()> {
        self.conn
            .execute(
                "UPDATE task_lists SET deleted_at = ?1, modified_at = ?2 WHERE backend_id = ?3 AND id = ?4",
                (
                    deleted_at.map(|d| d.to_rfc3339()),
                    Utc::now().to_rfc3339(),
                    backend_id,
                    id,
                ),
            )
            .map_err(sql_err)?;
        Ok(())
    }

    /// Permanently removes the list row; `ON DELETE CASCADE` takes the
    /// tasks in it along with it.
    pub fn purge_list(&self, backend_id: &str, id: &str) -> TaskResult<()> {
        self.conn
            .execute(
                "DELETE FROM task_lists WHERE backend_id = ?1 AND id = ?2",
                (backend_id, id),
            )
            .map_err(sql_err)?;
        Ok(())
    }

    // Tasks
    // ----------------------------------------------------------------

    pub fn insert_task(&self, task: &Task) -> TaskResult<()> {
        let due_date = task.due_date.map(|d| d.format("%Y-%m-%d").to_string());
        let start_date = task.start_date.map(|d| d.format("%Y-%m-%d").to_string());
        let completed_at = task.completed_at.map(|d| d.to_rfc3339());
        let tags = task.tags.to_string();
        self.conn
            .execute(
                INSERT_TASK_SQL,
                rusqlite::named_params! {
                    ":id": task.id,
                    ":backend_id": task.backend_id,
                    ":list_id": task.list_id,
                    ":parent_id": task.parent_id,
                    ":summary": task.summary,
                    ":description": task.description,
                    ":status": task.status.as_str(),
                    ":priority": task.priority.get(),
                    ":due_date": due_date,
                    ":start_date": start_date,
                    ":completed_at": completed_at,
                    ":created_at": task.created_at.to_rfc3339(),
                    ":modified_at": task.modified_at.to_rfc3339(),
                    ":tags": tags,
                },
            )
            .map_err(sql_err)?;
        Ok(())
    }

    pub fn upsert_task(&self, task: &Task) -> TaskResult<()> {
        let due_date = task.due_date.map(|d| d.format("%Y-%m-%d").to_string());
        let start_date = task.start_date.map(|d| d.format("%Y-%m-%d").to_string());
        let completed_at = task.completed_at.map(|d| d.to_rfc3339());
        let tags = task.tags.to_string();
        self.conn
            .execute(
                UPSERT_TASK_SQL,
                rusqlite::named_params! {
                    ":id": task.id,
                    ":backend_id": task.backend_id,
                    ":list_id": task.list_id,
                    ":parent_id": task.parent_id,
                    ":summary": task.summary,
                    ":description": task.description,
                    ":status": task.status.as_str(),
                    ":priority": task.priority.get(),
                    ":due_date": due_date,
                    ":start_date": start_date,
                    ":completed_at": completed_at,
                    ":created_at": task.created_at.to_rfc3339(),
                    ":modified_at": task.modified_at.to_rfc3339(),
                    ":tags": tags,
                },
            )
            .map_err(sql_err)?;
        Ok(())
    }

    pub fn get_task(&self, backend_id: &str, list_id: &str, id: &str) -> TaskResult<Option<Task>> {
        self.conn
            .query_row(
                &format!("{SELECT_TASK_SQL} WHERE backend_id = ?1 AND list_id = ?2 AND id = ?3"),
                (backend_id, list_id, id),
                row_to_task,
            )
            .optional()
            .map_err(sql_err)
    }

    pub fn get_task_by_id(&self, backend_id: &str, id: &str) -> TaskResult<Option<Task>> {
        self.conn
            .query_row(
                &format!("{SELECT_TASK_SQL} WHERE backend_id = ?1 AND id = ?2"),
                (backend_id, id),
                row_to_task,
            )
            .optional()
            .map_err(sql_err)
    }

    pub fn tasks_in_list(&self, backend_id: &str, list_id: &str) -> TaskResult<Vec<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_TASK_SQL} WHERE backend_id = ?1 AND list_id = ?2"))
            .map_err(sql_err)?;
        let rows = stmt
            .query_map((backend_id, list_id), row_to_task)
            .map_err(sql_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_err)?;
        Ok(rows)
    }

    pub fn tasks_for_backend(&self, backend_id: &str) -> TaskResult<Vec<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_TASK_SQL} WHERE backend_id = ?1"))
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([backend_id], row_to_task)
            .map_err(sql_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_err)?;
        Ok(rows)
    }

    /// `ON DELETE CASCADE` on `tasks(backend_id, parent_id)` takes any
    /// children of this task along with it.
    pub fn delete_task(&self, backend_id: &str, list_id: &str, id: &str) -> TaskResult<()> {
        self.conn
            .execute(
                "DELETE FROM tasks WHERE backend_id = ?1 AND list_id = ?2 AND id = ?3",
                (backend_id, list_id, id),
            )
            .map_err(sql_err)?;
        Ok(())
    }

    pub fn delete_task_by_id(&self, backend_id: &str, id: &str) -> TaskResult<()> {
        self.conn
            .execute("DELETE FROM tasks WHERE backend_id = ?1 AND id = ?2", (backend_id, id))
            .map_err(sql_err)?;
        Ok(())
    }

    // Stats
    // ----------------------------------------------------------------

    pub fn total_task_count(&self, backend_id: &str, list_id: Option<&str>) -> TaskResult<u64> {
        let count: i64 = match list_id {
            Some(list_id) => self
                .conn
                .query_row(
                    "SELECT COUNT(*) FROM tasks WHERE backend_id = ?1 AND list_id = ?2",
                    (backend_id, list_id),
                    |row| row.get(0),
                )
                .map_err(sql_err)?,
            None => self
                .conn
                .query_row(
                    "SELECT COUNT(*) FROM tasks WHERE backend_id = ?1",
                    [backend_id],
                    |row| row.get(0),
                )
                .map_err(sql_err)?,
        };
        Ok(count as u64)
    }

    pub fn counts_per_list(&self, backend_id: &str) -> TaskResult<Vec<(String, u64)>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT list_id, COUNT(*) FROM tasks WHERE backend_id = ?1 GROUP BY list_id",
            )
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([backend_id], |row| {
                let count: i64 = row.get(1)?;
                Ok((row.get::<_, String>(0)?, count as u64))
            })
            .map_err(sql_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_err)?;
        Ok(rows)
    }

    pub fn counts_per_status(&self, backend_id: &str, list_id: Option<&str>) -> TaskResult<Vec<(String, u64)>> {
        let rows = match list_id {
            Some(list_id) => {
                let mut stmt = self
                    .conn
                    .prepare(
                        "SELECT status, COUNT(*) FROM tasks WHERE backend_id = ?1 AND list_id = ?2 GROUP BY status",
                    )
                    .map_err(sql_err)?;
                let result = stmt
                    .query_map((backend_id, list_id), status_count_row)
                    .map_err(sql_err)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(sql_err)?;
                result
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare("SELECT status, COUNT(*) FROM tasks WHERE backend_id = ?1 GROUP BY status")
                    .map_err(sql_err)?;
                let result = stmt
                    .query_map([backend_id], status_count_row)
                    .map_err(sql_err)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(sql_err)?;
                result
            }
        };
        Ok(rows)
    }
}

fn status_count_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, u64)> {
    let status: String = row.get(0)?;
    let count: i64 = row.get(1)?;
    let display = TaskStatus::from_str(&status)
        .map(|s| s.display_name().to_string())
        .unwrap_or(status);
    Ok((display, count as u64))
}

const SELECT_TASK_SQL: &str = "SELECT id, backend_id, list_id, parent_id, summary, description, status, priority, due_date, start_date, completed_at, created_at, modified_at, tags FROM tasks";

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let status: String = row.get(6)?;
    let priority: u8 = row.get(7)?;
    let tags: String = row.get(13)?;
    Ok(Task {
        id: row.get(0)?,
        backend_id: row.get(1)?,
        list_id: row.get(2)?,
        parent_id: row.get(3)?,
        summary: row.get(4)?,
        description: row.get(5)?,
        status: TaskStatus::from_str(&status).unwrap_or_default(),
        priority: Priority::new(priority).unwrap_or_default(),
        due_date: parse_date(row.get::<_, Option<String>>(8)?),
        start_date: parse_date(row.get::<_, Option<String>>(9)?),
        completed_at: parse_datetime(row.get::<_, Option<String>>(10)?),
        created_at: parse_datetime(row.get::<_, Option<String>>(11)?).unwrap_or_else(Utc::now),
        modified_at: parse_datetime(row.get::<_, Option<String>>(12)?).unwrap_or_else(Utc::now),
        tags: tags.parse().unwrap_or_default(),
    })
}

fn row_to_list(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskList> {
    Ok(TaskList {
        id: row.get(0)?,
        backend_id: row.get(1)?,
        name: row.get(2)?,
        color: row.get(3)?,
        description: row.get(4)?,
        modified_at: parse_datetime(row.get::<_, Option<String>>(5)?).unwrap_or_else(Utc::now),
        deleted_at: parse_datetime(row.get::<_, Option<String>>(6)?),
    })
}

fn parse_date(value: Option<String>) -> Option<NaiveDate> {
    value.and_then(|v| NaiveDate::parse_from_str(&v, "%Y-%m-%d").ok())
}

fn parse_datetime(value: Option<String>) -> Option<DateTime<Utc>> {
    value.and_then(|v| DateTime::parse_from_rfc3339(&v).ok().map(|d| d.with_timezone(&Utc)))
}

const INSERT_TASK_SQL: &str = "INSERT INTO tasks(id, backend_id, list_id, parent_id, summary, description, status, priority, due_date, start_date, completed_at, created_at, modified_at, tags) VALUES (:id, :backend_id, :list_id, :parent_id, :summary, :description, :status, :priority, :due_date, :start_date, :completed_at, :created_at, :modified_at, :tags)";

const UPSERT_TASK_SQL: &str = "INSERT INTO tasks(id, backend_id, list_id, parent_id, summary, description, status, priority, due_date, start_date, completed_at, created_at, modified_at, tags) VALUES (:id, :backend_id, :list_id, :parent_id, :summary, :description, :status, :priority, :due_date, :start_date, :completed_at, :created_at, :modified_at, :tags) ON CONFLICT(backend_id, id) DO UPDATE SET list_id = excluded.list_id, parent_id = excluded.parent_id, summary = excluded.summary, description = excluded.description, status = excluded.status, priority = excluded.priority, due_date = excluded.due_date, start_date = excluded.start_date, completed_at = excluded.completed_at, modified_at = excluded.modified_at, tags = excluded.tags";

fn sql_err(err: rusqlite::Error) -> TaskError {
    TaskError::Sql(err.to_string())
}
