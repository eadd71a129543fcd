//! The embedded local cache backend: a SQLite-backed `TaskManager`
//! implementation partitioned by `backend_id`, plus the `Stats`/`Vacuum`
//! housekeeping operations and `Detectable` so it can act as the
//! always-available fallback in the registry.

mod store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use tasktool_contract::{Detectable, TaskManager};
use tasktool_domain::{
    new_local_id, BackendId, Context, Task, TaskDraft, TaskError, TaskList, TaskListDraft,
    TaskResult,
};

use store::Store;

/// Low priority number in the registry means "prefer me"; the cache uses a
/// high one so it only wins when nothing else detected.
pub const CACHE_DETECTION_PRIORITY: u32 = 100;

#[derive(Debug, Clone)]
pub struct Stats {
    pub total_tasks: u64,
    pub tasks_per_list: Vec<(String, u64)>,
    pub tasks_per_status: Vec<(String, u64)>,
    pub file_size_bytes: u64,
    pub last_vacuum_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
pub struct VacuumReport {
    pub size_before: u64,
    pub size_after: u64,
}

impl VacuumReport {
    pub fn reclaimed(&self) -> i64 {
        self.size_before as i64 - self.size_after as i64
    }
}

/// SQLite-backed cache, one file per configured path, data partitioned by
/// `backend_id` so several remotes (or the sync queue's mirror of them)
/// can share a single file without colliding.
pub struct SqliteCache {
    backend_id: BackendId,
    store: Arc<Mutex<Store>>,
}

impl SqliteCache {
    pub fn open(backend_id: BackendId, path: impl AsRef<Path>) -> TaskResult<Self> {
        let store = Store::open_or_create(path.as_ref())?;
        Ok(SqliteCache {
            backend_id,
            store: Arc::new(Mutex::new(store)),
        })
    }

    /// The default cache location: `$XDG_DATA_HOME/tasktool/cache.db`, or
    /// `~/.local/share/tasktool/cache.db` when the XDG variable is unset.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tasktool")
            .join("cache.db")
    }

    pub async fn stats(&self, list_id: Option<&str>) -> TaskResult<Stats> {
        let store = self.store.lock().await;
        let total_tasks = store.total_task_count(self.backend_id.as_str(), list_id)?;
        let tasks_per_list = store.counts_per_list(self.backend_id.as_str())?;
        let tasks_per_status = store.counts_per_status(self.backend_id.as_str(), list_id)?;
        let file_size_bytes = store.file_size()?;
        let last_vacuum_at = store
            .get_metadata("last_vacuum_at")?
            .and_then(|v| chrono::DateTime::parse_from_rfc3339(&v).ok())
            .map(|d| d.with_timezone(&Utc));
        Ok(Stats {
            total_tasks,
            tasks_per_list,
            tasks_per_status,
            file_size_bytes,
            last_vacuum_at,
        })
    }

    pub async fn vacuum(&self) -> TaskResult<VacuumReport> {
        let store = self.store.lock().await;
        let size_before = store.file_size()?;
        store.vacuum()?;
        store.set_metadata("last_vacuum_at", &Utc::now().to_rfc3339())?;
        let size_after = store.file_size()?;
        let report = VacuumReport {
            size_before,
            size_after,
        };
        tracing::info!(backend = %self.backend_id, reclaimed = report.reclaimed(), "vacuumed cache");
        Ok(report)
    }
}

#[async_trait]
impl TaskManager for SqliteCache {
    fn backend_id(&self) -> &BackendId {
        &self.backend_id
    }

    async fn get_lists(&self, ctx: &Context) -> TaskResult<Vec<TaskList>> {
        ctx.check()?;
        self.store.lock().await.lists(self.backend_id.as_str(), false)
    }

    async fn get_list(&self, ctx: &Context, id: &str) -> TaskResult<Option<TaskList>> {
        ctx.check()?;
        self.store.lock().await.get_list(self.backend_id.as_str(), id)
    }

    async fn get_list_by_name(&self, ctx: &Context, name: &str) -> TaskResult<Option<TaskList>> {
        ctx.check()?;
        let lists = self.store.lock().await.lists(self.backend_id.as_str(), false)?;
        Ok(lists.into_iter().find(|l| l.name_matches(name)))
    }

    async fn create_list(&self, ctx: &Context, draft: TaskListDraft) -> TaskResult<TaskList> {
        ctx.check()?;
        let store = self.store.lock().await;
        if let Some(existing) = store
            .lists(self.backend_id.as_str(), false)?
            .into_iter()
            .find(|l| l.name_matches(&draft.name))
        {
            return Err(TaskError::already_exists(format!(
                "list named '{}' already exists",
                existing.name
            )));
        }
        let list = TaskList::from_draft(new_local_id(), self.backend_id.as_str(), draft)?;
        store.insert_list(self.backend_id.as_str(), &list)?;
        Ok(list)
    }

    async fn update_list(&self, ctx: &Context, list: TaskList) -> TaskResult<TaskList> {
        ctx.check()?;
        let store = self.store.lock().await;
        store.upsert_list(self.backend_id.as_str(), &list)?;
        Ok(list)
    }

    async fn delete_list(&self, ctx: &Context, id: &str) -> TaskResult<()> {
        ctx.check()?;
        self.store
            .lock()
            .await
            .set_list_deleted_at(self.backend_id.as_str(), id, Some(Utc::now()))
    }

    async fn get_deleted_lists(&self, ctx: &Context) -> TaskResult<Vec<TaskList>> {
        ctx.check()?;
        self.store.lock().await.lists(self.backend_id.as_str(), true)
    }

    async fn get_deleted_list_by_name(&self, ctx: &Context, name: &str) -> TaskResult<Option<TaskList>> {
        ctx.check()?;
        let lists = self.store.lock().await.lists(self.backend_id.as_str(), true)?;
        Ok(lists.into_iter().find(|l| l.name_matches(name)))
    }

    async fn restore_list(&self, ctx: &Context, id: &str) -> TaskResult<TaskList> {
        ctx.check()?;
        let store = self.store.lock().await;
        store.set_list_deleted_at(self.backend_id.as_str(), id, None)?;
        store
            .get_list(self.backend_id.as_str(), id)?
            .ok_or_else(|| TaskError::not_found(format!("list {id} not found")))
    }

    async fn purge_list(&self, ctx: &Context, id: &str) -> TaskResult<()> {
        ctx.check()?;
        self.store.lock().await.purge_list(self.backend_id.as_str(), id)
    }

    async fn get_tasks(&self, ctx: &Context, list_id: &str) -> TaskResult<Vec<Task>> {
        ctx.check()?;
        self.store.lock().await.tasks_in_list(self.backend_id.as_str(), list_id)
    }

    async fn get_task(&self, ctx: &Context, list_id: &str, task_id: &str) -> TaskResult<Option<Task>> {
        ctx.check()?;
        self.store
            .lock()
            .await
            .get_task(self.backend_id.as_str(), list_id, task_id)
    }

    async fn create_task(&self, ctx: &Context, list_id: &str, draft: TaskDraft) -> TaskResult<Task> {
        ctx.check()?;
        let store = self.store.lock().await;
        if store.get_list(self.backend_id.as_str(), list_id)?.is_none() {
            return Err(TaskError::not_found(format!("list {list_id} not found")));
        }
        let mut draft = draft;
        draft.list_id = list_id.to_string();
        let task = Task::from_draft(new_local_id(), self.backend_id.as_str(), draft)?;
        store.insert_task(&task)?;
        Ok(task)
    }

    async fn update_task(&self, ctx: &Context, _list_id: &str, task: Task) -> TaskResult<Task> {
        ctx.check()?;
        self.store.lock().await.upsert_task(&task)?;
        Ok(task)
    }

    async fn delete_task(&self, ctx: &Context, list_id: &str, task_id: &str) -> TaskResult<()> {
        ctx.check()?;
        self.store
            .lock()
            .await
            .delete_task(self.backend_id.as_str(), list_id, task_id)
    }

    async fn close(&self) -> TaskResult<()> {
        Ok(())
    }
}

#[async_trait]
impl Detectable for SqliteCache {
    /// The cache is the terminal fallback, so detection is allowed to
    /// create its storage directory rather than merely check for it.
    async fn can_detect(&self, _ctx: &Context) -> TaskResult<bool> {
        let store = self.store.lock().await;
        Ok(store.path().parent().map(|p| p.exists()).unwrap_or(true))
    }

    fn detection_info(&self) -> String {
        "embedded sqlite cache, always available".to_string()
    }

    fn detection_priority(&self) -> u32 {
        CACHE_DETECTION_PRIORITY
    }
}
