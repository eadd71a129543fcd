use tasktool_domain::{BackendId, Context, Task, TaskDraft, TaskList, TaskListDraft, TaskResult};

/// The capability set every provider implements, whether it's the embedded
/// cache or a cloud service speaking HTTP/JSON or CalDAV.
///
/// `Get*` return an empty sequence on success; a missing single entity is
/// signalled as `Ok(None)`, never as an error — callers branch on absence
/// instead of matching error kinds. `Create*` always returns the persisted
/// entity so the caller observes the backend-assigned id and timestamps.
#[async_trait::async_trait]
pub trait TaskManager: Send + Sync {
    /// The logical name partitioning this backend's data in a shared cache,
    /// or identifying it in the registry.
    fn backend_id(&self) -> &BackendId;

    async fn get_lists(&self, ctx: &Context) -> TaskResult<Vec<TaskList>>;
    async fn get_list(&self, ctx: &Context, id: &str) -> TaskResult<Option<TaskList>>;
    async fn get_list_by_name(&self, ctx: &Context, name: &str) -> TaskResult<Option<TaskList>>;
    async fn create_list(&self, ctx: &Context, draft: TaskListDraft) -> TaskResult<TaskList>;
    async fn update_list(&self, ctx: &Context, list: TaskList) -> TaskResult<TaskList>;
    /// Soft delete: moves the list to trash.
    async fn delete_list(&self, ctx: &Context, id: &str) -> TaskResult<()>;

    async fn get_deleted_lists(&self, ctx: &Context) -> TaskResult<Vec<TaskList>>;
    async fn get_deleted_list_by_name(
        &self,
        ctx: &Context,
        name: &str,
    ) -> TaskResult<Option<TaskList>>;
    async fn restore_list(&self, ctx: &Context, id: &str) -> TaskResult<TaskList>;
    /// Permanently removes the list and every task inside it.
    async fn purge_list(&self, ctx: &Context, id: &str) -> TaskResult<()>;

    async fn get_tasks(&self, ctx: &Context, list_id: &str) -> TaskResult<Vec<Task>>;
    async fn get_task(&self, ctx: &Context, list_id: &str, task_id: &str) -> TaskResult<Option<Task>>;
    async fn create_task(&self, ctx: &Context, list_id: &str, draft: TaskDraft) -> TaskResult<Task>;
    async fn update_task(&self, ctx: &Context, list_id: &str, task: Task) -> TaskResult<Task>;
    async fn delete_task(&self, ctx: &Context, list_id: &str, task_id: &str) -> TaskResult<()>;

    /// Releases underlying resources (connections, file handles). Must be
    /// safe to call more than once.
    async fn close(&self) -> TaskResult<()>;
}

/// Extends `TaskManager` with self-reporting availability, used by the
/// auto-detector. Implementations must keep `can_detect` fast (<100ms
/// budget) and read-only, with the sole exception of the cache backend,
/// which is allowed to create its parent directory since it is the
/// always-available terminal fallback.
#[async_trait::async_trait]
pub trait Detectable: TaskManager {
    async fn can_detect(&self, ctx: &Context) -> TaskResult<bool>;

    /// A short human-readable explanation of why this backend did or didn't
    /// detect (e.g. "found .tasks.yaml in cwd", "no credentials in env").
    fn detection_info(&self) -> String;

    /// Lower sorts first. The cache backend uses a high number so it is
    /// always the last resort; filesystem-context providers use low
    /// numbers so they win when present.
    fn detection_priority(&self) -> u32;
}
