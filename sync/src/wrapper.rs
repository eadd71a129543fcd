use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tasktool_contract::{OfflineMode, TaskManager};
use tasktool_domain::{BackendId, Context, Task, TaskDraft, TaskList, TaskListDraft, TaskResult};

use crate::connectivity::probe;
use crate::queue::{OperationType, SharedQueue, TaskSnapshot};

pub(crate) fn draft_from_snapshot(snapshot: &TaskSnapshot) -> TaskDraft {
    TaskDraft {
        list_id: snapshot.list_id.clone(),
        parent_id: snapshot.parent_id.clone(),
        summary: snapshot.summary.clone(),
        description: snapshot.description.clone(),
        status: snapshot.status.parse().unwrap_or_default(),
        priority: tasktool_domain::Priority::new(snapshot.priority).unwrap_or_default(),
        due_date: snapshot.due_date,
        start_date: snapshot.start_date,
        tags: snapshot.tags.iter().cloned().collect(),
    }
}

/// A `TaskManager` that composes an embedded cache with a remote provider
/// and a conflict policy. Reads are always served from the cache; writes
/// go straight to the remote when reachable, or to the cache plus the
/// durable queue when not, per `offline_mode`.
pub struct SyncAwareTaskManager {
    backend_id: BackendId,
    cache: Arc<dyn TaskManager>,
    remote: Arc<dyn TaskManager>,
    queue: SharedQueue,
    offline_mode: OfflineMode,
    connectivity_timeout: Duration,
}

impl SyncAwareTaskManager {
    pub fn new(
        backend_id: BackendId,
        cache: Arc<dyn TaskManager>,
        remote: Arc<dyn TaskManager>,
        queue: SharedQueue,
        offline_mode: OfflineMode,
        connectivity_timeout: Duration,
    ) -> Self {
        SyncAwareTaskManager {
            backend_id,
            cache,
            remote,
            queue,
            offline_mode,
            connectivity_timeout,
        }
    }

    async fn remote_reachable(&self) -> bool {
        match self.offline_mode {
            OfflineMode::Offline => false,
            OfflineMode::Online => true,
            OfflineMode::Auto => probe(&self.remote, self.connectivity_timeout).await,
        }
    }

    fn enqueue(&self, operation_type: OperationType, list_id: &str, task: &Task) -> TaskResult<()> {
        tracing::debug!(backend = %self.backend_id, task_id = %task.id, ?operation_type, "queued operation for later push");
        self.queue.lock().unwrap().enqueue(
            self.backend_id.as_str(),
            operation_type,
            list_id,
            &task.id,
            Some(&TaskSnapshot::from(task)),
        )?;
        Ok(())
    }
}

#[async_trait]
impl TaskManager for SyncAwareTaskManager {
    fn backend_id(&self) -> &BackendId {
        &self.backend_id
    }

    async fn get_lists(&self, ctx: &Context) -> TaskResult<Vec<TaskList>> {
        self.cache.get_lists(ctx).await
    }

    async fn get_list(&self, ctx: &Context, id: &str) -> TaskResult<Option<TaskList>> {
        self.cache.get_list(ctx, id).await
    }

    async fn get_list_by_name(&self, ctx: &Context, name: &str) -> TaskResult<Option<TaskList>> {
        self.cache.get_list_by_name(ctx, name).await
    }

    async fn create_list(&self, ctx: &Context, draft: TaskListDraft) -> TaskResult<TaskList> {
        if self.remote_reachable().await {
            match self.remote.create_list(ctx, draft.clone()).await {
                Ok(list) => {
                    self.cache.update_list(ctx, list.clone()).await?;
                    return Ok(list);
                }
                Err(err) if matches!(self.offline_mode, OfflineMode::Auto) && err.is_retryable() => {}
                Err(err) => return Err(err),
            }
        }
        // Offline (or online attempt fell back under `auto`): the cache
        // assigns the id; list-level mutations aren't queued (see module
        // docs), so the next full push re-creates it against the remote.
        self.cache.create_list(ctx, draft).await
    }

    async fn update_list(&self, ctx: &Context, list: TaskList) -> TaskResult<TaskList> {
        self.cache.update_list(ctx, list).await
    }

    async fn delete_list(&self, ctx: &Context, id: &str) -> TaskResult<()> {
        self.cache.delete_list(ctx, id).await
    }

    async fn get_deleted_lists(&self, ctx: &Context) -> TaskResult<Vec<TaskList>> {
        self.cache.get_deleted_lists(ctx).await
    }

    async fn get_deleted_list_by_name(&self, ctx: &Context, name: &str) -> TaskResult<Option<TaskList>> {
        self.cache.get_deleted_list_by_name(ctx, name).await
    }

    async fn restore_list(&self, ctx: &Context, id: &str) -> TaskResult<TaskList> {
        self.cache.restore_list(ctx, id).await
    }

    async fn purge_list(&self, ctx: &Context, id: &str) -> TaskResult<()> {
        self.cache.purge_list(ctx, id).await
    }

    async fn get_tasks(&self, ctx: &Context, list_id: &str) -> TaskResult<Vec<Task>> {
        self.cache.get_tasks(ctx, list_id).await
    }

    async fn get_task(&self, ctx: &Context, list_id: &str, task_id: &str) -> TaskResult<Option<Task>> {
        self.cache.get_task(ctx, list_id, task_id).await
    }

    async fn create_task(&self, ctx: &Context, list_id: &str, draft: TaskDraft) -> TaskResult<Task> {
        if self.remote_reachable().await {
            match self.remote.create_task(ctx, list_id, draft.clone()).await {
                Ok(task) => {
                    self.cache.update_task(ctx, list_id, task.clone()).await?;
                    return Ok(task);
                }
                Err(err) if matches!(self.offline_mode, OfflineMode::Auto) && err.is_retryable() => {}
                Err(err) => return Err(err),
            }
        }
        let task = self.cache.create_task(ctx, list_id, draft).await?;
        self.enqueue(OperationType::Create, list_id, &task)?;
        Ok(task)
    }

    async fn update_task(&self, ctx: &Context, list_id: &str, task: Task) -> TaskResult<Task> {
        if self.remote_reachable().await {
            match self.remote.update_task(ctx, list_id, task.clone()).await {
                Ok(task) => {
                    self.cache.update_task(ctx, list_id, task.clone()).await?;
                    return Ok(task);
                }
                Err(err) if matches!(self.offline_mode, OfflineMode::Auto) && err.is_retryable() => {}
                Err(err) => return Err(err),
            }
        }
        let task = self.cache.update_task(ctx, list_id, task).await?;
        self.enqueue(OperationType::Update, list_id, &task)?;
        Ok(task)
    }

    async fn delete_task(&self, ctx: &Context, list_id: &str, task_id: &str) -> TaskResult<()> {
        let existing = self.cache.get_task(ctx, list_id, task_id).await?;
        if self.remote_reachable().await {
            match self.remote.delete_task(ctx, list_id, task_id).await {
                Ok(()) => {
                    self.cache.delete_task(ctx, list_id, task_id).await?;
                    return Ok(());
                }
                Err(err) if matches!(self.offline_mode, OfflineMode::Auto) && err.is_retryable() => {}
                Err(err) => return Err(err),
            }
        }
        self.cache.delete_task(ctx, list_id, task_id).await?;
        if let Some(task) = existing {
            self.enqueue(OperationType::Delete, list_id, &task)?;
        }
        Ok(())
    }

    async fn close(&self) -> TaskResult<()> {
        // Reverse of construction order: wrapper -> remote -> cache.
        self.remote.close().await?;
        self.cache.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{shared, QueueStore};
    use crate::test_support::InMemoryRemote;
    use tasktool_cache::SqliteCache;
    use tempfile::tempdir;

    fn wrapper(dir: &tempfile::TempDir, offline_mode: OfflineMode, remote: Arc<dyn TaskManager>) -> SyncAwareTaskManager {
        let backend_id = BackendId::new("remote").unwrap();
        let cache: Arc<dyn TaskManager> =
            Arc::new(SqliteCache::open(backend_id.clone(), dir.path().join("cache.db")).unwrap());
        let queue = shared(QueueStore::open_or_create(&dir.path().join("queue.db")).unwrap());
        SyncAwareTaskManager::new(backend_id, cache, remote, queue, offline_mode, Duration::from_millis(100))
    }

    #[tokio::test]
    async fn online_write_mirrors_into_cache() {
        let dir = tempdir().unwrap();
        let remote: Arc<dyn TaskManager> = Arc::new(InMemoryRemote::new(BackendId::new("remote").unwrap()));
        let w = wrapper(&dir, OfflineMode::Online, remote);
        let ctx = Context::background();

        let list = w.create_list(&ctx, TaskListDraft::new("Inbox")).await.unwrap();
        let task = w
            .create_task(&ctx, &list.id, TaskDraft::new(&list.id, "ship it"))
            .await
            .unwrap();

        assert!(w.cache.get_task(&ctx, &list.id, &task.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn offline_write_enqueues_pending_operation() {
        let dir = tempdir().unwrap();
        let remote: Arc<dyn TaskManager> = Arc::new(InMemoryRemote::new(BackendId::new("remote").unwrap()));
        let w = wrapper(&dir, OfflineMode::Offline, remote);
        let ctx = Context::background();

        let list = w.create_list(&ctx, TaskListDraft::new("Inbox")).await.unwrap();
        let task = w
            .create_task(&ctx, &list.id, TaskDraft::new(&list.id, "draft while offline"))
            .await
            .unwrap();

        let due = w.queue.lock().unwrap().due_operations("remote").unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].task_id, task.id);
    }
}
