//! Durable offline queue and push/pull reconciliation tying an embedded
//! cache to a remote `TaskManager`: `wrapper::SyncAwareTaskManager` is the
//! public-facing composed backend; `SyncEngine` runs the background
//! push/pull cycle against its queue.

mod connectivity;
mod order;
mod pull;
mod push;
mod queue;
mod retry;
mod wrapper;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use tasktool_contract::{ConflictResolution, TaskManager};
use tasktool_domain::{Context, TaskResult};

pub use connectivity::probe;
pub use pull::{pull_all, pull_list, PullReport};
pub use push::{push, PushReport};
pub use queue::{
    shared, ConflictRecord, OperationType, PendingOperation, QueueStore, SharedQueue, TaskSnapshot,
};
pub use retry::{backoff_delay, parse_retry_after, MAX_ATTEMPTS};
pub use wrapper::SyncAwareTaskManager;

/// The outcome of one push-then-pull cycle.
#[derive(Debug, Default, Clone)]
pub struct SyncReport {
    pub push: PushReport,
    pub pull: PullReport,
}

/// Ties the durable queue, cache, and remote together and runs the
/// push-then-pull cycle the CLI's `sync` command (and the auto-sync hook
/// after each mutating operation) calls into.
pub struct SyncEngine {
    queue: SharedQueue,
    cache: Arc<dyn TaskManager>,
    remote: Arc<dyn TaskManager>,
    conflict_policy: ConflictResolution,
    pull_concurrency: usize,
}

/// Lists are pulled in parallel up to this many at a time unless the
/// caller overrides it via `SyncEngine::with_pull_concurrency`.
pub const DEFAULT_PULL_CONCURRENCY: usize = 4;

impl SyncEngine {
    pub fn new(
        queue: SharedQueue,
        cache: Arc<dyn TaskManager>,
        remote: Arc<dyn TaskManager>,
        conflict_policy: ConflictResolution,
    ) -> Self {
        SyncEngine {
            queue,
            cache,
            remote,
            conflict_policy,
            pull_concurrency: DEFAULT_PULL_CONCURRENCY,
        }
    }

    pub fn with_pull_concurrency(mut self, concurrency: usize) -> Self {
        self.pull_concurrency = concurrency.max(1);
        self
    }

    /// Replays the offline queue against the remote, then reconciles every
    /// list from the remote back into the cache. Pushing first means a
    /// conflict the push itself resolves (remote accepts the local write)
    /// never gets re-flagged by the pull that follows.
    pub async fn run(&self, ctx: &Context) -> TaskResult<SyncReport> {
        let push_report = push(&self.queue, &self.remote, ctx).await?;
        let pull_report = pull_all(
            &self.queue,
            &self.cache,
            &self.remote,
            self.conflict_policy,
            ctx,
            self.pull_concurrency,
        )
        .await?;
        tracing::info!(
            backend = %self.remote.backend_id(),
            pushed = push_report.applied,
            parked = push_report.parked,
            pulled = pull_report.inserted + pull_report.updated,
            deleted = pull_report.deleted,
            "sync cycle complete"
        );
        Ok(SyncReport {
            push: push_report,
            pull: pull_report,
        })
    }

    pub fn conflicts(&self) -> TaskResult<Vec<ConflictRecord>> {
        self.queue.lock().unwrap().conflicts(self.remote.backend_id().as_str())
    }

    pub fn clear_parked(&self) -> TaskResult<u64> {
        self.queue.lock().unwrap().clear_parked(self.remote.backend_id().as_str())
    }

    /// Probes the remote under `timeout`, the same check `SyncAwareTaskManager`
    /// uses in `auto` offline mode to decide whether to write through.
    pub async fn remote_reachable(&self, timeout: Duration) -> bool {
        probe(&self.remote, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::InMemoryRemote;
    use tasktool_cache::SqliteCache;
    use tasktool_domain::{BackendId, TaskDraft, TaskListDraft};
    use tempfile::tempdir;

    #[tokio::test]
    async fn run_pushes_queued_writes_then_pulls_remote_state() {
        let dir = tempdir().unwrap();
        let backend_id = BackendId::new("remote").unwrap();
        let remote: Arc<dyn TaskManager> = Arc::new(InMemoryRemote::new(backend_id.clone()));
        let cache: Arc<dyn TaskManager> =
            Arc::new(SqliteCache::open(backend_id.clone(), dir.path().join("cache.db")).unwrap());
        let queue = shared(QueueStore::open_or_create(&dir.path().join("queue.db")).unwrap());
        let ctx = Context::background();

        // Something appears directly on the remote, as if another client wrote it.
        let remote_list = remote.create_list(&ctx, TaskListDraft::new("Inbox")).await.unwrap();
        remote
            .create_task(&ctx, &remote_list.id, TaskDraft::new(&remote_list.id, "from remote"))
            .await
            .unwrap();

        let engine = SyncEngine::new(queue, cache.clone(), remote, ConflictResolution::Remote);
        let report = engine.run(&ctx).await.unwrap();

        assert_eq!(report.pull.inserted, 1);
        let mirrored = cache.get_tasks(&ctx, &remote_list.id).await.unwrap();
        assert_eq!(mirrored.len(), 1);
        assert_eq!(mirrored[0].summary, "from remote");
    }
}
