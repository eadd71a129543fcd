use std::sync::Arc;

use tasktool_contract::{ConflictResolution, TaskManager};
use tasktool_domain::{Context, TaskError, TaskResult};

use crate::queue::{SharedQueue, TaskSnapshot};

#[derive(Debug, Default, Clone)]
pub struct PullReport {
    pub lists_synced: u32,
    pub inserted: u32,
    pub updated: u32,
    pub deleted: u32,
    pub conflicts: u32,
}

impl PullReport {
    fn merge(&mut self, other: PullReport) {
        self.lists_synced += other.lists_synced;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.conflicts += other.conflicts;
    }
}

/// Reconciles `cache` against `remote`: new remote tasks are inserted,
/// changed ones are merged per `policy`, and tasks gone from the remote are
/// removed locally. One list at a time; `pull_all` fans this out across a
/// bounded worker pool when syncing several lists concurrently.
///
/// Inserts and updates both go through `TaskManager::update_task`: the
/// cache backend's implementation upserts by `(backend_id, id)`, so mirroring
/// a remote-authoritative task (new or changed) is the same call either way.
pub async fn pull_list(
    queue: &SharedQueue,
    cache: &Arc<dyn TaskManager>,
    remote: &Arc<dyn TaskManager>,
    remote_list_id: &str,
    policy: ConflictResolution,
    ctx: &Context,
) -> TaskResult<PullReport> {
    let backend_name = remote.backend_id().as_str().to_string();
    let mut report = PullReport::default();

    let remote_tasks = remote.get_tasks(ctx, remote_list_id).await?;
    let local_tasks = cache.get_tasks(ctx, remote_list_id).await?;
    let watermark = queue.lock().unwrap().last_synced_at(&backend_name)?;

    let remote_ids: std::collections::HashSet<&str> = remote_tasks.iter().map(|t| t.id.as_str()).collect();

    for remote_task in &remote_tasks {
        ctx.check()?;
        match local_tasks.iter().find(|t| t.id == remote_task.id) {
            None => {
                cache.update_task(ctx, remote_list_id, remote_task.clone()).await?;
                report.inserted += 1;
            }
            Some(local_task) => {
                if remote_task.modified_at <= local_task.modified_at {
                    continue;
                }
                let locally_modified_since_sync = watermark.map(|w| local_task.modified_at > w).unwrap_or(false);
                if !locally_modified_since_sync {
                    cache.update_task(ctx, remote_list_id, remote_task.clone()).await?;
                    report.updated += 1;
                    continue;
                }
                match policy {
                    ConflictResolution::Remote => {
                        cache.update_task(ctx, remote_list_id, remote_task.clone()).await?;
                        report.updated += 1;
                    }
                    ConflictResolution::Local => {
                        // Cache keeps its copy; the next push re-asserts it on the remote.
                    }
                    ConflictResolution::Manual => {
                        queue.lock().unwrap().record_conflict(
                            &backend_name,
                            remote_list_id,
                            &remote_task.id,
                            &TaskSnapshot::from(local_task),
                            &TaskSnapshot::from(remote_task),
                        )?;
                        report.conflicts += 1;
                        tracing::warn!(backend = %backend_name, task_id = %remote_task.id, "recorded manual conflict during pull");
                    }
                }
            }
        }
    }

    for local_task in &local_tasks {
        if local_task.backend_id != backend_name {
            continue;
        }
        if !remote_ids.contains(local_task.id.as_str()) {
            cache.delete_task(ctx, remote_list_id, &local_task.id).await?;
            report.deleted += 1;
        }
    }

    report.lists_synced = 1;
    queue.lock().unwrap().set_last_synced_at(&backend_name, chrono::Utc::now())?;
    tracing::debug!(
        backend = %backend_name,
        list_id = remote_list_id,
        inserted = report.inserted,
        updated = report.updated,
        deleted = report.deleted,
        conflicts = report.conflicts,
        "pulled list"
    );
    Ok(report)
}

/// Fetches every list from `remote` and pulls each one, running up to
/// `concurrency` lists at a time via `tokio::spawn`.
pub async fn pull_all(
    queue: &SharedQueue,
    cache: &Arc<dyn TaskManager>,
    remote: &Arc<dyn TaskManager>,
    policy: ConflictResolution,
    ctx: &Context,
    concurrency: usize,
) -> TaskResult<PullReport> {
    let remote_lists = remote.get_lists(ctx).await?;
    for list in &remote_lists {
        if cache.get_list(ctx, &list.id).await?.is_none() {
            cache.update_list(ctx, list.clone()).await?;
        }
    }

    let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(remote_lists.len());

    for list in remote_lists {
        let semaphore = semaphore.clone();
        let queue = queue.clone();
        let cache = cache.clone();
        let remote = remote.clone();
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            pull_list(&queue, &cache, &remote, &list.id, policy, &ctx).await
        }));
    }

    let mut total = PullReport::default();
    for handle in handles {
        let report = handle
            .await
            .map_err(|e| TaskError::Fatal {
                message: format!("pull worker panicked: {e}"),
                suggestion: None,
            })??;
        total.merge(report);
    }
    Ok(total)
}
