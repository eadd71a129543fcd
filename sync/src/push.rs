use std::sync::Arc;
use std::time::Duration;

use tasktool_contract::TaskManager;
use tasktool_domain::{Context, Task, TaskError, TaskListDraft, TaskResult};

use crate::order::topological_order;
use crate::queue::{OperationType, PendingOperation, SharedQueue};
use crate::retry::{backoff_delay, MAX_ATTEMPTS};

#[derive(Debug, Default, Clone)]
pub struct PushReport {
    pub applied: u32,
    pub retried: u32,
    pub parked: u32,
}

/// Replays the durable queue against `remote`, in `created_at`/topological
/// order, retrying transient failures with backoff and parking rows that
/// exhaust `MAX_ATTEMPTS`.
pub async fn push(queue: &SharedQueue, remote: &Arc<dyn TaskManager>, ctx: &Context) -> TaskResult<PushReport> {
    let backend_name = remote.backend_id().as_str().to_string();
    let due = queue.lock().unwrap().due_operations(&backend_name)?;
    let ordered = topological_order(due);

    let mut report = PushReport::default();
    for op in ordered {
        ctx.check()?;
        match apply_one(remote, ctx, &op).await {
            Ok(()) => {
                queue.lock().unwrap().remove(op.id)?;
                report.applied += 1;
                tracing::debug!(backend = %backend_name, op_id = op.id, task_id = %op.task_id, "pushed queued operation");
            }
            Err(err) if should_park(&err, op.attempts + 1) => {
                queue
                    .lock()
                    .unwrap()
                    .record_failure(op.id, op.attempts + 1, &err.to_string(), chrono::Utc::now(), true)?;
                report.parked += 1;
                tracing::warn!(backend = %backend_name, op_id = op.id, error = %err, "parked queued operation after exhausting retries");
            }
            Err(err) => {
                let delay = retry_delay(&err, op.attempts + 1);
                queue.lock().unwrap().record_failure(
                    op.id,
                    op.attempts + 1,
                    &err.to_string(),
                    chrono::Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default(),
                    false,
                )?;
                report.retried += 1;
                tracing::debug!(backend = %backend_name, op_id = op.id, delay_ms = delay.as_millis() as u64, "rescheduled queued operation after transient failure");
            }
        }
    }
    tracing::info!(backend = %backend_name, applied = report.applied, retried = report.retried, parked = report.parked, "push complete");
    Ok(report)
}

fn should_park(err: &TaskError, attempts_after: u32) -> bool {
    !err.is_retryable() || attempts_after >= MAX_ATTEMPTS
}

fn retry_delay(err: &TaskError, attempts_after: u32) -> Duration {
    if let TaskError::RateLimited { retry_after: Some(d), .. } = err {
        return *d;
    }
    backoff_delay(attempts_after)
}

async fn apply_one(remote: &Arc<dyn TaskManager>, ctx: &Context, op: &PendingOperation) -> TaskResult<()> {
    ensure_list_exists(remote, ctx, op).await?;

    match op.operation_type {
        OperationType::Create => {
            let snapshot = op
                .payload
                .as_ref()
                .ok_or_else(|| TaskError::Fatal {
                    message: "queued create is missing its payload snapshot".to_string(),
                    suggestion: None,
                })?;
            let draft = crate::wrapper::draft_from_snapshot(snapshot);
            remote.create_task(ctx, &op.list_id, draft).await?;
            Ok(())
        }
        OperationType::Update => {
            let snapshot = op
                .payload
                .as_ref()
                .ok_or_else(|| TaskError::Fatal {
                    message: "queued update is missing its payload snapshot".to_string(),
                    suggestion: None,
                })?;
            let task: Task = snapshot.clone().into_task()?;
            remote.update_task(ctx, &op.list_id, task).await?;
            Ok(())
        }
        OperationType::Delete => match remote.delete_task(ctx, &op.list_id, &op.task_id).await {
            Ok(()) => Ok(()),
            Err(TaskError::NotFound { .. }) => Ok(()),
            Err(err) => Err(err),
        },
    }
}

/// Best-effort: if the op is a task-create whose list doesn't exist on the
/// remote yet (it was created locally while offline), create it there
/// first using the same id so subsequent pulls reconcile cleanly.
async fn ensure_list_exists(remote: &Arc<dyn TaskManager>, ctx: &Context, op: &PendingOperation) -> TaskResult<()> {
    if op.operation_type != OperationType::Create {
        return Ok(());
    }
    if remote.get_list(ctx, &op.list_id).await?.is_some() {
        return Ok(());
    }
    let name = op
        .payload
        .as_ref()
        .map(|_| op.list_id.clone())
        .unwrap_or_else(|| op.list_id.clone());
    match remote.create_list(ctx, TaskListDraft::new(name)).await {
        Ok(_) | Err(TaskError::AlreadyExists { .. }) => Ok(()),
        Err(TaskError::NotSupported { .. }) => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{shared, QueueStore, TaskSnapshot};
    use tasktool_domain::{new_local_id, BackendId};
    use tempfile::tempdir;

    use crate::test_support::InMemoryRemote;

    fn snapshot(list_id: &str, task_id: &str) -> TaskSnapshot {
        TaskSnapshot {
            id: task_id.to_string(),
            backend_id: "remote".to_string(),
            list_id: list_id.to_string(),
            parent_id: None,
            summary: "pushed task".to_string(),
            description: None,
            status: "NEEDS-ACTION".to_string(),
            priority: 0,
            due_date: None,
            start_date: None,
            completed_at: None,
            created_at: chrono::Utc::now(),
            modified_at: chrono::Utc::now(),
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn successful_push_removes_row_from_queue() {
        let dir = tempdir().unwrap();
        let queue = shared(QueueStore::open_or_create(&dir.path().join("queue.db")).unwrap());
        let remote: Arc<dyn TaskManager> = Arc::new(InMemoryRemote::new(BackendId::new("remote").unwrap()));
        let ctx = Context::background();

        let list = remote.create_list(&ctx, TaskListDraft::new("Inbox")).await.unwrap();
        let task_id = new_local_id();
        queue.lock().unwrap().enqueue("remote", OperationType::Create, &list.id, &task_id, Some(&snapshot(&list.id, &task_id)))
            .unwrap();

        let report = push(&queue, &remote, &ctx).await.unwrap();
        assert_eq!(report.applied, 1);
        assert!(queue.lock().unwrap().due_operations("remote").unwrap().is_empty());
    }

    #[tokio::test]
    async fn transient_failure_reschedules_with_backoff() {
        let dir = tempdir().unwrap();
        let queue = shared(QueueStore::open_or_create(&dir.path().join("queue.db")).unwrap());
        let remote: Arc<dyn TaskManager> = Arc::new(InMemoryRemote::failing(BackendId::new("remote").unwrap()));
        let ctx = Context::background();

        let task_id = new_local_id();
        queue.lock().unwrap().enqueue("remote", OperationType::Create, "list-1", &task_id, Some(&snapshot("list-1", &task_id)))
            .unwrap();

        let report = push(&queue, &remote, &ctx).await.unwrap();
        assert_eq!(report.retried, 1);
        let due_immediately = queue.lock().unwrap().due_operations("remote").unwrap();
        assert!(due_immediately.is_empty(), "row should be scheduled in the future, not due now");
    }

    #[tokio::test]
    async fn exhausted_attempts_are_parked() {
        let dir = tempdir().unwrap();
        let queue = shared(QueueStore::open_or_create(&dir.path().join("queue.db")).unwrap());
        let remote: Arc<dyn TaskManager> = Arc::new(InMemoryRemote::failing(BackendId::new("remote").unwrap()));
        let ctx = Context::background();
        let task_id = new_local_id();
        let id = queue.lock().unwrap().enqueue("remote", OperationType::Create, "list-1", &task_id, Some(&snapshot("list-1", &task_id)))
            .unwrap();

        for attempt in 1..MAX_ATTEMPTS {
            queue.lock().unwrap().record_failure(id, attempt, "boom", chrono::Utc::now(), false).unwrap();
        }
        let report = push(&queue, &remote, &ctx).await.unwrap();
        assert_eq!(report.parked, 1);
        assert_eq!(queue.lock().unwrap().parked_operations("remote").unwrap().len(), 1);
    }
}
