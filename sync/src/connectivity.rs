use std::sync::Arc;
use std::time::Duration;

use tasktool_contract::TaskManager;
use tasktool_domain::Context;

/// A lightweight `Ping`-style reachability check. The contract has no
/// dedicated ping operation, so probing calls the cheapest read
/// (`get_lists`) under a bounded timeout and treats any response,
/// including an empty list, as "reachable".
pub async fn probe(remote: &Arc<dyn TaskManager>, timeout: Duration) -> bool {
    let ctx = Context::with_timeout(timeout);
    let reachable = matches!(remote.get_lists(&ctx).await, Ok(_));
    tracing::debug!(backend = %remote.backend_id(), reachable, timeout_ms = timeout.as_millis() as u64, "connectivity probe");
    reachable
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tasktool_domain::{BackendId, Task, TaskDraft, TaskList, TaskListDraft, TaskResult};
    use tokio::time::sleep;

    struct SlowBackend {
        id: BackendId,
        delay: Duration,
    }

    #[async_trait]
    impl TaskManager for SlowBackend {
        fn backend_id(&self) -> &BackendId {
            &self.id
        }
        async fn get_lists(&self, ctx: &Context) -> TaskResult<Vec<TaskList>> {
            ctx.run(async {
                sleep(self.delay).await;
                Ok(vec![])
            })
            .await
        }
        async fn get_list(&self, _ctx: &Context, _id: &str) -> TaskResult<Option<TaskList>> {
            Ok(None)
        }
        async fn get_list_by_name(&self, _ctx: &Context, _name: &str) -> TaskResult<Option<TaskList>> {
            Ok(None)
        }
        async fn create_list(&self, _ctx: &Context, _draft: TaskListDraft) -> TaskResult<TaskList> {
            unimplemented!()
        }
        async fn update_list(&self, _ctx: &Context, list: TaskList) -> TaskResult<TaskList> {
            Ok(list)
        }
        async fn delete_list(&self, _ctx: &Context, _id: &str) -> TaskResult<()> {
            Ok(())
        }
        async fn get_deleted_lists(&self, _ctx: &Context) -> TaskResult<Vec<TaskList>> {
            Ok(vec![])
        }
        async fn get_deleted_list_by_name(&self, _ctx: &Context, _name: &str) -> TaskResult<Option<TaskList>> {
            Ok(None)
        }
        async fn restore_list(&self, _ctx: &Context, _id: &str) -> TaskResult<TaskList> {
            unimplemented!()
        }
        async fn purge_list(&self, _ctx: &Context, _id: &str) -> TaskResult<()> {
            Ok(())
        }
        async fn get_tasks(&self, _ctx: &Context, _list_id: &str) -> TaskResult<Vec<Task>> {
            Ok(vec![])
        }
        async fn get_task(&self, _ctx: &Context, _list_id: &str, _task_id: &str) -> TaskResult<Option<Task>> {
            Ok(None)
        }
        async fn create_task(&self, _ctx: &Context, _list_id: &str, _draft: TaskDraft) -> TaskResult<Task> {
            unimplemented!()
        }
        async fn update_task(&self, _ctx: &Context, _list_id: &str, task: Task) -> TaskResult<Task> {
            Ok(task)
        }
        async fn delete_task(&self, _ctx: &Context, _list_id: &str, _task_id: &str) -> TaskResult<()> {
            Ok(())
        }
        async fn close(&self) -> TaskResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn probe_succeeds_within_timeout() {
        let remote: Arc<dyn TaskManager> = Arc::new(SlowBackend {
            id: BackendId::new("remote").unwrap(),
            delay: Duration::from_millis(5),
        });
        assert!(probe(&remote, Duration::from_millis(200)).await);
    }

    #[tokio::test]
    async fn probe_fails_when_slower_than_timeout() {
        let remote: Arc<dyn TaskManager> = Arc::new(SlowBackend {
            id: BackendId::new("remote").unwrap(),
            delay: Duration::from_millis(200),
        });
        assert!(!probe(&remote, Duration::from_millis(20)).await);
    }
}
