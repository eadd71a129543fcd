//! A minimal in-memory `TaskManager`, shared by `push`/`pull`/`wrapper`
//! tests so they don't each hand-roll a remote stub.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tasktool_contract::TaskManager;
use tasktool_domain::{
    new_local_id, BackendId, Context, Task, TaskDraft, TaskError, TaskList, TaskListDraft,
    TaskResult,
};

struct State {
    lists: HashMap<String, TaskList>,
    tasks: HashMap<String, Task>,
}

/// An in-memory stand-in for a remote backend. `failing` makes every
/// mutating call return a retryable error, for exercising push's
/// backoff/park logic without a real network dependency.
pub struct InMemoryRemote {
    id: BackendId,
    state: Mutex<State>,
    failing: bool,
}

impl InMemoryRemote {
    pub fn new(id: BackendId) -> Self {
        InMemoryRemote {
            id,
            state: Mutex::new(State {
                lists: HashMap::new(),
                tasks: HashMap::new(),
            }),
            failing: false,
        }
    }

    pub fn failing(id: BackendId) -> Self {
        InMemoryRemote {
            id,
            state: Mutex::new(State {
                lists: HashMap::new(),
                tasks: HashMap::new(),
            }),
            failing: true,
        }
    }
}

#[async_trait]
impl TaskManager for InMemoryRemote {
    fn backend_id(&self) -> &BackendId {
        &self.id
    }

    async fn get_lists(&self, _ctx: &Context) -> TaskResult<Vec<TaskList>> {
        Ok(self.state.lock().unwrap().lists.values().cloned().collect())
    }

    async fn get_list(&self, _ctx: &Context, id: &str) -> TaskResult<Option<TaskList>> {
        Ok(self.state.lock().unwrap().lists.get(id).cloned())
    }

    async fn get_list_by_name(&self, _ctx: &Context, name: &str) -> TaskResult<Option<TaskList>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .lists
            .values()
            .find(|l| l.name_matches(name))
            .cloned())
    }

    async fn create_list(&self, _ctx: &Context, draft: TaskListDraft) -> TaskResult<TaskList> {
        if self.failing {
            return Err(TaskError::transient("remote unreachable"));
        }
        let list = TaskList::from_draft(new_local_id(), self.id.as_str(), draft)?;
        self.state.lock().unwrap().lists.insert(list.id.clone(), list.clone());
        Ok(list)
    }

    async fn update_list(&self, _ctx: &Context, list: TaskList) -> TaskResult<TaskList> {
        if self.failing {
            return Err(TaskError::transient("remote unreachable"));
        }
        self.state.lock().unwrap().lists.insert(list.id.clone(), list.clone());
        Ok(list)
    }

    async fn delete_list(&self, _ctx: &Context, id: &str) -> TaskResult<()> {
        if let Some(list) = self.state.lock().unwrap().lists.get_mut(id) {
            list.deleted_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn get_deleted_lists(&self, _ctx: &Context) -> TaskResult<Vec<TaskList>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .lists
            .values()
            .filter(|l| !l.is_active())
            .cloned()
            .collect())
    }

    async fn get_deleted_list_by_name(&self, _ctx: &Context, name: &str) -> TaskResult<Option<TaskList>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .lists
            .values()
            .find(|l| !l.is_active() && l.name_matches(name))
            .cloned())
    }

    async fn restore_list(&self, _ctx: &Context, id: &str) -> TaskResult<TaskList> {
        let mut state = self.state.lock().unwrap();
        let list = state
            .lists
            .get_mut(id)
            .ok_or_else(|| TaskError::not_found(format!("list {id} not found")))?;
        list.deleted_at = None;
        Ok(list.clone())
    }

    async fn purge_list(&self, _ctx: &Context, id: &str) -> TaskResult<()> {
        let mut state = self.state.lock().unwrap();
        state.lists.remove(id);
        state.tasks.retain(|_, t| t.list_id != id);
        Ok(())
    }

    async fn get_tasks(&self, _ctx: &Context, list_id: &str) -> TaskResult<Vec<Task>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .tasks
            .values()
            .filter(|t| t.list_id == list_id)
            .cloned()
            .collect())
    }

    async fn get_task(&self, _ctx: &Context, _list_id: &str, task_id: &str) -> TaskResult<Option<Task>> {
        Ok(self.state.lock().unwrap().tasks.get(task_id).cloned())
    }

    async fn create_task(&self, _ctx: &Context, list_id: &str, draft: TaskDraft) -> TaskResult<Task> {
        if self.failing {
            return Err(TaskError::transient("remote unreachable"));
        }
        let mut draft = draft;
        draft.list_id = list_id.to_string();
        let task = Task::from_draft(new_local_id(), self.id.as_str(), draft)?;
        self.state.lock().unwrap().tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn update_task(&self, _ctx: &Context, _list_id: &str, task: Task) -> TaskResult<Task> {
        if self.failing {
            return Err(TaskError::transient("remote unreachable"));
        }
        self.state.lock().unwrap().tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn delete_task(&self, _ctx: &Context, _list_id: &str, task_id: &str) -> TaskResult<()> {
        if self.failing {
            return Err(TaskError::transient("remote unreachable"));
        }
        self.state.lock().unwrap().tasks.remove(task_id);
        Ok(())
    }

    async fn close(&self) -> TaskResult<()> {
        Ok(())
    }
}
