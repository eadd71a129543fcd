use chrono::{DateTime, NaiveDate, Utc};

use crate::error::TaskError;
use crate::status::{Priority, TaskStatus};
use crate::tags::TagSet;

/// A task as the backend contract sees it: fully hydrated, with a
/// backend-assigned id and authoritative timestamps.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub backend_id: String,
    pub list_id: String,
    pub parent_id: Option<String>,
    pub summary: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub tags: TagSet,
}

/// The fields a caller supplies when creating or updating a task. Backends
/// assign `id`/`created_at`/`modified_at` themselves; a draft never carries
/// them.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub list_id: String,
    pub parent_id: Option<String>,
    pub summary: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub tags: TagSet,
}

impl TaskDraft {
    pub fn new(list_id: impl Into<String>, summary: impl Into<String>) -> Self {
        TaskDraft {
            list_id: list_id.into(),
            summary: summary.into(),
            ..Default::default()
        }
    }

    /// Checks the invariants that hold regardless of backend: non-empty
    /// summary, start/due ordering. Backend implementations call this
    /// before persisting so an invalid draft never reaches storage.
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.summary.trim().is_empty() {
            return Err(TaskError::invalid_input_with_suggestion(
                "task summary cannot be empty",
                "pass a non-empty summary",
            ));
        }
        if let (Some(start), Some(due)) = (self.start_date, self.due_date) {
            if start > due {
                return Err(TaskError::invalid_input_with_suggestion(
                    "start date must not be after due date",
                    "swap start and due dates or clear one of them",
                ));
            }
        }
        Ok(())
    }
}

impl Task {
    /// Builds a fresh, persisted `Task` from a validated draft. Callers are
    /// backend implementations assigning their own id scheme (remote id for
    /// cloud providers, UUIDv4 for purely local backends).
    pub fn from_draft(id: impl Into<String>, backend_id: impl Into<String>, draft: TaskDraft) -> Result<Self, TaskError> {
        draft.validate()?;
        let now = Utc::now();
        let completed_at = (draft.status == TaskStatus::Completed).then_some(now);
        Ok(Task {
            id: id.into(),
            backend_id: backend_id.into(),
            list_id: draft.list_id,
            parent_id: draft.parent_id,
            summary: draft.summary.trim().to_string(),
            description: draft.description,
            status: draft.status,
            priority: draft.priority,
            due_date: draft.due_date,
            start_date: draft.start_date,
            completed_at,
            created_at: now,
            modified_at: now,
            tags: draft.tags,
        })
    }

    /// Applies a new status, maintaining the `completed_at` invariant:
    /// transitioning into COMPLETED stamps it, transitioning out clears it.
    pub fn set_status(&mut self, status: TaskStatus) {
        if status == TaskStatus::Completed && self.status != TaskStatus::Completed {
            self.completed_at = Some(Utc::now());
        } else if status != TaskStatus::Completed {
            self.completed_at = None;
        }
        self.status = status;
        self.touch();
    }

    pub fn set_summary(&mut self, summary: impl Into<String>) -> Result<(), TaskError> {
        let summary = summary.into();
        if summary.trim().is_empty() {
            return Err(TaskError::invalid_input_with_suggestion(
                "task summary cannot be empty",
                "pass a non-empty summary",
            ));
        }
        self.summary = summary.trim().to_string();
        self.touch();
        Ok(())
    }

    pub fn set_dates(
        &mut self,
        start_date: Option<NaiveDate>,
        due_date: Option<NaiveDate>,
    ) -> Result<(), TaskError> {
        if let (Some(start), Some(due)) = (start_date, due_date) {
            if start > due {
                return Err(TaskError::invalid_input_with_suggestion(
                    "start date must not be after due date",
                    "swap start and due dates or clear one of them",
                ));
            }
        }
        self.start_date = start_date;
        self.due_date = due_date;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.modified_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> TaskDraft {
        TaskDraft::new("list-1", "write the spec")
    }

    #[test]
    fn empty_summary_rejected() {
        let mut d = draft();
        d.summary = "   ".to_string();
        assert!(d.validate().is_err());
    }

    #[test]
    fn start_after_due_rejected() {
        let mut d = draft();
        d.start_date = NaiveDate::from_ymd_opt(2026, 3, 10);
        d.due_date = NaiveDate::from_ymd_opt(2026, 3, 1);
        assert!(d.validate().is_err());
    }

    #[test]
    fn completing_sets_timestamp_and_clearing_unsets_it() {
        let mut task = Task::from_draft("t1", "local", draft()).unwrap();
        assert!(task.completed_at.is_none());

        task.set_status(TaskStatus::Completed);
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.is_some());

        task.set_status(TaskStatus::NeedsAction);
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn draft_already_completed_stamps_completion_on_creation() {
        let mut d = draft();
        d.status = TaskStatus::Completed;
        let task = Task::from_draft("t1", "local", d).unwrap();
        assert!(task.completed_at.is_some());
    }
}
