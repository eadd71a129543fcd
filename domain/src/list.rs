use chrono::{DateTime, Utc};

use crate::error::TaskError;

/// A task list ("collection" in CalDAV terms).
#[derive(Debug, Clone)]
pub struct TaskList {
    pub id: String,
    pub backend_id: String,
    pub name: String,
    pub color: Option<String>,
    pub description: Option<String>,
    pub modified_at: DateTime<Utc>,
    /// Absent means active; present means the list is sitting in trash.
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskListDraft {
    pub name: String,
    pub color: Option<String>,
    pub description: Option<String>,
}

impl TaskListDraft {
    pub fn new(name: impl Into<String>) -> Self {
        TaskListDraft {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), TaskError> {
        if self.name.trim().is_empty() {
            return Err(TaskError::invalid_input_with_suggestion(
                "list name cannot be empty",
                "pass a non-empty name",
            ));
        }
        Ok(())
    }
}

impl TaskList {
    pub fn from_draft(
        id: impl Into<String>,
        backend_id: impl Into<String>,
        draft: TaskListDraft,
    ) -> Result<Self, TaskError> {
        draft.validate()?;
        let now = Utc::now();
        Ok(TaskList {
            id: id.into(),
            backend_id: backend_id.into(),
            name: draft.name.trim().to_string(),
            color: draft.color,
            description: draft.description,
            modified_at: now,
            deleted_at: None,
        })
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn soft_delete(&mut self) {
        self.deleted_at = Some(Utc::now());
        self.modified_at = Utc::now();
    }

    pub fn restore(&mut self) {
        self.deleted_at = None;
        self.modified_at = Utc::now();
    }

    pub fn rename(&mut self, name: impl Into<String>) -> Result<(), TaskError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TaskError::invalid_input_with_suggestion(
                "list name cannot be empty",
                "pass a non-empty name",
            ));
        }
        self.name = name.trim().to_string();
        self.modified_at = Utc::now();
        Ok(())
    }

    /// Case-insensitive name match used by `GetListByName`/`GetDeletedListByName`.
    pub fn name_matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_name_rejected() {
        assert!(TaskListDraft::new("   ").validate().is_err());
    }

    #[test]
    fn soft_delete_then_restore_round_trips() {
        let mut list = TaskList::from_draft("l1", "local", TaskListDraft::new("Inbox")).unwrap();
        assert!(list.is_active());
        list.soft_delete();
        assert!(!list.is_active());
        list.restore();
        assert!(list.is_active());
    }

    #[test]
    fn name_match_is_case_insensitive() {
        let list = TaskList::from_draft("l1", "local", TaskListDraft::new("Inbox")).unwrap();
        assert!(list.name_matches("inbox"));
        assert!(list.name_matches("INBOX"));
        assert!(!list.name_matches("archive"));
    }
}
