use serde::{Deserialize, Serialize};

/// Status of a task, following the iCalendar VTODO status vocabulary so that
/// CalDAV-speaking backends round-trip it without translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum TaskStatus {
    NeedsAction,
    InProgress,
    Completed,
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::NeedsAction
    }
}

impl TaskStatus {
    /// The literal token used on the wire (iCalendar / most cloud APIs).
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NeedsAction => "NEEDS-ACTION",
            TaskStatus::InProgress => "IN-PROGRESS",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }

    /// A short label suitable for a status column in a table-formatted
    /// output channel.
    pub fn display_name(&self) -> &'static str {
        match self {
            TaskStatus::NeedsAction => "pending",
            TaskStatus::InProgress => "in progress",
            TaskStatus::Completed => "done",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "NEEDS-ACTION" | "NEEDS_ACTION" | "PENDING" => Ok(TaskStatus::NeedsAction),
            "IN-PROGRESS" | "IN_PROGRESS" => Ok(TaskStatus::InProgress),
            "COMPLETED" | "DONE" => Ok(TaskStatus::Completed),
            "CANCELLED" | "CANCELED" => Ok(TaskStatus::Cancelled),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A 0..9 priority, where 0 means "unset" and 1 is the highest priority.
/// Mirrors the iCalendar PRIORITY property range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Priority(u8);

impl Priority {
    pub const UNSET: Priority = Priority(0);

    pub fn new(value: u8) -> Result<Self, String> {
        if value > 9 {
            return Err(format!("priority {value} out of range 0..9"));
        }
        Ok(Priority(value))
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    pub fn is_unset(&self) -> bool {
        self.0 == 0
    }

    /// Matches the CLI's `-p high|medium|low` buckets: high = 1..=4,
    /// medium = 5, low = 6..=9.
    pub fn bucket(&self) -> Option<PriorityBucket> {
        match self.0 {
            0 => None,
            1..=4 => Some(PriorityBucket::High),
            5 => Some(PriorityBucket::Medium),
            6..=9 => Some(PriorityBucket::Low),
            _ => unreachable!("validated at construction"),
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::UNSET
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityBucket {
    High,
    Medium,
    Low,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_rejects_out_of_range() {
        assert!(Priority::new(10).is_err());
        assert!(Priority::new(9).is_ok());
    }

    #[test]
    fn priority_bucket_matches_cli_ranges() {
        assert_eq!(Priority::new(1).unwrap().bucket(), Some(PriorityBucket::High));
        assert_eq!(Priority::new(4).unwrap().bucket(), Some(PriorityBucket::High));
        assert_eq!(Priority::new(5).unwrap().bucket(), Some(PriorityBucket::Medium));
        assert_eq!(Priority::new(6).unwrap().bucket(), Some(PriorityBucket::Low));
        assert_eq!(Priority::UNSET.bucket(), None);
    }

    #[test]
    fn status_round_trips_through_wire_string() {
        for status in [
            TaskStatus::NeedsAction,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Cancelled,
        ] {
            let parsed: TaskStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }
}
