//! Task status and agent execution substate.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Created, never started
    Todo,
    /// Agent session is working
    InProgress,
    /// Agent is waiting on the operator
    NeedsInput,
    /// Work handed off, waiting for a reviewer
    ForReview,
    /// Review underway
    Reviewing,
    /// Review finished, awaiting approval or merge
    Reviewed,
    /// Review complete, ready to merge
    Done,
    /// Session died without a clean end
    Error,
    /// Session stopped by the operator or ended cleanly
    Stopped,
    Closed,
    Merged,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 11] = [
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::NeedsInput,
        TaskStatus::ForReview,
        TaskStatus::Reviewing,
        TaskStatus::Reviewed,
        TaskStatus::Done,
        TaskStatus::Error,
        TaskStatus::Stopped,
        TaskStatus::Closed,
        TaskStatus::Merged,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "TODO",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::NeedsInput => "NEEDS_INPUT",
            TaskStatus::ForReview => "FOR_REVIEW",
            TaskStatus::Reviewing => "REVIEWING",
            TaskStatus::Reviewed => "REVIEWED",
            TaskStatus::Done => "DONE",
            TaskStatus::Error => "ERROR",
            TaskStatus::Stopped => "STOPPED",
            TaskStatus::Closed => "CLOSED",
            TaskStatus::Merged => "MERGED",
        }
    }

    /// Short human label used in list rows.
    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in progress",
            TaskStatus::NeedsInput => "needs input",
            TaskStatus::ForReview => "for review",
            TaskStatus::Reviewing => "reviewing",
            TaskStatus::Reviewed => "reviewed",
            TaskStatus::Done => "done",
            TaskStatus::Error => "error",
            TaskStatus::Stopped => "stopped",
            TaskStatus::Closed => "closed",
            TaskStatus::Merged => "merged",
        }
    }

    /// Returns true if no further state-changing action is offered by default.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Closed | TaskStatus::Merged)
    }

    /// Returns true if a worker is expected to be attached.
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::InProgress | TaskStatus::NeedsInput)
    }

    pub fn can_start(self) -> bool {
        matches!(self, TaskStatus::Todo | TaskStatus::Error | TaskStatus::Stopped)
    }

    pub fn can_merge(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Reviewed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| format!("invalid task status '{value}'"))
    }
}

/// Agent execution phase, reported through a side channel next to the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionSubstate {
    #[default]
    Idle,
    AwaitingUser,
    AwaitingPermission,
    Running,
}

impl ExecutionSubstate {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionSubstate::Idle => "idle",
            ExecutionSubstate::AwaitingUser => "awaiting_user",
            ExecutionSubstate::AwaitingPermission => "awaiting_permission",
            ExecutionSubstate::Running => "running",
        }
    }

    /// Compact label; `Running` is the unlabeled default.
    pub fn label(self) -> Option<&'static str> {
        match self {
            ExecutionSubstate::Idle => Some("idle"),
            ExecutionSubstate::AwaitingUser => Some("input"),
            ExecutionSubstate::AwaitingPermission => Some("permission"),
            ExecutionSubstate::Running => None,
        }
    }

    pub fn is_waiting(self) -> bool {
        matches!(
            self,
            ExecutionSubstate::AwaitingUser | ExecutionSubstate::AwaitingPermission
        )
    }
}

impl std::str::FromStr for ExecutionSubstate {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "idle" => Ok(ExecutionSubstate::Idle),
            "awaiting_user" | "awaiting-user" => Ok(ExecutionSubstate::AwaitingUser),
            "awaiting_permission" | "awaiting-permission" => {
                Ok(ExecutionSubstate::AwaitingPermission)
            }
            "running" => Ok(ExecutionSubstate::Running),
            other => Err(format!(
                "invalid execution state '{other}'. valid values: idle, awaiting_user, awaiting_permission, running"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");

        let decoded: TaskStatus = serde_json::from_str("\"FOR_REVIEW\"").unwrap();
        assert_eq!(decoded, TaskStatus::ForReview);
    }

    #[test]
    fn only_closed_and_merged_are_terminal() {
        for status in TaskStatus::ALL {
            let expected = matches!(status, TaskStatus::Closed | TaskStatus::Merged);
            assert_eq!(status.is_terminal(), expected, "{status}");
        }
        assert!(!TaskStatus::Done.is_terminal());
    }

    #[test]
    fn can_start_only_from_todo_error_stopped() {
        let startable: Vec<_> = TaskStatus::ALL
            .into_iter()
            .filter(|status| status.can_start())
            .collect();
        assert_eq!(
            startable,
            vec![TaskStatus::Todo, TaskStatus::Error, TaskStatus::Stopped]
        );
    }

    #[test]
    fn task_status_parses_display_and_human_forms() {
        assert_eq!("NEEDS_INPUT".parse::<TaskStatus>(), Ok(TaskStatus::NeedsInput));
        assert_eq!("needs input".parse::<TaskStatus>(), Ok(TaskStatus::NeedsInput));
        assert_eq!("for-review".parse::<TaskStatus>(), Ok(TaskStatus::ForReview));
        assert!("shipping".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn running_substate_has_no_compact_label() {
        assert_eq!(ExecutionSubstate::Running.label(), None);
        assert_eq!(ExecutionSubstate::Idle.label(), Some("idle"));
        assert_eq!(ExecutionSubstate::AwaitingUser.label(), Some("input"));
        assert_eq!(
            ExecutionSubstate::AwaitingPermission.label(),
            Some("permission")
        );
    }

    #[test]
    fn substate_parses_from_side_channel_text() {
        assert_eq!(
            "awaiting_permission\n".parse::<ExecutionSubstate>(),
            Ok(ExecutionSubstate::AwaitingPermission)
        );
        assert_eq!(
            "RUNNING".parse::<ExecutionSubstate>(),
            Ok(ExecutionSubstate::Running)
        );
        assert!("busy".parse::<ExecutionSubstate>().is_err());
        assert_eq!(ExecutionSubstate::default(), ExecutionSubstate::Idle);
    }
}
