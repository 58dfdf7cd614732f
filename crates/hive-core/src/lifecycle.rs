//! Guarded task lifecycle transitions.
//!
//! Guards are checked by the interface before any session command is issued,
//! so an illegal action never reaches the backend. The transition helpers below
//! re-check the same guards and only mutate the task when they pass.
//!
//! ```text
//! Todo/Error/Stopped --start--> InProgress <--> NeedsInput
//!   InProgress/NeedsInput --submit--> ForReview --review--> Reviewing --finish--> Reviewed
//!   ForReview/Reviewed --approve--> Done
//!   Done/Reviewed --merge--> Merged        any non-terminal --close--> Closed
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{ExecutionSubstate, TaskStatus};
use crate::types::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Start,
    Stop,
    Attach,
    SubmitForReview,
    Review,
    FinishReview,
    Approve,
    Merge,
    Close,
    Block,
    Unblock,
}

impl TaskAction {
    /// Ranked order used when listing guarded options.
    pub const ALL: [TaskAction; 11] = [
        TaskAction::Start,
        TaskAction::Stop,
        TaskAction::Attach,
        TaskAction::SubmitForReview,
        TaskAction::Review,
        TaskAction::FinishReview,
        TaskAction::Approve,
        TaskAction::Merge,
        TaskAction::Close,
        TaskAction::Block,
        TaskAction::Unblock,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskAction::Start => "start",
            TaskAction::Stop => "stop",
            TaskAction::Attach => "attach",
            TaskAction::SubmitForReview => "submit_for_review",
            TaskAction::Review => "review",
            TaskAction::FinishReview => "finish_review",
            TaskAction::Approve => "approve",
            TaskAction::Merge => "merge",
            TaskAction::Close => "close",
            TaskAction::Block => "block",
            TaskAction::Unblock => "unblock",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskAction::Start => "Start",
            TaskAction::Stop => "Stop",
            TaskAction::Attach => "Attach",
            TaskAction::SubmitForReview => "Submit for review",
            TaskAction::Review => "Review",
            TaskAction::FinishReview => "Finish review",
            TaskAction::Approve => "Approve",
            TaskAction::Merge => "Merge",
            TaskAction::Close => "Close",
            TaskAction::Block => "Block",
            TaskAction::Unblock => "Unblock",
        }
    }
}

impl std::fmt::Display for TaskAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("action {action} is not allowed while task is {from}")]
    NotAllowed { action: TaskAction, from: TaskStatus },
    #[error("start requires an agent and a session name")]
    MissingSession,
    #[error("block reason must not be empty")]
    EmptyBlockReason,
    #[error("task is already {status}")]
    AlreadyInStatus { status: TaskStatus },
}

/// One entry of the transition menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Transition {
    Guarded(TaskAction),
    /// Unguarded operator recovery; bypasses every guard.
    Forced(TaskStatus),
}

impl Transition {
    pub fn is_forced(&self) -> bool {
        matches!(self, Transition::Forced(_))
    }

    pub fn label(&self) -> String {
        match self {
            Transition::Guarded(action) => action.label().to_string(),
            Transition::Forced(status) => format!("force -> {}", status.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub action: Option<TaskAction>,
    pub forced: bool,
    pub at: DateTime<Utc>,
}

/// Check whether `action` is legal for `task` in its current state.
pub fn is_action_allowed(action: TaskAction, task: &Task) -> bool {
    use TaskStatus::*;

    let status = task.status;
    match action {
        TaskAction::Start => status.can_start() && !task.has_session(),
        TaskAction::Stop => task.has_session() && !status.is_terminal(),
        TaskAction::Attach => task.has_session(),
        TaskAction::SubmitForReview => matches!(status, InProgress | NeedsInput),
        TaskAction::Review => status == ForReview,
        TaskAction::FinishReview => status == Reviewing,
        TaskAction::Approve => matches!(status, ForReview | Reviewed),
        TaskAction::Merge => status.can_merge(),
        TaskAction::Close => !status.is_terminal(),
        TaskAction::Block => !status.is_terminal() && !task.is_blocked(),
        TaskAction::Unblock => !status.is_terminal() && task.is_blocked(),
    }
}

/// Destination status of a guarded action, `None` when it leaves status unchanged.
pub fn target_status(action: TaskAction) -> Option<TaskStatus> {
    match action {
        TaskAction::Start => Some(TaskStatus::InProgress),
        TaskAction::Stop => Some(TaskStatus::Stopped),
        TaskAction::SubmitForReview => Some(TaskStatus::ForReview),
        TaskAction::Review => Some(TaskStatus::Reviewing),
        TaskAction::FinishReview => Some(TaskStatus::Reviewed),
        TaskAction::Approve => Some(TaskStatus::Done),
        TaskAction::Merge => Some(TaskStatus::Merged),
        TaskAction::Close => Some(TaskStatus::Closed),
        TaskAction::Attach | TaskAction::Block | TaskAction::Unblock => None,
    }
}

/// Whether a successful action tears the task's session down.
pub fn action_ends_session(action: TaskAction) -> bool {
    matches!(
        action,
        TaskAction::Stop | TaskAction::FinishReview | TaskAction::Merge | TaskAction::Close
    )
}

/// Guarded actions that are legal now, in ranked order.
pub fn allowed_actions(task: &Task) -> Vec<TaskAction> {
    TaskAction::ALL
        .into_iter()
        .filter(|action| is_action_allowed(*action, task))
        .collect()
}

/// Transition menu: legal guarded actions first, then every other status as
/// a forced destination.
pub fn available_transitions(task: &Task) -> Vec<Transition> {
    let mut out: Vec<Transition> = allowed_actions(task)
        .into_iter()
        .filter(|action| *action != TaskAction::Attach)
        .map(Transition::Guarded)
        .collect();
    out.extend(
        TaskStatus::ALL
            .into_iter()
            .filter(|status| *status != task.status)
            .map(Transition::Forced),
    );
    out
}

/// Start a task: status -> InProgress, session populated, first start time recorded.
pub fn start_task(
    task: &mut Task,
    agent: &str,
    session: &str,
    at: DateTime<Utc>,
) -> Result<StateTransition, LifecycleError> {
    ensure_allowed(TaskAction::Start, task)?;
    if agent.trim().is_empty() || session.trim().is_empty() {
        return Err(LifecycleError::MissingSession);
    }

    let from = task.status;
    task.status = TaskStatus::InProgress;
    task.agent = agent.trim().to_string();
    task.session = session.to_string();
    task.started_at.get_or_insert(at);
    task.updated_at = at;

    Ok(StateTransition {
        from,
        to: task.status,
        action: Some(TaskAction::Start),
        forced: false,
        at,
    })
}

/// Apply a guarded action that needs no extra input.
pub fn transition_task(
    task: &mut Task,
    action: TaskAction,
    at: DateTime<Utc>,
) -> Result<StateTransition, LifecycleError> {
    ensure_allowed(action, task)?;

    let from = task.status;
    match action {
        TaskAction::Start | TaskAction::Block => {
            return Err(LifecycleError::NotAllowed { action, from });
        }
        TaskAction::Unblock => task.block_reason = None,
        _ => {}
    }

    if let Some(to) = target_status(action) {
        task.status = to;
    }
    if action_ends_session(action) {
        task.session.clear();
    }
    task.updated_at = at;

    Ok(StateTransition {
        from,
        to: task.status,
        action: Some(action),
        forced: false,
        at,
    })
}

/// Begin a review; `reviewer_session` replaces the worker session when an
/// agent performs the review.
pub fn begin_review(
    task: &mut Task,
    reviewer_session: Option<&str>,
    at: DateTime<Utc>,
) -> Result<StateTransition, LifecycleError> {
    let transition = transition_task(task, TaskAction::Review, at)?;
    if let Some(session) = reviewer_session {
        task.session = session.to_string();
    }
    Ok(transition)
}

pub fn block_task(
    task: &mut Task,
    reason: &str,
    at: DateTime<Utc>,
) -> Result<StateTransition, LifecycleError> {
    ensure_allowed(TaskAction::Block, task)?;
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(LifecycleError::EmptyBlockReason);
    }
    task.block_reason = Some(reason.to_string());
    task.updated_at = at;
    Ok(StateTransition {
        from: task.status,
        to: task.status,
        action: Some(TaskAction::Block),
        forced: false,
        at,
    })
}

/// Unguarded status change for operator recovery. The session is left as is.
pub fn force_status(
    task: &mut Task,
    to: TaskStatus,
    at: DateTime<Utc>,
) -> Result<StateTransition, LifecycleError> {
    let from = task.status;
    if from == to {
        return Err(LifecycleError::AlreadyInStatus { status: to });
    }
    tracing::warn!(task_id = %task.id, %from, %to, "forced status transition");
    task.status = to;
    task.updated_at = at;
    Ok(StateTransition {
        from,
        to,
        action: None,
        forced: true,
        at,
    })
}

/// What a tick observed about a task's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionObservation {
    /// The session is gone. `clean_end` is true when the log recorded a session end.
    Gone { clean_end: bool },
    Running(ExecutionSubstate),
}

/// Align a task with its observed session. Returns the transition when the
/// task changed, `None` when it already agrees.
pub fn reconcile_task(
    task: &mut Task,
    observed: SessionObservation,
    at: DateTime<Utc>,
) -> Option<StateTransition> {
    if !task.has_session() {
        return None;
    }
    let from = task.status;
    match observed {
        SessionObservation::Gone { clean_end } => {
            task.session.clear();
            if from.is_active() {
                task.status = if clean_end {
                    TaskStatus::Stopped
                } else {
                    TaskStatus::Error
                };
            }
            tracing::info!(task_id = %task.id, %from, to = %task.status, clean_end, "session gone");
        }
        SessionObservation::Running(substate) => {
            task.status = match (from, substate.is_waiting()) {
                (TaskStatus::InProgress, true) => TaskStatus::NeedsInput,
                (TaskStatus::NeedsInput, false) if substate == ExecutionSubstate::Running => {
                    TaskStatus::InProgress
                }
                _ => return None,
            };
        }
    }
    task.updated_at = at;
    Some(StateTransition {
        from,
        to: task.status,
        action: None,
        forced: false,
        at,
    })
}

fn ensure_allowed(action: TaskAction, task: &Task) -> Result<(), LifecycleError> {
    if is_action_allowed(action, task) {
        Ok(())
    } else {
        Err(LifecycleError::NotAllowed {
            action,
            from: task.status,
        })
    }
}
