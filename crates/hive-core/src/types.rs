//! Core task types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::state::TaskStatus;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim().trim_start_matches('#');
        trimmed
            .parse::<u64>()
            .map(TaskId)
            .map_err(|_| format!("invalid task id '{value}'"))
    }
}

/// One unit of agent-assisted work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    /// Worker program bound to the session (agent name or ad hoc command).
    #[serde(default)]
    pub agent: String,
    /// Session name; empty when no session exists.
    #[serde(default)]
    pub session: String,
    #[serde(default)]
    pub base_branch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub parent_id: Option<TaskId>,
    #[serde(default)]
    pub issue: Option<u64>,
    #[serde(default)]
    pub pr: Option<u64>,
    #[serde(default)]
    pub block_reason: Option<String>,
}

impl Task {
    pub fn new(id: TaskId, title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Todo,
            agent: String::new(),
            session: String::new(),
            base_branch: String::new(),
            created_at,
            updated_at: created_at,
            started_at: None,
            labels: BTreeSet::new(),
            parent_id: None,
            issue: None,
            pr: None,
            block_reason: None,
        }
    }

    pub fn has_session(&self) -> bool {
        !self.session.is_empty()
    }

    pub fn is_blocked(&self) -> bool {
        self.block_reason.is_some()
    }
}

/// Fields supplied when creating a task; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub base_branch: String,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub parent_id: Option<TaskId>,
    #[serde(default)]
    pub issue: Option<u64>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn into_task(self, id: TaskId, created_at: DateTime<Utc>) -> Task {
        let mut task = Task::new(id, self.title, created_at);
        task.description = self.description;
        task.base_branch = self.base_branch;
        task.labels = self.labels;
        task.parent_id = self.parent_id;
        task.issue = self.issue;
        task
    }
}
