use std::path::PathBuf;

use chrono::{DateTime, Utc};
use crossterm::event::KeyEvent;
use hive_core::config::HiveConfig;
use hive_core::lifecycle::StateTransition;
use hive_core::types::{Task, TaskId};
use hive_core::workspace::RepoHealth;

use crate::cmd::Cmd;
use crate::model::{RepoSummary, SessionProbe, TaskDetail};

/// Router-level messages. Instance messages travel inside `Repo`/`Routed`.
#[derive(Debug)]
pub enum Msg {
    Noop,
    Quit,
    Key(KeyEvent),
    Resize {
        width: u16,
        height: u16,
    },
    Tick(DateTime<Utc>),
    /// Follow-up commands produced by a deferred operation.
    Batch(Vec<Cmd>),
    /// Instance message not yet bound to a repository.
    Repo(RepoMsg),
    Routed {
        repo: PathBuf,
        msg: RepoMsg,
    },
    /// Hand focus back to the repository list.
    FocusList,
    HealthChecked {
        repo: PathBuf,
        health: RepoHealth,
    },
    SummaryLoaded {
        repo: PathBuf,
        summary: Result<RepoSummary, String>,
    },
    RepoInitialized {
        repo: PathBuf,
        result: Result<(), String>,
    },
}

/// Messages understood by a single repository instance.
#[derive(Debug)]
pub enum RepoMsg {
    Key(KeyEvent),
    Tick(DateTime<Utc>),
    Resize {
        width: u16,
        height: u16,
    },
    TasksLoaded(Result<Vec<Task>, String>),
    DetailLoaded(Box<TaskDetail>),
    DetailFailed {
        task_id: TaskId,
        error: String,
    },
    SessionsProbed(Vec<SessionProbe>),
    /// A lifecycle change reached the backend and the store.
    TaskSaved {
        task: Task,
        transition: StateTransition,
    },
    TaskCreated(Task),
    TasksReconciled(Result<usize, String>),
    PermissionAnswered {
        task_id: TaskId,
    },
    OperationFailed(String),
    Notice(String),
    ExecFinished {
        label: &'static str,
        result: Result<(), String>,
    },
    ConfigLoaded(Box<HiveConfig>),
}

impl RepoMsg {
    pub fn into_msg(self) -> Msg {
        Msg::Repo(self)
    }
}

/// Exit handler result for foreground processes.
pub(crate) fn exit_result(status: Result<std::process::ExitStatus, std::io::Error>) -> Result<(), String> {
    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(format!("exited with {status}")),
        Err(err) => Err(err.to_string()),
    }
}
