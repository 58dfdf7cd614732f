//! Background work issued by a repository instance.
//!
//! Every function here returns a [`Cmd`] whose closure talks to the store, the
//! event log or the session backend and reports back with a [`RepoMsg`].

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hive_agents::client::ProtocolClient;
use hive_agents::error::SessionError;
use hive_agents::event_log::JsonlEventLog;
use hive_agents::session::{SessionBackend, StartRequest};
use hive_core::config::{load_or_default, repo_config_path};
use hive_core::lifecycle::{SessionObservation, StateTransition};
use hive_core::protocol::{derive_protocol_state, has_session_end};
use hive_core::state::ExecutionSubstate;
use hive_core::types::{NewTask, Task};
use hive_store::persistence::{SqliteStore, StoreError};

use crate::cmd::Cmd;
use crate::event::{exit_result, Msg, RepoMsg};
use crate::model::{normalize_pane_output, SessionProbe, TaskDetail};

/// Handles shared by every operation of one repository.
#[derive(Clone)]
pub struct RepoContext {
    pub repo: PathBuf,
    pub backend: Arc<dyn SessionBackend>,
    pub log: JsonlEventLog,
}

impl RepoContext {
    pub fn new(repo: PathBuf, backend: Arc<dyn SessionBackend>) -> Self {
        let log = JsonlEventLog::for_repo(&repo);
        Self { repo, backend, log }
    }
}

/// Session side effect that must succeed before a lifecycle change is saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    None,
    Start(StartRequest),
    Stop(String),
    /// Stop the worker (if any) and start a reviewer in its place.
    Replace {
        stop: Option<String>,
        start: StartRequest,
    },
}

/// A lifecycle change computed in `update`, waiting for its side effects.
#[derive(Debug, Clone)]
pub struct PendingChange {
    pub task: Task,
    pub transition: StateTransition,
    pub effect: SessionEffect,
}

fn fail(err: impl std::fmt::Display) -> Msg {
    RepoMsg::OperationFailed(err.to_string()).into_msg()
}

pub fn load_tasks(repo: &Path) -> Cmd {
    let repo = repo.to_path_buf();
    Cmd::perform(move || {
        let result = SqliteStore::open_repository(&repo)
            .and_then(|store| store.list_tasks())
            .map_err(|err| {
                tracing::warn!(repo = %repo.display(), error = %err, "failed to load tasks");
                err.to_string()
            });
        RepoMsg::TasksLoaded(result).into_msg()
    })
}

pub fn create_task(repo: &Path, title: String, at: DateTime<Utc>) -> Cmd {
    let repo = repo.to_path_buf();
    Cmd::perform(move || {
        match SqliteStore::open_repository(&repo)
            .and_then(|store| store.create_task(NewTask::titled(title), at))
        {
            Ok(task) => {
                tracing::info!(repo = %repo.display(), task_id = %task.id, "task created");
                RepoMsg::TaskCreated(task).into_msg()
            }
            Err(err) => fail(err),
        }
    })
}

/// Transcript, execution substate and pane tail for one task.
pub fn load_detail(ctx: &RepoContext, task: Task, peek_lines: usize, transcript_limit: usize) -> Cmd {
    let ctx = ctx.clone();
    Cmd::perform(move || {
        let events = match ctx.log.read_all(task.id) {
            Ok(events) => events,
            Err(err) => {
                return RepoMsg::DetailFailed {
                    task_id: task.id,
                    error: err.to_string(),
                }
                .into_msg()
            }
        };
        let mut detail = TaskDetail::empty(task.id);
        detail.protocol = derive_protocol_state(&events);
        let excess = detail.protocol.transcript.len().saturating_sub(transcript_limit);
        detail.protocol.transcript.drain(..excess);

        if task.has_session() {
            detail.substate = ctx
                .log
                .load_execution_state(task.id)
                .unwrap_or(ExecutionSubstate::Idle);
            match ctx.backend.peek(&task.session, peek_lines, false) {
                Ok(body) => detail.peek = normalize_pane_output(&body),
                Err(err) => tracing::debug!(task_id = %task.id, error = %err, "peek failed"),
            }
            detail.processes = ctx
                .backend
                .list_pane_processes(&task.session)
                .unwrap_or_default();
        }
        RepoMsg::DetailLoaded(Box::new(detail)).into_msg()
    })
}

/// Check every task that claims a session against the backend.
pub fn probe_sessions(ctx: &RepoContext, tasks: Vec<Task>) -> Cmd {
    if tasks.is_empty() {
        return Cmd::none();
    }
    let ctx = ctx.clone();
    Cmd::perform(move || {
        let mut probes = Vec::with_capacity(tasks.len());
        for task in tasks {
            let running = match ctx.backend.is_running(&task.session) {
                Ok(running) => running,
                Err(err) => {
                    tracing::warn!(task_id = %task.id, error = %err, "session probe failed");
                    continue;
                }
            };
            let observation = if running {
                let substate = ctx
                    .log
                    .load_execution_state(task.id)
                    .unwrap_or(ExecutionSubstate::Idle);
                SessionObservation::Running(substate)
            } else {
                let clean_end = ctx
                    .log
                    .read_all(task.id)
                    .map(|events| has_session_end(&events))
                    .unwrap_or(false);
                SessionObservation::Gone { clean_end }
            };
            probes.push(SessionProbe {
                task_id: task.id,
                observation,
            });
        }
        RepoMsg::SessionsProbed(probes).into_msg()
    })
}

pub fn persist_reconciled(repo: &Path, changed: Vec<(Task, StateTransition)>) -> Cmd {
    if changed.is_empty() {
        return Cmd::none();
    }
    let repo = repo.to_path_buf();
    Cmd::perform(move || {
        let result = (|| -> Result<usize, StoreError> {
            let store = SqliteStore::open_repository(&repo)?;
            for (task, transition) in &changed {
                store.update_task(task)?;
                store.record_transition(task.id, transition)?;
            }
            Ok(changed.len())
        })();
        RepoMsg::TasksReconciled(result.map_err(|err| err.to_string())).into_msg()
    })
}

/// Run the session side effect, then save the task and its audit row.
pub fn apply_change(ctx: &RepoContext, change: PendingChange) -> Cmd {
    let ctx = ctx.clone();
    Cmd::perform(move || {
        let PendingChange {
            mut task,
            transition,
            effect,
        } = change;

        let started = match run_effect(ctx.backend.as_ref(), &effect) {
            Ok(started) => started,
            Err(err) => {
                tracing::warn!(task_id = %task.id, error = %err, "session command failed");
                return fail(err);
            }
        };
        if let Some(session) = started {
            task.session = session;
        }

        let saved = SqliteStore::open_repository(&ctx.repo).and_then(|store| {
            store.update_task(&task)?;
            store.record_transition(task.id, &transition)
        });
        match saved {
            Ok(()) => RepoMsg::TaskSaved { task, transition }.into_msg(),
            Err(err) => fail(err),
        }
    })
}

fn run_effect(
    backend: &dyn SessionBackend,
    effect: &SessionEffect,
) -> Result<Option<String>, SessionError> {
    match effect {
        SessionEffect::None => Ok(None),
        SessionEffect::Start(request) => backend.start(request).map(Some),
        SessionEffect::Stop(session) => {
            stop_quietly(backend, session);
            Ok(None)
        }
        SessionEffect::Replace { stop, start } => {
            if let Some(session) = stop {
                stop_quietly(backend, session);
            }
            backend.start(start).map(Some)
        }
    }
}

/// A session that already exited is as good as stopped.
fn stop_quietly(backend: &dyn SessionBackend, session: &str) {
    if let Err(err) = backend.stop(session) {
        tracing::warn!(session, error = %err, "stop failed, treating session as gone");
    }
}

pub fn send_prompt(ctx: &RepoContext, task: Task, text: String, at: DateTime<Utc>) -> Cmd {
    let ctx = ctx.clone();
    Cmd::perform(move || {
        let client = ProtocolClient::new(ctx.backend.as_ref(), &ctx.log);
        match client.send_prompt(&task, &text, at) {
            Ok(()) => RepoMsg::Notice(format!("prompt sent to #{}", task.id)).into_msg(),
            Err(err) => fail(err),
        }
    })
}

pub fn answer_permission(ctx: &RepoContext, task: Task, option_id: String, at: DateTime<Utc>) -> Cmd {
    let ctx = ctx.clone();
    Cmd::perform(move || {
        let client = ProtocolClient::new(ctx.backend.as_ref(), &ctx.log);
        match client.respond_permission(&task, &option_id, at) {
            Ok(()) => RepoMsg::PermissionAnswered { task_id: task.id }.into_msg(),
            Err(err) => fail(err),
        }
    })
}

pub fn cancel(ctx: &RepoContext, task: Task) -> Cmd {
    let ctx = ctx.clone();
    Cmd::perform(move || {
        let client = ProtocolClient::new(ctx.backend.as_ref(), &ctx.log);
        match client.cancel(&task) {
            Ok(()) => RepoMsg::Notice(format!("sent cancel to #{}", task.id)).into_msg(),
            Err(err) => fail(err),
        }
    })
}

pub fn reload_config(repo: &Path, global: Option<PathBuf>) -> Cmd {
    let repo = repo.to_path_buf();
    Cmd::perform(move || {
        let config = load_or_default(&repo, global.as_deref());
        RepoMsg::ConfigLoaded(Box::new(config)).into_msg()
    })
}

/// Foreground process that reports back with `ExecFinished`.
fn exec_then_reload(label: &'static str, command: Command) -> Cmd {
    Cmd::exec(command, move |status| {
        RepoMsg::ExecFinished {
            label,
            result: exit_result(status),
        }
        .into_msg()
    })
}

pub fn attach(ctx: &RepoContext, session: &str) -> Cmd {
    exec_then_reload("attach", ctx.backend.attach_command(session))
}

pub fn page_log(ctx: &RepoContext, task: &Task) -> Cmd {
    let path = ctx.log.log_path(task.id);
    exec_then_reload("pager", command_from_env("PAGER", "less", &path))
}

pub fn show_diff(repo: &Path) -> Cmd {
    let mut command = Command::new("git");
    command.arg("diff").current_dir(repo);
    exec_then_reload("diff", command)
}

/// Open the repository config in `$EDITOR`; the config is re-read on exit.
pub fn edit_config(repo: &Path, global: Option<PathBuf>) -> Cmd {
    let path = repo_config_path(repo);
    let command = command_from_env("EDITOR", "vi", &path);
    let repo = repo.to_path_buf();
    Cmd::exec(command, move |status| {
        Msg::Batch(vec![
            Cmd::msg(
                RepoMsg::ExecFinished {
                    label: "editor",
                    result: exit_result(status),
                }
                .into_msg(),
            ),
            reload_config(&repo, global),
        ])
    })
}

/// `$VAR` may carry arguments, e.g. `PAGER="less -R"`.
pub(crate) fn command_from_env(var: &str, fallback: &str, target: &Path) -> Command {
    let value = env::var(var)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string());
    let mut parts = value.split_whitespace();
    let mut command = Command::new(parts.next().unwrap_or(fallback));
    command.args(parts).arg(target);
    command
}
