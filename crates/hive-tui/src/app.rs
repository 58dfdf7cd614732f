//! One repository's task manager. The router hosts one per healthy repository.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use hive_agents::command::{resolve_agent_command, resolve_review_command, AgentChoice};
use hive_agents::session::{SessionBackend, SessionRole, StartRequest};
use hive_core::config::{HiveConfig, ReviewMode};
use hive_core::lifecycle::{
    action_ends_session, available_transitions, begin_review, block_task, force_status,
    is_action_allowed, reconcile_task, start_task, transition_task, LifecycleError,
    SessionObservation, StateTransition, TaskAction, Transition,
};
use hive_core::state::{ExecutionSubstate, TaskStatus};
use hive_core::types::{Task, TaskId};

use crate::action::{is_press, map_instance_key, InstanceCommand};
use crate::cmd::Cmd;
use crate::event::{Msg, RepoMsg};
use crate::model::{Banner, SessionProbe, TaskDetail};
use crate::ops::{self, PendingChange, RepoContext, SessionEffect};

const CUSTOM_AGENT_LABEL: &str = "custom command…";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Normal,
    NewTask { title: String },
    /// Configured agents followed by a custom-command entry.
    AgentPicker { options: Vec<String>, selected: usize },
    CustomCommand { buffer: String },
    Prompt { buffer: String },
    BlockReason { buffer: String },
    TransitionMenu { options: Vec<Transition>, selected: usize },
    /// Labels of the active permission request, answered by position.
    PermissionPicker { options: Vec<String>, selected: usize },
}

impl Mode {
    /// Title and buffer of a text prompt, if one is open.
    pub fn input(&self) -> Option<(&'static str, &str)> {
        match self {
            Mode::NewTask { title } => Some(("New task title", title)),
            Mode::CustomCommand { buffer } => Some(("Agent command", buffer)),
            Mode::Prompt { buffer } => Some(("Prompt", buffer)),
            Mode::BlockReason { buffer } => Some(("Block reason", buffer)),
            _ => None,
        }
    }
}

enum LineEdit {
    Submit(String),
    Cancel,
    Continue,
}

fn edit_line(buffer: &mut String, key: KeyEvent) -> LineEdit {
    match key.code {
        KeyCode::Esc => LineEdit::Cancel,
        KeyCode::Enter => LineEdit::Submit(buffer.trim().to_string()),
        KeyCode::Backspace => {
            buffer.pop();
            LineEdit::Continue
        }
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            buffer.push(ch);
            LineEdit::Continue
        }
        _ => LineEdit::Continue,
    }
}

fn step(selected: usize, len: usize, forward: bool) -> usize {
    if len == 0 {
        0
    } else if forward {
        (selected + 1).min(len - 1)
    } else {
        selected.saturating_sub(1)
    }
}

pub struct RepoApp {
    ctx: RepoContext,
    global_config: Option<PathBuf>,
    config: HiveConfig,
    tasks: Vec<Task>,
    selected: usize,
    detail: Option<TaskDetail>,
    substates: HashMap<TaskId, ExecutionSubstate>,
    mode: Mode,
    banner: Option<Banner>,
    size: (u16, u16),
    loaded: bool,
}

impl RepoApp {
    pub fn new(
        repo: PathBuf,
        config: HiveConfig,
        global_config: Option<PathBuf>,
        backend: Arc<dyn SessionBackend>,
    ) -> Self {
        Self {
            ctx: RepoContext::new(repo, backend),
            global_config,
            config,
            tasks: Vec::new(),
            selected: 0,
            detail: None,
            substates: HashMap::new(),
            mode: Mode::Normal,
            banner: None,
            size: (0, 0),
            loaded: false,
        }
    }

    pub fn init(&self) -> Cmd {
        tracing::debug!(repo = %self.repo().display(), "repository instance started");
        ops::load_tasks(self.repo())
    }

    pub fn repo(&self) -> &Path {
        &self.ctx.repo
    }

    pub fn config(&self) -> &HiveConfig {
        &self.config
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected_task(&self) -> Option<&Task> {
        self.tasks.get(self.selected)
    }

    /// Detail of the selected task, once loaded.
    pub fn detail(&self) -> Option<&TaskDetail> {
        let selected = self.selected_task()?;
        self.detail
            .as_ref()
            .filter(|detail| detail.task_id == selected.id)
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn banner(&self) -> Option<&Banner> {
        self.banner.as_ref()
    }

    pub fn size(&self) -> (u16, u16) {
        self.size
    }

    /// Substate label, shown only while the task has a live session.
    pub fn substate_label(&self, task: &Task) -> Option<&'static str> {
        if !task.has_session() {
            return None;
        }
        self.substates.get(&task.id).and_then(|substate| substate.label())
    }

    pub fn update(&mut self, msg: RepoMsg) -> Cmd {
        match msg {
            RepoMsg::Key(key) => self.handle_key(key, Utc::now()),
            RepoMsg::Tick(at) => self.on_tick(at),
            RepoMsg::Resize { width, height } => {
                self.size = (width, height);
                Cmd::none()
            }
            RepoMsg::TasksLoaded(Ok(tasks)) => {
                self.replace_tasks(tasks);
                self.refresh_detail()
            }
            RepoMsg::TasksLoaded(Err(err)) => {
                self.banner = Some(Banner::error(format!("failed to load tasks: {err}")));
                Cmd::none()
            }
            RepoMsg::DetailLoaded(detail) => {
                if self.selected_task().map(|task| task.id) == Some(detail.task_id) {
                    self.substates.insert(detail.task_id, detail.substate);
                    self.detail = Some(*detail);
                }
                Cmd::none()
            }
            RepoMsg::DetailFailed { task_id, error } => {
                self.banner = Some(Banner::error(format!("#{task_id}: {error}")));
                Cmd::none()
            }
            RepoMsg::SessionsProbed(probes) => self.apply_probes(probes, Utc::now()),
            RepoMsg::TaskSaved { task, transition } => {
                self.banner = Some(Banner::info(describe_transition(&task, &transition)));
                self.put_task(task);
                Cmd::batch([ops::load_tasks(self.repo()), self.refresh_detail()])
            }
            RepoMsg::TaskCreated(task) => {
                self.banner = Some(Banner::info(format!("created #{} {}", task.id, task.title)));
                let id = task.id;
                self.put_task(task);
                self.select_id(id);
                ops::load_tasks(self.repo())
            }
            RepoMsg::TasksReconciled(Ok(0)) => Cmd::none(),
            RepoMsg::TasksReconciled(Ok(_)) => ops::load_tasks(self.repo()),
            RepoMsg::TasksReconciled(Err(err)) => {
                self.banner = Some(Banner::error(format!("failed to save session state: {err}")));
                Cmd::none()
            }
            RepoMsg::PermissionAnswered { task_id } => {
                if let Some(detail) = self.detail.as_mut().filter(|d| d.task_id == task_id) {
                    detail.protocol.active_request = None;
                }
                self.banner = Some(Banner::info(format!("answered permission request on #{task_id}")));
                self.refresh_detail()
            }
            RepoMsg::OperationFailed(err) => {
                self.banner = Some(Banner::error(err));
                Cmd::none()
            }
            RepoMsg::Notice(text) => {
                self.banner = Some(Banner::info(text));
                Cmd::none()
            }
            RepoMsg::ExecFinished { label, result } => {
                if let Err(err) = result {
                    self.banner = Some(Banner::error(format!("{label}: {err}")));
                }
                Cmd::batch([ops::load_tasks(self.repo()), self.refresh_detail()])
            }
            RepoMsg::ConfigLoaded(config) => {
                self.config = *config;
                self.banner = Some(Banner::info("configuration reloaded"));
                Cmd::none()
            }
        }
    }

    fn replace_tasks(&mut self, tasks: Vec<Task>) {
        let selected_id = self.selected_task().map(|task| task.id);
        self.tasks = tasks;
        self.loaded = true;
        self.substates.retain(|id, _| self.tasks.iter().any(|task| task.id == *id));
        match selected_id {
            Some(id) => self.select_id(id),
            None => self.selected = 0,
        }
        self.clamp_selection();
    }

    fn put_task(&mut self, task: Task) {
        match self.tasks.iter_mut().find(|existing| existing.id == task.id) {
            Some(existing) => *existing = task,
            None => self.tasks.push(task),
        }
    }

    fn select_id(&mut self, id: TaskId) {
        if let Some(idx) = self.tasks.iter().position(|task| task.id == id) {
            self.selected = idx;
        }
    }

    fn clamp_selection(&mut self) {
        if self.selected >= self.tasks.len() {
            self.selected = self.tasks.len().saturating_sub(1);
        }
    }

    fn refresh_detail(&self) -> Cmd {
        let Some(task) = self.selected_task() else {
            return Cmd::none();
        };
        let peek_lines = usize::from((self.size.1 / 3).max(5));
        ops::load_detail(
            &self.ctx,
            task.clone(),
            peek_lines,
            self.config.ui.transcript_limit,
        )
    }

    fn on_tick(&mut self, _at: DateTime<Utc>) -> Cmd {
        if !self.loaded {
            return ops::load_tasks(self.repo());
        }
        let live: Vec<Task> = self
            .tasks
            .iter()
            .filter(|task| task.has_session())
            .cloned()
            .collect();
        Cmd::batch([ops::probe_sessions(&self.ctx, live), self.refresh_detail()])
    }

    fn apply_probes(&mut self, probes: Vec<SessionProbe>, at: DateTime<Utc>) -> Cmd {
        let mut changed = Vec::new();
        for probe in probes {
            let Some(task) = self.tasks.iter_mut().find(|task| task.id == probe.task_id) else {
                continue;
            };
            match probe.observation {
                SessionObservation::Running(substate) => {
                    self.substates.insert(task.id, substate);
                }
                SessionObservation::Gone { .. } => {
                    self.substates.remove(&task.id);
                }
            }
            if let Some(transition) = reconcile_task(task, probe.observation, at) {
                changed.push((task.clone(), transition));
            }
        }
        ops::persist_reconciled(self.repo(), changed)
    }

    fn handle_key(&mut self, key: KeyEvent, at: DateTime<Utc>) -> Cmd {
        if !is_press(&key) {
            return Cmd::none();
        }
        self.banner = None;
        if self.mode != Mode::Normal {
            return self.handle_mode_key(key, at);
        }
        match map_instance_key(key) {
            Some(command) => self.handle_command(command, at),
            None => Cmd::none(),
        }
    }

    fn handle_command(&mut self, command: InstanceCommand, at: DateTime<Utc>) -> Cmd {
        match command {
            InstanceCommand::SelectNext | InstanceCommand::SelectPrevious => {
                let forward = command == InstanceCommand::SelectNext;
                let next = step(self.selected, self.tasks.len(), forward);
                if next == self.selected {
                    return Cmd::none();
                }
                self.selected = next;
                self.refresh_detail()
            }
            InstanceCommand::NewTask => {
                self.mode = Mode::NewTask {
                    title: String::new(),
                };
                Cmd::none()
            }
            InstanceCommand::Action(action) => self.dispatch_action(action, at),
            InstanceCommand::ToggleBlock => {
                let blocked = self.selected_task().map(Task::is_blocked).unwrap_or(false);
                if blocked {
                    self.dispatch_action(TaskAction::Unblock, at)
                } else {
                    self.dispatch_action(TaskAction::Block, at)
                }
            }
            InstanceCommand::TransitionMenu => {
                if let Some(task) = self.selected_task() {
                    self.mode = Mode::TransitionMenu {
                        options: available_transitions(task),
                        selected: 0,
                    };
                }
                Cmd::none()
            }
            InstanceCommand::Prompt => {
                let Some(task) = self.selected_task() else {
                    return Cmd::none();
                };
                if !task.has_session() {
                    return Cmd::none();
                }
                if self.pending_request_options().is_some() {
                    self.banner = Some(Banner::info("answer the pending permission request first"));
                    return Cmd::none();
                }
                self.mode = Mode::Prompt {
                    buffer: String::new(),
                };
                Cmd::none()
            }
            InstanceCommand::AnswerPermission(index) => self.answer_permission(index, at),
            InstanceCommand::PermissionPicker => {
                let live = self.selected_task().is_some_and(Task::has_session);
                let labels = self
                    .detail()
                    .and_then(|detail| detail.protocol.active_request.as_ref())
                    .map(|request| {
                        request
                            .options
                            .iter()
                            .map(|option| option.label.clone())
                            .collect::<Vec<_>>()
                    });
                if let (true, Some(options)) = (live, labels) {
                    self.mode = Mode::PermissionPicker {
                        options,
                        selected: 0,
                    };
                }
                Cmd::none()
            }
            InstanceCommand::Cancel => match self.selected_task() {
                Some(task) if task.has_session() => ops::cancel(&self.ctx, task.clone()),
                _ => Cmd::none(),
            },
            InstanceCommand::PageLog => match self.selected_task() {
                Some(task) => ops::page_log(&self.ctx, task),
                None => Cmd::none(),
            },
            InstanceCommand::ShowDiff => ops::show_diff(self.repo()),
            InstanceCommand::EditConfig => ops::edit_config(self.repo(), self.global_config.clone()),
            InstanceCommand::FocusList => Cmd::msg(Msg::FocusList),
            InstanceCommand::Quit => Cmd::quit(),
        }
    }

    /// Entry point for every guarded action. Illegal actions are a silent no-op.
    fn dispatch_action(&mut self, action: TaskAction, at: DateTime<Utc>) -> Cmd {
        let Some(task) = self.selected_task() else {
            return Cmd::none();
        };
        if !is_action_allowed(action, task) {
            return Cmd::none();
        }
        match action {
            TaskAction::Start => {
                let mut options = self.config.agent_names();
                let selected = options
                    .iter()
                    .position(|name| *name == self.config.default_agent)
                    .unwrap_or(0);
                options.push(CUSTOM_AGENT_LABEL.to_string());
                self.mode = Mode::AgentPicker { options, selected };
                Cmd::none()
            }
            TaskAction::Attach => ops::attach(&self.ctx, &task.session),
            TaskAction::Block => {
                self.mode = Mode::BlockReason {
                    buffer: String::new(),
                };
                Cmd::none()
            }
            TaskAction::Review => self.start_review(at),
            _ => self.guarded_change(action, at),
        }
    }

    fn guarded_change(&mut self, action: TaskAction, at: DateTime<Utc>) -> Cmd {
        let Some(task) = self.selected_task() else {
            return Cmd::none();
        };
        let old_session = task.session.clone();
        let mut next = task.clone();
        let transition = match transition_task(&mut next, action, at) {
            Ok(transition) => transition,
            Err(err) => return self.lifecycle_error(err),
        };
        let effect = if action_ends_session(action) && !old_session.is_empty() {
            SessionEffect::Stop(old_session)
        } else {
            SessionEffect::None
        };
        self.submit(next, transition, effect)
    }

    fn start_with(&mut self, choice: AgentChoice, at: DateTime<Utc>) -> Cmd {
        let Some(task) = self.selected_task() else {
            return Cmd::none();
        };
        let resolved = match resolve_agent_command(&self.config, &choice, task) {
            Ok(resolved) => resolved,
            Err(err) => {
                self.banner = Some(Banner::error(err.to_string()));
                return Cmd::none();
            }
        };
        let session = self.ctx.backend.session_name(task.id, SessionRole::Worker);
        let request = StartRequest {
            task_id: task.id,
            role: SessionRole::Worker,
            workdir: self.ctx.repo.clone(),
            command: resolved.command,
        };
        let mut next = task.clone();
        match start_task(&mut next, &resolved.agent, &session, at) {
            Ok(transition) => self.submit(next, transition, SessionEffect::Start(request)),
            Err(err) => self.lifecycle_error(err),
        }
    }

    fn start_review(&mut self, at: DateTime<Utc>) -> Cmd {
        let Some(task) = self.selected_task() else {
            return Cmd::none();
        };
        let mut next = task.clone();
        if self.config.review_mode == ReviewMode::Manual {
            return match begin_review(&mut next, None, at) {
                Ok(transition) => self.submit(next, transition, SessionEffect::None),
                Err(err) => self.lifecycle_error(err),
            };
        }

        let resolved = match resolve_review_command(&self.config, task) {
            Ok(resolved) => resolved,
            Err(err) => {
                self.banner = Some(Banner::error(err.to_string()));
                return Cmd::none();
            }
        };
        let reviewer = self.ctx.backend.session_name(task.id, SessionRole::Reviewer);
        let effect = SessionEffect::Replace {
            stop: task.has_session().then(|| task.session.clone()),
            start: StartRequest {
                task_id: task.id,
                role: SessionRole::Reviewer,
                workdir: self.ctx.repo.clone(),
                command: resolved.command,
            },
        };
        match begin_review(&mut next, Some(&reviewer), at) {
            Ok(transition) => self.submit(next, transition, effect),
            Err(err) => self.lifecycle_error(err),
        }
    }

    fn apply_transition(&mut self, transition: Transition, at: DateTime<Utc>) -> Cmd {
        match transition {
            Transition::Guarded(action) => self.dispatch_action(action, at),
            Transition::Forced(status) => self.force(status, at),
        }
    }

    fn force(&mut self, status: TaskStatus, at: DateTime<Utc>) -> Cmd {
        let Some(task) = self.selected_task() else {
            return Cmd::none();
        };
        let mut next = task.clone();
        match force_status(&mut next, status, at) {
            Ok(transition) => {
                // A task parked somewhere startable or terminal owns no session.
                let effect = if next.has_session() && (status.can_start() || status.is_terminal()) {
                    SessionEffect::Stop(std::mem::take(&mut next.session))
                } else {
                    SessionEffect::None
                };
                self.submit(next, transition, effect)
            }
            Err(err) => self.lifecycle_error(err),
        }
    }

    fn block(&mut self, reason: &str, at: DateTime<Utc>) -> Cmd {
        let Some(task) = self.selected_task() else {
            return Cmd::none();
        };
        let mut next = task.clone();
        match block_task(&mut next, reason, at) {
            Ok(transition) => self.submit(next, transition, SessionEffect::None),
            Err(err) => self.lifecycle_error(err),
        }
    }

    fn submit(&self, task: Task, transition: StateTransition, effect: SessionEffect) -> Cmd {
        ops::apply_change(
            &self.ctx,
            PendingChange {
                task,
                transition,
                effect,
            },
        )
    }

    fn lifecycle_error(&mut self, err: LifecycleError) -> Cmd {
        self.banner = Some(Banner::error(err.to_string()));
        Cmd::none()
    }

    /// Options of the active permission request for the selected task.
    fn pending_request_options(&self) -> Option<Vec<String>> {
        let request = self.detail()?.protocol.active_request.as_ref()?;
        Some(
            request
                .options
                .iter()
                .map(|option| option.option_id.clone())
                .collect(),
        )
    }

    fn answer_permission(&mut self, index: usize, at: DateTime<Utc>) -> Cmd {
        let Some(option_id) = self
            .pending_request_options()
            .and_then(|options| options.get(index).cloned())
        else {
            return Cmd::none();
        };
        match self.selected_task() {
            Some(task) if task.has_session() => {
                ops::answer_permission(&self.ctx, task.clone(), option_id, at)
            }
            _ => Cmd::none(),
        }
    }

    fn handle_mode_key(&mut self, key: KeyEvent, at: DateTime<Utc>) -> Cmd {
        let mode = std::mem::replace(&mut self.mode, Mode::Normal);
        match mode {
            Mode::Normal => Cmd::none(),
            Mode::AgentPicker {
                options,
                mut selected,
            } => match key.code {
                KeyCode::Esc => Cmd::none(),
                KeyCode::Char('j') | KeyCode::Down | KeyCode::Char('k') | KeyCode::Up => {
                    let forward = matches!(key.code, KeyCode::Char('j') | KeyCode::Down);
                    selected = step(selected, options.len(), forward);
                    self.mode = Mode::AgentPicker { options, selected };
                    Cmd::none()
                }
                KeyCode::Enter => {
                    if selected + 1 == options.len() {
                        self.mode = Mode::CustomCommand {
                            buffer: String::new(),
                        };
                        return Cmd::none();
                    }
                    match options.into_iter().nth(selected) {
                        Some(name) => self.start_with(AgentChoice::Named(name), at),
                        None => Cmd::none(),
                    }
                }
                _ => {
                    self.mode = Mode::AgentPicker { options, selected };
                    Cmd::none()
                }
            },
            Mode::TransitionMenu {
                options,
                mut selected,
            } => match key.code {
                KeyCode::Esc => Cmd::none(),
                KeyCode::Char('j') | KeyCode::Down | KeyCode::Char('k') | KeyCode::Up => {
                    let forward = matches!(key.code, KeyCode::Char('j') | KeyCode::Down);
                    selected = step(selected, options.len(), forward);
                    self.mode = Mode::TransitionMenu { options, selected };
                    Cmd::none()
                }
                KeyCode::Enter => match options.get(selected).copied() {
                    Some(transition) => self.apply_transition(transition, at),
                    None => Cmd::none(),
                },
                _ => {
                    self.mode = Mode::TransitionMenu { options, selected };
                    Cmd::none()
                }
            },
            Mode::PermissionPicker {
                options,
                mut selected,
            } => match key.code {
                KeyCode::Esc => Cmd::none(),
                KeyCode::Char('j') | KeyCode::Down | KeyCode::Char('k') | KeyCode::Up => {
                    let forward = matches!(key.code, KeyCode::Char('j') | KeyCode::Down);
                    selected = step(selected, options.len(), forward);
                    self.mode = Mode::PermissionPicker { options, selected };
                    Cmd::none()
                }
                KeyCode::Enter => self.answer_permission(selected, at),
                _ => {
                    self.mode = Mode::PermissionPicker { options, selected };
                    Cmd::none()
                }
            },
            Mode::NewTask { mut title } => match edit_line(&mut title, key) {
                LineEdit::Submit(title) if !title.is_empty() => {
                    ops::create_task(self.repo(), title, at)
                }
                LineEdit::Cancel => Cmd::none(),
                _ => {
                    self.mode = Mode::NewTask { title };
                    Cmd::none()
                }
            },
            Mode::CustomCommand { mut buffer } => match edit_line(&mut buffer, key) {
                LineEdit::Submit(command) if !command.is_empty() => {
                    self.start_with(AgentChoice::Custom(command), at)
                }
                LineEdit::Cancel => Cmd::none(),
                _ => {
                    self.mode = Mode::CustomCommand { buffer };
                    Cmd::none()
                }
            },
            Mode::Prompt { mut buffer } => match edit_line(&mut buffer, key) {
                LineEdit::Submit(text) if !text.is_empty() => match self.selected_task() {
                    Some(task) => ops::send_prompt(&self.ctx, task.clone(), text, at),
                    None => Cmd::none(),
                },
                LineEdit::Cancel => Cmd::none(),
                _ => {
                    self.mode = Mode::Prompt { buffer };
                    Cmd::none()
                }
            },
            Mode::BlockReason { mut buffer } => match edit_line(&mut buffer, key) {
                LineEdit::Submit(reason) if !reason.is_empty() => self.block(&reason, at),
                LineEdit::Cancel => Cmd::none(),
                _ => {
                    self.mode = Mode::BlockReason { buffer };
                    Cmd::none()
                }
            },
        }
    }
}

fn describe_transition(task: &Task, transition: &StateTransition) -> String {
    let what = match (transition.action, transition.forced) {
        (_, true) => "forced".to_string(),
        (Some(action), false) => action.label().to_lowercase(),
        (None, false) => "updated".to_string(),
    };
    if transition.from == transition.to {
        format!("#{} {what}", task.id)
    } else {
        format!(
            "#{} {what}: {} → {}",
            task.id,
            transition.from.label(),
            transition.to.label()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_agents::event_log::JsonlEventLog;
    use hive_agents::fake::FakeBackend;
    use hive_core::events::{AgentEvent, AgentEventKind};
    use hive_store::persistence::{init_repository, SqliteStore};
    use serde_json::json;

    struct Fixture {
        _dir: tempfile::TempDir,
        app: RepoApp,
        backend: Arc<FakeBackend>,
    }

    fn key(code: KeyCode) -> RepoMsg {
        RepoMsg::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn fixture(titles: &[&str]) -> Fixture {
        fixture_with(titles, HiveConfig::default())
    }

    fn fixture_with(titles: &[&str], config: HiveConfig) -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = init_repository(dir.path()).expect("init");
        for title in titles {
            store
                .create_task(hive_core::types::NewTask::titled(*title), Utc::now())
                .expect("create");
        }
        let backend = Arc::new(FakeBackend::new("repo"));
        let mut app = RepoApp::new(
            dir.path().to_path_buf(),
            config,
            None,
            backend.clone(),
        );
        let init = app.init();
        drive(&mut app, init);
        Fixture {
            _dir: dir,
            app,
            backend,
        }
    }

    /// Resolve `cmd` and feed every resulting instance message back in until
    /// nothing is left. Returns messages meant for the router.
    fn drive(app: &mut RepoApp, cmd: Cmd) -> Vec<Msg> {
        let mut pending = cmd.run_blocking();
        let mut outward = Vec::new();
        while !pending.is_empty() {
            let mut next = Vec::new();
            for msg in pending {
                match msg {
                    Msg::Repo(msg) => next.extend(app.update(msg).run_blocking()),
                    other => outward.push(other),
                }
            }
            pending = next;
        }
        outward
    }

    fn press(fx: &mut Fixture, code: KeyCode) -> Vec<Msg> {
        let cmd = fx.app.update(key(code));
        drive(&mut fx.app, cmd)
    }

    fn start_selected(fx: &mut Fixture) {
        press(fx, KeyCode::Char('s'));
        assert!(matches!(fx.app.mode(), Mode::AgentPicker { .. }));
        press(fx, KeyCode::Enter);
    }

    #[test]
    fn init_loads_tasks_from_store() {
        let fx = fixture(&["one", "two"]);
        assert!(fx.app.is_loaded());
        assert_eq!(fx.app.tasks().len(), 2);
        assert_eq!(fx.app.selected_task().map(|t| t.title.as_str()), Some("one"));
    }

    #[test]
    fn start_picks_default_agent_and_launches_session() {
        let mut fx = fixture(&["wire up ci"]);
        start_selected(&mut fx);

        let task = fx.app.selected_task().expect("task");
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.agent, "claude");
        assert_eq!(task.session, "hive-repo-1");
        let started = fx.backend.snapshot().started;
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].role, SessionRole::Worker);
        assert_eq!(fx.app.mode(), &Mode::Normal);
    }

    #[test]
    fn illegal_actions_are_silent_no_ops() {
        let mut fx = fixture(&["fresh"]);
        for code in [
            KeyCode::Char('x'),
            KeyCode::Char('m'),
            KeyCode::Char('V'),
            KeyCode::Enter,
        ] {
            assert!(press(&mut fx, code).is_empty());
        }
        assert_eq!(fx.app.selected_task().expect("task").status, TaskStatus::Todo);
        assert!(fx.app.banner().is_none());
        assert!(fx.backend.snapshot().started.is_empty());
    }

    #[test]
    fn custom_command_runs_verbatim() {
        let mut fx = fixture(&["custom"]);
        press(&mut fx, KeyCode::Char('s'));
        let options = match fx.app.mode() {
            Mode::AgentPicker { options, .. } => options.len(),
            other => panic!("unexpected mode {other:?}"),
        };
        for _ in 0..options {
            press(&mut fx, KeyCode::Down);
        }
        press(&mut fx, KeyCode::Enter);
        assert!(matches!(fx.app.mode(), Mode::CustomCommand { .. }));
        for ch in "bash".chars() {
            press(&mut fx, KeyCode::Char(ch));
        }
        press(&mut fx, KeyCode::Enter);
        assert_eq!(fx.backend.snapshot().started[0].command, "bash");
    }

    #[test]
    fn esc_asks_router_for_list_focus_and_q_requests_quit() {
        let mut fx = fixture(&[]);
        let out = press(&mut fx, KeyCode::Esc);
        assert!(matches!(out.as_slice(), [Msg::FocusList]));
        let out = press(&mut fx, KeyCode::Char('q'));
        assert!(matches!(out.as_slice(), [Msg::Quit]));
    }

    #[test]
    fn vanished_session_is_reconciled_on_tick() {
        let mut fx = fixture(&["agent dies"]);
        start_selected(&mut fx);
        let session = fx.app.selected_task().expect("task").session.clone();
        fx.backend.kill(&session);

        let cmd = fx.app.update(RepoMsg::Tick(Utc::now()));
        drive(&mut fx.app, cmd);

        let task = fx.app.selected_task().expect("task");
        assert_eq!(task.status, TaskStatus::Error);
        assert!(!task.has_session());
        let store = SqliteStore::open_repository(fx.app.repo()).expect("store");
        let saved = store.load_task(task.id).expect("load").expect("exists");
        assert_eq!(saved.status, TaskStatus::Error);
    }

    #[test]
    fn waiting_substate_moves_task_to_needs_input() {
        let mut fx = fixture(&["asks questions"]);
        start_selected(&mut fx);
        let id = fx.app.selected_task().expect("task").id;
        JsonlEventLog::for_repo(fx.app.repo())
            .write_execution_state(id, ExecutionSubstate::AwaitingUser)
            .expect("state");

        let cmd = fx.app.update(RepoMsg::Tick(Utc::now()));
        drive(&mut fx.app, cmd);

        let task = fx.app.selected_task().expect("task");
        assert_eq!(task.status, TaskStatus::NeedsInput);
        assert_eq!(fx.app.substate_label(task), Some("input"));
    }

    #[test]
    fn permission_answer_is_sent_and_cleared() {
        let mut fx = fixture(&["needs approval"]);
        start_selected(&mut fx);
        let id = fx.app.selected_task().expect("task").id;
        JsonlEventLog::for_repo(fx.app.repo())
            .append(
                id,
                &AgentEvent::new(
                    AgentEventKind::RequestPermission,
                    json!({"message": "Edit Cargo.toml?", "options": [
                        {"optionId": "allow_once", "label": "Allow once"},
                        {"optionId": "reject", "label": "Reject"}
                    ]}),
                    Utc::now(),
                ),
            )
            .expect("append");
        let cmd = fx.app.update(RepoMsg::Tick(Utc::now()));
        drive(&mut fx.app, cmd);
        assert!(fx
            .app
            .detail()
            .and_then(|d| d.protocol.active_request.as_ref())
            .is_some());

        press(&mut fx, KeyCode::Char('p'));
        assert_eq!(fx.app.mode(), &Mode::Normal);

        press(&mut fx, KeyCode::Char('2'));
        let sent = fx.backend.snapshot().sent;
        assert_eq!(sent.last().map(|(_, text)| text.as_str()), Some("reject"));
        assert!(fx
            .app
            .detail()
            .and_then(|d| d.protocol.active_request.as_ref())
            .is_none());
    }

    #[test]
    fn forced_transition_is_audited() {
        let mut fx = fixture(&["stuck"]);
        press(&mut fx, KeyCode::Char('t'));
        let target = match fx.app.mode() {
            Mode::TransitionMenu { options, .. } => options
                .iter()
                .position(|t| *t == Transition::Forced(TaskStatus::Done))
                .expect("forced done offered"),
            other => panic!("unexpected mode {other:?}"),
        };
        for _ in 0..target {
            press(&mut fx, KeyCode::Char('j'));
        }
        press(&mut fx, KeyCode::Enter);

        let task = fx.app.selected_task().expect("task");
        assert_eq!(task.status, TaskStatus::Done);
        let store = SqliteStore::open_repository(fx.app.repo()).expect("store");
        let audit = store.list_transitions(task.id).expect("transitions");
        assert!(audit.last().expect("audit row").forced);
    }

    fn force_to(fx: &mut Fixture, status: TaskStatus) {
        press(fx, KeyCode::Char('t'));
        let target = match fx.app.mode() {
            Mode::TransitionMenu { options, .. } => options
                .iter()
                .position(|t| *t == Transition::Forced(status))
                .expect("forced target offered"),
            other => panic!("unexpected mode {other:?}"),
        };
        for _ in 0..target {
            press(fx, KeyCode::Char('j'));
        }
        press(fx, KeyCode::Enter);
    }

    #[test]
    fn forcing_a_reviewed_task_back_to_stopped_allows_only_one_session() {
        let config = HiveConfig {
            review_mode: ReviewMode::Agent,
            ..HiveConfig::default()
        };
        let mut fx = fixture_with(&["agent review"], config);
        start_selected(&mut fx);
        press(&mut fx, KeyCode::Char('R'));
        press(&mut fx, KeyCode::Char('v'));
        let task = fx.app.selected_task().expect("task");
        assert_eq!(task.status, TaskStatus::Reviewing);
        assert_eq!(task.session, "hive-repo-1-review");

        force_to(&mut fx, TaskStatus::Stopped);
        let task = fx.app.selected_task().expect("task");
        assert_eq!(task.status, TaskStatus::Stopped);
        assert!(!task.has_session());
        assert!(fx.backend.snapshot().running.is_empty());

        start_selected(&mut fx);
        let task = fx.app.selected_task().expect("task");
        assert_eq!(task.status, TaskStatus::InProgress);
        let running = fx.backend.snapshot().running;
        assert_eq!(running.len(), 1);
        assert!(running.contains("hive-repo-1"));
    }

    #[test]
    fn forcing_to_an_active_status_keeps_the_session() {
        let mut fx = fixture(&["keeps running"]);
        start_selected(&mut fx);
        force_to(&mut fx, TaskStatus::ForReview);
        let task = fx.app.selected_task().expect("task");
        assert_eq!(task.session, "hive-repo-1");
        assert!(fx.backend.snapshot().stopped.is_empty());
    }

    #[test]
    fn picker_reaches_options_past_the_ninth() {
        let mut fx = fixture(&["many choices"]);
        start_selected(&mut fx);
        let id = fx.app.selected_task().expect("task").id;
        let options: Vec<_> = (1..=11)
            .map(|n| json!({"optionId": format!("choice_{n}"), "label": format!("Choice {n}")}))
            .collect();
        JsonlEventLog::for_repo(fx.app.repo())
            .append(
                id,
                &AgentEvent::new(
                    AgentEventKind::RequestPermission,
                    json!({"message": "Pick one", "options": options}),
                    Utc::now(),
                ),
            )
            .expect("append");
        let cmd = fx.app.update(RepoMsg::Tick(Utc::now()));
        drive(&mut fx.app, cmd);

        press(&mut fx, KeyCode::Char('P'));
        match fx.app.mode() {
            Mode::PermissionPicker { options, selected } => {
                assert_eq!(options.len(), 11);
                assert_eq!(*selected, 0);
            }
            other => panic!("unexpected mode {other:?}"),
        }
        for _ in 0..10 {
            press(&mut fx, KeyCode::Char('j'));
        }
        press(&mut fx, KeyCode::Enter);

        assert_eq!(fx.app.mode(), &Mode::Normal);
        let sent = fx.backend.snapshot().sent;
        assert_eq!(sent.last().map(|(_, text)| text.as_str()), Some("choice_11"));
    }

    #[test]
    fn picker_needs_a_pending_request() {
        let mut fx = fixture(&["quiet"]);
        start_selected(&mut fx);
        press(&mut fx, KeyCode::Char('P'));
        assert_eq!(fx.app.mode(), &Mode::Normal);
    }

    #[test]
    fn failed_load_keeps_previous_tasks() {
        let mut fx = fixture(&["keep me"]);
        fx.app
            .update(RepoMsg::TasksLoaded(Err("database is locked".into())));
        assert_eq!(fx.app.tasks().len(), 1);
        assert!(fx.app.banner().expect("banner").is_error());

        press(&mut fx, KeyCode::Char('j'));
        assert!(fx.app.banner().is_none());
    }
}
