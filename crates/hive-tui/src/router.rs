//! Repository list plus one lazily created [`RepoApp`] per healthy repository.
//!
//! Instances are owned in a map keyed by repository path. Their commands are
//! wrapped with that path before they leave the router, and results are routed
//! back by the same key.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossterm::event::{KeyCode, KeyEvent};
use hive_agents::session::SessionBackend;
use hive_core::config::load_or_default;
use hive_core::workspace::{check_health, RepoHealth, RepoList, RepoListError, RepoListStore};
use hive_store::persistence::{init_repository, SqliteStore};

use crate::action::{is_press, map_list_key, ListCommand};
use crate::app::RepoApp;
use crate::cmd::{wrap_for_repo, Cmd};
use crate::event::{Msg, RepoMsg};
use crate::model::{Banner, RepoSummary};

/// Builds the session backend for a repository.
pub type BackendFactory = Box<dyn Fn(&Path) -> Arc<dyn SessionBackend>>;

const LIST_MAX_WIDTH: u16 = 40;
/// Header and footer rows around the panes.
const CHROME_ROWS: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    List,
    Instance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListMode {
    Normal,
    AddPath { buffer: String },
}

#[derive(Debug, Clone, Default)]
pub struct RouterSettings {
    pub global_config: Option<PathBuf>,
    /// Terminal width at which list and instance are shown side by side.
    pub split_min_width: u16,
}

pub struct Router {
    store: RepoListStore,
    repos: RepoList,
    /// Sticky: stays until the list file is fixed and hive restarted.
    notice: Option<String>,
    banner: Option<Banner>,
    cursor: usize,
    active: Option<PathBuf>,
    focus: Focus,
    mode: ListMode,
    instances: HashMap<PathBuf, RepoApp>,
    health: HashMap<PathBuf, RepoHealth>,
    summaries: HashMap<PathBuf, RepoSummary>,
    size: (u16, u16),
    settings: RouterSettings,
    backends: BackendFactory,
    quit: bool,
}

impl Router {
    pub fn new(mut store: RepoListStore, settings: RouterSettings, backends: BackendFactory) -> Self {
        let (repos, notice) = match store.load() {
            Ok(repos) => (repos, None),
            Err(err @ RepoListError::Corrupted { .. }) => (
                RepoList::default(),
                Some(format!("{err}; changes to the list are disabled until it is fixed")),
            ),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read repository list");
                (RepoList::default(), Some(err.to_string()))
            }
        };
        let active = repos.repos.first().map(|entry| entry.path.clone());
        Self {
            store,
            repos,
            notice,
            banner: None,
            cursor: 0,
            active,
            focus: Focus::List,
            mode: ListMode::Normal,
            instances: HashMap::new(),
            health: HashMap::new(),
            summaries: HashMap::new(),
            size: (0, 0),
            settings,
            backends,
            quit: false,
        }
    }

    pub fn init(&mut self) -> Cmd {
        self.refresh_all()
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn repos(&self) -> &RepoList {
        &self.repos
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn active(&self) -> Option<&Path> {
        self.active.as_deref()
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn mode(&self) -> &ListMode {
        &self.mode
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn banner(&self) -> Option<&Banner> {
        self.banner.as_ref()
    }

    pub fn health(&self, repo: &Path) -> Option<&RepoHealth> {
        self.health.get(repo)
    }

    pub fn summary(&self, repo: &Path) -> Option<&RepoSummary> {
        self.summaries.get(repo)
    }

    pub fn instance(&self, repo: &Path) -> Option<&RepoApp> {
        self.instances.get(repo)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn active_instance(&self) -> Option<&RepoApp> {
        self.active.as_ref().and_then(|repo| self.instances.get(repo))
    }

    pub fn is_split(&self) -> bool {
        self.size.0 >= self.settings.split_min_width
    }

    pub fn list_width(&self) -> u16 {
        if self.is_split() {
            (self.size.0 / 3).min(LIST_MAX_WIDTH)
        } else {
            self.size.0
        }
    }

    /// Size of the instance pane for the current terminal size.
    pub fn instance_area(&self) -> (u16, u16) {
        let width = if self.is_split() {
            self.size.0.saturating_sub(self.list_width())
        } else {
            self.size.0
        };
        (width, self.size.1.saturating_sub(CHROME_ROWS))
    }

    pub fn update(&mut self, msg: Msg) -> Cmd {
        match msg {
            Msg::Noop => Cmd::none(),
            Msg::Quit => {
                self.quit = true;
                Cmd::none()
            }
            Msg::Key(key) => self.handle_key(key),
            Msg::Resize { width, height } => {
                self.size = (width, height);
                self.resize_instances()
            }
            Msg::Tick(at) => self.on_tick(at),
            Msg::Batch(cmds) => Cmd::Batch(cmds),
            Msg::Repo(msg) => {
                tracing::debug!(?msg, "dropping instance message without a repository");
                Cmd::none()
            }
            Msg::Routed { repo, msg } => self.deliver(&repo, msg),
            Msg::FocusList => {
                self.focus = Focus::List;
                Cmd::none()
            }
            Msg::HealthChecked { repo, health } => self.on_health(repo, health),
            Msg::SummaryLoaded { repo, summary } => {
                if self.repos.find(&repo).is_none() {
                    return Cmd::none();
                }
                match summary {
                    Ok(summary) => {
                        self.summaries.insert(repo, summary);
                    }
                    Err(err) => {
                        tracing::debug!(repo = %repo.display(), error = %err, "summary unavailable")
                    }
                }
                Cmd::none()
            }
            Msg::RepoInitialized { repo, result } => match result {
                Ok(()) => {
                    self.banner = Some(Banner::info(format!("initialized {}", repo.display())));
                    self.health_check(&repo)
                }
                Err(err) => {
                    self.banner = Some(Banner::error(format!("init failed: {err}")));
                    Cmd::none()
                }
            },
        }
    }

    /// Hand `msg` to the instance of `repo`. Results for removed repositories
    /// are dropped.
    fn deliver(&mut self, repo: &Path, msg: RepoMsg) -> Cmd {
        match self.instances.get_mut(repo) {
            Some(instance) => wrap_for_repo(repo, instance.update(msg)),
            None => {
                tracing::debug!(repo = %repo.display(), "dropping message for closed repository");
                Cmd::none()
            }
        }
    }

    fn resize_instances(&mut self) -> Cmd {
        let (width, height) = self.instance_area();
        let repos: Vec<PathBuf> = self.instances.keys().cloned().collect();
        Cmd::batch(
            repos
                .into_iter()
                .map(|repo| self.deliver(&repo, RepoMsg::Resize { width, height })),
        )
    }

    fn on_tick(&mut self, at: DateTime<Utc>) -> Cmd {
        let refresh = self.refresh_all();
        let tick = match self.active.clone() {
            Some(repo) => self.deliver(&repo, RepoMsg::Tick(at)),
            None => Cmd::none(),
        };
        Cmd::batch([refresh, tick])
    }

    /// Health for every listed repository, summaries for the healthy ones.
    fn refresh_all(&self) -> Cmd {
        let mut cmds = Vec::with_capacity(self.repos.repos.len() * 2);
        for entry in &self.repos.repos {
            cmds.push(self.health_check(&entry.path));
            if self.health.get(&entry.path).is_some_and(RepoHealth::is_healthy) {
                cmds.push(load_summary(&entry.path));
            }
        }
        Cmd::batch(cmds)
    }

    fn health_check(&self, repo: &Path) -> Cmd {
        let repo = repo.to_path_buf();
        let global = self.settings.global_config.clone();
        Cmd::perform(move || {
            let health = check_health(&repo, global.as_deref());
            Msg::HealthChecked { repo, health }
        })
    }

    fn on_health(&mut self, repo: PathBuf, health: RepoHealth) -> Cmd {
        if self.repos.find(&repo).is_none() {
            return Cmd::none();
        }
        let healthy = health.is_healthy();
        let first_healthy = healthy && !self.summaries.contains_key(&repo);
        self.health.insert(repo.clone(), health);

        let mut cmds = Vec::new();
        if first_healthy {
            cmds.push(load_summary(&repo));
        }
        if self.active.as_deref() == Some(repo.as_path()) {
            if healthy {
                cmds.push(self.ensure_instance(&repo));
            } else if self.focus == Focus::Instance {
                self.focus = Focus::List;
            }
        }
        Cmd::batch(cmds)
    }

    /// Create the instance for a healthy repository if it does not exist yet,
    /// run its init commands and size it to the pane.
    fn ensure_instance(&mut self, repo: &Path) -> Cmd {
        if self.instances.contains_key(repo) {
            return Cmd::none();
        }
        let global = self.settings.global_config.clone();
        let config = load_or_default(repo, global.as_deref());
        let mut instance = RepoApp::new(repo.to_path_buf(), config, global, (self.backends)(repo));
        let (width, height) = self.instance_area();
        let init = instance.init();
        let resize = instance.update(RepoMsg::Resize { width, height });
        tracing::info!(repo = %repo.display(), "repository instance created");
        self.instances.insert(repo.to_path_buf(), instance);
        wrap_for_repo(repo, Cmd::batch([init, resize]))
    }

    fn handle_key(&mut self, key: KeyEvent) -> Cmd {
        if !is_press(&key) {
            return Cmd::none();
        }
        self.banner = None;

        if self.focus == Focus::Instance {
            if key.code == KeyCode::Tab {
                self.focus = Focus::List;
                return Cmd::none();
            }
            match self.active.clone() {
                Some(repo) if self.instances.contains_key(&repo) => {
                    return self.deliver(&repo, RepoMsg::Key(key));
                }
                _ => self.focus = Focus::List,
            }
        }

        if let ListMode::AddPath { buffer } = &mut self.mode {
            match key.code {
                KeyCode::Esc => self.mode = ListMode::Normal,
                KeyCode::Enter => {
                    let input = buffer.trim().to_string();
                    self.mode = ListMode::Normal;
                    if !input.is_empty() {
                        return self.add_repository(Path::new(&input), Utc::now());
                    }
                }
                KeyCode::Backspace => {
                    buffer.pop();
                }
                KeyCode::Char(ch) => buffer.push(ch),
                _ => {}
            }
            return Cmd::none();
        }

        if key.code == KeyCode::Tab {
            return self.open_active();
        }
        let Some(command) = map_list_key(key) else {
            return Cmd::none();
        };
        match command {
            ListCommand::SelectNext => self.move_cursor(true),
            ListCommand::SelectPrevious => self.move_cursor(false),
            ListCommand::Open => self.open_active(),
            ListCommand::AddRepository => {
                self.mode = ListMode::AddPath {
                    buffer: String::new(),
                };
                Cmd::none()
            }
            ListCommand::RemoveRepository => match self.active.clone() {
                Some(repo) => self.remove_repository(&repo),
                None => Cmd::none(),
            },
            ListCommand::TogglePin => self.toggle_pin(),
            ListCommand::Initialize => self.initialize_active(),
            ListCommand::Refresh => self.refresh_all(),
            ListCommand::Quit => {
                self.quit = true;
                Cmd::none()
            }
        }
    }

    fn move_cursor(&mut self, forward: bool) -> Cmd {
        let len = self.repos.repos.len();
        if len == 0 {
            return Cmd::none();
        }
        self.cursor = if forward {
            (self.cursor + 1).min(len - 1)
        } else {
            self.cursor.saturating_sub(1)
        };
        let repo = self.repos.repos[self.cursor].path.clone();
        self.select(repo)
    }

    /// Point `active` at `repo`; build its instance right away when the cached
    /// health allows it, otherwise ask for a fresh check.
    fn select(&mut self, repo: PathBuf) -> Cmd {
        self.active = Some(repo.clone());
        match self.health.get(&repo) {
            Some(health) if health.is_healthy() => self.ensure_instance(&repo),
            _ => self.health_check(&repo),
        }
    }

    fn open_active(&mut self) -> Cmd {
        let Some(repo) = self.active.clone() else {
            return Cmd::none();
        };
        match self.health.get(&repo) {
            Some(health) if health.is_healthy() => {
                let cmd = self.ensure_instance(&repo);
                self.focus = Focus::Instance;
                if let Err(err) = self.store.touch(&mut self.repos, &repo, Utc::now()) {
                    tracing::warn!(repo = %repo.display(), error = %err, "could not record last opened");
                }
                self.sync_cursor();
                cmd
            }
            Some(health) => {
                let hint = match health {
                    RepoHealth::Uninitialized => " (press i to initialize)".to_string(),
                    RepoHealth::ConfigInvalid(reason) => format!(": {reason}"),
                    _ => String::new(),
                };
                self.banner = Some(Banner::error(format!(
                    "{} is {}{hint}",
                    repo.display(),
                    health.label()
                )));
                Cmd::none()
            }
            None => self.health_check(&repo),
        }
    }

    fn add_repository(&mut self, path: &Path, now: DateTime<Utc>) -> Cmd {
        match self.store.add(&mut self.repos, path, now) {
            Ok(root) => {
                self.banner = Some(Banner::info(format!("added {}", root.display())));
                self.active = Some(root.clone());
                self.sync_cursor();
                self.health_check(&root)
            }
            Err(err) => {
                self.banner = Some(Banner::error(err.to_string()));
                Cmd::none()
            }
        }
    }

    /// Drop `repo` from the list together with its instance and cached state.
    pub fn remove_repository(&mut self, repo: &Path) -> Cmd {
        match self.store.remove(&mut self.repos, repo) {
            Ok(true) => {
                self.instances.remove(repo);
                self.health.remove(repo);
                self.summaries.remove(repo);
                if self.active.as_deref() == Some(repo) {
                    self.active = None;
                    self.focus = Focus::List;
                }
                self.cursor = self.cursor.min(self.repos.repos.len().saturating_sub(1));
                self.banner = Some(Banner::info(format!("removed {}", repo.display())));
            }
            Ok(false) => {}
            Err(err) => self.banner = Some(Banner::error(err.to_string())),
        }
        Cmd::none()
    }

    fn toggle_pin(&mut self) -> Cmd {
        let Some(repo) = self.active.clone() else {
            return Cmd::none();
        };
        match self.store.toggle_pin(&mut self.repos, &repo) {
            Ok(pinned) => {
                let verb = if pinned { "pinned" } else { "unpinned" };
                self.banner = Some(Banner::info(format!("{verb} {}", repo.display())));
                self.sync_cursor();
            }
            Err(err) => self.banner = Some(Banner::error(err.to_string())),
        }
        Cmd::none()
    }

    fn initialize_active(&mut self) -> Cmd {
        let Some(repo) = self.active.clone() else {
            return Cmd::none();
        };
        if self.health.get(&repo) != Some(&RepoHealth::Uninitialized) {
            self.banner = Some(Banner::info("only uninitialized repositories can be initialized"));
            return Cmd::none();
        }
        Cmd::perform(move || {
            let result = init_repository(&repo)
                .map(|_| ())
                .map_err(|err| err.to_string());
            Msg::RepoInitialized { repo, result }
        })
    }

    /// Saving re-sorts the list; keep the cursor on the active entry.
    fn sync_cursor(&mut self) {
        if let Some(active) = &self.active {
            if let Some(idx) = self.repos.repos.iter().position(|entry| &entry.path == active) {
                self.cursor = idx;
            }
        }
    }
}

fn load_summary(repo: &Path) -> Cmd {
    let repo = repo.to_path_buf();
    Cmd::perform(move || {
        let summary = SqliteStore::open_repository(&repo)
            .and_then(|store| store.list_tasks())
            .map(|tasks| RepoSummary::from_tasks(&tasks))
            .map_err(|err| err.to_string());
        Msg::SummaryLoaded { repo, summary }
    })
}
