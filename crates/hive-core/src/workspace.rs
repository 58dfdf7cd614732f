//! Repository list persistence and per-repository health checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{config_home, load_repo_config, STATE_DIR_NAME};
use crate::validation::{first_error, Validate};

pub const REPO_LIST_VERSION: u32 = 1;
pub const REPO_LIST_FILE_NAME: &str = "repos.toml";
pub const DATABASE_FILE_NAME: &str = "state.sqlite";

#[derive(Debug, thiserror::Error)]
pub enum RepoListError {
    #[error("failed to read repository list at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("repository list at {path} is corrupted: {source}")]
    Corrupted {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("repository list at {path} failed to load; refusing to overwrite it")]
    WriteBlocked { path: PathBuf },
    #[error("failed to resolve {path}: {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not inside a git repository")]
    NotGitRepository { path: PathBuf },
    #[error("failed to serialize repository list: {source}")]
    Serialize {
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write repository list at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEntry {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_opened: Option<DateTime<Utc>>,
}

impl RepositoryEntry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name: None,
            pinned: false,
            last_opened: None,
        }
    }

    /// Explicit name, else the final path component.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|name| !name.is_empty()) {
            return name.to_string();
        }
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoList {
    pub version: u32,
    #[serde(default)]
    pub repos: Vec<RepositoryEntry>,
}

impl Default for RepoList {
    fn default() -> Self {
        Self {
            version: REPO_LIST_VERSION,
            repos: Vec::new(),
        }
    }
}

impl RepoList {
    /// Drop later entries whose path was already seen.
    pub fn dedup_by_path(&mut self) {
        let mut seen: Vec<PathBuf> = Vec::with_capacity(self.repos.len());
        self.repos.retain(|entry| {
            if seen.contains(&entry.path) {
                return false;
            }
            seen.push(entry.path.clone());
            true
        });
    }

    /// Pinned first, then most recently opened, then by display name.
    pub fn sort(&mut self) {
        self.repos.sort_by(compare_entries);
    }

    pub fn find(&self, path: &Path) -> Option<&RepositoryEntry> {
        self.repos.iter().find(|entry| entry.path == path)
    }

    fn find_mut(&mut self, path: &Path) -> Option<&mut RepositoryEntry> {
        self.repos.iter_mut().find(|entry| entry.path == path)
    }
}

fn compare_entries(a: &RepositoryEntry, b: &RepositoryEntry) -> Ordering {
    b.pinned
        .cmp(&a.pinned)
        .then_with(|| match (a.last_opened, b.last_opened) {
            (Some(a_at), Some(b_at)) => b_at.cmp(&a_at),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.display_name().cmp(&b.display_name()))
}

/// Walk up from `path` to the first directory containing a `.git` entry.
pub fn find_git_root(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// File-backed repository list. A failed load poisons the store so the
/// unreadable file is never overwritten.
#[derive(Debug, Clone)]
pub struct RepoListStore {
    path: PathBuf,
    poisoned: bool,
}

impl RepoListStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poisoned: false,
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        config_home().map(|dir| dir.join(REPO_LIST_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn load(&mut self) -> Result<RepoList, RepoListError> {
        let body = match fs::read_to_string(&self.path) {
            Ok(body) => body,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.poisoned = false;
                return Ok(RepoList::default());
            }
            Err(source) => {
                self.poisoned = true;
                return Err(RepoListError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let mut list: RepoList = match toml::from_str(&body) {
            Ok(list) => list,
            Err(source) => {
                self.poisoned = true;
                tracing::warn!(path = %self.path.display(), "repository list is corrupted");
                return Err(RepoListError::Corrupted {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        self.poisoned = false;
        list.dedup_by_path();
        Ok(list)
    }

    fn ensure_writable(&self) -> Result<(), RepoListError> {
        if self.poisoned {
            return Err(RepoListError::WriteBlocked {
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    pub fn save(&self, list: &mut RepoList) -> Result<(), RepoListError> {
        self.ensure_writable()?;
        list.version = REPO_LIST_VERSION;
        list.dedup_by_path();
        list.sort();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| RepoListError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let body =
            toml::to_string_pretty(list).map_err(|source| RepoListError::Serialize { source })?;
        fs::write(&self.path, body).map_err(|source| RepoListError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// Resolve `path` to its git root and add it, or refresh `last_opened`
    /// when already listed. Returns the stored path.
    pub fn add(
        &self,
        list: &mut RepoList,
        path: &Path,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, RepoListError> {
        self.ensure_writable()?;
        let resolved = path
            .canonicalize()
            .map_err(|source| RepoListError::Resolve {
                path: path.to_path_buf(),
                source,
            })?;
        let root = find_git_root(&resolved).ok_or_else(|| RepoListError::NotGitRepository {
            path: resolved.clone(),
        })?;

        match list.find_mut(&root) {
            Some(entry) => entry.last_opened = Some(now),
            None => {
                let mut entry = RepositoryEntry::new(root.clone());
                entry.last_opened = Some(now);
                list.repos.push(entry);
            }
        }
        self.save(list)?;
        tracing::info!(repo = %root.display(), "repository added");
        Ok(root)
    }

    /// Returns whether an entry was removed.
    pub fn remove(&self, list: &mut RepoList, path: &Path) -> Result<bool, RepoListError> {
        self.ensure_writable()?;
        let before = list.repos.len();
        list.repos.retain(|entry| entry.path != path);
        let removed = list.repos.len() != before;
        if removed {
            self.save(list)?;
            tracing::info!(repo = %path.display(), "repository removed");
        }
        Ok(removed)
    }

    pub fn toggle_pin(&self, list: &mut RepoList, path: &Path) -> Result<bool, RepoListError> {
        self.ensure_writable()?;
        let Some(entry) = list.find_mut(path) else {
            return Ok(false);
        };
        entry.pinned = !entry.pinned;
        let pinned = entry.pinned;
        self.save(list)?;
        Ok(pinned)
    }

    pub fn touch(
        &self,
        list: &mut RepoList,
        path: &Path,
        now: DateTime<Utc>,
    ) -> Result<(), RepoListError> {
        self.ensure_writable()?;
        if let Some(entry) = list.find_mut(path) {
            entry.last_opened = Some(now);
            self.save(list)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoHealth {
    Missing,
    NotGitRepository,
    Uninitialized,
    ConfigInvalid(String),
    Healthy,
}

impl RepoHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, RepoHealth::Healthy)
    }

    pub fn label(&self) -> &'static str {
        match self {
            RepoHealth::Missing => "missing",
            RepoHealth::NotGitRepository => "not a git repo",
            RepoHealth::Uninitialized => "not initialized",
            RepoHealth::ConfigInvalid(_) => "bad config",
            RepoHealth::Healthy => "ok",
        }
    }
}

pub fn state_dir(repo: &Path) -> PathBuf {
    repo.join(STATE_DIR_NAME)
}

pub fn database_path(repo: &Path) -> PathBuf {
    state_dir(repo).join(DATABASE_FILE_NAME)
}

pub fn events_dir(repo: &Path) -> PathBuf {
    state_dir(repo).join("events")
}

/// Path exists, is a git root, has local state, and its config loads without
/// error-level issues.
pub fn check_health(repo: &Path, global_config: Option<&Path>) -> RepoHealth {
    if !repo.is_dir() {
        return RepoHealth::Missing;
    }
    if !repo.join(".git").exists() {
        return RepoHealth::NotGitRepository;
    }
    if !database_path(repo).is_file() {
        return RepoHealth::Uninitialized;
    }
    match load_repo_config(repo, global_config) {
        Ok(config) => match first_error(&config.validate()) {
            Some(issue) => RepoHealth::ConfigInvalid(issue.message.clone()),
            None => RepoHealth::Healthy,
        },
        Err(err) => RepoHealth::ConfigInvalid(err.to_string()),
    }
}
