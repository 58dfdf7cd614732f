//! Configuration for hive: agent command templates, review mode and UI tuning.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const STATE_DIR_NAME: &str = ".hive";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewMode {
    /// The user reviews in the worker session.
    #[default]
    Manual,
    /// A separate reviewer session replaces the worker session.
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Shell command template; `{task_id}`, `{title}` and `{description}` are
    /// substituted at start time.
    pub command: String,
}

impl AgentConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub tick_ms: u64,
    /// Below this terminal width only one pane is drawn.
    pub split_min_width: u16,
    /// Maximum transcript lines kept for the detail pane.
    pub transcript_limit: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            split_min_width: 120,
            transcript_limit: 400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HiveConfig {
    pub default_agent: String,
    pub review_mode: ReviewMode,
    pub review_agent: Option<String>,
    pub agents: BTreeMap<String, AgentConfig>,
    pub ui: UiConfig,
}

impl Default for HiveConfig {
    fn default() -> Self {
        let agents = ["claude", "codex", "gemini"]
            .into_iter()
            .map(|name| (name.to_string(), AgentConfig::new(name)))
            .collect();
        Self {
            default_agent: "claude".to_string(),
            review_mode: ReviewMode::Manual,
            review_agent: None,
            agents,
            ui: UiConfig::default(),
        }
    }
}

impl HiveConfig {
    pub fn agent_command(&self, name: &str) -> Option<&str> {
        self.agents.get(name).map(|agent| agent.command.as_str())
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    /// Agent that runs reviews in agent mode; falls back to the default agent.
    pub fn reviewer(&self) -> &str {
        self.review_agent
            .as_deref()
            .unwrap_or(self.default_agent.as_str())
    }
}

/// `$XDG_CONFIG_HOME/hive`, falling back to `~/.config/hive`.
pub fn config_home() -> Option<PathBuf> {
    xdg_dir("XDG_CONFIG_HOME", ".config")
}

/// `$XDG_STATE_HOME/hive`, falling back to `~/.local/state/hive`.
pub fn state_home() -> Option<PathBuf> {
    xdg_dir("XDG_STATE_HOME", ".local/state")
}

fn xdg_dir(var: &str, home_fallback: &str) -> Option<PathBuf> {
    let base = std::env::var_os(var)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(home_fallback)))?;
    Some(base.join("hive"))
}

pub fn global_config_path() -> Option<PathBuf> {
    config_home().map(|dir| dir.join(CONFIG_FILE_NAME))
}

pub fn repo_config_path(repo: &Path) -> PathBuf {
    repo.join(STATE_DIR_NAME).join(CONFIG_FILE_NAME)
}

/// The repository file wins when present; otherwise the global file.
pub fn resolve_config_path(repo: &Path, global: Option<&Path>) -> Option<PathBuf> {
    let local = repo_config_path(repo);
    if local.is_file() {
        return Some(local);
    }
    global.filter(|path| path.is_file()).map(Path::to_path_buf)
}

pub fn parse_config(contents: &str) -> Result<HiveConfig, toml::de::Error> {
    toml::from_str(contents)
}

pub fn load_config(path: impl AsRef<Path>) -> Result<HiveConfig, ConfigError> {
    let path_ref = path.as_ref();
    let body = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
        path: path_ref.to_path_buf(),
        source,
    })?;
    parse_config(&body).map_err(|source| ConfigError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })
}

/// Strict load for a repository: built-in defaults when no file exists, an
/// error when a file exists but cannot be read or parsed.
pub fn load_repo_config(repo: &Path, global: Option<&Path>) -> Result<HiveConfig, ConfigError> {
    match resolve_config_path(repo, global) {
        Some(path) => load_config(path),
        None => Ok(HiveConfig::default()),
    }
}

/// Never fails: a broken config logs a warning and yields defaults.
pub fn load_or_default(repo: &Path, global: Option<&Path>) -> HiveConfig {
    match load_repo_config(repo, global) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(repo = %repo.display(), error = %err, "config load failed, using defaults");
            HiveConfig::default()
        }
    }
}
