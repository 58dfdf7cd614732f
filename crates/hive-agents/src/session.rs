//! Session backend contract.

use hive_core::types::TaskId;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::SessionError;
use crate::util::sanitize_component;

pub const SESSION_PREFIX: &str = "hive";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionRole {
    Worker,
    /// Review ("manager") session that replaces the worker in agent review mode.
    Reviewer,
}

/// `hive-<namespace>-<id>`, plus `-review` for the reviewer role.
pub fn session_name(namespace: &str, task_id: TaskId, role: SessionRole) -> String {
    match role {
        SessionRole::Worker => format!("{SESSION_PREFIX}-{namespace}-{task_id}"),
        SessionRole::Reviewer => format!("{SESSION_PREFIX}-{namespace}-{task_id}-review"),
    }
}

const NAMESPACE_HASH_LEN: usize = 8;

/// Namespace for a repository: the sanitized directory name followed by a
/// short digest of the full path, so same-named checkouts under different
/// parents never share session names.
pub fn session_namespace(repo: &Path) -> String {
    let name = repo
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(repo.to_string_lossy().as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!(
        "{}-{}",
        sanitize_component(&name),
        &digest[..NAMESPACE_HASH_LEN]
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub task_id: TaskId,
    pub role: SessionRole,
    pub workdir: PathBuf,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneProcess {
    pub pid: u32,
    pub command: String,
}

pub trait SessionBackend: Send + Sync {
    fn namespace(&self) -> &str;

    fn session_name(&self, task_id: TaskId, role: SessionRole) -> String {
        session_name(self.namespace(), task_id, role)
    }

    /// Start a detached session and return its name.
    fn start(&self, request: &StartRequest) -> Result<String, SessionError>;
    fn stop(&self, session: &str) -> Result<(), SessionError>;
    /// Foreground command that hands the terminal to the session until detach.
    fn attach_command(&self, session: &str) -> Command;
    /// Type `text` into the session and press Enter.
    fn send(&self, session: &str, text: &str) -> Result<(), SessionError>;
    /// Send raw key names such as `C-c`.
    fn send_keys(&self, session: &str, keys: &[&str]) -> Result<(), SessionError>;
    fn peek(&self, session: &str, lines: usize, escapes: bool) -> Result<String, SessionError>;
    fn is_running(&self, session: &str) -> Result<bool, SessionError>;
    fn list_pane_processes(&self, session: &str) -> Result<Vec<PaneProcess>, SessionError>;
}

pub(crate) fn parse_pane_processes(output: &str) -> Vec<PaneProcess> {
    output
        .lines()
        .filter_map(|line| {
            let (pid, command) = line.trim().split_once(' ')?;
            Some(PaneProcess {
                pid: pid.parse().ok()?,
                command: command.trim().to_string(),
            })
        })
        .collect()
}
