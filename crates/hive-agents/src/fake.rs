//! In-memory session backend for tests and dry runs.

use std::collections::{BTreeMap, BTreeSet};
use std::process::Command;
use std::sync::{Mutex, MutexGuard};

use crate::error::SessionError;
use crate::session::{PaneProcess, SessionBackend, StartRequest};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FakeState {
    pub running: BTreeSet<String>,
    /// Start requests in call order.
    pub started: Vec<StartRequest>,
    pub stopped: Vec<String>,
    /// `(session, text)` pairs sent with Enter.
    pub sent: Vec<(String, String)>,
    pub keys: Vec<(String, Vec<String>)>,
    /// Canned pane contents returned by `peek`.
    pub panes: BTreeMap<String, String>,
    /// When set, the next backend call fails with this message.
    pub fail_next: Option<String>,
}

#[derive(Debug, Default)]
pub struct FakeBackend {
    namespace: String,
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> FakeState {
        self.state().clone()
    }

    /// Simulate the agent process exiting on its own.
    pub fn kill(&self, session: &str) {
        self.state().running.remove(session);
    }

    pub fn fail_next(&self, message: impl Into<String>) {
        self.state().fail_next = Some(message.into());
    }

    fn checked(&self, command: &str) -> Result<MutexGuard<'_, FakeState>, SessionError> {
        let mut state = self.state();
        if let Some(stderr) = state.fail_next.take() {
            return Err(SessionError::CommandFailed {
                command: command.to_string(),
                stderr,
            });
        }
        Ok(state)
    }

    fn checked_running(
        &self,
        command: &str,
        session: &str,
    ) -> Result<MutexGuard<'_, FakeState>, SessionError> {
        let state = self.checked(command)?;
        if !state.running.contains(session) {
            return Err(SessionError::SessionNotFound {
                session: session.to_string(),
            });
        }
        Ok(state)
    }
}

impl SessionBackend for FakeBackend {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn start(&self, request: &StartRequest) -> Result<String, SessionError> {
        if request.command.trim().is_empty() {
            return Err(SessionError::EmptyCommand);
        }
        let name = self.session_name(request.task_id, request.role);
        let mut state = self.checked("start")?;
        state.running.insert(name.clone());
        state.started.push(request.clone());
        Ok(name)
    }

    fn stop(&self, session: &str) -> Result<(), SessionError> {
        let mut state = self.checked("stop")?;
        state.running.remove(session);
        state.stopped.push(session.to_string());
        Ok(())
    }

    fn attach_command(&self, _session: &str) -> Command {
        Command::new("true")
    }

    fn send(&self, session: &str, text: &str) -> Result<(), SessionError> {
        let mut state = self.checked_running("send", session)?;
        state.sent.push((session.to_string(), text.to_string()));
        Ok(())
    }

    fn send_keys(&self, session: &str, keys: &[&str]) -> Result<(), SessionError> {
        let mut state = self.checked_running("send-keys", session)?;
        state.keys.push((
            session.to_string(),
            keys.iter().map(|key| key.to_string()).collect(),
        ));
        Ok(())
    }

    fn peek(&self, session: &str, lines: usize, _escapes: bool) -> Result<String, SessionError> {
        let state = self.checked("peek")?;
        let body = state.panes.get(session).cloned().unwrap_or_default();
        let all: Vec<&str> = body.lines().collect();
        let from = all.len().saturating_sub(lines);
        Ok(all[from..].join("\n"))
    }

    fn is_running(&self, session: &str) -> Result<bool, SessionError> {
        Ok(self.checked("has-session")?.running.contains(session))
    }

    fn list_pane_processes(&self, session: &str) -> Result<Vec<PaneProcess>, SessionError> {
        let state = self.checked_running("list-panes", session)?;
        let command = state
            .started
            .iter()
            .rev()
            .find(|request| self.session_name(request.task_id, request.role) == session)
            .map(|request| request.command.clone())
            .unwrap_or_default();
        Ok(vec![PaneProcess { pid: 1, command }])
    }
}
