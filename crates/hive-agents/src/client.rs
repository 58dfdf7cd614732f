//! Interactive operations on a running agent session.

use chrono::{DateTime, Utc};
use hive_core::events::{AgentEvent, AgentEventKind};
use hive_core::protocol::active_permission_request;
use hive_core::types::Task;
use serde_json::json;

use crate::error::SessionError;
use crate::event_log::JsonlEventLog;
use crate::session::SessionBackend;

pub const CANCEL_KEY: &str = "C-c";

/// Sends prompts and permission answers, checking the log before each send.
pub struct ProtocolClient<'a, B: SessionBackend + ?Sized> {
    backend: &'a B,
    log: &'a JsonlEventLog,
}

impl<'a, B: SessionBackend + ?Sized> ProtocolClient<'a, B> {
    pub fn new(backend: &'a B, log: &'a JsonlEventLog) -> Self {
        Self { backend, log }
    }

    fn session<'t>(&self, task: &'t Task) -> Result<&'t str, SessionError> {
        if task.has_session() {
            Ok(task.session.as_str())
        } else {
            Err(SessionError::NoSession { task_id: task.id })
        }
    }

    /// Rejected while a permission request is pending.
    pub fn send_prompt(&self, task: &Task, text: &str, at: DateTime<Utc>) -> Result<(), SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyPrompt);
        }
        let session = self.session(task)?;
        let events = self.log.read_all(task.id)?;
        if active_permission_request(&events).is_some() {
            return Err(SessionError::PermissionPending);
        }

        self.backend.send(session, text)?;
        self.log.append(
            task.id,
            &AgentEvent::new(AgentEventKind::PromptSent, json!({ "text": text }), at),
        )?;
        tracing::debug!(task_id = %task.id, "prompt sent");
        Ok(())
    }

    /// Answer the pending request with one of its option ids. The response is
    /// logged only after the backend accepted the keystrokes.
    pub fn respond_permission(
        &self,
        task: &Task,
        option_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let session = self.session(task)?;
        let events = self.log.read_all(task.id)?;
        let request = active_permission_request(&events).ok_or(SessionError::NoPendingPermission)?;
        if request.option(option_id).is_none() {
            return Err(SessionError::UnknownOption {
                option_id: option_id.to_string(),
            });
        }

        self.backend.send(session, option_id)?;
        self.log.append(
            task.id,
            &AgentEvent::new(
                AgentEventKind::PermissionResponse,
                json!({ "optionId": option_id }),
                at,
            ),
        )?;
        tracing::info!(task_id = %task.id, option_id, "permission answered");
        Ok(())
    }

    pub fn cancel(&self, task: &Task) -> Result<(), SessionError> {
        let session = self.session(task)?;
        self.backend.send_keys(session, &[CANCEL_KEY])
    }
}
