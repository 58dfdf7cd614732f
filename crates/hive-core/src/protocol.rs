//! Interactive state derived from a task's agent event log.
//!
//! Every function here is a pure fold over the full log. The writer of the log
//! is usually a different process, so nothing is cached between calls and a
//! replay of the same log always yields the same state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{AgentEvent, AgentEventKind, PermissionRequestPayload};
use crate::transcript::{coalesce_transcript, TranscriptEntry};

pub const FALLBACK_PERMISSION_MESSAGE: &str = "Permission requested";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOption {
    pub option_id: String,
    pub label: String,
}

impl PermissionOption {
    pub fn new(option_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            option_id: option_id.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub message: String,
    pub options: Vec<PermissionOption>,
    pub requested_at: DateTime<Utc>,
}

impl PermissionRequest {
    pub fn option(&self, option_id: &str) -> Option<&PermissionOption> {
        self.options
            .iter()
            .find(|option| option.option_id == option_id)
    }
}

/// Generic choice pair used when a request payload is malformed.
pub fn fallback_permission_options() -> Vec<PermissionOption> {
    vec![
        PermissionOption::new("allow", "Allow"),
        PermissionOption::new("deny", "Deny"),
    ]
}

fn request_from_event(event: &AgentEvent) -> PermissionRequest {
    let payload = event.permission_request().unwrap_or_default();
    PermissionRequest {
        message: request_message(&payload),
        options: request_options(&payload).unwrap_or_else(fallback_permission_options),
        requested_at: event.timestamp,
    }
}

fn request_message(payload: &PermissionRequestPayload) -> String {
    payload
        .display_message()
        .unwrap_or(FALLBACK_PERMISSION_MESSAGE)
        .to_string()
}

/// `None` when any option lacks an id or there are no options at all.
fn request_options(payload: &PermissionRequestPayload) -> Option<Vec<PermissionOption>> {
    if payload.options.is_empty() {
        return None;
    }
    payload
        .options
        .iter()
        .map(|option| {
            let option_id = option.option_id.as_deref()?.trim();
            if option_id.is_empty() {
                return None;
            }
            let label = option.display_label().unwrap_or(option_id);
            Some(PermissionOption::new(option_id, label))
        })
        .collect()
}

/// Scan from the end: the latest permission request or response decides.
pub fn active_permission_request(events: &[AgentEvent]) -> Option<PermissionRequest> {
    let decisive = events.iter().rev().find(|event| {
        matches!(
            event.kind,
            AgentEventKind::RequestPermission | AgentEventKind::PermissionResponse
        )
    })?;
    match decisive.kind {
        AgentEventKind::RequestPermission => Some(request_from_event(decisive)),
        _ => None,
    }
}

pub fn has_session_end(events: &[AgentEvent]) -> bool {
    events
        .iter()
        .any(|event| event.kind == AgentEventKind::SessionEnd)
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProtocolState {
    pub active_request: Option<PermissionRequest>,
    pub transcript: Vec<TranscriptEntry>,
    pub session_ended: bool,
    pub last_event_at: Option<DateTime<Utc>>,
}

impl ProtocolState {
    /// Prompts are rejected while the agent waits on a permission answer.
    pub fn accepts_prompt(&self) -> bool {
        self.active_request.is_none()
    }
}

pub fn derive_protocol_state(events: &[AgentEvent]) -> ProtocolState {
    ProtocolState {
        active_request: active_permission_request(events),
        transcript: coalesce_transcript(events),
        session_ended: has_session_end(events),
        last_event_at: events.last().map(|event| event.timestamp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, sec).unwrap()
    }

    fn ev(kind: AgentEventKind, payload: serde_json::Value, sec: u32) -> AgentEvent {
        AgentEvent::new(kind, payload, at(sec))
    }

    fn request(sec: u32) -> AgentEvent {
        ev(
            AgentEventKind::RequestPermission,
            json!({
                "message": "Edit src/main.rs?",
                "options": [
                    {"optionId": "allow_once", "label": "Allow once"},
                    {"optionId": "reject", "label": "Reject"}
                ]
            }),
            sec,
        )
    }

    fn response(sec: u32) -> AgentEvent {
        ev(
            AgentEventKind::PermissionResponse,
            json!({"optionId": "allow_once"}),
            sec,
        )
    }

    #[test]
    fn no_permission_events_means_no_active_request() {
        let events = vec![
            ev(AgentEventKind::PromptSent, json!({"text": "go"}), 0),
            ev(AgentEventKind::AgentMessageChunk, json!({"text": "ok"}), 1),
        ];
        assert_eq!(active_permission_request(&events), None);
        assert_eq!(active_permission_request(&[]), None);
    }

    #[test]
    fn trailing_request_is_active_and_response_clears_it() {
        let mut events = vec![
            ev(AgentEventKind::PromptSent, json!({"text": "go"}), 0),
            request(1),
            ev(AgentEventKind::ToolCallUpdate, json!({}), 2),
        ];
        let active = active_permission_request(&events).expect("active request");
        assert_eq!(active.message, "Edit src/main.rs?");
        assert_eq!(
            active.options,
            vec![
                PermissionOption::new("allow_once", "Allow once"),
                PermissionOption::new("reject", "Reject"),
            ]
        );
        assert_eq!(active.requested_at, at(1));

        events.push(response(3));
        assert_eq!(active_permission_request(&events), None);
    }

    #[test]
    fn newer_request_after_response_is_active_again() {
        let events = vec![request(1), response(2), request(3)];
        let active = active_permission_request(&events).expect("second request");
        assert_eq!(active.requested_at, at(3));
    }

    #[test]
    fn malformed_request_falls_back_to_allow_deny() {
        let events = vec![ev(
            AgentEventKind::RequestPermission,
            json!({"options": "not-a-list"}),
            0,
        )];
        let active = active_permission_request(&events).expect("fallback request");
        assert_eq!(active.message, FALLBACK_PERMISSION_MESSAGE);
        assert_eq!(active.options, fallback_permission_options());

        let missing_ids = vec![ev(
            AgentEventKind::RequestPermission,
            json!({"message": "Run it?", "options": [{"label": "Yes"}]}),
            0,
        )];
        let active = active_permission_request(&missing_ids).expect("fallback request");
        assert_eq!(active.message, "Run it?");
        assert_eq!(active.options, fallback_permission_options());
    }

    #[test]
    fn request_with_title_and_message_keeps_its_options() {
        let events = vec![ev(
            AgentEventKind::RequestPermission,
            json!({
                "title": "Edit file",
                "message": "Allow edit of main.rs?",
                "options": [{"optionId": "allow_always"}]
            }),
            0,
        )];
        let active = active_permission_request(&events).expect("request");
        assert_eq!(active.message, "Allow edit of main.rs?");
        assert_eq!(
            active.options,
            vec![PermissionOption::new("allow_always", "allow_always")]
        );
    }

    #[test]
    fn option_without_label_uses_id() {
        let events = vec![ev(
            AgentEventKind::RequestPermission,
            json!({"options": [{"optionId": "proceed"}]}),
            0,
        )];
        let active = active_permission_request(&events).expect("request");
        assert_eq!(active.options, vec![PermissionOption::new("proceed", "proceed")]);
        assert!(active.option("proceed").is_some());
        assert!(active.option("allow").is_none());
    }

    #[test]
    fn replaying_the_same_log_is_idempotent() {
        let events = vec![
            ev(AgentEventKind::PromptSent, json!({"text": "add tests"}), 0),
            ev(AgentEventKind::AgentMessageChunk, json!({"text": "Sure, "}), 1),
            ev(AgentEventKind::AgentMessageChunk, json!({"text": "on it."}), 2),
            ev(AgentEventKind::ToolCall, json!({"title": "cargo test"}), 3),
            request(4),
        ];
        let first = derive_protocol_state(&events);
        let second = derive_protocol_state(&events);
        assert_eq!(first, second);
        assert!(!first.accepts_prompt());
        assert_eq!(first.last_event_at, Some(at(4)));
    }

    #[test]
    fn session_end_is_detected() {
        let events = vec![ev(
            AgentEventKind::SessionEnd,
            json!({"reason": "completed"}),
            0,
        )];
        let state = derive_protocol_state(&events);
        assert!(state.session_ended);
        assert!(state.accepts_prompt());
    }
}
