//! Agent-communication events as they appear in a task's append-only log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentEventKind {
    ToolCall,
    RequestPermission,
    PermissionResponse,
    PromptSent,
    SessionEnd,
    AgentMessageChunk,
    AgentThoughtChunk,
    ToolCallUpdate,
    UserMessageChunk,
    SessionUpdate,
    Plan,
    CurrentModeUpdate,
    AvailableCommands,
}

impl AgentEventKind {
    /// Streaming and update-only kinds never produce a transcript line.
    pub fn is_rendered(self) -> bool {
        matches!(
            self,
            AgentEventKind::ToolCall
                | AgentEventKind::RequestPermission
                | AgentEventKind::PermissionResponse
                | AgentEventKind::PromptSent
                | AgentEventKind::SessionEnd
                | AgentEventKind::AgentMessageChunk
        )
    }
}

/// One immutable log entry. `payload` is opaque; its schema depends on `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    #[serde(rename = "type")]
    pub kind: AgentEventKind,
    #[serde(default)]
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl AgentEvent {
    pub fn new(kind: AgentEventKind, payload: Value, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            payload,
            timestamp,
        }
    }

    /// Text carried by message chunks and prompts (`text` or `content.text`).
    pub fn text(&self) -> Option<&str> {
        self.payload
            .get("text")
            .and_then(Value::as_str)
            .or_else(|| {
                self.payload
                    .get("content")
                    .and_then(|content| content.get("text"))
                    .and_then(Value::as_str)
            })
    }

    pub fn tool_call(&self) -> Option<ToolCallPayload> {
        serde_json::from_value(self.payload.clone()).ok()
    }

    pub fn permission_request(&self) -> Option<PermissionRequestPayload> {
        serde_json::from_value(self.payload.clone()).ok()
    }

    pub fn permission_response(&self) -> Option<PermissionResponsePayload> {
        serde_json::from_value(self.payload.clone()).ok()
    }

    pub fn session_end(&self) -> Option<SessionEndPayload> {
        serde_json::from_value(self.payload.clone()).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolCallPayload {
    pub tool_call_id: Option<String>,
    pub title: Option<String>,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermissionOptionPayload {
    pub option_id: Option<String>,
    pub label: Option<String>,
    pub name: Option<String>,
}

impl PermissionOptionPayload {
    /// `label`, else `name`; blank values count as absent.
    pub fn display_label(&self) -> Option<&str> {
        first_non_blank([self.label.as_deref(), self.name.as_deref()])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermissionRequestPayload {
    pub message: Option<String>,
    pub title: Option<String>,
    pub options: Vec<PermissionOptionPayload>,
}

impl PermissionRequestPayload {
    /// `message`, else `title`; blank values count as absent.
    pub fn display_message(&self) -> Option<&str> {
        first_non_blank([self.message.as_deref(), self.title.as_deref()])
    }
}

fn first_non_blank<'a>(candidates: [Option<&'a str>; 2]) -> Option<&'a str> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermissionResponsePayload {
    pub option_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionEndPayload {
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn agent_event_uses_type_tag_and_snake_case_kind() {
        let line = r#"{"type":"agent_message_chunk","payload":{"text":"hi"},"timestamp":"2026-03-01T10:00:00Z"}"#;
        let event: AgentEvent = serde_json::from_str(line).expect("parse event");
        assert_eq!(event.kind, AgentEventKind::AgentMessageChunk);
        assert_eq!(event.text(), Some("hi"));

        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["type"], "agent_message_chunk");
    }

    #[test]
    fn text_falls_back_to_nested_content() {
        let event = AgentEvent::new(
            AgentEventKind::AgentMessageChunk,
            json!({"content": {"type": "text", "text": "nested"}}),
            Utc::now(),
        );
        assert_eq!(event.text(), Some("nested"));
    }

    #[test]
    fn missing_payload_defaults_to_null() {
        let line = r#"{"type":"session_end","timestamp":"2026-03-01T10:00:00Z"}"#;
        let event: AgentEvent = serde_json::from_str(line).expect("parse event");
        assert_eq!(event.payload, Value::Null);
        assert_eq!(event.text(), None);
        assert_eq!(event.session_end(), None);
    }

    #[test]
    fn permission_request_accepts_title_and_name() {
        let event = AgentEvent::new(
            AgentEventKind::RequestPermission,
            json!({
                "title": "Run cargo test?",
                "options": [{"optionId": "allow_once", "name": "Allow once"}]
            }),
            Utc::now(),
        );
        let payload = event.permission_request().expect("payload");
        assert_eq!(payload.display_message(), Some("Run cargo test?"));
        assert_eq!(payload.options[0].option_id.as_deref(), Some("allow_once"));
        assert_eq!(payload.options[0].display_label(), Some("Allow once"));
    }

    #[test]
    fn message_wins_when_title_is_also_present() {
        let event = AgentEvent::new(
            AgentEventKind::RequestPermission,
            json!({
                "title": "Edit file",
                "message": "Allow edit of main.rs?",
                "options": [{"optionId": "allow_always", "label": "Always", "name": "always"}]
            }),
            Utc::now(),
        );
        let payload = event.permission_request().expect("both keys parse");
        assert_eq!(payload.display_message(), Some("Allow edit of main.rs?"));
        assert_eq!(payload.options[0].display_label(), Some("Always"));

        let blank = PermissionRequestPayload {
            message: Some("  ".to_string()),
            title: Some("Edit file".to_string()),
            options: Vec::new(),
        };
        assert_eq!(blank.display_message(), Some("Edit file"));
    }

    #[test]
    fn update_only_kinds_are_not_rendered() {
        assert!(!AgentEventKind::AgentThoughtChunk.is_rendered());
        assert!(!AgentEventKind::ToolCallUpdate.is_rendered());
        assert!(!AgentEventKind::Plan.is_rendered());
        assert!(AgentEventKind::ToolCall.is_rendered());
    }
}
