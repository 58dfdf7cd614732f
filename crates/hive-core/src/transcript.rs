//! Transcript coalescing and rendering.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{AgentEvent, AgentEventKind};
use crate::wrap::{str_width, wrap_text};

const STAMP_FORMAT: &str = "%H:%M:%S";
/// Narrowest text column worth keeping the stamp for.
const MIN_TEXT_WIDTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Message,
    ToolCall,
    PermissionRequest,
    PermissionResponse,
    Prompt,
    SessionEnd,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub at: DateTime<Utc>,
    pub kind: EntryKind,
    pub text: String,
}

impl TranscriptEntry {
    fn new(at: DateTime<Utc>, kind: EntryKind, text: impl Into<String>) -> Self {
        Self {
            at,
            kind,
            text: text.into(),
        }
    }
}

struct MessageBuffer {
    started_at: DateTime<Utc>,
    text: String,
}

fn flush(buffer: &mut Option<MessageBuffer>, out: &mut Vec<TranscriptEntry>) {
    if let Some(buffer) = buffer.take() {
        out.push(TranscriptEntry::new(
            buffer.started_at,
            EntryKind::Message,
            buffer.text,
        ));
    }
}

fn one_line(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn single_entry(event: &AgentEvent) -> Option<TranscriptEntry> {
    let (kind, text) = match event.kind {
        AgentEventKind::ToolCall => {
            let payload = event.tool_call().unwrap_or_default();
            let title = payload
                .title
                .or(payload.kind)
                .map(|title| one_line(&title))
                .filter(|title| !title.is_empty())
                .unwrap_or_else(|| "tool call".to_string());
            (EntryKind::ToolCall, format!("[tool] {title}"))
        }
        AgentEventKind::RequestPermission => {
            let message = event
                .permission_request()
                .and_then(|payload| payload.display_message().map(one_line))
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| crate::protocol::FALLBACK_PERMISSION_MESSAGE.to_string());
            (EntryKind::PermissionRequest, format!("[permission] {message}"))
        }
        AgentEventKind::PermissionResponse => {
            let choice = event
                .permission_response()
                .and_then(|payload| payload.option_id)
                .unwrap_or_else(|| "answered".to_string());
            (EntryKind::PermissionResponse, format!("[answer] {choice}"))
        }
        AgentEventKind::PromptSent => {
            let text = event.text().map(one_line).unwrap_or_default();
            (EntryKind::Prompt, format!("> {text}"))
        }
        AgentEventKind::SessionEnd => {
            let reason = event
                .session_end()
                .and_then(|payload| payload.reason)
                .unwrap_or_else(|| "ended".to_string());
            (EntryKind::SessionEnd, format!("[session] {reason}"))
        }
        _ => return None,
    };
    Some(TranscriptEntry::new(event.timestamp, kind, text))
}

/// Fold the log into transcript entries.
///
/// Consecutive message chunks accumulate into one entry stamped with the first
/// chunk's time; any other event kind flushes the buffer.
pub fn coalesce_transcript(events: &[AgentEvent]) -> Vec<TranscriptEntry> {
    let mut out = Vec::new();
    let mut buffer: Option<MessageBuffer> = None;

    for event in events {
        if event.kind == AgentEventKind::AgentMessageChunk {
            let chunk = event.text().unwrap_or_default();
            buffer
                .get_or_insert_with(|| MessageBuffer {
                    started_at: event.timestamp,
                    text: String::new(),
                })
                .text
                .push_str(chunk);
            continue;
        }

        flush(&mut buffer, &mut out);
        if let Some(entry) = single_entry(event) {
            out.push(entry);
        }
    }

    flush(&mut buffer, &mut out);
    out
}

/// Render entries as `HH:MM:SS text` lines wrapped to `width`, continuation
/// lines indented under the text column. Panes too narrow for the stamp get
/// bare wrapped text. No line is wider than `width` once `width >= 2`.
pub fn render_transcript<Tz>(entries: &[TranscriptEntry], width: usize, tz: &Tz) -> Vec<String>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut out = Vec::new();
    for entry in entries {
        let stamp = format!(
            "{} ",
            entry.at.with_timezone(tz).format(STAMP_FORMAT)
        );
        let stamp_width = str_width(&stamp);
        if width < stamp_width + MIN_TEXT_WIDTH {
            out.extend(wrap_text(entry.text.trim_end(), width));
            continue;
        }
        let indent = " ".repeat(stamp_width);
        let text_width = width - stamp_width;
        for (idx, line) in wrap_text(entry.text.trim_end(), text_width)
            .into_iter()
            .enumerate()
        {
            let prefix = if idx == 0 { stamp.as_str() } else { indent.as_str() };
            out.push(format!("{prefix}{line}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, sec).unwrap()
    }

    fn chunk(text: &str, sec: u32) -> AgentEvent {
        AgentEvent::new(AgentEventKind::AgentMessageChunk, json!({ "text": text }), at(sec))
    }

    #[test]
    fn consecutive_chunks_coalesce_before_tool_call() {
        let events = vec![
            chunk("Looking ", 1),
            chunk("at the ", 2),
            chunk("parser.", 3),
            AgentEvent::new(
                AgentEventKind::ToolCall,
                json!({"toolCallId": "t1", "title": "Read src/parser.rs"}),
                at(4),
            ),
        ];
        let entries = coalesce_transcript(&events);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EntryKind::Message);
        assert_eq!(entries[0].text, "Looking at the parser.");
        assert_eq!(entries[0].at, at(1));
        assert_eq!(entries[1].kind, EntryKind::ToolCall);
        assert_eq!(entries[1].text, "[tool] Read src/parser.rs");
    }

    #[test]
    fn update_only_events_flush_without_rendering() {
        let events = vec![
            chunk("one", 1),
            AgentEvent::new(AgentEventKind::AgentThoughtChunk, json!({"text": "hmm"}), at(2)),
            chunk("two", 3),
            AgentEvent::new(AgentEventKind::Plan, json!({"entries": []}), at(4)),
        ];
        let entries = coalesce_transcript(&events);
        let texts: Vec<_> = entries.iter().map(|entry| entry.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);
        assert_eq!(entries[1].at, at(3));
    }

    #[test]
    fn single_line_entries_for_typed_events() {
        let events = vec![
            AgentEvent::new(AgentEventKind::PromptSent, json!({"text": "fix\nthe bug"}), at(0)),
            AgentEvent::new(
                AgentEventKind::RequestPermission,
                json!({"message": "Write file?", "options": []}),
                at(1),
            ),
            AgentEvent::new(
                AgentEventKind::PermissionResponse,
                json!({"optionId": "allow"}),
                at(2),
            ),
            AgentEvent::new(AgentEventKind::ToolCall, json!(null), at(3)),
            AgentEvent::new(AgentEventKind::SessionEnd, json!({"reason": "completed"}), at(4)),
        ];
        let texts: Vec<_> = coalesce_transcript(&events)
            .into_iter()
            .map(|entry| entry.text)
            .collect();
        assert_eq!(
            texts,
            vec![
                "> fix the bug",
                "[permission] Write file?",
                "[answer] allow",
                "[tool] tool call",
                "[session] completed",
            ]
        );
    }

    #[test]
    fn trailing_chunks_flush_at_end_of_log() {
        let entries = coalesce_transcript(&[chunk("partial", 5)]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].at, at(5));
    }

    #[test]
    fn render_indents_continuation_under_stamp() {
        let entries = vec![TranscriptEntry::new(
            at(7),
            EntryKind::Message,
            "alpha beta gamma delta",
        )];
        let lines = render_transcript(&entries, 20, &Utc);
        assert_eq!(
            lines,
            vec!["09:30:07 alpha beta", "         gamma delta"]
        );
    }

    #[test]
    fn narrow_pane_drops_stamp_and_stays_in_bounds() {
        let entries = vec![
            TranscriptEntry::new(at(9), EntryKind::Message, "alpha beta gamma"),
            TranscriptEntry::new(at(10), EntryKind::ToolCall, "[tool] Read"),
        ];
        for width in [2, 6, 12, 16] {
            let lines = render_transcript(&entries, width, &Utc);
            assert!(!lines.is_empty());
            for line in &lines {
                assert!(str_width(line) <= width, "{line:?} wider than {width}");
            }
        }
        let lines = render_transcript(&entries, 12, &Utc);
        assert_eq!(lines[0], "alpha beta");
        let lines = render_transcript(&entries, 17, &Utc);
        assert_eq!(lines[0], "09:30:09 alpha");
    }

    #[test]
    fn render_keeps_message_paragraphs() {
        let entries = vec![TranscriptEntry::new(
            at(8),
            EntryKind::Message,
            "Done.\nNext: tests\n",
        )];
        let lines = render_transcript(&entries, 40, &Utc);
        assert_eq!(lines, vec!["09:30:08 Done.", "         Next: tests"]);
    }
}
