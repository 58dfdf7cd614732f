//! Reader for the per-task JSONL event log and execution-state side channel.

use hive_core::events::AgentEvent;
use hive_core::state::ExecutionSubstate;
use hive_core::types::TaskId;
use hive_core::workspace::events_dir;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::EventLogError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonlEventLog {
    dir: PathBuf,
}

impl JsonlEventLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn for_repo(repo: &Path) -> Self {
        Self::new(events_dir(repo))
    }

    pub fn log_path(&self, task_id: TaskId) -> PathBuf {
        self.dir.join(format!("{task_id}.jsonl"))
    }

    pub fn state_path(&self, task_id: TaskId) -> PathBuf {
        self.dir.join(format!("{task_id}.state"))
    }

    /// Every parseable event in arrival order. A missing file is an empty log;
    /// unparseable lines are skipped.
    pub fn read_all(&self, task_id: TaskId) -> Result<Vec<AgentEvent>, EventLogError> {
        let path = self.log_path(task_id);
        let body = match fs::read_to_string(&path) {
            Ok(body) => body,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(EventLogError::Read { path, source }),
        };

        let mut events = Vec::new();
        for (idx, line) in body.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<AgentEvent>(line) {
                Ok(event) => events.push(event),
                Err(err) => {
                    tracing::warn!(
                        task_id = %task_id,
                        line = idx + 1,
                        error = %err,
                        "skipping malformed agent event"
                    );
                }
            }
        }
        Ok(events)
    }

    /// Absent or unrecognized state reads as `Idle`.
    pub fn load_execution_state(&self, task_id: TaskId) -> Result<ExecutionSubstate, EventLogError> {
        let path = self.state_path(task_id);
        match fs::read_to_string(&path) {
            Ok(body) => Ok(body.trim().parse().unwrap_or_else(|err: String| {
                tracing::warn!(task_id = %task_id, error = %err, "unrecognized execution state");
                ExecutionSubstate::Idle
            })),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(ExecutionSubstate::Idle),
            Err(source) => Err(EventLogError::Read { path, source }),
        }
    }

    pub fn append(&self, task_id: TaskId, event: &AgentEvent) -> Result<(), EventLogError> {
        let path = self.log_path(task_id);
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        fs::create_dir_all(&self.dir).map_err(|source| EventLogError::Write {
            path: self.dir.clone(),
            source,
        })?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| EventLogError::Write {
                path: path.clone(),
                source,
            })?;
        file.write_all(line.as_bytes())
            .map_err(|source| EventLogError::Write { path, source })
    }

    pub fn write_execution_state(
        &self,
        task_id: TaskId,
        state: ExecutionSubstate,
    ) -> Result<(), EventLogError> {
        let path = self.state_path(task_id);
        fs::create_dir_all(&self.dir).map_err(|source| EventLogError::Write {
            path: self.dir.clone(),
            source,
        })?;
        fs::write(&path, state.as_str()).map_err(|source| EventLogError::Write { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use hive_core::events::AgentEventKind;
    use serde_json::json;

    fn log() -> (tempfile::TempDir, JsonlEventLog) {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = JsonlEventLog::new(dir.path().join("events"));
        (dir, log)
    }

    #[test]
    fn missing_files_are_empty_and_idle() {
        let (_dir, log) = log();
        assert!(log.read_all(TaskId(1)).expect("read").is_empty());
        assert_eq!(
            log.load_execution_state(TaskId(1)).expect("state"),
            ExecutionSubstate::Idle
        );
    }

    #[test]
    fn read_all_skips_blank_and_malformed_lines() {
        let (_dir, log) = log();
        fs::create_dir_all(log.dir.as_path()).expect("dir");
        fs::write(
            log.log_path(TaskId(4)),
            concat!(
                r#"{"type":"prompt_sent","payload":{"text":"go"},"timestamp":"2026-03-01T10:00:00Z"}"#,
                "\n\n",
                "{not json\n",
                r#"{"type":"mystery_kind","payload":{},"timestamp":"2026-03-01T10:00:01Z"}"#,
                "\n",
                r#"{"type":"session_end","payload":{"reason":"done"},"timestamp":"2026-03-01T10:00:02Z"}"#,
                "\n",
            ),
        )
        .expect("write log");

        let events = log.read_all(TaskId(4)).expect("read");
        let kinds: Vec<_> = events.iter().map(|event| event.kind).collect();
        assert_eq!(kinds, vec![AgentEventKind::PromptSent, AgentEventKind::SessionEnd]);
    }

    #[test]
    fn append_then_read_preserves_order() {
        let (_dir, log) = log();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        for text in ["a", "b"] {
            log.append(
                TaskId(2),
                &AgentEvent::new(AgentEventKind::AgentMessageChunk, json!({ "text": text }), at),
            )
            .expect("append");
        }
        let texts: Vec<_> = log
            .read_all(TaskId(2))
            .expect("read")
            .iter()
            .filter_map(|event| event.text().map(str::to_string))
            .collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn execution_state_side_channel() {
        let (_dir, log) = log();
        log.write_execution_state(TaskId(3), ExecutionSubstate::AwaitingPermission)
            .expect("write state");
        assert_eq!(
            log.load_execution_state(TaskId(3)).expect("state"),
            ExecutionSubstate::AwaitingPermission
        );

        fs::write(log.state_path(TaskId(3)), "confused\n").expect("overwrite");
        assert_eq!(
            log.load_execution_state(TaskId(3)).expect("state"),
            ExecutionSubstate::Idle
        );
    }
}
