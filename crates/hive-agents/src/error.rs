use hive_core::types::TaskId;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{program} is not installed or not on PATH")]
    NotAvailable { program: String },
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("session {session} is not running")]
    SessionNotFound { session: String },
    #[error("task {task_id} has no live session")]
    NoSession { task_id: TaskId },
    #[error("a permission request is pending; answer it before sending a prompt")]
    PermissionPending,
    #[error("no permission request is pending")]
    NoPendingPermission,
    #[error("option '{option_id}' is not offered by the pending request")]
    UnknownOption { option_id: String },
    #[error("prompt must not be empty")]
    EmptyPrompt,
    #[error("agent '{name}' is not configured")]
    UnknownAgent { name: String },
    #[error("agent command must not be empty")]
    EmptyCommand,
    #[error(transparent)]
    EventLog(#[from] EventLogError),
}

#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    #[error("failed to read event log at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write event log at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode event: {source}")]
    Encode {
        #[from]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_session_error_names_the_task() {
        let err = SessionError::NoSession {
            task_id: TaskId(12),
        };
        assert_eq!(err.to_string(), "task 12 has no live session");
    }

    #[test]
    fn command_failed_formats_stderr() {
        let err = SessionError::CommandFailed {
            command: "tmux kill-session -t hive-app-1".to_string(),
            stderr: "can't find session".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "`tmux kill-session -t hive-app-1` failed: can't find session"
        );
    }

    #[test]
    fn event_log_errors_pass_through_transparently() {
        let err = SessionError::from(EventLogError::Read {
            path: PathBuf::from("/tmp/1.jsonl"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        });
        assert!(err.to_string().starts_with("failed to read event log at /tmp/1.jsonl"));
    }
}
