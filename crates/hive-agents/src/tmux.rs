//! tmux session backend driven through its command-line interface.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::SessionError;
use crate::session::{parse_pane_processes, session_namespace, PaneProcess, SessionBackend, StartRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxBackend {
    namespace: String,
    /// Optional `-L` socket name, isolating hive sessions from the user's server.
    socket: Option<String>,
    program: String,
}

impl TmuxBackend {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            socket: None,
            program: "tmux".to_string(),
        }
    }

    pub fn for_repo(repo: &Path) -> Self {
        Self::new(session_namespace(repo))
    }

    pub fn with_socket(mut self, socket: impl Into<String>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-V")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        if let Some(socket) = &self.socket {
            command.args(["-L", socket]);
        }
        command
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.program, args.join(" "))
    }

    fn run(&self, args: &[&str]) -> Result<String, SessionError> {
        let output = self
            .command()
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    SessionError::NotAvailable {
                        program: self.program.clone(),
                    }
                } else {
                    SessionError::Spawn {
                        command: self.describe(args),
                        source,
                    }
                }
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(SessionError::CommandFailed {
                command: self.describe(args),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn ensure_running(&self, session: &str) -> Result<(), SessionError> {
        if self.is_running(session)? {
            Ok(())
        } else {
            Err(SessionError::SessionNotFound {
                session: session.to_string(),
            })
        }
    }
}

/// `=name` makes tmux match the session name exactly instead of by prefix.
fn exact_target(session: &str) -> String {
    format!("={session}")
}

impl SessionBackend for TmuxBackend {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn start(&self, request: &StartRequest) -> Result<String, SessionError> {
        if request.command.trim().is_empty() {
            return Err(SessionError::EmptyCommand);
        }
        let name = self.session_name(request.task_id, request.role);
        let workdir = request.workdir.to_string_lossy();
        self.run(&[
            "new-session",
            "-d",
            "-s",
            &name,
            "-c",
            &workdir,
            &request.command,
        ])?;
        tracing::info!(task_id = %request.task_id, session = %name, "tmux session started");
        Ok(name)
    }

    fn stop(&self, session: &str) -> Result<(), SessionError> {
        if !self.is_running(session)? {
            return Ok(());
        }
        self.run(&["kill-session", "-t", &exact_target(session)])?;
        tracing::info!(session, "tmux session stopped");
        Ok(())
    }

    fn attach_command(&self, session: &str) -> Command {
        let mut command = self.command();
        command.args(["attach-session", "-t", &exact_target(session)]);
        command
    }

    fn send(&self, session: &str, text: &str) -> Result<(), SessionError> {
        self.ensure_running(session)?;
        let target = exact_target(session);
        self.run(&["send-keys", "-t", &target, "-l", text])?;
        self.run(&["send-keys", "-t", &target, "Enter"])?;
        Ok(())
    }

    fn send_keys(&self, session: &str, keys: &[&str]) -> Result<(), SessionError> {
        self.ensure_running(session)?;
        let target = exact_target(session);
        let mut args = vec!["send-keys", "-t", target.as_str()];
        args.extend_from_slice(keys);
        self.run(&args)?;
        Ok(())
    }

    fn peek(&self, session: &str, lines: usize, escapes: bool) -> Result<String, SessionError> {
        let target = exact_target(session);
        let start = format!("-{lines}");
        let mut args = vec!["capture-pane", "-p", "-J", "-t", target.as_str(), "-S", start.as_str()];
        if escapes {
            args.push("-e");
        }
        self.run(&args)
    }

    fn is_running(&self, session: &str) -> Result<bool, SessionError> {
        match self.run(&["has-session", "-t", &exact_target(session)]) {
            Ok(_) => Ok(true),
            Err(SessionError::CommandFailed { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn list_pane_processes(&self, session: &str) -> Result<Vec<PaneProcess>, SessionError> {
        let output = self.run(&[
            "list-panes",
            "-t",
            &exact_target(session),
            "-F",
            "#{pane_pid} #{pane_current_command}",
        ])?;
        Ok(parse_pane_processes(&output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::types::TaskId;
    use crate::session::SessionRole;

    #[test]
    fn backend_names_sessions_with_its_namespace() {
        let backend = TmuxBackend::for_repo(Path::new("/home/dev/Api.Server"));
        let namespace = backend.namespace().to_string();
        assert!(namespace.starts_with("api-server-"));
        assert_eq!(
            backend.session_name(TaskId(3), SessionRole::Worker),
            format!("hive-{namespace}-3")
        );
    }

    #[test]
    fn same_named_checkouts_do_not_share_sessions() {
        let work = TmuxBackend::for_repo(Path::new("/home/me/work/api"));
        let personal = TmuxBackend::for_repo(Path::new("/home/me/personal/api"));
        assert_ne!(
            work.session_name(TaskId(1), SessionRole::Worker),
            personal.session_name(TaskId(1), SessionRole::Worker)
        );
    }

    #[test]
    fn attach_command_targets_exact_session_on_socket() {
        let backend = TmuxBackend::new("app").with_socket("hive-test");
        let command = backend.attach_command("hive-app-1");
        let args: Vec<_> = command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(command.get_program(), "tmux");
        assert_eq!(
            args,
            vec!["-L", "hive-test", "attach-session", "-t", "=hive-app-1"]
        );
    }

    #[test]
    fn missing_program_reports_not_available() {
        let mut backend = TmuxBackend::new("app");
        backend.program = "hive-definitely-missing-tmux".to_string();
        assert!(!backend.is_available());
        let err = backend.is_running("hive-app-1").expect_err("missing binary");
        assert!(matches!(err, SessionError::NotAvailable { .. }));
    }

    #[test]
    fn empty_command_is_rejected_before_spawning() {
        let backend = TmuxBackend::new("app");
        let err = backend
            .start(&StartRequest {
                task_id: TaskId(1),
                role: SessionRole::Worker,
                workdir: std::env::temp_dir(),
                command: "   ".to_string(),
            })
            .expect_err("empty command");
        assert!(matches!(err, SessionError::EmptyCommand));
    }
}
