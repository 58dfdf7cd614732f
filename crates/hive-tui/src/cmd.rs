//! Deferred operations returned from `update` and scheduled by the runtime.
//!
//! Nothing in here mutates interface state. A `Perform` runs off the message
//! loop and its result comes back as an ordinary [`Msg`].

use std::fmt;
use std::io;
use std::path::Path;
use std::process::{Command, ExitStatus};

use crate::event::Msg;

pub type Effect = Box<dyn FnOnce() -> Msg + Send + 'static>;
pub type ExitHandler = Box<dyn FnOnce(Result<ExitStatus, io::Error>) -> Msg + Send + 'static>;

/// A foreground process that takes over the terminal until it exits.
pub struct ExecRequest {
    pub command: Command,
    pub on_exit: ExitHandler,
}

impl ExecRequest {
    pub fn new(
        command: Command,
        on_exit: impl FnOnce(Result<ExitStatus, io::Error>) -> Msg + Send + 'static,
    ) -> Self {
        Self {
            command,
            on_exit: Box::new(on_exit),
        }
    }

    /// Human readable command line for logs.
    pub fn describe(&self) -> String {
        let mut out = self.command.get_program().to_string_lossy().into_owned();
        for arg in self.command.get_args() {
            out.push(' ');
            out.push_str(&arg.to_string_lossy());
        }
        out
    }
}

impl fmt::Debug for ExecRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecRequest")
            .field("command", &self.describe())
            .finish_non_exhaustive()
    }
}

pub enum Cmd {
    None,
    Batch(Vec<Cmd>),
    Perform(Effect),
    /// Suspend the interface for a foreground process.
    Exec(ExecRequest),
}

impl Cmd {
    pub fn none() -> Self {
        Cmd::None
    }

    pub fn perform(effect: impl FnOnce() -> Msg + Send + 'static) -> Self {
        Cmd::Perform(Box::new(effect))
    }

    /// A command that resolves to `msg` right away.
    pub fn msg(msg: Msg) -> Self {
        Cmd::perform(move || msg)
    }

    pub fn quit() -> Self {
        Cmd::msg(Msg::Quit)
    }

    pub fn exec(
        command: Command,
        on_exit: impl FnOnce(Result<ExitStatus, io::Error>) -> Msg + Send + 'static,
    ) -> Self {
        Cmd::Exec(ExecRequest::new(command, on_exit))
    }

    /// Drops empty commands; a single survivor is returned unbatched.
    pub fn batch(cmds: impl IntoIterator<Item = Cmd>) -> Self {
        let mut cmds: Vec<Cmd> = cmds.into_iter().filter(|cmd| !cmd.is_none()).collect();
        match cmds.len() {
            0 => Cmd::None,
            1 => cmds.pop().unwrap_or(Cmd::None),
            _ => Cmd::Batch(cmds),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Cmd::None)
    }

    /// Resolve everything on the calling thread, in order, following batches
    /// returned as results. Exec requests are not run; their handler sees a
    /// successful exit.
    pub fn run_blocking(self) -> Vec<Msg> {
        let mut out = Vec::new();
        self.run_into(&mut out);
        out
    }

    fn run_into(self, out: &mut Vec<Msg>) {
        match self {
            Cmd::None => {}
            Cmd::Batch(cmds) => {
                for cmd in cmds {
                    cmd.run_into(out);
                }
            }
            Cmd::Perform(effect) => push_resolved(effect(), out),
            Cmd::Exec(request) => push_resolved((request.on_exit)(Ok(ExitStatus::default())), out),
        }
    }
}

fn push_resolved(msg: Msg, out: &mut Vec<Msg>) {
    match msg {
        Msg::Batch(cmds) => {
            for cmd in cmds {
                cmd.run_into(out);
            }
        }
        Msg::Noop => {}
        other => out.push(other),
    }
}

impl fmt::Debug for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cmd::None => f.write_str("None"),
            Cmd::Batch(cmds) => f.debug_tuple("Batch").field(cmds).finish(),
            Cmd::Perform(_) => f.write_str("Perform(..)"),
            Cmd::Exec(request) => f.debug_tuple("Exec").field(request).finish(),
        }
    }
}

/// Bind a repository instance's command to `repo`.
///
/// Results from the instance's own message family come back as
/// [`Msg::Routed`] for that repository, whatever is focused by then. Batches
/// are rewrapped element by element. A quit request is dropped so one
/// instance cannot end the program. Everything else passes through.
pub fn wrap_for_repo(repo: &Path, cmd: Cmd) -> Cmd {
    match cmd {
        Cmd::None => Cmd::None,
        Cmd::Batch(cmds) => Cmd::Batch(
            cmds.into_iter()
                .map(|cmd| wrap_for_repo(repo, cmd))
                .collect(),
        ),
        Cmd::Perform(effect) => {
            let repo = repo.to_path_buf();
            Cmd::perform(move || tag_result(&repo, effect()))
        }
        Cmd::Exec(request) => {
            let repo = repo.to_path_buf();
            let on_exit = request.on_exit;
            Cmd::Exec(ExecRequest::new(request.command, move |status| {
                tag_result(&repo, on_exit(status))
            }))
        }
    }
}

fn tag_result(repo: &Path, msg: Msg) -> Msg {
    match msg {
        Msg::Batch(cmds) => Msg::Batch(
            cmds.into_iter()
                .map(|cmd| wrap_for_repo(repo, cmd))
                .collect(),
        ),
        Msg::Quit => {
            tracing::debug!(repo = %repo.display(), "dropping quit request from repository instance");
            Msg::Noop
        }
        Msg::Repo(msg) => Msg::Routed {
            repo: repo.to_path_buf(),
            msg,
        },
        other => other,
    }
}
