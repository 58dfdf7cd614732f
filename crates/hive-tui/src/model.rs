use std::iter::Peekable;
use std::str::Chars;

use hive_agents::session::PaneProcess;
use hive_core::lifecycle::SessionObservation;
use hive_core::protocol::ProtocolState;
use hive_core::state::{ExecutionSubstate, TaskStatus};
use hive_core::types::{Task, TaskId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    Info,
    Error,
}

/// Transient notice, cleared by the next key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub kind: BannerKind,
    pub text: String,
}

impl Banner {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: BannerKind::Info,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: BannerKind::Error,
            text: text.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == BannerKind::Error
    }
}

/// Everything the detail pane shows for the selected task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDetail {
    pub task_id: TaskId,
    pub protocol: ProtocolState,
    pub substate: ExecutionSubstate,
    /// Normalized tail of the session pane.
    pub peek: Vec<String>,
    pub processes: Vec<PaneProcess>,
}

impl TaskDetail {
    pub fn empty(task_id: TaskId) -> Self {
        Self {
            task_id,
            protocol: ProtocolState::default(),
            substate: ExecutionSubstate::Idle,
            peek: Vec::new(),
            processes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionProbe {
    pub task_id: TaskId,
    pub observation: SessionObservation,
}

/// Per-repository counts shown in the list without focusing the repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSummary {
    pub total: usize,
    pub open: usize,
    pub working: usize,
    pub needs_input: usize,
    pub in_review: usize,
}

impl RepoSummary {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut summary = Self {
            total: tasks.len(),
            ..Self::default()
        };
        for task in tasks {
            if !task.status.is_terminal() {
                summary.open += 1;
            }
            match task.status {
                TaskStatus::InProgress => summary.working += 1,
                TaskStatus::NeedsInput => summary.needs_input += 1,
                TaskStatus::ForReview | TaskStatus::Reviewing | TaskStatus::Reviewed => {
                    summary.in_review += 1
                }
                _ => {}
            }
        }
        summary
    }

    pub fn label(&self) -> String {
        let mut parts = vec![format!("{} open", self.open)];
        if self.working > 0 {
            parts.push(format!("{} working", self.working));
        }
        if self.needs_input > 0 {
            parts.push(format!("{} waiting", self.needs_input));
        }
        if self.in_review > 0 {
            parts.push(format!("{} review", self.in_review));
        }
        parts.join(" · ")
    }
}

/// Clean one line captured from a session pane. Returns `None` for lines that
/// held only control sequences.
pub fn normalize_pane_line(raw: &str) -> Option<String> {
    let trimmed = raw.trim_end_matches(['\n', '\r']);
    let cleaned = strip_terminal_sequences(trimmed);
    let cleaned = cleaned.trim_end();
    if cleaned.is_empty() && !trimmed.is_empty() {
        return None;
    }
    Some(cleaned.to_string())
}

pub fn normalize_pane_output(raw: &str) -> Vec<String> {
    raw.lines().filter_map(normalize_pane_line).collect()
}

fn strip_terminal_sequences(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\u{1b}' => match chars.next() {
                Some('[') => skip_csi(&mut chars),
                Some(']') => skip_string(&mut chars, true),
                Some('P' | 'X' | '^' | '_') => skip_string(&mut chars, false),
                _ => {}
            },
            '\u{9b}' => skip_csi(&mut chars),
            '\t' => out.push(ch),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

fn skip_csi(chars: &mut Peekable<Chars<'_>>) {
    for ch in chars.by_ref() {
        if ('\u{40}'..='\u{7e}').contains(&ch) {
            break;
        }
    }
}

/// OSC strings may also end with BEL; DCS/SOS/PM/APC only with ST.
fn skip_string(chars: &mut Peekable<Chars<'_>>, bell_terminates: bool) {
    while let Some(ch) = chars.next() {
        if bell_terminates && ch == '\u{7}' {
            break;
        }
        if ch == '\u{1b}' && chars.peek() == Some(&'\\') {
            chars.next();
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn normalize_pane_line_strips_colors_and_titles() {
        assert_eq!(
            normalize_pane_line("\u{1b}[32mcargo test\u{1b}[0m   ").as_deref(),
            Some("cargo test")
        );
        assert_eq!(
            normalize_pane_line("\u{1b}]0;claude\u{7}ready").as_deref(),
            Some("ready")
        );
        assert_eq!(normalize_pane_line("\u{1b}[2K\u{1b}[0m"), None);
        assert_eq!(normalize_pane_line("").as_deref(), Some(""));
    }

    #[test]
    fn normalize_pane_output_keeps_blank_lines_and_drops_noise() {
        let lines = normalize_pane_output("one\n\n\u{1b}[?25l\ntwo\r\n");
        assert_eq!(lines, vec!["one", "", "two"]);
    }

    #[test]
    fn summary_counts_open_and_waiting_tasks() {
        let mut tasks = Vec::new();
        for (id, status) in [
            (1, TaskStatus::Todo),
            (2, TaskStatus::InProgress),
            (3, TaskStatus::NeedsInput),
            (4, TaskStatus::Reviewing),
            (5, TaskStatus::Merged),
        ] {
            let mut task = Task::new(TaskId(id), format!("task {id}"), Utc::now());
            task.status = status;
            tasks.push(task);
        }
        let summary = RepoSummary::from_tasks(&tasks);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.open, 4);
        assert_eq!(summary.label(), "4 open · 1 working · 1 waiting · 1 review");
    }
}
