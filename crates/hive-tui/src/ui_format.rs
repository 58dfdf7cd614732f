use chrono::{DateTime, Local, Utc};
use hive_core::lifecycle::Transition;
use hive_core::state::TaskStatus;
use hive_core::types::Task;
use hive_core::workspace::{RepoHealth, RepositoryEntry};
use hive_core::wrap::{str_width, truncate_to_width};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

use crate::model::{Banner, RepoSummary};

pub(crate) const ACCENT: Color = Color::Cyan;
pub(crate) const DIM: Color = Color::DarkGray;
pub(crate) const MUTED: Color = Color::Gray;
pub(crate) const SELECTED_BG: Color = Color::Indexed(236);
pub(crate) const FORCED: Color = Color::LightRed;

pub(crate) fn status_color(status: TaskStatus) -> Color {
    match status {
        TaskStatus::Todo => MUTED,
        TaskStatus::InProgress => Color::Green,
        TaskStatus::NeedsInput => Color::Magenta,
        TaskStatus::ForReview | TaskStatus::Reviewing => Color::Yellow,
        TaskStatus::Reviewed | TaskStatus::Done => ACCENT,
        TaskStatus::Error => Color::Red,
        TaskStatus::Stopped => Color::Blue,
        TaskStatus::Closed | TaskStatus::Merged => DIM,
    }
}

pub(crate) fn health_color(health: Option<&RepoHealth>) -> Color {
    match health {
        Some(RepoHealth::Healthy) => Color::Green,
        Some(RepoHealth::Uninitialized) => Color::Yellow,
        Some(_) => Color::Red,
        None => DIM,
    }
}

fn row_style(is_selected: bool) -> Style {
    if is_selected {
        Style::default().bg(SELECTED_BG).fg(Color::White)
    } else {
        Style::default().fg(MUTED)
    }
}

fn selection_prefix(is_selected: bool) -> Span<'static> {
    if is_selected {
        Span::styled("\u{25B6} ", Style::default().fg(ACCENT))
    } else {
        Span::raw("  ")
    }
}

pub(crate) fn format_task_row<'a>(
    is_selected: bool,
    task: &'a Task,
    substate: Option<&'static str>,
) -> Line<'a> {
    let base = row_style(is_selected);
    let mut spans = vec![
        selection_prefix(is_selected),
        Span::styled(format!("#{:<4}", task.id.0), Style::default().fg(DIM)),
        Span::styled(
            format!("{:<12}", task.status.label()),
            Style::default()
                .fg(status_color(task.status))
                .add_modifier(Modifier::BOLD),
        ),
    ];
    if let Some(label) = substate {
        spans.push(Span::styled(format!("[{label}] "), Style::default().fg(Color::Magenta)));
    }
    spans.push(Span::styled(task.title.as_str(), base));
    if task.is_blocked() {
        spans.push(Span::styled(" (blocked)", Style::default().fg(Color::Red)));
    }
    Line::from(spans)
}

pub(crate) fn format_repo_row(
    is_selected: bool,
    entry: &RepositoryEntry,
    health: Option<&RepoHealth>,
    summary: Option<&RepoSummary>,
    width: usize,
) -> Line<'static> {
    let pin = if entry.pinned { "* " } else { "  " };
    let status = match (health, summary) {
        (Some(health), Some(summary)) if health.is_healthy() => summary.label(),
        (Some(health), _) => health.label().to_string(),
        (None, _) => "checking…".to_string(),
    };
    let name_width = width.saturating_sub(str_width(&status) + 6).max(4);
    Line::from(vec![
        selection_prefix(is_selected),
        Span::styled(pin, Style::default().fg(Color::Yellow)),
        Span::styled(
            format!("{:<name_width$} ", truncate_to_width(&entry.display_name(), name_width)),
            row_style(is_selected).add_modifier(Modifier::BOLD),
        ),
        Span::styled(status, Style::default().fg(health_color(health))),
    ])
}

pub(crate) fn format_transition(transition: &Transition, is_selected: bool) -> Line<'static> {
    let color = if transition.is_forced() { FORCED } else { Color::White };
    let style = if is_selected {
        Style::default()
            .fg(color)
            .bg(SELECTED_BG)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(color)
    };
    Line::from(vec![
        selection_prefix(is_selected),
        Span::styled(transition.label(), style),
    ])
}

pub(crate) fn banner_line(banner: &Banner) -> Line<'static> {
    let color = if banner.is_error() { Color::Red } else { ACCENT };
    Line::from(Span::styled(format!(" {}", banner.text), Style::default().fg(color)))
}

pub(crate) fn hints_line(hints: &[(&str, &str)]) -> Line<'static> {
    let mut spans = vec![Span::raw(" ")];
    for (idx, (key, label)) in hints.iter().enumerate() {
        if idx > 0 {
            spans.push(Span::styled("  ", Style::default().fg(DIM)));
        }
        spans.push(Span::styled(key.to_string(), Style::default().fg(ACCENT)));
        spans.push(Span::styled(format!(" {label}"), Style::default().fg(DIM)));
    }
    Line::from(spans)
}

pub(crate) fn to_local_time(value: DateTime<Utc>) -> String {
    value
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}
