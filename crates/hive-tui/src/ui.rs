use chrono::Local;
use hive_core::transcript::render_transcript;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

use crate::action::{INSTANCE_HINTS, LIST_HINTS};
use crate::app::{Mode, RepoApp};
use crate::model::TaskDetail;
use crate::router::{Focus, ListMode, Router};
use crate::ui_format::{
    banner_line, format_repo_row, format_task_row, format_transition, hints_line, status_color,
    to_local_time, ACCENT, DIM, MUTED,
};

const BORDER_NORMAL: Color = Color::DarkGray;
const BORDER_FOCUSED: Color = Color::Cyan;
const HEADER_TITLE: Color = Color::Cyan;

fn normal_block(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER_NORMAL))
        .title(Span::styled(
            format!(" {title} "),
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ))
}

fn focused_block(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(
            Style::default()
                .fg(BORDER_FOCUSED)
                .add_modifier(Modifier::BOLD),
        )
        .title(Span::styled(
            format!(" {title} "),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ))
}

fn pane_block(title: &str, focused: bool) -> Block<'_> {
    if focused {
        focused_block(title)
    } else {
        normal_block(title)
    }
}

pub fn render(frame: &mut Frame<'_>, router: &Router) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, rows[0], router);

    if router.is_split() {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(router.list_width()), Constraint::Min(0)])
            .split(rows[1]);
        render_repo_list(frame, columns[0], router);
        render_instance_pane(frame, columns[1], router);
    } else {
        match router.focus() {
            Focus::List => render_repo_list(frame, rows[1], router),
            Focus::Instance => render_instance_pane(frame, rows[1], router),
        }
    }

    render_footer(frame, rows[2], router);

    if let ListMode::AddPath { buffer } = router.mode() {
        render_input_popup(frame, "Add repository path", buffer);
    }
}

fn render_header(frame: &mut Frame<'_>, area: Rect, router: &Router) {
    let mut spans = vec![Span::styled(
        " hive ",
        Style::default()
            .fg(HEADER_TITLE)
            .add_modifier(Modifier::BOLD),
    )];
    if let Some(repo) = router.active() {
        spans.push(Span::styled(
            repo.display().to_string(),
            Style::default().fg(MUTED),
        ));
    }
    if let Some(notice) = router.notice() {
        spans.push(Span::styled("  ", Style::default()));
        spans.push(Span::styled(
            notice.to_string(),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_repo_list(frame: &mut Frame<'_>, area: Rect, router: &Router) {
    let block = pane_block("Repositories", router.focus() == Focus::List);
    let inner_width = usize::from(area.width.saturating_sub(2));
    let entries = &router.repos().repos;

    let lines: Vec<Line<'_>> = if entries.is_empty() {
        vec![Line::from(Span::styled(
            "No repositories. Press a to add one.",
            Style::default().fg(DIM),
        ))]
    } else {
        entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                format_repo_row(
                    idx == router.cursor(),
                    entry,
                    router.health(&entry.path),
                    router.summary(&entry.path),
                    inner_width,
                )
            })
            .collect()
    };

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_instance_pane(frame: &mut Frame<'_>, area: Rect, router: &Router) {
    let focused = router.focus() == Focus::Instance;
    let Some(app) = router.active_instance() else {
        render_placeholder(frame, area, router, focused);
        return;
    };

    let title = app
        .repo()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| app.repo().display().to_string());
    let block = pane_block(&title, focused);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(40), Constraint::Min(0)])
        .split(inner);
    render_task_list(frame, rows[0], app);
    render_detail(frame, rows[1], app);

    match app.mode() {
        Mode::AgentPicker { options, selected } => {
            let lines = options
                .iter()
                .enumerate()
                .map(|(idx, option)| picker_line(option, idx == *selected))
                .collect();
            render_menu_popup(frame, "Start with agent", lines);
        }
        Mode::PermissionPicker { options, selected } => {
            let lines = options
                .iter()
                .enumerate()
                .map(|(idx, option)| picker_line(option, idx == *selected))
                .collect();
            render_menu_popup(frame, "Answer permission", lines);
        }
        Mode::TransitionMenu { options, selected } => {
            let mut lines = Vec::new();
            let mut separated = false;
            for (idx, transition) in options.iter().enumerate() {
                if transition.is_forced() && !separated {
                    lines.push(Line::from(Span::styled(
                        "── forced ──",
                        Style::default().fg(DIM),
                    )));
                    separated = true;
                }
                lines.push(format_transition(transition, idx == *selected));
            }
            render_menu_popup(frame, "Change status", lines);
        }
        mode => {
            if let Some((title, buffer)) = mode.input() {
                render_input_popup(frame, title, buffer);
            }
        }
    }
}

fn render_placeholder(frame: &mut Frame<'_>, area: Rect, router: &Router, focused: bool) {
    let text = match router.active() {
        None => "No repository selected.".to_string(),
        Some(repo) => match router.health(repo) {
            Some(health) if !health.is_healthy() => {
                format!("Repository unavailable: {}", health.label())
            }
            Some(_) => "Loading…".to_string(),
            None => "Checking repository…".to_string(),
        },
    };
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(text, Style::default().fg(DIM))))
            .block(pane_block("Tasks", focused)),
        area,
    );
}

fn render_task_list(frame: &mut Frame<'_>, area: Rect, app: &RepoApp) {
    let lines: Vec<Line<'_>> = if !app.is_loaded() {
        vec![Line::from(Span::styled("Loading tasks…", Style::default().fg(DIM)))]
    } else if app.tasks().is_empty() {
        vec![Line::from(Span::styled(
            "No tasks. Press n to create one.",
            Style::default().fg(DIM),
        ))]
    } else {
        app.tasks()
            .iter()
            .enumerate()
            .map(|(idx, task)| {
                format_task_row(idx == app.selected_index(), task, app.substate_label(task))
            })
            .collect()
    };

    let height = usize::from(area.height);
    let offset = app.selected_index().saturating_sub(height.saturating_sub(1));
    frame.render_widget(
        Paragraph::new(lines).scroll((u16::try_from(offset).unwrap_or(u16::MAX), 0)),
        area,
    );
}

fn render_detail(frame: &mut Frame<'_>, area: Rect, app: &RepoApp) {
    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(Style::default().fg(BORDER_NORMAL));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(task) = app.selected_task() else {
        return;
    };

    let mut lines = vec![Line::from(vec![
        Span::styled(
            task.title.clone(),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::styled("  ", Style::default()),
        Span::styled(
            task.status.label(),
            Style::default().fg(status_color(task.status)),
        ),
    ])];

    let mut meta = vec![format!("updated {}", to_local_time(task.updated_at))];
    if !task.agent.is_empty() {
        meta.push(format!("agent {}", task.agent));
    }
    if task.has_session() {
        meta.push(format!("session {}", task.session));
    }
    if let Some(label) = app.substate_label(task) {
        meta.push(format!("waiting on {label}"));
    }
    lines.push(Line::from(Span::styled(
        meta.join("  "),
        Style::default().fg(DIM),
    )));

    if let Some(reason) = task.block_reason.as_deref() {
        lines.push(Line::from(Span::styled(
            format!("blocked: {reason}"),
            Style::default().fg(Color::Red),
        )));
    }

    if let Some(detail) = app.detail() {
        lines.extend(detail_lines(detail, usize::from(inner.width)));
    }

    let overflow = lines.len().saturating_sub(usize::from(inner.height));
    frame.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .scroll((u16::try_from(overflow).unwrap_or(u16::MAX), 0)),
        inner,
    );
}

/// Options reachable with the digit keys.
const DIGIT_OPTIONS: usize = 9;

fn detail_lines(detail: &TaskDetail, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    if let Some(request) = detail.protocol.active_request.as_ref() {
        lines.push(Line::from(Span::styled(
            format!("permission: {}", request.message),
            Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
        )));
        for (idx, option) in request.options.iter().take(DIGIT_OPTIONS).enumerate() {
            lines.push(Line::from(vec![
                Span::styled(format!("  {}. ", idx + 1), Style::default().fg(Color::Yellow)),
                Span::styled(option.label.clone(), Style::default().fg(Color::White)),
            ]));
        }
        let hidden = request.options.len().saturating_sub(DIGIT_OPTIONS);
        if hidden > 0 {
            lines.push(Line::from(Span::styled(
                format!("  … {hidden} more, press P to choose"),
                Style::default().fg(DIM),
            )));
        }
    }

    if !detail.processes.is_empty() {
        let processes = detail
            .processes
            .iter()
            .map(|process| format!("{} ({})", process.command, process.pid))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(Line::from(Span::styled(
            format!("processes: {processes}"),
            Style::default().fg(DIM),
        )));
    }

    if !detail.protocol.transcript.is_empty() {
        lines.push(section_rule("transcript"));
        lines.extend(
            render_transcript(&detail.protocol.transcript, width, &Local)
                .into_iter()
                .map(|line| Line::from(Span::styled(line, Style::default().fg(Color::White)))),
        );
    }

    if !detail.peek.is_empty() {
        lines.push(section_rule("pane"));
        lines.extend(
            detail
                .peek
                .iter()
                .map(|line| Line::from(Span::styled(line.clone(), Style::default().fg(MUTED)))),
        );
    }

    lines
}

fn section_rule(label: &str) -> Line<'static> {
    Line::from(Span::styled(
        format!("── {label} ──"),
        Style::default().fg(DIM),
    ))
}

fn picker_line(option: &str, is_selected: bool) -> Line<'static> {
    let style = if is_selected {
        Style::default()
            .fg(Color::White)
            .bg(crate::ui_format::SELECTED_BG)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(MUTED)
    };
    let prefix = if is_selected { "\u{25B6} " } else { "  " };
    Line::from(Span::styled(format!("{prefix}{option}"), style))
}

fn render_footer(frame: &mut Frame<'_>, area: Rect, router: &Router) {
    let instance_banner = match router.focus() {
        Focus::Instance => router.active_instance().and_then(RepoApp::banner),
        Focus::List => None,
    };
    let line = match router.banner().or(instance_banner) {
        Some(banner) => banner_line(banner),
        None => match router.focus() {
            Focus::List => hints_line(LIST_HINTS),
            Focus::Instance => hints_line(INSTANCE_HINTS),
        },
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn render_menu_popup(frame: &mut Frame<'_>, title: &str, lines: Vec<Line<'_>>) {
    let area = centered_rect(50, 50, frame.area());
    frame.render_widget(Clear, area);
    frame.render_widget(Paragraph::new(lines).block(focused_block(title)), area);
}

fn render_input_popup(frame: &mut Frame<'_>, title: &str, buffer: &str) {
    let outer = centered_rect(60, 20, frame.area());
    let area = Rect {
        height: outer.height.max(3),
        ..outer
    };
    frame.render_widget(Clear, area);
    let line = Line::from(vec![
        Span::styled(buffer.to_string(), Style::default().fg(Color::White)),
        Span::styled("_", Style::default().fg(ACCENT)),
    ]);
    frame.render_widget(
        Paragraph::new(line)
            .wrap(Wrap { trim: false })
            .block(focused_block(title)),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);
    horizontal[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::Cmd;
    use crate::event::Msg;
    use crate::router::RouterSettings;
    use chrono::Utc;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use hive_agents::fake::FakeBackend;
    use hive_agents::session::SessionBackend;
    use hive_core::types::NewTask;
    use hive_core::workspace::{RepoList, RepoListStore};
    use hive_store::persistence::init_repository;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    fn drain(router: &mut Router, cmd: Cmd) {
        let mut pending = cmd.run_blocking();
        while !pending.is_empty() {
            let mut next = Vec::new();
            for msg in pending {
                next.extend(router.update(msg).run_blocking());
            }
            pending = next;
        }
    }

    fn router_with(home: &Path, names: &[&str], width: u16) -> Router {
        let store = RepoListStore::new(home.join("repos.toml"));
        let mut list = RepoList::default();
        for name in names {
            let path = home.join(name);
            fs::create_dir_all(path.join(".git")).expect("git dir");
            let repo_store = init_repository(&path).expect("init");
            repo_store
                .create_task(NewTask::titled("wire up login"), Utc::now())
                .expect("create task");
            store
                .add(&mut list, &path.canonicalize().expect("canonical"), Utc::now())
                .expect("add");
        }
        let settings = RouterSettings {
            global_config: Some(home.join("no-global.toml")),
            split_min_width: 120,
        };
        let mut router = Router::new(
            store,
            settings,
            Box::new(|_: &Path| -> Arc<dyn SessionBackend> { Arc::new(FakeBackend::new("ui")) }),
        );
        router.update(Msg::Resize { width, height: 30 });
        let init = router.init();
        drain(&mut router, init);
        router
    }

    fn screen(router: &Router, width: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, 30)).expect("terminal");
        terminal
            .draw(|frame| render(frame, router))
            .expect("draw");
        let buffer = terminal.backend().buffer();
        let mut out = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                out.push_str(buffer[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn split_layout_shows_repositories_and_tasks() {
        let home = tempfile::tempdir().expect("tempdir");
        let router = router_with(home.path(), &["alpha"], 140);

        let text = screen(&router, 140);
        assert!(text.contains("Repositories"));
        assert!(text.contains("alpha"));
        assert!(text.contains("wire up login"));
        assert!(text.contains("enter open"));
    }

    #[test]
    fn narrow_layout_switches_panes_with_focus() {
        let home = tempfile::tempdir().expect("tempdir");
        let mut router = router_with(home.path(), &["alpha"], 80);

        let list_only = screen(&router, 80);
        assert!(list_only.contains("Repositories"));
        assert!(!list_only.contains("wire up login"));

        let cmd = router.update(Msg::Key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)));
        drain(&mut router, cmd);
        let instance_only = screen(&router, 80);
        assert!(instance_only.contains("wire up login"));
        assert!(!instance_only.contains("Repositories"));
    }

    #[test]
    fn permission_options_past_nine_are_summarized() {
        use hive_core::protocol::{PermissionOption, PermissionRequest};
        use hive_core::types::TaskId;

        let mut detail = TaskDetail::empty(TaskId(1));
        detail.protocol.active_request = Some(PermissionRequest {
            message: "Pick one".to_string(),
            options: (1..=12)
                .map(|n| PermissionOption::new(format!("c{n}"), format!("Choice {n}")))
                .collect(),
            requested_at: Utc::now(),
        });
        let text: Vec<String> = detail_lines(&detail, 80)
            .iter()
            .map(|line| line.spans.iter().map(|span| span.content.as_ref()).collect())
            .collect();
        assert!(text.iter().any(|line| line == "  9. Choice 9"));
        assert!(!text.iter().any(|line| line.contains("Choice 10")));
        assert!(text.iter().any(|line| line.contains("3 more, press P to choose")));
    }

    #[test]
    fn empty_list_renders_hint() {
        let home = tempfile::tempdir().expect("tempdir");
        let router = router_with(home.path(), &[], 140);

        let text = screen(&router, 140);
        assert!(text.contains("No repositories"));
        assert!(text.contains("No repository selected"));
    }
}
