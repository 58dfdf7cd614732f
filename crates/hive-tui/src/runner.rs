use crate::cmd::{Cmd, ExecRequest};
use crate::error::TuiError;
use crate::event::Msg;
use crate::router::Router;
use crate::ui::render;
use chrono::Utc;
use crossterm::event::{self, Event as CEvent};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

type Term = Terminal<CrosstermBackend<io::Stdout>>;

/// Runs `Perform` commands on worker threads and queues `Exec` requests for
/// the main loop.
pub(crate) struct Scheduler {
    tx: Sender<Msg>,
    rx: Receiver<Msg>,
    execs: VecDeque<ExecRequest>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx,
            execs: VecDeque::new(),
        }
    }

    pub(crate) fn schedule(&mut self, cmd: Cmd) {
        match cmd {
            Cmd::None => {}
            Cmd::Batch(cmds) => {
                for cmd in cmds {
                    self.schedule(cmd);
                }
            }
            Cmd::Perform(effect) => {
                let tx = self.tx.clone();
                thread::spawn(move || {
                    let _ = tx.send(effect());
                });
            }
            Cmd::Exec(request) => self.execs.push_back(request),
        }
    }

    pub(crate) fn next_exec(&mut self) -> Option<ExecRequest> {
        self.execs.pop_front()
    }

    pub(crate) fn try_recv(&self) -> Option<Msg> {
        self.rx.try_recv().ok()
    }

    pub(crate) fn sender(&self) -> Sender<Msg> {
        self.tx.clone()
    }
}

pub fn run(router: &mut Router, tick_rate: Duration) -> Result<(), TuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let run_result = run_loop(&mut terminal, router, tick_rate);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    run_result
}

fn run_loop(terminal: &mut Term, router: &mut Router, tick_rate: Duration) -> Result<(), TuiError> {
    let mut scheduler = Scheduler::new();
    let size = terminal.size()?;
    scheduler.schedule(router.update(Msg::Resize {
        width: size.width,
        height: size.height,
    }));
    scheduler.schedule(router.init());

    let mut last_tick = Instant::now();
    while !router.should_quit() {
        while let Some(msg) = scheduler.try_recv() {
            scheduler.schedule(router.update(msg));
        }
        while let Some(request) = scheduler.next_exec() {
            let msg = run_foreground(terminal, request)?;
            scheduler.schedule(router.update(msg));
        }
        if router.should_quit() {
            break;
        }

        terminal.draw(|frame| render(frame, router))?;

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout.min(Duration::from_millis(50)))? {
            if let Some(msg) = translate_event(event::read()?) {
                scheduler.schedule(router.update(msg));
            }
        }
        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
            let _ = scheduler.sender().send(Msg::Tick(Utc::now()));
        }
    }
    Ok(())
}

/// Hands the terminal to a foreground process and restores it afterwards.
fn run_foreground(terminal: &mut Term, mut request: ExecRequest) -> Result<Msg, TuiError> {
    tracing::info!(command = %request.describe(), "suspending for foreground process");
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    let status = request.command.status();

    enable_raw_mode()?;
    execute!(terminal.backend_mut(), EnterAlternateScreen)?;
    terminal.clear()?;

    if let Err(err) = &status {
        tracing::warn!(command = %request.describe(), error = %err, "foreground process failed");
    }
    Ok((request.on_exit)(status))
}

fn translate_event(event: CEvent) -> Option<Msg> {
    match event {
        CEvent::Key(key) => Some(Msg::Key(key)),
        CEvent::Resize(width, height) => Some(Msg::Resize { width, height }),
        _ => None,
    }
}
