use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use hive_agents::session::SessionBackend;
use hive_agents::tmux::TmuxBackend;
use hive_core::config::{global_config_path, load_config, state_home, HiveConfig};
use hive_core::workspace::RepoListStore;
use hive_tui::{run, Router, RouterSettings, TuiError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const LOG_FILE_NAME: &str = "hive.log";

#[derive(Debug, Parser)]
#[command(name = "hive", about = "Run coding agents on tasks across your repositories")]
struct CliArgs {
    /// Add a repository to the list before starting (repeatable).
    #[arg(long = "repo", value_name = "PATH")]
    repos: Vec<PathBuf>,
    /// Repository list file; defaults to the per-user state directory.
    #[arg(long, value_name = "FILE")]
    repos_file: Option<PathBuf>,
    /// Global config file; defaults to the per-user config directory.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Dedicated tmux server socket name.
    #[arg(long, value_name = "NAME")]
    socket: Option<String>,
    /// Refresh interval; overrides `ui.tick_ms` from the global config.
    #[arg(long, value_name = "MS")]
    tick_ms: Option<u64>,
    /// Log directive used when neither HIVE_LOG nor RUST_LOG is set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, thiserror::Error)]
enum MainError {
    #[error("{0}")]
    Setup(String),
    #[error(transparent)]
    Tui(#[from] TuiError),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
}

fn main() {
    if let Err(err) = run_main() {
        eprintln!("hive failed: {err}");
        std::process::exit(1);
    }
}

fn run_main() -> Result<(), MainError> {
    let args = CliArgs::parse();
    init_logging(&args.log_level)?;

    let global_config = args.config.clone().or_else(global_config_path);
    let config = load_global_config(global_config.as_deref())?;

    let repos_file = args
        .repos_file
        .clone()
        .or_else(RepoListStore::default_path)
        .ok_or_else(|| MainError::Setup("cannot locate a home directory for the repository list".into()))?;
    add_cli_repositories(&repos_file, &args.repos);

    if !TmuxBackend::new(String::new()).is_available() {
        tracing::warn!("tmux not found on PATH; sessions cannot be started");
    }

    let socket = args.socket.clone();
    let backends = Box::new(move |repo: &Path| -> Arc<dyn SessionBackend> {
        let backend = TmuxBackend::for_repo(repo);
        match socket.as_deref() {
            Some(socket) => Arc::new(backend.with_socket(socket)),
            None => Arc::new(backend),
        }
    });

    let settings = RouterSettings {
        global_config,
        split_min_width: config.ui.split_min_width,
    };
    let mut router = Router::new(RepoListStore::new(repos_file), settings, backends);

    let tick = Duration::from_millis(args.tick_ms.unwrap_or(config.ui.tick_ms).max(1));
    tracing::info!(tick_ms = tick.as_millis() as u64, "starting hive");
    run(&mut router, tick)?;
    tracing::info!("hive exited");
    Ok(())
}

fn init_logging(default_directive: &str) -> Result<(), MainError> {
    let dir = state_home()
        .ok_or_else(|| MainError::Setup("cannot locate a state directory for logs".into()))?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create log directory '{}'", dir.display()))?;
    let log_path = dir.join(LOG_FILE_NAME);
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file '{}'", log_path.display()))?;

    let filter = tracing_subscriber::EnvFilter::try_from_env("HIVE_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| default_directive.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(log_file))
        .init();
    Ok(())
}

/// A missing global file means built-in defaults; a broken one is fatal.
fn load_global_config(path: Option<&Path>) -> Result<HiveConfig, MainError> {
    match path {
        Some(path) if path.is_file() => Ok(load_config(path).context("invalid global config")?),
        _ => Ok(HiveConfig::default()),
    }
}

fn add_cli_repositories(repos_file: &Path, repos: &[PathBuf]) {
    if repos.is_empty() {
        return;
    }
    let mut store = RepoListStore::new(repos_file);
    let mut list = match store.load() {
        Ok(list) => list,
        Err(err) => {
            tracing::warn!(error = %err, "skipping --repo; repository list unreadable");
            return;
        }
    };
    for repo in repos {
        if let Err(err) = store.add(&mut list, repo, Utc::now()) {
            eprintln!("hive: cannot add {}: {err}", repo.display());
            tracing::warn!(repo = %repo.display(), error = %err, "failed to add repository");
        }
    }
}
