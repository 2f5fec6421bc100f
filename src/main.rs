mod assignments;
mod auth;
mod catalog;
mod committees;
mod db;
mod directory;
mod error;
mod exams;
mod ipc;
mod params;
mod settings;
mod workflow;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "CURRICULUMD_LOG";
const WORKSPACE_ENV: &str = "CURRICULUMD_WORKSPACE";

fn init_logging() {
    // stdout carries the protocol; logs go to stderr.
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn initial_state() -> ipc::AppState {
    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };
    let Some(path) = std::env::var_os(WORKSPACE_ENV).map(PathBuf::from) else {
        return state;
    };
    match db::open_db(&path) {
        Ok(conn) => {
            tracing::info!(workspace = %path.display(), "workspace opened from environment");
            state.workspace = Some(path);
            state.db = Some(conn);
        }
        Err(e) => {
            tracing::error!(workspace = %path.display(), error = ?e, "workspace from environment failed to open");
        }
    }
    state
}

fn main() {
    init_logging();
    let mut state = initial_state();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "curriculumd started");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to answer with.
                tracing::warn!(error = %e, "unparseable request line");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    tracing::info!("stdin closed, exiting");
}
