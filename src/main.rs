mod approval;
mod config;
mod db;
mod ipc;
mod logging;

use std::io::{self, BufRead, Write};

use anyhow::Context;
use clap::Parser;
use serde_json::json;

use crate::config::Config;

fn write_line(stdout: &mut io::Stdout, value: &serde_json::Value) {
    let line = serde_json::to_string(value).unwrap_or_else(|_| "{\"ok\":false}".to_string());
    let _ = writeln!(stdout, "{}", line);
    let _ = stdout.flush();
}

fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    logging::init_tracing(env!("CARGO_CRATE_NAME"), &config.log_level);

    let mut state = ipc::AppState::new(config.busy_timeout());
    if let Some(path) = config.workspace.as_deref() {
        state
            .open_workspace(path)
            .with_context(|| format!("failed to open workspace {}", path.display()))?;
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "sidecar ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                write_line(
                    &mut stdout,
                    &json!({
                        "ok": false,
                        "error": { "code": "bad_json", "message": e.to_string() }
                    }),
                );
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        write_line(&mut stdout, &resp);
    }

    tracing::info!("sidecar exiting");
    Ok(())
}
