use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser, Clone)]
#[command(name = "resultlockd", version, about = "Result approval sidecar (JSON lines over stdio)")]
pub struct Config {
    /// Workspace to open at start-up; clients may still switch with `workspace.select`.
    #[arg(long, env = "RESULTLOCKD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    #[arg(long, env = "RESULTLOCKD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// How long a writer waits for another connection's write lock.
    #[arg(long, env = "RESULTLOCKD_BUSY_TIMEOUT_MS", default_value_t = 5000)]
    pub busy_timeout_ms: u64,
}

impl Config {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
