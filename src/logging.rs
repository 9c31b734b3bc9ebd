//! File-based logging.
//!
//! Nothing is written to the terminal: the SSH bridge owns it in raw mode.

use std::fs;
use std::path::Path;

use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::EnvFilter;

use crate::config::LOG_ENV;

const LOG_FILE_PREFIX: &str = "gate.log";
const DEFAULT_FILTER: &str = "gate=info";

pub fn init(log_dir: &Path) {
    if fs::create_dir_all(log_dir).is_err() {
        return;
    }

    let appender: RollingFileAppender = rolling::daily(log_dir, LOG_FILE_PREFIX);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_from(std::env::var(LOG_ENV).ok()))
        .with_writer(appender)
        .with_ansi(false)
        .with_target(true)
        .try_init();
}

fn filter_from(directives: Option<String>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}
