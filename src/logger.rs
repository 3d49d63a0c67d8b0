// src/logger.rs
use std::{path::Path, sync::OnceLock};
use tracing_subscriber::{EnvFilter, fmt};

static GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
static INIT: OnceLock<()> = OnceLock::new();

fn make_filter(fallback: &str) -> EnvFilter {
    // RUST_LOG wins; otherwise the caller's default (the CLI passes
    // "warn", or "debug" under --debug)
    if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(fallback).unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

/// Initialize logging to stderr once for the whole process.
pub fn init_logging(filter: &str) {
    INIT.get_or_init(|| {
        let subscriber = fmt()
            .with_env_filter(make_filter(filter))
            .with_target(true)
            .with_writer(std::io::stderr)
            .finish();

        // Ignore error if someone already set a global subscriber
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Initialize logging into a file (non-blocking writer), for long
/// generation runs where stderr is occupied by the progress bar.
pub fn init_file_logging<P: AsRef<Path>>(path: P, filter: &str) {
    INIT.get_or_init(|| {
        let path = path.as_ref();

        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .expect("open log file");

        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        // Keep the guard alive for the program lifetime
        let _ = GUARD.set(guard);

        let subscriber = fmt()
            .with_env_filter(make_filter(filter))
            .with_ansi(false) // plain text in files
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(non_blocking)
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
