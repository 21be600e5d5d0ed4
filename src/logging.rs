use std::{
    path::PathBuf,
    sync::{Mutex, Once},
};

use tracing::{debug, info, metadata::LevelFilter, trace, Level};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Keeps the file writer thread alive until [`shutdown`].
static FILE_GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

fn do_init(stdout_level: Level, file_level: Option<(Level, PathBuf)>) {
    let mut message = String::from("Logging with:");

    // stdout
    message += " stdout";

    // `RUST_LOG` wins over the given level.
    let stdout_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(LevelFilter::from(stdout_level).to_string()));
    let stdout_layer = tracing_subscriber::fmt::layer().with_filter(stdout_filter);

    let registry = tracing_subscriber::registry().with(stdout_layer);

    let maybe_file_layer = if let Some((level, output_dir)) = file_level {
        message += &format!(", file (in dir {output_dir:?})");

        let file_appender =
            RollingFileAppender::new(Rotation::DAILY, output_dir, "laser-emu.log");

        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
        if let Ok(mut file_guard) = FILE_GUARD.lock() {
            *file_guard = Some(guard);
        }

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_filter(LevelFilter::from(level));
        Some(file_layer)
    } else {
        None
    };

    // Something else (a test harness for example) may have set a subscriber already.
    if registry.with(maybe_file_layer).try_init().is_err() {
        message += " (subscriber already set, not replaced)";
    }

    debug!(message);
}

/// Initialize tracing.
///
/// Will only initialize once, so tests may call this.
pub fn init(stdout_level: Level, file_logging: Option<(Level, PathBuf)>) {
    static TRACING_IS_INITIALIZED: Once = Once::new();

    TRACING_IS_INITIALIZED.call_once(|| do_init(stdout_level, file_logging));

    info!("Logging initialized");
}

/// Flush the log file, if any.
/// Events after this are not written to the file anymore.
pub fn shutdown() {
    trace!("Shutting down");

    let guard = FILE_GUARD.lock().ok().and_then(|mut guard| guard.take());
    drop(guard);
}
