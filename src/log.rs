use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::JsonFields;
use tracing_subscriber::prelude::*;

use crate::config;

/// Install the global subscriber writing JSON lines to `path`, or to the default log
/// file when `None`. A previous log at that path is kept as `<path>.bak`.
///
/// The returned guard flushes buffered records when dropped and must live as long as
/// the server.
pub fn init(path: Option<&Path>) -> anyhow::Result<WorkerGuard> {
    let log_path = path.map_or_else(config::log_path, Path::to_path_buf);

    if let Some(dir) = log_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).inspect_err(|e| {
            eprintln!("Failed to create log directory {:?}: {}", dir, e);
        })?;
    }
    rotate(&log_path).inspect_err(|e| {
        eprintln!("Failed to rotate log file {:?}: {}", log_path, e);
    })?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .inspect_err(|e| {
            eprintln!("Failed to open log file {:?}: {}", log_path, e);
        })?;
    let (writer, guard) = tracing_appender::non_blocking(log_file);

    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(writer)
        .fmt_fields(JsonFields::default());

    // Use RUST_LOG if set, otherwise default to INFO
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .try_init()?;

    Ok(guard)
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Move an existing log aside, replacing an older backup.
fn rotate(path: &Path) -> std::io::Result<()> {
    if path.is_file() {
        std::fs::rename(path, backup_path(path))?;
    }
    Ok(())
}
