use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging for the wasmstow CLI
///
/// Logs are written to:
/// - XDG_DATA_HOME/wasmstow/logs/ on Unix (typically ~/.local/share/wasmstow/logs/)
/// - ~/Library/Application Support/wasmstow/logs/ on macOS
/// - {FOLDERID_LocalAppData}/wasmstow/logs/ on Windows
///
/// Log files are rotated daily. Fragment output goes to stdout, so the
/// terminal layer writes to stderr only.
///
/// The log level can be controlled via the RUST_LOG environment variable:
/// - RUST_LOG=debug wasmstow preprocess unit.src  (verbose logging)
/// - RUST_LOG=error wasmstow preprocess unit.src  (errors only)
pub fn init() -> Result<()> {
    let log_dir = get_log_dir()?;

    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "wasmstow.log");

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wasmstow=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false) // No ANSI colors in log files
                .with_target(true)
                .with_line_number(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .with_target(false)
                .compact(),
        )
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}

/// Get the log directory path using XDG conventions
fn get_log_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .context("Failed to determine data directory (XDG_DATA_HOME or platform equivalent)")?;

    Ok(data_dir.join("wasmstow").join("logs"))
}
