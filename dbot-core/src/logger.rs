//! Tracing initialization: one fmt layer (level, target, span events, all fields) written to
//! stdout and, when a path is given, tee'd into an append-mode log file.

use std::fs::OpenOptions;
use std::io;
use std::sync::Arc;

use tracing_subscriber::{
    fmt::format::FmtSpan, fmt::writer::MakeWriterExt, layer::SubscriberExt,
    util::SubscriberInitExt, EnvFilter, Registry,
};

/// Installs the global subscriber. Level comes from `RUST_LOG` (default `info`), so `.env`
/// must be loaded before calling this.
pub fn init_tracing(log_file_path: Option<&str>) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    let registry = Registry::default().with(env_filter);

    match log_file_path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let writer = io::stdout.and(Arc::new(file));
            registry.with(fmt_layer.with_writer(writer)).try_init()
        }
        None => registry.with(fmt_layer.with_writer(io::stdout)).try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to set global subscriber: {}", e))?;

    Ok(())
}
