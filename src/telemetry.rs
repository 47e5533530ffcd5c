use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogFormat;

/// Diagnostics go to stderr; stdout carries the IPC stream. `RUST_LOG`
/// overrides the configured level.
pub fn init_tracing(level: &str, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},qoyodd={level}")));

    let builder = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);

    match format {
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
        LogFormat::Text => {
            let _ = builder.try_init();
        }
    }
}
