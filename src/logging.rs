use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing::Subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::error::Result;

/// Console layer filtered by `log_level`, plus an ERROR-only layer appending to `error_log`.
pub fn init(log_level: &str, error_log: &Path) -> Result<()> {
    let file = open_error_log(error_log)?;
    let console = fmt::layer().with_filter(EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(console)
        .with(error_file_layer(file))
        .init();
    Ok(())
}

/// Open the error log for appending, creating it and its directory if needed.
pub fn open_error_log(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Plain-text layer that only lets ERROR events through to `file`.
pub fn error_file_layer<S>(file: File) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file))
        .with_filter(LevelFilter::ERROR)
}
