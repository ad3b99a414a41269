//! Tracing setup: daily-rotated file logs plus an optional console layer.

use anyhow::{Context, Result};
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::fmt::Layer;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber: `{log_dir}/{log_prefix}.YYYY-MM-DD` files,
/// and a colored console layer when `console_output` is set.
///
/// `RUST_LOG` overrides the level chosen by `debug_mode`. The returned guard
/// flushes buffered lines on drop; hold it for the life of the program.
pub fn setup_logging(
    log_dir: &str,
    log_prefix: &str,
    debug_mode: bool,
    console_output: bool,
) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory: {log_dir}"))?;

    let (file_writer, guard) = tracing_appender::non_blocking(rolling::daily(log_dir, log_prefix));
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug_mode { "debug" } else { "info" }));

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer().with_writer(file_writer));

    // A second call keeps the already-installed subscriber.
    let installed = if console_output {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(false);
        registry.with(console_layer).try_init().is_ok()
    } else {
        registry.try_init().is_ok()
    };

    if installed {
        tracing::info!(
            "Logging initialized: dir={}, prefix={}, debug={}, console={}",
            log_dir,
            log_prefix,
            debug_mode,
            console_output
        );
    }

    Ok(guard)
}

/// File output settings shared by every configuration: no ANSI noise, with
/// the call site for tracing subprocess failures back to their driver.
fn file_layer<S>() -> Layer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
}
