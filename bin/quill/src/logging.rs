//! Log sink setup from the `[logger]` section.

use std::fs::File;
use std::sync::Arc;

use eyre::{bail, WrapErr};
use quill_config::LoggerConfig;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the global subscriber: optional console layer, optional
/// plain-text file layer, one level filter for both. File rotation is
/// left to the platform; `max_file_size_mb` is an operator hint.
pub fn init(config: &LoggerConfig) -> eyre::Result<()> {
    let level = parse_level(&config.level)?;

    let console_layer = config.console.then(fmt::layer);

    let file_layer = if config.file.is_empty() {
        None
    } else {
        let file = File::create(&config.file)
            .wrap_err_with(|| format!("creating log file {}", config.file))?;
        Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
    };

    tracing_subscriber::registry()
        .with(level)
        .with(console_layer)
        .with(file_layer)
        .init();
    Ok(())
}

fn parse_level(level: &str) -> eyre::Result<LevelFilter> {
    Ok(match level.to_uppercase().as_str() {
        "DEBUG" => LevelFilter::DEBUG,
        "INFO" => LevelFilter::INFO,
        "WARN" | "WARNING" => LevelFilter::WARN,
        // everything past ERROR still maps onto the error level
        "ERROR" | "DPANIC" | "PANIC" | "FATAL" => LevelFilter::ERROR,
        other => bail!("unknown logger level {other:?}"),
    })
}
