//! Rolling Sink - Binary Entry Point
//!
//! Reads payloads from stdin, one per line, and writes them through a
//! rolling file writer.
//!
//! ```text
//! rolling-sink [config.json]
//! ```
//!
//! Without a config file the configuration comes from `ROLLOVER_*`
//! environment variables (`ROLLOVER_FILENAME` is required); with one,
//! those variables override the file.

use std::io;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rolling_file::{RolloverMessageHandler, RolloverResult, WriterConfig};

fn load_config() -> RolloverResult<WriterConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let mut config = WriterConfig::from_json_file(&path)?;
            config.apply_env_overrides()?;
            Ok(config)
        }
        None => WriterConfig::from_env(),
    }
}

fn main() -> RolloverResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let config = load_config()?;
    info!(
        version = rolling_file::VERSION,
        template = %config.path_template,
        "Starting rolling sink"
    );

    let handler = Arc::new(RolloverMessageHandler::new(config));
    handler.start()?;

    let on_interrupt = Arc::clone(&handler);
    if let Err(e) = ctrlc::set_handler(move || {
        if let Err(e) = on_interrupt.stop() {
            error!(error = %e, "Failed to close writer on interrupt");
        }
        std::process::exit(130);
    }) {
        warn!(error = %e, "Could not install interrupt handler");
    }

    let written = handler.run_lines(io::stdin().lock())?;
    handler.stop()?;
    info!(written, "Rolling sink finished");
    Ok(())
}
