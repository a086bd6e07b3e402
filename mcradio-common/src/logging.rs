//! Tracing subscriber setup shared by the binaries

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::{Error, Result};

/// Filter directives built from a configured level
///
/// `crates` lists the crate targets the level applies to; everything else
/// stays at `warn`.
pub fn filter_directives(level: &str, crates: &[&str]) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(crates.iter().map(|name| format!("{}={}", name, level)));
    directives.join(",")
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the configured level. Logs go to stderr unless a log
/// file is configured.
pub fn init_tracing(config: &LoggingConfig, crates: &[&str]) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter_directives(&config.level, crates).into());

    let result = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .try_init()
        }
        None => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}
