//! Client configuration
//!
//! ```toml
//! channels = "1,opera|2,traffic|3,children|4,pop"
//! decoder_command = "mpg123 -q -"
//!
//! [network]
//! group = "226.5.2.1"
//! port = 5210
//!
//! [logging]
//! level = "info"
//! ```

use mcradio_common::config::{LoggingConfig, NetworkConfig};
use serde::Deserialize;

use crate::control::DEFAULT_CHANNELS;
use crate::error::{Error, Result};

/// Default decoder invocation; payload bytes arrive on its stdin
pub const DEFAULT_DECODER_COMMAND: &str = "mpg123 -q -";

/// Top-level client configuration file
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub network: NetworkConfig,
    /// Channel directory, `id,description` entries separated by `|`
    pub channels: String,
    /// Whitespace-separated decoder program and arguments
    pub decoder_command: String,
    pub logging: LoggingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            channels: DEFAULT_CHANNELS.to_string(),
            decoder_command: DEFAULT_DECODER_COMMAND.to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;
        if self.decoder_command.trim().is_empty() {
            return Err(Error::Config("decoder_command must not be empty".to_string()));
        }
        Ok(())
    }
}
