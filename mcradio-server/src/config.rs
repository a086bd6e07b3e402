//! Server configuration
//!
//! TOML layout (every section and key optional):
//!
//! ```toml
//! media_root = "/srv/mcradio"
//!
//! [network]
//! group = "226.5.2.1"
//! port = 5210
//! ttl = 1
//! interface = "0.0.0.0"
//!
//! [library]
//! descr_file = "descr.txt"
//! audio_extension = "mp3"
//!
//! [pool]
//! min_threads = 5
//! max_threads = 10
//! queue_capacity = 20
//!
//! [stream]
//! chunk_size = 1400
//!
//! [logging]
//! level = "info"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use mcradio_common::config::{LoggingConfig, NetworkConfig};
use mcradio_common::packet::MAX_PAYLOAD;
use mcradio_common::worker_pool::{
    DEFAULT_MANAGER_INTERVAL, DEFAULT_MAX_THREADS, DEFAULT_MIN_THREADS, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_SCALE_BATCH, DEFAULT_SUBMIT_TIMEOUT,
};
use mcradio_common::{LibrarySettings, PoolConfig};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::streaming::StreamSettings;

/// Default payload bytes per datagram
pub const DEFAULT_CHUNK_SIZE: usize = 1400;

/// Default pause after a read that produced nothing
pub const DEFAULT_IDLE_BACKOFF_MS: u64 = 20;

/// Default pause after every send
pub const DEFAULT_SEND_INTERVAL_MS: u64 = 5;

/// Default pause between per-channel task submissions
pub const DEFAULT_SUBMIT_STAGGER_MS: u64 = 10;

/// Top-level server configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Media library root (CLI and `MCRADIO_MEDIA_ROOT` take precedence)
    pub media_root: Option<PathBuf>,
    pub network: NetworkConfig,
    pub library: LibrarySettings,
    pub pool: PoolSection,
    pub stream: StreamSection,
    pub logging: LoggingConfig,
}

/// `[pool]` section
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PoolSection {
    pub min_threads: usize,
    pub max_threads: usize,
    pub queue_capacity: usize,
    pub submit_timeout_ms: u64,
    pub manager_interval_ms: u64,
    pub scale_batch: usize,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            min_threads: DEFAULT_MIN_THREADS,
            max_threads: DEFAULT_MAX_THREADS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            submit_timeout_ms: DEFAULT_SUBMIT_TIMEOUT.as_millis() as u64,
            manager_interval_ms: DEFAULT_MANAGER_INTERVAL.as_millis() as u64,
            scale_batch: DEFAULT_SCALE_BATCH,
        }
    }
}

impl PoolSection {
    pub fn to_pool_config(&self) -> PoolConfig {
        PoolConfig {
            min_threads: self.min_threads,
            max_threads: self.max_threads,
            queue_capacity: self.queue_capacity,
            submit_timeout: Duration::from_millis(self.submit_timeout_ms),
            manager_interval: Duration::from_millis(self.manager_interval_ms),
            scale_batch: self.scale_batch,
            thread_name: "stream".to_string(),
        }
    }
}

/// `[stream]` section
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StreamSection {
    pub chunk_size: usize,
    pub idle_backoff_ms: u64,
    pub send_interval_ms: u64,
    pub submit_stagger_ms: u64,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            idle_backoff_ms: DEFAULT_IDLE_BACKOFF_MS,
            send_interval_ms: DEFAULT_SEND_INTERVAL_MS,
            submit_stagger_ms: DEFAULT_SUBMIT_STAGGER_MS,
        }
    }
}

impl StreamSection {
    pub fn to_stream_settings(&self) -> StreamSettings {
        StreamSettings {
            chunk_size: self.chunk_size,
            idle_backoff: Duration::from_millis(self.idle_backoff_ms),
            send_interval: Duration::from_millis(self.send_interval_ms),
        }
    }

    pub fn submit_stagger(&self) -> Duration {
        Duration::from_millis(self.submit_stagger_ms)
    }
}

impl ServerConfig {
    /// Check every section, reporting the first problem found
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;
        self.pool.to_pool_config().validate()?;

        if self.stream.chunk_size == 0 || self.stream.chunk_size > MAX_PAYLOAD {
            return Err(Error::Config(format!(
                "chunk_size must be between 1 and {}, got {}",
                MAX_PAYLOAD, self.stream.chunk_size
            )));
        }

        if self.library.max_channels == 0 {
            return Err(Error::Config("max_channels must be at least 1".to_string()));
        }

        if self.library.audio_extension.is_empty() {
            return Err(Error::Config("audio_extension must not be empty".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_defaults_validate() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stream.chunk_size, 1400);
        assert_eq!(config.pool.min_threads, 5);
        assert_eq!(config.pool.max_threads, 10);
        assert_eq!(config.pool.queue_capacity, 20);
    }

    #[test]
    fn test_parse_full_file() {
        let content = r#"
            media_root = "/srv/radio"

            [network]
            group = "239.0.0.7"
            port = 6000
            ttl = 4

            [library]
            audio_extension = "ogg"
            min_channel_id = 10

            [pool]
            min_threads = 2
            max_threads = 3
            submit_timeout_ms = 500

            [stream]
            chunk_size = 512
            idle_backoff_ms = 50

            [logging]
            level = "debug"
        "#;

        let config: ServerConfig = toml::from_str(content).unwrap();
        assert_eq!(config.media_root, Some(PathBuf::from("/srv/radio")));
        assert_eq!(config.network.group, Ipv4Addr::new(239, 0, 0, 7));
        assert_eq!(config.network.ttl, 4);
        assert_eq!(config.library.audio_extension, "ogg");
        assert_eq!(config.library.min_channel_id, 10);
        assert_eq!(config.library.descr_file, "descr.txt");

        let pool = config.pool.to_pool_config();
        assert_eq!(pool.min_threads, 2);
        assert_eq!(pool.submit_timeout, Duration::from_millis(500));
        assert_eq!(pool.queue_capacity, DEFAULT_QUEUE_CAPACITY);

        let stream = config.stream.to_stream_settings();
        assert_eq!(stream.chunk_size, 512);
        assert_eq!(stream.idle_backoff, Duration::from_millis(50));
        assert_eq!(stream.send_interval, Duration::from_millis(DEFAULT_SEND_INTERVAL_MS));

        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_chunk_size_bounds() {
        let mut config = ServerConfig::default();
        config.stream.chunk_size = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.stream.chunk_size = MAX_PAYLOAD + 1;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.stream.chunk_size = MAX_PAYLOAD;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inverted_pool_bounds_rejected() {
        let mut config = ServerConfig::default();
        config.pool.min_threads = 8;
        config.pool.max_threads = 4;
        assert!(matches!(
            config.validate(),
            Err(Error::Common(mcradio_common::Error::InvalidInput(_)))
        ));
    }

    #[test]
    fn test_unicast_group_rejected() {
        let mut config = ServerConfig::default();
        config.network.group = Ipv4Addr::new(10, 0, 0, 1);
        assert!(matches!(
            config.validate(),
            Err(Error::Common(mcradio_common::Error::Config(_)))
        ));
    }
}
