//! Configuration loading and media root resolution
//!
//! Every setting follows the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is not an error: a warning is logged and the
//! compiled defaults are used.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{Error, Result};

/// Default multicast group
pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(226, 5, 2, 1);

/// Default UDP port
pub const DEFAULT_PORT: u16 = 5210;

/// Default multicast TTL (stay on the local segment)
pub const DEFAULT_TTL: u32 = 1;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "MCRADIO_CONFIG";

/// Environment variable naming the media library root
pub const MEDIA_ROOT_ENV_VAR: &str = "MCRADIO_MEDIA_ROOT";

/// Multicast group settings shared by server and client
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Multicast group address
    pub group: Ipv4Addr,
    /// UDP port
    pub port: u16,
    /// Multicast TTL used by the sender
    pub ttl: u32,
    /// Local interface for sending / joining (0.0.0.0 = let the OS choose)
    pub interface: Ipv4Addr,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP,
            port: DEFAULT_PORT,
            ttl: DEFAULT_TTL,
            interface: Ipv4Addr::UNSPECIFIED,
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.group.is_multicast() {
            return Err(Error::Config(format!(
                "{} is not a multicast address",
                self.group
            )));
        }
        if self.port == 0 {
            return Err(Error::Config("port must not be 0".to_string()));
        }
        Ok(())
    }

    /// Group address and port datagrams are sent to
    pub fn destination(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.group, self.port)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Locate the TOML config file
///
/// Explicit path (CLI or `MCRADIO_CONFIG`) first, then the per-user config
/// directory, then `/etc/mcradio/config.toml` on Linux. Returns `None` when
/// nothing exists.
pub fn resolve_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    let user_config = dirs::config_dir().map(|d| d.join("mcradio").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/mcradio/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Load a TOML config, falling back to defaults when the file is absent
///
/// A file that exists but cannot be parsed is an error.
pub fn load_toml<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let path = match path {
        Some(path) => path,
        None => {
            warn!("No config file found, using built-in defaults");
            return Ok(T::default());
        }
    };

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Config file {} not found, using built-in defaults", path.display());
            return Ok(T::default());
        }
        Err(e) => return Err(Error::Io(e)),
    };

    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Media root resolution
///
/// CLI argument, then `MCRADIO_MEDIA_ROOT`, then the config file value,
/// then the compiled default.
pub fn resolve_media_root(cli_arg: Option<&Path>, config_value: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(MEDIA_ROOT_ENV_VAR) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = config_value {
        return path.to_path_buf();
    }

    default_media_root()
}

/// Compiled default media root
///
/// `~/Music/mcradio` where the platform has a music directory, else
/// `<local data dir>/mcradio/media`, else `./mcradio_media`.
pub fn default_media_root() -> PathBuf {
    dirs::audio_dir()
        .map(|d| d.join("mcradio"))
        .or_else(|| dirs::data_local_dir().map(|d| d.join("mcradio").join("media")))
        .unwrap_or_else(|| PathBuf::from("./mcradio_media"))
}
