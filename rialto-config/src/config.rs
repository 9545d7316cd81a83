//! Client-side configuration: where the server's socket lives, which schema version to
//! advertise, and how eagerly to retry a dropped connection.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use rialto_core::SchemaVersion;

use crate::error::{ConfigError, ConfigResult};

fn default_schema_version() -> SchemaVersion {
    SchemaVersion::CURRENT
}

fn default_reconnect_backoff_ms() -> u64 {
    200
}

fn default_reconnect_attempts() -> u32 {
    3
}

/// Configuration for a Rialto control-plane client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Path to the server's Unix-domain control socket. There is no discovery mechanism; this
    /// must be supplied by the caller or the environment.
    pub socket_path: PathBuf,

    /// Schema version advertised to the server at `registerClient`.
    #[serde(default = "default_schema_version")]
    pub schema_version: SchemaVersion,

    /// Delay between reconnect attempts.
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,

    /// How many times to retry establishing the initial connection before giving up.
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
}

impl ClientConfig {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            schema_version: default_schema_version(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            reconnect_attempts: default_reconnect_attempts(),
        }
    }

    /// Overrides `socket_path` and `schema_version` from `RIALTO_SOCKET_PATH` /
    /// `RIALTO_SCHEMA_VERSION` ("major.minor.patch") when present.
    pub fn load_from_env(mut self) -> ConfigResult<Self> {
        if let Ok(path) = std::env::var("RIALTO_SOCKET_PATH") {
            if !path.trim().is_empty() {
                self.socket_path = PathBuf::from(path);
            }
        }
        if let Ok(version) = std::env::var("RIALTO_SCHEMA_VERSION") {
            if !version.trim().is_empty() {
                self.schema_version = parse_schema_version(&version)?;
            }
        }
        Ok(self)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn load_from_file(path: &std::path::Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save(&self, path: &std::path::Path) -> ConfigResult<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

fn parse_schema_version(raw: &str) -> ConfigResult<SchemaVersion> {
    let parts: Vec<&str> = raw.trim().split('.').collect();
    if parts.len() != 3 {
        return Err(ConfigError::Invalid(format!("expected major.minor.patch, got '{raw}'")));
    }
    let mut parsed = [0u32; 3];
    for (slot, part) in parsed.iter_mut().zip(parts.iter()) {
        *slot = part
            .parse::<u32>()
            .map_err(|_| ConfigError::Invalid(format!("expected major.minor.patch, got '{raw}'")))?;
    }
    Ok(SchemaVersion::new(parsed[0], parsed[1], parsed[2]))
}
