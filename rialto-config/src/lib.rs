//! Ambient configuration and logging for Rialto control-plane clients.

pub mod config;
pub mod error;
pub mod logging;

pub use config::ClientConfig;
pub use error::{ConfigError, ConfigResult};
pub use logging::{init_logging, parse_level};
