//! Deployment configuration for the shielding portal.

pub mod config;

pub use config::{BitcoindConfig, Config, ConfigError, FeeOracleConfig, ShieldingConfig};
