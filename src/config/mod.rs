//! Relay Configuration Module
//!
//! Endpoint, timer and credential settings loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `EDSTS_CONFIG` environment variable (path to TOML file)
//! 2. `edsts_relay.toml` in the current working directory
//! 3. Built-in defaults
//!
//! `EDSTS_API_KEY` and `EDSTS_PERMISSIONS` override the credential section.
//!
//! The loaded `RelayConfig` is handed to `Relay::new` by value; there is no
//! process-wide config instance.

mod relay_config;
pub mod defaults;

pub use relay_config::*;
