//! Configuration module for contentbuild
//!
//! Provides types and parsing for `content.toml` configuration.

pub mod loader;
pub mod schema;

pub use loader::{default_config, load_config, ConfigError};
pub use schema::*;
