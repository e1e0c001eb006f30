//! Configuration management for LifeStream.
//!
//! Supports configuration from:
//! - Command-line arguments (highest priority)
//! - Environment variables
//! - Built-in defaults (lowest priority)

mod settings;

pub use settings::{absolute_path, Config, DEFAULT_WAKE_TIMEOUT};
