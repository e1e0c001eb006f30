//! LifeStream Library
//!
//! Watches media directories and hands every newly added photo or video to a
//! processing queue exactly once, never re-ingesting the files it produces.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod capture;
pub mod config;
pub mod error;
pub mod metrics;
pub mod observability;
pub mod storage;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
