//! Configuration settings and validation.

use crate::watcher::{DispatcherConfig, PathFilter};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default bound on how long a sweep may keep the host awake.
pub const DEFAULT_WAKE_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Longest liveness hold a configuration may ask for.
const MAX_WAKE_TIMEOUT: Duration = Duration::from_secs(600);

/// Longest accepted filesystem debounce.
const MAX_DEBOUNCE: Duration = Duration::from_secs(60);

/// Resolve `path` against the current directory.
///
/// Lexical only: symlinks are not followed and the path need not exist.
///
/// # Errors
///
/// Returns an error if the path is empty or the current directory is unknown.
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .map_err(|e| Error::config(format!("cannot resolve path '{}': {e}", path.display())))
}

/// Main configuration for the LifeStream watcher.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for the `SQLite` database.
    pub data_dir: PathBuf,

    /// Root of the files LifeStream itself produces. Never ingested.
    /// Defaults to `<data_dir>/output` when unset.
    pub output_root: Option<PathBuf>,

    /// Media directories to watch. Also the inclusion scope of the path filter.
    pub watch_dirs: Vec<PathBuf>,

    /// Gitignore-style exclusion patterns.
    pub exclude_patterns: Vec<String>,

    /// Extensions of sidecar files reported next to a media file.
    pub sidecar_extensions: Vec<String>,

    /// Maximum liveness hold per sweep.
    pub wake_timeout: Duration,

    /// Filesystem event debounce.
    pub debounce: Duration,

    /// Dispatch media that already existed before the first run.
    pub backfill: bool,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            output_root: None,
            watch_dirs: Vec::new(),
            exclude_patterns: Vec::new(),
            sidecar_extensions: Vec::new(),
            wake_timeout: DEFAULT_WAKE_TIMEOUT,
            debounce: Duration::from_millis(500),
            backfill: false,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.wake_timeout.is_zero() {
            return Err(Error::config("wake timeout cannot be 0"));
        }

        if self.wake_timeout > MAX_WAKE_TIMEOUT {
            return Err(Error::config(format!(
                "wake timeout cannot exceed {} seconds",
                MAX_WAKE_TIMEOUT.as_secs()
            )));
        }

        if self.debounce > MAX_DEBOUNCE {
            return Err(Error::config(format!(
                "debounce cannot exceed {} seconds",
                MAX_DEBOUNCE.as_secs()
            )));
        }

        if self.output_root().as_os_str().is_empty() {
            return Err(Error::config("output root cannot be empty"));
        }

        // Surfaces bad patterns at startup rather than on the first sweep.
        self.path_filter()?;

        Ok(())
    }

    /// Make the data directory, output root and watch directories absolute.
    ///
    /// Filesystem events carry absolute paths, and the own-output and
    /// watched-root checks compare against these.
    ///
    /// # Errors
    ///
    /// Returns an error if a path cannot be resolved.
    pub fn resolve_paths(mut self) -> Result<Self> {
        let output_root = absolute_path(&self.output_root())?;
        self.data_dir = absolute_path(&self.data_dir)?;
        self.output_root = Some(output_root);
        self.watch_dirs = self
            .watch_dirs
            .iter()
            .map(|dir| absolute_path(dir))
            .collect::<Result<_>>()?;
        Ok(self)
    }

    /// Get the path to the `SQLite` database file.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("lifestream.db")
    }

    /// Get the output root, falling back to `<data_dir>/output`.
    #[must_use]
    pub fn output_root(&self) -> PathBuf {
        self.output_root
            .clone()
            .unwrap_or_else(|| self.data_dir.join("output"))
    }

    /// Build the path filter described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an exclusion pattern is invalid.
    pub fn path_filter(&self) -> Result<PathFilter> {
        PathFilter::builder(self.output_root())
            .roots(self.watch_dirs.iter().cloned())
            .excludes(self.exclude_patterns.iter().map(String::as_str))
            .sidecars(self.sidecar_extensions.iter().map(String::as_str))
            .build()
    }

    /// Dispatcher tuning derived from this configuration.
    #[must_use]
    pub const fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            max_hold: self.wake_timeout,
        }
    }
}
