//! Layered configuration
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. `condq.toml` in the platform config directory, or `--config <path>`
//! 3. `CONDQ_*` environment variables, `__` between sections
//!    (e.g. `CONDQ_QUEUE__MAX_WORKERS=8`)
//! 4. command-line flags (applied by the caller)

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use condq_core::application::worker::constants::DEFAULT_KEEP_ALIVE;
use condq_core::QueueConfig;

const ENV_PREFIX: &str = "CONDQ";
const CONFIG_FILE_NAME: &str = "condq.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub queue: QueueSettings,
    pub lease: LeaseSettings,
    pub workload: WorkloadSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettings {
    pub name: String,
    pub max_workers: usize,
    pub keep_alive_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseSettings {
    /// Bound on concurrently leased workers; unbounded when absent
    pub max_leases: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSettings {
    pub items: usize,
    pub work_ms: u64,
    pub jitter_ms: u64,
    /// Every n-th item expands the pool and waits on a child item (0 = never)
    pub nested_every: usize,
    /// Every n-th item panics (0 = never)
    pub fail_every: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let queue = QueueConfig::default();
        Self {
            queue: QueueSettings {
                name: queue.name,
                max_workers: queue.max_workers,
                keep_alive_ms: DEFAULT_KEEP_ALIVE.as_millis() as u64,
            },
            lease: LeaseSettings { max_leases: None },
            workload: WorkloadSettings {
                items: 100,
                work_ms: 10,
                jitter_ms: 5,
                nested_every: 0,
                fail_every: 0,
            },
        }
    }
}

impl QueueSettings {
    pub fn to_config(&self) -> QueueConfig {
        QueueConfig::new(self.name.clone(), self.max_workers)
            .with_keep_alive(Duration::from_millis(self.keep_alive_ms))
    }
}

/// `condq.toml` in the platform config directory, if one can be determined
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("dev", "condq", "condq").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Load settings from defaults, config file and environment
///
/// An explicit `path` must exist; the default location is optional.
pub fn load(path: Option<&Path>) -> Result<Settings> {
    let defaults = Config::try_from(&Settings::default()).context("Invalid default settings")?;
    let mut builder = Config::builder().add_source(defaults);

    match path {
        Some(path) => {
            builder = builder.add_source(File::from(path).required(true));
        }
        None => {
            if let Some(path) = default_config_path() {
                builder = builder.add_source(File::from(path).required(false));
            }
        }
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    builder
        .build()
        .context("Failed to read configuration")?
        .try_deserialize()
        .context("Invalid configuration")
}
