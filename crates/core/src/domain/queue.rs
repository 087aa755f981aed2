// Queue Domain Model

use std::time::Duration;

use crate::application::worker::constants::{DEFAULT_KEEP_ALIVE, DEFAULT_QUEUE_NAME};
use crate::error::{QueueError, Result};

/// Queue configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Used in log fields and error messages
    pub name: String,
    /// Nominal worker ceiling; forced growth may exceed it transiently
    pub max_workers: usize,
    /// How long an idle backing thread survives before retiring
    pub keep_alive: Duration,
}

impl QueueConfig {
    pub fn new(name: impl Into<String>, max_workers: usize) -> Self {
        Self {
            name: name.into(),
            max_workers,
            keep_alive: DEFAULT_KEEP_ALIVE,
        }
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Reject configurations the queue cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(QueueError::Config("queue name must not be empty".to_string()));
        }
        if self.max_workers == 0 {
            return Err(QueueError::Config(format!(
                "max_workers must be at least 1 (queue '{}')",
                self.name
            )));
        }
        if self.keep_alive.is_zero() {
            return Err(QueueError::Config(format!(
                "keep_alive must be non-zero (queue '{}')",
                self.name
            )));
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        let max_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(DEFAULT_QUEUE_NAME, max_workers)
    }
}
