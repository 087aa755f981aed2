// Queue Lifecycle State

use serde::Serialize;

/// Lifecycle of a queue
///
/// `Working -> Stopped` is one-way and terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueState {
    Working,
    Stopped,
}

impl QueueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueState::Working => "WORKING",
            QueueState::Stopped => "STOPPED",
        }
    }

    pub fn is_working(&self) -> bool {
        matches!(self, QueueState::Working)
    }
}

/// Point-in-time snapshot of a queue, taken under its lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub name: String,
    pub state: QueueState,
    /// Items submitted but not yet dequeued
    pub pending: usize,
    /// Live dispatch threads
    pub workers: usize,
    pub max_workers: usize,
}

impl QueueStats {
    /// More dispatch threads are alive than configured (forced growth)
    pub fn is_over_provisioned(&self) -> bool {
        self.workers > self.max_workers
    }
}
