// Queue / worker constants (no magic values)
use std::time::Duration;

/// Queue name used when none is configured
pub const DEFAULT_QUEUE_NAME: &str = "conditional-execution";

/// Keep-alive window for idle backing threads (2s)
/// Surplus threads added by forced growth retire after this long without work
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(2);

/// Thread name prefix for the backing executor
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "condq-worker";

/// Message recorded when a panic payload is neither `&str` nor `String`
pub const UNKNOWN_PANIC_MESSAGE: &str = "Unknown panic";
