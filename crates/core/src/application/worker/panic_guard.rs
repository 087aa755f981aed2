// Panic isolation for dispatch threads
use std::any::Any;
use std::panic::{catch_unwind, UnwindSafe};

use super::constants::UNKNOWN_PANIC_MESSAGE;

/// Result of a panic-guarded execution
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    /// Execution completed successfully
    Success(T),
    /// Execution panicked
    Panicked(String),
}

/// Execute a closure with panic isolation
///
/// If the closure panics, the panic is caught and returned as PanicGuardResult::Panicked.
/// This keeps a failing item from taking its dispatch thread down. Logging is
/// left to the caller, which knows the queue or executor involved.
///
/// # Example
/// ```text
/// let result = execute_guarded(|| {
///     // This panic will be caught
///     panic!("test panic");
/// });
///
/// match result {
///     PanicGuardResult::Panicked(msg) => {
///         println!("Caught panic: {}", msg);
///     }
///     _ => {}
/// }
/// ```
pub fn execute_guarded<F, T>(f: F) -> PanicGuardResult<T>
where
    F: FnOnce() -> T + UnwindSafe,
{
    match catch_unwind(f) {
        Ok(result) => PanicGuardResult::Success(result),
        Err(panic_info) => PanicGuardResult::Panicked(panic_message(panic_info.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        UNKNOWN_PANIC_MESSAGE.to_string()
    }
}
