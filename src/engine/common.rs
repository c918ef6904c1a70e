// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Provides the panic policy applied to every codec call.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::error;

use crate::error::{PixpressError, Result};

/// Run a codec call under the task-level panic policy.
///
/// A panic inside a codec is confined to the task that triggered it: it is
/// caught here and surfaced as a codec error, so one poisoned image cannot
/// take down unrelated in-flight work. Panics outside these wrappers escape
/// the task boundary and terminate the whole worker instead.
pub(crate) fn run_with_panic_policy<T>(
    stage: &'static str,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(stage, %message, "codec call panicked");
            Err(PixpressError::codec_panic(stage, message))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
