//! Application fault accounting.
//!
//! # Responsibilities
//! - Run application callbacks behind a protection boundary
//! - Count every call that did not return `Ok`, panics included
//!
//! # Design Decisions
//! - The counter is raised before the call and lowered only on success,
//!   so a call that never returns cleanly stays counted
//! - Faults are never forgotten within one runtime; a restart starts over

use std::panic::{self, AssertUnwindSafe};

use crate::app::{AppError, AppResult};
use crate::observability::metrics;

#[derive(Debug, Default)]
pub struct FaultCounter {
    faults: u64,
}

impl FaultCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f`, recording a fault if it errors or panics.
    pub fn protect<F>(&mut self, callback: &'static str, f: F) -> bool
    where
        F: FnOnce() -> AppResult,
    {
        self.faults += 1;

        let outcome = panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            Err(AppError::Panic(message))
        });

        match outcome {
            Ok(()) => {
                self.faults -= 1;
                true
            }
            Err(e) => {
                metrics::record_application_fault(callback);
                tracing::error!(callback, faults = self.faults, error = %e, "Application callback failed");
                false
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.faults
    }

    pub fn is_clean(&self) -> bool {
        self.faults == 0
    }
}
