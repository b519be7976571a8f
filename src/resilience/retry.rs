//! Bounded spin retries for non-blocking socket steps.
//!
//! # Responsibilities
//! - Count consecutive would-block results inside one receive or send step
//! - Pause between attempts without giving up the thread
//! - Tell the caller when to defer the rest of the work to the next tick
//!
//! # Design Decisions
//! - Progress resets the budget; only consecutive stalls are counted
//! - The pause is tiny (microseconds) so a request split across two TCP
//!   segments usually completes inside one tick

use std::thread;
use std::time::Duration;

/// How to wait between two attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    /// Hand the rest of the time slice back to the scheduler.
    Yield,
    /// Sleep for a fixed duration.
    Sleep(Duration),
}

impl Pause {
    /// Zero durations yield instead of sleeping.
    pub fn from_duration(duration: Duration) -> Self {
        if duration.is_zero() {
            Pause::Yield
        } else {
            Pause::Sleep(duration)
        }
    }

    fn wait(self) {
        match self {
            Pause::Yield => thread::yield_now(),
            Pause::Sleep(duration) => thread::sleep(duration),
        }
    }
}

/// A budget of consecutive stalled attempts.
#[derive(Debug, Clone)]
pub struct SpinRetry {
    limit: u32,
    stalls: u32,
    pause: Pause,
}

impl SpinRetry {
    pub fn new(limit: u32, pause: Pause) -> Self {
        Self {
            limit,
            stalls: 0,
            pause,
        }
    }

    /// Record progress; the stall budget starts over.
    pub fn reset(&mut self) {
        self.stalls = 0;
    }

    /// Record a stall. Pauses and returns `true` while budget remains,
    /// returns `false` (without pausing) once it is spent.
    pub fn stall(&mut self) -> bool {
        if self.stalls >= self.limit {
            return false;
        }
        self.stalls += 1;
        self.pause.wait();
        true
    }

    /// Stalls recorded since the last reset.
    pub fn stalls(&self) -> u32 {
        self.stalls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_bounded() {
        let mut retry = SpinRetry::new(3, Pause::Yield);
        assert!(retry.stall());
        assert!(retry.stall());
        assert!(retry.stall());
        assert!(!retry.stall());
        assert_eq!(retry.stalls(), 3);
    }

    #[test]
    fn progress_resets_budget() {
        let mut retry = SpinRetry::new(1, Pause::Yield);
        assert!(retry.stall());
        retry.reset();
        assert!(retry.stall());
        assert!(!retry.stall());
    }

    #[test]
    fn zero_limit_never_waits() {
        let mut retry = SpinRetry::new(0, Pause::Sleep(Duration::from_secs(60)));
        assert!(!retry.stall());
    }

    #[test]
    fn zero_pause_yields() {
        assert_eq!(Pause::from_duration(Duration::ZERO), Pause::Yield);
        assert_eq!(
            Pause::from_duration(Duration::from_micros(5)),
            Pause::Sleep(Duration::from_micros(5))
        );
    }
}
