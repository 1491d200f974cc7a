//! Time Source Abstraction
//!
//! Registration timestamps come from a [`TimeSource`] rather than calling the
//! wall clock directly, so tests can pin `registered_at` to a known instant.
//!
//! - `SystemClock`: wall clock time (may jump due to NTP)
//! - `FixedTime`: controllable time for testing

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of wall clock time
pub trait TimeSource: Send + Sync {
    /// Current time in UTC
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed time source for testing
///
/// Shared behind an `Arc`, so the instant is stored atomically and can be
/// moved from any thread.
#[derive(Debug)]
pub struct FixedTime {
    millis: AtomicI64,
}

impl FixedTime {
    /// Start at the given instant
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(at.timestamp_millis()),
        }
    }

    /// Jump to a new instant
    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::Relaxed);
    }

    /// Move forward by `ms` milliseconds
    pub fn advance(&self, ms: i64) {
        self.millis.fetch_add(ms, Ordering::Relaxed);
    }
}

impl TimeSource for FixedTime {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis.load(Ordering::Relaxed);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}
