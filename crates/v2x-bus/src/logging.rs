// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Rate-limited logging on top of the `log` facade.
//!
//! Inbound faults are driven by remote peers: a misbehaving station can send
//! thousands of bad envelopes per second. Every warning on those paths goes
//! through a per-call-site [`Throttle`] so the log stays readable.
//!
//! ```ignore
//! warn_throttled!(THROTTLE_PERIOD, "Message type unknown: {}", mid);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default period between two emissions of the same throttled message.
pub const THROTTLE_PERIOD: Duration = Duration::from_secs(5);

/// Per-call-site emission gate.
///
/// Stores the wall-clock millisecond of the last emission; `0` means "never".
#[derive(Debug)]
pub struct Throttle {
    last_ms: AtomicU64,
}

impl Throttle {
    /// Create a gate that allows the first call.
    pub const fn new() -> Self {
        Self {
            last_ms: AtomicU64::new(0),
        }
    }

    /// Returns `true` if at least `period` elapsed since the last allowed call.
    pub fn allow(&self, period: Duration) -> bool {
        self.allow_at(now_ms(), period)
    }

    /// Same as [`Throttle::allow`] with an explicit clock reading.
    pub fn allow_at(&self, now_ms: u64, period: Duration) -> bool {
        let period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
        let last = self.last_ms.load(Ordering::Relaxed);
        if last != 0 && now_ms.saturating_sub(last) < period_ms {
            return false;
        }
        // Lost race: another thread just logged, stay quiet.
        self.last_ms
            .compare_exchange(last, now_ms.max(1), Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Warning emitted at most once per `period` from this call site.
#[macro_export]
macro_rules! warn_throttled {
    ($period:expr, $($arg:tt)*) => {{
        static GATE: $crate::logging::Throttle = $crate::logging::Throttle::new();
        if GATE.allow($period) {
            ::log::warn!($($arg)*);
        }
    }};
}

/// Error emitted at most once per `period` from this call site.
#[macro_export]
macro_rules! error_throttled {
    ($period:expr, $($arg:tt)*) => {{
        static GATE: $crate::logging::Throttle = $crate::logging::Throttle::new();
        if GATE.allow($period) {
            ::log::error!($($arg)*);
        }
    }};
}
