//! Consecutive-fault circuit breaker.
//!
//! Two states only: CLOSED (counter below threshold) and OPEN (counter at or
//! above threshold). The counter is reset by the first stage success while
//! closed. Once open, only [`CircuitBreaker::reset`] closes it again; there
//! is no timed half-open probe.
//!
//! One breaker is shared by every cycle routed through the same
//! orchestrator, so all mutation goes through atomic read-modify-write.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Breaker threshold used when none is configured.
pub const DEFAULT_THRESHOLD: u32 = 3;

// ---------------------------------------------------------------------------
// Health reporting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthLevel {
    /// No outstanding faults.
    Healthy,
    /// Some consecutive faults, breaker still closed.
    Degraded,
    /// Breaker open; every cycle is forced to no-trade.
    Critical,
}

impl fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthLevel::Healthy => write!(f, "🟢 HEALTHY"),
            HealthLevel::Degraded => write!(f, "🟡 DEGRADED"),
            HealthLevel::Critical => write!(f, "🔴 CRITICAL"),
        }
    }
}

/// Point-in-time view of the breaker for operators and monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: HealthLevel,
    pub consecutive_errors: u32,
    pub threshold: u32,
    pub breaker_open: bool,
}

// ---------------------------------------------------------------------------
// Breaker
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CircuitBreaker {
    consecutive_faults: AtomicU32,
    threshold: u32,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl CircuitBreaker {
    /// A zero threshold is treated as 1.
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive_faults: AtomicU32::new(0),
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn consecutive_faults(&self) -> u32 {
        self.consecutive_faults.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.consecutive_faults() >= self.threshold
    }

    /// Count one stage fault. Returns the counter after the increment.
    pub fn record_fault(&self) -> u32 {
        let previous = match self.consecutive_faults.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |c| Some(c.saturating_add(1)),
        ) {
            Ok(prev) | Err(prev) => prev,
        };
        previous.saturating_add(1)
    }

    /// Count one stage success. Clears the counter if the breaker is still
    /// closed; an open breaker is left untouched. Returns `true` if a run of
    /// faults was cleared.
    pub fn record_success(&self) -> bool {
        let threshold = self.threshold;
        self.consecutive_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
                (c > 0 && c < threshold).then_some(0)
            })
            .is_ok()
    }

    /// Manual operator reset. Returns the counter value that was cleared.
    pub fn reset(&self) -> u32 {
        self.consecutive_faults.swap(0, Ordering::SeqCst)
    }

    /// Derive the health level. Reads only.
    pub fn health(&self) -> HealthStatus {
        let count = self.consecutive_faults();
        let status = if count == 0 {
            HealthLevel::Healthy
        } else if count < self.threshold {
            HealthLevel::Degraded
        } else {
            HealthLevel::Critical
        };
        HealthStatus {
            status,
            consecutive_errors: count,
            threshold: self.threshold,
            breaker_open: count >= self.threshold,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
