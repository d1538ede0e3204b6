//! Cache primitives shared by the engine stages.
//!
//! - `TtlSlot` holds the single most recent value of a derived dataset and
//!   answers "is it still fresh?". Refreshing replaces the value wholesale.
//! - `Pacer` enforces a minimum wall-clock gap between outbound requests.
//!
//! Both use `tokio::time::Instant` so tests can drive them with a paused clock.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

// ---------------------------------------------------------------------------
// TtlSlot
// ---------------------------------------------------------------------------

/// Single-value cache with a time-to-live.
///
/// Callers follow the refresh-or-reuse pattern:
/// `if let Some(v) = slot.fresh() { return v }`, compute, then `slot.install(v)`.
/// A failed refresh leaves the previous value in place.
#[derive(Debug)]
pub struct TtlSlot<T> {
    ttl: Duration,
    value: Option<(Arc<T>, Instant)>,
}

impl<T> TtlSlot<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, value: None }
    }

    /// The cached value if it is younger than the TTL.
    pub fn fresh(&self) -> Option<Arc<T>> {
        self.value
            .as_ref()
            .filter(|(_, at)| at.elapsed() < self.ttl)
            .map(|(value, _)| Arc::clone(value))
    }

    /// The cached value regardless of age.
    pub fn current(&self) -> Option<Arc<T>> {
        self.value.as_ref().map(|(value, _)| Arc::clone(value))
    }

    /// Age of the cached value, if any.
    pub fn age(&self) -> Option<Duration> {
        self.value.as_ref().map(|(_, at)| at.elapsed())
    }

    /// Replace the cached value and restart its TTL.
    pub fn install(&mut self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.value = Some((Arc::clone(&value), Instant::now()));
        value
    }

    /// Forget the cached value so the next read refreshes.
    pub fn invalidate(&mut self) {
        self.value = None;
    }
}

// ---------------------------------------------------------------------------
// Pacer
// ---------------------------------------------------------------------------

/// Minimum-interval rate limiter for one outbound client.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    last_request: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request: None,
        }
    }

    /// Wait until `interval` has passed since the previous call, then
    /// record this call as the latest request.
    pub async fn pace(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                let wait = self.interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "Pacing outbound request");
                tokio::time::sleep(wait).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
