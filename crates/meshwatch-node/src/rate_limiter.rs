//! Outbound send-rate limiter.
//!
//! Token bucket with **integer-only arithmetic** (no floats): capacity
//! `burst`, one token regained per `interval_ms`. Unlike a limiter that
//! rejects over-limit callers, [`RateLimiter::acquire`] converts the
//! deficit into a delay — the transport writer awaits it before every
//! send, so bursts drain at the configured pace instead of dropping.
//!
//! Thread-safe via `std::sync::Mutex` — no external crate required.

use std::sync::Mutex;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Bucket
// ---------------------------------------------------------------------------

/// Token state behind the mutex.
struct Bucket {
    /// Current number of available send slots.
    tokens: u32,
    /// Timestamp of the last refill computation.
    last_refill: Instant,
}

// ---------------------------------------------------------------------------
// RateLimiter
// ---------------------------------------------------------------------------

/// Paces outbound chat messages.
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    /// Maximum tokens (= messages that may go out back-to-back).
    burst: u32,
    /// Milliseconds to regain one token.
    interval_ms: u64,
}

impl RateLimiter {
    /// Creates a limiter with a full bucket.
    pub fn new(burst: u32, interval_ms: u64) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
            burst,
            interval_ms,
        }
    }

    /// Waits until a send slot is available, then consumes it.
    pub async fn acquire(&self) {
        loop {
            match self.try_take(Instant::now()) {
                Ok(()) => return,
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Attempts to consume one token at `now`.
    ///
    /// On an empty bucket, returns how long the caller should wait
    /// before retrying. Time is injected so tests stay deterministic.
    fn try_take(&self, now: Instant) -> std::result::Result<(), Duration> {
        // A poisoned mutex only means another caller panicked while
        // holding it; the bucket state itself is still consistent.
        let mut bucket = match self.bucket.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        refill(&mut bucket, self.burst, self.interval_ms, now);

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            Ok(())
        } else {
            let since_refill = now
                .saturating_duration_since(bucket.last_refill)
                .as_millis() as u64;
            let wait_ms = self.interval_ms.saturating_sub(since_refill).max(1);
            Err(Duration::from_millis(wait_ms))
        }
    }
}

// ---------------------------------------------------------------------------
// Refill logic (integer-only)
// ---------------------------------------------------------------------------

/// Refills a bucket based on elapsed time since the last refill.
///
/// ```text
/// elapsed_ms = now - last_refill (milliseconds)
/// refill = elapsed_ms / interval_ms
/// ```
///
/// Elapsed time is capped at ten minutes so the multiplication-free
/// division cannot be fed an absurd value after a long stall.
fn refill(bucket: &mut Bucket, burst: u32, interval_ms: u64, now: Instant) {
    let elapsed_ms = now.saturating_duration_since(bucket.last_refill).as_millis();
    let capped_ms: u64 = if elapsed_ms > 600_000 {
        600_000
    } else {
        elapsed_ms as u64
    };

    let refill = capped_ms / interval_ms.max(1);
    if refill > 0 {
        let new_tokens = (bucket.tokens as u64)
            .saturating_add(refill)
            .min(burst as u64);
        bucket.tokens = new_tokens as u32;
        bucket.last_refill = now;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
