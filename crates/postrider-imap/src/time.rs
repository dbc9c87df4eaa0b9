//! Time abstraction for testability.
//!
//! A [`Clock`] trait abstracts over time so keep-alive decisions can
//! be tested deterministically with [`MockClock`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Abstraction over time.
///
/// Production code uses [`SystemClock`]; tests drive [`MockClock`].
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;

    /// Returns the elapsed time since the given instant.
    fn elapsed(&self, since: Instant) -> Duration {
        self.now().duration_since(since)
    }
}

/// System clock that uses real time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A mock clock for testing time-dependent code.
///
/// Starts at a base instant and advances only when told to.
///
/// # Example
///
/// ```
/// use postrider_imap::time::{Clock, MockClock};
/// use std::time::Duration;
///
/// let clock = MockClock::new();
/// let start = clock.now();
///
/// clock.advance(Duration::from_secs(5));
///
/// assert_eq!(clock.elapsed(start), Duration::from_secs(5));
/// ```
#[derive(Debug)]
pub struct MockClock {
    base: Instant,
    offset_nanos: AtomicU64,
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClock {
    /// Creates a mock clock starting at the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_nanos: AtomicU64::new(0),
        }
    }

    /// Creates a mock clock that can be shared across owners.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Advances the clock by the given duration.
    #[allow(clippy::cast_possible_truncation)]
    pub fn advance(&self, duration: Duration) {
        let nanos = duration.as_nanos() as u64;
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Returns the current offset from the base time.
    #[must_use]
    pub fn offset(&self) -> Duration {
        Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.base + self.offset()
    }
}

impl Clock for Arc<MockClock> {
    fn now(&self) -> Instant {
        self.as_ref().now()
    }
}

/// A clock behind a pointer, for holders that cannot be generic.
pub type BoxClock = Box<dyn Clock>;

impl Clock for BoxClock {
    fn now(&self) -> Instant {
        self.as_ref().now()
    }
}

/// Tracks link activity and decides when an idle link needs a NOOP.
///
/// Servers drop connections that stay quiet longer than their
/// autologout timer (30 minutes or less in the wild); refreshing
/// through this tracker keeps the link warm without a dedicated timer
/// task.
#[derive(Debug)]
pub struct KeepAlive {
    last_activity: Instant,
    interval: Duration,
}

impl KeepAlive {
    /// Starts tracking from now.
    pub fn new(clock: &impl Clock, interval: Duration) -> Self {
        Self {
            last_activity: clock.now(),
            interval,
        }
    }

    /// Whether the quiet period has outlived the interval.
    pub fn is_due(&self, clock: &impl Clock) -> bool {
        clock.elapsed(self.last_activity) >= self.interval
    }

    /// Records traffic on the link.
    pub fn record_activity(&mut self, clock: &impl Clock) {
        self.last_activity = clock.now();
    }
}
