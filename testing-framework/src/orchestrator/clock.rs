// File: testing-framework/src/orchestrator/clock.rs
//
// Clock Abstraction
//
// Every wall-clock wait in the framework (height polling cadence, relay loop
// pauses, stall and readiness timeouts) goes through this trait so tests can
// run against tokio's paused time instead of real time.

use std::future::Future;
use std::pin::Pin;
use tokio::time::{self, Duration, Instant};

/// Time source used by the poller, the build orchestrator and relay loops.
///
/// Block heights are the unit of time for every polling *budget*; the clock
/// only decides how long to pause between two height queries and when a chain
/// is considered stalled.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use tokio::time::Duration;
/// use interchain_testing_framework::orchestrator::clock::{Clock, SystemClock};
///
/// #[tokio::main]
/// async fn main() {
///     let clock: Arc<dyn Clock> = Arc::new(SystemClock);
///     let start = clock.now();
///     clock.sleep(Duration::from_millis(10)).await;
///     assert!(clock.now() - start >= Duration::from_millis(10));
/// }
/// ```
pub trait Clock: Send + Sync {
    /// Returns the current instant
    fn now(&self) -> Instant;

    /// Sleeps for the specified duration
    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Real-time clock backed by tokio's timer.
///
/// Under `#[tokio::test(start_paused = true)]` this clock follows tokio's
/// virtual time, which auto-advances whenever the runtime is idle.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        time::Instant::now()
    }

    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(time::sleep(d))
    }
}

/// Paused clock for tests that want to step time explicitly.
///
/// `new()` calls `tokio::time::pause()`, so it must not be combined with
/// `#[tokio::test(start_paused = true)]` (tokio panics when time is paused
/// twice). Use `SystemClock` in paused-runtime tests instead.
///
/// ```rust
/// use std::sync::Arc;
/// use tokio::time::Duration;
/// use interchain_testing_framework::orchestrator::clock::{Clock, PausedClock};
///
/// #[tokio::test]
/// async fn relay_interval_elapses() {
///     let clock = Arc::new(PausedClock::new());
///     let start = clock.now();
///     clock.advance(Duration::from_millis(500)).await;
///     assert_eq!(clock.now() - start, Duration::from_millis(500));
/// }
/// ```
pub struct PausedClock;

impl PausedClock {
    /// Creates a new PausedClock and pauses tokio time
    pub fn new() -> Self {
        time::pause();
        Self
    }

    /// Advance virtual time by `d`, firing every timer that expires on the way
    pub async fn advance(&self, d: Duration) {
        time::advance(d).await
    }
}

impl Clock for PausedClock {
    fn now(&self) -> Instant {
        time::Instant::now()
    }

    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        // Returns once virtual time is advanced past `d` (or auto-advanced
        // by an idle runtime).
        Box::pin(time::sleep(d))
    }
}

impl Default for PausedClock {
    fn default() -> Self {
        Self::new()
    }
}
