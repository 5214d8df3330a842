// File: testing-framework/src/orchestrator/mod.rs
//
// Orchestrator Module
//
// Primitives shared by every orchestration component: the clock that paces
// polling, the seeded RNG behind key material and labels, and the
// cooperative cancellation flag.

/// Clock abstractions for wall-clock pacing
pub mod clock;
/// Seeded random number generation for reproducible runs
pub mod rng;
/// Cooperative cancellation
pub mod cancel;

pub use cancel::CancelSignal;
pub use clock::{Clock, PausedClock, SystemClock};
pub use rng::TestRng;
