//! Per-source health tracking.
//!
//! Each source carries a small circuit breaker:
//!
//! ```text
//! Closed --(failures >= threshold)--> Open { retry_after }
//! Open --(retry_after elapsed, first eligibility check)--> HalfOpen
//! HalfOpen --(success)--> Closed
//! HalfOpen --(failure)--> Open { longer retry_after }
//! ```
//!
//! Records live in a sharded concurrent map, so updating one source never
//! contends with another.

mod tracker;
mod types;

pub use tracker::SourceHealthTracker;
pub use types::*;
