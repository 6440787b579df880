//! Resilience helpers.
//!
//! # Data Flow
//! ```text
//! RPC call:
//!     → timeouts.rs (every round-trip has a deadline)
//! Watcher cycle failed:
//!     → backoff.rs (jittered delay before the same range is retried)
//! ```
//!
//! Write-path calls (broadcasts) are never retried automatically; a retried
//! broadcast can double-submit.

pub mod backoff;
pub mod timeouts;

pub use backoff::{calculate_backoff, poll_delay};
pub use timeouts::with_timeout;
