//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout (fmt layer, RUST_LOG overrides config level)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! Transaction hashes, chain ids and bridge nonces travel as structured
//! fields so one transfer can be followed across both chains. Key material
//! is never logged.

pub mod logging;
pub mod metrics;
