//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Registry → Client pool → Signer/Submitter
//!     → Store (snapshot load) → Validator → Bridge engine
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Watchers exit their loops → close_all() → Store saved
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::wait_for_shutdown_signal;
pub use startup::{build_runtime, build_runtime_with, Runtime, StartupError};
