//! Structured logging initialization.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
pub fn default_directive(level: &str) -> String {
    format!("crosschain_engine={level},warn")
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this twice
/// is harmless; the second registration is ignored.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
