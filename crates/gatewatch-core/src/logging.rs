//! Tracing subscriber setup for host bindings and tools.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the filter is `info`, raised to
/// `debug` for this crate when `debug` is true. Calling this more than once
/// is harmless; only the first subscriber is installed.
pub fn init_tracing(debug: bool) {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(debug)))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

fn default_filter(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new("info,gatewatch_core=debug")
    } else {
        EnvFilter::new("info")
    }
}
