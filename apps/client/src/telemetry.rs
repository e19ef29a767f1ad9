use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes structured logging for a host binary.
///
/// `RUST_LOG` wins when set; otherwise only this crate logs at `default_level`
/// ("info", "debug", ...). Safe to call once per process.
pub fn init(default_level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), default_level))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Variant for embedding hosts that may already carry a subscriber;
/// a second initialization is ignored instead of panicking.
pub fn try_init(default_level: &str) -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), default_level))
        }))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
