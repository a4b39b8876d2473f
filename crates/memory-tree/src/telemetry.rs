// memory-tree/crates/memory-tree/src/telemetry.rs

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global fmt subscriber. Honors `RUST_LOG`, defaulting to `info`.
/// Calling it twice is harmless; the second install is ignored.
pub fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_level(true)
        .compact()
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("Global tracing subscriber already installed");
    }
}
