//! Tracing setup for pipeline diagnostics.
//!
//! The engine emits structured `tracing` events at debug level around failure
//! fan-out, teardown, and bridge lifecycle transitions. Nothing is emitted
//! anywhere unless a subscriber is installed; binaries and tests that want to
//! see those events can install the default one here.

use tracing_subscriber::EnvFilter;

/// Installs a global subscriber honoring `RUST_LOG`.
///
/// Returns an error if a global subscriber is already set.
pub fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))
}
