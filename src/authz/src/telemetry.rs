//! `tracing-subscriber` init helper, shared by the binary embedding this
//! engine and by integration tests that want readable output (§6).
//!
//! Respects `RUST_LOG`; defaults to `info` for this crate and `warn`
//! elsewhere so a host binary isn't flooded by dependency chatter.

use tracing_subscriber::EnvFilter;

/// Installs a global `fmt` subscriber. Safe to call more than once per
/// process (e.g. from several integration test binaries); later calls are
/// no-ops because `tracing` only accepts the first global subscriber.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,authz_core=info,authz_database=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
