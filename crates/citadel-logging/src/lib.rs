//! Citadel Logging - tracing subscriber setup
//!
//! Binaries call [`init`] once at startup; tests call [`init_for_tests`],
//! which routes output through the test harness and tolerates being called
//! from every test.
//!
//! Filtering follows `RUST_LOG` when set, otherwise the given default.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter for tests.
const TEST_FILTER: &str = "citadel=debug,citadel_crdt=debug,citadel_tangle=debug";

/// Install the global subscriber.
///
/// `default_filter` applies when `RUST_LOG` is unset, e.g. `"citadel_crdt=info"`.
pub fn init(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Install a subscriber that writes through the test harness.
///
/// Safe to call repeatedly; only the first call installs anything.
pub fn init_for_tests() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| TEST_FILTER.into()))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
