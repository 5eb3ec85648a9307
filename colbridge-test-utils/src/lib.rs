//! Shared helpers for colbridge tests: tracing setup, the evolving all-types
//! table and a storage wrapper that tracks reader lifetimes.

use std::sync::Once;

pub mod fixtures;
pub mod tracking;

pub use fixtures::{ALL_TYPES_COLUMNS, AllTypesFixture, all_types_expected_rows, all_types_table};
pub use tracking::{ReaderStats, TrackingResolver, TrackingTable};

static INIT: Once = Once::new();

/// Initialize tracing for test binaries. Safe to call multiple times.
pub fn init_tracing_for_tests() {
    INIT.call_once(|| {
        use tracing_subscriber::filter::EnvFilter;
        use tracing_subscriber::fmt;
        let env = std::env::var("RUST_LOG").ok();
        let filter = match env {
            Some(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            None => EnvFilter::new("info"),
        };
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_test_writer()
            .init();
    });
}
