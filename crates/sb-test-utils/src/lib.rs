//! Shared test utilities for the balancer workspace
//!
//! This crate provides common testing utilities used by the integration tests
//! of several crates:
//!
//! - Tracing initialisation that is safe to call from every test
//! - Mock backends and providers (see [`mock`])
//!
//! ## Usage
//!
//! Add to your crate's `Cargo.toml` dev-dependencies:
//!
//! ```toml
//! [dev-dependencies]
//! sb-test-utils = { path = "../sb-test-utils" }
//! ```
//!
//! Then use in your tests:
//!
//! ```rust,no_run
//! use sb_test_utils::mock::{MockBackend, MockProvider};
//!
//! #[tokio::test]
//! async fn test_with_mock_backends() {
//!     sb_test_utils::init_tracing_once();
//!     let provider = MockProvider::new("sub", vec![MockBackend::alive("hk-01")]);
//!     // Build a group over `provider`...
//! }
//! ```

pub mod mock;

use std::sync::OnceLock;

/// Ensure tracing is initialized only once across the test binary
static TRACING: OnceLock<()> = OnceLock::new();

fn init_with(filter: &str) {
    let fmt_json = std::env::var("SB_TRACING_FORMAT")
        .ok()
        .is_some_and(|v| v == "json");
    let builder = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_test_writer()
        .with_target(true);
    let _ = if fmt_json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    tracing::debug!("tracing initialized (json={})", fmt_json);
}

/// Initialize tracing once from `RUST_LOG` (default `info`), safe to call multiple times
pub fn init_tracing_once() {
    TRACING.get_or_init(|| {
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
        init_with(&filter);
    });
}

/// Initialize tracing with custom filter, safe to call multiple times
pub fn init_tracing_once_with_filter(filter: &str) {
    TRACING.get_or_init(|| init_with(filter));
}
