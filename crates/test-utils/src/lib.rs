//! Shared fixtures for the `evalflow` integration tests.
//!
//! - [`builders`]: step graphs, model workdirs, job specs and run requests.
//! - [`fake_executor`]: an executor backend that never runs handlers.
//! - [`handlers`]: test handlers that record what they were asked to do.

pub mod builders;
pub mod fake_executor;
pub mod handlers;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

/// Upper bound for any single async test body.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

static INIT: Once = Once::new();

/// Install a test subscriber once per test binary.
///
/// Output is captured per test and only shown for failures (or with
/// `--nocapture`). `RUST_LOG` overrides the default `evalflow=debug,warn`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("evalflow=debug,warn"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Await `f`, failing the test after [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(TEST_TIMEOUT, f)
        .await
        .unwrap_or_else(|_| panic!("test timed out after {TEST_TIMEOUT:?}"))
}

/// Poll `condition` every 10ms until it holds.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    while !condition() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
