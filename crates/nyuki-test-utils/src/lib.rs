pub mod builders;
pub mod fake_engine;
pub mod fakes;

pub use builders::{invalid_template_document, publish, task, template, template_document};
pub use fake_engine::{FakeEngine, FakeInstance};
pub use fakes::{FlakyStore, RecordingReporter, UnreachableConnector};

use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// Logs are captured per test and only printed for failing tests, unless
/// run with `-- --nocapture`. Enable levels with e.g. `NYUKI_LOG=debug`.
pub fn init_tracing() {
  INIT.call_once(|| {
    let filter = EnvFilter::try_from_env("NYUKI_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
      .with_env_filter(filter)
      .with_test_writer()
      .with_target(true)
      .init();
  });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
  F: std::future::Future<Output = T>,
{
  tokio::time::timeout(std::time::Duration::from_secs(5), f)
    .await
    .expect("test timed out after 5 seconds")
}
