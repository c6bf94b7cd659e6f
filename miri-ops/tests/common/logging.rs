use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Test-harness log filter, same variable the binary reads.
const FILTER_VAR: &str = "MIRI_OPS_LOG";

static INIT: Once = Once::new();

/// Marks the start of a test in the log and its outcome when dropped.
pub struct TestRun {
    name: &'static str,
}

impl TestRun {
    pub fn start(name: &'static str) -> Self {
        INIT.call_once(|| {
            let filter = EnvFilter::try_from_env(FILTER_VAR)
                .unwrap_or_else(|_| EnvFilter::new("test=info,miri_ops=debug"));
            let _ = tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(filter)
                .try_init();
        });
        tracing::info!(target: "test", test = name, "start");
        Self { name }
    }
}

impl Drop for TestRun {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!(target: "test", test = self.name, "failed");
        } else {
            tracing::info!(target: "test", test = self.name, "passed");
        }
    }
}
