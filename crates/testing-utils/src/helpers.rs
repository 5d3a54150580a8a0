//! Test helper utilities

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Test environment helpers
pub struct TestEnv;

impl TestEnv {
    /// Poll `condition` until it returns true or `timeout` elapses
    ///
    /// Useful when an event consumer processes messages on its own task.
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let deadline = Instant::now() + timeout;

        while Instant::now() < deadline {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }

        condition().await
    }
}
