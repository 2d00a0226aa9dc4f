//! Minimum spacing between authority requests

use bridge_traits::time::Clock;
use core_async::time::sleep;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Enforces a delay between consecutive requests to the same authority.
pub(crate) struct RateLimiter {
    clock: Arc<dyn Clock>,
    last_request_ms: Option<i64>,
    min_delay: Duration,
}

impl RateLimiter {
    pub(crate) fn new(delay_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last_request_ms: None,
            min_delay: Duration::from_millis(delay_ms),
        }
    }

    /// How long the next request has to wait.
    pub(crate) fn remaining(&self) -> Duration {
        let Some(last) = self.last_request_ms else {
            return Duration::ZERO;
        };
        let elapsed_ms = self.clock.unix_timestamp_millis().saturating_sub(last).max(0) as u64;
        self.min_delay
            .saturating_sub(Duration::from_millis(elapsed_ms))
    }

    pub(crate) async fn wait_if_needed(&mut self) {
        let wait = self.remaining();
        if !wait.is_zero() {
            debug!("Rate limiting: waiting {:?}", wait);
            sleep(wait).await;
        }
        self.last_request_ms = Some(self.clock.unix_timestamp_millis());
    }
}
