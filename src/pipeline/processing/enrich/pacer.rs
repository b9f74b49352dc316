use std::time::Duration;
use tokio::time::Instant;

/// Enforces a minimum gap between consecutive outbound requests of one
/// request stream. Each enrichment worker owns its own pacer, so aggregate
/// throughput is bounded by `workers / min_interval`.
#[derive(Debug)]
pub struct RequestPacer {
    min_interval: Duration,
    last_request: Option<Instant>,
}

impl RequestPacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: None,
        }
    }

    /// Waits until the stream may send its next request, then claims the slot.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last_request {
            // sleep_until returns immediately for instants in the past
            tokio::time::sleep_until(last + self.min_interval).await;
        }
        self.last_request = Some(Instant::now());
    }
}
