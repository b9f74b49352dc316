use async_trait::async_trait;
use tracing::warn;

use crate::app::ports::{SinkPort, SinkReceipt};
use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::table::Table;

/// Retries rejected writes of the wrapped sink. Only sink failures are
/// retried; any other error is returned at once.
pub struct RetryingSink<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: SinkPort> RetryingSink<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: SinkPort> SinkPort for RetryingSink<S> {
    async fn write(&self, table_name: &str, table: &Table) -> Result<SinkReceipt> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.inner.write(table_name, table).await {
                Ok(receipt) => return Ok(receipt),
                Err(e) if e.is_sink_failure() && self.policy.allows_retry_after(attempt) => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        table = table_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "sink write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl SinkPort for Flaky {
        async fn write(&self, table_name: &str, table: &Table) -> Result<SinkReceipt> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(EtlError::Sink {
                    table: table_name.to_string(),
                    message: "busy".to_string(),
                });
            }
            Ok(SinkReceipt {
                table: table_name.to_string(),
                rows_offered: table.len(),
                rows_written: table.len(),
            })
        }
    }

    fn flaky(failures: u32) -> Flaky {
        Flaky { failures, calls: AtomicU32::new(0) }
    }

    #[tokio::test]
    async fn succeeds_within_attempt_budget() {
        let sink = RetryingSink::new(flaky(2), RetryPolicy::new(3, Duration::from_millis(1)));
        let table = Table::from_rows("t", &["a"], vec![]);
        assert!(sink.write("t", &table).await.is_ok());
        assert_eq!(sink.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let sink = RetryingSink::new(flaky(5), RetryPolicy::new(2, Duration::from_millis(1)));
        let table = Table::from_rows("t", &["a"], vec![]);
        let err = sink.write("t", &table).await.unwrap_err();
        assert!(err.is_sink_failure());
        assert_eq!(sink.inner().calls.load(Ordering::SeqCst), 2);
    }
}
