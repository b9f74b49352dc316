pub mod csv_sink;
pub mod csv_source;
pub mod http_client;
pub mod in_memory;
pub mod retrying_sink;
pub mod sqlite_sink;

use std::sync::Arc;

use crate::app::ports::SinkPort;
use crate::config::{Config, SinkKind};
use crate::error::Result;

pub use csv_sink::CsvFileSink;
pub use csv_source::CsvDirectorySource;
pub use http_client::ReqwestGeocoder;
pub use in_memory::{InMemorySink, InMemorySource};
pub use retrying_sink::RetryingSink;
pub use sqlite_sink::SqliteSink;

/// Builds the configured sink, wrapped in a retrying sink when more than one
/// attempt is allowed.
pub fn build_sink(config: &Config) -> Result<Arc<dyn SinkPort>> {
    let retry = config.sink_retry();
    let retrying = retry.attempts() > 1;
    let sink: Arc<dyn SinkPort> = match config.sink.kind {
        SinkKind::Sqlite => {
            let sink = SqliteSink::open(&config.sink.path)?;
            if retrying {
                Arc::new(RetryingSink::new(sink, retry))
            } else {
                Arc::new(sink)
            }
        }
        SinkKind::Csv => {
            let sink = CsvFileSink::new(&config.sink.path);
            if retrying {
                Arc::new(RetryingSink::new(sink, retry))
            } else {
                Arc::new(sink)
            }
        }
        SinkKind::Memory => Arc::new(InMemorySink::new()),
    };
    Ok(sink)
}
