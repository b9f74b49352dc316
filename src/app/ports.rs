use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{GeoPoint, PostcodeKey, RawRecord};
use crate::error::{EnrichmentFailure, Result};
use crate::table::Table;

/// Extract side: raw datasets by name. Fetching the same name twice within a
/// run must return the same content.
#[async_trait]
pub trait SourcePort: Send + Sync {
    async fn fetch(&self, dataset: &str) -> Result<Vec<RawRecord>>;
}

/// Load side. Implementations are append-only: writing the same rows twice
/// stores them twice unless the implementation enforces row uniqueness
/// itself. Callers deduplicate before writing.
#[async_trait]
pub trait SinkPort: Send + Sync {
    async fn write(&self, table_name: &str, table: &Table) -> Result<SinkReceipt>;
}

/// Remote geocoding lookup for a single postcode.
#[async_trait]
pub trait GeocodePort: Send + Sync {
    async fn locate(
        &self,
        postcode: &PostcodeKey,
    ) -> std::result::Result<GeoPoint, EnrichmentFailure>;
}

/// What a sink did with one write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SinkReceipt {
    pub table: String,
    pub rows_offered: usize,
    /// Rows actually stored; lower than `rows_offered` when the sink ignored
    /// rows it already held.
    pub rows_written: usize,
}
