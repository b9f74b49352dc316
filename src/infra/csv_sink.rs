use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use crate::app::ports::{SinkPort, SinkReceipt};
use crate::error::{EtlError, Result};
use crate::observability::metrics;
use crate::table::Table;

/// Writes each table to `<dir>/<table>.csv`, replacing any previous file.
pub struct CsvFileSink {
    dir: PathBuf,
}

impl CsvFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, table_name: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", table_name))
    }
}

pub fn to_csv(table: &Table) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.into_inner().map_err(|e| EtlError::Io(e.into_error()))
}

#[async_trait]
impl SinkPort for CsvFileSink {
    async fn write(&self, table_name: &str, table: &Table) -> Result<SinkReceipt> {
        let sink_error = |message: String| EtlError::Sink {
            table: table_name.to_string(),
            message,
        };
        let bytes = to_csv(table)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| sink_error(e.to_string()))?;
        let path = self.path_for(table_name);
        if let Err(e) = tokio::fs::write(&path, bytes).await {
            metrics::sink::write_error(table_name);
            return Err(sink_error(format!("{}: {}", path.display(), e)));
        }

        info!(table = table_name, rows = table.len(), path = %path.display(), "wrote csv table");
        metrics::sink::rows_written(table_name, table.len(), table.len());
        Ok(SinkReceipt {
            table: table_name.to_string(),
            rows_offered: table.len(),
            rows_written: table.len(),
        })
    }
}
