use async_trait::async_trait;
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

use crate::app::ports::{SinkPort, SinkReceipt};
use crate::error::{EtlError, Result};
use crate::idempotency::compute_row_key;
use crate::observability::metrics;
use crate::table::Table;

/// Loads tables into SQLite. Each row is stored under a content hash
/// (`row_key`) and repeats are ignored, so loading the same rows twice
/// stores them once.
#[derive(Clone)]
pub struct SqliteSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(Self::from_connection(conn))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Rows currently stored in `table_name`; zero when the table does not
    /// exist yet.
    pub fn row_count(&self, table_name: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table_name],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Ok(0);
        }
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table_name)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Stored values of one column, in insertion order.
    pub fn column(&self, table_name: &str, column: &str) -> Result<Vec<Option<String>>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} ORDER BY rowid",
            quote_ident(column),
            quote_ident(table_name)
        ))?;
        let values = stmt
            .query_map([], |row| row.get::<_, Option<String>>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(values)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn insert_rows(conn: &mut Connection, table_name: &str, table: &Table) -> rusqlite::Result<usize> {
    let columns: Vec<String> = table.columns().iter().map(|c| quote_ident(c)).collect();
    let column_defs: Vec<String> = columns.iter().map(|c| format!("{} TEXT", c)).collect();
    let target = quote_ident(table_name);

    let tx = conn.transaction()?;
    tx.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (row_key TEXT PRIMARY KEY{}{});",
        target,
        if column_defs.is_empty() { "" } else { ", " },
        column_defs.join(", ")
    ))?;

    let placeholders: Vec<String> = (1..=columns.len() + 1).map(|i| format!("?{}", i)).collect();
    let mut inserted = 0;
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT OR IGNORE INTO {} (row_key{}{}) VALUES ({})",
            target,
            if columns.is_empty() { "" } else { ", " },
            columns.join(", "),
            placeholders.join(", ")
        ))?;
        for row in table.rows() {
            let key = compute_row_key(table_name, row);
            let values = std::iter::once(Some(key)).chain(
                row.iter()
                    .map(|v| if v.is_null() { None } else { Some(v.to_string()) }),
            );
            inserted += stmt.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;
    Ok(inserted)
}

#[async_trait]
impl SinkPort for SqliteSink {
    async fn write(&self, table_name: &str, table: &Table) -> Result<SinkReceipt> {
        let conn = self.conn.clone();
        let name = table_name.to_string();
        let rows = table.clone();
        let written = tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            insert_rows(&mut conn, &name, &rows)
        })
        .await
        .map_err(|e| EtlError::Sink {
            table: table_name.to_string(),
            message: e.to_string(),
        })?
        .map_err(|e| {
            metrics::sink::write_error(table_name);
            EtlError::Sink {
                table: table_name.to_string(),
                message: e.to_string(),
            }
        })?;

        info!(
            table = table_name,
            offered = table.len(),
            written,
            "loaded table into sqlite"
        );
        metrics::sink::rows_written(table_name, table.len(), written);
        Ok(SinkReceipt {
            table: table_name.to_string(),
            rows_offered: table.len(),
            rows_written: written,
        })
    }
}
