use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("table '{table}' has no column '{column}'")]
    MissingColumn { table: String, column: String },

    #[error("column '{column}' holds an unparseable date: '{value}'")]
    UnparseableDate { column: String, value: String },

    #[error("join key '{column}' has type {left} on the left but {right} on the right")]
    JoinKeyTypeMismatch {
        column: String,
        left: &'static str,
        right: &'static str,
    },

    #[error("join key '{column}' repeats on the {side} side: '{value}'")]
    DuplicateJoinKey {
        column: String,
        side: &'static str,
        value: String,
    },

    #[error("table '{table}' has {len} rows, no row {row}")]
    RowOutOfRange { table: String, row: usize, len: usize },

    #[error("source '{dataset}' unavailable: {message}")]
    Source { dataset: String, message: String },

    #[error("sink rejected write to '{table}': {message}")]
    Sink { table: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EtlError {
    pub fn missing_column(table: &str, column: &str) -> Self {
        EtlError::MissingColumn {
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    /// Errors caused by the shape or content of input data rather than by
    /// infrastructure.
    pub fn is_schema_violation(&self) -> bool {
        matches!(
            self,
            EtlError::MissingColumn { .. }
                | EtlError::UnparseableDate { .. }
                | EtlError::JoinKeyTypeMismatch { .. }
                | EtlError::DuplicateJoinKey { .. }
        )
    }

    pub fn is_sink_failure(&self) -> bool {
        matches!(self, EtlError::Sink { .. })
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;

/// Why a single postcode lookup produced no coordinate. Recorded, never
/// propagated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentFailure {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("lookup timed out")]
    Timeout,

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("response lacks data.latitude/data.longitude")]
    MissingFields,
}

impl EnrichmentFailure {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EnrichmentFailure::Transport(_) => "transport",
            EnrichmentFailure::Timeout => "timeout",
            EnrichmentFailure::Status(_) => "status",
            EnrichmentFailure::Malformed(_) => "malformed",
            EnrichmentFailure::MissingFields => "missing_fields",
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            EnrichmentFailure::Transport(_) | EnrichmentFailure::Timeout => true,
            EnrichmentFailure::Status(code) => *code == 429 || *code >= 500,
            EnrichmentFailure::Malformed(_) | EnrichmentFailure::MissingFields => false,
        }
    }
}
