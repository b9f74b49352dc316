//! Metrics for the ETL pipelines
//!
//! Recording goes through the `metrics` facade. Until [`init`] installs the
//! Prometheus recorder every call here is a no-op, so library users and
//! tests pay nothing for it.

use std::fmt;
use std::sync::OnceLock;
use ::metrics::Unit;
use tracing::{debug, info};

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Normalize metrics
    NormalizeRowsKept,
    NormalizeRowsDropped,

    // Dedupe metrics
    DedupeRowsRemoved,

    // Enrichment metrics
    EnrichLookupsResolved,
    EnrichLookupsAbsent,
    EnrichCacheHits,
    EnrichOutboundRequests,
    EnrichRequestDuration,

    // Sink metrics
    SinkRowsOffered,
    SinkRowsWritten,
    SinkWriteErrors,

    // Pipeline metrics
    PipelineCompleted,
    PipelineFailed,
    PipelineDuration,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::NormalizeRowsKept => "etl_normalize_rows_kept_total",
            MetricName::NormalizeRowsDropped => "etl_normalize_rows_dropped_total",

            MetricName::DedupeRowsRemoved => "etl_dedupe_rows_removed_total",

            MetricName::EnrichLookupsResolved => "etl_enrich_lookups_resolved_total",
            MetricName::EnrichLookupsAbsent => "etl_enrich_lookups_absent_total",
            MetricName::EnrichCacheHits => "etl_enrich_cache_hits_total",
            MetricName::EnrichOutboundRequests => "etl_enrich_outbound_requests_total",
            MetricName::EnrichRequestDuration => "etl_enrich_request_duration_seconds",

            MetricName::SinkRowsOffered => "etl_sink_rows_offered_total",
            MetricName::SinkRowsWritten => "etl_sink_rows_written_total",
            MetricName::SinkWriteErrors => "etl_sink_write_errors_total",

            MetricName::PipelineCompleted => "etl_pipeline_completed_total",
            MetricName::PipelineFailed => "etl_pipeline_failed_total",
            MetricName::PipelineDuration => "etl_pipeline_duration_seconds",
        }
    }

    /// (phase, description) for each metric.
    pub fn metadata(&self) -> (&'static str, &'static str) {
        match self {
            MetricName::NormalizeRowsKept => ("normalize", "Rows surviving normalization"),
            MetricName::NormalizeRowsDropped => {
                ("normalize", "Rows dropped for empty required columns")
            }
            MetricName::DedupeRowsRemoved => ("dedupe", "Rows removed as duplicates"),
            MetricName::EnrichLookupsResolved => ("enrich", "Postcodes resolved to coordinates"),
            MetricName::EnrichLookupsAbsent => {
                ("enrich", "Postcodes left without coordinates, by failure kind")
            }
            MetricName::EnrichCacheHits => ("enrich", "Lookups answered by the run cache"),
            MetricName::EnrichOutboundRequests => {
                ("enrich", "Requests sent to the geocode service")
            }
            MetricName::EnrichRequestDuration => ("enrich", "Geocode request duration"),
            MetricName::SinkRowsOffered => ("sink", "Rows handed to the sink"),
            MetricName::SinkRowsWritten => ("sink", "Rows stored by the sink"),
            MetricName::SinkWriteErrors => ("sink", "Rejected sink writes"),
            MetricName::PipelineCompleted => ("pipeline", "Sub-pipelines completed"),
            MetricName::PipelineFailed => ("pipeline", "Sub-pipelines failed"),
            MetricName::PipelineDuration => ("pipeline", "Sub-pipeline duration"),
        }
    }

    pub fn is_histogram(&self) -> bool {
        matches!(
            self,
            MetricName::EnrichRequestDuration | MetricName::PipelineDuration
        )
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            NormalizeRowsKept,
            NormalizeRowsDropped,
            DedupeRowsRemoved,
            EnrichLookupsResolved,
            EnrichLookupsAbsent,
            EnrichCacheHits,
            EnrichOutboundRequests,
            EnrichRequestDuration,
            SinkRowsOffered,
            SinkRowsWritten,
            SinkWriteErrors,
            PipelineCompleted,
            PipelineFailed,
            PipelineDuration,
        ]
        .into_iter()
    }
}

static METRICS_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder. Calling it again is a no-op.
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
    METRICS_HANDLE.set(handle).ok();
    describe_all();
    info!("Metrics system initialized");
    Ok(())
}

/// Registers the help text of every metric with the installed recorder.
pub fn describe_all() {
    for metric in MetricName::all_metrics() {
        let (phase, description) = metric.metadata();
        if metric.is_histogram() {
            ::metrics::describe_histogram!(metric.as_str(), Unit::Seconds, description);
        } else {
            ::metrics::describe_counter!(metric.as_str(), Unit::Count, description);
        }
        debug!(metric = metric.as_str(), phase, "described metric");
    }
}

/// Prometheus text exposition of everything recorded so far, if the
/// recorder is installed.
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

// ============================================================================
// Normalize Metrics
// ============================================================================

pub mod normalize {
    use super::MetricName;

    pub fn rows_processed(table: &str, kept: usize, dropped: usize) {
        ::metrics::counter!(MetricName::NormalizeRowsKept.as_str(), "table" => table.to_string())
            .increment(kept as u64);
        ::metrics::counter!(MetricName::NormalizeRowsDropped.as_str(), "table" => table.to_string())
            .increment(dropped as u64);
    }
}

// ============================================================================
// Dedupe Metrics
// ============================================================================

pub mod dedupe {
    use super::MetricName;

    pub fn rows_removed(table: &str, removed: usize) {
        ::metrics::counter!(MetricName::DedupeRowsRemoved.as_str(), "table" => table.to_string())
            .increment(removed as u64);
    }
}

// ============================================================================
// Enrichment Metrics
// ============================================================================

pub mod enrich {
    use super::MetricName;

    pub fn cache_hit() {
        ::metrics::counter!(MetricName::EnrichCacheHits.as_str()).increment(1);
    }

    /// Duration of one outbound request, recorded whatever its outcome.
    pub fn request_duration(secs: f64) {
        ::metrics::counter!(MetricName::EnrichOutboundRequests.as_str()).increment(1);
        ::metrics::histogram!(MetricName::EnrichRequestDuration.as_str()).record(secs);
    }

    pub fn lookup_resolved() {
        ::metrics::counter!(MetricName::EnrichLookupsResolved.as_str()).increment(1);
    }

    pub fn lookup_absent(kind: &'static str) {
        ::metrics::counter!(MetricName::EnrichLookupsAbsent.as_str(), "kind" => kind).increment(1);
    }
}

// ============================================================================
// Sink Metrics
// ============================================================================

pub mod sink {
    use super::MetricName;

    pub fn rows_written(table: &str, offered: usize, written: usize) {
        ::metrics::counter!(MetricName::SinkRowsOffered.as_str(), "table" => table.to_string())
            .increment(offered as u64);
        ::metrics::counter!(MetricName::SinkRowsWritten.as_str(), "table" => table.to_string())
            .increment(written as u64);
    }

    pub fn write_error(table: &str) {
        ::metrics::counter!(MetricName::SinkWriteErrors.as_str(), "table" => table.to_string())
            .increment(1);
    }
}

// ============================================================================
// Pipeline Metrics
// ============================================================================

pub mod pipeline {
    use super::MetricName;

    pub fn completed(pipeline: &'static str, secs: f64) {
        ::metrics::counter!(MetricName::PipelineCompleted.as_str(), "pipeline" => pipeline)
            .increment(1);
        duration(pipeline, secs);
    }

    pub fn failed(pipeline: &'static str, secs: f64) {
        ::metrics::counter!(MetricName::PipelineFailed.as_str(), "pipeline" => pipeline)
            .increment(1);
        duration(pipeline, secs);
    }

    fn duration(pipeline: &'static str, secs: f64) {
        ::metrics::histogram!(MetricName::PipelineDuration.as_str(), "pipeline" => pipeline)
            .record(secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn metric_names_are_unique_and_prefixed() {
        let names: HashSet<_> = MetricName::all_metrics().map(|m| m.as_str()).collect();
        assert_eq!(names.len(), MetricName::all_metrics().count());
        assert!(names.iter().all(|n| n.starts_with("etl_")));
    }

    #[test]
    fn recording_without_recorder_is_harmless() {
        normalize::rows_processed("t", 3, 1);
        enrich::lookup_absent("timeout");
        describe_all();
        assert!(MetricName::all_metrics().all(|m| !m.metadata().1.is_empty()));
    }

    #[test]
    fn installed_recorder_exports_help_text() {
        init().unwrap();
        pipeline::completed("venues", 0.25);
        sink::write_error("boroughs");

        let text = render().unwrap();
        assert!(text.contains("# HELP etl_pipeline_completed_total Sub-pipelines completed"));
        assert!(text.contains("# HELP etl_sink_write_errors_total Rejected sink writes"));
        assert!(text.contains("# HELP etl_pipeline_duration_seconds Sub-pipeline duration"));
        assert_eq!(
            MetricName::all_metrics().filter(MetricName::is_histogram).count(),
            2
        );
    }
}
