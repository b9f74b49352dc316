use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::app::business_use_case::BusinessUseCase;
use crate::app::ports::{GeocodePort, SinkPort, SinkReceipt, SourcePort};
use crate::app::postcode_use_case::PostcodeUseCase;
use crate::app::settings::PipelineSettings;
use crate::app::venue_use_case::VenueUseCase;
use crate::constants::{self, columns};
use crate::domain::Value;
use crate::error::{EtlError, Result};
use crate::observability::metrics;
use crate::pipeline::dedupe::{dedupe, Keep};
use crate::pipeline::enrich::{EnricherSettings, EnrichmentStats, GeoEnricher};
use crate::pipeline::normalize::normalize;
use crate::table::Table;

/// Which sub-pipelines a run includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSelection {
    pub postcodes: bool,
    pub business: bool,
    pub venues: bool,
}

impl Default for PipelineSelection {
    fn default() -> Self {
        Self::all()
    }
}

impl PipelineSelection {
    pub fn all() -> Self {
        Self {
            postcodes: true,
            business: true,
            venues: true,
        }
    }

    pub fn none() -> Self {
        Self {
            postcodes: false,
            business: false,
            venues: false,
        }
    }

    /// Parses names as accepted by `run --only`.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut selection = Self::none();
        for name in names {
            match name.as_ref().trim() {
                constants::POSTCODE_PIPELINE => selection.postcodes = true,
                constants::BUSINESS_PIPELINE => selection.business = true,
                constants::VENUE_PIPELINE => selection.venues = true,
                other => {
                    return Err(EtlError::Config(format!(
                        "unknown pipeline '{}', expected one of {:?}",
                        other,
                        constants::get_pipeline_names()
                    )))
                }
            }
        }
        Ok(selection)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineStatus {
    Completed {
        receipts: Vec<SinkReceipt>,
        #[serde(skip_serializing_if = "Option::is_none")]
        enrichment: Option<EnrichmentStats>,
    },
    Failed {
        error: String,
        schema_violation: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub pipeline: &'static str,
    /// Source dataset the sub-pipeline reads.
    pub dataset: String,
    pub duration_ms: u64,
    #[serde(flatten)]
    pub status: PipelineStatus,
}

impl PipelineOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, PipelineStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<PipelineOutcome>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| !o.is_failed())
    }

    pub fn failures(&self) -> impl Iterator<Item = &PipelineOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }

    pub fn outcome(&self, pipeline: &str) -> Option<&PipelineOutcome> {
        self.outcomes.iter().find(|o| o.pipeline == pipeline)
    }
}

/// Runs the postcode, business and venue sub-pipelines. The venue pipeline
/// runs alongside the postcode then business chain. A failing sub-pipeline
/// never stops the others, and nothing already written is rolled back.
pub struct PipelineOrchestrator {
    source: Arc<dyn SourcePort>,
    sink: Arc<dyn SinkPort>,
    geocoder: Arc<dyn GeocodePort>,
    enricher_settings: EnricherSettings,
    settings: Arc<PipelineSettings>,
}

impl PipelineOrchestrator {
    pub fn new(
        source: Arc<dyn SourcePort>,
        sink: Arc<dyn SinkPort>,
        geocoder: Arc<dyn GeocodePort>,
        enricher_settings: EnricherSettings,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            sink,
            geocoder,
            enricher_settings,
            settings: Arc::new(settings),
        }
    }

    pub async fn run(&self, selection: &PipelineSelection) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = info_span!("pipeline_run", %run_id);

        async {
            info!(?selection, "starting pipeline run");
            let (mut outcomes, venues) = tokio::join!(
                self.run_postcode_chain(selection),
                self.run_venues(selection)
            );
            outcomes.extend(venues);

            let report = RunReport {
                run_id,
                started_at,
                finished_at: Utc::now(),
                outcomes,
            };
            info!(
                pipelines = report.outcomes.len(),
                failed = report.failures().count(),
                "pipeline run finished"
            );
            report
        }
        .instrument(span)
        .await
    }

    async fn run_postcode_chain(&self, selection: &PipelineSelection) -> Vec<PipelineOutcome> {
        let mut outcomes = Vec::new();

        let enriched = if selection.postcodes {
            // A fresh enricher per run keeps the lookup cache run-scoped.
            let enricher = GeoEnricher::new(self.geocoder.clone(), self.enricher_settings.clone());
            let use_case = PostcodeUseCase::new(
                self.source.clone(),
                self.sink.clone(),
                enricher,
                self.settings.clone(),
            );
            let started = Instant::now();
            let (result, enriched) = match use_case.run().await {
                Ok(run) => (
                    Ok(PipelineStatus::Completed {
                        receipts: vec![run.receipt],
                        enrichment: Some(run.stats),
                    }),
                    Enriched::Fresh(run.table),
                ),
                Err(e) => (Err(e), Enriched::Failed),
            };
            outcomes.push(finish(
                constants::POSTCODE_PIPELINE,
                &self.settings.datasets.business_census,
                started,
                result,
            ));
            enriched
        } else {
            Enriched::NotRun
        };

        if selection.business {
            let started = Instant::now();
            let result = match enriched {
                Enriched::Fresh(table) => self.business(Some(table)).await,
                Enriched::NotRun => self.business(None).await,
                Enriched::Failed => Err(EtlError::Source {
                    dataset: self.settings.datasets.business_census.clone(),
                    message: "postcode pipeline failed, no enriched postcodes to join".to_string(),
                }),
            };
            outcomes.push(finish(
                constants::BUSINESS_PIPELINE,
                &self.settings.datasets.business_census,
                started,
                result,
            ));
        }
        outcomes
    }

    async fn business(&self, enriched: Option<Table>) -> Result<PipelineStatus> {
        let enriched = match enriched {
            Some(table) => table,
            None => self.load_enriched_postcodes().await?,
        };
        let use_case =
            BusinessUseCase::new(self.source.clone(), self.sink.clone(), self.settings.clone());
        let run = use_case.run(&enriched).await?;
        Ok(PipelineStatus::Completed {
            receipts: vec![run.receipt],
            enrichment: None,
        })
    }

    /// Enriched postcodes from an earlier run, read back from the source.
    pub async fn load_enriched_postcodes(&self) -> Result<Table> {
        let dataset = &self.settings.datasets.enriched_postcodes;
        let records = self.source.fetch(dataset).await?;
        let table = Table::from_records(dataset.as_str(), &records).select(&[
            columns::POSTCODE,
            columns::LATITUDE,
            columns::LONGITUDE,
        ])?;
        let cleaned = normalize(&table, &self.settings.rules.postcodes)?;
        let unique = dedupe(&cleaned, &[columns::POSTCODE], Keep::First)?;

        // A coordinate is usable only when both halves parse.
        let rows: Vec<Vec<Value>> = unique
            .rows()
            .iter()
            .filter_map(|row| match (row[1].as_f64(), row[2].as_f64()) {
                (Some(lat), Some(lon)) => {
                    Some(vec![row[0].clone(), Value::Float(lat), Value::Float(lon)])
                }
                _ => None,
            })
            .collect();
        let dropped = unique.len() - rows.len();
        if dropped > 0 {
            warn!(dataset = %dataset, dropped, "dropped postcodes without a usable coordinate");
        }
        info!(dataset = %dataset, rows = rows.len(), "loaded previously enriched postcodes");
        Ok(Table::from_rows(
            dataset.as_str(),
            &[columns::POSTCODE, columns::LATITUDE, columns::LONGITUDE],
            rows,
        ))
    }

    async fn run_venues(&self, selection: &PipelineSelection) -> Option<PipelineOutcome> {
        if !selection.venues {
            return None;
        }
        let started = Instant::now();
        let use_case =
            VenueUseCase::new(self.source.clone(), self.sink.clone(), self.settings.clone());
        let result = use_case
            .run()
            .await
            .map(|run| PipelineStatus::Completed {
                receipts: run.receipts,
                enrichment: None,
            });
        Some(finish(
            constants::VENUE_PIPELINE,
            &self.settings.datasets.cultural_sites,
            started,
            result,
        ))
    }
}

/// What the business pipeline can join against.
enum Enriched {
    Fresh(Table),
    NotRun,
    Failed,
}

fn finish(
    pipeline: &'static str,
    dataset: &str,
    started: Instant,
    result: Result<PipelineStatus>,
) -> PipelineOutcome {
    let elapsed = started.elapsed();
    let status = match result {
        Ok(status) => {
            info!(
                pipeline,
                dataset,
                elapsed_ms = elapsed.as_millis() as u64,
                "sub-pipeline completed"
            );
            metrics::pipeline::completed(pipeline, elapsed.as_secs_f64());
            status
        }
        Err(e) => {
            let schema_violation = e.is_schema_violation();
            error!(pipeline, dataset, schema_violation, error = %e, "sub-pipeline failed");
            metrics::pipeline::failed(pipeline, elapsed.as_secs_f64());
            PipelineStatus::Failed {
                error: e.to_string(),
                schema_violation,
            }
        }
    };
    PipelineOutcome {
        pipeline,
        dataset: dataset.to_string(),
        duration_ms: elapsed.as_millis() as u64,
        status,
    }
}
