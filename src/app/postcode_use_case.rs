use std::sync::Arc;
use tracing::{info, instrument};

use crate::app::ports::{SinkPort, SinkReceipt, SourcePort};
use crate::app::settings::PipelineSettings;
use crate::constants::columns;
use crate::domain::{PostcodeKey, Value};
use crate::error::Result;
use crate::pipeline::dedupe::{dedupe, Keep};
use crate::pipeline::enrich::{EnrichmentStats, GeoEnricher};
use crate::pipeline::normalize::normalize;
use crate::table::Table;

/// Result of a postcode pipeline run.
#[derive(Debug, Clone)]
pub struct PostcodeRun {
    /// Resolved postcodes: `postcode, latitude, longitude`.
    pub table: Table,
    pub receipt: SinkReceipt,
    pub stats: EnrichmentStats,
}

/// Samples business census postcodes, geocodes them and loads the resolved
/// ones.
pub struct PostcodeUseCase {
    source: Arc<dyn SourcePort>,
    sink: Arc<dyn SinkPort>,
    enricher: GeoEnricher,
    settings: Arc<PipelineSettings>,
}

impl PostcodeUseCase {
    pub fn new(
        source: Arc<dyn SourcePort>,
        sink: Arc<dyn SinkPort>,
        enricher: GeoEnricher,
        settings: Arc<PipelineSettings>,
    ) -> Self {
        Self {
            source,
            sink,
            enricher,
            settings,
        }
    }

    #[instrument(skip(self), fields(dataset = %self.settings.datasets.business_census))]
    pub async fn run(&self) -> Result<PostcodeRun> {
        let dataset = &self.settings.datasets.business_census;
        let records = self.source.fetch(dataset).await?;
        let census = Table::from_records(dataset.as_str(), &records);

        let keys = self.sample_postcodes(&census)?;
        info!(rows = census.len(), unique_postcodes = keys.len(), "extracted postcode sample");

        let outcome = self.enricher.enrich(keys.iter().cloned()).await;
        let enriched = outcome.enriched_in_order(&keys);
        let table = enriched_table(&self.settings.tables.postcodes, &enriched);

        let receipt = self.sink.write(&self.settings.tables.postcodes, &table).await?;
        info!(
            written = receipt.rows_written,
            absent = outcome.stats.absent,
            "loaded enriched postcodes"
        );
        Ok(PostcodeRun {
            table,
            receipt,
            stats: outcome.stats,
        })
    }

    /// Distinct canonical postcodes from the first sampled rows, in
    /// first-seen order.
    pub fn sample_postcodes(&self, census: &Table) -> Result<Vec<PostcodeKey>> {
        let census = filter_post_town(census, self.settings.post_town.as_deref())?;
        let sample = census
            .head(self.settings.postcode_sample.limit())
            .select(&[columns::POSTCODE])?;
        let cleaned = normalize(&sample, &self.settings.rules.postcodes)?;
        let unique = dedupe(&cleaned, &[columns::POSTCODE], Keep::First)?;
        Ok(unique
            .column_values(columns::POSTCODE)?
            .into_iter()
            .filter_map(|v| v.as_str().and_then(PostcodeKey::parse))
            .collect())
    }
}

/// Rows of resolved postcodes, one per entry, in the given order.
pub fn enriched_table(name: &str, enriched: &[crate::domain::EnrichedPostcode]) -> Table {
    let rows = enriched
        .iter()
        .map(|e| {
            vec![
                Value::text(e.postcode.as_str()),
                Value::Float(e.point.latitude),
                Value::Float(e.point.longitude),
            ]
        })
        .collect();
    Table::from_rows(
        name,
        &[columns::POSTCODE, columns::LATITUDE, columns::LONGITUDE],
        rows,
    )
}

/// Keeps rows whose post town matches `town`, ignoring case and surrounding
/// whitespace. No filter when `town` is `None`.
pub fn filter_post_town(table: &Table, town: Option<&str>) -> Result<Table> {
    let Some(town) = town else {
        return Ok(table.clone());
    };
    let idx = table.column_index(columns::POST_TOWN)?;
    let wanted = town.trim();
    Ok(table.filter(|row| {
        row[idx]
            .as_str()
            .map(|t| t.trim().eq_ignore_ascii_case(wanted))
            .unwrap_or(false)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_town_filter_is_case_insensitive() {
        let table = Table::from_rows(
            "census",
            &[columns::POSTCODE, columns::POST_TOWN],
            vec![
                vec!["E1 6AN".into(), "LONDON".into()],
                vec!["M1 1AE".into(), "MANCHESTER".into()],
                vec!["N1 9GU".into(), " london ".into()],
            ],
        );
        assert_eq!(filter_post_town(&table, Some("London")).unwrap().len(), 2);
        assert_eq!(filter_post_town(&table, None).unwrap().len(), 3);
    }
}
