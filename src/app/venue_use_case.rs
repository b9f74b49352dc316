use std::sync::Arc;
use tracing::{info, instrument};

use crate::app::ports::{SinkPort, SinkReceipt, SourcePort};
use crate::app::settings::PipelineSettings;
use crate::constants::columns;
use crate::error::Result;
use crate::pipeline::dedupe::{dedupe, dedupe_sequence, Keep};
use crate::pipeline::normalize::normalize;
use crate::table::Table;

#[derive(Debug, Clone)]
pub struct VenueRun {
    pub venues: Table,
    pub boroughs: Table,
    pub receipts: Vec<SinkReceipt>,
}

/// Cleans cultural venue rows and the borough mapping carried in the same
/// dataset, and loads both.
pub struct VenueUseCase {
    source: Arc<dyn SourcePort>,
    sink: Arc<dyn SinkPort>,
    settings: Arc<PipelineSettings>,
}

impl VenueUseCase {
    pub fn new(
        source: Arc<dyn SourcePort>,
        sink: Arc<dyn SinkPort>,
        settings: Arc<PipelineSettings>,
    ) -> Self {
        Self { source, sink, settings }
    }

    #[instrument(skip(self), fields(dataset = %self.settings.datasets.cultural_sites))]
    pub async fn run(&self) -> Result<VenueRun> {
        let dataset = &self.settings.datasets.cultural_sites;
        let records = self.source.fetch(dataset).await?;
        let sites = Table::from_records(dataset.as_str(), &records);

        // Both tables are derived before either write so a schema problem in
        // one leaves nothing half loaded.
        let venues = self.clean_venues(&sites)?;
        let boroughs = self.clean_boroughs(&sites)?;
        info!(
            sites = sites.len(),
            venues = venues.len(),
            boroughs = boroughs.len(),
            "cleaned cultural sites"
        );

        let mut receipts = Vec::with_capacity(2);
        receipts.push(self.sink.write(&self.settings.tables.venues, &venues).await?);
        receipts.push(self.sink.write(&self.settings.tables.boroughs, &boroughs).await?);
        Ok(VenueRun {
            venues,
            boroughs,
            receipts,
        })
    }

    /// Sampled venue rows, unique per (postcode, venue type).
    pub fn clean_venues(&self, sites: &Table) -> Result<Table> {
        let projected = sites
            .head(self.settings.venue_sample.limit())
            .select(&[
                columns::CULTURAL_VENUE_TYPE,
                columns::POSTCODE,
                columns::BOROUGH_CODE,
                columns::BOROUGH_NAME,
            ])?
            .rename(&[(columns::CULTURAL_VENUE_TYPE, columns::VENUE_TYPE)])?;
        let cleaned = normalize(&projected, &self.settings.rules.venues)?;
        Ok(dedupe(&cleaned, &[columns::POSTCODE, columns::VENUE_TYPE], Keep::First)?
            .with_name(self.settings.tables.venues.as_str()))
    }

    /// Borough code/name pairs from every site row, reduced by the
    /// configured dedupe passes.
    pub fn clean_boroughs(&self, sites: &Table) -> Result<Table> {
        let projected = sites.select(&[columns::BOROUGH_CODE, columns::BOROUGH_NAME])?;
        let cleaned = normalize(&projected, &self.settings.rules.boroughs)?;
        Ok(dedupe_sequence(&cleaned, &self.settings.borough_passes)?
            .with_name(self.settings.tables.boroughs.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Value;
    use crate::infra::in_memory::{InMemorySink, InMemorySource};

    fn use_case(settings: PipelineSettings) -> VenueUseCase {
        VenueUseCase::new(
            Arc::new(InMemorySource::new()),
            Arc::new(InMemorySink::new()),
            Arc::new(settings),
        )
    }

    fn site(kind: &str, postcode: &str, code: &str, borough: &str, name: &str) -> Vec<Value> {
        vec![kind.into(), postcode.into(), code.into(), borough.into(), name.into()]
    }

    fn sites() -> Table {
        Table::from_rows(
            "all_sites.csv",
            &[
                columns::CULTURAL_VENUE_TYPE,
                columns::POSTCODE,
                columns::BOROUGH_CODE,
                columns::BOROUGH_NAME,
                "site_name",
            ],
            vec![
                site("Museums", "wc1b 3dg", "E09000007", "CAMDEN", "BM"),
                site("Museums", "WC1B 3DG", "E09000007", "camden", "BM shop"),
                site("Theatres", "SW1A 1AA", "E09000033", "Westminster", "x"),
                site("Theatres", "SW1A 1AA", "E09000033", "City of Westminster", "y"),
                vec!["Pubs".into(), "N1 9GU".into(), Value::Null, "Islington".into(), "z".into()],
            ],
        )
    }

    #[test]
    fn venues_are_unique_per_postcode_and_type() {
        let out = use_case(PipelineSettings::default()).clean_venues(&sites()).unwrap();
        assert_eq!(
            out.columns(),
            [columns::VENUE_TYPE, columns::POSTCODE, columns::BOROUGH_CODE, columns::BOROUGH_NAME]
        );
        assert_eq!(out.len(), 2, "duplicate museum and code-less pub removed");
        assert_eq!(out.value(0, columns::POSTCODE).unwrap(), &Value::text("WC1B3DG"));
        assert_eq!(
            out.value(1, columns::BOROUGH_NAME).unwrap(),
            &Value::text("City Of Westminster")
        );
    }

    #[test]
    fn venue_sample_caps_rows_before_dedupe() {
        let mut settings = PipelineSettings::default();
        settings.venue_sample = crate::app::settings::SampleSize::Limited(2);
        let out = use_case(settings).clean_venues(&sites()).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn boroughs_use_every_row_and_collapse_to_one_per_code() {
        let mut settings = PipelineSettings::default();
        settings.venue_sample = crate::app::settings::SampleSize::Limited(1);
        let out = use_case(settings).clean_boroughs(&sites()).unwrap();
        assert_eq!(out.columns(), [columns::BOROUGH_CODE, columns::BOROUGH_NAME]);
        assert_eq!(
            out.rows(),
            &[
                vec![Value::text("E09000007"), Value::text("Camden")],
                vec![Value::text("E09000033"), Value::text("City Of Westminster")],
            ]
        );
    }
}
