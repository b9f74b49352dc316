use std::sync::Arc;
use tracing::{info, instrument};

use crate::app::ports::{SinkPort, SinkReceipt, SourcePort};
use crate::app::postcode_use_case::filter_post_town;
use crate::app::settings::PipelineSettings;
use crate::constants::{columns, BUSINESS_OUTPUT_COLUMNS};
use crate::error::Result;
use crate::pipeline::dedupe::{dedupe, Keep};
use crate::pipeline::join::{join, JoinKind};
use crate::pipeline::normalize::normalize;
use crate::table::Table;

/// Raw census columns the consolidated table is built from.
const CENSUS_COLUMNS: [&str; 7] = [
    columns::COMPANY_NUMBER,
    columns::INCORPORATION_DATE,
    columns::ADDRESS_LINE_1,
    columns::ADDRESS_LINE_2,
    columns::POST_TOWN,
    columns::POSTCODE,
    columns::COMPANY_CATEGORY,
];

/// Raw-to-output column names, in output order.
const OUTPUT_RENAMES: [(&str, &str); 5] = [
    (columns::COMPANY_NUMBER, "company_number"),
    (columns::INCORPORATION_DATE, "incorporation_date"),
    (columns::ADDRESS_LINE_1, "address_line_1"),
    (columns::ADDRESS_LINE_2, "address_line_2"),
    (columns::POST_TOWN, "post_town"),
];

#[derive(Debug, Clone)]
pub struct BusinessRun {
    pub table: Table,
    pub receipt: SinkReceipt,
}

/// Cleans the business census and consolidates it with enriched postcodes
/// and borough codes.
pub struct BusinessUseCase {
    source: Arc<dyn SourcePort>,
    sink: Arc<dyn SinkPort>,
    settings: Arc<PipelineSettings>,
}

impl BusinessUseCase {
    pub fn new(
        source: Arc<dyn SourcePort>,
        sink: Arc<dyn SinkPort>,
        settings: Arc<PipelineSettings>,
    ) -> Self {
        Self { source, sink, settings }
    }

    /// `enriched` holds `postcode, latitude, longitude` rows with unique
    /// canonical postcodes.
    #[instrument(skip(self, enriched), fields(dataset = %self.settings.datasets.business_census))]
    pub async fn run(&self, enriched: &Table) -> Result<BusinessRun> {
        let businesses = self.load_businesses().await?;
        let areas = self.load_postcode_areas().await?;

        let table = consolidate(&businesses, enriched, &areas)?
            .with_name(self.settings.tables.business.as_str());
        info!(
            businesses = businesses.len(),
            enriched = enriched.len(),
            rows = table.len(),
            "consolidated business census"
        );

        let receipt = self.sink.write(&self.settings.tables.business, &table).await?;
        Ok(BusinessRun { table, receipt })
    }

    /// Business rows, cleaned and unique per postcode (first seen wins).
    pub async fn load_businesses(&self) -> Result<Table> {
        let dataset = &self.settings.datasets.business_census;
        let records = self.source.fetch(dataset).await?;
        let census = Table::from_records(dataset.as_str(), &records);
        let census = filter_post_town(&census, self.settings.post_town.as_deref())?;
        let projected = census.select(&CENSUS_COLUMNS)?;
        let cleaned = normalize(&projected, &self.settings.rules.business)?;
        dedupe(&cleaned, &[columns::POSTCODE], Keep::First)
    }

    /// `postcode, borough_code` rows, unique per postcode.
    pub async fn load_postcode_areas(&self) -> Result<Table> {
        let dataset = &self.settings.datasets.postcode_areas;
        let records = self.source.fetch(dataset).await?;
        let areas = Table::from_records(dataset.as_str(), &records)
            .select(&[columns::AREA_POSTCODE, columns::AREA_DISTRICT])?
            .rename(&[
                (columns::AREA_POSTCODE, columns::POSTCODE),
                (columns::AREA_DISTRICT, columns::BOROUGH_CODE),
            ])?;
        let cleaned = normalize(&areas, &self.settings.rules.postcodes)?;
        dedupe(&cleaned, &[columns::POSTCODE], Keep::First)
    }
}

/// Right-joins businesses onto enriched postcodes, left-joins borough codes
/// and projects the fixed output schema.
pub fn consolidate(businesses: &Table, enriched: &Table, areas: &Table) -> Result<Table> {
    let located = join(businesses, enriched, columns::POSTCODE, JoinKind::Right)?;
    let with_borough = join(&located, areas, columns::POSTCODE, JoinKind::Left)?;

    let mut order: Vec<&str> = OUTPUT_RENAMES.iter().map(|(raw, _)| *raw).collect();
    order.extend([
        columns::POSTCODE,
        columns::LATITUDE,
        columns::LONGITUDE,
        columns::BOROUGH_CODE,
    ]);
    let projected = with_borough.select(&order)?.rename(&OUTPUT_RENAMES)?;
    debug_assert_eq!(projected.columns(), BUSINESS_OUTPUT_COLUMNS);
    Ok(projected)
}
