//! Dataset, table and column names shared across the pipelines.

// Source datasets (file names under the configured data directory)
pub const BUSINESS_CENSUS_DATASET: &str = "business_census.csv";
pub const CULTURAL_SITES_DATASET: &str = "all_sites.csv";
pub const POSTCODE_AREAS_DATASET: &str = "london_postcodes.csv";
pub const ENRICHED_POSTCODES_DATASET: &str = "cleaned_postcodes_coordinates.csv";

// Sink tables
pub const POSTCODES_TABLE: &str = "postcodes_coordinates";
pub const BUSINESS_TABLE: &str = "cleaned_business_census";
pub const VENUES_TABLE: &str = "cleaned_cultural_venue_infrastructure";
pub const BOROUGH_TABLE: &str = "borough_mapping";

// Sub-pipeline names, as accepted by `run --only`
pub const POSTCODE_PIPELINE: &str = "postcodes";
pub const BUSINESS_PIPELINE: &str = "business";
pub const VENUE_PIPELINE: &str = "venues";

/// Get all sub-pipeline names in execution order
pub fn get_pipeline_names() -> Vec<&'static str> {
    vec![POSTCODE_PIPELINE, BUSINESS_PIPELINE, VENUE_PIPELINE]
}

pub const DEFAULT_GEOCODE_URL: &str = "https://api.getthedata.com";
pub const DEFAULT_SAMPLE_SIZE: usize = 1000;
pub const DEFAULT_MIN_DELAY_MS: u64 = 100;

pub mod columns {
    // Raw business census
    pub const COMPANY_NUMBER: &str = "companynumber";
    pub const INCORPORATION_DATE: &str = "incorporationdate";
    pub const ADDRESS_LINE_1: &str = "addressline1";
    pub const ADDRESS_LINE_2: &str = "addressline2";
    pub const POST_TOWN: &str = "posttown";
    pub const POSTCODE: &str = "postcode";
    pub const COMPANY_CATEGORY: &str = "companycategory";

    // Raw postcode areas
    pub const AREA_POSTCODE: &str = "pcd";
    pub const AREA_DISTRICT: &str = "oslaua";

    // Raw cultural sites
    pub const CULTURAL_VENUE_TYPE: &str = "Cultural Venue Type";
    pub const VENUE_TYPE: &str = "venue_type";
    pub const BOROUGH_CODE: &str = "borough_code";
    pub const BOROUGH_NAME: &str = "borough_name";

    // Enrichment output
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";
}

/// Fixed column order of the consolidated business table.
pub const BUSINESS_OUTPUT_COLUMNS: [&str; 9] = [
    "company_number",
    "incorporation_date",
    "address_line_1",
    "address_line_2",
    "post_town",
    "postcode",
    "latitude",
    "longitude",
    "borough_code",
];
