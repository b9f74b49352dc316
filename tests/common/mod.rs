#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use london_etl::app::ports::GeocodePort;
use london_etl::constants::columns;
use london_etl::domain::{GeoPoint, PostcodeKey, RawRecord, Value};
use london_etl::pipeline::enrich::EnricherSettings;
use london_etl::retry::RetryPolicy;
use london_etl::EnrichmentFailure;

/// Geocoder answering from a fixed table. Unknown postcodes get a 404.
pub struct FakeGeocoder {
    points: HashMap<String, (f64, f64)>,
    failures: HashMap<String, EnrichmentFailure>,
    delay: Duration,
    calls: AtomicUsize,
    per_postcode: Mutex<HashMap<String, usize>>,
}

impl FakeGeocoder {
    pub fn new(points: &[(&str, f64, f64)]) -> Self {
        Self {
            points: points
                .iter()
                .map(|(code, lat, lon)| (code.to_string(), (*lat, *lon)))
                .collect(),
            failures: HashMap::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            per_postcode: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, postcode: &str, failure: EnrichmentFailure) -> Self {
        self.failures.insert(postcode.to_string(), failure);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, postcode: &str) -> usize {
        self.per_postcode
            .lock()
            .unwrap()
            .get(postcode)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl GeocodePort for FakeGeocoder {
    async fn locate(&self, postcode: &PostcodeKey) -> Result<GeoPoint, EnrichmentFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .per_postcode
            .lock()
            .unwrap()
            .entry(postcode.to_string())
            .or_insert(0) += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(failure) = self.failures.get(postcode.as_str()) {
            return Err(failure.clone());
        }
        match self.points.get(postcode.as_str()) {
            Some((latitude, longitude)) => Ok(GeoPoint {
                latitude: *latitude,
                longitude: *longitude,
            }),
            None => Err(EnrichmentFailure::Status(404)),
        }
    }
}

pub fn fast_settings(workers: usize) -> EnricherSettings {
    EnricherSettings {
        workers,
        min_delay: Duration::ZERO,
        timeout: Duration::from_secs(2),
        retry: RetryPolicy::none(),
    }
}

pub fn key(raw: &str) -> PostcodeKey {
    PostcodeKey::parse(raw).unwrap()
}

pub fn standard_geocoder() -> FakeGeocoder {
    FakeGeocoder::new(&[
        ("SW1A1AA", 51.5014, -0.1419),
        ("E16AN", 51.5202, -0.0714),
        ("N19GU", 51.5362, -0.1033),
    ])
}

fn record(columns: &[&str], values: Vec<Value>) -> RawRecord {
    let mut record = RawRecord::new();
    for (column, value) in columns.iter().zip(values) {
        record.insert(*column, value);
    }
    record
}

fn text(s: &str) -> Value {
    if s.is_empty() {
        Value::Null
    } else {
        Value::text(s)
    }
}

const CENSUS_COLUMNS: [&str; 7] = [
    columns::COMPANY_NUMBER,
    columns::INCORPORATION_DATE,
    columns::ADDRESS_LINE_1,
    columns::ADDRESS_LINE_2,
    columns::POST_TOWN,
    columns::POSTCODE,
    columns::COMPANY_CATEGORY,
];

/// Six census rows: a duplicate postcode, a postcode the geocoder cannot
/// resolve, a row without postcode and a row without company category.
pub fn business_census() -> Vec<RawRecord> {
    let rows: [[&str; 7]; 6] = [
        [
            "01234567",
            "25/12/2001",
            "10 downing street",
            "",
            "LONDON",
            "SW1A 1AA",
            "PRI/LTD BY GUAR/NSC (Private, limited by guarantee, no share capital)",
        ],
        ["02345678", "2010-01-31", "1 the mall", "", "LONDON", "sw1a1aa", "Private Unlimited"],
        [
            "03456789",
            "2015-06-01",
            "unit 4 brick lane",
            "shoreditch",
            "LONDON",
            "E1 6AN",
            "Private Unlimited",
        ],
        ["04567890", "2018-03-03", "nowhere", "", "LONDON", "ZZ1 1ZZ", "Private Unlimited"],
        ["05678901", "2019-09-09", "no postcode", "", "LONDON", "  ", "Private Unlimited"],
        ["06789012", "2020-02-02", "upper street", "", "LONDON", "N1 9GU", ""],
    ];
    rows.iter()
        .map(|row| record(&CENSUS_COLUMNS, row.iter().map(|v| text(v)).collect()))
        .collect()
}

pub fn postcode_areas() -> Vec<RawRecord> {
    let cols = [columns::AREA_POSTCODE, columns::AREA_DISTRICT, "lat"];
    vec![
        record(&cols, vec![text("SW1A 1AA"), text("E09000033"), text("51.5")]),
        record(&cols, vec![text("E1 6AN"), text("E09000030"), text("51.5")]),
        record(&cols, vec![text("E1  6AN"), text("E09000099"), text("51.5")]),
    ]
}

pub fn cultural_sites() -> Vec<RawRecord> {
    let cols = [
        columns::CULTURAL_VENUE_TYPE,
        columns::POSTCODE,
        columns::BOROUGH_CODE,
        columns::BOROUGH_NAME,
        "site_name",
    ];
    let rows = [
        ["Museums", "WC1B 3DG", "E09000007", "CAMDEN", "British Museum"],
        ["Museums", "wc1b 3dg", "E09000007", "camden", "Shop"],
        ["Theatres", "SW1A 1AA", "E09000033", "Westminster", "A"],
        ["Theatres", "SW1A 1AA", "E09000033", "City of Westminster", "B"],
        ["Pubs", "N1 9GU", "", "Islington", "C"],
    ];
    rows.iter()
        .map(|row| record(&cols, row.iter().map(|v| text(v)).collect()))
        .collect()
}

pub fn enriched_postcodes() -> Vec<RawRecord> {
    let cols = [columns::POSTCODE, columns::LATITUDE, columns::LONGITUDE];
    vec![
        record(&cols, vec![text("SW1A1AA"), text("51.5014"), text("-0.1419")]),
        record(&cols, vec![text("E16AN"), text("51.5202"), text("-0.0714")]),
    ]
}
