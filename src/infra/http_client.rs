use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value as Json;
use std::time::Duration;

use crate::app::ports::GeocodePort;
use crate::domain::{GeoPoint, PostcodeKey};
use crate::error::{EnrichmentFailure, Result};

/// Geocode service client: `GET {base_url}/postcode/{code}`.
pub struct ReqwestGeocoder {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestGeocoder {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("london_etl/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, postcode: &PostcodeKey) -> String {
        format!("{}/postcode/{}", self.base_url, postcode)
    }
}

#[async_trait]
impl GeocodePort for ReqwestGeocoder {
    async fn locate(
        &self,
        postcode: &PostcodeKey,
    ) -> std::result::Result<GeoPoint, EnrichmentFailure> {
        let resp = self
            .client
            .get(self.url_for(postcode))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EnrichmentFailure::Timeout
                } else {
                    EnrichmentFailure::Transport(e.to_string())
                }
            })?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| EnrichmentFailure::Transport(e.to_string()))?;
        parse_geocode_response(status, &body)
    }
}

/// Interprets one geocode response. Anything but a 2xx body carrying
/// numeric `data.latitude` and `data.longitude` is a failure.
pub fn parse_geocode_response(
    status: StatusCode,
    body: &[u8],
) -> std::result::Result<GeoPoint, EnrichmentFailure> {
    if !status.is_success() {
        return Err(EnrichmentFailure::Status(status.as_u16()));
    }
    let json: Json =
        serde_json::from_slice(body).map_err(|e| EnrichmentFailure::Malformed(e.to_string()))?;
    let data = json.get("data").ok_or(EnrichmentFailure::MissingFields)?;
    let latitude = coordinate_field(data, "latitude")?;
    let longitude = coordinate_field(data, "longitude")?;
    Ok(GeoPoint { latitude, longitude })
}

// The service sends numbers as JSON strings; empty strings mean unknown.
fn coordinate_field(data: &Json, field: &str) -> std::result::Result<f64, EnrichmentFailure> {
    match data.get(field) {
        Some(Json::Number(n)) => n.as_f64().ok_or_else(|| {
            EnrichmentFailure::Malformed(format!("{} is not a finite number", field))
        }),
        Some(Json::String(s)) if s.trim().is_empty() => Err(EnrichmentFailure::MissingFields),
        Some(Json::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| EnrichmentFailure::Malformed(format!("{} = '{}'", field, s))),
        None | Some(Json::Null) => Err(EnrichmentFailure::MissingFields),
        Some(other) => Err(EnrichmentFailure::Malformed(format!("{} = {}", field, other))),
    }
}
