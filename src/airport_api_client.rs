use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::airports::AirportReference;
use crate::errors::{DepartureError, Result};

pub const DEFAULT_AIRPORT_API_URL: &str = "https://api.api-ninjas.com/v1/airports";

/// Source of airport reference facts, one lookup per identifier
#[async_trait]
pub trait AirportMetadataSource: Send + Sync {
    async fn fetch_airport(&self, icao: &str) -> Result<AirportReference>;
}

/// Single airport record from the metadata API
#[derive(Debug, Deserialize)]
pub struct AirportApiRecord {
    pub icao: String,
    #[serde(default)]
    pub iata: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_ft: i32,
}

/// Parse a metadata API response body into a reference for `icao`.
///
/// The API answers with a JSON array; only the first element is used.
pub fn parse_airport_response(icao: &str, body: &str) -> Result<AirportReference> {
    let records: Vec<AirportApiRecord> = serde_json::from_str(body).map_err(|e| {
        DepartureError::reference_unavailable(icao, format!("unparseable response: {}", e))
    })?;

    let Some(record) = records.into_iter().next() else {
        return Err(DepartureError::reference_unavailable(
            icao,
            "metadata API returned no results",
        ));
    };

    debug!(
        "Airport {} resolved to {:?} ({:?}) at {:.4}, {:.4}",
        icao, record.name, record.country, record.latitude, record.longitude
    );

    let identifier = if record.icao.trim().is_empty() {
        icao
    } else {
        record.icao.as_str()
    };
    AirportReference::new(identifier, record.latitude, record.longitude, record.elevation_ft)
}

/// HTTP client for the airport metadata API, authenticated with an `X-Api-Key` header
pub struct AirportApiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl AirportApiClient {
    pub fn new(base_url: String, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        if api_key.is_none() {
            warn!("No airport API key configured, metadata lookups will likely be rejected");
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("busy-airports/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }
}

#[async_trait]
impl AirportMetadataSource for AirportApiClient {
    async fn fetch_airport(&self, icao: &str) -> Result<AirportReference> {
        debug!("Fetching airport metadata for {}", icao);

        let mut request = self.client.get(&self.base_url).query(&[("icao", icao)]);
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DepartureError::reference_unavailable(
                icao,
                format!(
                    "metadata API error {}: {}",
                    status,
                    body.chars().take(200).collect::<String>()
                ),
            ));
        }

        let body = response.text().await?;
        parse_airport_response(icao, &body)
    }
}
