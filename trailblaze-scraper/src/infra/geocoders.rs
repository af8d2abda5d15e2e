use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use trailblaze_core::common::error::{Result, ScraperError};
use trailblaze_core::domain::geo::{valid_latitude, valid_longitude};

use crate::app::ports::{GeoPoint, Geocoder};

fn retriable(message: impl Into<String>) -> ScraperError {
    ScraperError::Geocoder {
        message: message.into(),
        permanent: false,
    }
}

fn permanent(message: impl Into<String>) -> ScraperError {
    ScraperError::Geocoder {
        message: message.into(),
        permanent: true,
    }
}

fn point(lat: f64, lng: f64) -> Result<Option<GeoPoint>> {
    if valid_latitude(lat) && valid_longitude(lng) {
        Ok(Some(GeoPoint {
            latitude: lat,
            longitude: lng,
        }))
    } else {
        Err(permanent(format!("coordinates out of range: {lat},{lng}")))
    }
}

/// OpenStreetMap Nominatim adapter. The service requires an identifying
/// User-Agent and tolerates at most one request per second; the shared
/// rate limiter upstream enforces the cadence.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    user_agent: String,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(client: reqwest::Client, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
            base_url: "https://nominatim.openstreetmap.org".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, query: &str, deadline: Duration) -> Result<Option<GeoPoint>> {
        debug!(query, "nominatim lookup");
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .header("User-Agent", &self.user_agent)
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    retriable(format!("nominatim timeout: {e}"))
                } else {
                    retriable(format!("nominatim transport: {e}"))
                }
            })?;

        let status = response.status().as_u16();
        if status == 429 || status >= 500 {
            return Err(retriable(format!("nominatim HTTP {status}")));
        }
        if status != 200 {
            return Err(permanent(format!("nominatim HTTP {status}")));
        }

        let results: Vec<Value> = response
            .json()
            .await
            .map_err(|e| permanent(format!("nominatim payload: {e}")))?;
        let Some(first) = results.first() else {
            return Ok(None);
        };

        let lat = first
            .get("lat")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<f64>().ok());
        let lng = first
            .get("lon")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<f64>().ok());
        match (lat, lng) {
            (Some(lat), Some(lng)) => point(lat, lng),
            _ => Err(permanent("nominatim result missing coordinates")),
        }
    }
}

/// Google Geocoding API adapter.
pub struct GoogleGeocoder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GoogleGeocoder {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: "https://maps.googleapis.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, query: &str, deadline: Duration) -> Result<Option<GeoPoint>> {
        debug!(query, "google geocode lookup");
        let response = self
            .client
            .get(format!("{}/maps/api/geocode/json", self.base_url))
            .query(&[("address", query), ("key", self.api_key.as_str())])
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| retriable(format!("google transport: {e}")))?;

        let http_status = response.status().as_u16();
        if http_status == 429 || http_status >= 500 {
            return Err(retriable(format!("google HTTP {http_status}")));
        }
        if http_status != 200 {
            return Err(permanent(format!("google HTTP {http_status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| permanent(format!("google payload: {e}")))?;
        let status = body.get("status").and_then(Value::as_str).unwrap_or("");

        match status {
            "OK" => {
                let location = body
                    .pointer("/results/0/geometry/location")
                    .ok_or_else(|| permanent("google response missing geometry"))?;
                let lat = location.get("lat").and_then(Value::as_f64);
                let lng = location.get("lng").and_then(Value::as_f64);
                match (lat, lng) {
                    (Some(lat), Some(lng)) => point(lat, lng),
                    _ => Err(permanent("google geometry missing coordinates")),
                }
            }
            "ZERO_RESULTS" => Ok(None),
            "OVER_QUERY_LIMIT" | "UNKNOWN_ERROR" => {
                Err(retriable(format!("google status {status}")))
            }
            other => {
                warn!(query, status = other, "google geocode rejected the request");
                Err(permanent(format!("google status {other}")))
            }
        }
    }
}
