use async_trait::async_trait;
use std::time::Duration;

use trailblaze_core::common::error::Result;
use trailblaze_core::domain::EventDetails;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Opaque geocoding capability. `Ok(None)` is a definitive not-found
/// (cacheable negative); retriable transport problems surface as
/// `ScraperError::Geocoder { permanent: false, .. }`.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, query: &str, deadline: Duration) -> Result<Option<GeoPoint>>;
}

/// Event context passed along with page text so the extractor can
/// disambiguate multi-event pages.
#[derive(Debug, Clone)]
pub struct ExtractionHints {
    pub name: String,
    pub date_start: String,
    pub location: String,
}

/// Opaque LLM-backed extraction capability: plain text in, structured
/// `event_details` patch out.
#[async_trait]
pub trait DetailExtractor: Send + Sync {
    async fn extract(
        &self,
        text: &str,
        hints: &ExtractionHints,
        deadline: Duration,
    ) -> Result<EventDetails>;
}
