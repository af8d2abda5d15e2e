use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::common::error::Result;
use crate::domain::{Event, EventDetails, RunReport, RunStatus, UpsertOutcome};

/// Persistence boundary for canonical events and run reports.
///
/// Implementations are transactional at single-event granularity and
/// serialize concurrent upserts for the same `(source, ride_id)`.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Insert or reconcile by identity; see `merge_scraped` for the
    /// update rules. `updated_at` is touched only on effective change.
    async fn upsert_event(&self, event: &Event) -> Result<UpsertOutcome>;

    async fn get_event(&self, source: &str, ride_id: &str) -> Result<Option<Event>>;

    async fn get_event_by_id(&self, id: i64) -> Result<Option<Event>>;

    /// Events that have never been through a geocoding attempt.
    async fn list_for_geocoding(&self, limit: Option<usize>) -> Result<Vec<Event>>;

    /// Events due for a website/flyer re-check under the tiered cadence.
    async fn list_for_detail_enrichment(
        &self,
        now: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<Event>>;

    /// Geocoded events within `radius_mi` miles of the given point.
    async fn list_by_location(
        &self,
        latitude: f64,
        longitude: f64,
        radius_mi: f64,
    ) -> Result<Vec<Event>>;

    /// Record a geocoding attempt. Coordinates stay null for permanent
    /// failures; the attempted flag still flips so the batch moves on.
    async fn mark_geocoded(
        &self,
        id: i64,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<()>;

    /// Location changed out of band: drop coordinates and the attempted
    /// flag so the next geocoding pass picks the event up again.
    async fn reset_geocoding(&self, id: i64) -> Result<()>;

    /// Deep-merge `patch` into `event_details` (patch wins on conflict)
    /// and stamp `last_website_check_at`.
    async fn update_details(
        &self,
        id: i64,
        patch: &EventDetails,
        checked_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn insert_run_report(&self, report: &RunReport) -> Result<()>;

    /// Most-recent-first statuses for the degraded-run alert.
    async fn recent_run_statuses(&self, source: &str, limit: usize) -> Result<Vec<RunStatus>>;

    /// Start time of the most recent run, used to report (not replay)
    /// schedule gaps after a restart.
    async fn last_run_started_at(&self, source: &str) -> Result<Option<DateTime<Utc>>>;
}
