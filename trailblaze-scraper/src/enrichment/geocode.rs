use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use trailblaze_core::common::error::{Result, ScraperError};
use trailblaze_core::domain::Event;
use trailblaze_core::storage::EventRepository;

use crate::app::ports::Geocoder;
use crate::observability::MetricsSink;
use crate::pipeline::ingestion::cache::GeocodeCache;
use crate::pipeline::CancelFlag;

/// Queue message from the read side: an event's location was edited, so
/// its geocoding state must start over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentTrigger {
    pub event_id: i64,
    pub kind: TriggerKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    LocationChanged,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GeocodeStats {
    pub processed: u64,
    pub geocoded: u64,
    pub unknown: u64,
    pub failed: u64,
}

/// Fills coordinates for events that have never been through an
/// attempt, and re-runs single events when their location changes.
pub struct GeocodeWorker {
    repo: Arc<dyn EventRepository>,
    geocoder: Arc<dyn Geocoder>,
    cache: GeocodeCache,
    metrics: Arc<MetricsSink>,
    max_retries: u32,
    base_delay: Duration,
    call_deadline: Duration,
}

impl GeocodeWorker {
    pub fn new(
        repo: Arc<dyn EventRepository>,
        geocoder: Arc<dyn Geocoder>,
        cache: GeocodeCache,
        metrics: Arc<MetricsSink>,
        max_retries: u32,
        base_delay: Duration,
        call_deadline: Duration,
    ) -> Self {
        Self {
            repo,
            geocoder,
            cache,
            metrics,
            max_retries,
            base_delay,
            call_deadline,
        }
    }

    /// Light canonicalization: structured address fields when present,
    /// free-text location otherwise, whitespace collapsed and lowercased
    /// so cache keys line up across runs.
    pub fn build_query(event: &Event) -> String {
        let mut parts: Vec<String> = Vec::new();
        match (&event.city, &event.state) {
            (Some(city), Some(state)) => {
                parts.push(city.clone());
                parts.push(state.clone());
                if let Some(country) = &event.country {
                    parts.push(country.clone());
                }
            }
            _ => parts.push(event.location.clone()),
        }
        parts
            .join(", ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    pub async fn run_batch(&self, limit: Option<usize>) -> Result<GeocodeStats> {
        let targets = self.repo.list_for_geocoding(limit).await?;
        info!(targets = targets.len(), "starting geocode batch");

        let mut stats = GeocodeStats::default();
        for event in &targets {
            stats.processed += 1;
            match self.geocode_event(event).await {
                Ok(Some(_)) => stats.geocoded += 1,
                Ok(None) => stats.unknown += 1,
                Err(e) => {
                    stats.failed += 1;
                    warn!(
                        ride_id = %event.ride_id,
                        code = e.code(),
                        "geocoding left for the next batch: {e}"
                    );
                }
            }
        }

        self.metrics.incr("geocode_processed", stats.processed);
        self.metrics.incr("geocode_success", stats.geocoded);
        self.metrics.incr("geocode_unknown", stats.unknown);
        self.metrics.incr("geocode_failed", stats.failed);
        info!(?stats, "geocode batch finished");
        Ok(stats)
    }

    /// One event through the provider discipline. `Ok(Some(point))`
    /// geocoded, `Ok(None)` attempted-unknown; a retriable-exhausted
    /// error leaves the attempted flag untouched for the next batch.
    async fn geocode_event(&self, event: &Event) -> Result<Option<(f64, f64)>> {
        let id = event
            .id
            .ok_or_else(|| ScraperError::Repository("event without id in geocode batch".into()))?;
        let query = Self::build_query(event);
        if query.is_empty() {
            self.repo.mark_geocoded(id, None, None).await?;
            return Ok(None);
        }

        if let Some(cached) = self.cache.get(&query) {
            self.metrics.incr("geocode_cache_hits", 1);
            self.repo
                .mark_geocoded(id, cached.map(|c| c.0), cached.map(|c| c.1))
                .await?;
            return Ok(cached);
        }

        let mut attempt: u32 = 0;
        loop {
            match self.geocoder.geocode(&query, self.call_deadline).await {
                Ok(Some(point)) => {
                    self.cache
                        .put(&query, Some((point.latitude, point.longitude)))?;
                    self.repo
                        .mark_geocoded(id, Some(point.latitude), Some(point.longitude))
                        .await?;
                    return Ok(Some((point.latitude, point.longitude)));
                }
                Ok(None) => {
                    // definitive not-found: attempted, coordinates stay
                    // null, the read side renders "approximate"
                    self.cache.put(&query, None)?;
                    self.repo.mark_geocoded(id, None, None).await?;
                    return Ok(None);
                }
                Err(ScraperError::Geocoder {
                    message,
                    permanent: true,
                }) => {
                    warn!(query = %query, "permanent geocoder failure: {message}");
                    self.repo.mark_geocoded(id, None, None).await?;
                    return Ok(None);
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.base_delay * 2u32.pow(attempt - 1);
                    warn!(query = %query, attempt, "retriable geocoder failure, backing off: {e}");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// On-demand path for the location-changed hook: drop the previous
    /// attempt state, then geocode fresh.
    pub async fn handle_location_changed(&self, event_id: i64) -> Result<()> {
        self.repo.reset_geocoding(event_id).await?;
        let event = self
            .repo
            .get_event_by_id(event_id)
            .await?
            .ok_or_else(|| ScraperError::Repository(format!("no event with id {event_id}")))?;
        match self.geocode_event(&event).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(event_id, code = e.code(), "on-demand geocode failed: {e}");
                Ok(())
            }
        }
    }

    /// Consume the external trigger queue until it closes or the flag
    /// cancels. Runs alongside the scheduled batches.
    pub async fn consume_triggers(
        &self,
        mut rx: mpsc::Receiver<EnrichmentTrigger>,
        cancel: CancelFlag,
    ) {
        while let Some(trigger) = rx.recv().await {
            if cancel.is_cancelled() {
                return;
            }
            match trigger.kind {
                TriggerKind::LocationChanged => {
                    self.metrics.incr("geocode_triggers", 1);
                    if let Err(e) = self.handle_location_changed(trigger.event_id).await {
                        warn!(event_id = trigger.event_id, "trigger handling failed: {e}");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::GeoPoint;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::tempdir;
    use trailblaze_core::domain::{EventDetails, AERC_SOURCE};
    use trailblaze_core::storage::InMemoryStorage;

    struct ScriptedGeocoder {
        calls: AtomicU32,
        script: Vec<Result<Option<GeoPoint>>>,
    }

    impl ScriptedGeocoder {
        fn new(script: Vec<Result<Option<GeoPoint>>>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                script,
            }
        }
    }

    #[async_trait]
    impl Geocoder for ScriptedGeocoder {
        async fn geocode(&self, _query: &str, _deadline: Duration) -> Result<Option<GeoPoint>> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.script.get(i.min(self.script.len() - 1)).unwrap() {
                Ok(v) => Ok(*v),
                Err(ScraperError::Geocoder { message, permanent }) => Err(ScraperError::Geocoder {
                    message: message.clone(),
                    permanent: *permanent,
                }),
                Err(_) => unreachable!(),
            }
        }
    }

    fn event(ride_id: &str) -> Event {
        let now = Utc::now();
        Event {
            id: None,
            source: AERC_SOURCE.to_string(),
            ride_id: ride_id.to_string(),
            name: "Geo Ride".to_string(),
            description: None,
            date_start: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            date_end: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            location: "Sonoita, AZ".to_string(),
            city: Some("Sonoita".to_string()),
            state: Some("AZ".to_string()),
            country: Some("USA".to_string()),
            region: None,
            organization: None,
            distances: Vec::new(),
            ride_manager: None,
            manager_email: None,
            manager_phone: None,
            website_url: None,
            flyer_url: None,
            map_link: None,
            control_judges: Vec::new(),
            is_multi_day_event: false,
            is_pioneer_ride: false,
            ride_days: 1,
            has_intro_ride: false,
            is_canceled: false,
            latitude: None,
            longitude: None,
            geocoding_attempted: false,
            last_website_check_at: None,
            event_details: EventDetails::new(),
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn worker(
        repo: Arc<InMemoryStorage>,
        geocoder: Arc<dyn Geocoder>,
        dir: &std::path::Path,
    ) -> GeocodeWorker {
        GeocodeWorker::new(
            repo,
            geocoder,
            GeocodeCache::new(dir, Duration::from_secs(600), Duration::from_secs(600)).unwrap(),
            Arc::new(MetricsSink::new()),
            2,
            Duration::from_millis(1),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn batch_geocodes_and_marks_attempted() {
        let repo = Arc::new(InMemoryStorage::new());
        repo.upsert_event(&event("1")).await.unwrap();

        let geocoder = Arc::new(ScriptedGeocoder::new(vec![Ok(Some(GeoPoint {
            latitude: 31.68,
            longitude: -110.65,
        }))]));
        let dir = tempdir().unwrap();
        let worker = worker(Arc::clone(&repo), geocoder, dir.path());

        let stats = worker.run_batch(None).await.unwrap();
        assert_eq!(stats.geocoded, 1);

        let stored = repo.get_event(AERC_SOURCE, "1").await.unwrap().unwrap();
        assert!(stored.geocoding_attempted);
        assert_eq!(stored.latitude, Some(31.68));
    }

    #[tokio::test]
    async fn not_found_marks_attempted_with_null_coordinates() {
        let repo = Arc::new(InMemoryStorage::new());
        repo.upsert_event(&event("2")).await.unwrap();

        let geocoder = Arc::new(ScriptedGeocoder::new(vec![Ok(None)]));
        let dir = tempdir().unwrap();
        let worker = worker(Arc::clone(&repo), geocoder, dir.path());

        let stats = worker.run_batch(None).await.unwrap();
        assert_eq!(stats.unknown, 1);

        let stored = repo.get_event(AERC_SOURCE, "2").await.unwrap().unwrap();
        assert!(stored.geocoding_attempted);
        assert!(stored.latitude.is_none());
        assert!(stored.validate().is_ok());
    }

    #[tokio::test]
    async fn retriable_exhaustion_leaves_unattempted() {
        let repo = Arc::new(InMemoryStorage::new());
        repo.upsert_event(&event("3")).await.unwrap();

        let geocoder = Arc::new(ScriptedGeocoder::new(vec![Err(ScraperError::Geocoder {
            message: "timeout".to_string(),
            permanent: false,
        })]));
        let dir = tempdir().unwrap();
        let worker = worker(Arc::clone(&repo), geocoder, dir.path());

        let stats = worker.run_batch(None).await.unwrap();
        assert_eq!(stats.failed, 1);

        // next batch still sees the event
        let stored = repo.get_event(AERC_SOURCE, "3").await.unwrap().unwrap();
        assert!(!stored.geocoding_attempted);
        assert_eq!(repo.list_for_geocoding(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retry_then_success() {
        let repo = Arc::new(InMemoryStorage::new());
        repo.upsert_event(&event("4")).await.unwrap();

        let geocoder = Arc::new(ScriptedGeocoder::new(vec![
            Err(ScraperError::Geocoder {
                message: "hiccup".to_string(),
                permanent: false,
            }),
            Ok(Some(GeoPoint {
                latitude: 31.0,
                longitude: -110.0,
            })),
        ]));
        let dir = tempdir().unwrap();
        let worker = worker(Arc::clone(&repo), geocoder, dir.path());

        let stats = worker.run_batch(None).await.unwrap();
        assert_eq!(stats.geocoded, 1);
    }

    #[tokio::test]
    async fn cache_short_circuits_the_provider() {
        let repo = Arc::new(InMemoryStorage::new());
        repo.upsert_event(&event("5")).await.unwrap();
        repo.upsert_event(&event("6")).await.unwrap();

        let geocoder = Arc::new(ScriptedGeocoder::new(vec![Ok(Some(GeoPoint {
            latitude: 31.68,
            longitude: -110.65,
        }))]));
        let dir = tempdir().unwrap();
        let worker = worker(Arc::clone(&repo), Arc::clone(&geocoder) as Arc<dyn Geocoder>, dir.path());

        // both events share the same query, so one provider call suffices
        let stats = worker.run_batch(None).await.unwrap();
        assert_eq!(stats.geocoded, 2);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn location_change_trigger_resets_and_reruns() {
        let repo = Arc::new(InMemoryStorage::new());
        repo.upsert_event(&event("7")).await.unwrap();
        let id = repo
            .get_event(AERC_SOURCE, "7")
            .await
            .unwrap()
            .unwrap()
            .id
            .unwrap();
        repo.mark_geocoded(id, Some(1.0), Some(2.0)).await.unwrap();

        let geocoder = Arc::new(ScriptedGeocoder::new(vec![Ok(Some(GeoPoint {
            latitude: 31.68,
            longitude: -110.65,
        }))]));
        let dir = tempdir().unwrap();
        let worker = worker(Arc::clone(&repo), geocoder, dir.path());

        let (tx, rx) = mpsc::channel(4);
        tx.send(EnrichmentTrigger {
            event_id: id,
            kind: TriggerKind::LocationChanged,
        })
        .await
        .unwrap();
        drop(tx);
        worker.consume_triggers(rx, CancelFlag::new()).await;

        let stored = repo.get_event(AERC_SOURCE, "7").await.unwrap().unwrap();
        assert!(stored.geocoding_attempted);
        assert_eq!(stored.latitude, Some(31.68));
    }

    #[test]
    fn query_canonicalization() {
        let mut e = event("8");
        assert_eq!(GeocodeWorker::build_query(&e), "sonoita, az, usa");
        e.city = None;
        e.location = "  Empire   Ranch,  Sonoita, AZ ".to_string();
        assert_eq!(
            GeocodeWorker::build_query(&e),
            "empire ranch, sonoita, az"
        );
    }
}
