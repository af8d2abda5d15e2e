use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::common::error::{Result, ScraperError};
use crate::domain::cadence::detail_check_eligible;
use crate::domain::geo::haversine_miles;
use crate::domain::{Event, EventDetails, RunReport, RunStatus, UpsertOutcome};
use crate::storage::merge::merge_scraped;
use crate::storage::traits::EventRepository;

/// Map-backed repository with the same upsert semantics as the database
/// implementation. Used by tests and local experiments.
#[derive(Default)]
pub struct InMemoryStorage {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    events: HashMap<(String, String), Event>,
    reports: Vec<RunReport>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn event_count(&self) -> usize {
        self.inner.lock().await.events.len()
    }

    pub async fn run_reports(&self) -> Vec<RunReport> {
        self.inner.lock().await.reports.clone()
    }
}

#[async_trait]
impl EventRepository for InMemoryStorage {
    async fn upsert_event(&self, event: &Event) -> Result<UpsertOutcome> {
        let mut inner = self.inner.lock().await;
        let key = (event.source.clone(), event.ride_id.clone());
        let now = Utc::now();
        match inner.events.get(&key) {
            None => {
                inner.next_id += 1;
                let mut stored = event.clone();
                stored.id = Some(inner.next_id);
                stored.created_at = now;
                stored.updated_at = now;
                inner.events.insert(key, stored);
                Ok(UpsertOutcome::Inserted)
            }
            Some(stored) => {
                let (mut merged, changed) = merge_scraped(stored, event);
                if !changed {
                    return Ok(UpsertOutcome::Unchanged);
                }
                merged.updated_at = now;
                inner.events.insert(key, merged);
                Ok(UpsertOutcome::Updated)
            }
        }
    }

    async fn get_event(&self, source: &str, ride_id: &str) -> Result<Option<Event>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .events
            .get(&(source.to_string(), ride_id.to_string()))
            .cloned())
    }

    async fn get_event_by_id(&self, id: i64) -> Result<Option<Event>> {
        let inner = self.inner.lock().await;
        Ok(inner.events.values().find(|e| e.id == Some(id)).cloned())
    }

    async fn list_for_geocoding(&self, limit: Option<usize>) -> Result<Vec<Event>> {
        let inner = self.inner.lock().await;
        let mut events: Vec<Event> = inner
            .events
            .values()
            .filter(|e| !e.geocoding_attempted)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.date_start);
        if let Some(n) = limit {
            events.truncate(n);
        }
        Ok(events)
    }

    async fn list_for_detail_enrichment(
        &self,
        now: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<Event>> {
        let inner = self.inner.lock().await;
        let mut events: Vec<Event> = inner
            .events
            .values()
            .filter(|e| detail_check_eligible(e, now))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.date_start);
        if let Some(n) = limit {
            events.truncate(n);
        }
        Ok(events)
    }

    async fn list_by_location(
        &self,
        latitude: f64,
        longitude: f64,
        radius_mi: f64,
    ) -> Result<Vec<Event>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .events
            .values()
            .filter(|e| match (e.latitude, e.longitude) {
                (Some(lat), Some(lng)) => {
                    haversine_miles(latitude, longitude, lat, lng) <= radius_mi
                }
                _ => false,
            })
            .cloned()
            .collect())
    }

    async fn mark_geocoded(
        &self,
        id: i64,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let event = inner
            .events
            .values_mut()
            .find(|e| e.id == Some(id))
            .ok_or_else(|| ScraperError::Repository(format!("no event with id {id}")))?;
        event.geocoding_attempted = true;
        event.latitude = latitude;
        event.longitude = longitude;
        event.updated_at = Utc::now();
        Ok(())
    }

    async fn reset_geocoding(&self, id: i64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let event = inner
            .events
            .values_mut()
            .find(|e| e.id == Some(id))
            .ok_or_else(|| ScraperError::Repository(format!("no event with id {id}")))?;
        event.geocoding_attempted = false;
        event.latitude = None;
        event.longitude = None;
        event.updated_at = Utc::now();
        Ok(())
    }

    async fn update_details(
        &self,
        id: i64,
        patch: &EventDetails,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let event = inner
            .events
            .values_mut()
            .find(|e| e.id == Some(id))
            .ok_or_else(|| ScraperError::Repository(format!("no event with id {id}")))?;
        event.event_details.deep_merge(patch, true);
        event.last_website_check_at = Some(checked_at);
        event.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_run_report(&self, report: &RunReport) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.reports.push(report.clone());
        Ok(())
    }

    async fn recent_run_statuses(&self, source: &str, limit: usize) -> Result<Vec<RunStatus>> {
        let inner = self.inner.lock().await;
        let mut reports: Vec<&RunReport> =
            inner.reports.iter().filter(|r| r.source == source).collect();
        reports.sort_by_key(|r| std::cmp::Reverse(r.started_at));
        Ok(reports.iter().take(limit).map(|r| r.status).collect())
    }

    async fn last_run_started_at(&self, source: &str) -> Result<Option<DateTime<Utc>>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .reports
            .iter()
            .filter(|r| r.source == source)
            .map(|r| r.started_at)
            .max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AERC_SOURCE;
    use chrono::NaiveDate;
    use serde_json::json;

    fn scraped_event(ride_id: &str) -> Event {
        let now = Utc::now();
        Event {
            id: None,
            source: AERC_SOURCE.to_string(),
            ride_id: ride_id.to_string(),
            name: "Old Pueblo".to_string(),
            description: None,
            date_start: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            date_end: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            location: "Sonoita, AZ".to_string(),
            city: Some("Sonoita".to_string()),
            state: Some("AZ".to_string()),
            country: Some("USA".to_string()),
            region: Some("SW".to_string()),
            organization: None,
            distances: Vec::new(),
            ride_manager: Some("Pat Smith".to_string()),
            manager_email: None,
            manager_phone: None,
            website_url: Some("https://oldpueblo.example.com".to_string()),
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

    #[tokio::test]
    async fn upsert_twice_is_idempotent() {
        let repo = InMemoryStorage::new();
        let event = scraped_event("12345");

        assert_eq!(
            repo.upsert_event(&event).await.unwrap(),
            UpsertOutcome::Inserted
        );
        let stored_first = repo.get_event(AERC_SOURCE, "12345").await.unwrap().unwrap();

        assert_eq!(
            repo.upsert_event(&event).await.unwrap(),
            UpsertOutcome::Unchanged
        );
        let stored_second = repo.get_event(AERC_SOURCE, "12345").await.unwrap().unwrap();
        assert_eq!(stored_first.updated_at, stored_second.updated_at);
    }

    #[tokio::test]
    async fn null_scrape_does_not_erase() {
        let repo = InMemoryStorage::new();
        let event = scraped_event("1");
        repo.upsert_event(&event).await.unwrap();

        let mut second = event.clone();
        second.ride_manager = None;
        assert_eq!(
            repo.upsert_event(&second).await.unwrap(),
            UpsertOutcome::Unchanged
        );
        let stored = repo.get_event(AERC_SOURCE, "1").await.unwrap().unwrap();
        assert_eq!(stored.ride_manager.as_deref(), Some("Pat Smith"));
    }

    #[tokio::test]
    async fn geocoding_lifecycle() {
        let repo = InMemoryStorage::new();
        repo.upsert_event(&scraped_event("9")).await.unwrap();
        let id = repo
            .get_event(AERC_SOURCE, "9")
            .await
            .unwrap()
            .unwrap()
            .id
            .unwrap();

        assert_eq!(repo.list_for_geocoding(None).await.unwrap().len(), 1);

        repo.mark_geocoded(id, Some(31.68), Some(-110.65)).await.unwrap();
        assert!(repo.list_for_geocoding(None).await.unwrap().is_empty());

        let near = repo.list_by_location(31.7, -110.6, 25.0).await.unwrap();
        assert_eq!(near.len(), 1);
        let far = repo.list_by_location(47.6, -122.3, 25.0).await.unwrap();
        assert!(far.is_empty());

        repo.reset_geocoding(id).await.unwrap();
        let stored = repo.get_event(AERC_SOURCE, "9").await.unwrap().unwrap();
        assert!(!stored.geocoding_attempted);
        assert!(stored.latitude.is_none());
    }

    #[tokio::test]
    async fn update_details_merges_and_stamps() {
        let repo = InMemoryStorage::new();
        repo.upsert_event(&scraped_event("5")).await.unwrap();
        let id = repo
            .get_event(AERC_SOURCE, "5")
            .await
            .unwrap()
            .unwrap()
            .id
            .unwrap();

        let mut patch = EventDetails::new();
        patch.insert("directions", json!("exit 302, follow signs"));
        let checked = Utc::now();
        repo.update_details(id, &patch, checked).await.unwrap();

        let stored = repo.get_event(AERC_SOURCE, "5").await.unwrap().unwrap();
        assert_eq!(
            stored.event_details.directions(),
            Some("exit 302, follow signs")
        );
        assert_eq!(stored.last_website_check_at, Some(checked));
    }
}
