use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use libsql::{params, Connection};
use std::time::Duration;
use tracing::{debug, warn};

use crate::common::error::{Result, ScraperError};
use crate::database::DatabaseManager;
use crate::domain::cadence::{detail_check_eligible, PAST_GRACE_DAYS};
use crate::domain::geo::haversine_miles;
use crate::domain::{Event, EventDetails, RunReport, RunStatus, UpsertOutcome};
use crate::storage::merge::merge_scraped;
use crate::storage::serialization::{
    details_json, distances_json, event_from_row, format_timestamp, judges_json, EVENT_COLUMNS,
};
use crate::storage::traits::EventRepository;

/// How many times a contended write is retried before the upsert fails.
const WRITE_RETRIES: u32 = 3;

fn repo_err(e: impl std::fmt::Display) -> ScraperError {
    ScraperError::Repository(e.to_string())
}

/// libsql-backed repository. SQLite's single-writer model provides the
/// row-level serialization the upsert contract requires.
pub struct DatabaseStorage {
    conn: Connection,
}

impl DatabaseStorage {
    pub fn new(manager: &DatabaseManager) -> Result<Self> {
        Ok(Self {
            conn: manager.get_connection()?,
        })
    }

    async fn query_one(&self, sql: &str, p: impl libsql::params::IntoParams) -> Result<Option<Event>> {
        let mut rows = self.conn.query(sql, p).await.map_err(repo_err)?;
        match rows.next().await.map_err(repo_err)? {
            Some(row) => Ok(Some(event_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn query_many(&self, sql: &str, p: impl libsql::params::IntoParams) -> Result<Vec<Event>> {
        let mut rows = self.conn.query(sql, p).await.map_err(repo_err)?;
        let mut events = Vec::new();
        while let Some(row) = rows.next().await.map_err(repo_err)? {
            events.push(event_from_row(&row)?);
        }
        Ok(events)
    }

    async fn insert_event(&self, event: &Event, now: DateTime<Utc>) -> Result<()> {
        let sql = "INSERT INTO events (source, ride_id, name, description, date_start, date_end, \
             location, city, state, country, region, organization, distances, ride_manager, \
             manager_email, manager_phone, website_url, flyer_url, map_link, control_judges, \
             is_multi_day_event, is_pioneer_ride, ride_days, has_intro_ride, is_canceled, \
             latitude, longitude, geocoding_attempted, last_website_check_at, event_details, \
             notes, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
             ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31, ?32, ?33)";
        self.conn
            .execute(
                sql,
                params![
                    event.source.clone(),
                    event.ride_id.clone(),
                    event.name.clone(),
                    event.description.clone(),
                    event.date_start.to_string(),
                    event.date_end.to_string(),
                    event.location.clone(),
                    event.city.clone(),
                    event.state.clone(),
                    event.country.clone(),
                    event.region.clone(),
                    event.organization.clone(),
                    distances_json(event)?,
                    event.ride_manager.clone(),
                    event.manager_email.clone(),
                    event.manager_phone.clone(),
                    event.website_url.clone(),
                    event.flyer_url.clone(),
                    event.map_link.clone(),
                    judges_json(event)?,
                    event.is_multi_day_event as i64,
                    event.is_pioneer_ride as i64,
                    event.ride_days,
                    event.has_intro_ride as i64,
                    event.is_canceled as i64,
                    event.latitude,
                    event.longitude,
                    event.geocoding_attempted as i64,
                    event.last_website_check_at.map(format_timestamp),
                    details_json(event)?,
                    event.notes.clone(),
                    format_timestamp(now),
                    format_timestamp(now),
                ],
            )
            .await
            .map_err(repo_err)?;
        Ok(())
    }

    async fn update_event(&self, id: i64, event: &Event, now: DateTime<Utc>) -> Result<()> {
        let sql = "UPDATE events SET name = ?1, description = ?2, date_start = ?3, date_end = ?4, \
             location = ?5, city = ?6, state = ?7, country = ?8, region = ?9, organization = ?10, \
             distances = ?11, ride_manager = ?12, manager_email = ?13, manager_phone = ?14, \
             website_url = ?15, flyer_url = ?16, map_link = ?17, control_judges = ?18, \
             is_multi_day_event = ?19, is_pioneer_ride = ?20, ride_days = ?21, \
             has_intro_ride = ?22, is_canceled = ?23, latitude = ?24, longitude = ?25, \
             geocoding_attempted = ?26, event_details = ?27, notes = ?28, updated_at = ?29 \
             WHERE id = ?30";
        self.conn
            .execute(
                sql,
                params![
                    event.name.clone(),
                    event.description.clone(),
                    event.date_start.to_string(),
                    event.date_end.to_string(),
                    event.location.clone(),
                    event.city.clone(),
                    event.state.clone(),
                    event.country.clone(),
                    event.region.clone(),
                    event.organization.clone(),
                    distances_json(event)?,
                    event.ride_manager.clone(),
                    event.manager_email.clone(),
                    event.manager_phone.clone(),
                    event.website_url.clone(),
                    event.flyer_url.clone(),
                    event.map_link.clone(),
                    judges_json(event)?,
                    event.is_multi_day_event as i64,
                    event.is_pioneer_ride as i64,
                    event.ride_days,
                    event.has_intro_ride as i64,
                    event.is_canceled as i64,
                    event.latitude,
                    event.longitude,
                    event.geocoding_attempted as i64,
                    details_json(event)?,
                    event.notes.clone(),
                    format_timestamp(now),
                    id,
                ],
            )
            .await
            .map_err(repo_err)?;
        Ok(())
    }

    async fn upsert_once(&self, event: &Event) -> Result<UpsertOutcome> {
        let now = Utc::now();
        match self.get_event(&event.source, &event.ride_id).await? {
            None => {
                self.insert_event(event, now).await?;
                Ok(UpsertOutcome::Inserted)
            }
            Some(stored) => {
                let (merged, changed) = merge_scraped(&stored, event);
                if !changed {
                    debug!(
                        source = %event.source,
                        ride_id = %event.ride_id,
                        "upsert produced no effective change"
                    );
                    return Ok(UpsertOutcome::Unchanged);
                }
                let id = stored
                    .id
                    .ok_or_else(|| ScraperError::Repository("stored event missing id".into()))?;
                self.update_event(id, &merged, now).await?;
                Ok(UpsertOutcome::Updated)
            }
        }
    }
}

#[async_trait]
impl EventRepository for DatabaseStorage {
    async fn upsert_event(&self, event: &Event) -> Result<UpsertOutcome> {
        let mut attempt = 0;
        loop {
            match self.upsert_once(event).await {
                Err(ScraperError::Repository(msg))
                    if attempt < WRITE_RETRIES
                        && (msg.contains("locked") || msg.contains("busy")) =>
                {
                    attempt += 1;
                    warn!(
                        ride_id = %event.ride_id,
                        attempt,
                        "store contention on upsert, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                }
                other => return other,
            }
        }
    }

    async fn get_event(&self, source: &str, ride_id: &str) -> Result<Option<Event>> {
        let sql =
            format!("SELECT {EVENT_COLUMNS} FROM events WHERE source = ?1 AND ride_id = ?2");
        self.query_one(&sql, params![source, ride_id]).await
    }

    async fn get_event_by_id(&self, id: i64) -> Result<Option<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1");
        self.query_one(&sql, params![id]).await
    }

    async fn list_for_geocoding(&self, limit: Option<usize>) -> Result<Vec<Event>> {
        let limit = limit.map(|n| n as i64).unwrap_or(-1);
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE geocoding_attempted = 0 \
             ORDER BY date_start LIMIT ?1"
        );
        self.query_many(&sql, params![limit]).await
    }

    async fn list_for_detail_enrichment(
        &self,
        now: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<Event>> {
        // The date window prunes in SQL; the tier intervals are applied
        // in code so the cadence logic lives in one place.
        let cutoff = (now.date_naive() - ChronoDuration::days(PAST_GRACE_DAYS)).to_string();
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE (website_url IS NOT NULL OR flyer_url IS NOT NULL) AND date_end >= ?1 \
             ORDER BY date_start"
        );
        let mut events: Vec<Event> = self
            .query_many(&sql, params![cutoff])
            .await?
            .into_iter()
            .filter(|e| detail_check_eligible(e, now))
            .collect();
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
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE latitude IS NOT NULL AND longitude IS NOT NULL"
        );
        let events = self.query_many(&sql, params![]).await?;
        Ok(events
            .into_iter()
            .filter(|e| match (e.latitude, e.longitude) {
                (Some(lat), Some(lng)) => {
                    haversine_miles(latitude, longitude, lat, lng) <= radius_mi
                }
                _ => false,
            })
            .collect())
    }

    async fn mark_geocoded(
        &self,
        id: i64,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE events SET geocoding_attempted = 1, latitude = ?1, longitude = ?2, \
                 updated_at = ?3 WHERE id = ?4",
                params![latitude, longitude, format_timestamp(Utc::now()), id],
            )
            .await
            .map_err(repo_err)?;
        Ok(())
    }

    async fn reset_geocoding(&self, id: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE events SET geocoding_attempted = 0, latitude = NULL, longitude = NULL, \
                 updated_at = ?1 WHERE id = ?2",
                params![format_timestamp(Utc::now()), id],
            )
            .await
            .map_err(repo_err)?;
        Ok(())
    }

    async fn update_details(
        &self,
        id: i64,
        patch: &EventDetails,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        let stored = self
            .get_event_by_id(id)
            .await?
            .ok_or_else(|| ScraperError::Repository(format!("no event with id {id}")))?;

        let mut details = stored.event_details.clone();
        let conflicts = details.deep_merge(patch, true);
        for path in &conflicts {
            debug!(id, key = %path, "event_details conflict resolved in favor of enrichment");
        }

        self.conn
            .execute(
                "UPDATE events SET event_details = ?1, last_website_check_at = ?2, \
                 updated_at = ?3 WHERE id = ?4",
                params![
                    serde_json::to_string(&details)?,
                    format_timestamp(checked_at),
                    format_timestamp(Utc::now()),
                    id,
                ],
            )
            .await
            .map_err(repo_err)?;
        Ok(())
    }

    async fn insert_run_report(&self, report: &RunReport) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO run_reports (run_id, source, started_at, ended_at, status, counts, errors) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    report.run_id.to_string(),
                    report.source.clone(),
                    format_timestamp(report.started_at),
                    report.ended_at.map(format_timestamp),
                    report.status.as_str(),
                    serde_json::to_string(&report.counts)?,
                    serde_json::to_string(&report.errors)?,
                ],
            )
            .await
            .map_err(repo_err)?;
        Ok(())
    }

    async fn recent_run_statuses(&self, source: &str, limit: usize) -> Result<Vec<RunStatus>> {
        let mut rows = self
            .conn
            .query(
                "SELECT status FROM run_reports WHERE source = ?1 \
                 ORDER BY started_at DESC LIMIT ?2",
                params![source, limit as i64],
            )
            .await
            .map_err(repo_err)?;
        let mut statuses = Vec::new();
        while let Some(row) = rows.next().await.map_err(repo_err)? {
            let raw: String = row.get(0).map_err(repo_err)?;
            if let Some(status) = RunStatus::parse(&raw) {
                statuses.push(status);
            }
        }
        Ok(statuses)
    }

    async fn last_run_started_at(
        &self,
        source: &str,
    ) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT started_at FROM run_reports WHERE source = ?1 \
                 ORDER BY started_at DESC LIMIT 1",
                params![source],
            )
            .await
            .map_err(repo_err)?;
        match rows.next().await.map_err(repo_err)? {
            Some(row) => {
                let raw: String = row.get(0).map_err(repo_err)?;
                Ok(Some(
                    crate::storage::serialization::parse_timestamp(&raw)?,
                ))
            }
            None => Ok(None),
        }
    }
}
