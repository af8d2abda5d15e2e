use chrono::{DateTime, NaiveDate, Utc};
use libsql::Row;

use crate::common::error::{Result, ScraperError};
use crate::domain::{ControlJudge, Distance, Event, EventDetails};

/// Column order shared by every event SELECT; `event_from_row` indexes
/// into rows positionally against this list.
pub const EVENT_COLUMNS: &str = "id, source, ride_id, name, description, date_start, date_end, \
     location, city, state, country, region, organization, distances, ride_manager, \
     manager_email, manager_phone, website_url, flyer_url, map_link, control_judges, \
     is_multi_day_event, is_pioneer_ride, ride_days, has_intro_ride, is_canceled, \
     latitude, longitude, geocoding_attempted, last_website_check_at, event_details, \
     notes, created_at, updated_at";

fn repo_err(e: impl std::fmt::Display) -> ScraperError {
    ScraperError::Repository(e.to_string())
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(repo_err)
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(repo_err)
}

pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}

pub fn event_from_row(row: &Row) -> Result<Event> {
    let distances_json: String = row.get(13).map_err(repo_err)?;
    let judges_json: String = row.get(20).map_err(repo_err)?;
    let details_json: String = row.get(30).map_err(repo_err)?;

    let distances: Vec<Distance> = serde_json::from_str(&distances_json)?;
    let control_judges: Vec<ControlJudge> = serde_json::from_str(&judges_json)?;
    let event_details: EventDetails = serde_json::from_str(&details_json)?;

    let date_start: String = row.get(5).map_err(repo_err)?;
    let date_end: String = row.get(6).map_err(repo_err)?;
    let last_check: Option<String> = row.get(29).map_err(repo_err)?;
    let created_at: String = row.get(32).map_err(repo_err)?;
    let updated_at: String = row.get(33).map_err(repo_err)?;

    Ok(Event {
        id: row.get(0).map_err(repo_err)?,
        source: row.get(1).map_err(repo_err)?,
        ride_id: row.get(2).map_err(repo_err)?,
        name: row.get(3).map_err(repo_err)?,
        description: row.get(4).map_err(repo_err)?,
        date_start: parse_date(&date_start)?,
        date_end: parse_date(&date_end)?,
        location: row.get(7).map_err(repo_err)?,
        city: row.get(8).map_err(repo_err)?,
        state: row.get(9).map_err(repo_err)?,
        country: row.get(10).map_err(repo_err)?,
        region: row.get(11).map_err(repo_err)?,
        organization: row.get(12).map_err(repo_err)?,
        distances,
        ride_manager: row.get(14).map_err(repo_err)?,
        manager_email: row.get(15).map_err(repo_err)?,
        manager_phone: row.get(16).map_err(repo_err)?,
        website_url: row.get(17).map_err(repo_err)?,
        flyer_url: row.get(18).map_err(repo_err)?,
        map_link: row.get(19).map_err(repo_err)?,
        control_judges,
        is_multi_day_event: row.get::<i64>(21).map_err(repo_err)? != 0,
        is_pioneer_ride: row.get::<i64>(22).map_err(repo_err)? != 0,
        ride_days: row.get(23).map_err(repo_err)?,
        has_intro_ride: row.get::<i64>(24).map_err(repo_err)? != 0,
        is_canceled: row.get::<i64>(25).map_err(repo_err)? != 0,
        latitude: row.get(26).map_err(repo_err)?,
        longitude: row.get(27).map_err(repo_err)?,
        geocoding_attempted: row.get::<i64>(28).map_err(repo_err)? != 0,
        last_website_check_at: last_check.as_deref().map(parse_timestamp).transpose()?,
        event_details,
        notes: row.get(31).map_err(repo_err)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

pub fn distances_json(event: &Event) -> Result<String> {
    serde_json::to_string(&event.distances).map_err(Into::into)
}

pub fn judges_json(event: &Event) -> Result<String> {
    serde_json::to_string(&event.control_judges).map_err(Into::into)
}

pub fn details_json(event: &Event) -> Result<String> {
    serde_json::to_string(&event.event_details).map_err(Into::into)
}
