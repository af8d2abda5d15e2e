use tracing::debug;

use crate::domain::Event;

/// Reconcile a freshly scraped event against the stored row.
///
/// Rules (applied field by field):
/// - a null scraped value never overwrites a stored non-null value;
/// - non-empty scraped collections replace stored ones;
/// - `event_details` deep-merges with the scraped value winning on
///   scalar conflict;
/// - scraped cancellation state wins (a clean observation un-cancels);
/// - enrichment-owned state (`geocoding_attempted`, coordinates,
///   `last_website_check_at`) is kept unless the scrape itself carried
///   coordinates from a map link.
///
/// Returns the merged event and whether anything effectively changed;
/// callers only touch `updated_at` when it did.
pub fn merge_scraped(stored: &Event, scraped: &Event) -> (Event, bool) {
    let mut merged = stored.clone();

    merged.name = scraped.name.clone();
    merged.date_start = scraped.date_start;
    merged.date_end = scraped.date_end;
    merged.location = scraped.location.clone();

    merge_opt(&mut merged.description, &scraped.description);
    merge_opt(&mut merged.city, &scraped.city);
    merge_opt(&mut merged.state, &scraped.state);
    merge_opt(&mut merged.country, &scraped.country);
    merge_opt(&mut merged.region, &scraped.region);
    merge_opt(&mut merged.organization, &scraped.organization);
    merge_opt(&mut merged.ride_manager, &scraped.ride_manager);
    merge_opt(&mut merged.manager_email, &scraped.manager_email);
    merge_opt(&mut merged.manager_phone, &scraped.manager_phone);
    merge_opt(&mut merged.website_url, &scraped.website_url);
    merge_opt(&mut merged.flyer_url, &scraped.flyer_url);
    merge_opt(&mut merged.map_link, &scraped.map_link);
    merge_opt(&mut merged.notes, &scraped.notes);

    if !scraped.distances.is_empty() {
        merged.distances = scraped.distances.clone();
    }
    if !scraped.control_judges.is_empty() {
        merged.control_judges = scraped.control_judges.clone();
    }

    merged.ride_days = scraped.ride_days;
    merged.is_multi_day_event = scraped.is_multi_day_event;
    merged.is_pioneer_ride = scraped.is_pioneer_ride;
    merged.has_intro_ride = scraped.has_intro_ride;
    merged.is_canceled = scraped.is_canceled;

    if scraped.geocoding_attempted {
        merged.geocoding_attempted = true;
        merged.latitude = scraped.latitude;
        merged.longitude = scraped.longitude;
    }

    let conflicts = merged.event_details.deep_merge(&scraped.event_details, true);
    for path in &conflicts {
        debug!(
            source = %stored.source,
            ride_id = %stored.ride_id,
            key = %path,
            "event_details conflict resolved in favor of scrape"
        );
    }

    let changed = !content_eq(stored, &merged);
    (merged, changed)
}

fn merge_opt<T: Clone>(target: &mut Option<T>, scraped: &Option<T>) {
    if scraped.is_some() {
        *target = scraped.clone();
    }
}

/// Equality over everything an upsert may change; id and timestamps are
/// deliberately excluded so an unchanged scrape leaves `updated_at` alone.
pub fn content_eq(a: &Event, b: &Event) -> bool {
    a.name == b.name
        && a.description == b.description
        && a.date_start == b.date_start
        && a.date_end == b.date_end
        && a.location == b.location
        && a.city == b.city
        && a.state == b.state
        && a.country == b.country
        && a.region == b.region
        && a.organization == b.organization
        && a.distances == b.distances
        && a.ride_manager == b.ride_manager
        && a.manager_email == b.manager_email
        && a.manager_phone == b.manager_phone
        && a.website_url == b.website_url
        && a.flyer_url == b.flyer_url
        && a.map_link == b.map_link
        && a.control_judges == b.control_judges
        && a.is_multi_day_event == b.is_multi_day_event
        && a.is_pioneer_ride == b.is_pioneer_ride
        && a.ride_days == b.ride_days
        && a.has_intro_ride == b.has_intro_ride
        && a.is_canceled == b.is_canceled
        && a.latitude == b.latitude
        && a.longitude == b.longitude
        && a.geocoding_attempted == b.geocoding_attempted
        && a.event_details == b.event_details
        && a.notes == b.notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventDetails, AERC_SOURCE};
    use chrono::{NaiveDate, Utc};
    use serde_json::json;

    fn event() -> Event {
        let now = Utc::now();
        Event {
            id: Some(7),
            source: AERC_SOURCE.to_string(),
            ride_id: "42".to_string(),
            name: "Owyhee Canyonlands".to_string(),
            description: Some("desc".to_string()),
            date_start: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
            date_end: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
            location: "Oreana, ID".to_string(),
            city: Some("Oreana".to_string()),
            state: Some("ID".to_string()),
            country: Some("USA".to_string()),
            region: Some("NW".to_string()),
            organization: Some("AERC".to_string()),
            distances: Vec::new(),
            ride_manager: Some("Jane Doe".to_string()),
            manager_email: Some("jane@example.com".to_string()),
            manager_phone: None,
            website_url: Some("https://example.com".to_string()),
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

    #[test]
    fn null_scrape_preserves_stored_value() {
        let stored = event();
        let mut scraped = event();
        scraped.ride_manager = None;
        scraped.manager_email = None;

        let (merged, changed) = merge_scraped(&stored, &scraped);
        assert_eq!(merged.ride_manager.as_deref(), Some("Jane Doe"));
        assert_eq!(merged.manager_email.as_deref(), Some("jane@example.com"));
        assert!(!changed);
    }

    #[test]
    fn identical_scrape_is_unchanged() {
        let stored = event();
        let scraped = event();
        let (_, changed) = merge_scraped(&stored, &scraped);
        assert!(!changed);
    }

    #[test]
    fn cancellation_round_trip() {
        let mut stored = event();
        let mut scraped = event();
        scraped.is_canceled = true;

        let (merged, changed) = merge_scraped(&stored, &scraped);
        assert!(merged.is_canceled);
        assert!(changed);

        // a later clean observation un-cancels
        stored.is_canceled = true;
        scraped.is_canceled = false;
        let (merged, changed) = merge_scraped(&stored, &scraped);
        assert!(!merged.is_canceled);
        assert!(changed);
    }

    #[test]
    fn scrape_does_not_clobber_enrichment_state() {
        let mut stored = event();
        stored.geocoding_attempted = true;
        stored.latitude = Some(43.0);
        stored.longitude = Some(-116.0);
        stored.last_website_check_at = Some(Utc::now());

        let scraped = event();
        let (merged, changed) = merge_scraped(&stored, &scraped);
        assert!(merged.geocoding_attempted);
        assert_eq!(merged.latitude, Some(43.0));
        assert!(merged.last_website_check_at.is_some());
        assert!(!changed);
    }

    #[test]
    fn map_link_coordinates_apply() {
        let stored = event();
        let mut scraped = event();
        scraped.geocoding_attempted = true;
        scraped.latitude = Some(37.7749);
        scraped.longitude = Some(-122.4194);

        let (merged, changed) = merge_scraped(&stored, &scraped);
        assert!(merged.geocoding_attempted);
        assert_eq!(merged.latitude, Some(37.7749));
        assert!(changed);
    }

    #[test]
    fn details_merge_scrape_wins() {
        let mut stored = event();
        stored
            .event_details
            .insert("cost_info", json!("$100"));
        stored
            .event_details
            .insert("enrichment_only", json!("kept"));

        let mut scraped = event();
        scraped.event_details.insert("cost_info", json!("$120"));

        let (merged, changed) = merge_scraped(&stored, &scraped);
        assert_eq!(merged.event_details.cost_info(), Some("$120"));
        assert_eq!(
            merged.event_details.get("enrichment_only"),
            Some(&json!("kept"))
        );
        assert!(changed);
    }
}
