use chrono::{DateTime, Duration, Utc};

use super::Event;

/// Events starting within this window are re-checked nightly.
pub const NEAR_TERM_DAYS: i64 = 90;
/// Far-out events are re-checked weekly.
pub const FAR_TERM_DAYS: i64 = 365;
/// Events whose end date is further in the past than this are left alone.
pub const PAST_GRACE_DAYS: i64 = 30;

/// Re-check interval for near-term events.
pub fn near_term_interval() -> Duration {
    Duration::hours(24)
}

/// Re-check interval for far-out events.
pub fn far_term_interval() -> Duration {
    Duration::days(7)
}

/// Tiered cadence for the detail-enrichment worker. An event with no
/// recorded check is always eligible; otherwise the re-check interval
/// depends on how close the event is.
pub fn detail_check_eligible(event: &Event, now: DateTime<Utc>) -> bool {
    if event.website_url.is_none() && event.flyer_url.is_none() {
        return false;
    }

    let today = now.date_naive();
    if event.date_end < today - Duration::days(PAST_GRACE_DAYS) {
        return false;
    }

    let last_checked = match event.last_website_check_at {
        None => return true,
        Some(t) => t,
    };

    let days_out = (event.date_start - today).num_days();
    let interval = if days_out <= NEAR_TERM_DAYS {
        near_term_interval()
    } else {
        // between 90 days and a year, and beyond: weekly
        far_term_interval()
    };

    now - last_checked >= interval
}
