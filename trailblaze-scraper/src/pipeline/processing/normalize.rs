use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, warn};

use trailblaze_core::domain::{
    synthetic_ride_id, ControlJudge, Distance, Event, EventDetails,
};

use crate::pipeline::processing::parser::RawEvent;

#[derive(Debug, Default)]
pub struct NormalizeOutcome {
    pub events: Vec<Event>,
    pub invalid: u64,
    pub errors: Vec<String>,
}

/// Turn raw parser rows into canonical events.
///
/// Rows sharing an identity are merge candidates: sorted by start date,
/// every contiguous block (gaps of at most one day) becomes a single
/// multi-day event. Rows without a usable date were flagged by the
/// parser and are counted as invalid here.
pub fn normalize(source: &str, raws: Vec<RawEvent>) -> NormalizeOutcome {
    let mut outcome = NormalizeOutcome::default();

    // group by identity, preserving page order of first appearance
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<RawEvent>> = HashMap::new();

    for raw in raws {
        if raw.invalid || raw.date_start.is_none() {
            outcome.invalid += 1;
            outcome.errors.push(format!(
                "row '{}' invalid: {}",
                raw.name,
                if raw.invalid_reasons.is_empty() {
                    "missing start date".to_string()
                } else {
                    raw.invalid_reasons.join("; ")
                }
            ));
            continue;
        }

        let key = match &raw.ride_id {
            Some(id) => id.clone(),
            None => synthetic_ride_id(
                source,
                &raw.name,
                raw.date_start,
                raw.location.as_deref().unwrap_or(""),
            ),
        };
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(raw);
    }

    for key in order {
        let mut rows = groups.remove(&key).unwrap_or_default();
        rows.sort_by_key(|r| r.date_start);

        // split into contiguous blocks
        let mut blocks: Vec<Vec<RawEvent>> = Vec::new();
        for row in rows {
            let start = row.date_start.unwrap();
            match blocks.last_mut() {
                Some(block) => {
                    let last_end = block
                        .last()
                        .and_then(|r| r.date_end.or(r.date_start))
                        .unwrap();
                    if (start - last_end).num_days() <= 1 {
                        block.push(row);
                    } else {
                        blocks.push(vec![row]);
                    }
                }
                None => blocks.push(vec![row]),
            }
        }

        for (block_index, block) in blocks.iter().enumerate() {
            // a second non-contiguous block cannot reuse the identity,
            // so it gets a date-qualified ride id
            let ride_id = if block_index == 0 {
                key.clone()
            } else {
                format!("{key}-{}", block[0].date_start.unwrap())
            };
            let event = merge_block(source, ride_id, block);
            match event.validate() {
                Ok(()) => outcome.events.push(event),
                Err(e) => {
                    outcome.invalid += 1;
                    warn!(name = %event.name, "normalized event failed validation: {e}");
                    outcome.errors.push(format!("'{}': {e}", event.name));
                }
            }
        }
    }

    outcome
}

fn first_some<T: Clone>(block: &[RawEvent], pick: impl Fn(&RawEvent) -> Option<T>) -> Option<T> {
    block.iter().find_map(|row| pick(row))
}

fn merge_block(source: &str, ride_id: String, block: &[RawEvent]) -> Event {
    let date_start = block[0].date_start.unwrap();
    let date_end = block
        .iter()
        .filter_map(|r| r.date_end.or(r.date_start))
        .max()
        .unwrap();
    let ride_days = (date_end - date_start).num_days() + 1;

    let mut distances: Vec<Distance> = Vec::new();
    for row in block {
        for distance in &row.distances {
            // label repeats across days are deliberate; only exact
            // duplicate entries collapse
            if !distances.contains(distance) {
                distances.push(distance.clone());
            }
        }
    }

    let mut control_judges: Vec<ControlJudge> = Vec::new();
    for row in block {
        for judge in &row.control_judges {
            if !control_judges.contains(judge) {
                control_judges.push(judge.clone());
            }
        }
    }

    let mut event_details = EventDetails::new();
    for row in block {
        let mut row_details = EventDetails::new();
        if let Some(directions) = &row.directions {
            row_details.insert("directions", serde_json::Value::String(directions.clone()));
        }
        if row_details.is_empty() {
            continue;
        }
        let conflicts = event_details.deep_merge(&row_details, false);
        for path in conflicts {
            debug!(ride_id = %ride_id, key = %path, "detail conflict across merged days, first value kept");
        }
    }

    let coords = block
        .iter()
        .find(|r| r.geocoding_attempted)
        .map(|r| (r.latitude, r.longitude));

    let now = Utc::now();
    Event {
        id: None,
        source: source.to_string(),
        ride_id,
        name: block[0].name.clone(),
        description: first_some(block, |r| r.description.clone()),
        date_start,
        date_end,
        location: first_some(block, |r| r.location.clone())
            .unwrap_or_else(|| "Unknown Location".to_string()),
        city: first_some(block, |r| r.city.clone()),
        state: first_some(block, |r| r.state.clone()),
        country: first_some(block, |r| r.country.clone()),
        region: first_some(block, |r| r.region.clone()),
        organization: Some(source.to_string()),
        distances,
        ride_manager: first_some(block, |r| r.ride_manager.clone()),
        manager_email: first_some(block, |r| r.manager_email.clone()),
        manager_phone: first_some(block, |r| r.manager_phone.clone()),
        website_url: first_some(block, |r| r.website_url.clone()),
        flyer_url: first_some(block, |r| r.flyer_url.clone()),
        map_link: first_some(block, |r| r.map_link.clone()),
        control_judges,
        is_multi_day_event: ride_days >= 2,
        is_pioneer_ride: ride_days >= 3,
        ride_days,
        has_intro_ride: block.iter().any(|r| r.has_intro_ride),
        is_canceled: block.iter().any(|r| r.is_canceled),
        latitude: coords.and_then(|(lat, _)| lat),
        longitude: coords.and_then(|(_, lng)| lng),
        geocoding_attempted: coords.is_some(),
        last_website_check_at: None,
        event_details,
        notes: None,
        created_at: now,
        updated_at: now,
    }
}
