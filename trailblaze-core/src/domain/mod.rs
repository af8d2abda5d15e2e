pub mod cadence;
pub mod geo;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::common::error::{Result, ScraperError};

/// Canonical source name for the AERC calendar.
pub const AERC_SOURCE: &str = "AERC";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Distance {
    pub distance: String,
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControlJudge {
    pub role: String,
    pub name: String,
}

/// Open map of source-specific fields. A known-key subset gets typed
/// accessors; unknown keys round-trip untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventDetails(pub Map<String, Value>);

impl EventDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn directions(&self) -> Option<&str> {
        self.get_str("directions")
    }

    pub fn amenities(&self) -> Option<&str> {
        self.get_str("amenities")
    }

    pub fn hazards(&self) -> Option<&str> {
        self.get_str("hazards")
    }

    pub fn veterinarians(&self) -> Option<&str> {
        self.get_str("veterinarians")
    }

    pub fn registration_info(&self) -> Option<&str> {
        self.get_str("registration_info")
    }

    pub fn cost_info(&self) -> Option<&str> {
        self.get_str("cost_info")
    }

    /// Deep-merge `patch` into `self`. Nested objects merge recursively;
    /// on a scalar conflict the patch wins when `patch_wins`, otherwise
    /// the stored value is kept. Returns the dotted paths of conflicts.
    pub fn deep_merge(&mut self, patch: &EventDetails, patch_wins: bool) -> Vec<String> {
        let mut conflicts = Vec::new();
        merge_maps(&mut self.0, &patch.0, patch_wins, "", &mut conflicts);
        conflicts
    }
}

fn merge_maps(
    target: &mut Map<String, Value>,
    patch: &Map<String, Value>,
    patch_wins: bool,
    prefix: &str,
    conflicts: &mut Vec<String>,
) {
    for (key, incoming) in patch {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match target.get_mut(key) {
            None => {
                target.insert(key.clone(), incoming.clone());
            }
            Some(existing) => match (existing, incoming) {
                (Value::Object(existing_map), Value::Object(incoming_map)) => {
                    merge_maps(existing_map, incoming_map, patch_wins, &path, conflicts);
                }
                (existing, incoming) => {
                    if existing != incoming {
                        conflicts.push(path);
                        if patch_wins {
                            *existing = incoming.clone();
                        }
                    }
                }
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Option<i64>,
    pub source: String,
    pub ride_id: String,
    pub name: String,
    pub description: Option<String>,
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,
    pub location: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub organization: Option<String>,
    pub distances: Vec<Distance>,
    pub ride_manager: Option<String>,
    pub manager_email: Option<String>,
    pub manager_phone: Option<String>,
    pub website_url: Option<String>,
    pub flyer_url: Option<String>,
    pub map_link: Option<String>,
    pub control_judges: Vec<ControlJudge>,
    pub is_multi_day_event: bool,
    pub is_pioneer_ride: bool,
    pub ride_days: i64,
    pub has_intro_ride: bool,
    pub is_canceled: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub geocoding_attempted: bool,
    pub last_website_check_at: Option<DateTime<Utc>>,
    pub event_details: EventDetails,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn identity(&self) -> (&str, &str) {
        (&self.source, &self.ride_id)
    }

    /// Checks the record-level invariants. Violations are reported as
    /// `ValidationError` and the event is dropped by the caller.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ScraperError::Validation("empty event name".into()));
        }
        if self.date_end < self.date_start {
            return Err(ScraperError::Validation(format!(
                "date_end {} precedes date_start {}",
                self.date_end, self.date_start
            )));
        }
        if !self.geocoding_attempted && (self.latitude.is_some() || self.longitude.is_some()) {
            return Err(ScraperError::Validation(
                "coordinates present without a geocoding attempt".into(),
            ));
        }
        if self.is_pioneer_ride && (!self.is_multi_day_event || self.ride_days < 3) {
            return Err(ScraperError::Validation(
                "pioneer ride must span at least three days".into(),
            ));
        }
        if self.ride_days < 1 {
            return Err(ScraperError::Validation("ride_days must be positive".into()));
        }
        for (i, a) in self.distances.iter().enumerate() {
            if self.distances[..i].contains(a) {
                return Err(ScraperError::Validation(format!(
                    "duplicate distance entry {:?}",
                    a.distance
                )));
            }
        }
        Ok(())
    }
}

/// Version tag baked into synthetic ride ids; bump only with a migration.
const SYNTHETIC_ID_VERSION: &str = "v1";

/// Deterministic identity for rows whose source omits a ride id. Pure:
/// the same inputs always produce the same id across runs and hosts.
pub fn synthetic_ride_id(
    source: &str,
    name: &str,
    date_start: Option<NaiveDate>,
    location: &str,
) -> String {
    let date = date_start
        .map(|d| d.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let material = format!(
        "{SYNTHETIC_ID_VERSION}|{source}|{}|{date}|{}",
        name.trim().to_lowercase(),
        location.trim().to_lowercase()
    );
    let digest = Sha256::digest(material.as_bytes());
    format!("synth-{SYNTHETIC_ID_VERSION}-{}", &hex::encode(digest)[..16])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Ok,
    Degraded,
    TimedOut,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Ok => "ok",
            RunStatus::Degraded => "degraded",
            RunStatus::TimedOut => "timed_out",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ok" => Some(RunStatus::Ok),
            "degraded" => Some(RunStatus::Degraded),
            "timed_out" => Some(RunStatus::TimedOut),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunCounts {
    pub fetched: u64,
    pub parsed: u64,
    pub valid: u64,
    pub invalid: u64,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub canceled: u64,
}

impl RunCounts {
    /// Accounting identity checked by tests and asserted in debug runs:
    /// every parsed row ends up inserted, updated, skipped, or invalid.
    pub fn balanced(&self) -> bool {
        self.inserted + self.updated + self.skipped + self.invalid == self.parsed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    pub code: String,
    pub message: String,
    pub page: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub counts: RunCounts,
    pub errors: Vec<RunError>,
}

impl RunReport {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            source: source.into(),
            started_at: Utc::now(),
            ended_at: None,
            status: RunStatus::Ok,
            counts: RunCounts::default(),
            errors: Vec::new(),
        }
    }

    pub fn record_error(&mut self, error: &ScraperError, page: Option<&str>) {
        self.errors.push(RunError {
            code: error.code().to_string(),
            message: error.to_string(),
            page: page.map(|p| p.to_string()),
        });
    }
}
