pub mod aerc;

use chrono::NaiveDate;
use trailblaze_core::domain::{ControlJudge, Distance};

pub use aerc::AercParser;

/// Parser output for one calendar row: a superset of the canonical
/// event that tolerates missing or ambiguous fields. Rows that failed a
/// required extraction are still emitted with `invalid` set so the run
/// report can count them.
#[derive(Debug, Clone, Default)]
pub struct RawEvent {
    pub ride_id: Option<String>,
    pub name: String,
    pub is_canceled: bool,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub region: Option<String>,
    pub location: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub distances: Vec<Distance>,
    pub ride_manager: Option<String>,
    pub manager_email: Option<String>,
    pub manager_phone: Option<String>,
    pub website_url: Option<String>,
    pub flyer_url: Option<String>,
    pub map_link: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub geocoding_attempted: bool,
    pub control_judges: Vec<ControlJudge>,
    pub has_intro_ride: bool,
    pub description: Option<String>,
    pub directions: Option<String>,
    pub invalid: bool,
    pub invalid_reasons: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RowError {
    pub row_index: usize,
    pub message: String,
}

/// Result of parsing one page. Row-level failures are collected here;
/// only a missing page container aborts the whole page.
#[derive(Debug, Default)]
pub struct PageParse {
    pub events: Vec<RawEvent>,
    pub row_errors: Vec<RowError>,
}
