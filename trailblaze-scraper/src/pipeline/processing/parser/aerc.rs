use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use trailblaze_core::common::error::{Result, ScraperError};
use trailblaze_core::domain::geo::{valid_latitude, valid_longitude};
use trailblaze_core::domain::{ControlJudge, Distance};

use crate::pipeline::ingestion::cache::canonicalize_url;
use crate::pipeline::processing::parser::{PageParse, RawEvent, RowError};

const US_STATE_CODES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN",
    "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH",
    "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT",
    "VT", "VA", "WA", "WV", "WI", "WY",
];

const CANADIAN_PROVINCE_CODES: &[&str] = &[
    "AB", "BC", "MB", "NB", "NL", "NS", "NT", "NU", "ON", "PE", "QC", "SK", "YT",
];

/// Extractor for the AERC calendar. One instance per run; `debug` adds
/// per-row extraction logging.
pub struct AercParser {
    debug: bool,
}

impl AercParser {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    /// Parse one normalized calendar page into ordered raw events. A
    /// missing row container is a structural failure and aborts the
    /// page; individual bad rows are recorded and skipped.
    pub fn parse(&self, html: &str) -> Result<PageParse> {
        let document = Html::parse_document(html);
        let row_selector = Selector::parse("div.calendarRow").unwrap();
        let rows: Vec<ElementRef> = document.select(&row_selector).collect();
        if rows.is_empty() {
            return Err(ScraperError::Structural(
                "no div.calendarRow entries in page".to_string(),
            ));
        }

        let mut page = PageParse::default();
        for (index, row) in rows.iter().enumerate() {
            match self.extract_row(*row) {
                Ok(event) => {
                    if self.debug {
                        debug!(
                            row = index,
                            name = %event.name,
                            ride_id = ?event.ride_id,
                            "extracted calendar row"
                        );
                    }
                    page.events.push(event);
                }
                Err(message) => {
                    warn!(row = index, "row extraction failed: {message}");
                    page.row_errors.push(RowError {
                        row_index: index,
                        message,
                    });
                }
            }
        }
        Ok(page)
    }

    fn extract_row(&self, row: ElementRef<'_>) -> std::result::Result<RawEvent, String> {
        let mut event = RawEvent::default();
        let row_text = element_text(row);

        let raw_name = select_text(row, "span.rideName")
            .ok_or_else(|| "missing span.rideName".to_string())?;
        let (name, name_canceled) = strip_cancellation_marker(&raw_name);
        if name.is_empty() {
            return Err("empty ride name after marker removal".to_string());
        }
        event.name = name;
        event.is_canceled = name_canceled || row_has_cancellation_marker(&row_text);

        event.ride_id = extract_ride_id(row);
        event.region = select_text(row, "td.region");

        match select_text(row, "span.rideDate") {
            Some(date_text) => match parse_date_range(&date_text) {
                Ok((start, end)) => {
                    event.date_start = Some(start);
                    event.date_end = Some(end);
                }
                Err(reason) => {
                    event.invalid = true;
                    event.invalid_reasons.push(reason);
                }
            },
            None => {
                event.invalid = true;
                event.invalid_reasons.push("missing span.rideDate".to_string());
            }
        }

        let location = extract_location(row).unwrap_or_else(|| "Unknown Location".to_string());
        let (city, state, country) = split_location(&location);
        event.location = Some(location);
        event.city = city;
        event.state = state;
        event.country = country;

        let (website, flyer, map_link) = extract_links(row);
        event.website_url = website;
        event.flyer_url = flyer;
        event.map_link = map_link;

        if let Some(link) = event.map_link.as_deref() {
            if let Some((lat, lng)) = extract_map_coordinates(link) {
                event.latitude = Some(lat);
                event.longitude = Some(lng);
                event.geocoding_attempted = true;
            }
        }

        event.distances = extract_distances(row);
        event.has_intro_ride = detect_intro_ride(row, &event.distances);

        let (manager, email, phone) = extract_contacts(&row_text);
        event.ride_manager = manager;
        event.manager_email = email;
        event.manager_phone = phone;

        event.control_judges = extract_judges(&row_text);
        event.description = select_text(row, "div.details");
        event.directions = select_text(row, "div.directions");

        Ok(event)
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

fn select_text(row: ElementRef<'_>, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).unwrap();
    let text = row
        .select(&selector)
        .next()
        .map(|el| element_text(el).trim().to_string())?;
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn extract_ride_id(row: ElementRef<'_>) -> Option<String> {
    if let Some(id) = row.value().attr("data-ride-id") {
        let id = id.trim();
        if !id.is_empty() {
            return Some(id.to_string());
        }
    }
    // fallback: the <a name="ride-NNN"> anchor the site uses for deep links
    let anchor = Selector::parse("a[name]").unwrap();
    row.select(&anchor)
        .filter_map(|a| a.value().attr("name"))
        .find_map(|name| name.strip_prefix("ride-").map(|id| id.to_string()))
}

/// Strip a leading/trailing cancellation marker from a ride name.
/// Returns the cleaned name and whether a marker was present.
fn strip_cancellation_marker(name: &str) -> (String, bool) {
    let prefix = Regex::new(r"(?i)^[\s*]*cancell?ed[\s:*-]+").unwrap();
    let suffix = Regex::new(r"(?i)[\s*-]+cancell?ed[\s*]*$").unwrap();

    let mut canceled = false;
    let mut cleaned = name.trim().to_string();
    if prefix.is_match(&cleaned) {
        canceled = true;
        cleaned = prefix.replace(&cleaned, "").to_string();
    }
    if suffix.is_match(&cleaned) {
        canceled = true;
        cleaned = suffix.replace(&cleaned, "").to_string();
    }
    (cleaned.trim().to_string(), canceled)
}

fn row_has_cancellation_marker(row_text: &str) -> bool {
    Regex::new(r"(?i)\*+\s*cancell?ed\s*\*+")
        .unwrap()
        .is_match(row_text)
}

/// Month resolution: full/abbreviated names plus the enumerated
/// two-letter codes some calendar seasons use. Unknown tokens are a row
/// error, not a guess.
fn month_number(token: &str) -> Option<u32> {
    let upper = token.trim_end_matches('.').to_ascii_uppercase();
    if upper.len() >= 3 {
        return match &upper[..3] {
            "JAN" => Some(1),
            "FEB" => Some(2),
            "MAR" => Some(3),
            "APR" => Some(4),
            "MAY" => Some(5),
            "JUN" => Some(6),
            "JUL" => Some(7),
            "AUG" => Some(8),
            "SEP" => Some(9),
            "OCT" => Some(10),
            "NOV" => Some(11),
            "DEC" => Some(12),
            _ => None,
        };
    }
    match upper.as_str() {
        "JA" => Some(1),
        "FE" => Some(2),
        "MR" => Some(3),
        "AP" => Some(4),
        "MY" => Some(5),
        "JN" => Some(6),
        "JL" => Some(7),
        "AU" => Some(8),
        "SE" => Some(9),
        "OC" => Some(10),
        "NO" => Some(11),
        "DE" => Some(12),
        _ => None,
    }
}

/// Parse "Mar 15, 2024", "Jun 15-16, 2024", "Jun 30 - Jul 1, 2024" and
/// "03/15/2024" forms. Single days collapse to start == end.
pub(crate) fn parse_date_range(text: &str) -> std::result::Result<(NaiveDate, NaiveDate), String> {
    let text = text.trim();

    let numeric = Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{2,4})$").unwrap();
    if let Some(caps) = numeric.captures(text) {
        let month: u32 = caps[1].parse().map_err(|_| bad_date(text))?;
        let day: u32 = caps[2].parse().map_err(|_| bad_date(text))?;
        let mut year: i32 = caps[3].parse().map_err(|_| bad_date(text))?;
        if year < 100 {
            year += 2000;
        }
        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| bad_date(text))?;
        return Ok((date, date));
    }

    let textual = Regex::new(
        r"^([A-Za-z]{2,9})\.?\s+(\d{1,2})(?:\s*[-\u{2013}]\s*(?:([A-Za-z]{2,9})\.?\s+)?(\d{1,2}))?,?\s+(\d{4})$",
    )
    .unwrap();
    let caps = textual
        .captures(text)
        .ok_or_else(|| format!("unrecognized date '{text}'"))?;

    let start_month = month_number(&caps[1])
        .ok_or_else(|| format!("unknown month token '{}' in '{text}'", &caps[1]))?;
    let start_day: u32 = caps[2].parse().map_err(|_| bad_date(text))?;
    let year: i32 = caps[5].parse().map_err(|_| bad_date(text))?;

    let start =
        NaiveDate::from_ymd_opt(year, start_month, start_day).ok_or_else(|| bad_date(text))?;

    let end = match caps.get(4) {
        None => start,
        Some(end_day) => {
            let end_month = match caps.get(3) {
                Some(token) => month_number(token.as_str())
                    .ok_or_else(|| format!("unknown month token '{}' in '{text}'", token.as_str()))?,
                None => start_month,
            };
            let end_day: u32 = end_day.as_str().parse().map_err(|_| bad_date(text))?;
            let mut end =
                NaiveDate::from_ymd_opt(year, end_month, end_day).ok_or_else(|| bad_date(text))?;
            if end < start {
                // year rollover: "Dec 31 - Jan 1, 2024" ends in 2025
                end = NaiveDate::from_ymd_opt(year + 1, end_month, end_day)
                    .ok_or_else(|| bad_date(text))?;
            }
            end
        }
    };

    Ok((start, end))
}

fn bad_date(text: &str) -> String {
    format!("unparseable date '{text}'")
}

fn extract_location(row: ElementRef<'_>) -> Option<String> {
    let tr = Selector::parse("tr").unwrap();
    let td = Selector::parse("td").unwrap();

    // labeled row in the detail table: <td>Ride</td><td>Location : </td><td>...</td>
    for table_row in row.select(&tr) {
        let text = element_text(table_row);
        if text.contains("Location :") {
            let cells: Vec<ElementRef> = table_row.select(&td).collect();
            if cells.len() >= 3 {
                let value = clean_location(&element_text(cells[2]));
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }
    }

    select_text(row, "span.rideLocation").map(|text| clean_location(&text)).filter(|t| !t.is_empty())
}

fn clean_location(raw: &str) -> String {
    let directions = Regex::new(r"(?i)Click Here for Directions.*").unwrap();
    let marker = Regex::new(r"(?i)\*+\s*cancell?ed\s*\*+").unwrap();
    let first_line = raw.lines().next().unwrap_or("");
    let cleaned = directions.replace(first_line, "");
    marker.replace(&cleaned, "").trim().to_string()
}

/// Split free-text location into (city, state, country). Canadian
/// province codes imply Canada, US state codes imply USA; anything else
/// leaves country unset for the geocoder to sort out.
fn split_location(location: &str) -> (Option<String>, Option<String>, Option<String>) {
    let mut parts: Vec<String> = location
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() < 2 {
        return (None, None, None);
    }

    let mut country = None;
    let last = parts.last().unwrap().clone();
    if last.eq_ignore_ascii_case("canada") {
        country = Some("Canada".to_string());
        parts.pop();
    } else if last.eq_ignore_ascii_case("usa") || last.eq_ignore_ascii_case("united states") {
        country = Some("USA".to_string());
        parts.pop();
    }
    if parts.is_empty() {
        return (None, None, country);
    }

    let mut state = None;
    let state_re = Regex::new(r"^([A-Za-z]{2})(?:\s+(Canada|USA))?$").unwrap();
    if let Some(caps) = state_re.captures(parts.last().unwrap()) {
        let code = caps[1].to_ascii_uppercase();
        if let Some(tail) = caps.get(2) {
            country = Some(if tail.as_str().eq_ignore_ascii_case("canada") {
                "Canada".to_string()
            } else {
                "USA".to_string()
            });
        }
        if CANADIAN_PROVINCE_CODES.contains(&code.as_str()) {
            country = Some("Canada".to_string());
            state = Some(code);
            parts.pop();
        } else if US_STATE_CODES.contains(&code.as_str()) {
            country.get_or_insert_with(|| "USA".to_string());
            state = Some(code);
            parts.pop();
        }
    }

    let city = parts.pop();
    (city, state, country)
}

fn extract_links(row: ElementRef<'_>) -> (Option<String>, Option<String>, Option<String>) {
    let anchor = Selector::parse("a[href]").unwrap();
    let mut website = None;
    let mut flyer = None;
    let mut map_link = None;

    for link in row.select(&anchor) {
        let href = match link.value().attr("href") {
            Some(href) => href,
            None => continue,
        };
        let text = element_text(link).to_lowercase();

        let canonical = match canonicalize_url(href) {
            Ok(canonical) => canonical,
            Err(_) => {
                warn!(href, "dropping unparseable link");
                continue;
            }
        };

        if href.contains("maps.google")
            || text.contains("directions")
            || text.contains("map")
        {
            map_link.get_or_insert(canonical);
        } else if href.ends_with(".pdf")
            || text.contains("entry")
            || text.contains("flyer")
            || text.contains("form")
        {
            flyer.get_or_insert(canonical);
        } else if href.starts_with("http")
            && ["website", "details", "info", "site", "follow"]
                .iter()
                .any(|word| text.contains(word))
        {
            website.get_or_insert(canonical);
        }
    }

    (website, flyer, map_link)
}

/// Recognized map-link coordinate encodings: `?q=LAT,LNG`,
/// `@LAT,LNG,ZOOMz`, and the legacy `ll=LAT,LNG`.
pub(crate) fn extract_map_coordinates(link: &str) -> Option<(f64, f64)> {
    let patterns = [
        r"[?&]q=(-?\d+(?:\.\d+)?),(-?\d+(?:\.\d+)?)",
        r"@(-?\d+(?:\.\d+)?),(-?\d+(?:\.\d+)?)",
        r"[?&]ll=(-?\d+(?:\.\d+)?),(-?\d+(?:\.\d+)?)",
    ];
    for pattern in patterns {
        if let Some(caps) = Regex::new(pattern).unwrap().captures(link) {
            let lat: f64 = caps[1].parse().ok()?;
            let lng: f64 = caps[2].parse().ok()?;
            if valid_latitude(lat) && valid_longitude(lng) {
                return Some((lat, lng));
            }
        }
    }
    None
}

fn extract_distances(row: ElementRef<'_>) -> Vec<Distance> {
    let tr = Selector::parse("tr").unwrap();
    let td = Selector::parse("td").unwrap();
    let mut distances = Vec::new();

    let date_re = Regex::new(r"(?i)on\s+([A-Za-z]{2,9}\.?\s+\d{1,2},?\s+\d{4})").unwrap();
    let time_re =
        Regex::new(r"(?i)starting at\s+(\d{1,2}:\d{2}\s*(?:am|pm)?|\d{1,2}\s*(?:am|pm))").unwrap();

    for table_row in row.select(&tr) {
        let cells: Vec<ElementRef> = table_row.select(&td).collect();
        if cells.len() < 3 {
            continue;
        }
        let label_cell = element_text(cells[0]).trim().to_string();
        let detail = element_text(cells[2]);
        let is_distance_row = label_cell.eq_ignore_ascii_case("distances")
            || (label_cell.is_empty() && detail.to_lowercase().contains("starting at"));
        if !is_distance_row {
            continue;
        }

        let label = element_text(cells[1]).replace('\u{a0}', " ").trim().to_string();
        if label.is_empty() {
            continue;
        }

        let date = date_re
            .captures(&detail)
            .and_then(|caps| parse_date_range(&caps[1]).ok())
            .map(|(start, _)| start);
        let start_time = time_re
            .captures(&detail)
            .map(|caps| caps[1].trim().to_string());

        distances.push(Distance {
            distance: label,
            date,
            start_time,
        });
    }

    if distances.is_empty() {
        let span = Selector::parse("span.distance").unwrap();
        for el in row.select(&span) {
            let label = element_text(el).trim().to_string();
            if !label.is_empty() {
                distances.push(Distance {
                    distance: label,
                    date: None,
                    start_time: None,
                });
            }
        }
    }

    distances
}

fn detect_intro_ride(row: ElementRef<'_>, distances: &[Distance]) -> bool {
    if distances
        .iter()
        .any(|d| d.distance.to_lowercase().contains("intro"))
    {
        return true;
    }
    // short distances only count with the calendar's explicit marker
    let marker = Selector::parse(r#"span[class*="intro"]"#).unwrap();
    if row.select(&marker).next().is_some() {
        let short_re = Regex::new(r"^(\d{1,2})").unwrap();
        return distances.iter().any(|d| {
            short_re
                .captures(&d.distance)
                .and_then(|caps| caps[1].parse::<u32>().ok())
                .map(|miles| miles <= 15)
                .unwrap_or(false)
        }) || distances.is_empty();
    }
    false
}

fn extract_contacts(row_text: &str) -> (Option<String>, Option<String>, Option<String>) {
    let rm_re = Regex::new(r"(?:RM|Ride Manager)\s*:?\s+([^,\n\r;(]+)").unwrap();
    let email_re =
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap();
    let phone_re = Regex::new(r"(\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4})").unwrap();

    let manager = rm_re
        .captures(row_text)
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| !name.is_empty());
    let email = email_re.find(row_text).map(|m| m.as_str().to_string());
    let phone = phone_re
        .captures(row_text)
        .map(|caps| caps[1].trim().to_string());

    (manager, email, phone)
}

fn extract_judges(row_text: &str) -> Vec<ControlJudge> {
    let role_patterns = [
        (r"Control Judge(?:s)?\s*:\s*([^\n\r]+)", "Control Judge"),
        (r"Vet Judge(?:s)?\s*:\s*([^\n\r]+)", "Vet Judge"),
        (
            r"Technical Delegate(?:s)?\s*:\s*([^\n\r]+)",
            "Technical Delegate",
        ),
        (r"Steward(?:s)?\s*:\s*([^\n\r]+)", "Steward"),
    ];

    let mut judges = Vec::new();
    for (pattern, role) in role_patterns {
        let re = Regex::new(&format!("(?i){pattern}")).unwrap();
        if let Some(caps) = re.captures(row_text) {
            for name in caps[1].split(',') {
                let name = name.trim();
                if !name.is_empty() {
                    judges.push(ControlJudge {
                        role: role.to_string(),
                        name: name.to_string(),
                    });
                }
            }
        }
    }
    judges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_day_date() {
        let (start, end) = parse_date_range("Mar 15, 2024").unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(start, end);
    }

    #[test]
    fn explicit_range_same_month() {
        let (start, end) = parse_date_range("Jun 15-16, 2024").unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 6, 15).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 6, 16).unwrap());
    }

    #[test]
    fn range_across_months() {
        let (start, end) = parse_date_range("Jun 30 - Jul 1, 2024").unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 6, 30).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
    }

    #[test]
    fn numeric_dates() {
        let (start, _) = parse_date_range("03/15/2024").unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
    }

    #[test]
    fn two_letter_month_codes() {
        let (start, _) = parse_date_range("MR 15, 2024").unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        let (start, _) = parse_date_range("OC 3, 2024").unwrap();
        assert_eq!(start.format("%m").to_string(), "10");
    }

    #[test]
    fn unknown_month_token_is_an_error() {
        let err = parse_date_range("XX 15, 2024").unwrap_err();
        assert!(err.contains("unknown month token"));
    }

    #[test]
    fn year_rollover_range() {
        let (start, end) = parse_date_range("Dec 31 - Jan 1, 2024").unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    }

    #[test]
    fn location_split_us_and_canada() {
        let (city, state, country) = split_location("Sonoita, AZ");
        assert_eq!(city.as_deref(), Some("Sonoita"));
        assert_eq!(state.as_deref(), Some("AZ"));
        assert_eq!(country.as_deref(), Some("USA"));

        let (city, state, country) = split_location("Belair, MB");
        assert_eq!(city.as_deref(), Some("Belair"));
        assert_eq!(state.as_deref(), Some("MB"));
        assert_eq!(country.as_deref(), Some("Canada"));
    }

    #[test]
    fn location_split_with_venue_prefix() {
        let (city, state, country) = split_location("Empire Ranch, Sonoita, AZ, USA");
        assert_eq!(city.as_deref(), Some("Sonoita"));
        assert_eq!(state.as_deref(), Some("AZ"));
        assert_eq!(country.as_deref(), Some("USA"));
    }

    #[test]
    fn location_without_code_leaves_country_unset() {
        let (_, state, country) = split_location("Somewhere, Outback");
        assert!(state.is_none());
        assert!(country.is_none());
    }

    #[test]
    fn map_coordinates_q_form() {
        let coords =
            extract_map_coordinates("https://maps.google.com/?q=37.7749,-122.4194").unwrap();
        assert!((coords.0 - 37.7749).abs() < 1e-9);
        assert!((coords.1 + 122.4194).abs() < 1e-9);
    }

    #[test]
    fn map_coordinates_at_and_ll_forms() {
        assert!(extract_map_coordinates("https://maps.google.com/@31.68,-110.65,12z").is_some());
        assert!(extract_map_coordinates("https://maps.google.com/maps?ll=47.6,-122.3").is_some());
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        assert!(extract_map_coordinates("https://maps.google.com/?q=95.0,-122.4").is_none());
        assert!(extract_map_coordinates("https://maps.google.com/?q=37.0,-190.0").is_none());
    }

    #[test]
    fn cancellation_marker_stripping() {
        let (name, canceled) = strip_cancellation_marker("CANCELLED: Biltmore Challenge");
        assert_eq!(name, "Biltmore Challenge");
        assert!(canceled);

        let (name, canceled) = strip_cancellation_marker("** Cancelled ** Old Pueblo");
        assert_eq!(name, "Old Pueblo");
        assert!(canceled);

        let (name, canceled) = strip_cancellation_marker("Tevis Cup");
        assert_eq!(name, "Tevis Cup");
        assert!(!canceled);
    }

    #[test]
    fn judges_extraction_preserves_order() {
        let judges = extract_judges(
            "Control Judges: Anna Lee, Bob Ray\nVet Judge: Carol Diaz",
        );
        assert_eq!(
            judges,
            vec![
                ControlJudge {
                    role: "Control Judge".to_string(),
                    name: "Anna Lee".to_string()
                },
                ControlJudge {
                    role: "Control Judge".to_string(),
                    name: "Bob Ray".to_string()
                },
                ControlJudge {
                    role: "Vet Judge".to_string(),
                    name: "Carol Diaz".to_string()
                },
            ]
        );
    }

    #[test]
    fn contact_extraction() {
        let (manager, email, phone) =
            extract_contacts("RM: Pat Smith\npat.smith@example.com (520) 555-1212");
        assert_eq!(manager.as_deref(), Some("Pat Smith"));
        assert_eq!(email.as_deref(), Some("pat.smith@example.com"));
        assert_eq!(phone.as_deref(), Some("(520) 555-1212"));
    }
}
