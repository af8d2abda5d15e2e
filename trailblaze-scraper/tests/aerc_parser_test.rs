use chrono::NaiveDate;

use trailblaze_core::domain::AERC_SOURCE;
use trailblaze_scraper::pipeline::processing::html_normalizer;
use trailblaze_scraper::pipeline::processing::normalize::normalize;
use trailblaze_scraper::pipeline::processing::parser::AercParser;

/// Calendar fixture shaped like the live AERC markup: one row per ride
/// day, detail tables with labeled cells, and the usual link soup.
const CALENDAR_FIXTURE: &str = r#"<html><head><script>track();</script></head><body>
<div id="calendar-content">

<div class="calendarRow" data-ride-id="12345">
  <span class="rideName">Old Pueblo</span>
  <span class="rideDate">Mar 15, 2024</span>
  <table>
    <tr><td class="region">SW</td><td>Ride</td><td></td></tr>
    <tr><td>Ride</td><td>Location : </td><td>Sonoita, AZ</td></tr>
    <tr><td>Distances</td><td>50</td><td>on Mar 15, 2024 starting at 07:00 am</td></tr>
  </table>
  <p>RM: Pat Smith, pat.smith@example.com (520) 555-1212</p>
  <p>Control Judges: Anna Lee, Bob Ray</p>
  <a href="https://maps.google.com/?q=37.7749,-122.4194">Click Here for Directions</a>
  <a href="https://oldpueblo.example.com/entry.pdf">Entry/Flyer</a>
  <a href="https://oldpueblo.example.com/home">Ride Website Info</a>
</div>

<div class="calendarRow" data-ride-id="77">
  <span class="rideName">CANCELLED: Biltmore Challenge</span>
  <span class="rideDate">May 4, 2024</span>
  <table>
    <tr><td>Ride</td><td>Location : </td><td>Asheville, NC</td></tr>
    <tr><td>Distances</td><td>55</td><td>on May 4, 2024 starting at 06:30 am</td></tr>
  </table>
</div>

<div class="calendarRow" data-ride-id="812">
  <span class="rideName">Spruce Woods</span>
  <span class="rideDate">Jul 20, 2024</span>
  <table>
    <tr><td>Ride</td><td>Location : </td><td>Belair, MB</td></tr>
    <tr><td>Distances</td><td>25</td><td>on Jul 20, 2024 starting at 08:00 am</td></tr>
  </table>
</div>

<div class="calendarRow" data-ride-id="500">
  <span class="rideName">Owyhee Pioneer</span>
  <span class="rideDate">Mar 28, 2024</span>
  <table>
    <tr><td>Ride</td><td>Location : </td><td>Oreana, ID</td></tr>
    <tr><td>Distances</td><td>50</td><td>on Mar 28, 2024 starting at 07:00 am</td></tr>
  </table>
</div>
<div class="calendarRow" data-ride-id="500">
  <span class="rideName">Owyhee Pioneer</span>
  <span class="rideDate">Mar 29, 2024</span>
  <table>
    <tr><td>Ride</td><td>Location : </td><td>Oreana, ID</td></tr>
    <tr><td>Distances</td><td>50</td><td>on Mar 29, 2024 starting at 07:00 am</td></tr>
  </table>
</div>
<div class="calendarRow" data-ride-id="500">
  <span class="rideName">Owyhee Pioneer</span>
  <span class="rideDate">Mar 30, 2024</span>
  <table>
    <tr><td>Ride</td><td>Location : </td><td>Oreana, ID</td></tr>
    <tr><td>Distances</td><td>50</td><td>on Mar 30, 2024 starting at 07:00 am</td></tr>
  </table>
</div>

<div class="calendarRow" data-ride-id="901">
  <span class="rideName">Fun In The Sun</span>
  <span class="rideDate">Jun 8, 2024</span>
  <span class="introRide">Has Intro Ride!</span>
  <table>
    <tr><td>Ride</td><td>Location : </td><td>Ridgecrest, CA</td></tr>
    <tr><td>Distances</td><td>10</td><td>on Jun 8, 2024 starting at 08:00 am</td></tr>
    <tr><td>Distances</td><td>50</td><td>on Jun 8, 2024 starting at 06:00 am</td></tr>
  </table>
</div>

<div class="calendarRow" data-ride-id="999">
  <span class="rideName">Mystery Month Ride</span>
  <span class="rideDate">XX 15, 2024</span>
  <table>
    <tr><td>Ride</td><td>Location : </td><td>Somewhere, UT</td></tr>
  </table>
</div>

</div>
</body></html>"#;

fn parse_fixture() -> trailblaze_scraper::pipeline::processing::parser::PageParse {
    let normalized = html_normalizer::normalize(CALENDAR_FIXTURE.as_bytes());
    AercParser::new(false).parse(&normalized).unwrap()
}

#[test]
fn fixture_parses_every_row() {
    let page = parse_fixture();
    assert_eq!(page.events.len(), 8);
    assert!(page.row_errors.is_empty());
}

#[test]
fn single_day_active_event() {
    // S1: identity, dates, flags, country inference
    let page = parse_fixture();
    let outcome = normalize(AERC_SOURCE, page.events);
    let event = outcome
        .events
        .iter()
        .find(|e| e.ride_id == "12345")
        .expect("Old Pueblo present");

    assert_eq!(event.source, AERC_SOURCE);
    assert_eq!(event.name, "Old Pueblo");
    assert_eq!(event.date_start, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
    assert_eq!(event.date_end, event.date_start);
    assert_eq!(event.ride_days, 1);
    assert!(!event.is_multi_day_event);
    assert!(!event.is_pioneer_ride);
    assert!(!event.has_intro_ride);
    assert!(!event.is_canceled);
    assert_eq!(event.city.as_deref(), Some("Sonoita"));
    assert_eq!(event.state.as_deref(), Some("AZ"));
    assert_eq!(event.country.as_deref(), Some("USA"));
    assert_eq!(event.region.as_deref(), Some("SW"));
    assert_eq!(event.ride_manager.as_deref(), Some("Pat Smith"));
    assert_eq!(event.manager_email.as_deref(), Some("pat.smith@example.com"));
    assert_eq!(event.manager_phone.as_deref(), Some("(520) 555-1212"));
    assert_eq!(event.control_judges.len(), 2);
    assert_eq!(event.control_judges[0].name, "Anna Lee");

    assert_eq!(event.distances.len(), 1);
    assert_eq!(event.distances[0].distance, "50");
    assert_eq!(event.distances[0].start_time.as_deref(), Some("07:00 am"));

    assert_eq!(
        event.website_url.as_deref(),
        Some("https://oldpueblo.example.com/home")
    );
    assert_eq!(
        event.flyer_url.as_deref(),
        Some("https://oldpueblo.example.com/entry.pdf")
    );
}

#[test]
fn cancelled_event_keeps_clean_name() {
    // S2
    let page = parse_fixture();
    let outcome = normalize(AERC_SOURCE, page.events);
    let event = outcome
        .events
        .iter()
        .find(|e| e.ride_id == "77")
        .expect("Biltmore present");
    assert_eq!(event.name, "Biltmore Challenge");
    assert!(event.is_canceled);
}

#[test]
fn canadian_location_sets_country() {
    // S3
    let page = parse_fixture();
    let outcome = normalize(AERC_SOURCE, page.events);
    let event = outcome
        .events
        .iter()
        .find(|e| e.ride_id == "812")
        .expect("Spruce Woods present");
    assert_eq!(event.state.as_deref(), Some("MB"));
    assert_eq!(event.country.as_deref(), Some("Canada"));
}

#[test]
fn pioneer_rows_merge_into_one_event() {
    // S4
    let page = parse_fixture();
    let outcome = normalize(AERC_SOURCE, page.events);
    let pioneers: Vec<_> = outcome
        .events
        .iter()
        .filter(|e| e.ride_id == "500")
        .collect();
    assert_eq!(pioneers.len(), 1);
    let event = pioneers[0];

    assert_eq!(event.ride_days, 3);
    assert!(event.is_multi_day_event);
    assert!(event.is_pioneer_ride);
    assert_eq!(event.date_start, NaiveDate::from_ymd_opt(2024, 3, 28).unwrap());
    assert_eq!(event.date_end, NaiveDate::from_ymd_opt(2024, 3, 30).unwrap());

    // distances concatenate in day order, repeats intact
    assert_eq!(event.distances.len(), 3);
    let dates: Vec<_> = event.distances.iter().map(|d| d.date.unwrap()).collect();
    assert_eq!(
        dates,
        vec![
            NaiveDate::from_ymd_opt(2024, 3, 28).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 29).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 30).unwrap(),
        ]
    );
}

#[test]
fn map_link_coordinates_prefill_geocoding() {
    // S5
    let page = parse_fixture();
    let outcome = normalize(AERC_SOURCE, page.events);
    let event = outcome
        .events
        .iter()
        .find(|e| e.ride_id == "12345")
        .unwrap();
    assert!(event.geocoding_attempted);
    assert!((event.latitude.unwrap() - 37.7749).abs() < 1e-6);
    assert!((event.longitude.unwrap() + 122.4194).abs() < 1e-6);
}

#[test]
fn intro_ride_detection() {
    let page = parse_fixture();
    let outcome = normalize(AERC_SOURCE, page.events);
    let event = outcome
        .events
        .iter()
        .find(|e| e.ride_id == "901")
        .unwrap();
    assert!(event.has_intro_ride);
    assert_eq!(event.distances.len(), 2);
}

#[test]
fn unknown_month_row_is_emitted_then_counted_invalid() {
    let page = parse_fixture();
    let mystery = page
        .events
        .iter()
        .find(|e| e.name == "Mystery Month Ride")
        .expect("invalid rows are still emitted");
    assert!(mystery.invalid);
    assert!(mystery.date_start.is_none());

    let outcome = normalize(AERC_SOURCE, page.events);
    assert_eq!(outcome.invalid, 1);
    assert!(outcome.events.iter().all(|e| e.name != "Mystery Month Ride"));
}

#[test]
fn structural_failure_when_container_missing() {
    let result = AercParser::new(false).parse("<html><body><p>maintenance</p></body></html>");
    assert!(matches!(
        result,
        Err(trailblaze_core::common::error::ScraperError::Structural(_))
    ));
}

#[test]
fn page_order_is_preserved() {
    let page = parse_fixture();
    let names: Vec<_> = page.events.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names[0], "Old Pueblo");
    assert_eq!(names[1], "Biltmore Challenge");
    assert_eq!(*names.last().unwrap(), "Mystery Month Ride");
}
