use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use trailblaze_core::common::error::{Result, ScraperError};
use trailblaze_core::domain::{RunReport, RunStatus, UpsertOutcome, AERC_SOURCE};
use trailblaze_core::storage::EventRepository;

use crate::config::Settings;
use crate::observability::MetricsSink;
use crate::pipeline::ingestion::fetcher::{FetchRequest, HttpFetcher};
use crate::pipeline::processing::html_normalizer;
use crate::pipeline::processing::normalize;
use crate::pipeline::processing::parser::{AercParser, RawEvent};
use crate::pipeline::CancelFlag;

/// Wires fetcher → normalizer → parser → event normalizer → repository
/// for one scheduled or ad-hoc run, and owns the partial-failure policy:
/// a bad page is skipped, a run with zero valid events is `Degraded`,
/// and two consecutive degraded runs raise an alert.
pub struct ScrapeOrchestrator {
    fetcher: Arc<HttpFetcher>,
    repo: Arc<dyn EventRepository>,
    settings: Settings,
    metrics: Arc<MetricsSink>,
}

impl ScrapeOrchestrator {
    pub fn new(
        fetcher: Arc<HttpFetcher>,
        repo: Arc<dyn EventRepository>,
        settings: Settings,
        metrics: Arc<MetricsSink>,
    ) -> Self {
        Self {
            fetcher,
            repo,
            settings,
            metrics,
        }
    }

    pub async fn run(&self, cancel: CancelFlag) -> Result<RunReport> {
        self.run_with_id(uuid::Uuid::new_v4(), cancel).await
    }

    /// Scheduler-invoked entry point: the firing's run id becomes the
    /// report's run id.
    pub async fn run_with_id(&self, run_id: uuid::Uuid, cancel: CancelFlag) -> Result<RunReport> {
        let mut report = RunReport::new(AERC_SOURCE);
        report.run_id = run_id;
        let deadline = Instant::now() + self.settings.run_deadline;
        info!(run_id = %report.run_id, "starting scrape run");

        let pages = match self.discover_pages(deadline).await {
            Ok(pages) => pages,
            Err(e) => {
                error!(code = e.code(), "page discovery failed: {e}");
                report.record_error(&e, None);
                Vec::new()
            }
        };

        let parser = AercParser::new(self.settings.scraper_debug);
        let mut raw_events: Vec<RawEvent> = Vec::new();
        let mut timed_out = false;

        for page_url in &pages {
            if cancel.is_cancelled() {
                report.record_error(&ScraperError::Cancelled, Some(page_url));
                break;
            }
            if Instant::now() >= deadline {
                timed_out = true;
                break;
            }

            match self.fetch_page(page_url, deadline).await {
                Ok(html) => {
                    report.counts.fetched += 1;
                    let normalized = html_normalizer::normalize(html.as_bytes());
                    match parser.parse(&normalized) {
                        Ok(page) => {
                            for row_error in &page.row_errors {
                                report.record_error(
                                    &ScraperError::RowParse(row_error.message.clone()),
                                    Some(page_url),
                                );
                            }
                            info!(
                                page = %page_url,
                                rows = page.events.len(),
                                row_errors = page.row_errors.len(),
                                "parsed calendar page"
                            );
                            raw_events.extend(page.events);
                        }
                        Err(e) => {
                            warn!(page = %page_url, code = e.code(), "page skipped: {e}");
                            report.record_error(&e, Some(page_url));
                        }
                    }
                }
                Err(e) => {
                    warn!(page = %page_url, code = e.code(), "fetch failed, page skipped: {e}");
                    report.record_error(&e, Some(page_url));
                }
            }
        }

        let outcome = normalize::normalize(AERC_SOURCE, raw_events);
        for message in &outcome.errors {
            report.record_error(&ScraperError::Validation(message.clone()), None);
        }
        report.counts.invalid = outcome.invalid;
        report.counts.valid = outcome.events.len() as u64;
        report.counts.parsed = report.counts.valid + report.counts.invalid;
        report.counts.canceled = outcome.events.iter().filter(|e| e.is_canceled).count() as u64;

        // upserts for distinct identities may land in any order
        let semaphore = Arc::new(Semaphore::new(self.settings.upsert_concurrency));
        let mut tasks: JoinSet<(String, Result<UpsertOutcome>)> = JoinSet::new();
        for event in outcome.events {
            if cancel.is_cancelled() || Instant::now() >= deadline {
                timed_out = timed_out || Instant::now() >= deadline;
                report.counts.skipped += 1;
                continue;
            }
            let repo = Arc::clone(&self.repo);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                let name = event.name.clone();
                (name, repo.upsert_event(&event).await)
            });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(UpsertOutcome::Inserted))) => report.counts.inserted += 1,
                Ok((_, Ok(UpsertOutcome::Updated))) => report.counts.updated += 1,
                Ok((_, Ok(UpsertOutcome::Unchanged))) => report.counts.skipped += 1,
                Ok((name, Err(e))) => {
                    warn!(event = %name, code = e.code(), "upsert failed: {e}");
                    report.counts.skipped += 1;
                    report.record_error(&e, None);
                }
                Err(e) => {
                    report.counts.skipped += 1;
                    report
                        .record_error(&ScraperError::Repository(format!("task join: {e}")), None);
                }
            }
        }

        report.status = if timed_out {
            RunStatus::TimedOut
        } else if report.counts.valid == 0 {
            RunStatus::Degraded
        } else {
            RunStatus::Ok
        };
        report.ended_at = Some(chrono::Utc::now());

        debug_assert!(report.counts.balanced());
        self.publish_metrics(&report);

        if report.status == RunStatus::Degraded {
            let previous = self.repo.recent_run_statuses(AERC_SOURCE, 1).await?;
            if previous.first() == Some(&RunStatus::Degraded) {
                self.metrics.alert(
                    "consecutive_degraded_runs",
                    "two consecutive scrape runs produced zero valid events",
                );
            }
        }

        self.repo.insert_run_report(&report).await?;
        info!(
            run_id = %report.run_id,
            status = report.status.as_str(),
            inserted = report.counts.inserted,
            updated = report.counts.updated,
            skipped = report.counts.skipped,
            invalid = report.counts.invalid,
            "scrape run finished"
        );
        Ok(report)
    }

    /// Enumerate season windows from the calendar page. Each season id
    /// becomes one AJAX page URL; a page without season inputs is
    /// treated as a single calendar page (fixture mirrors do this).
    async fn discover_pages(&self, deadline: Instant) -> Result<Vec<String>> {
        let html = self.fetch_page(&self.settings.calendar_url, deadline).await?;

        let document = Html::parse_document(&html);
        let season_selector = Selector::parse(r#"input[name="season[]"]"#).unwrap();
        let season_ids: Vec<String> = document
            .select(&season_selector)
            .filter_map(|input| input.value().attr("value"))
            .map(|v| v.to_string())
            .take(2) // current and next season
            .collect();

        if season_ids.is_empty() {
            info!("no season inputs found, scraping the calendar page directly");
            return Ok(vec![self.settings.calendar_url.clone()]);
        }

        Ok(season_ids
            .iter()
            .map(|season| {
                format!(
                    "{}?action=aerc_calendar_form&calendar=calendar&distance[]=any&season[]={}",
                    self.settings.calendar_ajax_url, season
                )
            })
            .collect())
    }

    /// Fetch one page and unwrap the calendar AJAX envelope: the
    /// endpoint returns `{"html": "..."}`; plain HTML passes through.
    async fn fetch_page(&self, url: &str, deadline: Instant) -> Result<String> {
        let validator = |bytes: &[u8]| {
            !bytes.is_empty() && String::from_utf8_lossy(bytes).contains("calendarRow")
        };
        let response = self
            .fetcher
            .get(FetchRequest {
                url,
                deadline,
                allow_cached: !self.settings.scraper_refresh,
                validator: if self.settings.scraper_validate {
                    Some(&validator)
                } else {
                    None
                },
            })
            .await?;

        let text = String::from_utf8_lossy(&response.bytes).into_owned();
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
            if let Some(html) = value.get("html").and_then(|v| v.as_str()) {
                return Ok(html.to_string());
            }
        }
        Ok(text)
    }

    fn publish_metrics(&self, report: &RunReport) {
        let counts = &report.counts;
        for (name, value) in [
            ("scrape_pages_fetched", counts.fetched),
            ("scrape_events_parsed", counts.parsed),
            ("scrape_events_valid", counts.valid),
            ("scrape_events_invalid", counts.invalid),
            ("scrape_events_inserted", counts.inserted),
            ("scrape_events_updated", counts.updated),
            ("scrape_events_skipped", counts.skipped),
            ("scrape_events_canceled", counts.canceled),
        ] {
            self.metrics.incr(name, value);
        }
        self.metrics.incr("scrape_runs", 1);
        if report.status == RunStatus::Degraded {
            self.metrics.incr("scrape_runs_degraded", 1);
        }
    }
}
