use chrono::Utc;
use scraper::Html;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use trailblaze_core::common::error::{Result, ScraperError};
use trailblaze_core::domain::Event;
use trailblaze_core::storage::EventRepository;

use crate::app::ports::{DetailExtractor, ExtractionHints};
use crate::observability::MetricsSink;
use crate::pipeline::ingestion::fetcher::{FetchRequest, HttpFetcher};

/// Longest text slice handed to the extractor; covers every flyer seen
/// in practice while keeping provider cost flat.
const MAX_EXTRACT_CHARS: usize = 15_000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DetailStats {
    pub checked: u64,
    pub updated: u64,
    pub failed: u64,
}

/// Re-checks event websites and flyers on the tiered cadence and merges
/// what the extractor finds into `event_details`.
pub struct DetailEnrichmentWorker {
    repo: Arc<dyn EventRepository>,
    fetcher: Arc<HttpFetcher>,
    extractor: Arc<dyn DetailExtractor>,
    metrics: Arc<MetricsSink>,
    batch_size: usize,
    call_deadline: Duration,
}

impl DetailEnrichmentWorker {
    pub fn new(
        repo: Arc<dyn EventRepository>,
        fetcher: Arc<HttpFetcher>,
        extractor: Arc<dyn DetailExtractor>,
        metrics: Arc<MetricsSink>,
        batch_size: usize,
        call_deadline: Duration,
    ) -> Self {
        Self {
            repo,
            fetcher,
            extractor,
            metrics,
            batch_size,
            call_deadline,
        }
    }

    pub async fn run_batch(&self, limit: Option<usize>) -> Result<DetailStats> {
        let now = Utc::now();
        let targets = self.repo.list_for_detail_enrichment(now, limit).await?;
        info!(targets = targets.len(), "starting detail enrichment batch");

        let mut stats = DetailStats::default();
        // provider calls are grouped so a burst of eligible events
        // amortizes connection setup; one bad item never sinks its batch
        for batch in targets.chunks(self.batch_size) {
            for event in batch {
                stats.checked += 1;
                match self.enrich_one(event).await {
                    Ok(true) => stats.updated += 1,
                    Ok(false) => {}
                    Err(e) => {
                        stats.failed += 1;
                        warn!(
                            ride_id = %event.ride_id,
                            code = e.code(),
                            "detail enrichment failed for event: {e}"
                        );
                    }
                }
            }
        }

        self.metrics.incr("details_checked", stats.checked);
        self.metrics.incr("details_updated", stats.updated);
        self.metrics.incr("details_failed", stats.failed);
        info!(?stats, "detail enrichment batch finished");
        Ok(stats)
    }

    /// Returns whether any detail fields landed. The check timestamp is
    /// written either way so the cadence moves on.
    async fn enrich_one(&self, event: &Event) -> Result<bool> {
        let id = event.id.ok_or_else(|| {
            ScraperError::Repository("event without id in enrichment batch".into())
        })?;
        let url = event
            .website_url
            .as_deref()
            .or(event.flyer_url.as_deref())
            .ok_or_else(|| {
                ScraperError::Validation("enrichment target has no website or flyer".into())
            })?;

        let response = self
            .fetcher
            .get(FetchRequest {
                url,
                deadline: Instant::now() + self.call_deadline,
                allow_cached: true,
                validator: None,
            })
            .await?;

        let text = extract_plain_text(&String::from_utf8_lossy(&response.bytes));
        if text.trim().is_empty() {
            self.repo
                .update_details(id, &Default::default(), Utc::now())
                .await?;
            return Ok(false);
        }

        let hints = ExtractionHints {
            name: event.name.clone(),
            date_start: event.date_start.to_string(),
            location: event.location.clone(),
        };
        let patch = self
            .extractor
            .extract(&text, &hints, self.call_deadline)
            .await?;

        let found_anything = !patch.is_empty();
        self.repo.update_details(id, &patch, Utc::now()).await?;
        Ok(found_anything)
    }
}

/// Flatten HTML to newline-separated text for the extractor, truncated
/// to the provider budget on a char boundary. Runs the page through the
/// HTML normalizer first so script and style bodies never reach the
/// provider.
pub fn extract_plain_text(html: &str) -> String {
    let cleaned = crate::pipeline::processing::html_normalizer::normalize(html.as_bytes());
    let document = Html::parse_document(&cleaned);
    let mut text = document
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if text.chars().count() > MAX_EXTRACT_CHARS {
        text = text.chars().take(MAX_EXTRACT_CHARS).collect();
    }
    text
}
