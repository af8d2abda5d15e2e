use clap::{Parser, Subcommand};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use trailblaze_core::common::error::ScraperError;
use trailblaze_core::domain::{RunStatus, AERC_SOURCE};
use trailblaze_core::storage::{DatabaseStorage, EventRepository};
use trailblaze_core::DatabaseManager;

use trailblaze_scraper::app::ports::{DetailExtractor, Geocoder};
use trailblaze_scraper::config::{GeocodingProvider, Settings};
use trailblaze_scraper::enrichment::{DetailEnrichmentWorker, GeocodeWorker};
use trailblaze_scraper::infra::gemini::GeminiExtractor;
use trailblaze_scraper::infra::geocoders::{GoogleGeocoder, NominatimGeocoder};
use trailblaze_scraper::observability::{logging, MetricsSink};
use trailblaze_scraper::pipeline::ingestion::cache::{ContentCache, GeocodeCache};
use trailblaze_scraper::pipeline::ingestion::fetcher::{
    default_client, FetcherConfig, HttpFetcher,
};
use trailblaze_scraper::pipeline::ingestion::rate_limiter::RateLimiter;
use trailblaze_scraper::pipeline::orchestrator::ScrapeOrchestrator;
use trailblaze_scraper::pipeline::CancelFlag;
use trailblaze_scraper::scheduler::{ClockScheduler, Job};

/// Detail pages change daily at most; their cache entries live longer
/// than calendar HTML.
const DETAIL_CACHE_TTL: Duration = Duration::from_secs(86_400);

#[derive(Parser)]
#[command(name = "trailblaze-scraper")]
#[command(about = "AERC calendar scraper and enrichment workers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// One-shot scrape run against a source calendar
    RunScrape {
        /// Source to scrape (only AERC is wired up today)
        #[arg(long, default_value = AERC_SOURCE)]
        source: String,
    },
    /// Batch-geocode events that have never been through an attempt
    EnrichGeocode {
        /// Maximum number of events to process
        #[arg(long, conflicts_with = "all")]
        limit: Option<usize>,
        /// Process the whole backlog
        #[arg(long)]
        all: bool,
    },
    /// Re-check event websites and flyers on the tiered cadence
    EnrichDetails {
        /// Maximum number of events to process
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Apply schema migrations and exit
    Migrate,
    /// Run the scheduler daemon with the scrape and enrichment jobs
    Serve,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };
    logging::init_logging(settings.scraper_debug);

    match run(cli.command, settings).await {
        Ok(code) => code,
        Err(e) => {
            error!(code = e.code(), "fatal: {e}");
            match e {
                ScraperError::Config(_) => ExitCode::from(1),
                _ => ExitCode::from(3),
            }
        }
    }
}

async fn run(command: Commands, settings: Settings) -> Result<ExitCode, ScraperError> {
    let metrics = Arc::new(MetricsSink::new());
    let manager = DatabaseManager::connect(&settings.database_url).await?;
    manager.run_migrations().await?;
    if matches!(command, Commands::Migrate) {
        info!("migrations applied");
        return Ok(ExitCode::SUCCESS);
    }
    let repo: Arc<dyn EventRepository> = Arc::new(DatabaseStorage::new(&manager)?);

    match command {
        Commands::Migrate => unreachable!("handled above"),
        Commands::RunScrape { source } => {
            if !source.eq_ignore_ascii_case(AERC_SOURCE) {
                return Err(ScraperError::Config(format!(
                    "unknown source '{source}'; only {AERC_SOURCE} is supported"
                )));
            }
            let orchestrator = build_orchestrator(&settings, &repo, &metrics)?;
            let report = orchestrator.run(CancelFlag::new()).await?;
            println!(
                "run {} finished: {} ({} inserted, {} updated, {} skipped, {} invalid)",
                report.run_id,
                report.status.as_str(),
                report.counts.inserted,
                report.counts.updated,
                report.counts.skipped,
                report.counts.invalid
            );
            Ok(match report.status {
                RunStatus::Ok => ExitCode::SUCCESS,
                RunStatus::Degraded | RunStatus::TimedOut => ExitCode::from(2),
            })
        }
        Commands::EnrichGeocode { limit, all } => {
            let worker = build_geocode_worker(&settings, &repo, &metrics)?;
            let limit = if all { None } else { limit.or(Some(50)) };
            let stats = worker.run_batch(limit).await?;
            println!(
                "geocoded {} of {} events ({} unknown, {} failed)",
                stats.geocoded, stats.processed, stats.unknown, stats.failed
            );
            Ok(if stats.failed > 0 {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            })
        }
        Commands::EnrichDetails { limit } => {
            let worker = build_detail_worker(&settings, &repo, &metrics)?;
            let stats = worker.run_batch(limit).await?;
            println!(
                "checked {} events, {} updated, {} failed",
                stats.checked, stats.updated, stats.failed
            );
            Ok(if stats.failed > 0 {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            })
        }
        Commands::Serve => serve(settings, repo, metrics).await,
    }
}

async fn serve(
    settings: Settings,
    repo: Arc<dyn EventRepository>,
    metrics: Arc<MetricsSink>,
) -> Result<ExitCode, ScraperError> {
    let orchestrator = Arc::new(build_orchestrator(&settings, &repo, &metrics)?);
    let geocode_worker = Arc::new(build_geocode_worker(&settings, &repo, &metrics)?);
    let detail_worker = Arc::new(build_detail_worker(&settings, &repo, &metrics)?);

    let cancel = CancelFlag::new();
    let mut scheduler = ClockScheduler::new(Arc::clone(&metrics));

    {
        let orchestrator = Arc::clone(&orchestrator);
        let cancel = cancel.clone();
        scheduler.add_job(Job::new(
            "scrape",
            &settings.scrape_schedule,
            move |run_id: Uuid| {
                let orchestrator = Arc::clone(&orchestrator);
                let cancel = cancel.clone();
                Box::pin(async move {
                    if let Err(e) = orchestrator.run_with_id(run_id, cancel).await {
                        error!(code = e.code(), "scheduled scrape failed: {e}");
                    }
                })
            },
        )?);
    }
    {
        let geocode_worker = Arc::clone(&geocode_worker);
        let detail_worker = Arc::clone(&detail_worker);
        scheduler.add_job(Job::new(
            "enrichment",
            &settings.enrichment_schedule,
            move |_run_id: Uuid| {
                let geocode_worker = Arc::clone(&geocode_worker);
                let detail_worker = Arc::clone(&detail_worker);
                Box::pin(async move {
                    if let Err(e) = geocode_worker.run_batch(None).await {
                        error!(code = e.code(), "scheduled geocoding failed: {e}");
                    }
                    if let Err(e) = detail_worker.run_batch(None).await {
                        error!(code = e.code(), "scheduled detail enrichment failed: {e}");
                    }
                })
            },
        )?);
    }

    scheduler.report_missed("scrape", repo.last_run_started_at(AERC_SOURCE).await?);

    // location-changed hook: writers on the read side push event ids
    // into this queue; the worker consumes alongside its schedule
    let (trigger_tx, trigger_rx) = tokio::sync::mpsc::channel(64);
    let trigger_task = {
        let geocode_worker = Arc::clone(&geocode_worker);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            geocode_worker.consume_triggers(trigger_rx, cancel).await;
        })
    };

    info!(
        scrape = %settings.scrape_schedule,
        enrichment = %settings.enrichment_schedule,
        "scheduler running, ctrl-c to stop"
    );

    let scheduler_task = tokio::spawn(scheduler.run(cancel.clone()));
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| ScraperError::Config(format!("signal handler: {e}")))?;
    info!("shutdown requested");
    cancel.cancel();
    drop(trigger_tx);
    let _ = scheduler_task.await;
    let _ = trigger_task.await;
    Ok(ExitCode::SUCCESS)
}

fn build_fetcher(
    settings: &Settings,
    metrics: &Arc<MetricsSink>,
    cache_subdir: &str,
    cache_ttl: Duration,
) -> Result<Arc<HttpFetcher>, ScraperError> {
    let cache = Arc::new(ContentCache::new(
        Path::new(&settings.cache_dir).join(cache_subdir),
        settings.scraper_refresh,
    )?);
    Ok(Arc::new(HttpFetcher::new(
        default_client(),
        RateLimiter::new(settings.requests_per_second, settings.burst),
        cache,
        FetcherConfig {
            max_retries: settings.max_retries,
            base_delay: settings.base_delay,
            request_timeout: settings.request_timeout,
            cache_ttl,
        },
        Arc::clone(metrics),
    )))
}

fn build_orchestrator(
    settings: &Settings,
    repo: &Arc<dyn EventRepository>,
    metrics: &Arc<MetricsSink>,
) -> Result<ScrapeOrchestrator, ScraperError> {
    let fetcher = build_fetcher(settings, metrics, "html", settings.cache_ttl_html)?;
    Ok(ScrapeOrchestrator::new(
        fetcher,
        Arc::clone(repo),
        settings.clone(),
        Arc::clone(metrics),
    ))
}

fn build_geocode_worker(
    settings: &Settings,
    repo: &Arc<dyn EventRepository>,
    metrics: &Arc<MetricsSink>,
) -> Result<GeocodeWorker, ScraperError> {
    let geocoder: Arc<dyn Geocoder> = match settings.geocoding_provider {
        GeocodingProvider::Nominatim => Arc::new(NominatimGeocoder::new(
            default_client(),
            settings.geocoding_user_agent.clone(),
        )),
        GeocodingProvider::Google => Arc::new(GoogleGeocoder::new(
            default_client(),
            settings.geocoding_api_key.clone(),
        )),
    };
    let cache = GeocodeCache::new(
        Path::new(&settings.cache_dir).join("geocode"),
        settings.cache_ttl_geocode,
        settings.cache_ttl_geocode_negative,
    )?;
    Ok(GeocodeWorker::new(
        Arc::clone(repo),
        geocoder,
        cache,
        Arc::clone(metrics),
        settings.max_retries,
        settings.base_delay,
        settings.request_timeout,
    ))
}

fn build_detail_worker(
    settings: &Settings,
    repo: &Arc<dyn EventRepository>,
    metrics: &Arc<MetricsSink>,
) -> Result<DetailEnrichmentWorker, ScraperError> {
    if settings.gemini_api_key.is_empty() {
        return Err(ScraperError::Config(
            "GEMINI_API_KEY is required for detail enrichment".to_string(),
        ));
    }
    let fetcher = build_fetcher(settings, metrics, "details", DETAIL_CACHE_TTL)?;
    let extractor: Arc<dyn DetailExtractor> = Arc::new(GeminiExtractor::new(
        default_client(),
        settings.gemini_api_key.clone(),
        settings.gemini_model.clone(),
    ));
    Ok(DetailEnrichmentWorker::new(
        Arc::clone(repo),
        fetcher,
        extractor,
        Arc::clone(metrics),
        settings.detail_batch_size,
        settings.request_timeout,
    ))
}
