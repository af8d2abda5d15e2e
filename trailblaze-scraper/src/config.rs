use std::env;
use std::str::FromStr;
use std::time::Duration;

use trailblaze_core::common::error::{Result, ScraperError};

/// Geocoding backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeocodingProvider {
    Nominatim,
    Google,
}

impl FromStr for GeocodingProvider {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nominatim" => Ok(GeocodingProvider::Nominatim),
            "google" => Ok(GeocodingProvider::Google),
            other => Err(ScraperError::Config(format!(
                "unknown geocoding provider '{other}' (expected nominatim or google)"
            ))),
        }
    }
}

/// Process configuration, loaded from the environment (`.env` honoured).
/// Invalid values are fatal at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub geocoding_api_key: String,
    pub geocoding_provider: GeocodingProvider,
    pub geocoding_user_agent: String,

    pub requests_per_second: f64,
    pub burst: u32,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub request_timeout: Duration,
    pub run_deadline: Duration,

    pub cache_dir: String,
    pub cache_ttl_html: Duration,
    pub cache_ttl_geocode: Duration,
    /// Short TTL for negative geocode results so corrections land soon.
    pub cache_ttl_geocode_negative: Duration,

    pub scraper_debug: bool,
    pub scraper_refresh: bool,
    pub scraper_validate: bool,

    pub scrape_schedule: String,
    pub enrichment_schedule: String,

    pub upsert_concurrency: usize,
    pub detail_batch_size: usize,

    pub calendar_url: String,
    pub calendar_ajax_url: String,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = var_or(key, default);
    raw.parse().map_err(|e| {
        ScraperError::Config(format!("invalid value '{raw}' for {key}: {e}"))
    })
}

fn parse_bool(key: &str) -> bool {
    env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let settings = Self {
            database_url: var_or("DATABASE_URL", "file:trailblaze.db"),
            gemini_api_key: var_or("GEMINI_API_KEY", ""),
            gemini_model: var_or("GEMINI_MODEL", "gemini-2.0-flash-lite"),
            geocoding_api_key: var_or("GEOCODING_API_KEY", ""),
            geocoding_provider: var_or("GEOCODING_PROVIDER", "nominatim").parse()?,
            geocoding_user_agent: var_or("GEOCODING_USER_AGENT", "TrailBlazeApp/1.0"),
            requests_per_second: parse_var("REQUESTS_PER_SECOND", "1.0")?,
            burst: parse_var("BURST", "3")?,
            max_retries: parse_var("MAX_RETRIES", "3")?,
            base_delay: Duration::from_millis(parse_var("BASE_DELAY_MS", "5000")?),
            request_timeout: Duration::from_secs(parse_var("REQUEST_TIMEOUT_S", "30")?),
            run_deadline: Duration::from_secs(parse_var("RUN_DEADLINE_S", "1800")?),
            cache_dir: var_or("CACHE_DIR", "cache"),
            cache_ttl_html: Duration::from_secs(parse_var("CACHE_TTL_HTML_S", "3600")?),
            cache_ttl_geocode: Duration::from_secs(parse_var(
                "CACHE_TTL_GEOCODE_S",
                "1209600", // two weeks
            )?),
            cache_ttl_geocode_negative: Duration::from_secs(parse_var(
                "CACHE_TTL_GEOCODE_NEGATIVE_S",
                "21600", // six hours
            )?),
            scraper_debug: parse_bool("SCRAPER_DEBUG"),
            scraper_refresh: parse_bool("SCRAPER_REFRESH"),
            scraper_validate: parse_bool("SCRAPER_VALIDATE"),
            scrape_schedule: var_or("SCRAPE_SCHEDULE", "0 0 2 * * *"),
            enrichment_schedule: var_or("ENRICHMENT_SCHEDULE", "0 30 3 * * *"),
            upsert_concurrency: parse_var("UPSERT_CONCURRENCY", "8")?,
            detail_batch_size: parse_var("DETAIL_BATCH_SIZE", "5")?,
            calendar_url: var_or("AERC_CALENDAR_URL", "https://aerc.org/calendar"),
            calendar_ajax_url: var_or(
                "AERC_CALENDAR_AJAX_URL",
                "https://aerc.org/wp-admin/admin-ajax.php",
            ),
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.requests_per_second <= 0.0 {
            return Err(ScraperError::Config(
                "REQUESTS_PER_SECOND must be positive".to_string(),
            ));
        }
        if self.burst == 0 {
            return Err(ScraperError::Config("BURST must be at least 1".to_string()));
        }
        if self.upsert_concurrency == 0 {
            return Err(ScraperError::Config(
                "UPSERT_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        if self.detail_batch_size == 0 {
            return Err(ScraperError::Config(
                "DETAIL_BATCH_SIZE must be at least 1".to_string(),
            ));
        }
        if self.geocoding_provider == GeocodingProvider::Nominatim
            && self.geocoding_user_agent.is_empty()
        {
            return Err(ScraperError::Config(
                "GEOCODING_USER_AGENT is required for the nominatim provider".to_string(),
            ));
        }
        if self.geocoding_provider == GeocodingProvider::Google
            && self.geocoding_api_key.is_empty()
        {
            return Err(ScraperError::Config(
                "GEOCODING_API_KEY is required for the google provider".to_string(),
            ));
        }
        for (name, spec) in [
            ("SCRAPE_SCHEDULE", &self.scrape_schedule),
            ("ENRICHMENT_SCHEDULE", &self.enrichment_schedule),
        ] {
            cron::Schedule::from_str(spec).map_err(|e| {
                ScraperError::Config(format!("invalid cron expression for {name}: {e}"))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parsing() {
        assert_eq!(
            "nominatim".parse::<GeocodingProvider>().unwrap(),
            GeocodingProvider::Nominatim
        );
        assert_eq!(
            "Google".parse::<GeocodingProvider>().unwrap(),
            GeocodingProvider::Google
        );
        assert!("mapquest".parse::<GeocodingProvider>().is_err());
    }
}
