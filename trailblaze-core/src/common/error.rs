use thiserror::Error;

/// Failure classes for a single HTTP fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchErrorKind {
    #[error("request deadline exceeded")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("retry budget exhausted")]
    ExceededRetries,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} for {url}")]
pub struct FetchError {
    pub url: String,
    pub kind: FetchErrorKind,
}

impl FetchError {
    pub fn new(url: impl Into<String>, kind: FetchErrorKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }

    /// A 429 or any 5xx is worth retrying; other statuses are not.
    pub fn retriable(&self) -> bool {
        match self.kind {
            FetchErrorKind::Timeout | FetchErrorKind::Network(_) => true,
            FetchErrorKind::HttpStatus(code) => code == 429 || code >= 500,
            FetchErrorKind::ExceededRetries => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("structural parse failure: {0}")]
    Structural(String),

    #[error("row parse failure: {0}")]
    RowParse(String),

    #[error("validation failure: {0}")]
    Validation(String),

    #[error("repository error: {0}")]
    Repository(String),

    #[error("geocoder error: {message}")]
    Geocoder { message: String, permanent: bool },

    #[error("detail extractor error: {0}")]
    DetailExtractor(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScraperError {
    /// Stable code for dashboards; log lines carry this verbatim.
    pub fn code(&self) -> &'static str {
        match self {
            ScraperError::Config(_) => "E_CONFIG",
            ScraperError::Fetch(e) => match e.kind {
                FetchErrorKind::Timeout => "E_FETCH_TIMEOUT",
                FetchErrorKind::Network(_) => "E_FETCH_NETWORK",
                FetchErrorKind::HttpStatus(_) => "E_FETCH_STATUS",
                FetchErrorKind::ExceededRetries => "E_FETCH_RETRIES",
            },
            ScraperError::Structural(_) => "E_STRUCTURAL",
            ScraperError::RowParse(_) => "E_ROW_PARSE",
            ScraperError::Validation(_) => "E_VALIDATION",
            ScraperError::Repository(_) => "E_REPOSITORY",
            ScraperError::Geocoder { permanent, .. } => {
                if *permanent {
                    "E_GEOCODER_PERMANENT"
                } else {
                    "E_GEOCODER_RETRIABLE"
                }
            }
            ScraperError::DetailExtractor(_) => "E_DETAIL_EXTRACTOR",
            ScraperError::Cancelled => "E_CANCELLED",
            ScraperError::Io(_) => "E_IO",
            ScraperError::Json(_) => "E_JSON",
        }
    }
}

pub type Result<T> = std::result::Result<T, ScraperError>;
