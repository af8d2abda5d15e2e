use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use trailblaze_core::common::error::{Result, ScraperError};
use trailblaze_core::domain::EventDetails;

use crate::app::ports::{DetailExtractor, ExtractionHints};

/// Keys the extractor is asked for; anything else the model volunteers
/// is kept as-is in the open map.
const DETAIL_FIELDS: &[&str] = &[
    "description",
    "directions",
    "amenities",
    "hazards",
    "veterinarians",
    "registration_info",
    "cost_info",
    "contact_details",
    "requirements",
    "highlights",
    "organizer",
    "start_time",
    "end_time",
];

/// Gemini-backed `DetailExtractor`. Speaks the generateContent REST API
/// directly; no vendor SDK.
pub struct GeminiExtractor {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiExtractor {
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_prompt(&self, text: &str, hints: &ExtractionHints) -> String {
        let fields = DETAIL_FIELDS
            .iter()
            .map(|f| format!("    \"{f}\": \"\""))
            .collect::<Vec<_>>()
            .join(",\n");
        format!(
            "Extract detailed information about this endurance riding event.\n\n\
             Event Name: {}\nDate: {}\nLocation: {}\n\n\
             Text content from the event website:\n{}\n\n\
             Return a single JSON object with these fields, leaving a field \
             as an empty string when the text does not mention it:\n{{\n{fields}\n}}",
            hints.name, hints.date_start, hints.location, text
        )
    }
}

/// The model wraps JSON in markdown fences more often than not; accept
/// fenced, bare, and embedded-object responses.
pub(crate) fn parse_json_response(raw: &str) -> Option<Map<String, Value>> {
    let candidate = if let Some(fenced) = raw.split("```json").nth(1) {
        fenced.split("```").next().unwrap_or("")
    } else if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        &raw[start..=end]
    } else {
        return None;
    };
    serde_json::from_str::<Value>(candidate.trim())
        .ok()?
        .as_object()
        .cloned()
}

#[async_trait]
impl DetailExtractor for GeminiExtractor {
    async fn extract(
        &self,
        text: &str,
        hints: &ExtractionHints,
        deadline: Duration,
    ) -> Result<EventDetails> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = json!({
            "contents": [{"parts": [{"text": self.build_prompt(text, hints)}]}],
            "generationConfig": {"temperature": 0.1}
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| ScraperError::DetailExtractor(format!("transport: {e}")))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(ScraperError::DetailExtractor(format!("HTTP {status}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ScraperError::DetailExtractor(format!("payload: {e}")))?;
        let answer = payload
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ScraperError::DetailExtractor("response carried no candidate text".to_string())
            })?;

        let Some(parsed) = parse_json_response(answer) else {
            warn!(event = %hints.name, "extractor response was not parseable JSON");
            return Err(ScraperError::DetailExtractor(
                "candidate text was not valid JSON".to_string(),
            ));
        };

        let mut details = EventDetails::new();
        for (key, value) in parsed {
            match &value {
                Value::String(s) if s.trim().is_empty() => continue,
                Value::Null => continue,
                _ => details.insert(key, value),
            }
        }
        debug!(event = %hints.name, keys = details.0.len(), "extracted detail fields");
        Ok(details)
    }
}
