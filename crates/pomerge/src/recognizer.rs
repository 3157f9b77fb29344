//! Cloud line-item recognition.
//!
//! The pipeline treats the recognizer as a black box: a table-crop image in,
//! a list of loosely-typed line-item records out. The production
//! implementation talks to the Gemini generateContent API over blocking
//! HTTP; tests use [`MockRecognizer`]. Absence of credentials disables this
//! capability only — never the pipeline.

use std::time::Duration;

use base64::Engine as _;
use image::DynamicImage;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::RecognizerConfig;
use crate::error::RecognizerError;

/// A loosely-typed record as returned by recognition. Every field tolerates
/// the type drift vision models produce (numbers as strings and vice versa);
/// an unparsable quantity coerces to 0 instead of failing the batch.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RawLineItem {
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub line_ref: Option<String>,
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub part_no: Option<String>,
    #[serde(default, deserialize_with = "de_lenient_quantity")]
    pub quantity: f64,
}

fn de_lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }))
}

fn de_lenient_quantity<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().replace(',', "").parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

/// Capability boundary for line-item recognition.
pub trait LineItemRecognizer: Send + Sync {
    fn extract_line_items(&self, crop: &DynamicImage) -> Result<Vec<RawLineItem>, RecognizerError>;
}

const PROMPT: &str = "You are an expert data extraction agent looking at a cropped image of a \
table from an invoice or purchase order. Extract the data row by row.\n\
Fields: \"line_ref\" (the line number, e.g. \"1\", \"10\", \"SL 1\"; infer from order if \
missing), \"description\" (full description text), \"part_no\" (part number, SKU or material \
number), \"quantity\" (numeric quantity).\n\
Output a pure JSON list of objects and nothing else. If the image contains no legible table \
data, return []";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Blocking Gemini client with a model priority list and bounded
/// rate-limit retries.
#[derive(Debug)]
pub struct GeminiRecognizer {
    base_url: String,
    api_key: String,
    models: Vec<String>,
    max_retries: u32,
    client: reqwest::blocking::Client,
}

impl GeminiRecognizer {
    /// Builds the client, reading the API key from the configured
    /// environment variable.
    pub fn from_config(config: &RecognizerConfig) -> Result<Self, RecognizerError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| RecognizerError::MissingApiKey(config.api_key_env.clone()))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RecognizerError::Http(e.to_string()))?;

        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            models: config.models.clone(),
            max_retries: config.max_retries,
            client,
        })
    }

    fn encode_crop(crop: &DynamicImage) -> Result<String, RecognizerError> {
        let mut png = Vec::new();
        crop.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| RecognizerError::EncodeImage(e.to_string()))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(png))
    }

    /// One generateContent call against one model, with rate-limit retries.
    fn call_model(&self, model: &str, image_b64: &str) -> Result<String, RecognizerError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );
        let body = GenerateContentRequest::new(PROMPT, image_b64);

        let mut attempt = 0u32;
        loop {
            let response = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .map_err(|e| RecognizerError::Http(e.to_string()))?;

            let status = response.status();
            if status.as_u16() == 429 {
                if attempt >= self.max_retries {
                    return Err(RecognizerError::RateLimited { attempts: attempt });
                }
                let wait = Duration::from_secs(2u64.pow(attempt) + 1);
                log::warn!(
                    "Rate limited by {} (attempt {}); retrying in {:?}",
                    model,
                    attempt + 1,
                    wait
                );
                std::thread::sleep(wait);
                attempt += 1;
                continue;
            }

            if !status.is_success() {
                let body = response.text().unwrap_or_default();
                return Err(RecognizerError::Api {
                    status: status.as_u16(),
                    body,
                });
            }

            let parsed: GenerateContentResponse = response
                .json()
                .map_err(|e| RecognizerError::ResponseParsing(e.to_string()))?;
            return parsed
                .first_text()
                .ok_or_else(|| RecognizerError::ResponseParsing("empty response".to_string()));
        }
    }
}

impl LineItemRecognizer for GeminiRecognizer {
    fn extract_line_items(&self, crop: &DynamicImage) -> Result<Vec<RawLineItem>, RecognizerError> {
        let image_b64 = Self::encode_crop(crop)?;

        for model in &self.models {
            let raw_text = match self.call_model(model, &image_b64) {
                Ok(text) => text,
                Err(e) => {
                    log::warn!("Model {} failed: {}", model, e);
                    continue;
                }
            };

            match parse_line_items(&raw_text) {
                Ok(items) => return Ok(items),
                Err(e) => {
                    log::warn!("Model {} returned unparsable items: {}", model, e);
                    continue;
                }
            }
        }

        Err(RecognizerError::AllModelsFailed)
    }
}

/// Strips markdown code fences and parses the JSON item list.
pub fn parse_line_items(raw: &str) -> Result<Vec<RawLineItem>, RecognizerError> {
    let cleaned = raw
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string();

    if cleaned.is_empty() {
        return Err(RecognizerError::ResponseParsing(
            "response carried no JSON".to_string(),
        ));
    }

    serde_json::from_str(&cleaned).map_err(|e| RecognizerError::ResponseParsing(e.to_string()))
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
}

#[derive(Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text {
        text: String,
    },
    Image {
        inline_data: InlineData,
    },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

impl GenerateContentRequest {
    fn new(prompt: &str, image_b64: &str) -> Self {
        Self {
            contents: vec![RequestContent {
                parts: vec![
                    RequestPart::Text {
                        text: prompt.to_string(),
                    },
                    RequestPart::Image {
                        inline_data: InlineData {
                            mime_type: "image/png".to_string(),
                            data: image_b64.to_string(),
                        },
                    },
                ],
            }],
        }
    }
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn first_text(&self) -> Option<String> {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
            .find_map(|p| p.text.clone())
    }
}

/// Recognizer double for tests: returns a configured response or error.
pub struct MockRecognizer {
    items: Vec<RawLineItem>,
    fail: bool,
}

impl MockRecognizer {
    pub fn new(items: Vec<RawLineItem>) -> Self {
        Self { items, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            items: Vec::new(),
            fail: true,
        }
    }
}

impl LineItemRecognizer for MockRecognizer {
    fn extract_line_items(
        &self,
        _crop: &DynamicImage,
    ) -> Result<Vec<RawLineItem>, RecognizerError> {
        if self.fail {
            return Err(RecognizerError::AllModelsFailed);
        }
        Ok(self.items.clone())
    }
}
