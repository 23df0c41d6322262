//! Generation client: turns a text prompt into image bytes.
//!
//! [`ImageGenerator`] is the seam the acquisition pipeline talks to.
//! [`GeminiClient`] implements it against the Gemini `generateContent`
//! endpoint with a blocking `reqwest` client; the pipeline runs on its own
//! thread, so nothing here needs an async runtime.
//!
//! Failures are sorted into two classes, [`FailureClass::RateLimited`] and
//! [`FailureClass::Transient`], which pick the retry delay. Structured signals
//! (HTTP 429, an error status of `RESOURCE_EXHAUSTED`) decide first; the
//! message substrings the service has historically used are the fallback.

use crate::config::GenerationConfig;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Message fragments that mark a rate-limit or upstream overload when the
/// response carries no structured signal.
const RATE_LIMIT_MARKERS: &[&str] = &["429", "RESOURCE_EXHAUSTED", "Rpc failed"];

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("generation service returned {status}: {message}")]
    Http {
        status: u16,
        /// Error status from the response body (e.g. `RESOURCE_EXHAUSTED`).
        code: Option<String>,
        message: String,
    },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("no image data in response")]
    NoImage,
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("{0}")]
    Other(String),
}

/// How a failed generation call should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Quota exhausted or upstream overloaded: long linear backoff.
    RateLimited,
    /// Anything else: short exponential backoff.
    Transient,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => f.write_str("rate limited"),
            Self::Transient => f.write_str("transient"),
        }
    }
}

impl GenerationError {
    pub fn class(&self) -> FailureClass {
        if let Self::Http { status, code, .. } = self
            && (*status == 429 || code.as_deref() == Some("RESOURCE_EXHAUSTED"))
        {
            return FailureClass::RateLimited;
        }
        classify_message(&self.to_string())
    }
}

/// Legacy classification by message content.
pub fn classify_message(message: &str) -> FailureClass {
    if RATE_LIMIT_MARKERS.iter().any(|m| message.contains(m)) {
        FailureClass::RateLimited
    } else {
        FailureClass::Transient
    }
}

/// Image bytes as delivered by the generator, before any re-encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// A text-to-image generator.
pub trait ImageGenerator {
    fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerationError>;
}

/// API credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Client for the Gemini image generation endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    endpoint: String,
    model: String,
    api_key: ApiKey,
    client: Client,
}

impl GeminiClient {
    pub fn new(api_key: ApiKey, config: &GenerationConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            client,
        })
    }

    pub fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }
}

impl ImageGenerator for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerationError> {
        let url = self.url();
        debug!(%url, "requesting image");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose())
            .json(&GenerateRequest::for_prompt(prompt))
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(parse_error_body(status.as_u16(), &body));
        }
        parse_generate_response(&body)
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

impl<'a> GenerateRequest<'a> {
    fn for_prompt(prompt: &'a str) -> Self {
        Self {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: Option<String>,
    data: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Extract the first inline image from a `generateContent` response body.
fn parse_generate_response(body: &str) -> Result<GeneratedImage, GenerationError> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| GenerationError::Decode(e.to_string()))?;

    let inline = response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .find_map(|p| p.inline_data)
        .ok_or(GenerationError::NoImage)?;

    let bytes = STANDARD
        .decode(inline.data.as_bytes())
        .map_err(|e| GenerationError::Decode(format!("image data is not base64: {e}")))?;
    if bytes.is_empty() {
        return Err(GenerationError::NoImage);
    }
    Ok(GeneratedImage {
        bytes,
        mime_type: inline.mime_type.unwrap_or_else(|| "image/png".to_string()),
    })
}

/// Build an [`GenerationError::Http`] from a non-2xx response.
///
/// Falls back to the raw body when it isn't the standard error envelope.
fn parse_error_body(status: u16, body: &str) -> GenerationError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => GenerationError::Http {
            status,
            code: envelope.error.status,
            message: envelope
                .error
                .message
                .unwrap_or_else(|| "unknown error".to_string()),
        },
        Err(_) => GenerationError::Http {
            status,
            code: None,
            message: if body.trim().is_empty() {
                "unknown error".to_string()
            } else {
                body.trim().to_string()
            },
        },
    }
}
