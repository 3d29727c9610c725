//! Model gateway: the single outbound call of the service.
//!
//! The handler only sees the [`Generator`] trait so it can run against a
//! deterministic stand-in.  [`GeminiGateway`] speaks the Gemini
//! `generateContent` REST API.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Sampling temperature sent with every request.
pub const TEMPERATURE: f64 = 0.9;
/// Extended reasoning is disabled to keep latency bounded.
pub const THINKING_BUDGET: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("model returned no text")]
    Empty,
    #[error("model request failed: {0}")]
    Transport(String),
}

/// Turns a prompt into raw model text.  One attempt per call; callers decide
/// whether to try again.
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        credential: &str,
    ) -> Result<String, GatewayError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    thinking_config: ThinkingConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

fn request_body(prompt: &str) -> GenerateContentRequest<'_> {
    GenerateContentRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![RequestPart { text: prompt }],
        }],
        generation_config: GenerationConfig {
            temperature: TEMPERATURE,
            thinking_config: ThinkingConfig {
                thinking_budget: THINKING_BUDGET,
            },
        },
    }
}

/// Concatenated text of the first candidate, skipping thought parts.
fn response_text(resp: GenerateContentResponse) -> Option<String> {
    let parts = resp.candidates.into_iter().next()?.content?.parts;
    let text: String = parts
        .into_iter()
        .filter(|p| !p.thought)
        .filter_map(|p| p.text)
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

pub struct GeminiGateway {
    base_url: String,
    client: reqwest::Client,
}

impl GeminiGateway {
    /// Build a gateway for `base_url`.  `timeout` is optional: without one
    /// the call waits as long as the hosting environment allows.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> reqwest::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: builder.build()?,
        })
    }

    /// `{base}/models/{model}:generateContent`.  The model id comes from the
    /// caller, so it is pushed as a single escaped path segment and can never
    /// leave `/models/`.
    fn endpoint(&self, model: &str) -> Result<reqwest::Url, GatewayError> {
        let invalid_base = || GatewayError::Transport(format!("invalid API base: {}", self.base_url));
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|_| invalid_base())?;
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|_| invalid_base())?
            .pop_if_empty()
            .push("models")
            .push(&format!("{}:generateContent", model));
        Ok(url)
    }
}

#[async_trait::async_trait]
impl Generator for GeminiGateway {
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        credential: &str,
    ) -> Result<String, GatewayError> {
        tracing::debug!(model = %model, prompt_len = prompt.len(), "sending generateContent request");
        let url = self.endpoint(model)?;
        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", credential)
            .json(&request_body(prompt))
            .send()
            .await
            .map_err(|err| {
                tracing::warn!(model = %model, error = %err, "gemini network error");
                GatewayError::Transport(format!("network error: {}", err))
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(model = %model, status = status.as_u16(), body = %body, "gemini returned error status");
            return Err(GatewayError::Transport(format!(
                "backend returned status {}",
                status.as_u16()
            )));
        }

        let parsed: GenerateContentResponse = resp.json().await.map_err(|err| {
            tracing::warn!(model = %model, error = %err, "gemini response undecodable");
            GatewayError::Transport(format!("undecodable response: {}", err))
        })?;
        response_text(parsed).ok_or(GatewayError::Empty)
    }
}
