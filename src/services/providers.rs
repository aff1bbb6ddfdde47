// Detection Provider Service
// Implements Sightengine / HuggingFace image detection and OpenRouter text judgment

use async_trait::async_trait;
use regex::Regex;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{MediaInput, ProviderScore};
use crate::services::config_store::{HuggingFaceConfig, OpenRouterConfig, SightengineConfig};

pub const SIGHTENGINE_DEFAULT_URL: &str = "https://api.sightengine.com/1.0/check.json";
pub const HUGGINGFACE_DEFAULT_URL: &str =
    "https://api-inference.huggingface.co/models/therealvish/ai-image-detector";
pub const OPENROUTER_DEFAULT_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const OPENROUTER_DEFAULT_MODEL: &str = "openai/gpt-3.5-turbo";

/// Characters of input text forwarded to the text provider
pub const TEXT_INPUT_LIMIT: usize = 800;
const TEXT_TEMPERATURE: f64 = 0.1;
const TEXT_MAX_TOKENS: i32 = 120;
const ERROR_BODY_PREVIEW: usize = 200;

/// Labels from the HuggingFace classifier that denote synthetic images
const AI_LABEL_MARKERS: [&str; 3] = ["AI", "FAKE", "GENERATED"];

const TEXT_SYSTEM_PROMPT: &str =
    "You are an expert AI-content detection system. Always respond with pure JSON only.";

const TEXT_PROMPT_HEADER: &str = "Analyze whether the following text was written by an AI or a human. \
Reply ONLY with a valid JSON object, no markdown, no extra text:\n\
{\"ai_probability\": <float 0.0-1.0>, \"confidence\": <float 0.0-1.0>, \"reason\": \"<brief reason>\"}\n\n";

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("field missing: {0}")]
    MissingField(&'static str),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("API key not configured")]
    MissingApiKey,
    #[error("{0} input not supported")]
    UnsupportedMedia(&'static str),
}

impl ProviderError {
    /// Stable category used in logs and error payloads
    pub fn category(&self) -> &'static str {
        match self {
            Self::Transport(_) | Self::Timeout(_) => "provider_transport",
            _ => "provider_response",
        }
    }
}

/// One external detection API.
///
/// Implementations perform at most one network call per `detect` and report
/// every failure as a `ProviderError` value.
#[async_trait]
pub trait DetectionProvider: Send + Sync {
    /// Name reported as `model_used` when this provider wins
    fn name(&self) -> &str;

    /// Upper bound for a single `detect` call
    fn timeout(&self) -> Duration;

    async fn detect(&self, input: MediaInput<'_>) -> Result<ProviderScore, ProviderError>;
}

fn build_http_client(timeout: Duration) -> Result<Client, ProviderError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

fn unsupported(input: &MediaInput<'_>) -> ProviderError {
    ProviderError::UnsupportedMedia(input.kind().as_str())
}

fn ensure_finite(value: f64, field: &str) -> Result<f64, ProviderError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ProviderError::InvalidResponse(format!("{} is not a finite number", field)))
    }
}

/// Read a JSON number or numeric string as `f64`. Anything else, null
/// included, is a response failure rather than a guessed score.
fn coerce_float(value: &Value, field: &str) -> Result<f64, ProviderError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    let number = parsed
        .ok_or_else(|| ProviderError::InvalidResponse(format!("{} is not a number: {}", field, value)))?;
    ensure_finite(number, field)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Turn a non-2xx response into `ProviderError::Api`, keeping a short body preview.
async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Api {
        status: status.as_u16(),
        message: truncate_chars(&body, ERROR_BODY_PREVIEW),
    })
}

// ============ Sightengine ============

/// Extract `type.ai_generated` from a Sightengine `check.json` reply
pub fn parse_sightengine(data: &Value) -> Result<f64, ProviderError> {
    let value = data
        .get("type")
        .and_then(|t| t.get("ai_generated"))
        .ok_or(ProviderError::MissingField("type.ai_generated"))?;
    coerce_float(value, "type.ai_generated")
}

pub struct SightengineClient {
    client: Client,
    url: String,
    api_user: String,
    api_secret: String,
    timeout: Duration,
}

impl SightengineClient {
    pub fn new(config: &SightengineConfig) -> Result<Self, ProviderError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            client: build_http_client(timeout)?,
            url: config.url.clone(),
            api_user: config.api_user.trim().to_string(),
            api_secret: config.api_secret.trim().to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl DetectionProvider for SightengineClient {
    fn name(&self) -> &str {
        "Sightengine"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn detect(&self, input: MediaInput<'_>) -> Result<ProviderScore, ProviderError> {
        let MediaInput::Image(bytes) = input else {
            return Err(unsupported(&input));
        };
        if self.api_user.is_empty() || self.api_secret.is_empty() {
            return Err(ProviderError::MissingApiKey);
        }

        let form = Form::new()
            .part("media", Part::bytes(bytes.to_vec()).file_name("upload"))
            .text("models", "genai")
            .text("api_user", self.api_user.clone())
            .text("api_secret", self.api_secret.clone());

        let start = Instant::now();
        let response = self.client.post(&self.url).multipart(form).send().await?;
        let response = check_status(response).await?;
        let data: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let probability = parse_sightengine(&data)?;

        info!(
            latency_ms = start.elapsed().as_millis() as u64,
            probability, "[PROVIDER] Sightengine ok"
        );
        Ok(ProviderScore {
            provider: self.name().to_string(),
            probability,
            confidence: None,
            reason: None,
        })
    }
}

// ============ HuggingFace ============

/// Pick the score of the first label marking the image as synthetic.
///
/// The inference API answers `[[{"label": .., "score": ..}, ..]]`. A matching
/// item without a score counts as 0; a null or non-numeric score fails.
pub fn parse_huggingface(data: &Value) -> Result<f64, ProviderError> {
    let items = data
        .as_array()
        .and_then(|outer| outer.first())
        .and_then(Value::as_array)
        .ok_or(ProviderError::MissingField("[0]"))?;

    for item in items {
        let label = item
            .get("label")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_uppercase();
        if !AI_LABEL_MARKERS.iter().any(|marker| label.contains(marker)) {
            continue;
        }
        return match item.get("score") {
            None => Ok(0.0),
            Some(score) => coerce_float(score, "score"),
        };
    }

    Err(ProviderError::MissingField("AI label"))
}

pub struct HuggingFaceClient {
    client: Client,
    url: String,
    api_key: String,
    timeout: Duration,
}

impl HuggingFaceClient {
    pub fn new(config: &HuggingFaceConfig) -> Result<Self, ProviderError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            client: build_http_client(timeout)?,
            url: config.url.clone(),
            api_key: config.api_key.trim().to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl DetectionProvider for HuggingFaceClient {
    fn name(&self) -> &str {
        "HuggingFace"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn detect(&self, input: MediaInput<'_>) -> Result<ProviderScore, ProviderError> {
        let MediaInput::Image(bytes) = input else {
            return Err(unsupported(&input));
        };
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey);
        }

        let start = Instant::now();
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .body(bytes.to_vec())
            .send()
            .await?;
        let response = check_status(response).await?;
        let data: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let probability = parse_huggingface(&data)?;

        info!(
            latency_ms = start.elapsed().as_millis() as u64,
            probability, "[PROVIDER] HuggingFace ok"
        );
        Ok(ProviderScore {
            provider: self.name().to_string(),
            probability,
            confidence: None,
            reason: None,
        })
    }
}

// ============ OpenRouter ============

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: i32,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageResponse>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

/// Pull `choices[0].message.content` out of a chat-completion reply
pub fn parse_chat_envelope(data: &Value) -> Result<String, ProviderError> {
    let envelope: ChatResponse = serde_json::from_value(data.clone())
        .map_err(|e| ProviderError::InvalidResponse(format!("chat envelope: {}", e)))?;
    envelope
        .choices
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .ok_or(ProviderError::MissingField("choices[0].message.content"))
}

/// Judgment the text model is asked to return
#[derive(Debug, Clone, PartialEq)]
pub struct TextJudgment {
    pub ai_probability: f64,
    pub confidence: f64,
    pub reason: Option<String>,
}

const DEFAULT_PROBABILITY: f64 = 0.5;
const DEFAULT_CONFIDENCE: f64 = 0.6;

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"```(?:json)?").expect("static regex"))
}

/// Remove Markdown code fences wrapped around a JSON reply
pub fn strip_code_fences(content: &str) -> String {
    fence_regex().replace_all(content.trim(), "").trim().to_string()
}

/// Parse the model's reply. It must be a JSON object; numbers may arrive as
/// numeric strings and absent fields take their defaults.
pub fn parse_text_judgment(content: &str) -> Result<TextJudgment, ProviderError> {
    let json_str = strip_code_fences(content);
    let value: Value = serde_json::from_str(&json_str)
        .map_err(|e| ProviderError::InvalidResponse(format!("JSON parse error: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| ProviderError::InvalidResponse("expected a JSON object".to_string()))?;

    let ai_probability = match object.get("ai_probability") {
        Some(v) => coerce_float(v, "ai_probability")?,
        None => DEFAULT_PROBABILITY,
    };
    let confidence = match object.get("confidence") {
        Some(v) => coerce_float(v, "confidence")?,
        None => DEFAULT_CONFIDENCE,
    };
    let reason = object
        .get("reason")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(TextJudgment {
        ai_probability,
        confidence,
        reason,
    })
}

/// User prompt for the text judgment; only the first 800 characters are sent.
pub fn build_text_prompt(text: &str) -> String {
    format!(
        "{}Text:\n\"\"\"\n{}\n\"\"\"",
        TEXT_PROMPT_HEADER,
        truncate_chars(text, TEXT_INPUT_LIMIT)
    )
}

pub struct OpenRouterClient {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    referer: String,
    title: String,
    display_name: String,
    timeout: Duration,
}

impl OpenRouterClient {
    pub fn new(config: &OpenRouterConfig) -> Result<Self, ProviderError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let display_name = if config.model == OPENROUTER_DEFAULT_MODEL {
            "OpenRouter GPT-3.5".to_string()
        } else {
            format!("OpenRouter {}", config.model)
        };
        Ok(Self {
            client: build_http_client(timeout)?,
            url: config.url.clone(),
            api_key: config.api_key.trim().to_string(),
            model: config.model.clone(),
            referer: config.referer.clone(),
            title: config.title.clone(),
            display_name,
            timeout,
        })
    }

    fn chat_request(&self, text: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: TEXT_SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_text_prompt(text),
                },
            ],
            temperature: TEXT_TEMPERATURE,
            max_tokens: TEXT_MAX_TOKENS,
        }
    }
}

#[async_trait]
impl DetectionProvider for OpenRouterClient {
    fn name(&self) -> &str {
        &self.display_name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn detect(&self, input: MediaInput<'_>) -> Result<ProviderScore, ProviderError> {
        let MediaInput::Text(text) = input else {
            return Err(unsupported(&input));
        };
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey);
        }

        let request = self.chat_request(text);
        debug!(model = %self.model, chars = text.chars().count(), "[PROVIDER] OpenRouter request");

        let start = Instant::now();
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(&request)
            .send()
            .await?;
        let response = check_status(response).await?;
        let data: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let content = parse_chat_envelope(&data)?;
        let judgment = parse_text_judgment(&content)?;

        info!(
            latency_ms = start.elapsed().as_millis() as u64,
            probability = judgment.ai_probability,
            confidence = judgment.confidence,
            "[PROVIDER] OpenRouter ok"
        );
        Ok(ProviderScore {
            provider: self.display_name.clone(),
            probability: judgment.ai_probability,
            confidence: Some(judgment.confidence),
            reason: judgment.reason,
        })
    }
}

/// Image providers in fallback order
pub fn image_providers(
    sightengine: &SightengineConfig,
    huggingface: &HuggingFaceConfig,
) -> Result<Vec<Arc<dyn DetectionProvider>>, ProviderError> {
    let primary: Arc<dyn DetectionProvider> = Arc::new(SightengineClient::new(sightengine)?);
    let secondary: Arc<dyn DetectionProvider> = Arc::new(HuggingFaceClient::new(huggingface)?);
    Ok(vec![primary, secondary])
}

/// Text providers in fallback order
pub fn text_providers(
    openrouter: &OpenRouterConfig,
) -> Result<Vec<Arc<dyn DetectionProvider>>, ProviderError> {
    let client: Arc<dyn DetectionProvider> = Arc::new(OpenRouterClient::new(openrouter)?);
    Ok(vec![client])
}
