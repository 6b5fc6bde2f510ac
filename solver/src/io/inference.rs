//! Language model access.
//!
//! [`LanguageModel`] is the backend seam (Ollama in production, scripted in
//! tests). [`InferenceAdapter`] sits on top of it: it counts tokens into a
//! caller-owned [`TokenUsage`] and turns structured replies into a tagged
//! [`Generation`] instead of failing on malformed output.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::io::config::InferenceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: ChatRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    /// JSON schema the reply must follow, when structured output is wanted.
    pub format: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub elapsed: Duration,
}

/// Chat-completion backend.
pub trait LanguageModel {
    fn chat(&self, request: &ChatRequest) -> Result<ChatReply>;
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("cannot reach inference backend at {url}")]
    Unreachable { url: String },
    #[error("inference request timed out after {0:?}")]
    Timeout(Duration),
    #[error("inference backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed inference response: {0}")]
    Malformed(String),
    #[error("inference request failed: {0}")]
    Transport(String),
}

/// Token and call totals for one solve, owned by whoever started it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub elapsed_ms: u64,
}

impl TokenUsage {
    pub fn record(&mut self, reply: &ChatReply) {
        self.calls += 1;
        self.input_tokens += reply.input_tokens;
        self.output_tokens += reply.output_tokens;
        self.elapsed_ms += reply.elapsed.as_millis() as u64;
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// A type the model can be asked to emit as JSON.
pub trait Structured: DeserializeOwned {
    /// Short name used in prompts and logs.
    const NAME: &'static str;
    /// JSON schema document for the type.
    const SCHEMA: &'static str;
}

/// Outcome of one structured generation.
#[derive(Debug, Clone, PartialEq)]
pub enum Generation<T> {
    /// The reply was not JSON at all.
    Text(String),
    Structured(T),
    /// The reply was JSON but did not match the schema.
    ParseFailed(String),
}

impl<T> Generation<T> {
    pub fn into_structured(self) -> Option<T> {
        match self {
            Generation::Structured(value) => Some(value),
            Generation::Text(_) | Generation::ParseFailed(_) => None,
        }
    }

    /// Raw reply text when the output did not parse.
    pub fn raw(&self) -> Option<&str> {
        match self {
            Generation::Structured(_) => None,
            Generation::Text(raw) | Generation::ParseFailed(raw) => Some(raw),
        }
    }
}

/// Wraps a [`LanguageModel`] with usage accounting and schema validation.
#[derive(Clone, Copy)]
pub struct InferenceAdapter<'a> {
    model: &'a dyn LanguageModel,
}

impl<'a> InferenceAdapter<'a> {
    pub fn new(model: &'a dyn LanguageModel) -> Self {
        Self { model }
    }

    /// Free-text completion.
    pub fn text(&self, messages: &[Message], usage: &mut TokenUsage) -> Result<String> {
        let reply = self.complete(messages, None, usage)?;
        Ok(reply.content)
    }

    /// Completion constrained to `T`'s schema. Never errors for a bad reply.
    #[instrument(skip_all, fields(kind = T::NAME))]
    pub fn structured<T: Structured>(
        &self,
        messages: &[Message],
        usage: &mut TokenUsage,
    ) -> Result<Generation<T>> {
        let schema: Value = serde_json::from_str(T::SCHEMA)
            .with_context(|| format!("parse embedded {} schema", T::NAME))?;
        let reply = self.complete(messages, Some(schema.clone()), usage)?;
        let generation = parse_structured::<T>(&reply.content, &schema);
        if let Some(raw) = generation.raw() {
            debug!(bytes = raw.len(), "structured reply did not parse");
        }
        Ok(generation)
    }

    fn complete(
        &self,
        messages: &[Message],
        format: Option<Value>,
        usage: &mut TokenUsage,
    ) -> Result<ChatReply> {
        let request = ChatRequest {
            messages: messages.to_vec(),
            format,
        };
        let reply = self.model.chat(&request)?;
        usage.record(&reply);
        Ok(reply)
    }
}

/// Interpret `raw` as `T`, validating against `schema` first.
pub fn parse_structured<T: Structured>(raw: &str, schema: &Value) -> Generation<T> {
    let body = strip_json_fence(raw);
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return Generation::Text(raw.to_string()),
    };
    let validator = match jsonschema::validator_for(schema) {
        Ok(validator) => validator,
        Err(err) => {
            warn!(kind = T::NAME, err = %err, "invalid output schema");
            return Generation::ParseFailed(raw.to_string());
        }
    };
    if let Some(err) = validator.iter_errors(&value).next() {
        debug!(kind = T::NAME, err = %err, "reply violates schema");
        return Generation::ParseFailed(raw.to_string());
    }
    match serde_json::from_value::<T>(value) {
        Ok(parsed) => Generation::Structured(parsed),
        Err(err) => {
            debug!(kind = T::NAME, err = %err, "reply does not deserialize");
            Generation::ParseFailed(raw.to_string())
        }
    }
}

fn strip_json_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Ollama `/api/chat` client.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::blocking::Client,
    base_url: String,
    model: String,
    temperature: f32,
    num_predict: u32,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            num_predict: config.num_predict,
            timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn body<'r>(&'r self, request: &'r ChatRequest) -> OllamaRequest<'r> {
        OllamaRequest {
            model: &self.model,
            messages: &request.messages,
            stream: false,
            format: request.format.as_ref(),
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.num_predict,
            },
        }
    }
}

impl LanguageModel for OllamaClient {
    #[instrument(skip_all, fields(model = %self.model, messages = request.messages.len()))]
    fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
        let url = format!("{}/api/chat", self.base_url);
        let started = Instant::now();
        let response = self
            .http
            .post(&url)
            .json(&self.body(request))
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    InferenceError::Timeout(self.timeout)
                } else if err.is_connect() {
                    InferenceError::Unreachable { url: url.clone() }
                } else {
                    InferenceError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let parsed: OllamaResponse = response
            .json()
            .map_err(|err| InferenceError::Malformed(err.to_string()))?;
        let elapsed = started.elapsed();
        info!(
            elapsed_ms = elapsed.as_millis() as u64,
            input_tokens = parsed.prompt_eval_count,
            output_tokens = parsed.eval_count,
            "inference reply"
        );
        Ok(ChatReply {
            content: parsed.message.content,
            input_tokens: parsed.prompt_eval_count,
            output_tokens: parsed.eval_count,
            elapsed,
        })
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'r> {
    model: &'r str,
    messages: &'r [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'r Value>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}
