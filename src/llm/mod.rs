//! Reqwest-based LLM client implementing OpenAI-compatible Chat Completions streaming,
//! and the [`Generator`] capability the task loop talks to.

use std::{pin::Pin, sync::Arc, time::{Duration, Instant}};

use anyhow::{Context, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::{config::Config, console::Console};

pub mod history;

pub use history::{ChatHistory, UsageSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let timeout = cfg
            .get("REQUEST_TIMEOUT")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(120);
        let api_base_url = cfg.get("API_BASE_URL").unwrap_or_else(|| "default".into());
        let mut base_url = if api_base_url == "default" {
            "https://api.openai.com/v1".to_string()
        } else {
            api_base_url
        };
        let trimmed = base_url.trim_end_matches('/');
        if !trimmed.ends_with("/v1") && !trimmed.contains("/v1/") {
            base_url = format!("{}/v1", trimmed);
        } else {
            base_url = trimmed.to_string();
        }
        let api_key = cfg.get("OPENAI_API_KEY");

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()?;

        Ok(Self { http, base_url, api_key })
    }

    pub fn chat_stream(
        &self,
        messages: Vec<ChatMessage>,
        opts: ChatOptions,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>> {
        let http = self.http.clone();
        let base_url = self.base_url.clone();
        let api_key = self.api_key.clone();

        Box::pin(try_stream! {
            let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("text/event-stream"));
            if let Some(key) = api_key.clone() {
                let hv = HeaderValue::from_str(&format!("Bearer {}", key))?;
                headers.insert(AUTHORIZATION, hv);
            }

            let mut body = serde_json::json!({
                "model": opts.model,
                "messages": messages,
                "stream": true,
                "stream_options": { "include_usage": true },
            });
            if let Some(t) = opts.temperature {
                body["temperature"] = serde_json::json!(t);
            }
            if let Some(m) = opts.max_tokens {
                body["max_tokens"] = serde_json::json!(m);
            }

            let resp = http
                .post(url)
                .headers(headers)
                .json(&body)
                .send()
                .await
                .context("failed to send chat request")?;

            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                Err::<(), _>(anyhow::anyhow!("LLM error: {} {}", status, text.trim()))?;
                return;
            }

            let mut buf = String::new();
            let mut stream = resp.bytes_stream();

            while let Some(chunk) = stream.next().await {
                let bytes = chunk.context("stream error")?;
                buf.push_str(&String::from_utf8_lossy(&bytes));
                // process lines
                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim().to_string();
                    buf = buf[pos+1..].to_string();
                    if line.is_empty() || line.starts_with(':') { continue; }
                    if let Some(payload) = line.strip_prefix("data:") {
                        let payload = payload.trim();
                        if payload == "[DONE]" { yield StreamEvent::Done; return; }
                        match serde_json::from_str::<Chunk>(payload) {
                            Ok(chunk) => {
                                for choice in chunk.choices.into_iter() {
                                    if let Some(content) = choice.delta.and_then(|d| d.content) {
                                        if !content.is_empty() {
                                            yield StreamEvent::Content(content);
                                        }
                                    }
                                }
                                if let Some(usage) = chunk.usage {
                                    yield StreamEvent::Usage(usage);
                                }
                            }
                            Err(e) => {
                                tracing::trace!(error = %e, "ignoring malformed stream line");
                            }
                        }
                    }
                }
            }
            yield StreamEvent::Done;
        })
    }
}

#[derive(Debug)]
pub enum StreamEvent {
    Content(String),
    Usage(Usage),
    Done,
}

// Minimal chunk structures for OpenAI-like streaming
#[derive(Debug, Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Request/response capability the task loop drives.
#[async_trait]
pub trait Generator: Send {
    /// Send `prompt` (with `system_prompt` ahead of it when given) and return
    /// the raw reply text. `target` names an alternative model.
    async fn send(&mut self, prompt: &str, system_prompt: Option<&str>, target: Option<&str>) -> Result<String>;

    fn is_empty(&self) -> bool;

    fn last_reply(&self) -> Option<String>;

    fn summary(&self) -> Option<UsageSummary>;

    /// Conversation in interchange form, for export.
    fn transcript(&self) -> serde_json::Value;

    fn clear(&mut self);
}

/// Streaming chat-completions generator with its own conversation history.
pub struct Llm {
    client: LlmClient,
    model: String,
    max_tokens: Option<u32>,
    history: ChatHistory,
    console: Arc<dyn Console>,
}

impl Llm {
    pub fn from_config(cfg: &Config, model: Option<String>, console: Arc<dyn Console>) -> Result<Self> {
        Ok(Self {
            client: LlmClient::from_config(cfg)?,
            model: model
                .or_else(|| cfg.get("DEFAULT_MODEL"))
                .unwrap_or_else(|| "gpt-4o".to_string()),
            max_tokens: cfg.get("MAX_TOKENS").and_then(|v| v.parse().ok()),
            history: ChatHistory::default(),
            console,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Generator for Llm {
    async fn send(&mut self, prompt: &str, system_prompt: Option<&str>, target: Option<&str>) -> Result<String> {
        let pushed = if let Some(sp) = system_prompt {
            self.history.push(Role::System, sp);
            2
        } else {
            1
        };
        self.history.push(Role::User, prompt);

        let model = target.unwrap_or(self.model.as_str()).to_string();
        self.console.status(&format!("🔄 {model} is thinking..."));
        tracing::debug!(%model, messages = self.history.messages().len(), "sending prompt");

        let opts = ChatOptions { model, temperature: None, max_tokens: self.max_tokens };
        let started = Instant::now();
        let mut stream = self.client.chat_stream(self.history.messages().to_vec(), opts);
        let mut reply = String::new();
        let mut usage = None;
        let mut failure = None;
        while let Some(ev) = stream.next().await {
            match ev {
                Ok(StreamEvent::Content(t)) => reply.push_str(&t),
                Ok(StreamEvent::Usage(u)) => usage = Some(u),
                Ok(StreamEvent::Done) => break,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = failure {
            for _ in 0..pushed {
                self.history.pop();
            }
            return Err(e);
        }

        let elapsed = started.elapsed().as_secs_f64();
        self.history.record(elapsed, usage.as_ref());
        self.history.push(Role::Assistant, reply.clone());
        tracing::info!(elapsed, chars = reply.len(), "reply received");
        if !reply.is_empty() {
            self.console.markdown(&reply);
        }
        Ok(reply)
    }

    fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    fn last_reply(&self) -> Option<String> {
        self.history.last_assistant().map(str::to_string)
    }

    fn summary(&self) -> Option<UsageSummary> {
        self.history.summary()
    }

    fn transcript(&self) -> serde_json::Value {
        serde_json::to_value(self.history.messages()).unwrap_or_default()
    }

    fn clear(&mut self) {
        self.history.clear();
    }
}
