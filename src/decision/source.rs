//! Decision sources
//!
//! A decision source is an opaque `complete(system, user) -> text` function.
//! Its output is untrusted and always goes through the parser. The provider is
//! chosen once by the config loader and injected into the runner.

use crate::config::{Config, LlmProvider};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// External source of free-form decisions
#[async_trait]
pub trait DecisionSource: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Name for logging
    fn name(&self) -> &str;
}

/// Hosted language-model provider over HTTP
pub struct LlmDecisionSource {
    provider: LlmProvider,
    client: Client,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
    base_url: String,
}

impl LlmDecisionSource {
    pub fn new(
        provider: LlmProvider,
        api_key: SecretString,
        model: String,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::DecisionSource(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            provider,
            client,
            api_key,
            model,
            max_tokens,
            base_url: default_base_url(provider).to_string(),
        })
    }

    /// Resolve the provider from config and environment and read its key.
    pub fn from_config(config: &Config, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let provider = config.resolve_provider(&env)?;
        let key = env(provider.api_key_env())
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config(format!("{} is not set", provider.api_key_env())))?;

        tracing::info!(
            provider = provider.name(),
            model = %config.llm.model_for(provider),
            "Decision source selected"
        );

        Self::new(
            provider,
            SecretString::from(key),
            config.llm.model_for(provider),
            config.llm.max_tokens,
            Duration::from_millis(config.llm.timeout_ms),
        )
    }

    /// Point the client at another host (proxies, tests)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    async fn post(&self, request: reqwest::RequestBuilder, body: Value) -> Result<Value> {
        let response = request.json(&body).send().await.map_err(|e| {
            Error::DecisionSource(format!("{} request failed: {}", self.provider.name(), e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(200).collect();
            return Err(Error::DecisionSource(format!(
                "{} returned HTTP {}: {}",
                self.provider.name(),
                status,
                snippet
            )));
        }

        response.json().await.map_err(|e| {
            Error::DecisionSource(format!("{} returned invalid JSON: {}", self.provider.name(), e))
        })
    }

    async fn call_openai(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let request = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret());
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt }
            ]
        });

        let response = self.post(request, body).await?;
        response["choices"][0]["message"]["content"]
            .as_str()
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::DecisionSource("No text content in OpenAI response".to_string()))
    }

    async fn call_anthropic(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let request = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION);
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system_prompt,
            "messages": [{ "role": "user", "content": user_prompt }]
        });

        let response = self.post(request, body).await?;
        response["content"]
            .as_array()
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find(|block| block["type"] == "text")
                    .and_then(|block| block["text"].as_str())
            })
            .map(str::to_string)
            .ok_or_else(|| {
                Error::DecisionSource("No text content in Anthropic response".to_string())
            })
    }

    async fn call_gemini(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let request = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", self.api_key.expose_secret());
        let body = json!({
            "systemInstruction": { "parts": [{ "text": system_prompt }] },
            "contents": [{ "role": "user", "parts": [{ "text": user_prompt }] }],
            "generationConfig": { "maxOutputTokens": self.max_tokens }
        });

        let response = self.post(request, body).await?;
        let text: String = response["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part["text"].as_str())
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(Error::DecisionSource(
                "No text content in Gemini response".to_string(),
            ));
        }
        Ok(text)
    }
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "https://api.openai.com",
        LlmProvider::Anthropic => "https://api.anthropic.com",
        LlmProvider::Gemini => "https://generativelanguage.googleapis.com",
    }
}

#[async_trait]
impl DecisionSource for LlmDecisionSource {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        tracing::debug!(provider = self.provider.name(), model = %self.model, "Requesting decision");
        match self.provider {
            LlmProvider::OpenAi => self.call_openai(system_prompt, user_prompt).await,
            LlmProvider::Anthropic => self.call_anthropic(system_prompt, user_prompt).await,
            LlmProvider::Gemini => self.call_gemini(system_prompt, user_prompt).await,
        }
    }

    fn name(&self) -> &str {
        self.provider.name()
    }
}

impl std::fmt::Debug for LlmDecisionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmDecisionSource")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Replays canned responses in order, wrapping around.
///
/// Used by the demo mode and by tests. An empty script fails every call.
#[derive(Debug)]
pub struct ScriptedDecisionSource {
    responses: Vec<String>,
    next: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedDecisionSource {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            next: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn single(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Wait before answering (exercises the decision timeout)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl DecisionSource for ScriptedDecisionSource {
    async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.responses.is_empty() {
            return Err(Error::DecisionSource("script is empty".to_string()));
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.responses.len();
        Ok(self.responses[index].clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
