//! OpenRouter strategy advisor.
//!
//! Routes strategy synthesis through OpenRouter's OpenAI-compatible chat
//! completions API. Retryable failures (429, 5xx, transport) are retried
//! with exponential backoff; if the primary model still fails, the fallback
//! model is tried once with the same budget.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use super::{build_prompt, parse_strategies, SYSTEM_PROMPT};
use crate::strategy::{StrategyAdvisor, StrategyContext};
use crate::types::Strategy;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

const DEFAULT_PRIMARY_MODEL: &str = "anthropic/claude-sonnet-4";

const DEFAULT_FALLBACK_MODEL: &str = "x-ai/grok-4.1-fast";

const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Maximum retries on rate limit / server errors per model attempt.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (ms).
const BASE_BACKOFF_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// Cost tables (approximate per-1K-token pricing via OpenRouter)
// ---------------------------------------------------------------------------

/// Returns (input_cost_per_1k, output_cost_per_1k) for known models.
fn model_costs(model: &str) -> (f64, f64) {
    match model {
        m if m.contains("claude") && m.contains("sonnet") => (0.003, 0.015),
        m if m.contains("claude") && m.contains("haiku") => (0.0008, 0.004),
        m if m.contains("grok") => (0.003, 0.015),
        m if m.contains("gpt-4o") => (0.005, 0.015),
        _ => (0.005, 0.015),
    }
}

// ---------------------------------------------------------------------------
// API types (OpenAI-compatible)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OpenRouterAdvisor {
    http: Client,
    api_key: Secret<String>,
    primary_model: String,
    fallback_model: Option<String>,
    max_tokens: u32,
    total_cost: AtomicU64, // stored as cost * 1_000_000
    total_calls: AtomicU64,
}

impl OpenRouterAdvisor {
    /// `timeout_secs` bounds each HTTP attempt.
    pub fn new(
        api_key: Secret<String>,
        primary_model: Option<String>,
        fallback_model: Option<String>,
        max_tokens: Option<u32>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build OpenRouter HTTP client")?;

        Ok(Self {
            http,
            api_key,
            primary_model: primary_model.unwrap_or_else(|| DEFAULT_PRIMARY_MODEL.to_string()),
            fallback_model: Some(
                fallback_model.unwrap_or_else(|| DEFAULT_FALLBACK_MODEL.to_string()),
            ),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            total_cost: AtomicU64::new(0),
            total_calls: AtomicU64::new(0),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.primary_model
    }

    /// One model, with retry + exponential backoff.
    async fn call_model(&self, model: &str, user_message: &str) -> Result<String> {
        let request = ChatRequest {
            model: model.to_string(),
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_message.to_string(),
                },
            ],
        };

        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, model, "Retrying OpenRouter API call");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let resp = self
                .http
                .post(OPENROUTER_API_URL)
                .bearer_auth(self.api_key.expose_secret())
                .header("X-Title", "TRADECYCLE Strategy Agent")
                .json(&request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: ChatResponse = response
                            .json()
                            .await
                            .context("Failed to parse OpenRouter response")?;

                        let text = body
                            .choices
                            .first()
                            .and_then(|c| c.message.as_ref())
                            .map(|m| m.content.clone())
                            .unwrap_or_default();

                        let usage = body.usage.unwrap_or_default();
                        let actual_model = body.model.as_deref().unwrap_or(model);
                        let (input_cost, output_cost) = model_costs(actual_model);
                        let cost = (usage.prompt_tokens as f64 / 1000.0) * input_cost
                            + (usage.completion_tokens as f64 / 1000.0) * output_cost;

                        self.total_cost
                            .fetch_add((cost * 1_000_000.0) as u64, Ordering::Relaxed);
                        self.total_calls.fetch_add(1, Ordering::Relaxed);

                        return Ok(text);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let error_text = response.text().await.unwrap_or_default();
                        warn!(
                            status = %status,
                            attempt,
                            model,
                            error = %error_text,
                            "Retryable OpenRouter error"
                        );
                        last_error = Some(format!("HTTP {status}: {error_text}"));
                        continue;
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    anyhow::bail!("OpenRouter API error {status} (model={model}): {error_text}");
                }
                Err(e) => {
                    warn!(attempt, model, error = %e, "OpenRouter request failed");
                    last_error = Some(format!("Request error: {e}"));
                    continue;
                }
            }
        }

        anyhow::bail!(
            "OpenRouter API failed after {} retries (model={}): {}",
            MAX_RETRIES,
            model,
            last_error.unwrap_or_default()
        )
    }

    /// Primary model, then the fallback model if configured.
    async fn call_api(&self, user_message: &str) -> Result<String> {
        match self.call_model(&self.primary_model, user_message).await {
            Ok(text) => Ok(text),
            Err(primary_err) => {
                let Some(ref fallback) = self.fallback_model else {
                    return Err(primary_err);
                };
                warn!(
                    primary = %self.primary_model,
                    fallback = %fallback,
                    error = %primary_err,
                    "Primary model failed, falling back"
                );
                self.call_model(fallback, user_message).await.with_context(|| {
                    format!(
                        "Both primary ({}) and fallback ({}) models failed. Primary error: {}",
                        self.primary_model, fallback, primary_err
                    )
                })
            }
        }
    }

    /// Total cumulative cost across all calls.
    pub fn cumulative_cost(&self) -> f64 {
        self.total_cost.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl StrategyAdvisor for OpenRouterAdvisor {
    async fn propose(&self, ctx: &StrategyContext) -> Result<Vec<Strategy>> {
        let prompt = build_prompt(ctx);
        debug!(symbol = %ctx.symbol, model = %self.primary_model, "Requesting strategies");

        let text = self
            .call_api(&prompt)
            .await
            .context("OpenRouter strategy call failed")?;
        let strategies = parse_strategies(&text)?;

        info!(
            symbol = %ctx.symbol,
            proposals = strategies.len(),
            cost = format!("${:.4}", self.cumulative_cost()),
            "Strategies received (OpenRouter)"
        );
        Ok(strategies)
    }

    fn name(&self) -> &'static str {
        "openrouter"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Secret<String> {
        Secret::new("test-key".to_string())
    }

    #[test]
    fn test_client_construction_defaults() {
        let client = OpenRouterAdvisor::new(key(), None, None, None, 30).unwrap();
        assert_eq!(client.model_name(), DEFAULT_PRIMARY_MODEL);
        assert_eq!(client.fallback_model.as_deref(), Some(DEFAULT_FALLBACK_MODEL));
        assert_eq!(client.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(client.cumulative_cost(), 0.0);
        assert_eq!(client.total_calls(), 0);
    }

    #[test]
    fn test_client_custom_models() {
        let client = OpenRouterAdvisor::new(
            key(),
            Some("anthropic/claude-haiku-4".into()),
            Some("openai/gpt-4o".into()),
            Some(512),
            30,
        )
        .unwrap();
        assert_eq!(client.model_name(), "anthropic/claude-haiku-4");
        assert_eq!(client.fallback_model.as_deref(), Some("openai/gpt-4o"));
        assert_eq!(client.max_tokens, 512);
    }

    #[test]
    fn test_model_costs() {
        let (input, output) = model_costs("anthropic/claude-sonnet-4");
        assert!((input - 0.003).abs() < 1e-10);
        assert!((output - 0.015).abs() < 1e-10);
        let (input, _) = model_costs("some-unknown/model-xyz");
        assert!(input > 0.0);
    }

    #[test]
    fn test_advisor_name() {
        let client = OpenRouterAdvisor::new(key(), None, None, None, 30).unwrap();
        assert_eq!(StrategyAdvisor::name(&client), "openrouter");
    }
}
