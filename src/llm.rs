//! Model channel: a thin chat-completions client for the exam pipelines.
//!
//! The provider speaks the OpenAI-compatible chat.completions protocol
//! (Together.ai by default). Calls are instrumented and log model names,
//! latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::ChannelError;

/// The sole suspension point of a pipeline iteration: prompt in, raw text
/// out, or a transport-level failure. Implemented by the HTTP client in
/// production and by scripted doubles in tests.
pub trait ModelChannel: Send + Sync {
  fn send(
    &self,
    prompt: &str,
    temperature: f32,
    max_tokens: u32,
  ) -> impl Future<Output = Result<String, ChannelError>> + Send;
}

#[derive(Clone)]
pub struct LlmClient {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

impl LlmClient {
  /// Construct the client if we find TOGETHER_API_KEY (or OPENAI_API_KEY);
  /// otherwise return None and the server runs without generation/grading.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("TOGETHER_API_KEY")
      .or_else(|_| std::env::var("OPENAI_API_KEY"))
      .ok()
      .filter(|k| !k.trim().is_empty())?;
    let base_url =
      std::env::var("LLM_BASE_URL").unwrap_or_else(|_| "https://api.together.xyz/v1".into());
    let model = std::env::var("LLM_MODEL")
      .unwrap_or_else(|_| "mistralai/Mixtral-8x7B-Instruct-v0.1".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(60))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, model })
  }

  #[instrument(level = "info", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len(), max_tokens))]
  async fn chat(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String, ChannelError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![ChatMessageReq { role: "user".into(), content: prompt.into() }],
      temperature,
      max_tokens,
    };

    let started = std::time::Instant::now();
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "examgen-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req)
      .send()
      .await
      .map_err(|e| {
        if e.is_timeout() {
          ChannelError::Timeout
        } else {
          ChannelError::Request(e.to_string())
        }
      })?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_provider_error(&body).unwrap_or(body);
      return Err(ChannelError::Http { status, message });
    }

    let body: ChatCompletionResponse =
      res.json().await.map_err(|e| ChannelError::Request(e.to_string()))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "model usage");
    }

    let text = body
      .choices
      .first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();
    if text.trim().is_empty() {
      return Err(ChannelError::EmptyResponse);
    }

    info!(elapsed = ?started.elapsed(), response_len = text.len(), "model response received");
    Ok(text)
  }
}

impl ModelChannel for LlmClient {
  async fn send(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String, ChannelError> {
    self.chat(prompt, temperature, max_tokens).await
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  max_tokens: u32,
}
#[derive(Serialize)]
struct ChatMessageReq {
  role: String,
  content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)]
  usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice {
  message: ChatMessageResp,
}
#[derive(Deserialize)]
struct ChatMessageResp {
  content: Option<String>,
}
#[derive(Deserialize)]
struct Usage {
  #[serde(default)]
  prompt_tokens: Option<u32>,
  #[serde(default)]
  completion_tokens: Option<u32>,
  #[serde(default)]
  total_tokens: Option<u32>,
}

/// Try to extract a clean error message from a provider error body.
fn extract_provider_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap {
    error: EObj,
  }
  #[derive(Deserialize)]
  struct EObj {
    message: String,
  }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
