//! Application state: session store, prompts, tunables, and the optional
//! model client.
//!
//! Each pipeline invocation is an independent unit of work; concurrent
//! sessions share nothing mutable except the store behind its own lock.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::{load_exam_config_from_env, Prompts, Tunables};
use crate::llm::LlmClient;
use crate::store::{MemoryStore, SessionStore};

#[derive(Clone)]
pub struct AppState {
  pub store: Arc<dyn SessionStore>,
  pub llm: Option<LlmClient>,
  pub prompts: Prompts,
  pub tunables: Tunables,
}

impl AppState {
  /// Build state from env: load TOML config overrides, init the model
  /// client if an API key is present.
  #[instrument(level = "info", skip_all)]
  pub fn new() -> Self {
    let cfg = load_exam_config_from_env().unwrap_or_default();

    let llm = LlmClient::from_env();
    match &llm {
      Some(c) => {
        info!(target: "examgen_backend", base_url = %c.base_url, model = %c.model, "model channel enabled");
      }
      None => {
        info!(target: "examgen_backend", "model channel disabled (no TOGETHER_API_KEY/OPENAI_API_KEY); exam creation will be rejected");
      }
    }
    info!(
      target: "examgen_backend",
      max_retries = cfg.tunables.max_retries,
      question_max_tokens = cfg.tunables.question_max_tokens,
      grading_max_tokens = cfg.tunables.grading_max_tokens,
      "pipeline tunables"
    );

    Self {
      store: Arc::new(MemoryStore::new()),
      llm,
      prompts: cfg.prompts,
      tunables: cfg.tunables,
    }
  }
}
