//! examgen · AI Essay Exam Backend
//!
//! - Axum HTTP API for exam sessions, question generation, and grading
//! - Model provider integration via environment variables
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT              : u16 (default 8000)
//!   TOGETHER_API_KEY  : enables the model channel if present (OPENAI_API_KEY also accepted)
//!   LLM_BASE_URL      : default "https://api.together.xyz/v1"
//!   LLM_MODEL         : default "mistralai/Mixtral-8x7B-Instruct-v0.1"
//!   EXAM_CONFIG_PATH  : path to TOML config (prompts + pipeline tunables)
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use examgen_backend::routes::build_router;
use examgen_backend::state::AppState;
use examgen_backend::telemetry;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (session store, model client, prompts).
  let state = Arc::new(AppState::new());

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 8000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "examgen_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
