//! Error taxonomy for the exam pipelines.
//!
//! Channel, extraction, and schema errors are internal: the pipelines catch
//! and classify them, spend the single permitted retry, and only ever surface
//! `GenerationFailed` / `GradingFailed` to callers. Raw model text stays in
//! the diagnostics logs, never in user-facing messages.

use thiserror::Error;

/// Transport-level failure talking to the model provider.
#[derive(Debug, Error)]
pub enum ChannelError {
  #[error("model API request failed: {0}")]
  Request(String),
  #[error("model API request timed out")]
  Timeout,
  #[error("model API returned HTTP {status}: {message}")]
  Http { status: u16, message: String },
  #[error("model API returned an empty response")]
  EmptyResponse,
}

/// No extraction strategy produced a parseable mapping.
#[derive(Debug, Error)]
#[error("could not extract a structured record from model output: {preview}")]
pub struct ExtractError {
  /// Display-truncated copy of the raw text, for diagnostics only.
  pub preview: String,
}

/// The mapping parsed, but failed required-field or type rules.
#[derive(Debug, Error)]
pub enum SchemaError {
  #[error("missing required field `{0}`")]
  MissingField(String),
  #[error("field `{field}` has the wrong type: {detail}")]
  WrongType { field: String, detail: String },
  #[error("field `{field}` is invalid: {detail}")]
  Invalid { field: String, detail: String },
}

/// One failed pipeline iteration (channel call + extract + validate).
/// Every variant is eligible for the single retry.
#[derive(Debug, Error)]
pub enum AttemptError {
  #[error(transparent)]
  Transport(#[from] ChannelError),
  #[error(transparent)]
  Extraction(#[from] ExtractError),
  #[error(transparent)]
  Schema(#[from] SchemaError),
}

/// Terminal failure of the question pipeline (retry already spent).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct GenerationFailed {
  pub message: String,
  #[source]
  pub last_error: AttemptError,
}

/// Terminal failure of the grading pipeline (retry already spent).
/// Deliberately distinct from `GenerationFailed` so a grading outage is never
/// mistaken for "no answer provided".
#[derive(Debug, Error)]
#[error("{message}")]
pub struct GradingFailed {
  pub message: String,
  #[source]
  pub last_error: AttemptError,
}
