//! Shared retry state machine for the question and grading pipelines.
//!
//! Both pipelines are the same consumer of {channel -> extractor ->
//! validator}; they differ only in prompt, shape hint, tunables, and what
//! they build from the validated mapping. One iteration is always a whole
//! pass: a fresh channel call, then extraction, then validation. There is no
//! partial retry of just the extraction step, because the defect to correct
//! is the model's raw output. Transport failures (including timeouts and
//! cancelled calls) are classified like extraction failures: eligible for
//! the single retry, then terminal.

use tracing::{debug, warn};

use crate::error::{AttemptError, SchemaError};
use crate::extract::{extract_record, Record, ShapeHint};
use crate::llm::ModelChannel;

/// Per-invocation knobs, fixed by pipeline type.
#[derive(Clone, Copy, Debug)]
pub struct PipelineOpts {
  pub temperature: f32,
  pub max_tokens: u32,
  /// Extra iterations after the first failed attempt. Default policy is 1:
  /// models are non-deterministic and a second attempt frequently succeeds.
  pub max_retries: u32,
}

/// Drive the state machine: START -> CHANNEL_CALLED -> EXTRACTED ->
/// VALIDATED -> DONE, re-entering CHANNEL_CALLED at most `max_retries`
/// times before the caller turns the last error into a terminal failure.
pub async fn run_pipeline<C, T, F>(
  channel: &C,
  prompt: &str,
  hint: ShapeHint,
  opts: &PipelineOpts,
  validate: F,
) -> Result<T, AttemptError>
where
  C: ModelChannel,
  F: Fn(&Record) -> Result<T, SchemaError>,
{
  let attempts = opts.max_retries.saturating_add(1);
  let mut attempt = 0u32;

  loop {
    attempt += 1;
    debug!(target: "exam", hint = hint.as_str(), attempt, attempts, "pipeline iteration");

    let err = match channel.send(prompt, opts.temperature, opts.max_tokens).await {
      Err(e) => {
        warn!(target: "exam", hint = hint.as_str(), attempt, error = %e, "channel call failed");
        AttemptError::Transport(e)
      }
      // Raw text stays local to this arm; extraction logs its own preview.
      Ok(raw) => match extract_record(&raw, hint) {
        Err(e) => {
          warn!(target: "exam", hint = hint.as_str(), attempt, error = %e, "extraction failed");
          AttemptError::Extraction(e)
        }
        Ok(record) => match validate(&record) {
          Ok(value) => {
            debug!(target: "exam", hint = hint.as_str(), attempt, "pipeline iteration validated");
            return Ok(value);
          }
          Err(e) => {
            warn!(target: "exam", hint = hint.as_str(), attempt, error = %e, "schema validation failed");
            AttemptError::Schema(e)
          }
        },
      },
    };

    if attempt >= attempts {
      return Err(err);
    }
  }
}
