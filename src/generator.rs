//! Question pipeline: prompt construction, one channel call, extraction and
//! validation, at most one retry, then a typed `ExamQuestion` or a terminal
//! `GenerationFailed`.

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::{Prompts, Tunables};
use crate::domain::{Difficulty, ExamQuestion};
use crate::error::GenerationFailed;
use crate::extract::ShapeHint;
use crate::llm::ModelChannel;
use crate::pipeline::{run_pipeline, PipelineOpts};
use crate::schema::validate_question;
use crate::util::fill_template;

fn build_question_prompt(
  prompts: &Prompts,
  domain: &str,
  professor_instructions: &str,
  target_difficulty: Option<Difficulty>,
) -> String {
  let mut instructions = if professor_instructions.trim().is_empty() {
    "No specific instructions provided.".to_string()
  } else {
    professor_instructions.to_string()
  };
  if let Some(diff) = target_difficulty {
    instructions.push_str(&fill_template(
      &prompts.difficulty_instruction,
      &[("target_difficulty", diff.as_str())],
    ));
  }
  fill_template(
    &prompts.question_template,
    &[("domain", domain), ("professor_instructions", &instructions)],
  )
}

#[instrument(level = "info", skip(channel, prompts, tunables, professor_instructions), fields(%domain, ?target_difficulty))]
pub async fn generate_question<C: ModelChannel>(
  channel: &C,
  prompts: &Prompts,
  tunables: &Tunables,
  domain: &str,
  professor_instructions: &str,
  target_difficulty: Option<Difficulty>,
) -> Result<ExamQuestion, GenerationFailed> {
  let prompt = build_question_prompt(prompts, domain, professor_instructions, target_difficulty);
  let opts = PipelineOpts {
    temperature: tunables.question_temperature,
    max_tokens: tunables.question_max_tokens,
    max_retries: tunables.max_retries,
  };

  let draft = run_pipeline(channel, &prompt, ShapeHint::Question, &opts, validate_question)
    .await
    .map_err(|e| GenerationFailed {
      message: "Could not generate an exam question: the AI returned output we could not use. \
                Please try creating the exam again."
        .into(),
      last_error: e,
    })?;

  let question = ExamQuestion {
    question_id: Uuid::new_v4().to_string(),
    question_text: draft.question_text,
    rubric: draft.rubric,
    domain_info: draft.domain_info,
    domain: domain.to_string(),
    difficulty: draft.difficulty,
    difficulty_score: draft.difficulty_score,
    created_at: Utc::now(),
  };

  info!(
    target: "exam",
    question_id = %question.question_id,
    criteria = question.rubric.criteria.len(),
    total_points = question.rubric.total_points,
    difficulty = ?question.difficulty,
    "question generated"
  );
  Ok(question)
}

/// Generate `count` questions sequentially with the same parameters.
/// Sequential on purpose: one in-flight channel call per invocation.
#[instrument(level = "info", skip(channel, prompts, tunables, professor_instructions), fields(%domain, count))]
pub async fn generate_question_batch<C: ModelChannel>(
  channel: &C,
  prompts: &Prompts,
  tunables: &Tunables,
  domain: &str,
  count: usize,
  professor_instructions: &str,
  target_difficulty: Option<Difficulty>,
) -> Result<Vec<ExamQuestion>, GenerationFailed> {
  let mut questions = Vec::with_capacity(count);
  for _ in 0..count {
    let q = generate_question(channel, prompts, tunables, domain, professor_instructions, target_difficulty)
      .await?;
    questions.push(q);
  }
  Ok(questions)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Prompts;

  #[test]
  fn prompt_includes_domain_and_difficulty_instruction() {
    let prompts = Prompts::default();
    let p = build_question_prompt(&prompts, "Organic Chemistry", "", Some(Difficulty::Hard));
    assert!(p.contains("Organic Chemistry"));
    assert!(p.contains("No specific instructions provided."));
    assert!(p.contains("Hard difficulty level"));
    assert!(!p.contains("{domain}"));
  }

  #[test]
  fn prompt_keeps_professor_instructions_verbatim() {
    let prompts = Prompts::default();
    let p = build_question_prompt(&prompts, "History", "Focus on the 19th century.", None);
    assert!(p.contains("Focus on the 19th century."));
    assert!(!p.contains("No specific instructions provided."));
  }
}
