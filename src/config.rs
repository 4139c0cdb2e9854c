//! Configuration: prompt templates and pipeline tunables, loadable from TOML.
//!
//! Defaults are built in; set EXAM_CONFIG_PATH to override any of them.
//! Token ceilings and the retry count were tuned empirically against real
//! model output (truncated rubrics under 2000 tokens pushed the ceilings to
//! 3000), so they live here as tunables rather than constants in the code.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ExamConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub tunables: Tunables,
}

/// Knobs for the generation/grading pipelines.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Tunables {
  /// Extra whole-pipeline iterations after the first failed attempt.
  pub max_retries: u32,
  pub question_max_tokens: u32,
  pub grading_max_tokens: u32,
  pub question_temperature: f32,
  pub grading_temperature: f32,
}

impl Default for Tunables {
  fn default() -> Self {
    Self {
      max_retries: 1,
      question_max_tokens: 3000,
      grading_max_tokens: 3000,
      question_temperature: 0.8,
      grading_temperature: 0.3,
    }
  }
}

/// Prompts used by the model channel. Defaults produce strict JSON output;
/// override them in TOML if you need to tune tone/structure.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub question_template: String,
  pub difficulty_instruction: String,
  pub grading_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      question_template: r#"You are an expert educator creating an essay exam question in the domain of {domain}.

{professor_instructions}

Based on your knowledge of {domain} and any information provided above, please create a comprehensive essay exam question.

Your task is to:
1. Create an information sheet (background information) that may be displayed to the student as context for the exam question.
2. Create an essay exam question based on the material and related to the displayed information. The question should test deep understanding, not just memorization.
3. Design a detailed grading rubric that specifies what information should be present in a satisfactory essay answer. Include specific criteria with point allocations and a short description of each.
4. Assess and rate the difficulty of the question: complexity of concepts, depth of analysis, synthesis of ideas, level of critical thinking.

Return your response as a single valid JSON object with the following structure:
{
    "background_info": "The background information to display to the student",
    "key_concepts": ["concept1", "concept2", "concept3"],
    "context": "Additional context for understanding the question",
    "question_text": "The essay question to ask the student",
    "difficulty": "Easy",
    "difficulty_score": 5.5,
    "rubric": {
        "criteria": [
            {"name": "criterion1", "points": 10.0, "description": "what a satisfactory answer covers"},
            {"name": "criterion2", "points": 15.0, "description": "..."}
        ],
        "total_points": 25.0,
        "required_elements": ["element1", "element2"]
    }
}

"difficulty" must be one of "Easy", "Medium", "Hard"; "difficulty_score" is a number from 1.0 (easiest) to 10.0 (hardest).

CRITICAL: You MUST return ONLY the JSON object. Do not include any explanatory text before or after it. Do not use markdown code blocks. Start your response directly with the opening brace and end with the closing brace."#
        .into(),
      difficulty_instruction: "\n\nIMPORTANT: Generate a question with {target_difficulty} difficulty level. Adjust the complexity, depth of analysis required, and conceptual sophistication accordingly.".into(),
      grading_template: r#"You are an expert educator grading a student's essay response to an exam question.

DOMAIN: {domain}

QUESTION:
{question_text}

GRADING RUBRIC:
{criteria_list}

Total possible points: {total_points}

Required elements:
{required_elements}

BACKGROUND INFORMATION PROVIDED TO STUDENT:
{background_info}

KEY CONCEPTS STUDENT SHOULD KNOW:
{key_concepts}

ADDITIONAL CONTEXT:
{context}

STUDENT'S RESPONSE:
{student_response}

TIME SPENT: {time_spent_seconds} seconds

Your task is to:
1. Evaluate the student's response against each criterion in the rubric
2. Award points for each criterion based on how well the student addressed it
3. Check if required elements are present
4. Provide detailed explanations for why points were awarded or deducted
5. Identify strengths and weaknesses and give constructive suggestions
6. Determine if the response is highly satisfactory (state "P", >= 80%) or assign a descriptive state

Return your response as a single valid JSON object with the following structure:
{
    "total_points_awarded": 28.5,
    "total_points_possible": 35.0,
    "percentage": 81.4,
    "state": "P",
    "explanation": {
        "overall_feedback": "Overall assessment of the response",
        "criterion_grades": [
            {
                "criterion": "criterion1",
                "points_awarded": 9.0,
                "max_points": 10.0,
                "explanation": "Why these points were awarded",
                "satisfied": true
            }
        ],
        "strengths": ["strength1", "strength2"],
        "weaknesses": ["weakness1", "weakness2"],
        "suggestions": ["suggestion1", "suggestion2"]
    }
}

Be thorough, fair, and constructive. Consider the depth of understanding demonstrated, not just keyword matching.

CRITICAL: You MUST return ONLY the JSON object. Do not include any explanatory text before or after it. Do not use markdown code blocks. Start your response directly with the opening brace and end with the closing brace."#
        .into(),
    }
  }
}

/// Attempt to load `ExamConfig` from EXAM_CONFIG_PATH. On any parsing/IO
/// error, returns None and the built-in defaults apply.
pub fn load_exam_config_from_env() -> Option<ExamConfig> {
  let path = std::env::var("EXAM_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<ExamConfig>(&s) {
      Ok(cfg) => {
        info!(target: "examgen_backend", %path, "Loaded exam config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "examgen_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "examgen_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
