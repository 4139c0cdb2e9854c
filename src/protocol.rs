//! Public HTTP request/response DTOs (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.
//!
//! Question views never carry the rubric: students must not see the grading
//! criteria while the exam is running.

use serde::{Deserialize, Serialize};

use crate::domain::{Difficulty, ExamQuestion, GradeResult};

#[derive(Debug, Deserialize)]
pub struct CreateExamIn {
    pub domain: String,
    #[serde(default = "default_num_questions")]
    pub num_questions: usize,
    #[serde(default)]
    pub professor_instructions: Option<String>,
    pub student_id: String,
    /// "Easy" | "Medium" | "Hard"; omit for automatic rating.
    #[serde(default)]
    pub target_difficulty: Option<String>,
}

fn default_num_questions() -> usize {
    3
}

#[derive(Debug, Serialize)]
pub struct CreateExamOut {
    pub session_id: String,
    pub num_questions: usize,
    pub questions: Vec<QuestionOut>,
}

/// Student-facing view of a question (rubric withheld).
#[derive(Debug, Serialize)]
pub struct QuestionOut {
    pub question_id: String,
    pub question_text: String,
    pub difficulty: Option<Difficulty>,
    pub difficulty_score: Option<f64>,
    pub background_info: String,
    pub key_concepts: Vec<String>,
    pub context: String,
}

/// Convert the full `ExamQuestion` (internal) to the public DTO.
pub fn to_question_out(q: &ExamQuestion) -> QuestionOut {
    QuestionOut {
        question_id: q.question_id.clone(),
        question_text: q.question_text.clone(),
        difficulty: q.difficulty,
        difficulty_score: q.difficulty_score,
        background_info: q.domain_info.background_info.clone(),
        key_concepts: q.domain_info.key_concepts.clone(),
        context: q.domain_info.context.clone(),
    }
}

#[derive(Debug, Serialize)]
pub struct CurrentQuestionOut {
    pub all_complete: bool,
    pub question: Option<QuestionOut>,
    /// 1-based position of the served question.
    pub question_index: usize,
    pub total_questions: usize,
}

#[derive(Debug, Deserialize)]
pub struct SubmitResponseIn {
    pub question_id: String,
    pub response_text: String,
    pub time_spent_seconds: f64,
}

/// Compact grade summary returned right after submission.
#[derive(Debug, Serialize)]
pub struct GradeSummaryOut {
    pub total_points_awarded: f64,
    pub total_points_possible: f64,
    pub percentage: f64,
    pub state: String,
}

impl From<&GradeResult> for GradeSummaryOut {
    fn from(g: &GradeResult) -> Self {
        Self {
            total_points_awarded: g.total_points_awarded,
            total_points_possible: g.total_points_possible,
            percentage: g.percentage,
            state: g.state.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitResponseOut {
    pub success: bool,
    pub exam_complete: bool,
    pub grade: GradeSummaryOut,
}

#[derive(Debug, Serialize)]
pub struct ResultsOut {
    pub session_id: String,
    pub student_id: String,
    pub all_complete: bool,
    pub grades: Vec<GradeResult>,
}

#[derive(Debug, Serialize)]
pub struct SessionOut {
    pub session_id: String,
    pub student_id: String,
    pub num_questions: usize,
    pub num_responses: usize,
    pub num_grades: usize,
    pub started_at: String,
    pub completed_at: Option<String>,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: String,
}
