//! Domain models: questions, rubrics, student responses, grades, sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Advisory difficulty category attached to a generated question.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

impl Difficulty {
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "easy" => Some(Difficulty::Easy),
      "medium" => Some(Difficulty::Medium),
      "hard" => Some(Difficulty::Hard),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "Easy",
      Difficulty::Medium => "Medium",
      Difficulty::Hard => "Hard",
    }
  }
}

/// One weighted grading criterion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Criterion {
  pub name: String,
  pub points: f64,
  #[serde(default)]
  pub description: String,
}

/// Ordered rubric attached to a question. Invariant: `criteria` is non-empty
/// for every question exposed to a student (the validator enforces this).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rubric {
  pub criteria: Vec<Criterion>,
  pub total_points: f64,
  #[serde(default)]
  pub required_elements: Vec<String>,
}

/// Background material generated alongside the question.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DomainInfo {
  pub background_info: String,
  #[serde(default)]
  pub key_concepts: Vec<String>,
  #[serde(default)]
  pub context: String,
}

/// An exam question with its rubric and supporting information.
/// Immutable once created; owned by the session for its lifetime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExamQuestion {
  pub question_id: String,
  pub question_text: String,
  pub rubric: Rubric,
  pub domain_info: DomainInfo,
  pub domain: String,
  #[serde(default)]
  pub difficulty: Option<Difficulty>,
  #[serde(default)]
  pub difficulty_score: Option<f64>,
  pub created_at: DateTime<Utc>,
}

/// A student's submitted answer to one question.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StudentResponse {
  pub question_id: String,
  pub response_text: String,
  pub time_spent_seconds: f64,
  pub submitted_at: DateTime<Utc>,
}

/// Grade for a single rubric criterion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CriterionGrade {
  pub criterion: String,
  pub points_awarded: f64,
  pub max_points: f64,
  pub explanation: String,
  pub satisfied: bool,
}

/// Complete grading result for one student response.
/// `total_points_awarded` equals the sum of per-criterion awards (the grading
/// pipeline aggregates; it does not trust the model's own total), and
/// `total_points_possible` comes from the question rubric.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GradeResult {
  pub question_id: String,
  pub total_points_awarded: f64,
  pub total_points_possible: f64,
  pub percentage: f64,
  pub overall_feedback: String,
  pub criterion_grades: Vec<CriterionGrade>,
  pub strengths: Vec<String>,
  pub weaknesses: Vec<String>,
  pub suggestions: Vec<String>,
  /// "P" when highly satisfactory, otherwise a descriptive state.
  pub state: String,
  pub graded_at: DateTime<Utc>,
}

/// One student's exam run. Responses and grades stay index-aligned: entry i
/// of each belongs to the i-th answered question. Ephemeral by design.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExamSession {
  pub session_id: String,
  pub student_id: String,
  pub questions: Vec<ExamQuestion>,
  pub responses: Vec<StudentResponse>,
  pub grades: Vec<GradeResult>,
  pub started_at: DateTime<Utc>,
  #[serde(default)]
  pub completed_at: Option<DateTime<Utc>>,
}

impl ExamSession {
  /// First question without a submitted response, with its position.
  pub fn current_question(&self) -> Option<(usize, &ExamQuestion)> {
    let answered: Vec<&str> = self.responses.iter().map(|r| r.question_id.as_str()).collect();
    self
      .questions
      .iter()
      .enumerate()
      .find(|(_, q)| !answered.contains(&q.question_id.as_str()))
  }

  pub fn is_complete(&self) -> bool {
    self.responses.len() == self.questions.len()
  }
}
