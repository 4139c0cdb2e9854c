//! HTTP endpoint handlers. These are thin wrappers around the pipelines and
//! the session store; terminal pipeline failures surface as a single clear
//! message advising resubmission, never raw model text.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::domain::{Difficulty, ExamSession, StudentResponse};
use crate::generator::generate_question_batch;
use crate::grader::grade_response;
use crate::protocol::*;
use crate::state::AppState;

type ApiError = (StatusCode, Json<ErrorOut>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
  (status, Json(ErrorOut { error: message.into() }))
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip(state, body), fields(domain = %body.domain, num_questions = body.num_questions, student_id = %body.student_id))]
pub async fn http_create_exam(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CreateExamIn>,
) -> Result<Json<CreateExamOut>, ApiError> {
  let llm = state.llm.as_ref().ok_or_else(|| {
    api_error(
      StatusCode::SERVICE_UNAVAILABLE,
      "Model API key not configured. Set TOGETHER_API_KEY and restart the server.",
    )
  })?;

  if body.domain.trim().is_empty() {
    return Err(api_error(StatusCode::UNPROCESSABLE_ENTITY, "domain must not be empty"));
  }
  if body.num_questions == 0 || body.num_questions > 10 {
    return Err(api_error(StatusCode::UNPROCESSABLE_ENTITY, "num_questions must be between 1 and 10"));
  }
  let target_difficulty = match &body.target_difficulty {
    None => None,
    Some(s) => Some(Difficulty::parse(s).ok_or_else(|| {
      api_error(StatusCode::UNPROCESSABLE_ENTITY, "target_difficulty must be Easy, Medium or Hard")
    })?),
  };

  let questions = generate_question_batch(
    llm,
    &state.prompts,
    &state.tunables,
    &body.domain,
    body.num_questions,
    body.professor_instructions.as_deref().unwrap_or(""),
    target_difficulty,
  )
  .await
  .map_err(|e| {
    error!(target: "exam", error = %e.last_error, "exam creation failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, e.message)
  })?;

  let session = ExamSession {
    session_id: Uuid::new_v4().to_string(),
    student_id: body.student_id,
    questions,
    responses: Vec::new(),
    grades: Vec::new(),
    started_at: Utc::now(),
    completed_at: None,
  };
  let out = CreateExamOut {
    session_id: session.session_id.clone(),
    num_questions: session.questions.len(),
    questions: session.questions.iter().map(to_question_out).collect(),
  };
  info!(target: "exam", session_id = %session.session_id, questions = session.questions.len(), "exam session created");
  state.store.put(session);
  Ok(Json(out))
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn http_current_question(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
) -> Result<Json<CurrentQuestionOut>, ApiError> {
  let session = state
    .store
    .get(&session_id)
    .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Exam session not found"))?;

  let out = match session.current_question() {
    Some((idx, q)) => CurrentQuestionOut {
      all_complete: false,
      question: Some(to_question_out(q)),
      question_index: idx + 1,
      total_questions: session.questions.len(),
    },
    None => CurrentQuestionOut {
      all_complete: true,
      question: None,
      question_index: session.questions.len(),
      total_questions: session.questions.len(),
    },
  };
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(%session_id, question_id = %body.question_id, answer_len = body.response_text.len()))]
pub async fn http_submit_response(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
  Json(body): Json<SubmitResponseIn>,
) -> Result<Json<SubmitResponseOut>, ApiError> {
  let llm = state.llm.as_ref().ok_or_else(|| {
    api_error(
      StatusCode::SERVICE_UNAVAILABLE,
      "Model API key not configured. Set TOGETHER_API_KEY and restart the server.",
    )
  })?;

  let session = state
    .store
    .get(&session_id)
    .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Exam session not found"))?;
  let question = session
    .questions
    .iter()
    .find(|q| q.question_id == body.question_id)
    .cloned()
    .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Question not found in this session"))?;
  if session.responses.iter().any(|r| r.question_id == body.question_id) {
    return Err(api_error(StatusCode::CONFLICT, "This question was already answered"));
  }

  let response = StudentResponse {
    question_id: body.question_id,
    response_text: body.response_text,
    time_spent_seconds: body.time_spent_seconds,
    submitted_at: Utc::now(),
  };

  // Grade before recording anything: a terminal grading failure leaves the
  // session untouched so the student can simply resubmit.
  let grade = grade_response(llm, &state.prompts, &state.tunables, &question, &response)
    .await
    .map_err(|e| {
      error!(target: "exam", %session_id, error = %e.last_error, "grading failed");
      api_error(StatusCode::INTERNAL_SERVER_ERROR, e.message)
    })?;

  let summary = GradeSummaryOut::from(&grade);
  let updated = state
    .store
    .update(&session_id, &mut |s| {
      s.responses.push(response.clone());
      s.grades.push(grade.clone());
      if s.is_complete() && s.completed_at.is_none() {
        s.completed_at = Some(Utc::now());
      }
    })
    .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Exam session not found"))?;

  Ok(Json(SubmitResponseOut {
    success: true,
    exam_complete: updated.is_complete(),
    grade: summary,
  }))
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn http_results(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
) -> Result<Json<ResultsOut>, ApiError> {
  let session = state
    .store
    .get(&session_id)
    .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Exam session not found"))?;
  Ok(Json(ResultsOut {
    session_id: session.session_id.clone(),
    student_id: session.student_id.clone(),
    all_complete: session.is_complete(),
    grades: session.grades,
  }))
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
) -> Result<Json<SessionOut>, ApiError> {
  let session = state
    .store
    .get(&session_id)
    .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Exam session not found"))?;
  Ok(Json(SessionOut {
    session_id: session.session_id.clone(),
    student_id: session.student_id.clone(),
    num_questions: session.questions.len(),
    num_responses: session.responses.len(),
    num_grades: session.grades.len(),
    started_at: session.started_at.to_rfc3339(),
    completed_at: session.completed_at.map(|t| t.to_rfc3339()),
  }))
}
