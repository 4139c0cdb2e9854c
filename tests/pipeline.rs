//! End-to-end pipeline tests against a scripted model channel: retry
//! behavior, terminal failures, and grade aggregation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use examgen_backend::config::{Prompts, Tunables};
use examgen_backend::domain::{Criterion, Difficulty, DomainInfo, ExamQuestion, Rubric, StudentResponse};
use examgen_backend::error::ChannelError;
use examgen_backend::generator::{generate_question, generate_question_batch};
use examgen_backend::grader::grade_response;
use examgen_backend::llm::ModelChannel;

/// Replays a fixed sequence of channel outcomes and counts calls.
/// `None` entries simulate a transport failure; after the script runs out,
/// the last entry repeats.
struct ScriptedChannel {
  script: Mutex<Vec<Option<String>>>,
  calls: AtomicUsize,
}

impl ScriptedChannel {
  fn new(script: Vec<Option<&str>>) -> Self {
    Self {
      script: Mutex::new(script.into_iter().map(|s| s.map(str::to_string)).collect()),
      calls: AtomicUsize::new(0),
    }
  }

  fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl ModelChannel for ScriptedChannel {
  async fn send(&self, _prompt: &str, _temperature: f32, _max_tokens: u32) -> Result<String, ChannelError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let mut script = self.script.lock().unwrap();
    let entry = if script.len() > 1 { script.remove(0) } else { script[0].clone() };
    match entry {
      Some(text) => Ok(text),
      None => Err(ChannelError::Timeout),
    }
  }
}

fn tunables() -> Tunables {
  Tunables::default()
}

const VALID_QUESTION: &str = r#"{
  "background_info": "The water cycle moves water between reservoirs.",
  "key_concepts": ["evaporation", "condensation"],
  "context": "Consider energy inputs.",
  "question_text": "Explain how solar energy drives the water cycle.",
  "difficulty": "Medium",
  "difficulty_score": 5.0,
  "rubric": {
    "criteria": [
      {"name": "energy transfer", "points": 10.0, "description": "links solar input to evaporation"},
      {"name": "phase changes", "points": 10.0, "description": "names the transitions"}
    ],
    "total_points": 20.0,
    "required_elements": ["evaporation"]
  }
}"#;

fn sample_question() -> ExamQuestion {
  ExamQuestion {
    question_id: "q-7".into(),
    question_text: "Explain how solar energy drives the water cycle.".into(),
    rubric: Rubric {
      criteria: vec![
        Criterion { name: "energy transfer".into(), points: 10.0, description: String::new() },
        Criterion { name: "phase changes".into(), points: 10.0, description: String::new() },
      ],
      total_points: 20.0,
      required_elements: vec![],
    },
    domain_info: DomainInfo {
      background_info: "The water cycle moves water between reservoirs.".into(),
      key_concepts: vec![],
      context: String::new(),
    },
    domain: "Earth Science".into(),
    difficulty: Some(Difficulty::Medium),
    difficulty_score: Some(5.0),
    created_at: Utc::now(),
  }
}

fn sample_response() -> StudentResponse {
  StudentResponse {
    question_id: "q-7".into(),
    response_text: "The sun heats surface water, which evaporates and later condenses…".into(),
    time_spent_seconds: 240.0,
    submitted_at: Utc::now(),
  }
}

#[tokio::test]
async fn malformed_then_valid_succeeds_via_retry() {
  let channel = ScriptedChannel::new(vec![
    Some("I'm sorry, here you go: broken {{{ output"),
    Some(VALID_QUESTION),
  ]);
  let q = generate_question(&channel, &Prompts::default(), &tunables(), "Earth Science", "", None)
    .await
    .expect("retry should recover");
  assert_eq!(channel.calls(), 2);
  assert_eq!(q.rubric.criteria.len(), 2);
  assert_eq!(q.difficulty, Some(Difficulty::Medium));
  assert_eq!(q.domain, "Earth Science");
}

#[tokio::test]
async fn always_unparseable_fails_after_exactly_two_calls() {
  let channel = ScriptedChannel::new(vec![Some("no structure here at all")]);
  let err = generate_question(&channel, &Prompts::default(), &tunables(), "History", "", None)
    .await
    .unwrap_err();
  assert_eq!(channel.calls(), 2);
  // User-facing message advises retrying and never includes the raw text.
  assert!(err.message.contains("try creating the exam again"));
  assert!(!err.message.contains("no structure here"));
}

#[tokio::test]
async fn valid_first_attempt_makes_one_call() {
  let channel = ScriptedChannel::new(vec![Some(VALID_QUESTION)]);
  generate_question(&channel, &Prompts::default(), &tunables(), "Earth Science", "", None)
    .await
    .unwrap();
  assert_eq!(channel.calls(), 1);
}

#[tokio::test]
async fn fenced_and_pythonish_output_is_recovered_without_retry() {
  let wrapped = format!("Sure! Here is the question:\n```json\n{}\n```", VALID_QUESTION.replace("\"Medium\"", "'Medium'"));
  let channel = ScriptedChannel::new(vec![Some(wrapped.as_str())]);
  let q = generate_question(&channel, &Prompts::default(), &tunables(), "Earth Science", "", None)
    .await
    .unwrap();
  assert_eq!(channel.calls(), 1);
  assert_eq!(q.difficulty, Some(Difficulty::Medium));
}

#[tokio::test]
async fn transport_error_consumes_the_retry() {
  let channel = ScriptedChannel::new(vec![None, Some(VALID_QUESTION)]);
  let q = generate_question(&channel, &Prompts::default(), &tunables(), "Math", "", None).await.unwrap();
  assert_eq!(channel.calls(), 2);
  assert!(!q.question_text.is_empty());
}

#[tokio::test]
async fn schema_invalid_consumes_the_retry() {
  // Parseable mapping, but the rubric is missing: schema failure, not
  // extraction failure. Still only one retry.
  let channel = ScriptedChannel::new(vec![Some(r#"{"question_text": "Q?"}"#)]);
  let err = generate_question(&channel, &Prompts::default(), &tunables(), "Math", "", None)
    .await
    .unwrap_err();
  assert_eq!(channel.calls(), 2);
  assert!(err.message.contains("try creating the exam again"));
}

#[tokio::test]
async fn batch_generates_requested_count() {
  let channel = ScriptedChannel::new(vec![Some(VALID_QUESTION)]);
  let qs = generate_question_batch(&channel, &Prompts::default(), &tunables(), "Earth Science", 3, "", None)
    .await
    .unwrap();
  assert_eq!(qs.len(), 3);
  assert_eq!(channel.calls(), 3);
  // Every question gets its own id.
  assert_ne!(qs[0].question_id, qs[1].question_id);
}

#[tokio::test]
async fn grading_aggregates_criterion_scores() {
  let grade_json = r#"{
    "total_points_awarded": 99.0,
    "percentage": 12.0,
    "state": "P",
    "explanation": {
      "overall_feedback": "Strong grasp of the mechanism.",
      "criterion_grades": [
        {"criterion": "energy transfer", "points_awarded": 8.5, "max_points": 10.0, "explanation": "solid", "satisfied": true},
        {"criterion": "phase changes", "points_awarded": 7.25, "max_points": 10.0, "explanation": "partial", "satisfied": true}
      ],
      "strengths": ["clear chain of reasoning"],
      "weaknesses": ["no mention of transpiration"],
      "suggestions": ["add a diagram"]
    }
  }"#;
  let channel = ScriptedChannel::new(vec![Some(grade_json)]);
  let grade = grade_response(&channel, &Prompts::default(), &tunables(), &sample_question(), &sample_response())
    .await
    .unwrap();

  // The model's bogus totals are ignored in favor of the aggregate.
  let sum: f64 = grade.criterion_grades.iter().map(|g| g.points_awarded).sum();
  assert!((grade.total_points_awarded - sum).abs() < 1e-6);
  assert!((grade.total_points_awarded - 15.75).abs() < 1e-6);
  assert_eq!(grade.total_points_possible, 20.0);
  assert!((grade.percentage - 78.75).abs() < 1e-6);
  assert_eq!(grade.strengths, vec!["clear chain of reasoning".to_string()]);
}

#[tokio::test]
async fn grading_failure_message_is_distinct_from_generation() {
  let channel = ScriptedChannel::new(vec![Some("not a grade")]);
  let err = grade_response(&channel, &Prompts::default(), &tunables(), &sample_question(), &sample_response())
    .await
    .unwrap_err();
  assert_eq!(channel.calls(), 2);
  assert!(err.message.contains("could not grade"));
  assert!(err.message.contains("submit it again"));
}

#[tokio::test]
async fn truncated_grade_output_is_repaired() {
  // Missing the closing braces entirely, as if the token ceiling was hit.
  let truncated = r#"{
    "explanation": {
      "overall_feedback": "Good start.",
      "criterion_grades": [
        {"criterion": "energy transfer", "points_awarded": 6.0, "max_points": 10.0, "explanation": "ok", "satisfied": true}"#;
  let channel = ScriptedChannel::new(vec![Some(truncated)]);
  let grade = grade_response(&channel, &Prompts::default(), &tunables(), &sample_question(), &sample_response())
    .await
    .unwrap();
  assert_eq!(channel.calls(), 1);
  assert_eq!(grade.criterion_grades.len(), 1);
  assert!((grade.total_points_awarded - 6.0).abs() < 1e-6);
}
