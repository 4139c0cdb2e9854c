//! Grading pipeline: embeds the rubric and student response into the grading
//! prompt, runs the same channel/extract/validate loop as generation, then
//! aggregates per-criterion scores into a `GradeResult`.
//!
//! The model's own totals are advisory: the overall score is the sum of
//! per-criterion awards, the possible total comes from the question rubric,
//! and the percentage is recomputed from those two.

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::config::{Prompts, Tunables};
use crate::domain::{CriterionGrade, ExamQuestion, GradeResult, StudentResponse};
use crate::error::GradingFailed;
use crate::extract::ShapeHint;
use crate::llm::ModelChannel;
use crate::pipeline::{run_pipeline, PipelineOpts};
use crate::schema::{validate_grade, GradeDraft};
use crate::util::fill_template;

fn build_grading_prompt(prompts: &Prompts, question: &ExamQuestion, response: &StudentResponse) -> String {
  let criteria_list = question
    .rubric
    .criteria
    .iter()
    .map(|c| {
      if c.description.is_empty() {
        format!("- {} ({} points)", c.name, c.points)
      } else {
        format!("- {} ({} points): {}", c.name, c.points, c.description)
      }
    })
    .collect::<Vec<_>>()
    .join("\n");
  let required_elements = question
    .rubric
    .required_elements
    .iter()
    .map(|e| format!("- {}", e))
    .collect::<Vec<_>>()
    .join("\n");
  let key_concepts = question
    .domain_info
    .key_concepts
    .iter()
    .map(|c| format!("- {}", c))
    .collect::<Vec<_>>()
    .join("\n");

  fill_template(
    &prompts.grading_template,
    &[
      ("domain", question.domain.as_str()),
      ("question_text", question.question_text.as_str()),
      ("criteria_list", &criteria_list),
      ("total_points", &question.rubric.total_points.to_string()),
      ("required_elements", &required_elements),
      ("background_info", question.domain_info.background_info.as_str()),
      ("key_concepts", &key_concepts),
      ("context", question.domain_info.context.as_str()),
      ("student_response", response.response_text.as_str()),
      ("time_spent_seconds", &format!("{:.0}", response.time_spent_seconds)),
    ],
  )
}

#[instrument(level = "info", skip(channel, prompts, tunables, question, response), fields(question_id = %question.question_id, answer_len = response.response_text.len()))]
pub async fn grade_response<C: ModelChannel>(
  channel: &C,
  prompts: &Prompts,
  tunables: &Tunables,
  question: &ExamQuestion,
  response: &StudentResponse,
) -> Result<GradeResult, GradingFailed> {
  let prompt = build_grading_prompt(prompts, question, response);
  let opts = PipelineOpts {
    temperature: tunables.grading_temperature,
    max_tokens: tunables.grading_max_tokens,
    max_retries: tunables.max_retries,
  };

  let draft = run_pipeline(channel, &prompt, ShapeHint::Grade, &opts, validate_grade)
    .await
    .map_err(|e| GradingFailed {
      message: "We could not grade this answer: the AI returned output we could not use. \
                Your answer is unchanged — please submit it again."
        .into(),
      last_error: e,
    })?;

  Ok(assemble_grade(question, draft))
}

/// Aggregate the validated draft into the final result. Keeps the invariant
/// that the overall score equals the sum of per-criterion awards.
fn assemble_grade(question: &ExamQuestion, draft: GradeDraft) -> GradeResult {
  let total_points_possible = question.rubric.total_points;

  let criterion_grades = if !draft.criterion_grades.is_empty() {
    draft.criterion_grades
  } else {
    // The model gave only an overall number: distribute it proportionally
    // over the rubric so per-criterion rows still render. A bare percentage
    // is converted against the rubric total.
    let reported = draft
      .reported_total_awarded
      .or_else(|| draft.reported_percentage.map(|p| p / 100.0 * total_points_possible))
      .unwrap_or(0.0);
    question
      .rubric
      .criteria
      .iter()
      .map(|c| {
        let awarded = if total_points_possible > 0.0 {
          reported / total_points_possible * c.points
        } else {
          0.0
        };
        CriterionGrade {
          criterion: c.name.clone(),
          points_awarded: awarded,
          max_points: c.points,
          explanation: "Grading details not available from the AI response.".into(),
          satisfied: c.points > 0.0 && awarded >= c.points * 0.7,
        }
      })
      .collect()
  };

  let total_points_awarded: f64 = criterion_grades.iter().map(|g| g.points_awarded).sum();
  let percentage = if total_points_possible > 0.0 {
    total_points_awarded / total_points_possible * 100.0
  } else {
    0.0
  };

  if let Some(reported) = draft.reported_total_awarded {
    if (reported - total_points_awarded).abs() > 1.0 {
      warn!(
        target: "exam",
        question_id = %question.question_id,
        reported,
        aggregated = total_points_awarded,
        "model total disagrees with per-criterion sum; using the sum"
      );
    }
  }

  let state = draft
    .state
    .unwrap_or_else(|| if percentage >= 80.0 { "P".into() } else { "Needs Improvement".into() });

  let result = GradeResult {
    question_id: question.question_id.clone(),
    total_points_awarded,
    total_points_possible,
    percentage,
    overall_feedback: draft.overall_feedback,
    criterion_grades,
    strengths: draft.strengths,
    weaknesses: draft.weaknesses,
    suggestions: draft.suggestions,
    state,
    graded_at: Utc::now(),
  };
  info!(
    target: "exam",
    question_id = %result.question_id,
    awarded = result.total_points_awarded,
    possible = result.total_points_possible,
    percentage = format!("{:.1}", result.percentage),
    state = %result.state,
    "response graded"
  );
  result
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Criterion, DomainInfo, Rubric};

  fn question() -> ExamQuestion {
    ExamQuestion {
      question_id: "q-1".into(),
      question_text: "Discuss the role of ATP in metabolism.".into(),
      rubric: Rubric {
        criteria: vec![
          Criterion { name: "mechanism".into(), points: 10.0, description: "hydrolysis described".into() },
          Criterion { name: "examples".into(), points: 15.0, description: String::new() },
          Criterion { name: "synthesis".into(), points: 10.0, description: String::new() },
        ],
        total_points: 35.0,
        required_elements: vec!["ATP hydrolysis".into()],
      },
      domain_info: DomainInfo {
        background_info: "ATP is the cell's energy currency.".into(),
        key_concepts: vec!["phosphorylation".into()],
        context: String::new(),
      },
      domain: "Biology".into(),
      difficulty: None,
      difficulty_score: None,
      created_at: Utc::now(),
    }
  }

  fn draft(grades: Vec<CriterionGrade>, reported: Option<f64>) -> GradeDraft {
    GradeDraft {
      overall_feedback: "Decent answer.".into(),
      criterion_grades: grades,
      strengths: vec!["clear".into()],
      weaknesses: vec![],
      suggestions: vec![],
      state: None,
      reported_total_awarded: reported,
      reported_percentage: None,
    }
  }

  fn cg(name: &str, awarded: f64, max: f64) -> CriterionGrade {
    CriterionGrade {
      criterion: name.into(),
      points_awarded: awarded,
      max_points: max,
      explanation: String::new(),
      satisfied: awarded >= max * 0.7,
    }
  }

  #[test]
  fn overall_equals_weighted_criterion_sum() {
    let q = question();
    // Values chosen so naive float addition would drift without aggregation.
    let grades = vec![cg("mechanism", 9.1, 10.0), cg("examples", 13.3, 15.0), cg("synthesis", 7.2, 10.0)];
    let result = assemble_grade(&q, draft(grades, Some(35.0)));
    let sum: f64 = result.criterion_grades.iter().map(|g| g.points_awarded).sum();
    assert!((result.total_points_awarded - sum).abs() < 1e-6);
    assert_eq!(result.total_points_possible, 35.0);
    assert!((result.percentage - sum / 35.0 * 100.0).abs() < 1e-6);
  }

  #[test]
  fn possible_total_comes_from_the_rubric_not_the_model() {
    let q = question();
    let result = assemble_grade(&q, draft(vec![cg("mechanism", 10.0, 10.0)], None));
    assert_eq!(result.total_points_possible, q.rubric.total_points);
  }

  #[test]
  fn missing_criterion_grades_distribute_proportionally() {
    let q = question();
    let result = assemble_grade(&q, draft(vec![], Some(17.5)));
    assert_eq!(result.criterion_grades.len(), 3);
    assert!((result.total_points_awarded - 17.5).abs() < 1e-6);
    // Half of each criterion's points.
    assert!((result.criterion_grades[0].points_awarded - 5.0).abs() < 1e-6);
    assert!(!result.criterion_grades[0].satisfied);
  }

  #[test]
  fn percentage_only_report_distributes_proportionally() {
    let q = question();
    let d = GradeDraft {
      reported_total_awarded: None,
      reported_percentage: Some(50.0),
      ..draft(vec![], None)
    };
    let result = assemble_grade(&q, d);
    // 50% of the 35-point rubric, spread over the criteria.
    assert!((result.total_points_awarded - 17.5).abs() < 1e-6);
    assert!((result.criterion_grades[1].points_awarded - 7.5).abs() < 1e-6);
  }

  #[test]
  fn state_derived_from_percentage_when_absent() {
    let q = question();
    let high = assemble_grade(&q, draft(vec![cg("mechanism", 10.0, 10.0), cg("examples", 15.0, 15.0), cg("synthesis", 4.0, 10.0)], None));
    assert_eq!(high.state, "P");
    let low = assemble_grade(&q, draft(vec![cg("mechanism", 2.0, 10.0)], None));
    assert_eq!(low.state, "Needs Improvement");
  }

  #[test]
  fn grading_prompt_embeds_rubric_and_response() {
    let q = question();
    let r = StudentResponse {
      question_id: "q-1".into(),
      response_text: "ATP hydrolysis releases energy…".into(),
      time_spent_seconds: 182.4,
      submitted_at: Utc::now(),
    };
    let p = build_grading_prompt(&Prompts::default(), &q, &r);
    assert!(p.contains("mechanism (10 points): hydrolysis described"));
    assert!(p.contains("ATP hydrolysis releases energy…"));
    assert!(p.contains("182 seconds"));
    assert!(!p.contains("{student_response}"));
  }
}
