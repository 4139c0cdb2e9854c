//! Schema validation: extracted mappings -> typed question/grade drafts.
//!
//! Required keys are checked by presence; missing ones fail with the field
//! name and are never silently defaulted. Coercion is whitelisted only:
//! numeric-looking strings to numbers, textual booleans to booleans, textual
//! nulls to null. Sequences are validated element-wise and one malformed
//! element fails the whole record, surfacing data quality problems instead
//! of masking them.

use serde_json::Value;

use crate::domain::{Criterion, CriterionGrade, Difficulty, DomainInfo, Rubric};
use crate::error::SchemaError;
use crate::extract::Record;

/// Validated question payload, before ids/timestamps are attached.
#[derive(Clone, Debug)]
pub struct QuestionDraft {
  pub question_text: String,
  pub domain_info: DomainInfo,
  pub rubric: Rubric,
  pub difficulty: Option<Difficulty>,
  pub difficulty_score: Option<f64>,
}

/// Validated grading payload, before aggregation into a `GradeResult`.
#[derive(Clone, Debug)]
pub struct GradeDraft {
  pub overall_feedback: String,
  pub criterion_grades: Vec<CriterionGrade>,
  pub strengths: Vec<String>,
  pub weaknesses: Vec<String>,
  pub suggestions: Vec<String>,
  pub state: Option<String>,
  pub reported_total_awarded: Option<f64>,
  pub reported_percentage: Option<f64>,
}

// -------- Whitelisted coercions --------

/// Textual null conventions count as absent.
fn is_nullish(v: &Value) -> bool {
  match v {
    Value::Null => true,
    Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "null" | "none"),
    _ => false,
  }
}

fn coerce_f64(v: &Value) -> Option<f64> {
  match v {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse::<f64>().ok(),
    _ => None,
  }
}

fn coerce_bool(v: &Value) -> Option<bool> {
  match v {
    Value::Bool(b) => Some(*b),
    Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
      "true" => Some(true),
      "false" => Some(false),
      _ => None,
    },
    _ => None,
  }
}

fn present<'a>(rec: &'a Record, key: &str) -> Option<&'a Value> {
  rec.get(key).filter(|v| !is_nullish(v))
}

fn require_string(rec: &Record, key: &str) -> Result<String, SchemaError> {
  let v = present(rec, key).ok_or_else(|| SchemaError::MissingField(key.to_string()))?;
  match v {
    Value::String(s) => Ok(s.clone()),
    other => Err(SchemaError::WrongType {
      field: key.to_string(),
      detail: format!("expected string, got {}", type_name(other)),
    }),
  }
}

fn require_f64(rec: &Record, key: &str) -> Result<f64, SchemaError> {
  let v = present(rec, key).ok_or_else(|| SchemaError::MissingField(key.to_string()))?;
  coerce_f64(v).ok_or_else(|| SchemaError::WrongType {
    field: key.to_string(),
    detail: format!("expected number, got {}", type_name(v)),
  })
}

fn optional_string(rec: &Record, key: &str) -> Result<String, SchemaError> {
  match present(rec, key) {
    None => Ok(String::new()),
    Some(Value::String(s)) => Ok(s.clone()),
    Some(other) => Err(SchemaError::WrongType {
      field: key.to_string(),
      detail: format!("expected string, got {}", type_name(other)),
    }),
  }
}

/// Optional sequence of strings; a non-string element fails the record.
fn optional_string_list(rec: &Record, key: &str) -> Result<Vec<String>, SchemaError> {
  let v = match present(rec, key) {
    None => return Ok(Vec::new()),
    Some(v) => v,
  };
  let arr = v.as_array().ok_or_else(|| SchemaError::WrongType {
    field: key.to_string(),
    detail: format!("expected list, got {}", type_name(v)),
  })?;
  let mut out = Vec::with_capacity(arr.len());
  for (i, item) in arr.iter().enumerate() {
    match item {
      Value::String(s) => out.push(s.clone()),
      other => {
        return Err(SchemaError::WrongType {
          field: format!("{}[{}]", key, i),
          detail: format!("expected string, got {}", type_name(other)),
        })
      }
    }
  }
  Ok(out)
}

fn type_name(v: &Value) -> &'static str {
  match v {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "list",
    Value::Object(_) => "mapping",
  }
}

// -------- Question shape --------

pub fn validate_question(rec: &Record) -> Result<QuestionDraft, SchemaError> {
  let question_text = require_string(rec, "question_text")?;
  if question_text.trim().is_empty() {
    return Err(SchemaError::Invalid {
      field: "question_text".into(),
      detail: "must not be empty".into(),
    });
  }
  let background_info = require_string(rec, "background_info")?;
  let key_concepts = optional_string_list(rec, "key_concepts")?;
  let context = optional_string(rec, "context")?;

  let rubric_val = present(rec, "rubric").ok_or_else(|| SchemaError::MissingField("rubric".into()))?;
  let rubric_map = rubric_val.as_object().ok_or_else(|| SchemaError::WrongType {
    field: "rubric".into(),
    detail: format!("expected mapping, got {}", type_name(rubric_val)),
  })?;
  let rubric = validate_rubric(rubric_map)?;

  let difficulty = match present(rec, "difficulty") {
    None => None,
    Some(Value::String(s)) => Some(Difficulty::parse(s).ok_or_else(|| SchemaError::Invalid {
      field: "difficulty".into(),
      detail: format!("expected Easy/Medium/Hard, got '{}'", s),
    })?),
    Some(other) => {
      return Err(SchemaError::WrongType {
        field: "difficulty".into(),
        detail: format!("expected string, got {}", type_name(other)),
      })
    }
  };

  // Advisory value: clamp rather than reject.
  let difficulty_score = match present(rec, "difficulty_score") {
    None => None,
    Some(v) => Some(
      coerce_f64(v)
        .ok_or_else(|| SchemaError::WrongType {
          field: "difficulty_score".into(),
          detail: format!("expected number, got {}", type_name(v)),
        })?
        .clamp(1.0, 10.0),
    ),
  };

  Ok(QuestionDraft {
    question_text,
    domain_info: DomainInfo { background_info, key_concepts, context },
    rubric,
    difficulty,
    difficulty_score,
  })
}

/// Accepts either the rich criterion form (list of objects with name/points/
/// description) or the legacy encoding (list of names plus a
/// `points_per_criterion` map).
fn validate_rubric(rubric: &Record) -> Result<Rubric, SchemaError> {
  let criteria_val =
    present(rubric, "criteria").ok_or_else(|| SchemaError::MissingField("rubric.criteria".into()))?;
  let items = criteria_val.as_array().ok_or_else(|| SchemaError::WrongType {
    field: "rubric.criteria".into(),
    detail: format!("expected list, got {}", type_name(criteria_val)),
  })?;
  if items.is_empty() {
    return Err(SchemaError::Invalid {
      field: "rubric.criteria".into(),
      detail: "must not be empty".into(),
    });
  }

  let points_map = present(rubric, "points_per_criterion").and_then(|v| v.as_object());

  let mut criteria = Vec::with_capacity(items.len());
  for (i, item) in items.iter().enumerate() {
    let field = format!("rubric.criteria[{}]", i);
    match item {
      Value::Object(obj) => {
        let name = require_string(obj, "name").map_err(|e| prefix_field(e, &field))?;
        let points = require_f64(obj, "points").map_err(|e| prefix_field(e, &field))?;
        let description = optional_string(obj, "description").map_err(|e| prefix_field(e, &field))?;
        criteria.push(Criterion { name, points, description });
      }
      Value::String(name) => {
        // Legacy form: the weight lives in points_per_criterion.
        let points = points_map
          .and_then(|m| m.get(name.as_str()))
          .and_then(coerce_f64)
          .ok_or_else(|| SchemaError::MissingField(format!("rubric.points_per_criterion.{}", name)))?;
        criteria.push(Criterion { name: name.clone(), points, description: String::new() });
      }
      other => {
        return Err(SchemaError::WrongType {
          field,
          detail: format!("expected mapping or string, got {}", type_name(other)),
        })
      }
    }
  }

  let total_points = require_f64(rubric, "total_points").map_err(|e| prefix_field(e, "rubric"))?;
  if total_points <= 0.0 {
    return Err(SchemaError::Invalid {
      field: "rubric.total_points".into(),
      detail: "must be positive".into(),
    });
  }
  let required_elements = optional_string_list(rubric, "required_elements")?;

  Ok(Rubric { criteria, total_points, required_elements })
}

// -------- Grade shape --------

pub fn validate_grade(rec: &Record) -> Result<GradeDraft, SchemaError> {
  let explanation_val =
    present(rec, "explanation").ok_or_else(|| SchemaError::MissingField("explanation".into()))?;
  let explanation = explanation_val.as_object().ok_or_else(|| SchemaError::WrongType {
    field: "explanation".into(),
    detail: format!("expected mapping, got {}", type_name(explanation_val)),
  })?;

  let overall_feedback =
    require_string(explanation, "overall_feedback").map_err(|e| prefix_field(e, "explanation"))?;

  let grades_val = present(explanation, "criterion_grades")
    .ok_or_else(|| SchemaError::MissingField("explanation.criterion_grades".into()))?;
  let items = grades_val.as_array().ok_or_else(|| SchemaError::WrongType {
    field: "explanation.criterion_grades".into(),
    detail: format!("expected list, got {}", type_name(grades_val)),
  })?;

  let mut criterion_grades = Vec::with_capacity(items.len());
  for (i, item) in items.iter().enumerate() {
    let field = format!("explanation.criterion_grades[{}]", i);
    let obj = item.as_object().ok_or_else(|| SchemaError::WrongType {
      field: field.clone(),
      detail: format!("expected mapping, got {}", type_name(item)),
    })?;
    let criterion = require_string(obj, "criterion").map_err(|e| prefix_field(e, &field))?;
    let points_awarded = require_f64(obj, "points_awarded").map_err(|e| prefix_field(e, &field))?;
    let max_points = require_f64(obj, "max_points").map_err(|e| prefix_field(e, &field))?;
    let explanation = optional_string(obj, "explanation").map_err(|e| prefix_field(e, &field))?;
    let satisfied = match present(obj, "satisfied") {
      Some(v) => coerce_bool(v).ok_or_else(|| SchemaError::WrongType {
        field: format!("{}.satisfied", field),
        detail: format!("expected boolean, got {}", type_name(v)),
      })?,
      // 70% threshold when the model omits the flag.
      None => max_points > 0.0 && points_awarded >= max_points * 0.7,
    };
    criterion_grades.push(CriterionGrade { criterion, points_awarded, max_points, explanation, satisfied });
  }

  let strengths = optional_string_list(explanation, "strengths").map_err(|e| prefix_field(e, "explanation"))?;
  let weaknesses = optional_string_list(explanation, "weaknesses").map_err(|e| prefix_field(e, "explanation"))?;
  let suggestions = optional_string_list(explanation, "suggestions").map_err(|e| prefix_field(e, "explanation"))?;

  let state = match present(rec, "state") {
    None => None,
    Some(Value::String(s)) => Some(s.clone()),
    Some(other) => {
      return Err(SchemaError::WrongType {
        field: "state".into(),
        detail: format!("expected string, got {}", type_name(other)),
      })
    }
  };
  let reported_total_awarded = present(rec, "total_points_awarded").and_then(coerce_f64);
  let reported_percentage = present(rec, "percentage").and_then(coerce_f64);

  Ok(GradeDraft {
    overall_feedback,
    criterion_grades,
    strengths,
    weaknesses,
    suggestions,
    state,
    reported_total_awarded,
    reported_percentage,
  })
}

fn prefix_field(e: SchemaError, prefix: &str) -> SchemaError {
  match e {
    SchemaError::MissingField(f) if !f.starts_with(prefix) => {
      SchemaError::MissingField(format!("{}.{}", prefix, f))
    }
    SchemaError::WrongType { field, detail } if !field.starts_with(prefix) => SchemaError::WrongType {
      field: format!("{}.{}", prefix, field),
      detail,
    },
    SchemaError::Invalid { field, detail } if !field.starts_with(prefix) => SchemaError::Invalid {
      field: format!("{}.{}", prefix, field),
      detail,
    },
    other => other,
  }
}
