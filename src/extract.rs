//! Structured extractor: turns raw model text into a JSON mapping.
//!
//! Models are asked for a bare JSON object but routinely prepend prose, wrap
//! the payload in markdown fences, emit Python-style literals (single quotes,
//! `True`/`False`/`None`), or truncate mid-structure. Recovery is an ordered
//! list of pure strategies `&str -> Option<Record>`; the driver takes the
//! first success and never merges across strategies.
//!
//! Diagnostics go to the `extract` tracing target at debug level: raw-text
//! previews, the winning strategy, or the full failure trace. Nothing here
//! is ever shown to end users.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ExtractError;
use crate::util::trunc_for_log;

/// The mapping produced by extraction, consumed immediately by the validator.
pub type Record = Map<String, Value>;

/// Which schema governs validation of the extracted mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeHint {
  Question,
  Grade,
}

impl ShapeHint {
  pub fn as_str(&self) -> &'static str {
    match self {
      ShapeHint::Question => "question",
      ShapeHint::Grade => "grade",
    }
  }
}

/// Run the fallback chain. Pure apart from diagnostics logging.
pub fn extract_record(text: &str, hint: ShapeHint) -> Result<Record, ExtractError> {
  let strategies: [(&str, fn(&str) -> Option<Record>); 5] = [
    ("direct_parse", parse_direct),
    ("fence_strip", parse_fenced),
    ("brace_match", parse_braced),
    ("token_normalize", parse_normalized),
    ("truncation_repair", parse_repaired),
  ];

  for (idx, (name, strategy)) in strategies.iter().enumerate() {
    match strategy(text) {
      Some(record) => {
        debug!(target: "extract", hint = hint.as_str(), strategy = idx + 1, name, keys = record.len(), "extraction succeeded");
        return Ok(record);
      }
      None => {
        debug!(target: "extract", hint = hint.as_str(), strategy = idx + 1, name, "strategy yielded nothing");
      }
    }
  }

  debug!(target: "extract", hint = hint.as_str(), raw = %trunc_for_log(text, 1000), "all strategies exhausted");
  Err(ExtractError { preview: trunc_for_log(text, 500) })
}

// -------- Strategy 1: direct structural parse --------

/// Strict JSON first, then a native-literal sub-attempt (single quotes,
/// `True`/`False`/`None`, trailing commas) rewritten into JSON.
fn parse_direct(text: &str) -> Option<Record> {
  let t = text.trim();
  if let Ok(Value::Object(m)) = serde_json::from_str::<Value>(t) {
    return Some(m);
  }
  let rewritten = rewrite_native_literal(t);
  match serde_json::from_str::<Value>(&rewritten) {
    Ok(Value::Object(m)) => Some(m),
    _ => None,
  }
}

/// Quote-aware rewrite of a Python-style dict literal into JSON:
/// - single-quoted strings become double-quoted (inner `"` escaped, `\'`
///   unescaped);
/// - bare `True`/`False`/`None` tokens become `true`/`false`/`null`;
/// - trailing commas before `}`/`]` are dropped.
/// Content inside string literals is never token-substituted.
fn rewrite_native_literal(text: &str) -> String {
  let chars: Vec<char> = text.chars().collect();
  let mut out = String::with_capacity(text.len());
  let mut i = 0;

  while i < chars.len() {
    let c = chars[i];
    match c {
      '"' | '\'' => {
        let quote = c;
        out.push('"');
        i += 1;
        while i < chars.len() {
          let d = chars[i];
          if d == '\\' && i + 1 < chars.len() {
            let e = chars[i + 1];
            if e == '\'' {
              out.push('\'');
            } else {
              out.push('\\');
              out.push(e);
            }
            i += 2;
            continue;
          }
          if d == quote {
            break;
          }
          if d == '"' {
            out.push('\\');
          }
          out.push(d);
          i += 1;
        }
        out.push('"');
        i += 1; // past the closing quote (or end of input)
      }
      ',' => {
        let mut j = i + 1;
        while j < chars.len() && chars[j].is_whitespace() {
          j += 1;
        }
        if !(j < chars.len() && (chars[j] == '}' || chars[j] == ']')) {
          out.push(',');
        }
        i += 1;
      }
      c if c.is_ascii_alphabetic() => {
        let start = i;
        while i < chars.len() && chars[i].is_ascii_alphanumeric() {
          i += 1;
        }
        let word: String = chars[start..i].iter().collect();
        match word.as_str() {
          "True" => out.push_str("true"),
          "False" => out.push_str("false"),
          "None" => out.push_str("null"),
          _ => out.push_str(&word),
        }
      }
      _ => {
        out.push(c);
        i += 1;
      }
    }
  }
  out
}

// -------- Strategy 2: markdown fence stripping --------

/// Collect the contents of triple-backtick fences (language tags allowed,
/// unterminated final fence tolerated), longest candidate first, and retry
/// the direct parse on each.
fn parse_fenced(text: &str) -> Option<Record> {
  let mut candidates: Vec<&str> = Vec::new();
  let mut rest = text;
  while let Some(start) = rest.find("```") {
    let after = &rest[start + 3..];
    // Skip the optional language tag: content starts after the first newline
    // when there is one, otherwise immediately.
    let body_start = match after.find('\n') {
      Some(nl) if after[..nl].len() <= 12 && !after[..nl].contains('{') => nl + 1,
      _ => 0,
    };
    let body = &after[body_start..];
    match body.find("```") {
      Some(end) => {
        candidates.push(body[..end].trim());
        rest = &body[end + 3..];
      }
      None => {
        candidates.push(body.trim());
        break;
      }
    }
  }
  candidates.sort_by_key(|c| std::cmp::Reverse(c.len()));
  candidates.into_iter().find_map(parse_direct)
}

// -------- Strategy 3: boundary extraction by brace matching --------

/// Byte span of the first balanced `{…}` starting at or after `from`.
/// Braces inside single- or double-quoted string literals are ignored.
/// Quote tracking only begins at the opening brace: apostrophes in leading
/// prose ("Here's the JSON...") are not string delimiters.
fn balanced_span(text: &str, from: usize) -> Option<(usize, usize)> {
  let start = from + text[from..].find('{')?;
  let mut depth: u32 = 0;
  let mut in_str: Option<char> = None;
  let mut escaped = false;

  for (i, c) in text[start..].char_indices() {
    if let Some(q) = in_str {
      if escaped {
        escaped = false;
      } else if c == '\\' {
        escaped = true;
      } else if c == q {
        in_str = None;
      }
      continue;
    }
    match c {
      '"' | '\'' => in_str = Some(c),
      '{' => depth += 1,
      '}' => {
        // The first character is always `{`, so depth is at least 1 here.
        depth -= 1;
        if depth == 0 {
          return Some((start, start + i + 1));
        }
      }
      _ => {}
    }
  }
  None
}

/// Slice each balanced brace span in turn and retry the direct parse on it.
/// Recovers a dictionary embedded in explanatory prose before/after it; a
/// balanced-but-unparseable span (prose braces) is skipped past its opening
/// brace so a later real mapping is still found.
fn parse_braced(text: &str) -> Option<Record> {
  let mut from = 0;
  while let Some((start, end)) = balanced_span(text, from) {
    if let Some(record) = parse_direct(&text[start..end]) {
      return Some(record);
    }
    from = start + 1;
  }
  None
}

// -------- Strategy 4: token normalization, then retry 1-3 --------

/// Targeted textual substitutions: smart quotes to straight quotes and
/// Python literal tokens to JSON ones. The trailing-comma trim lives in the
/// native-literal rewrite, which every retried strategy funnels through.
fn normalize_tokens(text: &str) -> String {
  text
    .replace(['\u{2018}', '\u{2019}'], "'")
    .replace(['\u{201C}', '\u{201D}'], "\"")
    .replace("True", "true")
    .replace("False", "false")
    .replace("None", "null")
}

fn parse_normalized(text: &str) -> Option<Record> {
  let normalized = normalize_tokens(text);
  parse_direct(&normalized)
    .or_else(|| parse_fenced(&normalized))
    .or_else(|| parse_braced(&normalized))
}

// -------- Strategy 5: best-effort truncation repair --------

/// If a `{` is present with no matching `}` (truncated output), close any
/// unterminated string and append the minimum closing brackets needed to
/// balance depth, then retry the direct parse.
fn parse_repaired(text: &str) -> Option<Record> {
  let start = text.find('{')?;
  let tail = &text[start..];

  let mut stack: Vec<char> = Vec::new();
  let mut in_str: Option<char> = None;
  let mut escaped = false;
  for c in tail.chars() {
    if let Some(q) = in_str {
      if escaped {
        escaped = false;
      } else if c == '\\' {
        escaped = true;
      } else if c == q {
        in_str = None;
      }
      continue;
    }
    match c {
      '"' | '\'' => in_str = Some(c),
      '{' => stack.push('}'),
      '[' => stack.push(']'),
      '}' | ']' => {
        if stack.last() == Some(&c) {
          stack.pop();
        }
      }
      _ => {}
    }
  }

  if stack.is_empty() && in_str.is_none() {
    // Already balanced; truncation is not the problem.
    return None;
  }

  let mut candidate = tail.trim_end().to_string();
  if let Some(q) = in_str {
    candidate.push(q);
  }
  while let Some(close) = stack.pop() {
    candidate.push(close);
  }
  parse_direct(&candidate)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn extract(text: &str) -> Record {
    extract_record(text, ShapeHint::Question).expect("extraction should succeed")
  }

  #[test]
  fn strict_json_parses_directly() {
    let rec = extract(r#"{"question_text": "Explain TCP.", "n": 3, "ok": true}"#);
    assert_eq!(rec.get("question_text"), Some(&json!("Explain TCP.")));
    assert_eq!(rec.get("n"), Some(&json!(3)));
    // Output must equal the direct parse.
    let direct: Value = serde_json::from_str(r#"{"question_text": "Explain TCP.", "n": 3, "ok": true}"#).unwrap();
    assert_eq!(Value::Object(rec), direct);
  }

  #[test]
  fn native_literal_syntax_parses() {
    let rec = extract("{'question_text': 'What is \"entropy\"?', 'difficulty': None, 'graded': True, 'failed': False,}");
    assert_eq!(rec.get("question_text"), Some(&json!("What is \"entropy\"?")));
    assert_eq!(rec.get("difficulty"), Some(&Value::Null));
    assert_eq!(rec.get("graded"), Some(&json!(true)));
    assert_eq!(rec.get("failed"), Some(&json!(false)));
  }

  #[test]
  fn fenced_block_with_prose_is_recovered() {
    let text = "Sure, here is the question you asked for:\n```json\n{\"question_text\": \"Q1\"}\n```\nLet me know if you need anything else.";
    let rec = extract(text);
    assert_eq!(rec.get("question_text"), Some(&json!("Q1")));
  }

  #[test]
  fn fence_without_language_tag() {
    let text = "```\n{'a': 1}\n```";
    let rec = extract(text);
    assert_eq!(rec.get("a"), Some(&json!(1)));
  }

  #[test]
  fn brace_matching_ignores_braces_in_strings() {
    let rec = extract("prose { noise } {\"key\": \"a}b\"} trailing");
    assert_eq!(rec.len(), 1);
    assert_eq!(rec.get("key"), Some(&json!("a}b")));
  }

  #[test]
  fn apostrophes_in_leading_prose_do_not_block_recovery() {
    let rec = extract("Here's the JSON you asked for: {\"question_text\": \"Q1\"}");
    assert_eq!(rec.get("question_text"), Some(&json!("Q1")));
  }

  #[test]
  fn contractions_before_and_after_the_mapping() {
    let text = "I've put it below. Don't hesitate to ask.\n{\"a\": 1}\nThat's all!";
    let rec = extract(text);
    assert_eq!(rec.get("a"), Some(&json!(1)));
  }

  #[test]
  fn mapping_embedded_in_prose_is_recovered() {
    let text = "Here is your dictionary: {\"a\": {\"b\": [1, 2]}} — hope that helps!";
    let rec = extract(text);
    assert_eq!(rec.get("a"), Some(&json!({"b": [1, 2]})));
  }

  #[test]
  fn smart_quotes_are_normalized() {
    let text = "{\u{201C}key\u{201D}: \u{201C}value\u{201D}}";
    let rec = extract(text);
    assert_eq!(rec.get("key"), Some(&json!("value")));
  }

  #[test]
  fn truncated_output_is_repaired() {
    let rec = extract(r#"{"a": {"b": 1"#);
    assert_eq!(rec.get("a"), Some(&json!({"b": 1})));
  }

  #[test]
  fn truncated_mid_string_is_repaired() {
    let rec = extract(r#"{"feedback": "good wor"#);
    assert_eq!(rec.get("feedback"), Some(&json!("good wor")));
  }

  #[test]
  fn truncated_list_is_repaired() {
    let rec = extract(r#"{"strengths": ["clear", "concise""#);
    assert_eq!(rec.get("strengths"), Some(&json!(["clear", "concise"])));
  }

  #[test]
  fn unrecoverable_text_fails_with_preview() {
    let err = extract_record("the model refused to answer", ShapeHint::Grade).unwrap_err();
    assert!(err.preview.contains("refused"));
  }

  #[test]
  fn top_level_array_is_not_a_record() {
    assert!(extract_record("[1, 2, 3]", ShapeHint::Question).is_err());
  }

  #[test]
  fn rewrite_keeps_tokens_inside_strings() {
    let rec = extract("{'note': 'None of the above is True'}");
    assert_eq!(rec.get("note"), Some(&json!("None of the above is True")));
  }
}
