//! Lenient JSON decoding for model output.
//!
//! Models are asked for strict JSON but routinely wrap it in Markdown fences,
//! leave trailing commas, emit raw newlines inside strings or double-escape the
//! whole object. Decoding goes through these stages, first success wins:
//!
//!   0. strip a surrounding ```json fence and parse
//!   1. normalize escapes, strip control characters and trailing commas, parse
//!   2. parse the slice between the first `{` and the last `}` of the stage-1 text
//!
//! When all fail the error carries the stage-0 parser message.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::GenerationError;

fn fence_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"(?s)^```(?:json)?\s*\n?(.*?)\n?\s*```$").expect("static regex"))
}

/// Remove one Markdown fence wrapping the entire text, if present.
pub fn strip_json_fence(text: &str) -> String {
  let text = text.trim();
  match fence_re().captures(text).and_then(|c| c.get(1)) {
    Some(body) if !body.as_str().trim().is_empty() => body.as_str().trim().to_string(),
    _ => text.to_string(),
  }
}

/// Stage-1 cleanup. Purely textual; see module docs.
pub fn clean_json_text(text: &str) -> String {
  let mut s = text.trim().to_string();

  // A whole object emitted as an escaped string literal: {\"a\": 1,\n ...}
  let head: String = s.chars().filter(|c| !c.is_whitespace()).take(3).collect();
  if head.starts_with("{\\\"") || head.starts_with("[\\\"") {
    s = s.replace("\\\"", "\"").replace("\\n", "\n").replace("\\t", "\t");
  }

  // Raw control characters: escape inside strings, drop elsewhere (except whitespace).
  // Trailing commas are dropped only outside strings.
  let mut out = String::with_capacity(s.len());
  let mut in_string = false;
  let mut escaped = false;
  for ch in s.chars() {
    if in_string {
      if escaped {
        escaped = false;
        out.push(ch);
        continue;
      }
      match ch {
        '\\' => { escaped = true; out.push(ch); }
        '"' => { in_string = false; out.push(ch); }
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        c if c.is_control() => {}
        c => out.push(c),
      }
    } else {
      match ch {
        '"' => { in_string = true; out.push(ch); }
        '}' | ']' => {
          let kept = out.trim_end().len();
          if out[..kept].ends_with(',') {
            out.remove(kept - 1);
          }
          out.push(ch);
        }
        '\n' | '\r' | '\t' => out.push(ch),
        c if c.is_control() => {}
        c => out.push(c),
      }
    }
  }

  out
}

/// Decode `raw` into `T` using the staged recovery.
pub fn parse_lenient<T: DeserializeOwned>(raw: &str) -> Result<T, GenerationError> {
  let text = strip_json_fence(raw);
  let original = match serde_json::from_str::<T>(&text) {
    Ok(v) => return Ok(v),
    Err(e) => e.to_string(),
  };

  let cleaned = clean_json_text(&text);
  match serde_json::from_str::<T>(&cleaned) {
    Ok(v) => {
      debug!(target: "codecheck_backend", stage = 1, "Recovered JSON after cleanup");
      return Ok(v);
    }
    Err(e) => debug!(target: "codecheck_backend", stage = 1, error = %e, "JSON cleanup did not help"),
  }

  if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
    if start < end {
      match serde_json::from_str::<T>(&cleaned[start..=end]) {
        Ok(v) => {
          debug!(target: "codecheck_backend", stage = 2, "Recovered JSON from brace slice");
          return Ok(v);
        }
        Err(e) => debug!(target: "codecheck_backend", stage = 2, error = %e, "Brace slice did not parse"),
      }
    }
  }

  Err(GenerationError::MalformedResponse(original))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde::Deserialize;
  use serde_json::Value;

  #[derive(Debug, Deserialize, PartialEq)]
  struct Verdict { #[serde(rename = "isCorrect")] is_correct: bool, message: String }

  #[test]
  fn plain_json_parses_directly() {
    let v: Verdict = parse_lenient(r#"{"isCorrect": true, "message": "ok"}"#).unwrap();
    assert!(v.is_correct);
  }

  #[test]
  fn fenced_json_with_trailing_commas_recovers_in_cleanup() {
    let raw = "```json\n{\n  \"isCorrect\": false,\n  \"message\": \"close\",\n}\n```";
    let v: Verdict = parse_lenient(raw).unwrap();
    assert_eq!(v, Verdict { is_correct: false, message: "close".into() });
  }

  #[test]
  fn commas_inside_strings_survive_cleanup() {
    let raw = "{\"isCorrect\": false, \"message\": \"try [a, ] or {b, }\",\n}";
    let v: Verdict = parse_lenient(raw).unwrap();
    assert_eq!(v.message, "try [a, ] or {b, }");
  }

  #[test]
  fn unclosed_fence_recovers_from_brace_slice() {
    let raw = "```json\n{\"isCorrect\": true, \"message\": \"fine\",}\nhope this helps";
    let v: Verdict = parse_lenient(raw).unwrap();
    assert!(v.is_correct);
    assert_eq!(v.message, "fine");
  }

  #[test]
  fn raw_newlines_inside_strings_are_escaped() {
    let raw = "{\"isCorrect\": true, \"message\": \"line one\nline two\"}";
    let v: Verdict = parse_lenient(raw).unwrap();
    assert_eq!(v.message, "line one\nline two");
  }

  #[test]
  fn double_escaped_object_is_unescaped() {
    let raw = r#"{\"isCorrect\": true, \"message\": \"ok\"}"#;
    let v: Verdict = parse_lenient(raw).unwrap();
    assert!(v.is_correct);
  }

  #[test]
  fn text_without_braces_is_terminal() {
    let err = parse_lenient::<Value>("I cannot answer that.").unwrap_err();
    match err {
      GenerationError::MalformedResponse(msg) => assert!(msg.contains("expected value")),
      other => panic!("unexpected error: {other:?}"),
    }
  }
}
