//! Small utility helpers used across modules.

use std::sync::OnceLock;

use regex::Regex;

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge source or model payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) { cut -= 1; }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

fn code_block_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"```(?:typescript|javascript|ts|js|python|py)?[ \t]*\r?\n([\s\S]*?)\r?\n[ \t]*```")
      .expect("static regex")
  })
}

/// If the text contains a fenced code block, return its body; otherwise the trimmed text.
pub fn unwrap_code_block(text: &str) -> String {
  let text = text.trim();
  if text.contains("```") {
    if let Some(body) = code_block_re().captures(text).and_then(|c| c.get(1)) {
      return body.as_str().trim().to_string();
    }
  }
  text.to_string()
}
