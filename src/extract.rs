//! Heuristic isolation of one callable definition from free-form source.
//!
//! Both user code and model-written solutions usually carry usage code around
//! the function (`console.log(f([1,2]))`, stray tests). The harness needs the
//! definition alone, so it can append its own calls without duplicates.
//!
//! This is text scanning, not parsing: find the first line that looks like a
//! function start, then follow brace balance (or indentation for Python `def`)
//! to the end of the definition. Python keeps its module-level imports in
//! front of the `def`. Nothing here fails; when no function-like
//! line exists the input is returned as is.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::ExtractedFunction;

/// Name used when nothing in the source names the function.
pub const FALLBACK_NAME: &str = "func";

macro_rules! static_re {
  ($name:ident, $pat:expr) => {
    fn $name() -> &'static Regex {
      static RE: OnceLock<Regex> = OnceLock::new();
      RE.get_or_init(|| Regex::new($pat).expect("static regex"))
    }
  };
}

static_re!(const_assign_re, r"^(?:export\s+)?const\s+\w+\s*=");
static_re!(def_re, r"^(?:async\s+)?def\s+\w+\s*\(");
static_re!(python_import_re, r"^(?:import\s+\w|from\s+[\w.]+\s+import\s)");
static_re!(function_name_re, r"function\s*\*?\s+(\w+)\s*(?:<[^>]*>)?\s*\(");
static_re!(const_name_re, r"const\s+(\w+)\s*=");
static_re!(def_name_re, r"def\s+(\w+)\s*\(");
static_re!(function_params_re, r"function\s*\*?\s+\w+\s*(?:<[^>]*>)?\s*\(([^)]*)\)");
static_re!(arrow_params_re, r"const\s+\w+\s*(?::[^=]+)?=\s*(?:async\s*)?(?:<[^>]*>)?\(([^)]*)\)");
static_re!(arrow_single_param_re, r"const\s+\w+\s*=\s*(?:async\s+)?(\w+)\s*=>");
static_re!(def_params_re, r"def\s+\w+\s*\(([^)]*)\)");

fn is_comment(trimmed: &str) -> bool {
  trimmed.starts_with("//") || trimmed.starts_with('#') || trimmed.starts_with("/*") || trimmed.starts_with('*')
}

fn is_function_start(trimmed: &str) -> bool {
  if trimmed.is_empty() || is_comment(trimmed) {
    return false;
  }
  trimmed.starts_with("function ")
    || trimmed.contains("function ")
    || trimmed.contains("=>")
    || const_assign_re().is_match(trimmed)
    || def_re().is_match(trimmed)
}

/// A line that cannot end an expression-bodied definition.
fn continues(trimmed: &str) -> bool {
  ["=>", "=", "(", ","].iter().any(|t| trimmed.ends_with(t))
}

fn indent_of(line: &str) -> usize {
  line.len() - line.trim_start().len()
}

/// Last line of a Python block opened by the `def` at `start`.
fn python_block_end(lines: &[&str], start: usize) -> usize {
  let base = indent_of(lines[start]);
  let mut end = start;
  for (i, line) in lines.iter().enumerate().skip(start + 1) {
    if line.trim().is_empty() {
      continue;
    }
    if indent_of(line) <= base {
      break;
    }
    end = i;
  }
  end
}

/// Top-level `import` / `from .. import` lines above `start`.
fn python_imports<'a>(lines: &[&'a str], start: usize) -> Vec<&'a str> {
  lines[..start]
    .iter()
    .copied()
    .filter(|l| indent_of(l) == 0 && python_import_re().is_match(l))
    .map(str::trim_end)
    .collect()
}

/// Last line of a brace-delimited (or expression-bodied) definition at `start`.
fn brace_block_end(lines: &[&str], start: usize) -> usize {
  let mut balance: i64 = 0;
  let mut opened = false;
  // A `function` declaration always has a body, even when `{` sits on a later line.
  let declaration = lines[start].contains("function ");
  for (i, line) in lines.iter().enumerate().skip(start) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }
    let opens = line.matches('{').count() as i64;
    let closes = line.matches('}').count() as i64;
    if opens > 0 {
      opened = true;
    }
    balance += opens - closes;

    if opened && balance <= 0 {
      return i;
    }
    if !opened && !declaration && !is_comment(trimmed) && !continues(trimmed) {
      return i;
    }
  }
  // Never closed: keep everything after the start.
  lines.len().saturating_sub(1)
}

/// Isolate the first function definition in `source`.
pub fn extract_function(source: &str) -> String {
  let lines: Vec<&str> = source.split('\n').collect();
  let Some(start) = lines.iter().position(|l| is_function_start(l.trim())) else {
    return source.to_string();
  };

  if def_re().is_match(lines[start].trim()) {
    let body = lines[start..=python_block_end(&lines, start)].join("\n");
    let imports = python_imports(&lines, start);
    if imports.is_empty() {
      return body;
    }
    return format!("{}\n\n{}", imports.join("\n"), body);
  }
  lines[start..=brace_block_end(&lines, start)].join("\n")
}

/// Name of the first function in `source`, or `FALLBACK_NAME`.
pub fn extract_name(source: &str) -> String {
  [function_name_re(), const_name_re(), def_name_re()]
    .iter()
    .find_map(|re| re.captures(source).and_then(|c| c.get(1)))
    .map(|m| m.as_str().to_string())
    .unwrap_or_else(|| FALLBACK_NAME.to_string())
}

/// Split on top-level commas only (`Map<string, number>` stays whole).
fn split_top_level(params: &str) -> Vec<&str> {
  let mut out = Vec::new();
  let mut depth = 0i32;
  let mut last = 0;
  for (i, ch) in params.char_indices() {
    match ch {
      '<' | '(' | '[' | '{' => depth += 1,
      '>' | ')' | ']' | '}' => depth -= 1,
      ',' if depth == 0 => {
        out.push(&params[last..i]);
        last = i + 1;
      }
      _ => {}
    }
  }
  out.push(&params[last..]);
  out
}

fn parameter_names(raw: &str) -> Vec<String> {
  split_top_level(raw)
    .into_iter()
    .filter_map(|p| {
      let name = p.split([':', '=']).next().unwrap_or("").trim();
      let name = name.trim_start_matches("...").trim_end_matches('?').trim();
      (!name.is_empty()).then(|| name.to_string())
    })
    .collect()
}

/// Parameter list of the first function in `source`; empty when none is found.
pub fn extract_parameters(source: &str) -> Vec<String> {
  for re in [function_params_re(), arrow_params_re(), def_params_re()] {
    if let Some(m) = re.captures(source).and_then(|c| c.get(1)) {
      return parameter_names(m.as_str());
    }
  }
  arrow_single_param_re()
    .captures(source)
    .and_then(|c| c.get(1))
    .map(|m| vec![m.as_str().to_string()])
    .unwrap_or_default()
}

/// Definition slice plus its name and parameters.
pub fn analyze(source: &str) -> ExtractedFunction {
  let source_slice = extract_function(source);
  let name = extract_name(&source_slice);
  let parameters = extract_parameters(&source_slice);
  ExtractedFunction { source_slice, name, parameters }
}
