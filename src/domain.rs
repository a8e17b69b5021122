//! Domain models: challenges and their test cases, quizzes, execution results and verdicts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ExecError;

/// Programming languages a challenge can be written in.
/// Anything else is rejected at the boundary with `UnsupportedLanguage`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProgrammingLanguage {
  JavaScript,
  TypeScript,
  Python,
}

impl ProgrammingLanguage {
  pub fn as_str(&self) -> &'static str {
    match self {
      ProgrammingLanguage::JavaScript => "javascript",
      ProgrammingLanguage::TypeScript => "typescript",
      ProgrammingLanguage::Python => "python",
    }
  }

  /// JS and TS share call syntax and the `console.log(JSON.stringify(..))` idiom.
  pub fn is_js_family(&self) -> bool {
    matches!(self, ProgrammingLanguage::JavaScript | ProgrammingLanguage::TypeScript)
  }
}

impl fmt::Display for ProgrammingLanguage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ProgrammingLanguage {
  type Err = ExecError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "javascript" | "js" => Ok(ProgrammingLanguage::JavaScript),
      "typescript" | "ts" => Ok(ProgrammingLanguage::TypeScript),
      "python" | "py" => Ok(ProgrammingLanguage::Python),
      _ => Err(ExecError::UnsupportedLanguage(s.to_string())),
    }
  }
}

impl TryFrom<String> for ProgrammingLanguage {
  type Error = ExecError;
  fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<ProgrammingLanguage> for String {
  fn from(l: ProgrammingLanguage) -> Self { l.as_str().to_string() }
}

/// Language of the learner-facing text (titles, messages, hints).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NaturalLanguage {
  #[default]
  En,
  Ru,
  He,
  Es,
  Fr,
  De,
  It,
  Pt,
  Ja,
  Ko,
  Zh,
  Hi,
  Ar,
  Tr,
  Nl,
  Pl,
  Sv,
  Da,
  No,
  Fi,
}

impl NaturalLanguage {
  pub fn display_name(&self) -> &'static str {
    match self {
      NaturalLanguage::En => "English",
      NaturalLanguage::Ru => "Russian",
      NaturalLanguage::He => "Hebrew",
      NaturalLanguage::Es => "Spanish",
      NaturalLanguage::Fr => "French",
      NaturalLanguage::De => "German",
      NaturalLanguage::It => "Italian",
      NaturalLanguage::Pt => "Portuguese",
      NaturalLanguage::Ja => "Japanese",
      NaturalLanguage::Ko => "Korean",
      NaturalLanguage::Zh => "Chinese",
      NaturalLanguage::Hi => "Hindi",
      NaturalLanguage::Ar => "Arabic",
      NaturalLanguage::Tr => "Turkish",
      NaturalLanguage::Nl => "Dutch",
      NaturalLanguage::Pl => "Polish",
      NaturalLanguage::Sv => "Swedish",
      NaturalLanguage::Da => "Danish",
      NaturalLanguage::No => "Norwegian",
      NaturalLanguage::Fi => "Finnish",
    }
  }

  /// Two-letter code, as serialized.
  pub fn code(&self) -> String {
    serde_json::to_value(self)
      .ok()
      .and_then(|v| v.as_str().map(str::to_string))
      .unwrap_or_else(|| "en".into())
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
  #[default]
  Easy,
  Medium,
  Hard,
}

impl Difficulty {
  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }
}

/// Where a stored challenge came from.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeSource {
  Generated, // produced by the LLM during this process lifetime
  LocalBank, // from the TOML challenge bank
  Seed,      // built into the binary
}

/// Test-case input or expected output.
///
/// Models emit either one source expression (`"[1,2,3]"`) or an array of them.
/// Both are kept; `as_source` gives the text spliced into a call.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TestValue {
  Expr(String),
  List(Vec<String>),
}

impl TestValue {
  /// Source text for a call site. List elements are joined with `,`, the same
  /// text a JS array stringifies to, so `["1","2"]` becomes `f(1,2)`.
  pub fn as_source(&self) -> String {
    match self {
      TestValue::Expr(s) => s.clone(),
      TestValue::List(items) => items.join(","),
    }
  }
}

impl Default for TestValue {
  fn default() -> Self { TestValue::Expr(String::new()) }
}

impl fmt::Display for TestValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.as_source())
  }
}

fn json_to_source(v: Value) -> String {
  match v {
    Value::String(s) => s,
    other => other.to_string(),
  }
}

impl From<Value> for TestValue {
  fn from(v: Value) -> Self {
    match v {
      Value::Array(items) => TestValue::List(items.into_iter().map(json_to_source).collect()),
      other => TestValue::Expr(json_to_source(other)),
    }
  }
}

impl<'de> Deserialize<'de> for TestValue {
  fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
    Value::deserialize(d).map(TestValue::from)
  }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
  #[serde(default)] pub input: TestValue,
  #[serde(default)] pub expected_output: TestValue,
  #[serde(default, skip_serializing_if = "Option::is_none")] pub description: Option<String>,
}

/// A generated coding exercise. Immutable once produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeSpec {
  pub title: String,
  pub description: String,
  #[serde(rename = "language", default)]
  pub natural_language: NaturalLanguage,
  pub programming_language: ProgrammingLanguage,
  #[serde(default)] pub difficulty: Difficulty,
  #[serde(default)] pub initial_code: String,
  #[serde(rename = "solution", alias = "referenceSolution")]
  pub reference_solution: String,
  #[serde(default)] pub test_cases: Vec<TestCase>,
  #[serde(default)] pub hints: Vec<String>,
}

/// A challenge as held in the in-memory store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Challenge {
  pub id: String,
  pub source: ChallengeSource,
  #[serde(flatten)]
  pub spec: ChallengeSpec,
}

/// Normalized outcome of one sandbox run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
  pub success: bool,
  pub output: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  pub execution_time_ms: u64,
  pub language: String,
  pub version: String,
}

impl ExecutionResult {
  /// The sandbox reported a compile-stage failure (as opposed to a runtime one).
  pub fn is_compilation_error(&self) -> bool {
    self.error.as_deref().map(|e| e.starts_with("Compilation Error")).unwrap_or(false)
  }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictDetails {
  #[serde(default, deserialize_with = "lenient_string")] pub expected_output: String,
  #[serde(default, deserialize_with = "lenient_string")] pub actual_output: String,
  #[serde(default, deserialize_with = "lenient_string")] pub test_case: String,
}

/// Terminal artifact of a solution check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonVerdict {
  pub is_correct: bool,
  #[serde(default, deserialize_with = "lenient_string")]
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub details: Option<VerdictDetails>,
}

impl ComparisonVerdict {
  pub fn new(is_correct: bool, message: impl Into<String>, details: VerdictDetails) -> Self {
    Self { is_correct, message: message.into(), details: Some(details) }
  }
}

/// Accept a string, or render any other JSON value (arrays of outputs are common).
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
  let v = Value::deserialize(d)?;
  Ok(match v {
    Value::Null => String::new(),
    Value::String(s) => s,
    Value::Array(items) => items.into_iter().map(json_to_source).collect::<Vec<_>>().join(", "),
    other => other.to_string(),
  })
}

/// A callable unit isolated from free-form source.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractedFunction {
  pub source_slice: String,
  pub name: String,
  pub parameters: Vec<String>,
}

impl ExtractedFunction {
  pub fn parameter_count(&self) -> usize { self.parameters.len() }
}

// --- Quizzes ---

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnswerOption {
  pub text: String,
  #[serde(default)] pub rationale: String,
  #[serde(default)] pub is_correct: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
  pub question: String,
  #[serde(default)] pub answer_options: Vec<AnswerOption>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Quiz {
  pub title: String,
  #[serde(default)] pub language: String,
  #[serde(default)] pub questions: Vec<Question>,
}

/// Review feedback on a user's attempt.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeAnalysis {
  #[serde(default)] pub suggestions: Vec<String>,
  #[serde(default)] pub improvements: Vec<String>,
  #[serde(default)] pub errors: Vec<String>,
  #[serde(default)] pub best_practices: Vec<String>,
}
