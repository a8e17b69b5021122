//! Service configuration: TOML file (optional) plus environment overrides.
//!
//! Schema (every section optional):
//!
//! ```toml
//! [llm]        base_url, api_key, timeout_secs
//! [generation] model, temperature, top_p, ... (defaults for every LLM call)
//! [executor]   base_url, compile_timeout_ms, run_timeout_ms, enabled_languages
//! [retry]      max_retries, base_delay_ms
//! [prompts]    any template from `Prompts`
//! [[challenges]] optional local challenge bank (ChallengeSpec fields + id)
//! ```

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::domain::{ChallengeSpec, ProgrammingLanguage};
use crate::llm::GenerationOptions;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)] pub llm: LlmSettings,
  #[serde(default)] pub generation: GenerationOptions,
  #[serde(default)] pub executor: ExecutorSettings,
  #[serde(default)] pub retry: RetrySettings,
  #[serde(default)] pub prompts: Prompts,
  #[serde(default)] pub challenges: Vec<ChallengeCfg>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
  pub base_url: String,
  pub api_key: Option<String>,
  pub timeout_secs: u64,
}

impl Default for LlmSettings {
  fn default() -> Self {
    Self { base_url: "http://localhost:11434".into(), api_key: None, timeout_secs: 120 }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
  pub base_url: String,
  pub compile_timeout_ms: u64,
  pub run_timeout_ms: u64,
  pub enabled_languages: Vec<ProgrammingLanguage>,
}

impl Default for ExecutorSettings {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:2000".into(),
      compile_timeout_ms: 10_000,
      run_timeout_ms: 5_000,
      enabled_languages: vec![ProgrammingLanguage::TypeScript, ProgrammingLanguage::Python],
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
  pub max_retries: u32,
  pub base_delay_ms: u64,
}

impl Default for RetrySettings {
  fn default() -> Self { Self { max_retries: 2, base_delay_ms: 1000 } }
}

/// Challenge entry accepted in the TOML bank.
#[derive(Clone, Debug, Deserialize)]
pub struct ChallengeCfg {
  #[serde(default)] pub id: Option<String>,
  #[serde(flatten)] pub spec: ChallengeSpec,
}

/// Prompt templates. `{name}` placeholders are filled with `fill_template`.
/// Any of them can be overridden under `[prompts]`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  // Coding challenge generation
  pub challenge_system: String,
  pub challenge_user_template: String,
  // Quiz generation
  pub quiz_system: String,
  pub quiz_user_template: String,
  // Test harness synthesis
  pub harness_system: String,
  pub harness_user_template: String,
  // Semantic output comparison
  pub comparison_system: String,
  pub comparison_user_template: String,
  // Code review feedback
  pub analysis_system: String,
  pub analysis_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      challenge_system: r#"Generate coding challenge JSON. Language: {language_name}. Programming language: {programming_language}. Format:
{
  "title": "Challenge Title",
  "description": "Task description",
  "language": "{language_code}",
  "programmingLanguage": "{programming_language}",
  "difficulty": "{difficulty}",
  "initialCode": "function template with test usage code",
  "solution": "complete solution code with working implementation",
  "testCases": [
    {"input": "test input", "expectedOutput": "expected result", "description": "test description"}
  ],
  "hints": ["helpful hint 1", "helpful hint 2"]
}

JSON rules: double quotes only, no template literals, \n for newlines inside strings.
initialCode rules: an empty function whose body is only the comment "your code here" (// or #), followed by usage code that prints results with a comment showing the expected output. Functions must return a value, never void. Use correct type annotations when the language has them.
Test case "input" is the exact argument text placed between the call parentheses."#.into(),
      challenge_user_template: "Topic: \"{topic}\". Create a {programming_language} coding challenge of {difficulty} difficulty. Write all text in {language_name}. The function MUST return something useful. Include 3-5 test cases. JSON only.".into(),

      quiz_system: r#"Generate quiz JSON. Language: {language_name}. Format:
{
  "title": "Title",
  "language": "{language_code}",
  "questions": [
    {
      "question": "Question?",
      "answer_options": [
        {"text": "Option", "rationale": "Why", "is_correct": true}
      ]
    }
  ]
}"#.into(),
      quiz_user_template: "Topic: \"{topic}\". 5 questions, 4 options each. {language_name} language. JSON only.".into(),

      harness_system: r#"Generate test code for a {programming_language} function. Language: {language_name}. Return ONLY the complete executable code.

TASK:
1. Include the original function code unchanged at the top
2. Add one call per test case that invokes the function with that test case's input
3. Print every result on its own line with {print_idiom}
4. Match the calling pattern to the function: closures as name()(args), regular functions as name(args), higher-order functions with the arguments they expect

NO explanations, ONLY executable code."#.into(),
      harness_user_template: r#"Function Code:
{function_code}

Test Cases:
{test_cases}

Programming Language: {programming_language}

Generate ONLY the complete executable {programming_language} code."#.into(),

      comparison_system: r#"Compare execution results and determine if the user's solution is correct. Language: {language_name}. Respond with JSON:
{
  "isCorrect": true/false,
  "message": "Success message or explanation of differences",
  "details": {
    "expectedOutput": "expected results",
    "actualOutput": "user's results",
    "testCase": "context information"
  }
}

COMPARISON RULES:
1. Identical or functionally equivalent outputs are CORRECT
2. Ignore formatting differences: [1,2,3] and [1, 2, 3] are equivalent
3. Different valid representations of the same data are CORRECT when the task allows them
4. Focus on the actual values

If correct, write an encouraging message in {language_name}. If not, explain what differs and what was expected."#.into(),
      comparison_user_template: r#"Challenge: "{title}"
Description: "{description}"

Expected Output (from official solution):
{expected_output}

User's Output:
{user_output}

Are these outputs equivalent for this task? Respond in JSON. Message in {language_name}."#.into(),

      analysis_system: r#"Analyze the user's code and provide constructive feedback. Language: {language_name}. Programming language: {programming_language}. Format:
{
  "suggestions": ["..."],
  "improvements": ["..."],
  "errors": ["..."],
  "bestPractices": ["..."]
}"#.into(),
      analysis_user_template: r#"Challenge: "{title}"
Description: "{description}"

User's Code:
{user_code}

Execution Result:
{execution_result}

Expected Solution:
{solution}

Give feedback on correctness, performance and {programming_language} best practices in {language_name}."#.into(),
    }
  }
}

/// Load `AppConfig` from CODECHECK_CONFIG_PATH (if set), then apply env overrides.
/// A missing or broken file falls back to defaults.
pub fn load_config_from_env() -> AppConfig {
  let mut cfg = match std::env::var("CODECHECK_CONFIG_PATH") {
    Ok(path) => match std::fs::read_to_string(&path) {
      Ok(s) => match toml::from_str::<AppConfig>(&s) {
        Ok(cfg) => {
          info!(target: "codecheck_backend", %path, "Loaded config (TOML)");
          cfg
        }
        Err(e) => {
          error!(target: "codecheck_backend", %path, error = %e, "Failed to parse TOML config; using defaults");
          AppConfig::default()
        }
      },
      Err(e) => {
        error!(target: "codecheck_backend", %path, error = %e, "Failed to read TOML config file; using defaults");
        AppConfig::default()
      }
    },
    Err(_) => AppConfig::default(),
  };
  apply_env_overrides(&mut cfg, |k| std::env::var(k).ok());
  cfg
}

/// Environment wins over the file. `lookup` is injectable for tests.
pub fn apply_env_overrides(cfg: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
  if let Some(v) = lookup("LLM_BASE_URL") { cfg.llm.base_url = v; }
  if let Some(v) = lookup("LLM_API_KEY") { cfg.llm.api_key = Some(v); }
  if let Some(v) = lookup("LLM_MODEL") { cfg.generation.model = v; }
  if let Some(v) = lookup("PISTON_URL") { cfg.executor.base_url = v; }
  if let Some(v) = lookup("ENABLED_LANGUAGES") {
    let mut langs = Vec::new();
    for item in v.split(',').map(str::trim).filter(|s| !s.is_empty()) {
      match item.parse::<ProgrammingLanguage>() {
        Ok(l) => langs.push(l),
        Err(e) => warn!(target: "codecheck_backend", %item, error = %e, "Ignoring ENABLED_LANGUAGES entry"),
      }
    }
    if !langs.is_empty() { cfg.executor.enabled_languages = langs; }
  }
  cfg.llm.base_url = cfg.llm.base_url.trim_end_matches('/').to_string();
  cfg.executor.base_url = cfg.executor.base_url.trim_end_matches('/').to_string();
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  #[test]
  fn toml_sections_override_defaults() {
    let cfg: AppConfig = toml::from_str(
      r#"
      [generation]
      model = "llama3:8b"
      temperature = 0.7

      [executor]
      run_timeout_ms = 3000
      enabled_languages = ["javascript"]

      [prompts]
      quiz_user_template = "Quiz about {topic}"
      "#,
    ).unwrap();
    assert_eq!(cfg.generation.model, "llama3:8b");
    assert!((cfg.generation.temperature - 0.7).abs() < f32::EPSILON);
    assert_eq!(cfg.generation.top_k, 30);
    assert_eq!(cfg.executor.run_timeout_ms, 3000);
    assert_eq!(cfg.executor.compile_timeout_ms, 10_000);
    assert_eq!(cfg.executor.enabled_languages, vec![ProgrammingLanguage::JavaScript]);
    assert_eq!(cfg.prompts.quiz_user_template, "Quiz about {topic}");
    assert!(cfg.prompts.harness_system.contains("{print_idiom}"));
    assert_eq!(cfg.retry.max_retries, 2);
  }

  #[test]
  fn challenge_bank_entries_parse() {
    let cfg: AppConfig = toml::from_str(
      r#"
      [[challenges]]
      id = "sum"
      title = "Sum"
      description = "Add two numbers"
      programmingLanguage = "python"
      solution = "def add(a, b):\n    return a + b"
      testCases = [{ input = "1, 2", expectedOutput = "3" }]
      "#,
    ).unwrap();
    assert_eq!(cfg.challenges.len(), 1);
    assert_eq!(cfg.challenges[0].id.as_deref(), Some("sum"));
    assert_eq!(cfg.challenges[0].spec.programming_language, ProgrammingLanguage::Python);
  }

  #[test]
  fn env_overrides_apply_and_skip_unknown_languages() {
    let env: HashMap<&str, &str> = HashMap::from([
      ("LLM_BASE_URL", "http://llm:8080/"),
      ("PISTON_URL", "http://piston:2000/"),
      ("ENABLED_LANGUAGES", "python, cobol ,javascript"),
    ]);
    let mut cfg = AppConfig::default();
    apply_env_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string()));
    assert_eq!(cfg.llm.base_url, "http://llm:8080");
    assert_eq!(cfg.executor.base_url, "http://piston:2000");
    assert_eq!(
      cfg.executor.enabled_languages,
      vec![ProgrammingLanguage::Python, ProgrammingLanguage::JavaScript]
    );
  }
}
