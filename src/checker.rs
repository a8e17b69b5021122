//! Solution checking: run the user's function and the reference solution over
//! the same test cases and compare what they print.
//!
//! The pipeline is linear and every exit is a `ComparisonVerdict`:
//!   extract (20) -> user run (40) -> reference run (60) -> exact compare (80)
//!   -> semantic compare (100)
//! Equal outputs short-circuit before any LLM call. Unequal outputs get exactly
//! one semantic judgement, returned as the model wrote it.

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::config::Prompts;
use crate::domain::{ChallengeSpec, ComparisonVerdict, NaturalLanguage, ProgrammingLanguage, VerdictDetails};
use crate::error::GenerationError;
use crate::executor::{execute_or_failed, CodeRunner};
use crate::extract;
use crate::harness::HarnessStrategy;
use crate::llm::{ChatMessage, GenerationOverrides, ResponseGenerator};
use crate::util::{fill_template, trunc_for_log};

/// Markers left in starter code by challenge generation.
pub const PLACEHOLDERS: [&str; 2] = ["// your code here", "# your code here"];

/// Receives progress percentages while a check runs.
pub type ProgressSink<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// Where a check stopped and who is to blame.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckFailure {
  /// The stored reference solution is unusable.
  Configuration,
  /// The sandbox is not configured to run the challenge's language.
  LanguageUnavailable(ProgrammingLanguage),
  UserCompilation(String),
  UserExecution(String),
  /// Carries the user's outputs, which did run.
  ReferenceExecution(Vec<String>),
  Semantic(String),
}

impl CheckFailure {
  pub fn into_verdict(self, title: &str) -> ComparisonVerdict {
    let details = |expected: &str, actual: String| VerdictDetails {
      expected_output: expected.to_string(),
      actual_output: actual,
      test_case: title.to_string(),
    };
    match self {
      CheckFailure::Configuration => ComparisonVerdict::new(
        false,
        "Internal error: Official solution is not properly configured. Please contact the administrator.",
        details("Valid official solution required", "Official solution contains placeholder".into()),
      ),
      CheckFailure::LanguageUnavailable(language) => ComparisonVerdict::new(
        false,
        format!("Internal error: {language} solutions cannot be executed on this server. Please contact the administrator."),
        details("Challenge language enabled on the execution server", format!("{language} is not enabled")),
      ),
      CheckFailure::UserCompilation(msg) => ComparisonVerdict::new(
        false,
        "Your code contains compilation errors. Make sure the function is correctly implemented and returns a value.",
        details("Code should compile and execute successfully", msg),
      ),
      CheckFailure::UserExecution(msg) => ComparisonVerdict::new(
        false,
        format!("Error executing your code: {msg}"),
        details("Code should compile and execute successfully", msg),
      ),
      CheckFailure::ReferenceExecution(user_results) => ComparisonVerdict::new(
        false,
        "Internal error: Failed to execute the reference solution. Please contact the administrator.",
        details("Reference solution should work correctly", user_results.join(", ")),
      ),
      CheckFailure::Semantic(msg) => ComparisonVerdict::new(
        false,
        format!("An unexpected error occurred while checking the solution: {msg}"),
        details("Failed to perform check", "System error".into()),
      ),
    }
  }
}

fn has_placeholder(code: &str) -> bool {
  PLACEHOLDERS.iter().any(|p| code.contains(p))
}

/// Printed lines, trimmed, blanks dropped, order kept.
pub fn output_lines(output: &str) -> Vec<String> {
  output.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect()
}

/// A program run that did not succeed.
struct RunFailure {
  compilation: bool,
  message: String,
}

pub struct SolutionChecker {
  generator: ResponseGenerator,
  runner: Arc<dyn CodeRunner>,
  harness: Arc<dyn HarnessStrategy>,
  prompts: Arc<Prompts>,
}

impl SolutionChecker {
  pub fn new(
    generator: ResponseGenerator,
    runner: Arc<dyn CodeRunner>,
    harness: Arc<dyn HarnessStrategy>,
    prompts: Arc<Prompts>,
  ) -> Self {
    Self { generator, runner, harness, prompts }
  }

  /// Grade `user_code` against the challenge's reference solution.
  #[instrument(level = "info", skip(self, user_code, challenge, progress), fields(title = %challenge.title, lang = %challenge.programming_language))]
  pub async fn check(
    &self,
    user_code: &str,
    challenge: &ChallengeSpec,
    natural_language: NaturalLanguage,
    progress: Option<ProgressSink<'_>>,
  ) -> ComparisonVerdict {
    let report = |p: u8| {
      if let Some(sink) = progress {
        sink(p);
      }
    };
    match self.run_check(user_code, challenge, natural_language, &report).await {
      Ok(verdict) => {
        report(100);
        info!(target: "checker", is_correct = verdict.is_correct, "Check finished");
        verdict
      }
      Err(failure) => {
        warn!(target: "checker", ?failure, "Check stopped early");
        failure.into_verdict(&challenge.title)
      }
    }
  }

  async fn run_check(
    &self,
    user_code: &str,
    challenge: &ChallengeSpec,
    natural_language: NaturalLanguage,
    report: &(dyn Fn(u8) + Send + Sync),
  ) -> Result<ComparisonVerdict, CheckFailure> {
    report(20);
    if !self.runner.supports(challenge.programming_language) {
      error!(target: "checker", lang = %challenge.programming_language, "Challenge language is not enabled on the sandbox");
      return Err(CheckFailure::LanguageUnavailable(challenge.programming_language));
    }
    let mut user_function = extract::extract_function(user_code);
    let reference_function = extract::extract_function(&challenge.reference_solution);

    if has_placeholder(&user_function) || user_function.trim() == challenge.description.trim() {
      debug!(target: "checker", "User extraction unusable; using the whole submission");
      user_function = user_code.trim().to_string();
    }
    if has_placeholder(&reference_function) {
      error!(target: "checker", "Reference solution still holds the starter placeholder");
      return Err(CheckFailure::Configuration);
    }

    report(40);
    let user_results = self.run_program(&user_function, challenge, natural_language).await.map_err(|f| {
      if f.compilation { CheckFailure::UserCompilation(f.message) } else { CheckFailure::UserExecution(f.message) }
    })?;
    debug!(target: "checker", lines = user_results.len(), "User program ran");

    report(60);
    let reference_results = match self.run_program(&reference_function, challenge, natural_language).await {
      Ok(r) => r,
      Err(f) => {
        error!(target: "checker", error = %trunc_for_log(&f.message, 300), "Reference program failed");
        return Err(CheckFailure::ReferenceExecution(user_results));
      }
    };

    report(80);
    if user_results == reference_results {
      return Ok(ComparisonVerdict::new(
        true,
        "Excellent! Your solution works correctly and produces the expected results.",
        VerdictDetails {
          expected_output: reference_results.join(", "),
          actual_output: user_results.join(", "),
          test_case: format!("All tests passed successfully for challenge: {}", challenge.title),
        },
      ));
    }

    info!(target: "checker", "Outputs differ; asking for a semantic comparison");
    self.semantic_verdict(challenge, &reference_results, &user_results, natural_language).await
  }

  /// Harness + sandbox for one side. Output lines on success.
  async fn run_program(
    &self,
    function_source: &str,
    challenge: &ChallengeSpec,
    natural_language: NaturalLanguage,
  ) -> Result<Vec<String>, RunFailure> {
    let language = challenge.programming_language;
    let program = self
      .harness
      .synthesize(function_source, &challenge.test_cases, language, natural_language)
      .await
      .map_err(|e| RunFailure { compilation: false, message: e.to_string() })?;

    let result = execute_or_failed(self.runner.as_ref(), &program, language).await;
    if !result.success {
      return Err(RunFailure {
        compilation: result.is_compilation_error(),
        message: result.error.unwrap_or_else(|| "Unknown execution error".into()),
      });
    }
    Ok(output_lines(&result.output))
  }

  async fn semantic_verdict(
    &self,
    challenge: &ChallengeSpec,
    expected: &[String],
    actual: &[String],
    natural_language: NaturalLanguage,
  ) -> Result<ComparisonVerdict, CheckFailure> {
    let language_name = natural_language.display_name();
    let system = fill_template(&self.prompts.comparison_system, &[("language_name", language_name)]);
    let expected = expected.join("\n");
    let actual = actual.join("\n");
    let user = fill_template(
      &self.prompts.comparison_user_template,
      &[
        ("title", &challenge.title),
        ("description", &challenge.description),
        ("expected_output", &expected),
        ("user_output", &actual),
        ("language_name", language_name),
      ],
    );
    let messages = [ChatMessage::system(system), ChatMessage::user(user)];

    match self.generator.generate::<ComparisonVerdict>(&messages, &GenerationOverrides::json()).await {
      Ok(g) => {
        debug!(target: "checker", raw = %trunc_for_log(&g.raw_text, 200), "Semantic verdict received");
        Ok(g.data)
      }
      Err(GenerationError::MalformedResponse(e)) => {
        debug!(target: "checker", error = %e, "Comparison reply did not decode");
        Err(CheckFailure::Semantic("Generated solution check data is not in the expected format.".into()))
      }
      Err(e) => Err(CheckFailure::Semantic(e.to_string())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Mutex;

  use crate::domain::{Difficulty, TestCase, TestValue};
  use crate::executor::testing::{failed_result, ok_result, ScriptedRunner};
  use crate::harness::TemplateHarness;
  use crate::llm::testing::{generator, ScriptedBackend};

  const DOUBLE: &str = "function double(arr){return arr.map(x=>x*2)}";

  fn challenge(reference: &str) -> ChallengeSpec {
    ChallengeSpec {
      title: "Double".into(),
      description: "Double every element of an array.".into(),
      natural_language: NaturalLanguage::En,
      programming_language: ProgrammingLanguage::TypeScript,
      difficulty: Difficulty::Easy,
      initial_code: "function double(arr) {\n  // your code here\n}".into(),
      reference_solution: reference.into(),
      test_cases: vec![TestCase {
        input: TestValue::Expr("[1,2,3]".into()),
        expected_output: TestValue::Expr("[2,4,6]".into()),
        description: None,
      }],
      hints: vec![],
    }
  }

  fn checker(backend: Arc<ScriptedBackend>, runner: Arc<ScriptedRunner>) -> SolutionChecker {
    SolutionChecker::new(generator(backend), runner, Arc::new(TemplateHarness), Arc::new(Prompts::default()))
  }

  #[tokio::test]
  async fn identical_solution_is_correct_without_semantic_call() {
    let backend = ScriptedBackend::new(vec![]);
    let runner = ScriptedRunner::new(vec![Ok(ok_result("[2,4,6]\n")), Ok(ok_result("[2,4,6]"))]);
    let c = checker(backend.clone(), runner.clone());

    let v = c.check(DOUBLE, &challenge(DOUBLE), NaturalLanguage::En, None).await;

    assert!(v.is_correct);
    assert!(v.message.starts_with("Excellent!"));
    assert_eq!(backend.call_count(), 0);
    assert_eq!(runner.call_count(), 2);
    let programs = runner.programs.lock().unwrap();
    assert!(programs[0].contains("console.log(JSON.stringify(double([1,2,3])));"));
    assert_eq!(v.details.unwrap().expected_output, "[2,4,6]");
  }

  #[tokio::test]
  async fn identity_solution_defers_to_semantic_judge_verbatim() {
    let backend = ScriptedBackend::new(vec![Ok(
      r#"{"isCorrect": false, "message": "Elements were not doubled.", "details": {"expectedOutput": "[2,4,6]", "actualOutput": "[1,2,3]", "testCase": "Test 1"}}"#.into(),
    )]);
    let runner = ScriptedRunner::new(vec![Ok(ok_result("[1,2,3]")), Ok(ok_result("[2,4,6]"))]);
    let c = checker(backend.clone(), runner.clone());

    let v = c.check("function double(arr){return arr}", &challenge(DOUBLE), NaturalLanguage::En, None).await;

    assert_eq!(backend.call_count(), 1);
    assert!(!v.is_correct);
    assert_eq!(v.message, "Elements were not doubled.");
    assert_eq!(v.details.unwrap().test_case, "Test 1");

    let seen = backend.seen.lock().unwrap();
    let prompt = &seen[0].0[1].content;
    assert!(prompt.contains("Expected Output (from official solution):\n[2,4,6]"));
    assert!(prompt.contains("User's Output:\n[1,2,3]"));
  }

  #[tokio::test]
  async fn semantic_judge_can_accept_formatting_differences() {
    let backend = ScriptedBackend::new(vec![Ok(r#"```json
{"isCorrect": true, "message": "Same values, different spacing.",}
```"#
      .into())]);
    let runner = ScriptedRunner::new(vec![Ok(ok_result("[2, 4, 6]")), Ok(ok_result("[2,4,6]"))]);
    let v = checker(backend, runner).check(DOUBLE, &challenge(DOUBLE), NaturalLanguage::En, None).await;
    assert!(v.is_correct);
    assert!(v.details.is_none());
  }

  #[tokio::test]
  async fn placeholder_in_reference_is_a_configuration_error_with_no_runs() {
    let backend = ScriptedBackend::new(vec![]);
    let runner = ScriptedRunner::new(vec![]);
    let c = checker(backend.clone(), runner.clone());
    let broken = challenge("function double(arr) {\n  // your code here\n}");

    let v = c.check(DOUBLE, &broken, NaturalLanguage::En, None).await;

    assert!(!v.is_correct);
    assert!(v.message.starts_with("Internal error: Official solution is not properly configured"));
    assert_eq!(runner.call_count(), 0);
    assert_eq!(backend.call_count(), 0);
  }

  #[tokio::test]
  async fn disabled_challenge_language_is_a_server_error_with_no_runs() {
    let backend = ScriptedBackend::new(vec![]);
    let runner = ScriptedRunner::without(vec![ProgrammingLanguage::JavaScript]);
    let c = checker(backend.clone(), runner.clone());
    let mut js = challenge(DOUBLE);
    js.programming_language = ProgrammingLanguage::JavaScript;

    let v = c.check(DOUBLE, &js, NaturalLanguage::En, None).await;

    assert!(!v.is_correct);
    assert!(v.message.starts_with("Internal error: javascript solutions cannot be executed"));
    assert!(!v.message.contains("your code"));
    assert_eq!(runner.call_count(), 0);
    assert_eq!(backend.call_count(), 0);
  }

  #[tokio::test]
  async fn user_compile_error_is_reported_as_compilation() {
    let runner = ScriptedRunner::new(vec![Ok(failed_result("Compilation Error:\nmain.ts(1,10): error TS1005"))]);
    let c = checker(ScriptedBackend::new(vec![]), runner.clone());
    let v = c.check("function double(arr {", &challenge(DOUBLE), NaturalLanguage::En, None).await;
    assert!(!v.is_correct);
    assert!(v.message.starts_with("Your code contains compilation errors."));
    assert!(v.details.unwrap().actual_output.contains("TS1005"));
    assert_eq!(runner.call_count(), 1);
  }

  #[tokio::test]
  async fn user_runtime_error_quotes_the_error() {
    let runner = ScriptedRunner::new(vec![Ok(failed_result("Runtime Error (Exit Code: 1):\nTypeError: arr.map is not a function"))]);
    let v = checker(ScriptedBackend::new(vec![]), runner)
      .check("function double(arr){return arr.map()}", &challenge(DOUBLE), NaturalLanguage::En, None)
      .await;
    assert!(v.message.starts_with("Error executing your code: Runtime Error (Exit Code: 1)"));
  }

  #[tokio::test]
  async fn reference_failure_is_never_blamed_on_the_user() {
    let runner = ScriptedRunner::new(vec![
      Ok(ok_result("[2,4,6]")),
      Ok(failed_result("Runtime Error (Exit Code: 1):\nReferenceError")),
    ]);
    let v = checker(ScriptedBackend::new(vec![]), runner)
      .check(DOUBLE, &challenge(DOUBLE), NaturalLanguage::En, None)
      .await;
    assert!(!v.is_correct);
    assert!(v.message.starts_with("Internal error: Failed to execute the reference solution"));
    assert_eq!(v.details.unwrap().actual_output, "[2,4,6]");
  }

  #[tokio::test]
  async fn semantic_failure_becomes_unexpected_error_verdict() {
    let backend = ScriptedBackend::new(vec![Ok("no json here at all".into())]);
    let runner = ScriptedRunner::new(vec![Ok(ok_result("1")), Ok(ok_result("2"))]);
    let v = checker(backend, runner).check(DOUBLE, &challenge(DOUBLE), NaturalLanguage::En, None).await;
    assert!(!v.is_correct);
    assert_eq!(
      v.message,
      "An unexpected error occurred while checking the solution: Generated solution check data is not in the expected format."
    );
  }

  #[tokio::test]
  async fn placeholder_user_code_is_submitted_whole() {
    let user = "function double(arr) {\n  // your code here\n}\nconsole.log(double([1]));";
    let runner = ScriptedRunner::new(vec![Ok(ok_result("")), Ok(ok_result("[2,4,6]"))]);
    let backend = ScriptedBackend::new(vec![Ok(r#"{"isCorrect": false, "message": "Not implemented."}"#.into())]);
    let c = checker(backend, runner.clone());
    let v = c.check(user, &challenge(DOUBLE), NaturalLanguage::En, None).await;
    assert!(!v.is_correct);
    assert!(runner.programs.lock().unwrap()[0].starts_with(user));
  }

  #[tokio::test]
  async fn progress_is_reported_in_order() {
    let seen = Mutex::new(Vec::new());
    let sink = |p: u8| seen.lock().unwrap().push(p);
    let runner = ScriptedRunner::new(vec![Ok(ok_result("[2,4,6]")), Ok(ok_result("[2,4,6]"))]);
    checker(ScriptedBackend::new(vec![]), runner)
      .check(DOUBLE, &challenge(DOUBLE), NaturalLanguage::En, Some(&sink as ProgressSink))
      .await;
    assert_eq!(*seen.lock().unwrap(), vec![20, 40, 60, 80, 100]);
  }

  #[test]
  fn output_lines_drop_blanks_and_trim() {
    assert_eq!(output_lines("  [1]\n\n[2] \r\n"), vec!["[1]", "[2]"]);
  }
}
