//! Test-harness synthesis: turn a bare function plus test cases into a program
//! that prints one JSON-serialized result per test case.
//!
//! Two strategies:
//!   - `LlmHarness` asks the model to write the calls, so closures (`f()(x)`)
//!     and higher-order functions get invoked the way their body implies.
//!   - `TemplateHarness` appends `name(<input>)` per case. It cannot call
//!     closures correctly; it exists so a broken LLM round trip still yields output.
//!
//! `FallbackHarness` composes them: primary first, template on any error.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::config::Prompts;
use crate::domain::{NaturalLanguage, ProgrammingLanguage, TestCase};
use crate::error::HarnessError;
use crate::extract;
use crate::llm::{ChatMessage, GenerationOverrides, ResponseGenerator};
use crate::util::{fill_template, unwrap_code_block};

#[async_trait]
pub trait HarnessStrategy: Send + Sync {
  fn name(&self) -> &'static str;

  async fn synthesize(
    &self,
    function_source: &str,
    test_cases: &[TestCase],
    language: ProgrammingLanguage,
    natural_language: NaturalLanguage,
  ) -> Result<String, HarnessError>;
}

/// How one result is printed, as shown to the model.
pub fn print_idiom(language: ProgrammingLanguage) -> &'static str {
  if language.is_js_family() {
    "console.log(JSON.stringify(result))"
  } else {
    "print(json.dumps(result)) (with `import json` at the top)"
  }
}

fn describe_test_cases(test_cases: &[TestCase]) -> String {
  test_cases
    .iter()
    .enumerate()
    .map(|(i, tc)| format!("Test {}: input=\"{}\", expected=\"{}\"", i + 1, tc.input, tc.expected_output))
    .collect::<Vec<_>>()
    .join("\n")
}

pub struct LlmHarness {
  generator: ResponseGenerator,
  prompts: Arc<Prompts>,
}

impl LlmHarness {
  pub fn new(generator: ResponseGenerator, prompts: Arc<Prompts>) -> Self {
    Self { generator, prompts }
  }

  fn messages(
    &self,
    function_source: &str,
    test_cases: &[TestCase],
    language: ProgrammingLanguage,
    natural_language: NaturalLanguage,
  ) -> Vec<ChatMessage> {
    let vars = [
      ("programming_language", language.as_str()),
      ("language_name", natural_language.display_name()),
      ("print_idiom", print_idiom(language)),
    ];
    let system = fill_template(&self.prompts.harness_system, &vars);
    let cases = describe_test_cases(test_cases);
    let user = fill_template(
      &self.prompts.harness_user_template,
      &[
        ("function_code", function_source),
        ("test_cases", &cases),
        ("programming_language", language.as_str()),
      ],
    );
    vec![ChatMessage::system(system), ChatMessage::user(user)]
  }
}

#[async_trait]
impl HarnessStrategy for LlmHarness {
  fn name(&self) -> &'static str { "llm" }

  #[instrument(level = "info", skip(self, function_source, test_cases), fields(%language, cases = test_cases.len()))]
  async fn synthesize(
    &self,
    function_source: &str,
    test_cases: &[TestCase],
    language: ProgrammingLanguage,
    natural_language: NaturalLanguage,
  ) -> Result<String, HarnessError> {
    let messages = self.messages(function_source, test_cases, language, natural_language);
    let reply = self.generator.generate_text(&messages, GenerationOverrides::text().with_temperature(0.1)).await?;
    let code = unwrap_code_block(&reply);
    if code.is_empty() {
      return Err(HarnessError::EmptyHarness);
    }
    debug!(target: "checker", harness_len = code.len(), "LLM harness ready");
    Ok(code)
  }
}

/// Deterministic harness: the function, then one print per test case.
pub struct TemplateHarness;

impl TemplateHarness {
  pub fn render(function_source: &str, test_cases: &[TestCase], language: ProgrammingLanguage) -> String {
    let signature = extract::analyze(function_source);
    let mut code = String::new();
    if !language.is_js_family() {
      code.push_str("import json\n\n");
    }
    code.push_str(function_source);
    code.push_str("\n\n");

    for tc in test_cases {
      let call = if signature.parameter_count() == 0 {
        format!("{}()", signature.name)
      } else {
        format!("{}({})", signature.name, tc.input.as_source())
      };
      if language.is_js_family() {
        code.push_str(&format!("console.log(JSON.stringify({}));\n", call));
      } else {
        code.push_str(&format!("print(json.dumps({}))\n", call));
      }
    }
    code
  }
}

#[async_trait]
impl HarnessStrategy for TemplateHarness {
  fn name(&self) -> &'static str { "template" }

  async fn synthesize(
    &self,
    function_source: &str,
    test_cases: &[TestCase],
    language: ProgrammingLanguage,
    _natural_language: NaturalLanguage,
  ) -> Result<String, HarnessError> {
    Ok(Self::render(function_source, test_cases, language))
  }
}

/// Primary strategy with a safety net.
pub struct FallbackHarness {
  primary: Box<dyn HarnessStrategy>,
  fallback: Box<dyn HarnessStrategy>,
}

impl FallbackHarness {
  pub fn new(primary: Box<dyn HarnessStrategy>, fallback: Box<dyn HarnessStrategy>) -> Self {
    Self { primary, fallback }
  }

  /// LLM first, template second.
  pub fn llm_with_template(generator: ResponseGenerator, prompts: Arc<Prompts>) -> Self {
    Self::new(Box::new(LlmHarness::new(generator, prompts)), Box::new(TemplateHarness))
  }
}

#[async_trait]
impl HarnessStrategy for FallbackHarness {
  fn name(&self) -> &'static str { "fallback" }

  async fn synthesize(
    &self,
    function_source: &str,
    test_cases: &[TestCase],
    language: ProgrammingLanguage,
    natural_language: NaturalLanguage,
  ) -> Result<String, HarnessError> {
    match self.primary.synthesize(function_source, test_cases, language, natural_language).await {
      Ok(code) => Ok(code),
      Err(e) => {
        warn!(target: "checker", primary = self.primary.name(), fallback = self.fallback.name(), error = %e, "Harness synthesis failed; using fallback");
        self.fallback.synthesize(function_source, test_cases, language, natural_language).await
      }
    }
  }
}
