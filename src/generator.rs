//! LLM-backed content: coding challenges, quizzes and code review feedback.
//!
//! Every call is JSON mode wrapped in `RetryPolicy`. A reply that decodes but
//! misses required fields counts as a failed attempt and is retried too.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument};

use crate::config::Prompts;
use crate::domain::{
  ChallengeSpec, CodeAnalysis, Difficulty, NaturalLanguage, ProgrammingLanguage, Question, Quiz, TestCase,
};
use crate::error::{GenerationError, RetryError};
use crate::llm::{ChatMessage, GenerationOverrides, ResponseGenerator};
use crate::retry::RetryPolicy;
use crate::util::fill_template;

pub type GenResult<T> = Result<T, RetryError<GenerationError>>;

/// What the model returns for a challenge. Languages and difficulty come from
/// the request, not from the reply.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ChallengeDraft {
  title: String,
  description: String,
  initial_code: String,
  #[serde(alias = "referenceSolution")]
  solution: String,
  test_cases: Vec<TestCase>,
  hints: Vec<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct QuizDraft {
  title: String,
  language: String,
  questions: Vec<Question>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct AnalysisDraft {
  suggestions: Option<Vec<String>>,
  improvements: Vec<String>,
  errors: Vec<String>,
  best_practices: Vec<String>,
}

fn shape_error(what: &str) -> GenerationError {
  GenerationError::UnexpectedShape(format!("Generated {what} data is not in the expected format."))
}

#[derive(Clone)]
pub struct ContentGenerator {
  generator: ResponseGenerator,
  prompts: Arc<Prompts>,
  retry: RetryPolicy,
}

impl ContentGenerator {
  pub fn new(generator: ResponseGenerator, prompts: Arc<Prompts>, retry: RetryPolicy) -> Self {
    Self { generator, prompts, retry }
  }

  async fn json_once<T: serde::de::DeserializeOwned>(&self, messages: &[ChatMessage]) -> Result<T, GenerationError> {
    Ok(self.generator.generate::<T>(messages, &GenerationOverrides::json()).await?.data)
  }

  #[instrument(level = "info", skip(self), fields(%programming_language, difficulty = difficulty.as_str()))]
  pub async fn generate_challenge(
    &self,
    topic: &str,
    natural_language: NaturalLanguage,
    programming_language: ProgrammingLanguage,
    difficulty: Difficulty,
  ) -> GenResult<ChallengeSpec> {
    let code = natural_language.code();
    let vars = [
      ("language_name", natural_language.display_name()),
      ("language_code", code.as_str()),
      ("programming_language", programming_language.as_str()),
      ("difficulty", difficulty.as_str()),
      ("topic", topic),
    ];
    let messages = [
      ChatMessage::system(fill_template(&self.prompts.challenge_system, &vars)),
      ChatMessage::user(fill_template(&self.prompts.challenge_user_template, &vars)),
    ];

    let messages = &messages;
    let draft = self
      .retry
      .run("generate coding challenge", |_| async move {
        let d: ChallengeDraft = self.json_once(messages).await?;
        if d.title.trim().is_empty() || d.description.trim().is_empty() {
          return Err(shape_error("coding challenge"));
        }
        Ok(d)
      })
      .await?;

    info!(target: "codecheck_backend", title = %draft.title, tests = draft.test_cases.len(), "Challenge generated");
    Ok(ChallengeSpec {
      title: draft.title,
      description: draft.description,
      natural_language,
      programming_language,
      difficulty,
      initial_code: draft.initial_code,
      reference_solution: draft.solution,
      test_cases: draft.test_cases,
      hints: draft.hints,
    })
  }

  #[instrument(level = "info", skip(self))]
  pub async fn generate_quiz(&self, topic: &str, natural_language: NaturalLanguage) -> GenResult<Quiz> {
    let code = natural_language.code();
    let vars = [
      ("language_name", natural_language.display_name()),
      ("language_code", code.as_str()),
      ("topic", topic),
    ];
    let messages = [
      ChatMessage::system(fill_template(&self.prompts.quiz_system, &vars)),
      ChatMessage::user(fill_template(&self.prompts.quiz_user_template, &vars)),
    ];

    let messages = &messages;
    let draft = self
      .retry
      .run("generate quiz", |_| async move {
        let d: QuizDraft = self.json_once(messages).await?;
        if d.title.trim().is_empty() || d.questions.is_empty() {
          return Err(shape_error("quiz"));
        }
        Ok(d)
      })
      .await?;

    info!(target: "codecheck_backend", title = %draft.title, questions = draft.questions.len(), "Quiz generated");
    let language = if draft.language.is_empty() { code } else { draft.language };
    Ok(Quiz { title: draft.title, language, questions: draft.questions })
  }

  /// `execution_result` is the formatted text of the user's last run.
  #[instrument(level = "info", skip(self, user_code, execution_result, challenge), fields(title = %challenge.title))]
  pub async fn generate_code_analysis(
    &self,
    user_code: &str,
    execution_result: &str,
    challenge: &ChallengeSpec,
    natural_language: NaturalLanguage,
  ) -> GenResult<CodeAnalysis> {
    let vars = [
      ("language_name", natural_language.display_name()),
      ("programming_language", challenge.programming_language.as_str()),
      ("title", challenge.title.as_str()),
      ("description", challenge.description.as_str()),
      ("user_code", user_code),
      ("execution_result", execution_result),
      ("solution", challenge.reference_solution.as_str()),
    ];
    let messages = [
      ChatMessage::system(fill_template(&self.prompts.analysis_system, &vars)),
      ChatMessage::user(fill_template(&self.prompts.analysis_user_template, &vars)),
    ];

    let messages = &messages;
    self
      .retry
      .run("generate code analysis", |_| async move {
        let d: AnalysisDraft = self.json_once(messages).await?;
        let suggestions = d.suggestions.ok_or_else(|| shape_error("code analysis"))?;
        Ok(CodeAnalysis {
          suggestions,
          improvements: d.improvements,
          errors: d.errors,
          best_practices: d.best_practices,
        })
      })
      .await
  }
}
