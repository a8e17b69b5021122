//! Error taxonomy for the LLM, sandbox and retry layers.
//!
//! The solution checker never surfaces these to callers; it folds them into
//! verdicts. HTTP handlers map the rest onto status codes.

use thiserror::Error;

/// Failure of one chat-completion round trip (or of decoding its content).
#[derive(Error, Debug, Clone)]
pub enum GenerationError {
  #[error("LLM transport error: {0}")]
  Transport(String),

  #[error("LLM API error: {status} {status_text}")]
  Http { status: u16, status_text: String },

  #[error("Empty response from LLM model")]
  EmptyCompletion,

  #[error("LLM returned malformed JSON: {0}")]
  MalformedResponse(String),

  #[error("{0}")]
  UnexpectedShape(String),
}

/// Failure to obtain an execution result from the sandbox at all.
/// Compile and runtime failures are not errors; they live in `ExecutionResult`.
#[derive(Error, Debug, Clone)]
pub enum ExecError {
  #[error("Execution service unreachable: {0}")]
  Transport(String),

  #[error("Execution failed: {status} {message}")]
  Http { status: u16, message: String },

  #[error("Unsupported programming language: {0}")]
  UnsupportedLanguage(String),

  #[error("Invalid response from execution service: {0}")]
  Decode(String),
}

/// Terminal error once every attempt of a retried operation has failed.
#[derive(Error, Debug)]
pub enum RetryError<E: std::error::Error> {
  #[error("Failed to {label} after {attempts} attempts. Last error: {last}")]
  Exhausted { label: String, attempts: u32, last: E },
}

#[derive(Error, Debug)]
pub enum HarnessError {
  #[error("harness generation failed: {0}")]
  Generation(#[from] GenerationError),

  #[error("LLM produced an empty harness")]
  EmptyHarness,
}

/// Failure of a service operation, as seen by HTTP and WebSocket handlers.
#[derive(Error, Debug)]
pub enum ServiceError {
  #[error("{0}")]
  BadRequest(String),

  #[error("{0}")]
  NotFound(String),

  #[error("{0}")]
  Upstream(String),
}

impl From<ExecError> for ServiceError {
  fn from(e: ExecError) -> Self {
    match e {
      ExecError::UnsupportedLanguage(_) => ServiceError::BadRequest(e.to_string()),
      other => ServiceError::Upstream(other.to_string()),
    }
  }
}

impl From<RetryError<GenerationError>> for ServiceError {
  fn from(e: RetryError<GenerationError>) -> Self {
    ServiceError::Upstream(e.to_string())
  }
}
