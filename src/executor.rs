//! Remote code execution against a Piston-compatible sandbox.
//!
//! The sandbox reports up to two stages (compile, run). They are folded into one
//! `ExecutionResult`:
//!   - compile stage present with non-zero exit  -> compilation error
//!   - run stage non-zero exit (or killed)       -> runtime error, stdout kept
//!   - otherwise                                 -> success with merged output
//!
//! Only transport-level problems are `Err`. Resource limits are the sandbox's
//! business: memory limits are disabled and timeouts are passed per request.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::ExecutorSettings;
use crate::domain::{ExecutionResult, ProgrammingLanguage};
use crate::error::ExecError;

/// A language/version pair the sandbox has installed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Runtime {
  pub language: String,
  pub version: String,
  #[serde(default)] pub aliases: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")] pub runtime: Option<String>,
}

#[async_trait]
pub trait CodeRunner: Send + Sync {
  async fn execute(&self, code: &str, language: ProgrammingLanguage) -> Result<ExecutionResult, ExecError>;

  /// Whether `execute` will accept `language` at all.
  fn supports(&self, _language: ProgrammingLanguage) -> bool {
    true
  }

  /// Capability discovery; not consulted before dispatch.
  async fn runtimes(&self) -> Result<Vec<Runtime>, ExecError> {
    Ok(Vec::new())
  }
}

/// Like `execute`, but transport failures become a failed result.
pub async fn execute_or_failed(runner: &dyn CodeRunner, code: &str, language: ProgrammingLanguage) -> ExecutionResult {
  let start = Instant::now();
  match runner.execute(code, language).await {
    Ok(r) => r,
    Err(e) => {
      warn!(target: "codecheck_backend", %language, error = %e, "Execution did not complete");
      ExecutionResult {
        success: false,
        output: String::new(),
        error: Some(e.to_string()),
        execution_time_ms: start.elapsed().as_millis() as u64,
        language: language.as_str().to_string(),
        version: "unknown".into(),
      }
    }
  }
}

pub fn sandbox_language(language: ProgrammingLanguage) -> &'static str {
  match language {
    ProgrammingLanguage::JavaScript => "javascript",
    ProgrammingLanguage::TypeScript => "typescript",
    ProgrammingLanguage::Python => "python",
  }
}

pub fn file_name(language: ProgrammingLanguage) -> &'static str {
  match language {
    ProgrammingLanguage::JavaScript => "main.js",
    ProgrammingLanguage::TypeScript => "main.ts",
    ProgrammingLanguage::Python => "main.py",
  }
}

// --- Sandbox DTOs ---

#[derive(Serialize)]
struct ExecuteRequest<'a> {
  language: &'a str,
  version: &'a str,
  files: Vec<SourceFile<'a>>,
  compile_timeout: u64,
  run_timeout: u64,
  compile_memory_limit: i64,
  run_memory_limit: i64,
}

#[derive(Serialize)]
struct SourceFile<'a> {
  name: &'a str,
  content: &'a str,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct StageResult {
  #[serde(default)] pub stdout: String,
  #[serde(default)] pub stderr: String,
  #[serde(default)] pub output: String,
  #[serde(default)] pub code: Option<i64>,
  #[serde(default)] pub signal: Option<String>,
}

impl StageResult {
  fn failed(&self) -> bool { self.code != Some(0) }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ExecuteResponse {
  pub language: String,
  pub version: String,
  #[serde(default)] pub compile: Option<StageResult>,
  pub run: StageResult,
}

/// Fold a sandbox response into an `ExecutionResult`.
pub fn interpret(resp: ExecuteResponse, execution_time_ms: u64) -> ExecutionResult {
  let compile_failed = resp.compile.as_ref().map(StageResult::failed).unwrap_or(false);
  let run_failed = resp.run.failed();

  let mut output = String::new();
  let mut error = String::new();

  if let (true, Some(c)) = (compile_failed, resp.compile.as_ref()) {
    error = format!("Compilation Error:\n{}", c.stderr);
    if !c.stdout.is_empty() {
      error.push_str(&format!("\nCompilation Output:\n{}", c.stdout));
    }
    if let Some(sig) = &c.signal {
      error.push_str(&format!("\n(terminated by {})", sig));
    }
  } else if run_failed {
    let status = match (resp.run.code, &resp.run.signal) {
      (Some(code), _) => format!("Exit Code: {}", code),
      (None, Some(sig)) => format!("Signal: {}", sig),
      (None, None) => "Exit Code: unknown".to_string(),
    };
    error = format!("Runtime Error ({}):\n{}", status, resp.run.stderr);
    output = resp.run.stdout.clone();
  } else {
    output = if resp.run.output.is_empty() { resp.run.stdout.clone() } else { resp.run.output.clone() };
  }

  let error = error.trim();
  ExecutionResult {
    success: !compile_failed && !run_failed,
    output: output.trim().to_string(),
    error: if error.is_empty() { None } else { Some(error.to_string()) },
    execution_time_ms,
    language: resp.language,
    version: resp.version,
  }
}

/// Human-readable rendering for the "Run" panel.
pub fn format_execution_result(result: &ExecutionResult) -> String {
  let error = result.error.as_deref().filter(|e| !e.is_empty());
  let mut formatted = match (result.output.is_empty(), error) {
    (false, Some(err)) => format!("Output:\n{}\n\nError:\n{}", result.output, err),
    (false, None) => format!("Output:\n{}", result.output),
    (true, Some(err)) => format!("Error:\n{}", err),
    (true, None) => "No output".to_string(),
  };
  formatted.push_str(&format!("\n\nLanguage: {} {}", result.language, result.version));
  formatted.push_str(&format!("\nExecution time: {}ms", result.execution_time_ms));
  formatted
}

/// HTTP client for the sandbox's v2 API.
#[derive(Clone)]
pub struct PistonClient {
  client: reqwest::Client,
  pub base_url: String,
  compile_timeout_ms: u64,
  run_timeout_ms: u64,
  enabled: Vec<ProgrammingLanguage>,
}

impl PistonClient {
  pub fn new(settings: &ExecutorSettings) -> Self {
    Self {
      // No client-side timeout: the sandbox enforces compile/run limits itself.
      client: reqwest::Client::new(),
      base_url: settings.base_url.trim_end_matches('/').to_string(),
      compile_timeout_ms: settings.compile_timeout_ms,
      run_timeout_ms: settings.run_timeout_ms,
      enabled: settings.enabled_languages.clone(),
    }
  }

}

async fn http_error(res: reqwest::Response) -> ExecError {
  #[derive(Deserialize)]
  struct Msg { message: String }
  let status = res.status();
  let body = res.text().await.unwrap_or_default();
  let message = serde_json::from_str::<Msg>(&body)
    .map(|m| m.message)
    .unwrap_or_else(|_| status.canonical_reason().unwrap_or("").to_string());
  ExecError::Http { status: status.as_u16(), message }
}

#[async_trait]
impl CodeRunner for PistonClient {
  fn supports(&self, language: ProgrammingLanguage) -> bool {
    self.enabled.contains(&language)
  }

  #[instrument(level = "info", skip(self, code), fields(%language, code_len = code.len()))]
  async fn execute(&self, code: &str, language: ProgrammingLanguage) -> Result<ExecutionResult, ExecError> {
    if !self.supports(language) {
      return Err(ExecError::UnsupportedLanguage(language.as_str().to_string()));
    }

    let req = ExecuteRequest {
      language: sandbox_language(language),
      version: "*",
      files: vec![SourceFile { name: file_name(language), content: code }],
      compile_timeout: self.compile_timeout_ms,
      run_timeout: self.run_timeout_ms,
      compile_memory_limit: -1,
      run_memory_limit: -1,
    };

    let start = Instant::now();
    let res = self.client.post(format!("{}/api/v2/execute", self.base_url))
      .json(&req)
      .send()
      .await
      .map_err(|e| ExecError::Transport(e.to_string()))?;
    if !res.status().is_success() {
      return Err(http_error(res).await);
    }
    let body: ExecuteResponse = res.json().await.map_err(|e| ExecError::Decode(e.to_string()))?;
    let result = interpret(body, start.elapsed().as_millis() as u64);

    info!(
      target: "codecheck_backend",
      success = result.success,
      version = %result.version,
      elapsed_ms = result.execution_time_ms,
      output_len = result.output.len(),
      "Sandbox execution finished"
    );
    Ok(result)
  }

  #[instrument(level = "info", skip(self))]
  async fn runtimes(&self) -> Result<Vec<Runtime>, ExecError> {
    let res = self.client.get(format!("{}/api/v2/runtimes", self.base_url))
      .send()
      .await
      .map_err(|e| ExecError::Transport(e.to_string()))?;
    if !res.status().is_success() {
      return Err(http_error(res).await);
    }
    res.json().await.map_err(|e| ExecError::Decode(e.to_string()))
  }
}

#[cfg(test)]
pub(crate) mod testing {
  //! In-memory runner for checker/logic tests.

  use std::collections::VecDeque;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  use super::*;

  pub fn ok_result(output: &str) -> ExecutionResult {
    ExecutionResult {
      success: true,
      output: output.into(),
      error: None,
      execution_time_ms: 12,
      language: "typescript".into(),
      version: "5.0.3".into(),
    }
  }

  pub fn failed_result(error: &str) -> ExecutionResult {
    ExecutionResult { success: false, error: Some(error.into()), output: String::new(), ..ok_result("") }
  }

  /// Replays queued results and records every submitted program.
  #[derive(Default)]
  pub struct ScriptedRunner {
    results: Mutex<VecDeque<Result<ExecutionResult, ExecError>>>,
    pub calls: AtomicUsize,
    pub programs: Mutex<Vec<String>>,
    disabled: Vec<ProgrammingLanguage>,
  }

  impl ScriptedRunner {
    pub fn new(results: Vec<Result<ExecutionResult, ExecError>>) -> std::sync::Arc<Self> {
      std::sync::Arc::new(Self { results: Mutex::new(results.into()), ..Default::default() })
    }

    /// A runner that refuses `disabled` the way a configured sandbox would.
    pub fn without(disabled: Vec<ProgrammingLanguage>) -> std::sync::Arc<Self> {
      std::sync::Arc::new(Self { disabled, ..Default::default() })
    }

    pub fn call_count(&self) -> usize { self.calls.load(Ordering::SeqCst) }
  }

  #[async_trait]
  impl CodeRunner for ScriptedRunner {
    fn supports(&self, language: ProgrammingLanguage) -> bool {
      !self.disabled.contains(&language)
    }

    async fn execute(&self, code: &str, language: ProgrammingLanguage) -> Result<ExecutionResult, ExecError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if !self.supports(language) {
        return Err(ExecError::UnsupportedLanguage(language.as_str().to_string()));
      }
      self.programs.lock().unwrap().push(code.to_string());
      self.results.lock().unwrap().pop_front()
        .unwrap_or_else(|| Err(ExecError::Transport("no scripted result".into())))
    }
  }
}
