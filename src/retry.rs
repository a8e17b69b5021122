//! Bounded retry with linear backoff for LLM generation calls.
//!
//! Sandbox executions are never wrapped: a failed run is a result, not a glitch.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::RetrySettings;
use crate::error::RetryError;

#[derive(Clone, Debug)]
pub struct RetryPolicy {
  /// Extra attempts after the first one.
  pub max_retries: u32,
  /// Sleep before retry `n` is `base_delay * n`.
  pub base_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self { max_retries: 2, base_delay: Duration::from_millis(1000) }
  }
}

impl RetryPolicy {
  pub fn from_settings(s: &RetrySettings) -> Self {
    Self { max_retries: s.max_retries, base_delay: Duration::from_millis(s.base_delay_ms) }
  }

  pub fn attempts(&self) -> u32 { self.max_retries + 1 }

  /// Run `op` until it succeeds or all attempts are used. `op` receives the
  /// 1-based attempt number. `label` names the operation in logs and in the
  /// terminal error ("generate coding challenge").
  pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryError<E>>
  where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error,
  {
    let attempts = self.attempts();
    let mut attempt = 1;
    loop {
      match op(attempt).await {
        Ok(v) => return Ok(v),
        Err(e) if attempt < attempts => {
          let delay = self.base_delay * attempt;
          warn!(target: "codecheck_backend", %label, attempt, max_attempts = attempts, delay_ms = delay.as_millis() as u64, error = %e, "Attempt failed, retrying");
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(e) => {
          warn!(target: "codecheck_backend", %label, attempts, error = %e, "All attempts failed");
          return Err(RetryError::Exhausted { label: label.to_string(), attempts, last: e });
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  use crate::error::GenerationError;

  fn fast() -> RetryPolicy {
    RetryPolicy { max_retries: 2, base_delay: Duration::from_millis(1) }
  }

  #[tokio::test]
  async fn always_failing_operation_runs_max_retries_plus_one_times() {
    let calls = AtomicU32::new(0);
    let res: Result<(), _> = fast()
      .run("generate quiz", |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(GenerationError::Transport("connection refused".into())) }
      })
      .await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let err = res.unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("after 3 attempts"), "{msg}");
    assert!(msg.contains("connection refused"), "{msg}");
    let RetryError::Exhausted { attempts, last, .. } = err;
    assert_eq!(attempts, 3);
    assert!(matches!(last, GenerationError::Transport(_)));
  }

  #[tokio::test]
  async fn stops_at_first_success() {
    let calls = AtomicU32::new(0);
    let out = fast()
      .run("generate coding challenge", |attempt| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
          if attempt < 2 { Err(GenerationError::EmptyCompletion) } else { Ok(attempt) }
        }
      })
      .await
      .unwrap();
    assert_eq!(out, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn zero_retries_means_single_attempt() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy { max_retries: 0, base_delay: Duration::from_millis(1) };
    let res: Result<u8, _> = policy
      .run("x", |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(GenerationError::EmptyCompletion) }
      })
      .await;
    assert!(res.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }
}
