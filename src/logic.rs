//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Generating and storing coding challenges, reading them back
//!   - Serving hints by index
//!   - Quiz generation
//!   - Running code in the sandbox and checking solutions
//!   - Code review feedback

use tracing::{debug, info, instrument};

use crate::checker::ProgressSink;
use crate::domain::{Challenge, CodeAnalysis, ComparisonVerdict, ProgrammingLanguage, Quiz};
use crate::error::{ExecError, ServiceError};
use crate::executor::{execute_or_failed, format_execution_result, Runtime};
use crate::protocol::{AnalysisIn, ChallengeIn, ChallengeSummary, CheckIn, HintOut, QuizIn, RunIn, RunOut};
use crate::state::AppState;

/// Parse a language name and require that the sandbox will run it.
fn parse_language(state: &AppState, s: &str) -> Result<ProgrammingLanguage, ServiceError> {
    let language = s.parse::<ProgrammingLanguage>()?;
    if !state.runner.supports(language) {
        return Err(ExecError::UnsupportedLanguage(language.as_str().to_string()).into());
    }
    Ok(language)
}

async fn require_challenge(state: &AppState, id: &str) -> Result<Challenge, ServiceError> {
    state
        .get_challenge(id)
        .await
        .ok_or_else(|| ServiceError::NotFound(format!("Unknown challengeId: {}", id)))
}

#[instrument(level = "info", skip(state, req), fields(topic_len = req.topic.len(), lang = %req.programming_language))]
pub async fn create_challenge(state: &AppState, req: &ChallengeIn) -> Result<Challenge, ServiceError> {
    let language = parse_language(state, &req.programming_language)?;
    if req.topic.trim().is_empty() {
        return Err(ServiceError::BadRequest("topic must not be empty".into()));
    }
    let spec = state
        .content
        .generate_challenge(req.topic.trim(), req.language, language, req.difficulty)
        .await?;
    let c = state.insert_generated(spec).await;
    info!(target: "codecheck_backend", id = %c.id, title = %c.spec.title, "Challenge stored");
    Ok(c)
}

pub async fn get_challenge(state: &AppState, id: &str) -> Result<Challenge, ServiceError> {
    require_challenge(state, id).await
}

pub async fn list_challenges(state: &AppState) -> Vec<ChallengeSummary> {
    state.all_challenges().await.iter().map(ChallengeSummary::from).collect()
}

/// Hint `index` of a challenge. Past the end, the last hint is repeated.
#[instrument(level = "info", skip(state), fields(%challenge_id, index))]
pub async fn get_hint(state: &AppState, challenge_id: &str, index: usize) -> Result<HintOut, ServiceError> {
    let c = require_challenge(state, challenge_id).await?;
    let hints = &c.spec.hints;
    let Some(last) = hints.len().checked_sub(1) else {
        return Ok(HintOut { text: "No hints available for this challenge.".into(), index: 0, total: 0 });
    };
    let index = index.min(last);
    Ok(HintOut { text: hints[index].clone(), index, total: hints.len() })
}

pub async fn generate_quiz(state: &AppState, req: &QuizIn) -> Result<Quiz, ServiceError> {
    if req.topic.trim().is_empty() {
        return Err(ServiceError::BadRequest("topic must not be empty".into()));
    }
    Ok(state.content.generate_quiz(req.topic.trim(), req.language).await?)
}

/// Run user code as is. Compile/runtime failures are part of the result.
#[instrument(level = "info", skip(state, req), fields(lang = %req.language, code_len = req.code.len()))]
pub async fn run_code(state: &AppState, req: &RunIn) -> Result<RunOut, ServiceError> {
    let language = parse_language(state, &req.language)?;
    let result = state.runner.execute(&req.code, language).await?;
    debug!(target: "codecheck_backend", success = result.success, ms = result.execution_time_ms, "Run finished");
    let formatted = format_execution_result(&result);
    Ok(RunOut { result, formatted })
}

pub async fn check_solution(
    state: &AppState,
    req: &CheckIn,
    progress: Option<ProgressSink<'_>>,
) -> Result<ComparisonVerdict, ServiceError> {
    let c = require_challenge(state, &req.challenge_id).await?;
    Ok(state.checker.check(&req.code, &c.spec, req.language, progress).await)
}

#[instrument(level = "info", skip(state, req), fields(challenge_id = %req.challenge_id))]
pub async fn analyze_code(state: &AppState, req: &AnalysisIn) -> Result<CodeAnalysis, ServiceError> {
    let c = require_challenge(state, &req.challenge_id).await?;
    let execution_result = match &req.execution_result {
        Some(text) => text.clone(),
        None => {
            let result = execute_or_failed(state.runner.as_ref(), &req.code, c.spec.programming_language).await;
            format_execution_result(&result)
        }
    };
    Ok(state
        .content
        .generate_code_analysis(&req.code, &execution_result, &c.spec, req.language)
        .await?)
}

pub async fn list_runtimes(state: &AppState) -> Result<Vec<Runtime>, ServiceError> {
    Ok(state.runner.runtimes().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NaturalLanguage;
    use crate::executor::testing::{ok_result, ScriptedRunner};
    use crate::llm::testing::ScriptedBackend;
    use crate::state::testing::state;

    #[tokio::test]
    async fn unsupported_language_is_a_bad_request_without_calls() {
        let backend = ScriptedBackend::new(vec![]);
        let runner = ScriptedRunner::new(vec![]);
        let st = state(backend.clone(), runner.clone());

        let err = run_code(&st, &RunIn { code: "x".into(), language: "cobol".into() }).await.unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
        assert_eq!(runner.call_count(), 0);

        let req = ChallengeIn {
            topic: "loops".into(),
            language: NaturalLanguage::En,
            programming_language: "brainfuck".into(),
            difficulty: Default::default(),
        };
        assert!(matches!(create_challenge(&st, &req).await, Err(ServiceError::BadRequest(_))));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn disabled_language_is_refused_before_generation_or_execution() {
        let backend = ScriptedBackend::new(vec![]);
        let runner = ScriptedRunner::without(vec![ProgrammingLanguage::JavaScript]);
        let st = state(backend.clone(), runner.clone());

        let req = ChallengeIn {
            topic: "arrays".into(),
            language: NaturalLanguage::En,
            programming_language: "javascript".into(),
            difficulty: Default::default(),
        };
        let err = create_challenge(&st, &req).await.unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(ref m) if m.contains("javascript")));
        assert_eq!(backend.call_count(), 0);

        let err = run_code(&st, &RunIn { code: "console.log(1)".into(), language: "js".into() }).await.unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn hints_clamp_to_the_last_one() {
        let st = state(ScriptedBackend::new(vec![]), ScriptedRunner::new(vec![]));
        let first = get_hint(&st, "seed-double", 0).await.unwrap();
        let far = get_hint(&st, "seed-double", 99).await.unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(far.index, far.total - 1);
        assert!(matches!(get_hint(&st, "nope", 0).await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn check_uses_the_stored_reference_solution() {
        let runner = ScriptedRunner::new(vec![Ok(ok_result("[2,4,6]")), Ok(ok_result("[2,4,6]"))]);
        let st = state(ScriptedBackend::new(vec![]), runner.clone());
        let req = CheckIn {
            challenge_id: "seed-double".into(),
            code: "function double(arr: number[]): number[] { return arr.map(x => x + x); }".into(),
            language: NaturalLanguage::En,
        };
        let verdict = check_solution(&st, &req, None).await.unwrap();
        assert!(verdict.is_correct);
        assert!(runner.programs.lock().unwrap()[1].contains("return arr.map(x => x * 2);"));
    }

    #[tokio::test]
    async fn analysis_runs_the_code_when_no_result_is_given() {
        let backend = ScriptedBackend::new(vec![Ok(r#"{"suggestions": ["Looks good"]}"#.into())]);
        let runner = ScriptedRunner::new(vec![Ok(ok_result("2"))]);
        let st = state(backend.clone(), runner.clone());
        let req = AnalysisIn {
            challenge_id: "seed-vowels".into(),
            code: "def count_vowels(t):\n    return 2".into(),
            execution_result: None,
            language: NaturalLanguage::En,
        };
        let a = analyze_code(&st, &req).await.unwrap();
        assert_eq!(a.suggestions, vec!["Looks good"]);
        assert_eq!(runner.call_count(), 1);
        let seen = backend.seen.lock().unwrap();
        assert!(seen[0].0[1].content.contains("Output:\n2"));
    }
}
