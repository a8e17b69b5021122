//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.
//!
//! Programming languages arrive as plain strings so an unknown one is a
//! 400-style service error rather than a JSON rejection.

use serde::{Deserialize, Serialize};

use crate::domain::{
    Challenge, ChallengeSource, CodeAnalysis, ComparisonVerdict, Difficulty, ExecutionResult, NaturalLanguage,
    Quiz,
};
use crate::executor::Runtime;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    NewChallenge(ChallengeIn),
    GetChallenge {
        #[serde(rename = "challengeId")]
        challenge_id: String,
    },
    Hint(HintQuery),
    NewQuiz(QuizIn),
    RunCode(RunIn),
    CheckSolution(CheckIn),
    AnalyzeCode(AnalysisIn),
    ListRuntimes,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Challenge {
        challenge: Challenge,
    },
    Hint(HintOut),
    Quiz {
        quiz: Quiz,
    },
    RunResult(RunOut),
    /// Percent complete of a running solution check.
    Progress {
        percent: u8,
    },
    CheckResult {
        verdict: ComparisonVerdict,
    },
    Analysis {
        analysis: CodeAnalysis,
    },
    Runtimes {
        runtimes: Vec<Runtime>,
    },
    Error {
        message: String,
    },
}

// -------- HTTP DTOs --------

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeIn {
    pub topic: String,
    #[serde(default)]
    pub language: NaturalLanguage,
    pub programming_language: String,
    #[serde(default)]
    pub difficulty: Difficulty,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeSummary {
    pub id: String,
    pub title: String,
    pub programming_language: String,
    pub difficulty: Difficulty,
    pub source: ChallengeSource,
}

impl From<&Challenge> for ChallengeSummary {
    fn from(c: &Challenge) -> Self {
        Self {
            id: c.id.clone(),
            title: c.spec.title.clone(),
            programming_language: c.spec.programming_language.as_str().to_string(),
            difficulty: c.spec.difficulty,
            source: c.source.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintQuery {
    pub challenge_id: String,
    #[serde(default)]
    pub index: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HintOut {
    pub text: String,
    pub index: usize,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct QuizIn {
    pub topic: String,
    #[serde(default)]
    pub language: NaturalLanguage,
}

#[derive(Debug, Deserialize)]
pub struct RunIn {
    pub code: String,
    pub language: String,
}

#[derive(Debug, Serialize)]
pub struct RunOut {
    pub result: ExecutionResult,
    pub formatted: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckIn {
    pub challenge_id: String,
    pub code: String,
    #[serde(default)]
    pub language: NaturalLanguage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisIn {
    pub challenge_id: String,
    pub code: String,
    /// Formatted output of a previous run; the code is run first when absent.
    #[serde(default)]
    pub execution_result: Option<String>,
    #[serde(default)]
    pub language: NaturalLanguage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_use_snake_case_tags() {
        let m: ClientWsMessage = serde_json::from_str(
            r#"{"type":"check_solution","challengeId":"seed-double","code":"function double(a){return a}"}"#,
        )
        .unwrap();
        match m {
            ClientWsMessage::CheckSolution(c) => {
                assert_eq!(c.challenge_id, "seed-double");
                assert_eq!(c.language, NaturalLanguage::En);
            }
            other => panic!("unexpected {:?}", other),
        }

        let m: ClientWsMessage = serde_json::from_str(r#"{"type":"hint","challengeId":"x","index":1}"#).unwrap();
        assert!(matches!(m, ClientWsMessage::Hint(HintQuery { index: 1, .. })));
    }

    #[test]
    fn progress_serializes_with_type_tag() {
        let s = serde_json::to_value(ServerWsMessage::Progress { percent: 40 }).unwrap();
        assert_eq!(s, serde_json::json!({"type": "progress", "percent": 40}));
    }
}
