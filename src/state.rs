//! Application state: dependency wiring and the in-memory challenge store.
//!
//! This module owns:
//!   - the challenge store (by id), seeded from the config bank and built-ins
//!   - the chat backend, sandbox runner and harness strategy, wired into the
//!     solution checker and content generator
//!
//! Nothing here is global; tests build the same state from fakes.

use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::checker::SolutionChecker;
use crate::config::AppConfig;
use crate::domain::{Challenge, ChallengeSource, ChallengeSpec};
use crate::error::GenerationError;
use crate::executor::{CodeRunner, PistonClient};
use crate::generator::ContentGenerator;
use crate::harness::{FallbackHarness, HarnessStrategy};
use crate::llm::{ChatBackend, OpenAiCompatClient, ResponseGenerator};
use crate::retry::RetryPolicy;
use crate::seeds::seed_challenges;

pub struct AppState {
    pub challenges: Arc<RwLock<HashMap<String, Challenge>>>,
    pub runner: Arc<dyn CodeRunner>,
    pub checker: SolutionChecker,
    pub content: ContentGenerator,
}

impl AppState {
    /// Build state from config: real LLM client and sandbox client.
    #[instrument(level = "info", skip_all)]
    pub fn from_config(cfg: &AppConfig) -> Result<Self, GenerationError> {
        let backend = Arc::new(OpenAiCompatClient::new(&cfg.llm)?);
        let runner = Arc::new(PistonClient::new(&cfg.executor));
        info!(
            target: "codecheck_backend",
            llm = %cfg.llm.base_url,
            model = %cfg.generation.model,
            sandbox = %cfg.executor.base_url,
            languages = ?cfg.executor.enabled_languages,
            "Backends configured"
        );
        Ok(Self::with_parts(cfg, backend, runner, None))
    }

    /// Wire state from explicit parts. `harness` defaults to LLM-with-template-fallback.
    pub fn with_parts(
        cfg: &AppConfig,
        backend: Arc<dyn ChatBackend>,
        runner: Arc<dyn CodeRunner>,
        harness: Option<Arc<dyn HarnessStrategy>>,
    ) -> Self {
        let prompts = Arc::new(cfg.prompts.clone());
        let generator = ResponseGenerator::new(backend, cfg.generation.clone());
        let harness = harness.unwrap_or_else(|| {
            Arc::new(FallbackHarness::llm_with_template(generator.clone(), prompts.clone()))
        });
        let checker = SolutionChecker::new(generator.clone(), runner.clone(), harness, prompts.clone());
        let content = ContentGenerator::new(generator, prompts.clone(), RetryPolicy::from_settings(&cfg.retry));

        let mut id_map = HashMap::<String, Challenge>::new();

        // Config bank first; built-in seeds never overwrite a bank id.
        // Challenges the sandbox cannot run are never stored.
        for cc in &cfg.challenges {
            let id = cc.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
            if !runner.supports(cc.spec.programming_language) {
                warn!(target: "codecheck_backend", %id, lang = %cc.spec.programming_language, "Skipping bank challenge in a disabled language");
                continue;
            }
            id_map.insert(id.clone(), Challenge { id, source: ChallengeSource::LocalBank, spec: cc.spec.clone() });
        }
        for c in seed_challenges() {
            if runner.supports(c.spec.programming_language) {
                id_map.entry(c.id.clone()).or_insert(c);
            }
        }

        let bank = id_map.values().filter(|c| c.source == ChallengeSource::LocalBank).count();
        info!(target: "codecheck_backend", total = id_map.len(), local_bank = bank, "Startup challenge inventory");

        Self {
            challenges: Arc::new(RwLock::new(id_map)),
            runner,
            checker,
            content,
        }
    }

    /// Store a freshly generated challenge under a new id.
    #[instrument(level = "debug", skip(self, spec), fields(title = %spec.title))]
    pub async fn insert_generated(&self, spec: ChallengeSpec) -> Challenge {
        let c = Challenge { id: Uuid::new_v4().to_string(), source: ChallengeSource::Generated, spec };
        self.challenges.write().await.insert(c.id.clone(), c.clone());
        c
    }

    /// Read-only access to a challenge by id.
    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn get_challenge(&self, id: &str) -> Option<Challenge> {
        self.challenges.read().await.get(id).cloned()
    }

    /// All stored challenges, sorted by id.
    pub async fn all_challenges(&self) -> Vec<Challenge> {
        let mut out: Vec<Challenge> = self.challenges.read().await.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}
