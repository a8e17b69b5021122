//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};

use crate::error::ServiceError;
use crate::logic;
use crate::protocol::*;
use crate::state::AppState;

impl IntoResponse for ServiceError {
  fn into_response(self) -> Response {
    let status = match &self {
      ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
      ServiceError::Upstream(_) => StatusCode::BAD_GATEWAY,
    };
    warn!(target: "codecheck_backend", %status, error = %self, "Request failed");
    (status, Json(ErrorOut { error: self.to_string() })).into_response()
  }
}

type ApiResult<T> = Result<Json<T>, ServiceError>;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, body), fields(lang = %body.programming_language, difficulty = body.difficulty.as_str()))]
pub async fn http_post_challenge(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ChallengeIn>,
) -> ApiResult<crate::domain::Challenge> {
  let c = logic::create_challenge(&state, &body).await?;
  info!(target: "codecheck_backend", id = %c.id, "HTTP challenge generated");
  Ok(Json(c))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_challenge(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> ApiResult<crate::domain::Challenge> {
  Ok(Json(logic::get_challenge(&state, &id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_challenges(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(logic::list_challenges(&state).await)
}

#[instrument(level = "info", skip(state), fields(%q.challenge_id, q.index))]
pub async fn http_get_hint(
  State(state): State<Arc<AppState>>,
  Query(q): Query<HintQuery>,
) -> ApiResult<HintOut> {
  let hint = logic::get_hint(&state, &q.challenge_id, q.index).await?;
  info!(target: "codecheck_backend", id = %q.challenge_id, index = hint.index, "HTTP hint served");
  Ok(Json(hint))
}

#[instrument(level = "info", skip(state, body), fields(topic_len = body.topic.len()))]
pub async fn http_post_quiz(
  State(state): State<Arc<AppState>>,
  Json(body): Json<QuizIn>,
) -> ApiResult<crate::domain::Quiz> {
  Ok(Json(logic::generate_quiz(&state, &body).await?))
}

#[instrument(level = "info", skip(state, body), fields(lang = %body.language, code_len = body.code.len()))]
pub async fn http_post_run(
  State(state): State<Arc<AppState>>,
  Json(body): Json<RunIn>,
) -> ApiResult<RunOut> {
  Ok(Json(logic::run_code(&state, &body).await?))
}

#[instrument(level = "info", skip(state, body), fields(%body.challenge_id, code_len = body.code.len()))]
pub async fn http_post_check(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CheckIn>,
) -> ApiResult<crate::domain::ComparisonVerdict> {
  let verdict = logic::check_solution(&state, &body, None).await?;
  info!(target: "checker", id = %body.challenge_id, correct = verdict.is_correct, "HTTP check evaluated");
  Ok(Json(verdict))
}

#[instrument(level = "info", skip(state, body), fields(%body.challenge_id, code_len = body.code.len()))]
pub async fn http_post_analysis(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AnalysisIn>,
) -> ApiResult<crate::domain::CodeAnalysis> {
  Ok(Json(logic::analyze_code(&state, &body).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_runtimes(State(state): State<Arc<AppState>>) -> ApiResult<Vec<crate::executor::Runtime>> {
  Ok(Json(logic::list_runtimes(&state).await?))
}
