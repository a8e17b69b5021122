//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - JSON API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/challenge", post(http::http_post_challenge))
        .route("/api/v1/challenge/:id", get(http::http_get_challenge))
        .route("/api/v1/challenges", get(http::http_list_challenges))
        .route("/api/v1/hint", get(http::http_get_hint))
        .route("/api/v1/quiz", post(http::http_post_quiz))
        .route("/api/v1/run", post(http::http_post_run))
        .route("/api/v1/check", post(http::http_post_check))
        .route("/api/v1/analysis", post(http::http_post_analysis))
        .route("/api/v1/runtimes", get(http::http_get_runtimes))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::executor::testing::{failed_result, ok_result, ScriptedRunner};
    use crate::llm::testing::ScriptedBackend;
    use crate::state::testing::state;

    fn router(backend: Arc<ScriptedBackend>, runner: Arc<ScriptedRunner>) -> Router {
        build_router(Arc::new(state(backend, runner)))
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = router(ScriptedBackend::new(vec![]), ScriptedRunner::new(vec![]));
        let (status, body) = send(app, Request::get("/api/v1/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true}));
    }

    #[tokio::test]
    async fn check_with_unknown_challenge_is_404() {
        let app = router(ScriptedBackend::new(vec![]), ScriptedRunner::new(vec![]));
        let (status, body) = send(app, post("/api/v1/check", json!({"challengeId": "missing", "code": "x"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Unknown challengeId: missing");
    }

    #[tokio::test]
    async fn check_returns_the_verdict() {
        let runner = ScriptedRunner::new(vec![Ok(failed_result("Compilation Error:\nmain.ts(1,1): error TS1005"))]);
        let app = router(ScriptedBackend::new(vec![]), runner);
        let (status, body) = send(
            app,
            post("/api/v1/check", json!({"challengeId": "seed-double", "code": "function double(arr {"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isCorrect"], false);
        assert!(body["message"].as_str().unwrap().starts_with("Your code contains compilation errors."));
    }

    #[tokio::test]
    async fn run_reports_result_and_formatted_text() {
        let runner = ScriptedRunner::new(vec![Ok(ok_result("hello"))]);
        let app = router(ScriptedBackend::new(vec![]), runner);
        let (status, body) = send(app, post("/api/v1/run", json!({"code": "console.log('hello')", "language": "ts"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["success"], true);
        assert!(body["formatted"].as_str().unwrap().starts_with("Output:\nhello"));
    }

    #[tokio::test]
    async fn unsupported_language_is_400() {
        let app = router(ScriptedBackend::new(vec![]), ScriptedRunner::new(vec![]));
        let (status, body) = send(app, post("/api/v1/run", json!({"code": "x", "language": "cobol"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("cobol"));
    }

    #[tokio::test]
    async fn exhausted_generation_is_502() {
        let backend = ScriptedBackend::new(vec![]);
        let app = router(backend.clone(), ScriptedRunner::new(vec![]));
        let (status, body) = send(app, post("/api/v1/quiz", json!({"topic": "closures"}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().starts_with("Failed to generate quiz after 3 attempts."));
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn generated_challenge_is_stored_and_listed() {
        let backend = ScriptedBackend::new(vec![Ok(json!({
            "title": "Reverse",
            "description": "Reverse a string.",
            "initialCode": "def reverse(s):\n    # your code here\n    pass",
            "solution": "def reverse(s):\n    return s[::-1]",
            "testCases": [{"input": "\"abc\"", "expectedOutput": "\"cba\""}],
            "hints": ["Slicing"]
        })
        .to_string())]);
        let st = Arc::new(state(backend, ScriptedRunner::new(vec![])));

        let (status, created) = send(
            build_router(st.clone()),
            post("/api/v1/challenge", json!({"topic": "strings", "programmingLanguage": "python", "difficulty": "medium"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["programmingLanguage"], "python");
        assert_eq!(created["source"], "generated");
        let id = created["id"].as_str().unwrap().to_string();

        let (status, fetched) = send(
            build_router(st.clone()),
            Request::get(format!("/api/v1/challenge/{id}")).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["title"], "Reverse");

        let (_, list) = send(build_router(st), Request::get("/api/v1/challenges").body(Body::empty()).unwrap()).await;
        assert!(list.as_array().unwrap().iter().any(|c| c["id"] == id.as_str()));
    }
}
