//! Codecheck · quiz and coding-challenge backend
//!
//! - Axum HTTP + WebSocket API
//! - LLM generation through an OpenAI-compatible chat endpoint
//! - Solution checking through a Piston-compatible sandbox
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                   : u16 (default 3000)
//!   CODECHECK_CONFIG_PATH  : path to TOML config (prompts, defaults, challenge bank)
//!   LLM_BASE_URL           : default "http://localhost:11434"
//!   LLM_API_KEY            : optional bearer token
//!   LLM_MODEL              : default "qwen2.5:3b"
//!   PISTON_URL             : default "http://localhost:2000"
//!   ENABLED_LANGUAGES      : comma list, default "typescript,python"
//!   LOG_LEVEL              : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT             : "pretty" (default) or "json"

mod telemetry;
mod util;
mod error;
mod domain;
mod config;
mod jsonfix;
mod llm;
mod retry;
mod executor;
mod extract;
mod harness;
mod checker;
mod generator;
mod seeds;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::config::load_config_from_env;
use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Config file (optional) + env overrides, then clients and the challenge store.
  let cfg = load_config_from_env();
  let state = Arc::new(AppState::from_config(&cfg)?);

  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "codecheck_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!(target: "codecheck_backend", "Shutdown signal received");
    })
    .await?;
  Ok(())
}
