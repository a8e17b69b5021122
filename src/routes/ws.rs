//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. Every request gets one reply; `check_solution`
//! additionally streams `progress` messages before its verdict.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::mpsc;
use tracing::{error, info, instrument};

use crate::checker::ProgressSink;
use crate::error::ServiceError;
use crate::logic;
use crate::protocol::{CheckIn, ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "codecheck_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn send_json(socket: &mut WebSocket, msg: &ServerWsMessage) -> Result<(), axum::Error> {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  socket.send(Message::Text(out)).await
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "codecheck_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(ClientWsMessage::CheckSolution(req)) => check_with_progress(&mut socket, &state, req).await,
          Ok(incoming) => handle_client_ws(incoming, &state).await,
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        if let Err(e) = send_json(&mut socket, &reply).await {
          error!(target: "codecheck_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "codecheck_backend", "WebSocket disconnected");
}

fn error_reply(e: ServiceError) -> ServerWsMessage {
  ServerWsMessage::Error { message: e.to_string() }
}

/// Run a check while forwarding its progress to the client.
#[instrument(level = "info", skip(socket, state, req), fields(%req.challenge_id))]
async fn check_with_progress(socket: &mut WebSocket, state: &AppState, req: CheckIn) -> ServerWsMessage {
  let (tx, mut rx) = mpsc::unbounded_channel::<u8>();
  let forward = move |percent: u8| {
    let _ = tx.send(percent);
  };
  let sink: ProgressSink = &forward;

  let check = logic::check_solution(state, &req, Some(sink));
  tokio::pin!(check);
  let result = loop {
    tokio::select! {
      res = &mut check => break res,
      Some(percent) = rx.recv() => {
        let _ = send_json(socket, &ServerWsMessage::Progress { percent }).await;
      }
    }
  };
  while let Ok(percent) = rx.try_recv() {
    let _ = send_json(socket, &ServerWsMessage::Progress { percent }).await;
  }

  match result {
    Ok(verdict) => {
      info!(target: "checker", id = %req.challenge_id, correct = verdict.is_correct, "WS check evaluated");
      ServerWsMessage::CheckResult { verdict }
    }
    Err(e) => error_reply(e),
  }
}

#[instrument(level = "info", skip_all)]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::NewChallenge(req) => match logic::create_challenge(state, &req).await {
      Ok(challenge) => {
        info!(target: "codecheck_backend", id = %challenge.id, "WS new_challenge served");
        ServerWsMessage::Challenge { challenge }
      }
      Err(e) => error_reply(e),
    },

    ClientWsMessage::GetChallenge { challenge_id } => match logic::get_challenge(state, &challenge_id).await {
      Ok(challenge) => ServerWsMessage::Challenge { challenge },
      Err(e) => error_reply(e),
    },

    ClientWsMessage::Hint(q) => match logic::get_hint(state, &q.challenge_id, q.index).await {
      Ok(hint) => ServerWsMessage::Hint(hint),
      Err(e) => error_reply(e),
    },

    ClientWsMessage::NewQuiz(req) => match logic::generate_quiz(state, &req).await {
      Ok(quiz) => ServerWsMessage::Quiz { quiz },
      Err(e) => error_reply(e),
    },

    ClientWsMessage::RunCode(req) => match logic::run_code(state, &req).await {
      Ok(out) => ServerWsMessage::RunResult(out),
      Err(e) => error_reply(e),
    },

    // Streams progress, so the loop handles it with socket access.
    ClientWsMessage::CheckSolution(req) => match logic::check_solution(state, &req, None).await {
      Ok(verdict) => ServerWsMessage::CheckResult { verdict },
      Err(e) => error_reply(e),
    },

    ClientWsMessage::AnalyzeCode(req) => match logic::analyze_code(state, &req).await {
      Ok(analysis) => ServerWsMessage::Analysis { analysis },
      Err(e) => error_reply(e),
    },

    ClientWsMessage::ListRuntimes => match logic::list_runtimes(state).await {
      Ok(runtimes) => ServerWsMessage::Runtimes { runtimes },
      Err(e) => error_reply(e),
    },
  }
}
