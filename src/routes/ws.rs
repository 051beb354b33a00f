//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.
//!
//! While a submission is being judged the loop keeps reading the socket: a
//! `cancel` message or a disconnect drops the in-flight future, which records
//! nothing.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};

use crate::domain::Stage;
use crate::logic::*;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "lyra_mentor", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "lyra_mentor", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(ClientWsMessage::SubmitAttempt { learner_id, lesson_id, stage, submission }) => {
            match run_submission(&mut socket, &state, &learner_id, &lesson_id, stage, &submission).await {
              Some(reply) => reply,
              None => break,
            }
          }
          Ok(incoming) => {
            debug!(target: "lyra_mentor", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state).await
          }
          Err(e) => invalid_message(&e),
        };

        if let Err(e) = send_json(&mut socket, &reply_msg).await {
          error!(target: "lyra_mentor", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "lyra_mentor", "WebSocket disconnected");
}

/// Drive one submission while watching the socket.
/// Returns `None` when the client went away and the loop should end.
async fn run_submission(
  socket: &mut WebSocket,
  state: &AppState,
  learner_id: &str,
  lesson_id: &str,
  stage: Stage,
  submission: &str,
) -> Option<ServerWsMessage> {
  let scoring = submit_attempt(state, learner_id, lesson_id, stage, submission);
  tokio::pin!(scoring);

  loop {
    tokio::select! {
      result = &mut scoring => {
        return Some(match result {
          Ok(out) => {
            info!(target: "lesson", %lesson_id, passed = out.attempt.passed, progress = %out.progress, "WS attempt evaluated");
            ServerWsMessage::AttemptResult { result: out }
          }
          Err(e) => ServerWsMessage::from(&e),
        });
      }
      incoming = socket.recv() => match incoming {
        Some(Ok(Message::Text(txt))) => {
          let reply = match serde_json::from_str::<ClientWsMessage>(&txt) {
            Ok(ClientWsMessage::Cancel) => {
              info!(target: "lesson", %learner_id, %lesson_id, "WS submission cancelled");
              return Some(ServerWsMessage::Cancelled);
            }
            Ok(_) => ServerWsMessage::Error {
              error: "busy".into(),
              message: "A submission is still being evaluated; send cancel or wait.".into(),
            },
            Err(e) => invalid_message(&e),
          };
          if send_json(socket, &reply).await.is_err() {
            return None;
          }
        }
        Some(Ok(Message::Ping(payload))) => { let _ = socket.send(Message::Pong(payload)).await; }
        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
          info!(target: "lesson", %learner_id, %lesson_id, "Client left mid-submission; dropping it");
          return None;
        }
        Some(Ok(_)) => {}
      }
    }
  }
}

#[instrument(level = "info", skip(state))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  let result = match msg {
    ClientWsMessage::Ping => return ServerWsMessage::Pong,

    ClientWsMessage::ListLessons => return ServerWsMessage::Lessons { lessons: list_lessons(state) },

    // Nothing in flight; acknowledging keeps cancel idempotent.
    ClientWsMessage::Cancel => return ServerWsMessage::Cancelled,

    ClientWsMessage::GetProgress { learner_id, lesson_id } =>
      get_progress(state, &learner_id, &lesson_id).await.map(|progress| ServerWsMessage::Progress { progress }),

    ClientWsMessage::Restart { learner_id, lesson_id } =>
      restart_lesson(state, &learner_id, &lesson_id).await.map(|progress| ServerWsMessage::Progress { progress }),

    ClientWsMessage::GetMastery { learner_id, skill_focus } =>
      get_mastery(state, &learner_id, skill_focus.as_deref()).await.map(|mastery| ServerWsMessage::Mastery { mastery }),

    ClientWsMessage::SubmitAttempt { learner_id, lesson_id, stage, submission } =>
      submit_attempt(state, &learner_id, &lesson_id, stage, &submission)
        .await
        .map(|result| ServerWsMessage::AttemptResult { result }),
  };
  result.unwrap_or_else(|e| ServerWsMessage::from(&e))
}

fn invalid_message(e: &serde_json::Error) -> ServerWsMessage {
  ServerWsMessage::Error { error: "invalid_message".into(), message: format!("Invalid JSON: {}", e) }
}

async fn send_json(socket: &mut WebSocket, msg: &ServerWsMessage) -> Result<(), axum::Error> {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "error": "serialization", "message": format!("Serialization error: {}", e) }).to_string()
  });
  socket.send(Message::Text(out)).await
}
