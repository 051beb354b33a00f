//! Lyra AI Mentor · Scaffolded Practice Backend
//!
//! - Axum HTTP + WebSocket API over the micro-lesson practice engine
//! - Rubric scoring through a swappable judge (OpenAI when configured, heuristic otherwise)
//! - Four-stage scaffolding, attempt history, skill mastery, toolkit shelf
//!
//! Important env variables:
//!   PORT               : u16 (default 3000)
//!   OPENAI_API_KEY     : enables the OpenAI judge if present
//!   OPENAI_BASE_URL    : default "https://api.openai.com/v1"
//!   OPENAI_MODEL       : default "gpt-4o-mini"
//!   MENTOR_CONFIG_PATH : path to TOML config (engine thresholds, prompts, lesson bank)
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"

mod telemetry;
mod util;
mod error;
mod domain;
mod rubric;
mod judge;
mod openai;
mod config;
mod catalog;
mod scorer;
mod tracker;
mod progression;
mod mastery;
mod store;
mod engine;
mod toolkit;
mod seeds;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared state: lesson catalog, judge, engine, toolkit shelf.
  let state = Arc::new(AppState::new());

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "lyra_mentor", %addr, lessons = state.engine.catalog().len(), "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
