//! qsource · Adaptive Question Sourcing Engine (HTTP service)
//!
//! - Axum HTTP API (sourcing + maintenance jobs)
//! - Optional OpenAI integration (via environment variables)
//!
//! Important env variables:
//!   PORT                   : u16 (default 3000)
//!   OPENAI_API_KEY         : enables generation and embeddings if present
//!   OPENAI_BASE_URL        : default "https://api.openai.com/v1"
//!   OPENAI_QUESTION_MODEL  : default "gpt-4o-mini"
//!   OPENAI_EMBEDDING_MODEL : default "text-embedding-3-small"
//!   QSOURCE_CONFIG_PATH    : path to TOML config (engine, prompts, jobs, topic catalog)
//!   JOBS_API_KEY           : shared secret for /api/v1/jobs/*
//!   LOG_LEVEL              : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT             : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use qsource::routes::build_router;
use qsource::state::AppState;
use qsource::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let state = Arc::new(AppState::from_env().await);
  let app = build_router(state);

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "qsource", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!(target: "qsource", "Shutdown signal received");
    })
    .await?;
  Ok(())
}
