//! HTTP endpoint handlers. These are thin wrappers that forward to the engine and jobs.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{
  extract::State,
  http::{header::AUTHORIZATION, HeaderMap, StatusCode},
  response::{IntoResponse, Response},
  Json,
};
use tracing::{error, info, instrument, warn};

use crate::engine::SourceRequest;
use crate::error::{ServiceError, SourcingError};
use crate::protocol::*;
use crate::state::AppState;

const API_KEY_HEADER: &str = "x-api-key";

impl IntoResponse for SourcingError {
  fn into_response(self) -> Response {
    let status = match &self {
      SourcingError::TopicNotFound(_) => StatusCode::NOT_FOUND,
      SourcingError::Bridge(_) | SourcingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorOut { error: self.to_string() })).into_response()
  }
}

fn unauthorized() -> Response {
  (StatusCode::UNAUTHORIZED, Json(ErrorOut { error: "Unauthorized".into() })).into_response()
}

fn job_failure(e: ServiceError) -> Response {
  (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorOut { error: e.to_string() })).into_response()
}

/// Bearer token or `x-api-key` must equal the configured secret. No secret, no access.
pub fn authorize(headers: &HeaderMap, secret: Option<&str>) -> bool {
  let Some(secret) = secret else { return false };
  let bearer = headers
    .get(AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(str::trim);
  let api_key = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
  bearer == Some(secret) || api_key == Some(secret)
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, body), fields(topic_id = %body.topic_id, mode = body.mode.as_str()))]
pub async fn http_post_source(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SourceIn>,
) -> Result<Json<SourceOut>, SourcingError> {
  let req = SourceRequest::from(body);
  match state.engine.source(&req).await {
    Ok(result) => {
      info!(target: "sourcing", topic_id = %req.topic_id, count = result.count, from_cache = result.from_cache, source = %result.source, "HTTP source served");
      Ok(Json(SourceOut::from(result)))
    }
    Err(e) => {
      error!(target: "sourcing", topic_id = %req.topic_id, error = %e, "HTTP source failed");
      Err(e)
    }
  }
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_job_migrate(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
  if !authorize(&headers, state.job_secret.as_deref()) {
    warn!(target: "sourcing", job = "migrate-vector", "Rejected unauthorized job call");
    return unauthorized();
  }
  match state.jobs.migrate_legacy().await {
    Ok(summary) => Json(summary).into_response(),
    Err(e) => {
      error!(target: "sourcing", job = "migrate-vector", error = %e, "Job failed");
      job_failure(e)
    }
  }
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_job_retry_embeddings(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
  if !authorize(&headers, state.job_secret.as_deref()) {
    warn!(target: "sourcing", job = "retry-embeddings", "Rejected unauthorized job call");
    return unauthorized();
  }
  match state.jobs.repair_embeddings().await {
    Ok(summary) => Json(summary).into_response(),
    Err(e) => {
      error!(target: "sourcing", job = "retry-embeddings", error = %e, "Job failed");
      job_failure(e)
    }
  }
}
