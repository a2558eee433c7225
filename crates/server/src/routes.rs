//! HTTP surface over the core: session lifecycle, rate-limit status, and
//! batch dispatch. Routing and JSON shapes only; all behavior lives in the
//! core crate.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use leadcast_core::{CoreError, Dispatcher, RateLimitStatus, RateLimiter, SessionManager, SessionStatus};

#[derive(Clone)]
pub struct AppState {
	pub session: Arc<SessionManager>,
	pub limiter: Arc<RateLimiter>,
	pub dispatcher: Arc<Dispatcher>,
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/api", get(health))
		.route("/api/session/status", get(session_status))
		.route("/api/session/connect", post(session_connect))
		.route("/api/session/disconnect", post(session_disconnect))
		.route("/api/rate-limit/status", get(rate_limit_status))
		.route("/api/dispatch/send", post(dispatch_send))
		.with_state(state)
}

async fn health() -> Json<Value> {
	Json(json!({ "message": "API is running", "status": "success" }))
}

async fn session_status(State(state): State<AppState>) -> Json<SessionStatus> {
	Json(state.session.status())
}

/// Idempotent: a no-op while a session is already connecting or ready, and
/// the way back in after a fatal (retries-exhausted) initialization.
async fn session_connect(State(state): State<AppState>) -> Response {
	match state.session.initialize().await {
		Ok(()) => Json(json!({ "message": "Session initialization started" })).into_response(),
		Err(err) => error_response(err),
	}
}

async fn session_disconnect(State(state): State<AppState>) -> Json<Value> {
	state.session.disconnect().await;
	Json(json!({ "message": "Session disconnected" }))
}

async fn rate_limit_status(State(state): State<AppState>) -> Json<RateLimitStatus> {
	Json(state.limiter.status())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest {
	lead_ids: Vec<String>,
	/// Accept the whole backlog and drain it in the background instead of
	/// dispatching one admissible batch inline.
	#[serde(default)]
	queue: bool,
}

async fn dispatch_send(State(state): State<AppState>, Json(request): Json<SendRequest>) -> Response {
	if request.queue {
		let backlog = request.lead_ids;
		let count = backlog.len();
		info!(target = "leadcast.http", backlog = count, "queueing backlog drain");
		let dispatcher = Arc::clone(&state.dispatcher);
		tokio::spawn(async move {
			let outcomes = dispatcher.drain_backlog(backlog).await;
			info!(target = "leadcast.http", processed = outcomes.len(), "backlog drain finished");
		});
		return (StatusCode::ACCEPTED, Json(json!({ "accepted": count }))).into_response();
	}

	match state.dispatcher.send_batch(&request.lead_ids).await {
		Ok(report) => Json(report).into_response(),
		Err(err) => error_response(err),
	}
}

fn error_response(err: CoreError) -> Response {
	let status = match &err {
		CoreError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
		CoreError::SessionNotReady | CoreError::EmptyBatch | CoreError::BatchTooLarge { .. } => {
			StatusCode::BAD_REQUEST
		}
		_ => StatusCode::INTERNAL_SERVER_ERROR,
	};

	let body = match &err {
		CoreError::RateLimited { max_per_window, available, minutes_remaining } => json!({
			"error": err.to_string(),
			"maxPerWindow": max_per_window,
			"available": available,
			"minutesRemaining": minutes_remaining,
		}),
		_ => json!({ "error": err.to_string() }),
	};

	if status.is_server_error() {
		warn!(target = "leadcast.http", error = %err, "request failed");
	}
	(status, Json(body)).into_response()
}
