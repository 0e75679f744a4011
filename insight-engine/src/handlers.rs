//! Axum handlers for the HTTP and WebSocket request surface.

use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::hub::{envelope, EventKind, FanoutHub};
use crate::insights::{self, InsightParams};

// ------------------------------------------------------------------ //
//  Shared application state                                           //
// ------------------------------------------------------------------ //

/// Shared state injected into every handler via `State`.
pub struct AppState {
    pub pool: PgPool,
    pub hub: Arc<FanoutHub>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/insights", get(insights_handler))
        .route("/ws/alert", get(ws_alert))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ------------------------------------------------------------------ //
//  GET /                                                              //
// ------------------------------------------------------------------ //

async fn root() -> impl IntoResponse {
    Json(json!({"message": "Welcome to AUV Insight Engine"}))
}

// ------------------------------------------------------------------ //
//  GET /insights                                                      //
// ------------------------------------------------------------------ //

#[derive(Debug, Deserialize)]
pub struct InsightsQuery {
    auv_id: Option<String>,
    #[serde(rename = "type")]
    alert_type: Option<String>,
    limit: Option<i64>,
    summary: Option<bool>,
    summary_modes: Option<String>,
    window_minutes: Option<i64>,
    timeseries_limit: Option<i64>,
    timeseries_fields: Option<String>,
}

async fn insights_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InsightsQuery>,
) -> impl IntoResponse {
    let mut params = InsightParams {
        auv_id: query.auv_id,
        summary: query.summary.unwrap_or(false),
        ..Default::default()
    };

    if let Some(raw) = &query.alert_type {
        match insights::parse_alert_type(raw) {
            Ok(kind) => params.alert_type = Some(kind),
            Err(e) => {
                return (StatusCode::BAD_REQUEST, Json(json!({"error": e.to_string()})));
            }
        }
    }
    if let Some(raw) = &query.summary_modes {
        match insights::parse_summary_modes(raw) {
            Ok(modes) => params.summary_modes = modes,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, Json(json!({"error": e.to_string()})));
            }
        }
    }
    if let Some(limit) = query.limit {
        params.limit = limit;
    }
    if let Some(window_minutes) = query.window_minutes {
        params.window_minutes = window_minutes;
    }
    if let Some(timeseries_limit) = query.timeseries_limit {
        params.timeseries_limit = timeseries_limit;
    }
    if let Some(raw) = &query.timeseries_fields {
        params.timeseries_fields = Some(
            raw.split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect(),
        );
    }

    match insights::fetch_insights(&state.pool, params).await {
        Ok(data) => (StatusCode::OK, Json(data)),
        Err(e) => {
            error!(error = %e, "insights query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
        }
    }
}

// ------------------------------------------------------------------ //
//  GET /ws/alert                                                      //
// ------------------------------------------------------------------ //

async fn ws_alert(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub.clone()))
}

/// Per-subscriber loop: forwards hub broadcasts outbound and echoes valid
/// inbound JSON back with a timestamp.
async fn handle_socket(socket: WebSocket, hub: Arc<FanoutHub>) {
    let (id, mut outbound) = hub.connect().await;
    let (mut tx, mut rx) = socket.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                match frame {
                    Some(text) => {
                        if tx.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<serde_json::Value>(&text) {
                            Ok(data) => envelope(EventKind::Echo, data),
                            Err(_) => json!({
                                "type": EventKind::Error.as_str(),
                                "message": "Invalid JSON format",
                            }),
                        };
                        if tx.send(Message::Text(reply.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, id, "subscriber socket error");
                        break;
                    }
                }
            }
        }
    }

    hub.disconnect(id).await;
}
