// Dashboard HTTP surface.
//
// Serves the telemetry snapshot over plain JSON endpoints and streams the
// broadcast event feed over a WebSocket. Rendering is the browser's job;
// nothing here produces HTML.

use std::sync::{Arc, RwLock};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::telemetry::{Snapshot, TelemetryEvent};

#[derive(Clone)]
pub struct AppState {
    pub snapshot: Arc<RwLock<Snapshot>>,
    pub events: broadcast::Sender<TelemetryEvent>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/market/:symbol", get(market))
        .route("/api/positions", get(positions))
        .route("/api/trades", get(trades))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

/// Bind and serve until the task is dropped
pub async fn serve(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("dashboard server listening on http://{bind_addr}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.snapshot.read().unwrap();
    Json(json!({
        "status": "running",
        "balance": snapshot.balance,
        "total_pnl": snapshot.total_unrealized_pnl,
        "active_positions": snapshot.active_positions,
        "uptime_secs": snapshot.uptime_secs,
        "demo_mode": snapshot.demo_mode,
        "symbols": snapshot.markets.keys().collect::<Vec<_>>(),
    }))
}

async fn market(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> impl IntoResponse {
    let snapshot = state.snapshot.read().unwrap();
    match snapshot.markets.get(&symbol) {
        Some(data) => (StatusCode::OK, Json(json!(data))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no market data for {symbol}") })),
        ),
    }
}

async fn positions(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.snapshot.read().unwrap();
    Json(json!({ "positions": snapshot.positions }))
}

async fn trades(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.snapshot.read().unwrap();
    Json(json!({ "trades": snapshot.trades }))
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let receiver = state.events.subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, receiver))
}

/// Forward telemetry events to one WebSocket subscriber until either side
/// goes away
async fn stream_events(mut socket: WebSocket, mut events: broadcast::Receiver<TelemetryEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let payload = match serde_json::to_string(&event) {
                    Ok(payload) => payload,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to serialize telemetry event");
                        continue;
                    }
                };
                if socket.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "websocket subscriber lagging, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
