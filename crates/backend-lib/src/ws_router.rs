// ============================
// crates/backend-lib/src/ws_router.rs
// ============================

//! HTTP surface of the server: the WebSocket endpoint plus the
//! read-only stats route.
//!
//! Each accepted socket gets a forwarder task that serializes typed
//! events from the connection's outbound queue into text frames, and a
//! read loop that parses, validates and dispatches inbound frames.
//! Frames that fail to parse or validate are dropped with a debug log;
//! the connection stays up.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::debug;

use codesync_common::{ClientEvent, ServerEvent, StatsResponse};

use crate::metrics::{WS_ACTIVE, WS_CONNECTION};
use crate::session::SessionController;
use crate::validation;
use crate::AppState;

/// Outbound frames queued per connection before broadcasts are shed.
const OUTBOUND_BUFFER: usize = 64;

/// Builds the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/stats", get(stats_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    counter!(WS_CONNECTION).increment(1);
    gauge!(WS_ACTIVE).increment(1.0);
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.registry.stats_snapshot())
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerEvent>(OUTBOUND_BUFFER);

    // forwarder: typed events out of the queue, text frames onto the wire
    let send_task = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(json) => Message::Text(json.into()),
                Err(err) => {
                    debug!(%err, "skipping unserializable event");
                    continue;
                }
            };
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    let mut controller = SessionController::new(state, outbound_tx);
    let session_id = controller.session_id();
    debug!(session = %session_id, "client connected");

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => match validation::validate_client_event(&event) {
                    Ok(()) => controller.dispatch(event).await,
                    Err(err) => {
                        debug!(session = %session_id, %err, "dropping invalid event");
                    }
                },
                Err(err) => {
                    debug!(session = %session_id, %err, "dropping malformed frame");
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    controller.disconnect();
    gauge!(WS_ACTIVE).decrement(1.0);
    debug!(session = %session_id, "client disconnected");
    send_task.abort();
}
