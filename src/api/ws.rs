// =============================================================================
// WebSocket Handler — topic-partitioned subscriber fan-out
// =============================================================================
//
// Mounted at `/ws/:topic` for `topic` ∈ {prices, spread, correlation, summary,
// alerts, analytics}. Each connection registers with `broadcast.rs`'s
// `BroadcastFabric` for exactly one topic and relays whatever the fabric
// publishes, in place of the teacher's single `/api/v1/ws` full-snapshot-push
// handler (§9 Design Note: topic-partitioned subscriber sets, not a
// monolithic snapshot).
//
// Structured like the teacher's `handle_ws_connection`: a `tokio::select!`
// loop racing the outgoing relay against inbound Ping/Pong/Close handling,
// cleaning up on exit either way.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::types::Topic;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>, Path(topic): Path<String>) -> impl IntoResponse {
    match Topic::parse(&topic) {
        Some(topic) => ws.on_upgrade(move |socket| handle_ws_connection(socket, state, topic)).into_response(),
        None => (axum::http::StatusCode::NOT_FOUND, format!("unknown topic '{topic}'")).into_response(),
    }
}

async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>, topic: Topic) {
    let (subscriber_id, mut outbound_rx) = state.broadcast.register(topic);
    info!(topic = %topic, subscriber = subscriber_id, "websocket subscriber connected");

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                match frame {
                    Some(text) => {
                        if let Err(e) = sender.send(Message::Text(text)).await {
                            debug!(topic = %topic, error = %e, "websocket send failed, disconnecting");
                            break;
                        }
                    }
                    None => {
                        warn!(topic = %topic, subscriber = subscriber_id, "broadcast channel closed, disconnecting");
                        break;
                    }
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(topic = %topic, subscriber = subscriber_id, "websocket closed by client");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(topic = %topic, error = %e, "websocket receive error, disconnecting");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.broadcast.unregister(topic, subscriber_id);
}
