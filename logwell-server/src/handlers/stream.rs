use std::collections::BTreeMap;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use logwell_core::StreamMessage;
use logwell_model::LabelSet;
use serde::Deserialize;
use serde_json::json;

use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;

/// Messages a client may send over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientMessage {
    /// Atomically replace the subscription's label filter.
    Filter { labels: BTreeMap<String, String> },
}

/// `GET /stream` — WebSocket upgrade. The label filter comes from the
/// query string (`/stream?service=api`); an empty filter receives every
/// entry. Each matching entry arrives as `{type:"log", data:{…}}`.
pub async fn stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> ApiResult<Response> {
    let filter = LabelSet::try_from_pairs(params)
        .map_err(|err| ApiError::validation(err.to_string()))?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, filter)))
}

/// Handle an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState, filter: LabelSet) {
    let subscription = state.supervisor.hub().subscribe(filter);
    let subscriber_id = subscription.id;
    let mut rx = subscription.rx;

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Outgoing: hub messages to socket frames. Hub pings become protocol
    // pings so idle-but-alive clients answer without application logic.
    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let frame = match message {
                StreamMessage::Entry(entry) => {
                    match serde_json::to_string(&json!({"type": "log", "data": &*entry})) {
                        Ok(text) => Message::Text(text.into()),
                        Err(err) => {
                            tracing::error!(error = %err, "failed to encode entry");
                            continue;
                        }
                    }
                }
                StreamMessage::Ping => Message::Ping(Vec::new().into()),
            };
            if ws_sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    // Incoming: filter updates and lifecycle frames.
    while let Some(message) = ws_receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(ClientMessage::Filter { labels }) => {
                        match LabelSet::try_from_pairs(labels) {
                            Ok(filter) => {
                                state.supervisor.hub().update_filter(subscriber_id, filter);
                            }
                            Err(err) => {
                                tracing::warn!(subscriber = %subscriber_id, error = %err, "rejected filter update");
                            }
                        }
                    }
                    Err(err) => {
                        tracing::debug!(subscriber = %subscriber_id, error = %err, "ignoring unknown client message");
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Err(err) => {
                tracing::debug!(subscriber = %subscriber_id, error = %err, "websocket error");
                break;
            }
            // Pong and binary frames need no handling.
            _ => {}
        }
    }

    // Clean up on disconnect.
    state.supervisor.hub().unsubscribe(subscriber_id);
    send_task.abort();
    tracing::debug!(subscriber = %subscriber_id, "stream connection closed");
}
