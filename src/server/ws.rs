use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::StreamExt;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, warn};

use crate::events::snapshot_message;
use crate::server::ServeState;

pub(crate) fn router() -> Router<ServeState> {
    Router::new().route("/events", get(events_handler))
}

async fn events_handler(
    State(state): State<ServeState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serve one subscriber: snapshot first, then live events until disconnect.
///
/// Client text frames are never interpreted; only transport frames (ping,
/// close) are handled. A subscriber that cannot keep up lags on the
/// broadcast channel and loses the oldest events rather than stalling the
/// emitters.
async fn handle_socket(mut socket: WebSocket, state: ServeState) {
    let (snapshot, mut events) = state.runtime.subscribe();
    let greeting = snapshot_message(&snapshot).to_string();
    if socket.send(Message::Text(greeting)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(err) => {
                            error!(target: "ws", ?err, kind = event.kind(), "failed to encode event");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "ws", skipped, "subscriber lagged; events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            frame = socket.next() => match frame {
                Some(Ok(Message::Ping(payload))) => {
                    let _ = socket.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(target: "ws", ?frame, "websocket closed by client");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    error!(target: "ws", ?err, "websocket error");
                    break;
                }
                None => break,
            },
        }
    }
    debug!(target: "ws", "subscriber disconnected");
}
