use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::controller::WorkflowController;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(controller): State<Arc<WorkflowController>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| push_events(socket, controller))
}

/// Forwards every change event to the client until either side goes away.
/// Clients only listen; inbound frames other than close are ignored.
async fn push_events(mut socket: WebSocket, controller: Arc<WorkflowController>) {
    let mut events = controller.subscribe();
    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => continue,
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let Ok(text) = serde_json::to_string(&event) else {
                            continue;
                        };
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            debug!("websocket client went away");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("websocket subscriber lagged, skipped {} events", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}
