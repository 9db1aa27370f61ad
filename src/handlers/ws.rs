//! WebSocket handler: one worker per connection, frames handled in arrival order.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info};

use crate::handlers::http::AppState;
use crate::middleware::SessionIdentity;
use crate::models::identity::Identity;

/// Upgrade HTTP to WebSocket. The credential is verified by `SessionIdentity` before the
/// upgrade; a bad or missing token is answered with 401 and nothing is registered.
pub async fn ws_handler(
    State(state): State<AppState>,
    SessionIdentity(identity): SessionIdentity,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket, identity))
}

async fn handle_socket(state: AppState, socket: WebSocket, identity: Identity) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let hub = state.hub().clone();
    let conn = hub.connect(identity.clone(), tx).await;
    info!(socket_id = %conn, user_id = %identity.user_id, "ws connected");

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => hub.handle_text(&conn, &identity, &text).await,
            Message::Close(_) => break,
            other => debug!(socket_id = %conn, ?other, "ignored frame"),
        }
    }

    hub.disconnect(&conn).await;
    send_task.abort();
    info!(socket_id = %conn, user_id = %identity.user_id, "ws disconnected");
}
