//! The interactive-connection endpoint: accepts a WebSocket, performs the
//! identify handshake, registers with the client registry, and serves
//! inbound control messages until disconnect.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use state::{routing::DEFAULT_CLIENT_ID, ConnectionId};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::control::{Identify, SaveToggle};
use crate::handle::WsHandle;

/// Builds the router for the interactive-connection endpoint.
pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(upgrade))
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve(socket, state))
}

async fn serve(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let connection_id = ConnectionId::next();
    let handle = WsHandle::new(tx);

    // accepted -> identified: the first inbound message (if any) may carry
    // an explicit client_id; anything else defaults permissively.
    let client_id = match stream.next().await {
        Some(Ok(Message::Text(text))) => extract_client_id(&text),
        _ => DEFAULT_CLIENT_ID.to_string(),
    };

    state.registry.register(&client_id, connection_id, handle);
    if let Err(err) = state.store.save_client_session(&client_id, &connection_id_label(connection_id)).await {
        warn!(client_id = %client_id, error = %err, "failed to record client session");
    }
    info!(client_id = %client_id, "connection identified and registered");

    // serving: handle control messages until disconnect.
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => handle_control(&text, &state).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(client_id = %client_id, error = %err, "transport error, closing connection");
                break;
            }
        }
    }

    // closed: terminal, never re-entered.
    state.registry.unregister(&client_id, connection_id);
    if let Err(err) = state.store.mark_client_disconnected(&client_id).await {
        warn!(client_id = %client_id, error = %err, "failed to mark client disconnected");
    }
    writer.abort();
    info!(client_id = %client_id, "connection closed");
}

fn extract_client_id(text: &str) -> String {
    match serde_json::from_str::<Identify>(text) {
        Ok(Identify { client_id: Some(id) }) if !id.is_empty() => id,
        _ => DEFAULT_CLIENT_ID.to_string(),
    }
}

fn connection_id_label(id: ConnectionId) -> String {
    format!("{id:?}")
}

async fn handle_control(text: &str, state: &AppState) {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "ignoring malformed control message");
            return;
        }
    };

    match value.get("type").and_then(|t| t.as_str()) {
        Some("slider") => match serde_json::to_vec(&value) {
            Ok(payload) => {
                if let Err(err) = state.broker.publish_control(payload).await {
                    warn!(error = %err, "failed to echo slider control message");
                }
            }
            Err(err) => warn!(error = %err, "failed to re-serialize slider payload"),
        },
        Some("save") => match serde_json::from_value::<SaveToggle>(value) {
            Ok(toggle) => state.save_flag.set(toggle.save),
            Err(err) => warn!(error = %err, "malformed save control message"),
        },
        Some(other) => info!(message_type = other, "ignoring unrecognized control message type"),
        None => warn!("control message missing type field, ignoring"),
    }
}
