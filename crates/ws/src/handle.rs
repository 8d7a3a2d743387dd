//! The per-connection send handle registered with the client registry,
//! bridging the broadcast pipeline's generic [`pipeline::ConnectionSink`]
//! to a real axum WebSocket sender.

use std::sync::Arc;

use axum::extract::ws::Message;
use pipeline::ConnectionSink;
use tokio::sync::mpsc::UnboundedSender;

/// A handle to one connection's outbound message channel. The pipeline
/// pushes frames into this channel; a dedicated writer task forwards them
/// to the socket, keeping the broadcast worker from ever blocking on a
/// slow client.
#[derive(Clone)]
pub struct WsHandle {
    sender: UnboundedSender<Message>,
}

impl WsHandle {
    /// Wraps a channel sender as a connection handle.
    pub fn new(sender: UnboundedSender<Message>) -> Self {
        Self { sender }
    }
}

impl ConnectionSink for WsHandle {
    fn send(&self, frame: Arc<[u8]>) -> bool {
        self.sender.send(Message::Binary(frame.to_vec().into())).is_ok()
    }
}
