//! The interface a transport gives the broadcast pipeline to push a frame
//! to one connection, kept generic so this crate never depends on a
//! specific transport (mirrors the teacher's effect-handler genericity
//! over the message type it carries).

use std::sync::Arc;

/// A handle capable of delivering one outbound frame to a single
/// connection. Implemented by the interactive-connection endpoint for its
/// own connection handle type.
pub trait ConnectionSink: Clone + Send + Sync + 'static {
    /// Attempts to deliver `frame` to this connection. Returns `false` on
    /// failure; the caller counts failures as `broadcast_errors` but does
    /// not treat them as fatal to the batch.
    fn send(&self, frame: Arc<[u8]>) -> bool;
}
