#![deny(
    trivial_numeric_casts,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    unused_results
)]
#![warn(rust_2021_compatibility, unreachable_pub)]

//! The raw ingress queue: the single bridge between the broker adapter's
//! own thread and the cooperatively scheduled data plane.

use std::time::Duration;

use tokio::time::timeout;

/// A raw broker delivery, not yet parsed.
pub type RawPayload = Vec<u8>;

/// Producer-side handle. Cloning is cheap; every clone shares the same
/// underlying unbounded channel. The broker adapter calls `offer` from its
/// own callback thread.
#[derive(Debug, Clone)]
pub struct IngressSender {
    sender: flume::Sender<RawPayload>,
}

impl IngressSender {
    /// Pushes a raw payload onto the queue. Never blocks; fails only if
    /// every consumer has been dropped, which should not happen while the
    /// dispatcher is running.
    pub fn offer(&self, payload: RawPayload) -> Result<(), RawPayload> {
        self.sender.send(payload).map_err(|err| err.into_inner())
    }
}

/// Consumer-side handle, owned exclusively by the dispatcher.
#[derive(Debug, Clone)]
pub struct IngressReceiver {
    receiver: flume::Receiver<RawPayload>,
}

impl IngressReceiver {
    /// Drains up to `max` payloads, waiting at most `first_wait` for the
    /// first one to arrive, then collecting whatever else is already
    /// available without waiting further.
    pub async fn drain_up_to(&self, max: usize, first_wait: Duration) -> Vec<RawPayload> {
        let mut batch = Vec::with_capacity(max.min(256));

        match timeout(first_wait, self.receiver.recv_async()).await {
            Ok(Ok(first)) => batch.push(first),
            Ok(Err(_)) | Err(_) => return batch,
        }

        while batch.len() < max {
            match self.receiver.try_recv() {
                Ok(payload) => batch.push(payload),
                Err(_) => break,
            }
        }

        batch
    }
}

/// Creates a new unbounded ingress queue and returns its producer and
/// consumer halves.
pub fn channel() -> (IngressSender, IngressReceiver) {
    let (sender, receiver) = flume::unbounded();
    (IngressSender { sender }, IngressReceiver { receiver })
}
