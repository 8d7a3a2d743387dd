//! The per-device broadcast worker: accumulates records into batches and
//! fans each batch out to every connection currently registered for the
//! device's target client identity.

use std::sync::Arc;
use std::time::{Duration, Instant};

use model::Record;
use signal::{Signal, SignalReceiver};
use state::{ClientRegistry, Counters, RoutingTable};
use tracing::{trace, warn};

use crate::framing::frame_batch;
use crate::sink::ConnectionSink;

/// Tuning knobs the broadcast worker needs; a narrow view onto
/// `config::Settings` so this crate does not depend on the config crate.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastTuning {
    /// Maximum records accumulated before a batch is emitted.
    pub egress_batch: usize,
    /// Maximum time a batch is held open before being emitted.
    pub egress_timeout: Duration,
    /// Size above which a batch is compressed before being sent.
    pub compression_threshold: usize,
}

/// Runs the broadcast worker for `device_id` until its channel is closed.
/// `receiver` is fed one `Vec<Record>` per dispatcher tick that routed
/// records to this device; this function bridges them through
/// [`signal::SignalReceiver`] so that a period with no new records still
/// flushes a non-empty batch.
pub async fn run<S: ConnectionSink>(
    device_id: String,
    flume_rx: flume::Receiver<Vec<Record>>,
    registry: Arc<ClientRegistry<S>>,
    routing: Arc<RoutingTable>,
    counters: Arc<Counters>,
    tuning: BroadcastTuning,
) {
    let mut receiver = SignalReceiver::with_receiver_timer(flume_rx, tuning.egress_timeout, 0);
    let mut batch: Vec<Record> = Vec::new();
    let mut batch_opened_at: Option<Instant> = None;

    loop {
        match receiver.recv().await {
            Signal::Messages { messages } => {
                if batch_opened_at.is_none() {
                    batch_opened_at = Some(Instant::now());
                }
                counters.inc_device_processed(messages.len() as u64);
                batch.extend(messages);

                let should_emit = batch.len() >= tuning.egress_batch
                    || batch_opened_at.map(|t| t.elapsed() >= tuning.egress_timeout).unwrap_or(false);

                if should_emit {
                    emit(&device_id, &mut batch, &registry, &routing, &counters, tuning.compression_threshold).await;
                    batch_opened_at = None;
                }
            }
            Signal::TimerTick { .. } => {
                if !batch.is_empty() {
                    emit(&device_id, &mut batch, &registry, &routing, &counters, tuning.compression_threshold).await;
                    batch_opened_at = None;
                }
            }
            Signal::Stop => break,
        }
    }
}

async fn emit<S: ConnectionSink>(
    device_id: &str,
    batch: &mut Vec<Record>,
    registry: &ClientRegistry<S>,
    routing: &RoutingTable,
    counters: &Counters,
    compression_threshold: usize,
) {
    let client_id = routing.client_for(device_id);
    let connections = registry.connections_of(&client_id);

    if connections.is_empty() {
        trace!(device_id, client_id = %client_id, "no subscribers for broadcast, dropping batch");
        batch.clear();
        return;
    }

    let frame: Arc<[u8]> = Arc::from(frame_batch(batch, compression_threshold));
    let mut failures = 0u64;

    for connection in &connections {
        if !connection.send(frame.clone()) {
            failures += 1;
        }
    }

    if failures > 0 {
        warn!(device_id, client_id = %client_id, failures, "broadcast send failures");
        counters.inc_broadcast_errors(failures);
    }

    counters.inc_broadcast_sent(batch.len() as u64);
    batch.clear();
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use state::ConnectionId;

    #[derive(Clone)]
    struct CollectingSink {
        frames: Arc<StdMutex<Vec<Vec<u8>>>>,
        ok: Arc<AtomicUsize>,
    }

    impl ConnectionSink for CollectingSink {
        fn send(&self, frame: Arc<[u8]>) -> bool {
            self.frames.lock().unwrap().push(frame.to_vec());
            let _ = self.ok.fetch_add(1, Ordering::Relaxed);
            true
        }
    }

    fn record(id: &str, mid: i64) -> Record {
        Record {
            device_id: id.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            displacement: 1.0,
            force: 2.0,
            device_token: None,
            message_id: Some(mid),
        }
    }

    #[tokio::test]
    async fn flushes_full_batch_without_waiting_for_timeout() {
        let registry: Arc<ClientRegistry<CollectingSink>> = Arc::new(ClientRegistry::new());
        let routing = Arc::new(RoutingTable::new());
        let counters = Arc::new(Counters::new());
        let sink = CollectingSink {
            frames: Arc::new(StdMutex::new(Vec::new())),
            ok: Arc::new(AtomicUsize::new(0)),
        };
        registry.register("1", ConnectionId::next(), sink.clone());

        let (tx, rx) = flume::unbounded();
        let tuning = BroadcastTuning {
            egress_batch: 2,
            egress_timeout: Duration::from_secs(10),
            compression_threshold: 1000,
        };

        let handle = tokio::spawn(run(
            "A".to_string(),
            rx,
            registry.clone(),
            routing.clone(),
            counters.clone(),
            tuning,
        ));

        tx.send(vec![record("A", 1), record("A", 2)]).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(tx);
        let _ = tokio::time::timeout(Duration::from_millis(200), handle).await;

        assert_eq!(sink.ok.load(Ordering::Relaxed), 1);
        assert_eq!(counters.snapshot().broadcast_sent, 2);
    }

    #[tokio::test]
    async fn drops_batch_silently_when_no_subscribers() {
        let registry: Arc<ClientRegistry<CollectingSink>> = Arc::new(ClientRegistry::new());
        let routing = Arc::new(RoutingTable::new());
        let counters = Arc::new(Counters::new());

        let (tx, rx) = flume::unbounded();
        let tuning = BroadcastTuning {
            egress_batch: 1,
            egress_timeout: Duration::from_millis(20),
            compression_threshold: 1000,
        };

        let handle = tokio::spawn(run(
            "A".to_string(),
            rx,
            registry.clone(),
            routing.clone(),
            counters.clone(),
            tuning,
        ));

        tx.send(vec![record("A", 1)]).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        drop(tx);
        let _ = tokio::time::timeout(Duration::from_millis(200), handle).await;

        assert_eq!(counters.snapshot().broadcast_sent, 0);
        assert_eq!(counters.snapshot().broadcast_errors, 0);
    }
}
