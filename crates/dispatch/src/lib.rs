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

//! The decoder/dispatcher: drains the ingress queue in bounded batches,
//! parses each payload, groups the resulting records by device, and
//! routes each group to its device's broadcast and (conditionally)
//! persistence queues.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ingress::IngressReceiver;
use model::Record;
use pipeline::{ConnectionSink, DevicePipelines};
use state::{Counters, SaveFlag};
use tracing::{trace, warn};

/// Tuning knobs the dispatcher needs.
#[derive(Debug, Clone, Copy)]
pub struct DispatchTuning {
    /// Maximum number of raw payloads drained per tick.
    pub max_batch: usize,
    /// Maximum time to wait for the first payload of a tick.
    pub batch_timeout: Duration,
}

/// Runs the dispatcher loop forever, draining `ingress` and routing
/// parsed records into `pipelines`. Intended to be spawned as its own
/// task and registered with the process task manager by the caller.
pub async fn run<S: ConnectionSink>(
    ingress: IngressReceiver,
    pipelines: Arc<DevicePipelines<S>>,
    save_flag: Arc<SaveFlag>,
    counters: Arc<Counters>,
    tuning: DispatchTuning,
) {
    loop {
        let raw_batch = ingress.drain_up_to(tuning.max_batch, tuning.batch_timeout).await;
        if raw_batch.is_empty() {
            continue;
        }

        dispatch_batch(&raw_batch, &pipelines, &save_flag, &counters);
    }
}

fn dispatch_batch<S: ConnectionSink>(
    raw_batch: &[Vec<u8>],
    pipelines: &DevicePipelines<S>,
    save_flag: &SaveFlag,
    counters: &Counters,
) {
    counters.inc_received(raw_batch.len() as u64);

    let mut by_device: HashMap<String, Vec<Record>> = HashMap::new();
    let mut parsed_count = 0u64;
    let mut error_count = 0u64;

    for raw in raw_batch {
        match model::parse_payload(raw) {
            Ok(parsed) => {
                error_count += parsed.dropped as u64;
                for record in parsed.records {
                    parsed_count += 1;
                    by_device.entry(record.device_id.clone()).or_default().push(record);
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to parse raw payload");
                error_count += 1;
            }
        }
    }

    counters.inc_parsed(parsed_count);
    if error_count > 0 {
        counters.inc_parse_error(error_count);
    }

    let persist = save_flag.is_set();
    let mut queued = 0u64;

    for (device_id, records) in by_device {
        let n = records.len() as u64;
        let broadcast_records = records.clone();
        let dropped = pipelines.enqueue_broadcast(&device_id, broadcast_records);
        if dropped > 0 {
            warn!(device_id = %device_id, dropped, "device broadcast queue full, dropping records");
            counters.inc_loss_device_queue_full(dropped as u64);
        }
        queued += n - dropped as u64;

        if persist {
            let dropped = pipelines.enqueue_persistence(&device_id, records);
            if dropped > 0 {
                warn!(device_id = %device_id, dropped, "device persistence queue full, dropping records");
                counters.inc_loss_save_queue_full(dropped as u64);
            }
        }
    }

    trace!(queued, "dispatched batch");
    counters.inc_device_queued(queued);
}

#[cfg(test)]
mod test {
    use super::*;
    use async_trait::async_trait;
    use state::{ClientRegistry, RoutingTable};
    use std::sync::Arc as StdArc;
    use std::time::Duration as StdDuration;
    use store::Store;
    use task::TaskManager;

    #[derive(Clone)]
    struct NullSink;
    impl ConnectionSink for NullSink {
        fn send(&self, _frame: StdArc<[u8]>) -> bool {
            true
        }
    }

    struct NullStore;
    #[async_trait]
    impl Store for NullStore {
        async fn ensure_device(&self, _device_id: &str, _token: Option<&str>) -> Result<(), store::Error> {
            Ok(())
        }
        async fn insert_device_data_batch(&self, _rows: &[store::DeviceDataRow]) -> Result<(), store::Error> {
            Ok(())
        }
        async fn save_client_session(&self, _client_id: &str, _websocket_id: &str) -> Result<(), store::Error> {
            Ok(())
        }
        async fn mark_client_disconnected(&self, _client_id: &str) -> Result<(), store::Error> {
            Ok(())
        }
    }

    fn pipelines() -> StdArc<DevicePipelines<NullSink>> {
        StdArc::new(DevicePipelines::new(
            StdArc::new(ClientRegistry::new()),
            StdArc::new(RoutingTable::new()),
            StdArc::new(Counters::new()),
            StdArc::new(NullStore),
            TaskManager::new(),
            pipeline::BroadcastTuning {
                egress_batch: 2000,
                egress_timeout: StdDuration::from_millis(50),
                compression_threshold: 1000,
            },
            pipeline::PersistenceTuning {
                db_batch: 500,
                db_interval: StdDuration::from_millis(1000),
            },
        ))
    }

    #[test]
    fn single_record_payload_is_parsed_and_queued() {
        let pipelines = pipelines();
        let save_flag = SaveFlag::new(false);
        let counters = Counters::new();

        let raw = br#"{"device_id":"A","timestamp":"2024-12-04T12:00:00Z","displacement":1.0,"force":2.0,"message_id":1}"#.to_vec();
        dispatch_batch(&[raw], &pipelines, &save_flag, &counters);

        let snap = counters.snapshot();
        assert_eq!(snap.mqtt_received, 1);
        assert_eq!(snap.mqtt_parsed, 1);
        assert_eq!(snap.mqtt_errors, 0);
        assert_eq!(snap.device_queued, 1);
    }

    #[test]
    fn malformed_payload_is_counted_and_dropped() {
        let pipelines = pipelines();
        let save_flag = SaveFlag::new(false);
        let counters = Counters::new();

        dispatch_batch(&[b"not json".to_vec()], &pipelines, &save_flag, &counters);

        let snap = counters.snapshot();
        assert_eq!(snap.mqtt_received, 1);
        assert_eq!(snap.mqtt_parsed, 0);
        assert_eq!(snap.mqtt_errors, 1);
    }

    #[test]
    fn persistence_is_gated_by_save_flag() {
        let pipelines = pipelines();
        let save_flag = SaveFlag::new(false);
        let counters = Counters::new();

        let raw = br#"{"device_id":"A","timestamp":"2024-12-04T12:00:00Z","displacement":1.0,"force":2.0}"#.to_vec();
        dispatch_batch(&[raw], &pipelines, &save_flag, &counters);

        // With the save flag off, no persistence worker should have been
        // created at all for this device.
        assert_eq!(counters.snapshot().db_saved, 0);
    }
}
