//! The per-device persistence worker: accumulates records and performs a
//! batched bulk insert into the store, creating the device row lazily on
//! first use.

use std::sync::Arc;
use std::time::{Duration, Instant};

use model::Record;
use signal::{Signal, SignalReceiver};
use state::Counters;
use store::{DeviceDataRow, Store};
use tracing::{error, trace};

/// Tuning knobs the persistence worker needs.
#[derive(Debug, Clone, Copy)]
pub struct PersistenceTuning {
    /// Maximum records accumulated before a flush.
    pub db_batch: usize,
    /// Maximum time a batch is held open before being flushed.
    pub db_interval: Duration,
}

/// Runs the persistence worker for `device_id` until its channel is
/// closed.
pub async fn run(
    device_id: String,
    flume_rx: flume::Receiver<Vec<Record>>,
    store: Arc<dyn Store>,
    counters: Arc<Counters>,
    tuning: PersistenceTuning,
) {
    let mut receiver = SignalReceiver::with_receiver_timer(flume_rx, tuning.db_interval, 0);
    let mut pending: Vec<Record> = Vec::new();
    let mut batch_opened_at: Option<Instant> = None;
    let mut device_ensured = false;

    loop {
        match receiver.recv().await {
            Signal::Messages { messages } => {
                if batch_opened_at.is_none() {
                    batch_opened_at = Some(Instant::now());
                }
                pending.extend(messages);

                let should_flush = pending.len() >= tuning.db_batch
                    || batch_opened_at.map(|t| t.elapsed() >= tuning.db_interval).unwrap_or(false);

                if should_flush {
                    flush(&device_id, &mut pending, &store, &counters, &mut device_ensured).await;
                    batch_opened_at = None;
                }
            }
            Signal::TimerTick { .. } => {
                if !pending.is_empty() {
                    flush(&device_id, &mut pending, &store, &counters, &mut device_ensured).await;
                    batch_opened_at = None;
                }
            }
            Signal::Stop => break,
        }
    }
}

async fn flush(
    device_id: &str,
    pending: &mut Vec<Record>,
    store: &Arc<dyn Store>,
    counters: &Counters,
    device_ensured: &mut bool,
) {
    if pending.is_empty() {
        return;
    }

    if !*device_ensured {
        let token = pending.first().and_then(|r| r.device_token.as_deref());
        if let Err(err) = store.ensure_device(device_id, token).await {
            error!(device_id, error = %err, "failed to ensure device row, skipping flush");
            counters.inc_db_errors(pending.len() as u64);
            pending.clear();
            return;
        }
        *device_ensured = true;
    }

    let mut rows = Vec::with_capacity(pending.len());
    let mut unparseable = 0u64;
    for record in pending.iter() {
        match DeviceDataRow::from_record(record) {
            Some(row) => rows.push(row),
            None => unparseable += 1,
        }
    }
    if unparseable > 0 {
        error!(device_id, unparseable, "record timestamp failed to parse, excluding from write");
        counters.inc_db_errors(unparseable);
    }
    let count = rows.len() as u64;

    match store.insert_device_data_batch(&rows).await {
        Ok(()) => {
            trace!(device_id, count, "persisted batch");
            counters.inc_db_saved(count);
        }
        Err(err) => {
            error!(device_id, count, error = %err, "batch insert failed, rolled back");
            counters.inc_db_errors(count);
        }
    }

    pending.clear();
}
