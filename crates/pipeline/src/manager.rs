//! Lazily creates and owns the per-device broadcast and persistence
//! workers. A device's pipeline, once created, lives for the rest of the
//! process (per the specification's sticky-lifetime design note).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use model::Record;
use state::{ClientRegistry, Counters, RoutingTable};
use store::Store;
use task::labels::{ProcessLabels, TaskLabels};
use task::TaskManager;
use tracing::info;

use crate::broadcast::{self, BroadcastTuning};
use crate::persistence::{self, PersistenceTuning};
use crate::sink::ConnectionSink;

const DEVICE_QUEUE_CAPACITY: usize = 10_000;

struct DeviceEntry {
    broadcast_tx: flume::Sender<Vec<Record>>,
    persistence_tx: Mutex<Option<flume::Sender<Vec<Record>>>>,
}

/// Owns every device's broadcast and persistence queues, spawning their
/// workers on first use.
pub struct DevicePipelines<S: ConnectionSink> {
    devices: Mutex<HashMap<String, Arc<DeviceEntry>>>,
    registry: Arc<ClientRegistry<S>>,
    routing: Arc<RoutingTable>,
    counters: Arc<Counters>,
    store: Arc<dyn Store>,
    task_manager: TaskManager,
    broadcast_tuning: BroadcastTuning,
    persistence_tuning: PersistenceTuning,
    queue_capacity: usize,
}

impl<S: ConnectionSink> DevicePipelines<S> {
    /// Creates a new, empty pipeline manager.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<ClientRegistry<S>>,
        routing: Arc<RoutingTable>,
        counters: Arc<Counters>,
        store: Arc<dyn Store>,
        task_manager: TaskManager,
        broadcast_tuning: BroadcastTuning,
        persistence_tuning: PersistenceTuning,
    ) -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
            registry,
            routing,
            counters,
            store,
            task_manager,
            broadcast_tuning,
            persistence_tuning,
            queue_capacity: DEVICE_QUEUE_CAPACITY,
        }
    }

    /// Overrides the per-device queue capacity; used by tests exercising
    /// the queue-full loss path with a small bound.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    fn entry(&self, device_id: &str) -> Arc<DeviceEntry> {
        let mut devices = self.devices.lock().expect("device map lock poisoned");
        if let Some(entry) = devices.get(device_id) {
            return entry.clone();
        }

        let (broadcast_tx, broadcast_rx) = flume::bounded(self.queue_capacity);
        let entry = Arc::new(DeviceEntry {
            broadcast_tx,
            persistence_tx: Mutex::new(None),
        });
        let _ = devices.insert(device_id.to_string(), entry.clone());

        let mut task_manager = self.task_manager.clone();
        let registry = self.registry.clone();
        let routing = self.routing.clone();
        let counters = self.counters.clone();
        let tuning = self.broadcast_tuning;
        let task_labels = TaskLabels::new("pipeline", "broadcast", device_id);
        let owned_device_id = device_id.to_string();

        let join_handle = tokio::spawn(async move {
            let labels_for_cleanup = task_labels.clone();
            broadcast::run(owned_device_id, broadcast_rx, registry, routing, counters, tuning).await;
            TaskManager::no_task_cleaner(ProcessLabels::default(), labels_for_cleanup)
        });
        task_manager.register(join_handle, &TaskLabels::new("pipeline", "broadcast", device_id));

        info!(device_id, "broadcast worker started");
        entry
    }

    /// Enqueues `records` for broadcast on `device_id`, creating the
    /// device's pipeline if this is the first time it has been observed.
    /// Returns the number of records that had to be dropped because the
    /// broadcast queue was full.
    pub fn enqueue_broadcast(&self, device_id: &str, records: Vec<Record>) -> usize {
        let entry = self.entry(device_id);
        offer_one_at_a_time(&entry.broadcast_tx, records)
    }

    /// Enqueues `records` for persistence on `device_id`, creating the
    /// persistence worker lazily on first use. Returns the number of
    /// records dropped because the persistence queue was full.
    pub fn enqueue_persistence(&self, device_id: &str, records: Vec<Record>) -> usize {
        let entry = self.entry(device_id);
        let mut persistence_tx = entry.persistence_tx.lock().expect("persistence_tx lock poisoned");

        if persistence_tx.is_none() {
            let (tx, rx) = flume::bounded(self.queue_capacity);
            *persistence_tx = Some(tx);

            let store = self.store.clone();
            let counters = self.counters.clone();
            let tuning = self.persistence_tuning;
            let device_id_owned = device_id.to_string();
            let mut task_manager = self.task_manager.clone();
            let task_labels = TaskLabels::new("pipeline", "persistence", device_id);

            let join_handle = tokio::spawn(async move {
                let labels_for_cleanup = task_labels.clone();
                persistence::run(device_id_owned, rx, store, counters, tuning).await;
                TaskManager::no_task_cleaner(ProcessLabels::default(), labels_for_cleanup)
            });
            task_manager.register(join_handle, &TaskLabels::new("pipeline", "persistence", device_id));

            info!(device_id, "persistence worker started");
        }

        offer_one_at_a_time(persistence_tx.as_ref().expect("just initialized"), records)
    }
}

/// Offers each record to `sender` individually so that, on a full queue,
/// only the remainder (not already-accepted records) counts as loss.
/// Stops at the first failed offer, per the specification's "stop
/// enqueuing further records for this device in this tick" policy.
fn offer_one_at_a_time(sender: &flume::Sender<Vec<Record>>, records: Vec<Record>) -> usize {
    let mut remaining = records.into_iter();
    for record in remaining.by_ref() {
        if sender.try_send(vec![record]).is_err() {
            return 1 + remaining.count();
        }
    }
    0
}
