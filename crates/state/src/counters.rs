//! Process-wide atomic counters, one accumulator per observable stage.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A single named accumulator. Updates are lock-free and may be observed
/// concurrently from any task.
#[derive(Debug, Default)]
struct Counter(AtomicU64);

impl Counter {
    fn add(&self, n: u64) {
        let _ = self.0.fetch_add(n, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters observed across the data plane. Every field is independently
/// atomic; a `snapshot` is a point-in-time read of each field, not a
/// transactionally consistent view across fields.
#[derive(Debug)]
pub struct Counters {
    mqtt_received: Counter,
    mqtt_parsed: Counter,
    mqtt_errors: Counter,
    device_queued: Counter,
    device_processed: Counter,
    broadcast_sent: Counter,
    broadcast_errors: Counter,
    db_saved: Counter,
    db_errors: Counter,
    loss_parse: Counter,
    loss_device_queue_full: Counter,
    loss_save_queue_full: Counter,
    started_at: Instant,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            mqtt_received: Counter::default(),
            mqtt_parsed: Counter::default(),
            mqtt_errors: Counter::default(),
            device_queued: Counter::default(),
            device_processed: Counter::default(),
            broadcast_sent: Counter::default(),
            broadcast_errors: Counter::default(),
            db_saved: Counter::default(),
            db_errors: Counter::default(),
            loss_parse: Counter::default(),
            loss_device_queue_full: Counter::default(),
            loss_save_queue_full: Counter::default(),
            started_at: Instant::now(),
        }
    }
}

/// A point-in-time read of every counter, plus rates derived from the
/// process uptime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    /// Raw payloads received from the broker.
    pub mqtt_received: u64,
    /// Raw payloads (or individual records within a batch) parsed cleanly.
    pub mqtt_parsed: u64,
    /// Payloads or records dropped due to a parse error.
    pub mqtt_errors: u64,
    /// Records successfully enqueued onto a per-device pipeline.
    pub device_queued: u64,
    /// Records dequeued and processed by a per-device pipeline.
    pub device_processed: u64,
    /// Records included in a successfully sent broadcast batch.
    pub broadcast_sent: u64,
    /// Per-connection broadcast send failures.
    pub broadcast_errors: u64,
    /// Records committed to the store.
    pub db_saved: u64,
    /// Records that failed to commit to the store.
    pub db_errors: u64,
    /// Records dropped because the outer payload failed to parse.
    pub loss_parse: u64,
    /// Records dropped because a device broadcast queue was full.
    pub loss_device_queue_full: u64,
    /// Records dropped because a device persistence queue was full.
    pub loss_save_queue_full: u64,
    /// Seconds elapsed since the counters were created.
    pub uptime_secs: f64,
}

impl Snapshot {
    /// Records received per second over the observed uptime.
    pub fn received_rate(&self) -> f64 {
        if self.uptime_secs <= 0.0 {
            0.0
        } else {
            self.mqtt_received as f64 / self.uptime_secs
        }
    }
}

impl Counters {
    /// Creates a fresh counter set, started now.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the raw-received counter.
    pub fn inc_received(&self, n: u64) {
        self.mqtt_received.add(n);
    }

    /// Increments the parsed counter.
    pub fn inc_parsed(&self, n: u64) {
        self.mqtt_parsed.add(n);
    }

    /// Increments the parse-error counter.
    pub fn inc_parse_error(&self, n: u64) {
        self.mqtt_errors.add(n);
        self.loss_parse.add(n);
    }

    /// Increments the device-queued counter.
    pub fn inc_device_queued(&self, n: u64) {
        self.device_queued.add(n);
    }

    /// Increments the device-processed counter.
    pub fn inc_device_processed(&self, n: u64) {
        self.device_processed.add(n);
    }

    /// Increments the broadcast-sent counter.
    pub fn inc_broadcast_sent(&self, n: u64) {
        self.broadcast_sent.add(n);
    }

    /// Increments the broadcast-error counter.
    pub fn inc_broadcast_errors(&self, n: u64) {
        self.broadcast_errors.add(n);
    }

    /// Increments the db-saved counter.
    pub fn inc_db_saved(&self, n: u64) {
        self.db_saved.add(n);
    }

    /// Increments the db-error counter.
    pub fn inc_db_errors(&self, n: u64) {
        self.db_errors.add(n);
    }

    /// Increments the device-queue-full loss counter.
    pub fn inc_loss_device_queue_full(&self, n: u64) {
        self.loss_device_queue_full.add(n);
    }

    /// Increments the save-queue-full loss counter.
    pub fn inc_loss_save_queue_full(&self, n: u64) {
        self.loss_save_queue_full.add(n);
    }

    /// Takes a point-in-time snapshot of every counter.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            mqtt_received: self.mqtt_received.get(),
            mqtt_parsed: self.mqtt_parsed.get(),
            mqtt_errors: self.mqtt_errors.get(),
            device_queued: self.device_queued.get(),
            device_processed: self.device_processed.get(),
            broadcast_sent: self.broadcast_sent.get(),
            broadcast_errors: self.broadcast_errors.get(),
            db_saved: self.db_saved.get(),
            db_errors: self.db_errors.get(),
            loss_parse: self.loss_parse.get(),
            loss_device_queue_full: self.loss_device_queue_full.get(),
            loss_save_queue_full: self.loss_save_queue_full.get(),
            uptime_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}
