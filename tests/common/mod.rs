//! Shared test doubles for the cross-crate scenarios: an in-memory
//! connection sink collecting every frame it is sent, and an in-memory
//! store recording every row without touching a real database.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use model::Record;
use store::{DeviceDataRow, Store};

/// A [`pipeline::ConnectionSink`] that records every frame it receives,
/// standing in for a real WebSocket connection.
#[derive(Clone, Default)]
pub struct CollectingSink {
    pub frames: Arc<Mutex<Vec<Vec<u8>>>>,
    alive: Arc<std::sync::atomic::AtomicBool>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self {
            frames: Arc::new(Mutex::new(Vec::new())),
            alive: Arc::new(std::sync::atomic::AtomicBool::new(true)),
        }
    }

    pub fn close(&self) {
        self.alive.store(false, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn sent_count(&self) -> usize {
        self.frames.lock().expect("frames lock poisoned").len()
    }
}

impl pipeline::ConnectionSink for CollectingSink {
    fn send(&self, frame: Arc<[u8]>) -> bool {
        if !self.alive.load(std::sync::atomic::Ordering::Relaxed) {
            return false;
        }
        self.frames.lock().expect("frames lock poisoned").push(frame.to_vec());
        true
    }
}

/// An in-memory [`Store`] recording every device row and data batch,
/// standing in for a real relational database in these scenarios.
#[derive(Default)]
pub struct FakeStore {
    pub devices: Mutex<Vec<String>>,
    pub rows: Mutex<Vec<DeviceDataRow>>,
}

#[async_trait]
impl Store for FakeStore {
    async fn ensure_device(&self, device_id: &str, _device_token: Option<&str>) -> Result<(), store::Error> {
        self.devices.lock().expect("devices lock poisoned").push(device_id.to_string());
        Ok(())
    }

    async fn insert_device_data_batch(&self, rows: &[DeviceDataRow]) -> Result<(), store::Error> {
        self.rows.lock().expect("rows lock poisoned").extend_from_slice(rows);
        Ok(())
    }

    async fn save_client_session(&self, _client_id: &str, _websocket_id: &str) -> Result<(), store::Error> {
        Ok(())
    }

    async fn mark_client_disconnected(&self, _client_id: &str) -> Result<(), store::Error> {
        Ok(())
    }
}

/// Builds a single JSON record matching the wire shape `model::Record`
/// deserializes from a broker delivery.
pub fn record_json(device_id: &str, message_id: i64) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "device_id": device_id,
        "timestamp": "2024-12-04T12:00:00Z",
        "displacement": 1.0,
        "force": 2.0,
        "message_id": message_id,
    }))
    .expect("record json must serialize")
}

/// Builds a single JSON record with an arbitrary (possibly unparseable)
/// `timestamp`, to exercise decode/broadcast behavior independently of
/// whether the instant is valid.
pub fn record_json_with_timestamp(device_id: &str, message_id: i64, timestamp: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "device_id": device_id,
        "timestamp": timestamp,
        "displacement": 1.0,
        "force": 2.0,
        "message_id": message_id,
    }))
    .expect("record json must serialize")
}

/// Builds a JSON array of `count` records for `device_id`, with
/// `message_id` running from 1 to `count` in order.
pub fn batch_json(device_id: &str, count: i64) -> Vec<u8> {
    let records: Vec<_> = (1..=count)
        .map(|message_id| {
            serde_json::json!({
                "device_id": device_id,
                "timestamp": "2024-12-04T12:00:00Z",
                "displacement": 1.0,
                "force": 2.0,
                "message_id": message_id,
            })
        })
        .collect();
    serde_json::to_vec(&records).expect("batch json must serialize")
}

pub fn record(device_id: &str, message_id: i64) -> Record {
    Record {
        device_id: device_id.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        displacement: 1.0,
        force: 2.0,
        device_token: None,
        message_id: Some(message_id),
    }
}
