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

//! The broker adapter: connects, subscribes to the device-data topics,
//! and bridges every delivery onto the raw [`ingress`] queue from the
//! client's own event-loop task. Publishing is limited to the control
//! echo topic used by the interactive endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ingress::IngressSender;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tracing::{debug, info, warn};

/// Monitoring topic, subscribed alongside the data topics.
pub const TOPIC_MONITOR: &str = "MON";
/// Base device-data topic.
pub const TOPIC_DEVICE_DATA: &str = "device_data";
/// Wildcard covering every per-device data subtopic.
pub const TOPIC_DEVICE_DATA_WILDCARD: &str = "device_data/#";
/// Topic the endpoint's slider control messages are echoed to.
pub const TOPIC_CONTROL_ECHO: &str = "PAR";

/// All the errors of this crate.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to subscribe to a topic.
    #[error("failed to subscribe to {topic}: {source}")]
    Subscribe {
        /// Topic that failed to subscribe.
        topic: &'static str,
        /// Underlying client error.
        source: rumqttc::ClientError,
    },
    /// Failed to publish a control message.
    #[error("failed to publish to {topic}: {source}")]
    Publish {
        /// Topic that failed to publish.
        topic: &'static str,
        /// Underlying client error.
        source: rumqttc::ClientError,
    },
}

/// A connected broker adapter. Cheap to clone; every clone shares the same
/// underlying client handle.
#[derive(Clone)]
pub struct BrokerAdapter {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
}

impl BrokerAdapter {
    /// Connects to the broker at `host:port` with a stable, non-clean
    /// session so the broker retains the subscription and any
    /// at-least-once messages across reconnects. Spawns the event-loop
    /// poll task, which pushes every delivery onto `ingress` and returns
    /// once subscriptions are established.
    pub async fn connect(
        host: &str,
        port: u16,
        client_id: &str,
        ingress: IngressSender,
    ) -> Result<Self, Error> {
        let mut options = MqttOptions::new(client_id, host, port);
        let _ = options
            .set_keep_alive(Duration::from_secs(30))
            .set_clean_session(false)
            .set_max_packet_size(16 * 1024 * 1024, 16 * 1024 * 1024);

        let (client, mut event_loop) = AsyncClient::new(options, 256);

        client
            .subscribe(TOPIC_MONITOR, QoS::AtLeastOnce)
            .await
            .map_err(|source| Error::Subscribe {
                topic: TOPIC_MONITOR,
                source,
            })?;
        client
            .subscribe(TOPIC_DEVICE_DATA, QoS::AtLeastOnce)
            .await
            .map_err(|source| Error::Subscribe {
                topic: TOPIC_DEVICE_DATA,
                source,
            })?;
        client
            .subscribe(TOPIC_DEVICE_DATA_WILDCARD, QoS::AtLeastOnce)
            .await
            .map_err(|source| Error::Subscribe {
                topic: TOPIC_DEVICE_DATA_WILDCARD,
                source,
            })?;

        let connected = Arc::new(AtomicBool::new(false));
        let connected_for_task = connected.clone();

        let _join_handle = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        connected_for_task.store(true, Ordering::Relaxed);
                        info!("broker connection established");
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if let Err(payload) = ingress.offer(publish.payload.to_vec()) {
                            warn!(bytes = payload.len(), "ingress queue has no consumer, dropping delivery");
                        }
                    }
                    Ok(_other) => {
                        debug!("broker event");
                    }
                    Err(err) => {
                        connected_for_task.store(false, Ordering::Relaxed);
                        warn!(error = %err, "broker connection error, retrying");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok(Self { client, connected })
    }

    /// Returns whether the broker connection is currently considered up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Publishes a slider control echo at-least-once to [`TOPIC_CONTROL_ECHO`].
    pub async fn publish_control(&self, payload: Vec<u8>) -> Result<(), Error> {
        self.client
            .publish(TOPIC_CONTROL_ECHO, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|source| Error::Publish {
                topic: TOPIC_CONTROL_ECHO,
                source,
            })
    }
}
