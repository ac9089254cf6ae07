//! MQTT transport for enyaq2mqtt
//!
//! Wraps the rumqttc async client behind the [`VehicleBus`] publish
//! surface and translates broker traffic into [`BusEvent`]s for the
//! bridge. Reconnection is handled here: the event-loop task keeps
//! polling through connection errors, re-subscribes on every ConnAck and
//! signals the bridge so availability can be republished.

use crate::config::MqttConfig;
use crate::error::Result;
use crate::logging::get_logger;
use crate::vehicle::VehicleStatus;
use rumqttc::{AsyncClient, Event, Incoming, LastWill, MqttOptions, QoS};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;

/// Delay before re-polling the event loop after a connection error
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Events surfaced to the bridge
#[derive(Debug)]
pub enum BusEvent {
    /// Broker connection established (initial connect and reconnects)
    Connected,

    /// A message arrived on a command topic
    Command { name: String, payload: Vec<u8> },
}

/// Publish surface the bridge drives
///
/// A trait seam so orchestrator tests can substitute a recording bus.
#[async_trait::async_trait]
pub trait VehicleBus: Send + Sync {
    /// Publish the full state snapshot, retained
    async fn publish_state(&self, status: &VehicleStatus) -> Result<()>;

    /// Publish `online`/`offline` on the availability topic, retained
    async fn publish_availability(&self, online: bool) -> Result<()>;

    /// Publish discovery documents, retained, one per topic
    async fn publish_discovery(
        &self,
        configs: &BTreeMap<String, serde_json::Value>,
    ) -> Result<()>;

    /// Disconnect from the broker
    async fn disconnect(&self) -> Result<()>;
}

/// rumqttc-backed bus client
pub struct MqttBus {
    client: AsyncClient,
    topic_prefix: String,
    logger: crate::logging::StructuredLogger,
}

impl MqttBus {
    /// Create the client and spawn its event-loop task.
    ///
    /// The returned receiver yields [`BusEvent`]s; the connection itself is
    /// established lazily by the event loop, and the first
    /// [`BusEvent::Connected`] marks it ready.
    pub fn connect(config: &MqttConfig) -> (Self, mpsc::UnboundedReceiver<BusEvent>) {
        let logger = get_logger("mqtt");
        let topic_prefix = config.topic_prefix.trim_end_matches('/').to_string();

        let mut options =
            MqttOptions::new(config.client_id.clone(), config.broker.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(60));
        if !config.username.is_empty() {
            options.set_credentials(config.username.clone(), config.password.clone());
        }
        // Broker-side offline marker for ungraceful death
        options.set_last_will(LastWill::new(
            format!("{}/availability", topic_prefix),
            "offline",
            QoS::AtLeastOnce,
            true,
        ));

        let (client, mut eventloop) = AsyncClient::new(options, 32);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        logger.info(&format!(
            "Connecting to MQTT broker at {}:{}",
            config.broker, config.port
        ));

        let task_client = client.clone();
        let task_logger = logger.clone();
        let command_filter = format!("{}/cmd/#", topic_prefix);
        let prefix = topic_prefix.clone();
        tokio::spawn(async move {
            loop {
                if events_tx.is_closed() {
                    break;
                }
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        task_logger.info("Connected to MQTT broker");
                        if let Err(e) = task_client
                            .subscribe(command_filter.as_str(), QoS::AtLeastOnce)
                            .await
                        {
                            task_logger.error(&format!(
                                "Failed to subscribe to {}: {}",
                                command_filter, e
                            ));
                        } else {
                            task_logger.info(&format!("Subscribed to {}", command_filter));
                        }
                        let _ = events_tx.send(BusEvent::Connected);
                    }
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        if let Some(name) = command_name(&prefix, &publish.topic) {
                            let _ = events_tx.send(BusEvent::Command {
                                name: name.to_string(),
                                payload: publish.payload.to_vec(),
                            });
                        } else {
                            task_logger.debug(&format!(
                                "Ignoring message on unrelated topic: {}",
                                publish.topic
                            ));
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        task_logger.warn(&format!("MQTT connection error: {}", e));
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        });

        (
            Self {
                client,
                topic_prefix,
                logger,
            },
            events_rx,
        )
    }

    fn state_topic(&self) -> String {
        format!("{}/state", self.topic_prefix)
    }

    fn availability_topic(&self) -> String {
        format!("{}/availability", self.topic_prefix)
    }
}

#[async_trait::async_trait]
impl VehicleBus for MqttBus {
    async fn publish_state(&self, status: &VehicleStatus) -> Result<()> {
        let payload = serde_json::to_vec(status)?;
        self.client
            .publish(self.state_topic(), QoS::AtLeastOnce, true, payload)
            .await?;
        self.logger.debug("Published vehicle state");
        Ok(())
    }

    async fn publish_availability(&self, online: bool) -> Result<()> {
        let status = if online { "online" } else { "offline" };
        self.client
            .publish(self.availability_topic(), QoS::AtLeastOnce, true, status)
            .await?;
        self.logger
            .info(&format!("Published availability: {}", status));
        Ok(())
    }

    async fn publish_discovery(
        &self,
        configs: &BTreeMap<String, serde_json::Value>,
    ) -> Result<()> {
        for (topic, config) in configs {
            let payload = serde_json::to_vec(config)?;
            self.client
                .publish(topic.as_str(), QoS::AtLeastOnce, true, payload)
                .await?;
            self.logger
                .debug(&format!("Published discovery config to {}", topic));
        }
        self.logger.info(&format!(
            "Published {} discovery configurations",
            configs.len()
        ));
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.logger.info("Disconnecting from MQTT broker");
        self.client.disconnect().await?;
        Ok(())
    }
}

/// Extract the command name from a topic under `<prefix>/cmd/`
fn command_name<'a>(prefix: &str, topic: &'a str) -> Option<&'a str> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix("/cmd/")?;
    if rest.is_empty() { None } else { Some(rest) }
}
