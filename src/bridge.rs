//! Core bridge orchestration for enyaq2mqtt
//!
//! This module contains the main state machine and orchestration logic:
//! the timed poll loop, inbound command dispatch, out-of-band refreshes
//! after commands, and the ordered shutdown sequence. Nothing that goes
//! wrong inside a poll iteration or a command handler is allowed past
//! this boundary; only startup failures propagate to the process entry
//! point.

use crate::commands::{CommandDispatcher, register_vehicle_handlers};
use crate::config::Config;
use crate::discovery::{DeviceInfo, DiscoveryBuilder};
use crate::error::{BridgeError, Result};
use crate::logging::get_logger;
use crate::mqtt::{BusEvent, MqttBus, VehicleBus};
use crate::skoda::{ConnectApi, Credentials};
use crate::vehicle::{VehicleClient, VehicleStatus};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, Instant, sleep_until};

/// Bridge lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Constructed, not yet started
    Created,
    /// Logging in against the upstream API
    Authenticating,
    /// Waiting for the broker session
    Connecting,
    /// Poll loop active
    Running,
    /// Shutdown sequence in progress
    Stopping,
    /// Shutdown complete
    Stopped,
}

/// Clonable handle to request bridge shutdown
///
/// Requesting a stop on an already stopped (or never started) bridge is
/// a no-op.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl ShutdownHandle {
    /// Ask the bridge to stop at its next suspension point
    pub fn request_stop(&self) {
        let _ = self.tx.send(());
    }
}

/// Main bridge orchestrator
pub struct EnyaqBridge {
    /// Configuration
    config: Config,

    /// Current lifecycle state
    state: watch::Sender<BridgeState>,

    /// Logger with context
    logger: crate::logging::StructuredLogger,

    /// Vehicle status client (shared with command handlers)
    client: Arc<VehicleClient>,

    /// Inbound command dispatch
    dispatcher: CommandDispatcher,

    /// Latest snapshot; always overwritten before a publish
    snapshot: Option<VehicleStatus>,

    /// Shutdown signal
    shutdown_tx: mpsc::UnboundedSender<()>,
    shutdown_rx: mpsc::UnboundedReceiver<()>,

    /// Out-of-band refresh requests from command handlers
    refresh_rx: mpsc::UnboundedReceiver<()>,

    /// Discovery is published once per process, not per reconnect
    discovery_published: bool,

    /// Poll attempt counters
    total_polls: u64,
    failed_polls: u64,
}

impl EnyaqBridge {
    /// Create a new bridge instance
    pub fn new(config: Config, api: Arc<dyn ConnectApi>) -> Self {
        let logger = get_logger("bridge");
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(BridgeState::Created);

        let credentials = Credentials {
            username: config.skoda.username.clone(),
            password: config.skoda.password.clone(),
            vin: config.skoda.vin.clone(),
        };
        let client = Arc::new(VehicleClient::new(credentials, api));

        let mut dispatcher = CommandDispatcher::new();
        register_vehicle_handlers(&mut dispatcher, &client, &refresh_tx);

        Self {
            config,
            state,
            logger,
            client,
            dispatcher,
            snapshot: None,
            shutdown_tx,
            shutdown_rx,
            refresh_rx,
            discovery_published: false,
            total_polls: 0,
            failed_polls: 0,
        }
    }

    /// Handle for requesting shutdown from signal listeners or embedders
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Observe lifecycle state transitions
    pub fn state_watch(&self) -> watch::Receiver<BridgeState> {
        self.state.subscribe()
    }

    /// Latest cached snapshot, if any poll has succeeded
    pub fn snapshot(&self) -> Option<&VehicleStatus> {
        self.snapshot.as_ref()
    }

    /// Start the bridge: authenticate, connect and run until stopped
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info("Starting Skoda MQTT bridge");
        self.logger.info(&format!("Configuration: {}", self.config.summary()));

        self.set_state(BridgeState::Authenticating);
        self.client.authenticate().await?;

        let (bus, events) = MqttBus::connect(&self.config.mqtt);
        self.run_with_bus(Box::new(bus), events).await
    }

    /// Run against an already constructed bus. The shutdown sequence
    /// (availability offline, then disconnect) executes on every exit
    /// path, including errors.
    pub async fn run_with_bus(
        &mut self,
        bus: Box<dyn VehicleBus>,
        mut events: mpsc::UnboundedReceiver<BusEvent>,
    ) -> Result<()> {
        self.set_state(BridgeState::Connecting);
        let result = self.drive(bus.as_ref(), &mut events).await;

        self.set_state(BridgeState::Stopping);
        self.shutdown_sequence(bus.as_ref()).await;
        self.set_state(BridgeState::Stopped);

        result
    }

    /// Wait for the broker session, publish the connect-time documents,
    /// then run the poll loop until shutdown.
    async fn drive(
        &mut self,
        bus: &dyn VehicleBus,
        events: &mut mpsc::UnboundedReceiver<BusEvent>,
    ) -> Result<()> {
        // Nothing is published before the broker session exists, so the
        // retained availability flag always precedes the first snapshot.
        loop {
            tokio::select! {
                maybe = events.recv() => match maybe {
                    Some(BusEvent::Connected) => break,
                    Some(_) => {}
                    None => return Err(BridgeError::mqtt("bus event channel closed during connect")),
                },
                _ = self.shutdown_rx.recv() => {
                    self.logger.info("Shutdown requested before broker session was ready");
                    return Ok(());
                }
            }
        }

        bus.publish_availability(true).await?;

        if self.config.discovery.enabled && !self.discovery_published {
            let device = DeviceInfo::from_config(&self.config.device, &self.config.skoda.vin);
            let builder = DiscoveryBuilder::new(
                device,
                &self.config.mqtt.topic_prefix,
                &self.config.discovery.prefix,
            );
            bus.publish_discovery(&builder.build()).await?;
            self.discovery_published = true;
        }

        self.set_state(BridgeState::Running);
        self.logger.info(&format!(
            "Entering poll loop (interval: {}s, cooldown: {}s)",
            self.config.poll_interval_secs, self.config.error_cooldown_secs
        ));

        let poll_interval = Duration::from_secs(self.config.poll_interval_secs);
        let cooldown = Duration::from_secs(self.config.error_cooldown_secs);
        let mut next_poll = Instant::now();

        loop {
            tokio::select! {
                _ = sleep_until(next_poll) => {
                    self.total_polls = self.total_polls.saturating_add(1);
                    match self.poll_cycle(bus).await {
                        Ok(()) => {
                            next_poll = Instant::now() + poll_interval;
                        }
                        Err(e) => {
                            self.failed_polls = self.failed_polls.saturating_add(1);
                            self.logger.error(&format!(
                                "Poll cycle failed ({} of {} attempts): {}; retrying in {}s",
                                self.failed_polls,
                                self.total_polls,
                                e,
                                cooldown.as_secs()
                            ));
                            next_poll = Instant::now() + cooldown;
                        }
                    }
                }
                maybe = events.recv() => match maybe {
                    Some(BusEvent::Connected) => {
                        // Broker session re-established: the retained flags
                        // may predate the reconnect, so publish them again
                        self.logger.info("Broker session re-established");
                        if let Err(e) = bus.publish_availability(true).await {
                            self.logger.warn(&format!("Availability republish failed: {}", e));
                        }
                        if let Some(snapshot) = self.snapshot.clone()
                            && let Err(e) = bus.publish_state(&snapshot).await
                        {
                            self.logger.warn(&format!("Snapshot republish failed: {}", e));
                        }
                    }
                    Some(BusEvent::Command { name, payload }) => {
                        // Handlers request their own refresh; the poll
                        // timer is left untouched
                        self.dispatcher.dispatch(&name, &payload).await;
                    }
                    None => {
                        return Err(BridgeError::mqtt("bus event channel closed"));
                    }
                },
                Some(()) = self.refresh_rx.recv() => {
                    self.logger.debug("Out-of-band status refresh requested");
                    if let Err(e) = self.poll_cycle(bus).await {
                        self.logger.warn(&format!("Post-command refresh failed: {}", e));
                    }
                }
                _ = self.shutdown_rx.recv() => {
                    self.logger.info("Shutdown signal received");
                    return Ok(());
                }
            }
        }
    }

    /// Single poll cycle: fetch, cache, publish
    async fn poll_cycle(&mut self, bus: &dyn VehicleBus) -> Result<()> {
        self.logger.debug("Fetching vehicle status");
        let status = self.client.get_status().await?;

        // Cache before publish: the in-memory snapshot is never behind
        // what subscribers have seen
        self.snapshot = Some(status.clone());
        bus.publish_state(&status).await?;

        self.logger.debug(&format!(
            "Published snapshot: soc={}% range={}km charging={} plugged_in={} locked={}",
            status.battery.soc,
            status.battery.range_km,
            status.battery.charging,
            status.battery.plugged_in,
            status.doors.locked
        ));
        Ok(())
    }

    /// Ordered shutdown: availability offline strictly before disconnect
    async fn shutdown_sequence(&mut self, bus: &dyn VehicleBus) {
        self.logger.info("Stopping Skoda MQTT bridge");

        if let Err(e) = bus.publish_availability(false).await {
            self.logger
                .warn(&format!("Failed to publish offline availability: {}", e));
        }
        if let Err(e) = bus.disconnect().await {
            self.logger.warn(&format!("Disconnect failed: {}", e));
        }

        self.logger.info("Skoda MQTT bridge stopped");
    }

    fn set_state(&mut self, new_state: BridgeState) {
        self.logger.debug(&format!("State transition: {:?}", new_state));
        self.state.send(new_state).ok();
    }
}
