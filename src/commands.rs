//! Command dispatch for inbound MQTT messages
//!
//! Maps command names arriving on `<prefix>/cmd/<command>` to handler
//! objects. Handlers are explicit structs holding their dependencies, so
//! they can be constructed and exercised in isolation.

use crate::error::Result;
use crate::logging::get_logger;
use crate::vehicle::VehicleClient;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A registered command handler
///
/// The payload is passed through unparsed; handlers decide what, if
/// anything, to make of it.
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> Result<()>;
}

/// Name-to-handler mapping, populated once at startup
pub struct CommandDispatcher {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
    logger: crate::logging::StructuredLogger,
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandDispatcher {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        let logger = get_logger("commands");
        Self {
            handlers: HashMap::new(),
            logger,
        }
    }

    /// Associate a command name with a handler. Re-registering the same
    /// name overwrites the previous handler.
    pub fn register(&mut self, name: &str, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(name.to_string(), handler);
        self.logger
            .info(&format!("Registered handler for command: {}", name));
    }

    /// Whether a handler is registered for the given command name
    pub fn is_registered(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Dispatch a command to its handler. Unknown commands are logged and
    /// dropped. A handler failure is caught and logged here; it never
    /// propagates to the caller. Returns whether a handler ran.
    pub async fn dispatch(&self, name: &str, payload: &[u8]) -> bool {
        let Some(handler) = self.handlers.get(name) else {
            self.logger
                .warn(&format!("No handler registered for command: {}", name));
            return false;
        };

        self.logger.info(&format!("Handling command: {}", name));
        if let Err(e) = handler.handle(payload).await {
            self.logger
                .error(&format!("Command {} failed: {}", name, e));
        }
        true
    }
}

/// Vehicle operation a command maps onto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleAction {
    StartCharging,
    StopCharging,
    Lock,
    Unlock,
}

impl VehicleAction {
    /// The command name this action is registered under
    pub fn command_name(self) -> &'static str {
        match self {
            VehicleAction::StartCharging => "start_charging",
            VehicleAction::StopCharging => "stop_charging",
            VehicleAction::Lock => "lock",
            VehicleAction::Unlock => "unlock",
        }
    }
}

/// Handler invoking a single vehicle operation
///
/// After the operation, successful or not, a status refresh is requested
/// so observers see the effect (or its absence) without waiting for the
/// next poll tick.
pub struct VehicleCommandHandler {
    action: VehicleAction,
    client: Arc<VehicleClient>,
    refresh_tx: mpsc::UnboundedSender<()>,
}

impl VehicleCommandHandler {
    pub fn new(
        action: VehicleAction,
        client: Arc<VehicleClient>,
        refresh_tx: mpsc::UnboundedSender<()>,
    ) -> Self {
        Self {
            action,
            client,
            refresh_tx,
        }
    }
}

#[async_trait::async_trait]
impl CommandHandler for VehicleCommandHandler {
    async fn handle(&self, _payload: &[u8]) -> Result<()> {
        let result = match self.action {
            VehicleAction::StartCharging => self.client.start_charging().await,
            VehicleAction::StopCharging => self.client.stop_charging().await,
            VehicleAction::Lock => self.client.lock().await,
            VehicleAction::Unlock => self.client.unlock().await,
        };

        // Best-effort refresh request on success and failure alike
        let _ = self.refresh_tx.send(());

        result.map(|_| ())
    }
}

/// Register the four vehicle command handlers
pub fn register_vehicle_handlers(
    dispatcher: &mut CommandDispatcher,
    client: &Arc<VehicleClient>,
    refresh_tx: &mpsc::UnboundedSender<()>,
) {
    for action in [
        VehicleAction::StartCharging,
        VehicleAction::StopCharging,
        VehicleAction::Lock,
        VehicleAction::Unlock,
    ] {
        dispatcher.register(
            action.command_name(),
            Arc::new(VehicleCommandHandler::new(
                action,
                client.clone(),
                refresh_tx.clone(),
            )),
        );
    }
}
