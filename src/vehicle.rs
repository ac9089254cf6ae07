//! Vehicle status client for enyaq2mqtt
//!
//! This module provides the normalized vehicle state snapshot and the
//! client that wraps every upstream call behind a uniform result/error
//! contract, ensuring a valid token before each request.

use crate::error::{BridgeError, Result};
use crate::logging::get_logger;
use crate::skoda::{ConnectApi, Credentials, TokenManager};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Battery state as reported by the vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryStatus {
    /// State of charge percentage (0-100)
    pub soc: u8,

    /// Remaining range in kilometres
    pub range_km: f64,

    /// Whether the vehicle is currently charging
    pub charging: bool,

    /// Whether a charging cable is plugged in
    pub plugged_in: bool,
}

/// Door lock state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoorStatus {
    /// Whether the vehicle is locked
    pub locked: bool,
}

/// Complete vehicle state snapshot
///
/// Produced fresh on every successful fetch; each snapshot fully replaces
/// the previous one, both in the bridge's memory and on the state topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleStatus {
    pub battery: BatteryStatus,
    pub doors: DoorStatus,
    pub last_updated: DateTime<Utc>,
}

/// Client for vehicle reads and writes
///
/// Every operation calls `ensure_valid()` on the token manager first and
/// wraps upstream failures as vehicle API errors. Token state is never
/// mutated here; that is the token manager's exclusive responsibility.
pub struct VehicleClient {
    api: Arc<dyn ConnectApi>,
    tokens: Arc<Mutex<TokenManager>>,
    vin: String,
    logger: crate::logging::StructuredLogger,
}

impl VehicleClient {
    /// Create a new vehicle client owning a fresh token manager
    pub fn new(credentials: Credentials, api: Arc<dyn ConnectApi>) -> Self {
        let logger = get_logger("vehicle");
        let vin = credentials.vin.clone();
        let tokens = Arc::new(Mutex::new(TokenManager::new(credentials, api.clone())));
        Self {
            api,
            tokens,
            vin,
            logger,
        }
    }

    /// Shared handle to the token manager
    pub fn tokens(&self) -> Arc<Mutex<TokenManager>> {
        self.tokens.clone()
    }

    /// Perform the startup login
    pub async fn authenticate(&self) -> Result<()> {
        self.tokens.lock().await.authenticate().await
    }

    /// Fetch the current vehicle status
    pub async fn get_status(&self) -> Result<VehicleStatus> {
        let token = self.bearer().await?;
        self.api
            .get_status(&token, &self.vin)
            .await
            .map_err(|e| wrap_api("get_status", e))
    }

    /// Start vehicle charging. Returns true on success.
    pub async fn start_charging(&self) -> Result<bool> {
        let token = self.bearer().await?;
        self.logger.debug(&format!("Starting charging for {}", self.vin));
        self.api
            .start_charging(&token, &self.vin)
            .await
            .map_err(|e| wrap_api("start_charging", e))?;
        Ok(true)
    }

    /// Stop vehicle charging. Returns true on success.
    pub async fn stop_charging(&self) -> Result<bool> {
        let token = self.bearer().await?;
        self.logger.debug(&format!("Stopping charging for {}", self.vin));
        self.api
            .stop_charging(&token, &self.vin)
            .await
            .map_err(|e| wrap_api("stop_charging", e))?;
        Ok(true)
    }

    /// Lock the vehicle. Returns true on success.
    pub async fn lock(&self) -> Result<bool> {
        let token = self.bearer().await?;
        self.logger.debug(&format!("Locking {}", self.vin));
        self.api
            .lock(&token, &self.vin)
            .await
            .map_err(|e| wrap_api("lock", e))?;
        Ok(true)
    }

    /// Unlock the vehicle. Returns true on success.
    pub async fn unlock(&self) -> Result<bool> {
        let token = self.bearer().await?;
        self.logger.debug(&format!("Unlocking {}", self.vin));
        self.api
            .unlock(&token, &self.vin)
            .await
            .map_err(|e| wrap_api("unlock", e))?;
        Ok(true)
    }

    async fn bearer(&self) -> Result<String> {
        self.tokens.lock().await.ensure_valid().await
    }
}

/// Wrap upstream failures as vehicle API errors carrying the cause.
/// Auth errors pass through so steady-state policy can treat them.
fn wrap_api(op: &str, err: BridgeError) -> BridgeError {
    match err {
        e @ BridgeError::Auth { .. } => e,
        e @ BridgeError::Api { .. } => e,
        e => BridgeError::api(format!("{} failed: {}", op, e)),
    }
}
