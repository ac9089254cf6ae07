//! Shared fakes for integration tests
#![allow(dead_code)]

use enyaq2mqtt::error::{BridgeError, Result};
use enyaq2mqtt::mqtt::VehicleBus;
use enyaq2mqtt::skoda::{ConnectApi, Credentials, TokenGrant};
use enyaq2mqtt::vehicle::{BatteryStatus, DoorStatus, VehicleStatus};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Counting fake for the upstream API with injectable failures
#[derive(Default)]
pub struct MockConnectApi {
    pub auth_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub command_calls: AtomicUsize,

    /// Lifetime of grants handed out; 0 falls back to 3600
    pub grant_expires_in_secs: AtomicI64,
    /// Whether authentication grants carry a refresh token
    pub grant_without_refresh_token: AtomicBool,

    pub fail_refresh: AtomicBool,
    pub fail_status: AtomicBool,
    pub fail_commands: AtomicBool,
}

impl MockConnectApi {
    pub fn with_expiry(expires_in_secs: i64) -> Self {
        let api = Self::default();
        api.grant_expires_in_secs
            .store(expires_in_secs, Ordering::SeqCst);
        api
    }

    fn expires_in(&self) -> i64 {
        match self.grant_expires_in_secs.load(Ordering::SeqCst) {
            0 => 3600,
            secs => secs,
        }
    }
}

pub fn mock_status() -> VehicleStatus {
    VehicleStatus {
        battery: BatteryStatus {
            soc: 75,
            range_km: 280.0,
            charging: false,
            plugged_in: true,
        },
        doors: DoorStatus { locked: true },
        last_updated: chrono::Utc::now(),
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        username: "user@example.com".to_string(),
        password: "secret".to_string(),
        vin: "TMBJB9NY0MF000000".to_string(),
    }
}

#[async_trait::async_trait]
impl ConnectApi for MockConnectApi {
    async fn authenticate(&self, _credentials: &Credentials) -> Result<TokenGrant> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        let refresh_token = if self.grant_without_refresh_token.load(Ordering::SeqCst) {
            None
        } else {
            Some("refresh-token".to_string())
        };
        Ok(TokenGrant {
            access_token: "access-token".to_string(),
            refresh_token,
            expires_in_secs: self.expires_in(),
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(BridgeError::auth("refresh token rejected"));
        }
        Ok(TokenGrant {
            access_token: "refreshed-access-token".to_string(),
            refresh_token: None,
            expires_in_secs: self.expires_in(),
        })
    }

    async fn get_status(&self, _access_token: &str, _vin: &str) -> Result<VehicleStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(BridgeError::network("connection reset by upstream"));
        }
        Ok(mock_status())
    }

    async fn start_charging(&self, _access_token: &str, _vin: &str) -> Result<()> {
        self.command_call()
    }

    async fn stop_charging(&self, _access_token: &str, _vin: &str) -> Result<()> {
        self.command_call()
    }

    async fn lock(&self, _access_token: &str, _vin: &str) -> Result<()> {
        self.command_call()
    }

    async fn unlock(&self, _access_token: &str, _vin: &str) -> Result<()> {
        self.command_call()
    }
}

impl MockConnectApi {
    fn command_call(&self) -> Result<()> {
        self.command_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(BridgeError::network("command rejected by upstream"));
        }
        Ok(())
    }
}

/// Bus fake that records operations in order
#[derive(Default)]
pub struct RecordingBus {
    pub ops: Arc<Mutex<Vec<String>>>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, op: String) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait::async_trait]
impl VehicleBus for RecordingBus {
    async fn publish_state(&self, status: &VehicleStatus) -> Result<()> {
        self.record(format!(
            "state soc={} charging={}",
            status.battery.soc, status.battery.charging
        ));
        Ok(())
    }

    async fn publish_availability(&self, online: bool) -> Result<()> {
        self.record(format!(
            "availability {}",
            if online { "online" } else { "offline" }
        ));
        Ok(())
    }

    async fn publish_discovery(
        &self,
        configs: &BTreeMap<String, serde_json::Value>,
    ) -> Result<()> {
        self.record(format!("discovery {}", configs.len()));
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.record("disconnect".to_string());
        Ok(())
    }
}

/// Wait until the recorded ops satisfy a predicate, or panic after the
/// timeout. Returns a snapshot of the ops.
pub async fn wait_for_ops<F>(ops: &Arc<Mutex<Vec<String>>>, timeout_secs: u64, pred: F) -> Vec<String>
where
    F: Fn(&[String]) -> bool,
{
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(timeout_secs);
    loop {
        {
            let snapshot = ops.lock().unwrap();
            if pred(&snapshot) {
                return snapshot.clone();
            }
        }
        if std::time::Instant::now() > deadline {
            let snapshot = ops.lock().unwrap().clone();
            panic!("timed out waiting for bus ops, recorded: {:?}", snapshot);
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}
