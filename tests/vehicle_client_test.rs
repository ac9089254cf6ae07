mod support;

use enyaq2mqtt::error::BridgeError;
use enyaq2mqtt::vehicle::VehicleClient;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use support::{MockConnectApi, credentials};

#[tokio::test]
async fn get_status_authenticates_lazily_and_returns_snapshot() {
    let api = Arc::new(MockConnectApi::default());
    let client = VehicleClient::new(credentials(), api.clone());

    let status = client.get_status().await.unwrap();

    assert_eq!(api.auth_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.status_calls.load(Ordering::SeqCst), 1);
    assert_eq!(status.battery.soc, 75);
    assert!(status.doors.locked);
}

#[tokio::test]
async fn write_operations_return_success_signal() {
    let api = Arc::new(MockConnectApi::default());
    let client = VehicleClient::new(credentials(), api.clone());

    assert!(client.start_charging().await.unwrap());
    assert!(client.stop_charging().await.unwrap());
    assert!(client.lock().await.unwrap());
    assert!(client.unlock().await.unwrap());

    assert_eq!(api.command_calls.load(Ordering::SeqCst), 4);
    // The hour-long token is reused across all four calls
    assert_eq!(api.auth_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn upstream_failure_wraps_as_vehicle_api_error() {
    let api = Arc::new(MockConnectApi::default());
    api.fail_status.store(true, Ordering::SeqCst);
    let client = VehicleClient::new(credentials(), api.clone());

    let err = client.get_status().await.unwrap_err();

    assert!(matches!(err, BridgeError::Api { .. }));
    assert!(err.to_string().contains("connection reset"));
}

#[tokio::test]
async fn failed_command_wraps_cause_and_keeps_token_state() {
    let api = Arc::new(MockConnectApi::default());
    let client = VehicleClient::new(credentials(), api.clone());

    // Establish a token first
    client.get_status().await.unwrap();

    api.fail_commands.store(true, Ordering::SeqCst);
    let err = client.lock().await.unwrap_err();
    assert!(matches!(err, BridgeError::Api { .. }));

    // A failed command does not disturb the token state
    let tokens = client.tokens();
    let guard = tokens.lock().await;
    assert!(guard.token_state().access_token.is_some());
    drop(guard);
    assert_eq!(api.auth_calls.load(Ordering::SeqCst), 1);
}
