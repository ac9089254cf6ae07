mod support;

use enyaq2mqtt::skoda::TokenManager;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use support::{MockConnectApi, credentials};

#[tokio::test]
async fn authenticate_populates_token_state() {
    let api = Arc::new(MockConnectApi::default());
    let mut tokens = TokenManager::new(credentials(), api.clone());

    tokens.authenticate().await.unwrap();

    assert_eq!(api.auth_calls.load(Ordering::SeqCst), 1);
    let state = tokens.token_state();
    assert!(state.access_token.is_some());
    assert!(state.refresh_token.is_some());
    // Invariant: a present access token always has an expiry
    assert!(state.expires_at.is_some());
}

#[tokio::test]
async fn ensure_valid_authenticates_when_no_token_exists() {
    let api = Arc::new(MockConnectApi::default());
    let mut tokens = TokenManager::new(credentials(), api.clone());

    let token = tokens.ensure_valid().await.unwrap();

    assert_eq!(token, "access-token");
    assert_eq!(api.auth_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn ensure_valid_is_noop_while_token_has_margin() {
    // Grants live for an hour, well beyond the 5-minute margin
    let api = Arc::new(MockConnectApi::default());
    let mut tokens = TokenManager::new(credentials(), api.clone());
    tokens.authenticate().await.unwrap();

    for _ in 0..3 {
        tokens.ensure_valid().await.unwrap();
    }

    assert_eq!(api.auth_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn ensure_valid_refreshes_inside_the_margin() {
    // Two-minute grants expire within the 5-minute safety margin
    let api = Arc::new(MockConnectApi::with_expiry(120));
    let mut tokens = TokenManager::new(credentials(), api.clone());
    tokens.authenticate().await.unwrap();

    let token = tokens.ensure_valid().await.unwrap();

    assert_eq!(token, "refreshed-access-token");
    assert_eq!(api.auth_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn ensure_valid_authenticates_when_no_refresh_token_exists() {
    let api = Arc::new(MockConnectApi::with_expiry(120));
    api.grant_without_refresh_token.store(true, Ordering::SeqCst);
    let mut tokens = TokenManager::new(credentials(), api.clone());
    tokens.authenticate().await.unwrap();

    tokens.ensure_valid().await.unwrap();

    // No refresh token, so expiry degrades straight to a re-login
    assert_eq!(api.auth_calls.load(Ordering::SeqCst), 2);
    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn refresh_failure_falls_back_to_authenticate() {
    let api = Arc::new(MockConnectApi::with_expiry(120));
    api.fail_refresh.store(true, Ordering::SeqCst);
    let mut tokens = TokenManager::new(credentials(), api.clone());
    tokens.authenticate().await.unwrap();

    // Refresh is attempted, rejected, and degrades to a full login
    let token = tokens.ensure_valid().await.unwrap();

    assert_eq!(token, "access-token");
    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.auth_calls.load(Ordering::SeqCst), 2);
}
