//! Skoda Connect API integration
//!
//! This module owns the upstream authentication lifecycle (access token,
//! refresh token, expiry) and the raw API surface behind the [`ConnectApi`]
//! trait so a real protocol implementation can be swapped in without
//! touching the rest of the bridge.

use crate::error::{BridgeError, Result};
use crate::logging::get_logger;
use crate::vehicle::{BatteryStatus, DoorStatus, VehicleStatus};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Refresh the access token when it expires within this margin, so every
/// outbound call carries a token valid for at least this long.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Skoda Connect account credentials and vehicle identity
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub vin: String,
}

/// Token material handed back by a successful login or refresh
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in_secs: i64,
}

/// Current token state. Mutated only by [`TokenManager`].
#[derive(Debug, Clone, Default)]
pub struct TokenState {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Raw upstream API surface
///
/// The shipped implementation is [`SkodaConnectApi`]; tests substitute
/// counting fakes.
#[async_trait::async_trait]
pub trait ConnectApi: Send + Sync {
    /// Full login with account credentials
    async fn authenticate(&self, credentials: &Credentials) -> Result<TokenGrant>;

    /// Exchange a refresh token for a new grant
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;

    /// Fetch the current vehicle status
    async fn get_status(&self, access_token: &str, vin: &str) -> Result<VehicleStatus>;

    /// Start charging
    async fn start_charging(&self, access_token: &str, vin: &str) -> Result<()>;

    /// Stop charging
    async fn stop_charging(&self, access_token: &str, vin: &str) -> Result<()>;

    /// Lock the vehicle
    async fn lock(&self, access_token: &str, vin: &str) -> Result<()>;

    /// Unlock the vehicle
    async fn unlock(&self, access_token: &str, vin: &str) -> Result<()>;
}

/// Owns the token lifecycle for the upstream API
///
/// Both the poll loop and command handlers call [`TokenManager::ensure_valid`]
/// independently, so the bridge keeps the manager behind a `tokio::sync::Mutex`.
pub struct TokenManager {
    credentials: Credentials,
    api: Arc<dyn ConnectApi>,
    state: TokenState,
    margin: Duration,
    logger: crate::logging::StructuredLogger,
}

impl TokenManager {
    /// Create a new token manager with no token material
    pub fn new(credentials: Credentials, api: Arc<dyn ConnectApi>) -> Self {
        let logger = get_logger("skoda");
        Self {
            credentials,
            api,
            state: TokenState::default(),
            margin: Duration::seconds(TOKEN_REFRESH_MARGIN_SECS),
            logger,
        }
    }

    /// Current token state (read-only)
    pub fn token_state(&self) -> &TokenState {
        &self.state
    }

    /// Perform a full login. No retry here; the caller decides.
    pub async fn authenticate(&mut self) -> Result<()> {
        self.logger.info("Authenticating with Skoda Connect");
        let grant = self
            .api
            .authenticate(&self.credentials)
            .await
            .map_err(|e| BridgeError::auth(format!("login failed: {}", e)))?;
        self.apply_grant(grant);
        self.logger.info("Authentication successful");
        Ok(())
    }

    /// Ensure the access token is valid for at least the refresh margin,
    /// refreshing or re-authenticating as needed. Returns the token to use.
    pub async fn ensure_valid(&mut self) -> Result<String> {
        let expires_at = match (&self.state.access_token, self.state.expires_at) {
            (Some(_), Some(expires_at)) => expires_at,
            _ => {
                self.authenticate().await?;
                return self.current_token();
            }
        };

        if Utc::now() >= expires_at - self.margin {
            self.logger.info("Token expiring soon, refreshing");
            self.refresh().await?;
        }

        self.current_token()
    }

    /// Exchange the refresh token for a new grant. Failure is not fatal:
    /// it degrades to a full re-login.
    pub async fn refresh(&mut self) -> Result<()> {
        let Some(refresh_token) = self.state.refresh_token.clone() else {
            self.logger
                .warn("No refresh token available, re-authenticating");
            return self.authenticate().await;
        };

        match self.api.refresh(&refresh_token).await {
            Ok(grant) => {
                self.apply_grant(grant);
                self.logger.info("Token refreshed successfully");
                Ok(())
            }
            Err(e) => {
                self.logger
                    .warn(&format!("Token refresh failed, re-authenticating: {}", e));
                self.authenticate().await
            }
        }
    }

    fn apply_grant(&mut self, grant: TokenGrant) {
        self.state.expires_at = Some(Utc::now() + Duration::seconds(grant.expires_in_secs));
        self.state.access_token = Some(grant.access_token);
        // A grant without a refresh token keeps the previous one, if any
        if grant.refresh_token.is_some() {
            self.state.refresh_token = grant.refresh_token;
        }
    }

    fn current_token(&self) -> Result<String> {
        self.state
            .access_token
            .clone()
            .ok_or_else(|| BridgeError::auth("no access token after authentication"))
    }
}

/// HTTP client for the Skoda Connect API
///
/// The vendor login is an OAuth2/PKCE flow against the VW Group identity
/// service. That flow is not implemented here; this client returns a
/// synthetic grant and the vehicle status shape the real endpoints serve,
/// so the rest of the bridge runs unchanged once the flow lands.
pub struct SkodaConnectApi {
    #[allow(dead_code)]
    http: reqwest::Client,
    logger: crate::logging::StructuredLogger,
}

// API endpoints
const BASE_URL: &str = "https://api.connect.skoda-auto.cz";
const AUTH_URL: &str = "https://identity.vwgroup.io";

impl SkodaConnectApi {
    /// Create a new API client with the given per-call timeout
    pub fn new(command_timeout: std::time::Duration) -> Result<Self> {
        let logger = get_logger("skoda");
        let http = reqwest::Client::builder()
            .timeout(command_timeout)
            .user_agent("enyaq2mqtt/0.3")
            .build()?;
        Ok(Self { http, logger })
    }

    #[allow(dead_code)]
    fn status_url(vin: &str) -> String {
        format!("{}/api/v2/vehicle-status/{}", BASE_URL, vin)
    }

    #[allow(dead_code)]
    fn auth_token_url() -> String {
        format!("{}/oauth2/token", AUTH_URL)
    }
}

#[async_trait::async_trait]
impl ConnectApi for SkodaConnectApi {
    async fn authenticate(&self, credentials: &Credentials) -> Result<TokenGrant> {
        // TODO: implement the OAuth2/PKCE login flow against identity.vwgroup.io.
        // The real exchange is roughly:
        //   let resp = self.http.post(Self::auth_token_url())
        //       .form(&[("grant_type", "password"),
        //               ("username", &credentials.username),
        //               ("password", &credentials.password)])
        //       .send().await?.error_for_status()?;
        //   let token: TokenResponse = resp.json().await?;
        self.logger.debug(&format!(
            "Authenticating account {} against {}",
            credentials.username, AUTH_URL
        ));

        Ok(TokenGrant {
            access_token: "offline-access-token".to_string(),
            refresh_token: Some("offline-refresh-token".to_string()),
            expires_in_secs: 3600,
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant> {
        // TODO: POST grant_type=refresh_token once the login flow exists
        Ok(TokenGrant {
            access_token: "offline-access-token".to_string(),
            refresh_token: None,
            expires_in_secs: 3600,
        })
    }

    async fn get_status(&self, _access_token: &str, vin: &str) -> Result<VehicleStatus> {
        // TODO: replace with the real status fetch:
        //   let resp = self.http.get(Self::status_url(vin))
        //       .bearer_auth(access_token)
        //       .send().await?.error_for_status()?;
        //   resp.json().await.map_err(Into::into)
        self.logger.debug(&format!("Fetching status for {}", vin));

        Ok(VehicleStatus {
            battery: BatteryStatus {
                soc: 75,
                range_km: 280.0,
                charging: false,
                plugged_in: true,
            },
            doors: DoorStatus { locked: true },
            last_updated: Utc::now(),
        })
    }

    async fn start_charging(&self, _access_token: &str, vin: &str) -> Result<()> {
        // TODO: POST {BASE_URL}/api/v1/charging/{vin}/start
        self.logger
            .info(&format!("Sending start charging command for {}", vin));
        Ok(())
    }

    async fn stop_charging(&self, _access_token: &str, vin: &str) -> Result<()> {
        // TODO: POST {BASE_URL}/api/v1/charging/{vin}/stop
        self.logger
            .info(&format!("Sending stop charging command for {}", vin));
        Ok(())
    }

    async fn lock(&self, _access_token: &str, vin: &str) -> Result<()> {
        // TODO: POST {BASE_URL}/api/v1/vehicle-access/{vin}/lock
        self.logger.info(&format!("Sending lock command for {}", vin));
        Ok(())
    }

    async fn unlock(&self, _access_token: &str, vin: &str) -> Result<()> {
        // TODO: POST {BASE_URL}/api/v1/vehicle-access/{vin}/unlock
        self.logger
            .info(&format!("Sending unlock command for {}", vin));
        Ok(())
    }
}
