//! # enyaq2mqtt - Skoda Enyaq to MQTT bridge
//!
//! Polls the Skoda Connect API for vehicle state, republishes normalized
//! snapshots onto an MQTT topic tree and translates inbound command
//! messages into vehicle API calls. Emits Home Assistant MQTT discovery
//! documents so entities auto-configure.
//!
//! ## Architecture
//!
//! The application follows a modular architecture with clear separation of concerns:
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `skoda`: Skoda Connect API client and token lifecycle
//! - `vehicle`: Normalized vehicle state and the status client
//! - `commands`: Inbound command dispatch
//! - `mqtt`: MQTT transport and event translation
//! - `discovery`: Home Assistant discovery documents
//! - `bridge`: Core orchestration, poll loop and lifecycle

pub mod bridge;
pub mod commands;
pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod mqtt;
pub mod skoda;
pub mod vehicle;

// Re-export commonly used types
pub use bridge::EnyaqBridge;
pub use config::Config;
pub use error::{BridgeError, Result};
