//! Error types for the heartbeat tracker.

use fleetgrid_state::StateError;
use thiserror::Error;

/// Result type alias for tracker operations.
pub type HeartbeatResult<T> = Result<T, HeartbeatError>;

/// Errors surfaced to callers of the tracker.
///
/// Background expiry never returns errors; failures there are logged and
/// left for the next heartbeat or the next leader to converge.
#[derive(Debug, Error)]
pub enum HeartbeatError {
    /// This server is not the leader; the client should retry elsewhere.
    #[error("heartbeat rejected: not the cluster leader")]
    NotLeader,

    #[error("state store: {0}")]
    State(#[from] StateError),
}

/// Errors loading or validating a [`HeartbeatConfig`](crate::HeartbeatConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration {0:?}")]
    Duration(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
