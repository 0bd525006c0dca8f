//! Heartbeat tracker configuration.
//!
//! Loaded from TOML with duration strings (`"10s"`, `"500ms"`, `"5m"`).
//! Keys that are absent keep their defaults:
//!
//! ```toml
//! region = "global"
//! max_heartbeats_per_second = 50.0
//! min_heartbeat_ttl = "10s"
//! heartbeat_grace = "10s"
//! failover_heartbeat_ttl = "5m"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tuning for the leader-side heartbeat timers. Immutable once the tracker
/// is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Region stamped into outgoing node-status updates.
    pub region: String,
    /// Target steady-state heartbeat load across the whole fleet.
    pub max_heartbeats_per_second: f64,
    /// Lower bound on the TTL handed to clients.
    #[serde(with = "duration_str")]
    pub min_heartbeat_ttl: Duration,
    /// TTL used when seeding timers after a leader election, to absorb the
    /// reconnect stampede.
    #[serde(with = "duration_str")]
    pub failover_heartbeat_ttl: Duration,
    /// Extra time the leader waits past the client TTL before expiring.
    #[serde(with = "duration_str")]
    pub heartbeat_grace: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            region: "global".to_string(),
            max_heartbeats_per_second: 50.0,
            min_heartbeat_ttl: Duration::from_secs(10),
            failover_heartbeat_ttl: Duration::from_secs(300),
            heartbeat_grace: Duration::from_secs(10),
        }
    }
}

impl HeartbeatConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: HeartbeatConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.trim().is_empty() {
            return Err(ConfigError::Invalid("region must not be empty".to_string()));
        }
        if !self.max_heartbeats_per_second.is_finite() || self.max_heartbeats_per_second <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "max_heartbeats_per_second must be positive, got {}",
                self.max_heartbeats_per_second
            )));
        }
        if self.min_heartbeat_ttl.is_zero() {
            return Err(ConfigError::Invalid(
                "min_heartbeat_ttl must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse `"1500us"`, `"250ms"`, `"10s"`, `"5m"` or `"1h"`. `ns` is also
/// accepted.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let invalid = || ConfigError::Duration(s.to_string());

    // Longer suffixes first so "ms" is not read as "s".
    const UNITS: [(&str, u128); 6] = [
        ("ns", 1),
        ("us", NANOS_PER_MICRO),
        ("ms", NANOS_PER_MILLI),
        ("s", NANOS_PER_SEC),
        ("m", 60 * NANOS_PER_SEC),
        ("h", 3600 * NANOS_PER_SEC),
    ];
    let (digits, nanos_per_unit) = UNITS
        .iter()
        .find_map(|(suffix, factor)| s.strip_suffix(*suffix).map(|d| (d, *factor)))
        .ok_or_else(invalid)?;

    let count: u128 = digits.parse().map_err(|_| invalid())?;
    let total = count.checked_mul(nanos_per_unit).ok_or_else(invalid)?;
    let secs = u64::try_from(total / NANOS_PER_SEC).map_err(|_| invalid())?;
    let nanos = u32::try_from(total % NANOS_PER_SEC).map_err(|_| invalid())?;
    Ok(Duration::new(secs, nanos))
}

const NANOS_PER_SEC: u128 = 1_000_000_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_MICRO: u128 = 1_000;

/// Render in the coarsest unit that loses nothing.
fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos % NANOS_PER_SEC == 0 {
        format!("{}s", d.as_secs())
    } else if nanos % NANOS_PER_MILLI == 0 {
        format!("{}ms", d.as_millis())
    } else if nanos % NANOS_PER_MICRO == 0 {
        format!("{}us", d.as_micros())
    } else {
        format!("{nanos}ns")
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
