//! Engine and remote channel configuration.
//!
//! Defaults match the reference deployment. `from_env` layers `PARKWATCH_*`
//! environment variables on top of them.

use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;

use crate::error::ConfigError;

/// The remote channel exposes `field1` through `field8`.
pub const MAX_SLOTS: u32 = 8;

pub const DEFAULT_BASE_URL: &str = "https://api.thingspeak.com";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub slot_count: u32,
    /// Field value meaning "occupied" on the remote channel.
    pub occupied_value: u32,
    /// Field value written when a slot becomes free.
    pub free_value: u32,
    /// Reservation length assigned when the remote reports a slot occupied.
    pub default_reservation: Duration,
    pub expiry_interval: Duration,
    pub poll_interval: Duration,
    /// Samples fetched per poll.
    pub poll_window: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            slot_count: 3,
            occupied_value: 100,
            free_value: 0,
            default_reservation: Duration::from_secs(30 * 60),
            expiry_interval: Duration::from_secs(1),
            poll_interval: Duration::from_secs(15),
            poll_window: 10,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from defaults plus whatever `lookup` returns for each known key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            slot_count: parse(&lookup, "PARKWATCH_SLOTS")?.unwrap_or(defaults.slot_count),
            occupied_value: parse(&lookup, "PARKWATCH_OCCUPIED_VALUE")?
                .unwrap_or(defaults.occupied_value),
            free_value: parse(&lookup, "PARKWATCH_FREE_VALUE")?.unwrap_or(defaults.free_value),
            default_reservation: parse::<u64>(&lookup, "PARKWATCH_DEFAULT_MINUTES")?
                .map(|m| Duration::from_secs(m.saturating_mul(60)))
                .unwrap_or(defaults.default_reservation),
            expiry_interval: parse_millis(&lookup, "PARKWATCH_EXPIRY_INTERVAL_MS")?
                .unwrap_or(defaults.expiry_interval),
            poll_interval: parse::<u64>(&lookup, "PARKWATCH_POLL_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            poll_window: parse(&lookup, "PARKWATCH_POLL_WINDOW")?.unwrap_or(defaults.poll_window),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_slot_count(mut self, slot_count: u32) -> Self {
        self.slot_count = slot_count;
        self
    }

    /// Default reservation as a calendar offset for deadline arithmetic.
    pub fn default_reservation_delta(&self) -> Result<TimeDelta, ConfigError> {
        TimeDelta::from_std(self.default_reservation)
            .map_err(|_| ConfigError::ReservationTooLong(self.default_reservation))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slot_count == 0 || self.slot_count > MAX_SLOTS {
            return Err(ConfigError::SlotCount {
                got: self.slot_count,
                max: MAX_SLOTS,
            });
        }
        if self.poll_window < 2 {
            return Err(ConfigError::PollWindow(self.poll_window));
        }
        if self.occupied_value == self.free_value {
            return Err(ConfigError::SentinelCollision(self.free_value));
        }
        if self.default_reservation.is_zero() {
            return Err(ConfigError::ZeroInterval("default reservation"));
        }
        self.default_reservation_delta()?;
        if self.expiry_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("expiry interval"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("poll interval"));
        }
        Ok(())
    }
}

/// Where and how to reach the remote channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub base_url: String,
    pub channel_id: String,
    /// Omitted from reads when unset (public channels).
    pub read_key: Option<String>,
    pub write_key: String,
    pub timeout: Duration,
}

impl ChannelConfig {
    pub fn new(base_url: &str, channel_id: &str, write_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            channel_id: channel_id.to_string(),
            read_key: None,
            write_key: write_key.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_read_key(mut self, read_key: &str) -> Self {
        self.read_key = Some(read_key.to_string());
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup("PARKWATCH_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let channel_id =
            lookup("PARKWATCH_CHANNEL_ID").ok_or(ConfigError::Missing("PARKWATCH_CHANNEL_ID"))?;
        let write_key =
            lookup("PARKWATCH_WRITE_KEY").ok_or(ConfigError::Missing("PARKWATCH_WRITE_KEY"))?;

        let mut config = Self::new(&base_url, &channel_id, &write_key);
        config.read_key = lookup("PARKWATCH_READ_KEY").filter(|k| !k.is_empty());
        if let Some(timeout) = parse_millis(&lookup, "PARKWATCH_TIMEOUT_MS")? {
            if timeout.is_zero() {
                return Err(ConfigError::ZeroInterval("request timeout"));
            }
            config.timeout = timeout;
        }
        Ok(config)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|_| ConfigError::InvalidValue { key, value })
        })
        .transpose()
}

fn parse_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    Ok(parse::<u64>(lookup, key)?.map(Duration::from_millis))
}
