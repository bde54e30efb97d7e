//! Session configuration.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::logger::LogLevel;

/// Default capacity of the session's broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Settings applied when a [`Session`](crate::Session) is created.
///
/// ```
/// use bluewing_core::{LogLevel, SessionConfig};
/// use bluewing_types::uuids::BATTERY_SERVICE;
///
/// let config = SessionConfig::default()
///     .service_filter(BATTERY_SERVICE)
///     .log_level(LogLevel::Debug);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Service UUID used when `start_scan` is called without a filter.
    pub service_filter: Option<Uuid>,
    /// Level for the process-wide library logger.
    pub log_level: LogLevel,
    /// How many events a lagging `events()` receiver may fall behind.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            service_filter: None,
            log_level: LogLevel::None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Set the default scan filter.
    #[must_use]
    pub fn service_filter(mut self, uuid: Uuid) -> Self {
        self.service_filter = Some(uuid);
        self
    }

    /// Set the library log level.
    #[must_use]
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Set the broadcast channel capacity.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Check the configuration for values a session cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(Error::invalid_config(
                "event_capacity must be greater than zero",
            ));
        }
        Ok(())
    }
}
