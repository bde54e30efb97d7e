//! Error types for bluewing-core.
//!
//! Only synchronous preconditions are reported as errors. Once a request has
//! been accepted by a [`Session`](crate::Session), everything that happens to
//! it (including failure) arrives through the event stream instead:
//!
//! | Condition | Reported as |
//! |-----------|-------------|
//! | Scan without OS permission | [`Error::PermissionDenied`] |
//! | Scan with the radio not powered on | [`Error::RadioUnavailable`] |
//! | Operation on an id never seen | [`Error::UnknownPeripheral`] |
//! | Scan stopped by the platform | [`SessionEvent::ScanFailed`](crate::SessionEvent::ScanFailed) |
//! | Connect never answered | no event; layer a timeout on top |

use bluewing_types::{AdapterState, PeripheralId};
use thiserror::Error;

/// Errors that can occur when driving a BLE session.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The platform has not granted Bluetooth (or location) permission.
    #[error("Bluetooth permission not granted")]
    PermissionDenied,

    /// The adapter is not powered on.
    #[error("Bluetooth radio unavailable: adapter is {reason}")]
    RadioUnavailable {
        /// The state the adapter reported.
        reason: AdapterState,
    },

    /// The peripheral has never been seen in this session.
    #[error("Unknown peripheral: {0}")]
    UnknownPeripheral(PeripheralId),

    /// No Bluetooth adapter is present on this host.
    #[error("No Bluetooth adapter found")]
    NoAdapter,

    /// Bluetooth Low Energy stack error.
    #[cfg(feature = "btleplug")]
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a radio-unavailable error for the given adapter state.
    pub fn radio_unavailable(reason: AdapterState) -> Self {
        Self::RadioUnavailable { reason }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result type alias using bluewing-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::PermissionDenied.to_string(),
            "Bluetooth permission not granted"
        );
        assert_eq!(
            Error::radio_unavailable(AdapterState::PoweredOff).to_string(),
            "Bluetooth radio unavailable: adapter is powered off"
        );
        assert_eq!(
            Error::UnknownPeripheral(PeripheralId::new("aa:bb")).to_string(),
            "Unknown peripheral: AA:BB"
        );
        assert_eq!(
            Error::invalid_config("event_capacity must be greater than zero").to_string(),
            "Invalid configuration: event_capacity must be greater than zero"
        );
    }

    #[test]
    fn test_radio_unavailable_keeps_reason() {
        for state in [
            AdapterState::PoweredOff,
            AdapterState::Resetting,
            AdapterState::Unsupported,
            AdapterState::Unauthorized,
            AdapterState::Unknown,
        ] {
            match Error::radio_unavailable(state) {
                Error::RadioUnavailable { reason } => assert_eq!(reason, state),
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }
}
