//! Core value types shared by every bluewing backend.

use core::fmt;
use core::ops::BitOr;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};

/// Stable identity of a remote peripheral within one session.
///
/// On Android-style stacks this is the Bluetooth MAC address; on CoreBluetooth
/// it is the UUID the OS assigned to the peripheral. Both are normalised to
/// upper case with surrounding whitespace removed, so the same device reported
/// by a scan result and later by a connection callback always compares equal.
///
/// # Examples
///
/// ```
/// use bluewing_types::PeripheralId;
///
/// let from_scan = PeripheralId::new("aa:bb:cc:dd:ee:ff");
/// let from_link = PeripheralId::new(" AA:BB:CC:DD:EE:FF ");
/// assert_eq!(from_scan, from_link);
/// assert_eq!(from_scan.as_str(), "AA:BB:CC:DD:EE:FF");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(from = "String", into = "String")
)]
pub struct PeripheralId(String);

impl PeripheralId {
    /// Create an identifier, normalising case and whitespace.
    #[must_use]
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_uppercase())
    }

    /// Create an identifier, rejecting empty input.
    pub fn parse(raw: impl AsRef<str>) -> ParseResult<Self> {
        let id = Self::new(raw);
        if id.0.is_empty() {
            return Err(ParseError::EmptyIdentifier);
        }
        Ok(id)
    }

    /// The normalised identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeripheralId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<String> for PeripheralId {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for PeripheralId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<PeripheralId> for String {
    fn from(id: PeripheralId) -> Self {
        id.0
    }
}

/// Lifecycle state of a peripheral within a session.
///
/// ```text
/// Discovered -> Connecting -> Connected -> ServicesDiscovering -> Ready
///      ^                                                            |
///      +------------------- Disconnected <--------------------------+
/// ```
///
/// `Disconnected` is reachable from every state (abrupt link loss), and a
/// disconnected peripheral returns to `Discovered` when it is sighted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ConnectionState {
    /// Seen in a scan (or named by the application) but never linked.
    Discovered,
    /// A connection request has been issued to the platform.
    Connecting,
    /// The platform reported the link as up.
    Connected,
    /// Service discovery has been requested and has not completed.
    ServicesDiscovering,
    /// Services and characteristics are known; GATT requests are meaningful.
    Ready,
    /// The link is down.
    Disconnected,
}

impl ConnectionState {
    /// Whether the platform has reported the link as up.
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::ServicesDiscovering | ConnectionState::Ready
        )
    }

    /// Whether a link exists or is being established.
    ///
    /// A `connect` request in one of these states is a no-op, and a
    /// `disconnect` request outside of them has nothing to tear down.
    #[must_use]
    pub fn is_linked(self) -> bool {
        self == ConnectionState::Connecting || self.is_connected()
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Discovered => "discovered",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::ServicesDiscovering => "discovering services",
            ConnectionState::Ready => "ready",
            ConnectionState::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Radio state reported by the local Bluetooth adapter.
///
/// Each non-ready condition is kept distinct so callers can tell a radio that
/// is switched off from one the OS refuses to let them use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum AdapterState {
    /// State not yet determined.
    Unknown = 0,
    /// The stack is restarting; a ready state usually follows.
    Resetting = 1,
    /// The hardware has no BLE central support.
    Unsupported = 2,
    /// The application is not authorised to use Bluetooth.
    Unauthorized = 3,
    /// The radio is switched off.
    PoweredOff = 4,
    /// The radio is on and usable.
    PoweredOn = 5,
}

impl AdapterState {
    /// Map a CoreBluetooth `CBManagerState` raw value.
    ///
    /// Values outside the known range map to [`AdapterState::Unknown`].
    ///
    /// ```
    /// use bluewing_types::AdapterState;
    ///
    /// assert_eq!(AdapterState::from_code(5), AdapterState::PoweredOn);
    /// assert_eq!(AdapterState::from_code(42), AdapterState::Unknown);
    /// ```
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => AdapterState::Resetting,
            2 => AdapterState::Unsupported,
            3 => AdapterState::Unauthorized,
            4 => AdapterState::PoweredOff,
            5 => AdapterState::PoweredOn,
            _ => AdapterState::Unknown,
        }
    }

    /// Whether scanning and connecting can proceed.
    #[must_use]
    pub fn is_ready(self) -> bool {
        self == AdapterState::PoweredOn
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdapterState::Unknown => "unknown",
            AdapterState::Resetting => "resetting",
            AdapterState::Unsupported => "unsupported",
            AdapterState::Unauthorized => "unauthorized",
            AdapterState::PoweredOff => "powered off",
            AdapterState::PoweredOn => "powered on",
        };
        f.write_str(s)
    }
}

/// Reason an in-progress scan stopped delivering results.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "detail", rename_all = "snake_case"))]
#[non_exhaustive]
pub enum ScanFailure {
    /// A scan with the same settings is already running.
    AlreadyStarted,
    /// The OS refused to register the scanning application.
    ApplicationRegistrationFailed,
    /// The platform stack failed internally.
    InternalError,
    /// The hardware does not support the requested scan.
    FeatureUnsupported,
    /// No hardware resources were left to start a scan.
    OutOfHardwareResources,
    /// Scans were started and stopped too often.
    ScanningTooFrequently,
    /// The adapter left the powered-on state.
    AdapterUnavailable(AdapterState),
    /// Permission was revoked or never granted.
    PermissionDenied,
    /// Any other platform-specific failure.
    Other(String),
}

impl ScanFailure {
    /// Map an Android `ScanCallback.SCAN_FAILED_*` error code.
    ///
    /// ```
    /// use bluewing_types::ScanFailure;
    ///
    /// assert_eq!(ScanFailure::from_code(1), ScanFailure::AlreadyStarted);
    /// assert_eq!(ScanFailure::from_code(99), ScanFailure::Other("code: 99".into()));
    /// ```
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => ScanFailure::AlreadyStarted,
            2 => ScanFailure::ApplicationRegistrationFailed,
            3 => ScanFailure::InternalError,
            4 => ScanFailure::FeatureUnsupported,
            5 => ScanFailure::OutOfHardwareResources,
            6 => ScanFailure::ScanningTooFrequently,
            other => ScanFailure::Other(format!("code: {}", other)),
        }
    }
}

impl fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanFailure::AlreadyStarted => write!(f, "scan already started"),
            ScanFailure::ApplicationRegistrationFailed => {
                write!(f, "application registration failed")
            }
            ScanFailure::InternalError => write!(f, "internal error"),
            ScanFailure::FeatureUnsupported => write!(f, "feature unsupported"),
            ScanFailure::OutOfHardwareResources => write!(f, "out of hardware resources"),
            ScanFailure::ScanningTooFrequently => write!(f, "scanning too frequently"),
            ScanFailure::AdapterUnavailable(state) => write!(f, "adapter is {}", state),
            ScanFailure::PermissionDenied => write!(f, "permission denied"),
            ScanFailure::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// GATT characteristic property bits (Bluetooth Core Spec Vol 3, Part G, 3.3.1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct CharacteristicProperties(u8);

impl CharacteristicProperties {
    pub const BROADCAST: Self = Self(0x01);
    pub const READ: Self = Self(0x02);
    pub const WRITE_WITHOUT_RESPONSE: Self = Self(0x04);
    pub const WRITE: Self = Self(0x08);
    pub const NOTIFY: Self = Self(0x10);
    pub const INDICATE: Self = Self(0x20);
    pub const AUTHENTICATED_SIGNED_WRITES: Self = Self(0x40);
    pub const EXTENDED_PROPERTIES: Self = Self(0x80);

    /// No properties set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build from the raw property byte.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// The raw property byte.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for CharacteristicProperties {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peripheral_id_normalises_case_and_whitespace() {
        let a = PeripheralId::new("  1b2f9c3e-aaaa-4bbb-8ccc-0123456789ab");
        let b = PeripheralId::new("1B2F9C3E-AAAA-4BBB-8CCC-0123456789AB");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "1B2F9C3E-AAAA-4BBB-8CCC-0123456789AB");
    }

    #[test]
    fn test_peripheral_id_parse_rejects_empty() {
        assert_eq!(PeripheralId::parse("   "), Err(ParseError::EmptyIdentifier));
        assert!("AA:BB".parse::<PeripheralId>().is_ok());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_peripheral_id_serde_normalises() {
        let id: PeripheralId = serde_json::from_str("\"aa:bb:cc:dd:ee:ff\"").unwrap();
        assert_eq!(id.as_str(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"AA:BB:CC:DD:EE:FF\"");
    }

    #[test]
    fn test_connection_state_predicates() {
        assert!(!ConnectionState::Discovered.is_linked());
        assert!(ConnectionState::Connecting.is_linked());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(ConnectionState::ServicesDiscovering.is_connected());
        assert!(ConnectionState::Ready.is_connected());
        assert!(!ConnectionState::Disconnected.is_linked());
    }

    #[test]
    fn test_adapter_state_codes() {
        assert_eq!(AdapterState::from_code(0), AdapterState::Unknown);
        assert_eq!(AdapterState::from_code(1), AdapterState::Resetting);
        assert_eq!(AdapterState::from_code(2), AdapterState::Unsupported);
        assert_eq!(AdapterState::from_code(3), AdapterState::Unauthorized);
        assert_eq!(AdapterState::from_code(4), AdapterState::PoweredOff);
        assert_eq!(AdapterState::from_code(-1), AdapterState::Unknown);
        assert!(AdapterState::PoweredOn.is_ready());
        assert!(!AdapterState::Resetting.is_ready());
    }

    #[test]
    fn test_scan_failure_codes() {
        assert_eq!(ScanFailure::from_code(2), ScanFailure::ApplicationRegistrationFailed);
        assert_eq!(ScanFailure::from_code(6), ScanFailure::ScanningTooFrequently);
        assert_eq!(
            ScanFailure::AdapterUnavailable(AdapterState::PoweredOff).to_string(),
            "adapter is powered off"
        );
    }

    #[test]
    fn test_characteristic_properties() {
        let props = CharacteristicProperties::READ | CharacteristicProperties::NOTIFY;
        assert!(props.contains(CharacteristicProperties::NOTIFY));
        assert!(!props.contains(CharacteristicProperties::INDICATE));
        assert_eq!(props.bits(), 0x12);
        assert_eq!(CharacteristicProperties::from_bits(0x12), props);
        assert!(CharacteristicProperties::empty().contains(CharacteristicProperties::empty()));
    }
}
