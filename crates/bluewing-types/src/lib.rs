//! Platform-agnostic value types for the bluewing BLE central library.
//!
//! This crate holds the identifiers and small enums that both the session
//! core (bluewing-core) and its platform backends exchange, so a backend can
//! be written without depending on the session machinery.
//!
//! # Features
//!
//! - Normalised peripheral identity ([`PeripheralId`])
//! - Connection, adapter and scan-failure states
//! - GATT characteristic property bits
//! - UUID constants for standard services and descriptors
//!
//! # Example
//!
//! ```
//! use bluewing_types::{ConnectionState, PeripheralId};
//!
//! let id = PeripheralId::new("c0:ff:ee:00:11:22");
//! assert_eq!(id.as_str(), "C0:FF:EE:00:11:22");
//! assert!(ConnectionState::Ready.is_connected());
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{
    AdapterState, CharacteristicProperties, ConnectionState, PeripheralId, ScanFailure,
};
pub use uuid as uuids;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_peripheral_id_case_insensitive(raw in "[0-9a-fA-F:-]{1,36}") {
            let lower = PeripheralId::new(raw.to_lowercase());
            let upper = PeripheralId::new(raw.to_uppercase());
            prop_assert_eq!(&lower, &upper);
            prop_assert_eq!(PeripheralId::new(lower.as_str()), lower);
        }

        #[test]
        fn prop_scan_failure_from_code_never_panics(code in any::<i32>()) {
            let failure = ScanFailure::from_code(code);
            prop_assert!(!failure.to_string().is_empty());
        }
    }
}
