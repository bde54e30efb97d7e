//! Identifier helpers for the btleplug backend.

use btleplug::platform::PeripheralId as NativeId;

use bluewing_types::PeripheralId;

/// Address CoreBluetooth reports in place of a real MAC.
pub const PLACEHOLDER_ADDRESS: &str = "00:00:00:00:00:00";

/// Format a btleplug peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms, they may be
/// MAC addresses or D-Bus paths. This strips the `PeripheralId(...)` wrapper
/// from the debug representation.
pub fn format_peripheral_id(id: &NativeId) -> String {
    strip_debug_wrapper(&format!("{:?}", id)).to_string()
}

fn strip_debug_wrapper(debug: &str) -> &str {
    debug
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
}

/// Whether `address` is the all-zero placeholder.
pub fn is_placeholder_address(address: &str) -> bool {
    address == PLACEHOLDER_ADDRESS
}

/// Session identity for a native peripheral.
///
/// Uses the Bluetooth address where the platform exposes one, and the
/// platform's own peripheral id (a CoreBluetooth UUID on macOS) otherwise.
pub fn create_identifier(address: &str, peripheral_id: &NativeId) -> PeripheralId {
    if is_placeholder_address(address) {
        PeripheralId::new(format_peripheral_id(peripheral_id))
    } else {
        PeripheralId::new(address)
    }
}
