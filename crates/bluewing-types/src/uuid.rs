//! Well-known GATT UUIDs.
//!
//! Only the handful of assigned numbers the session itself relies on, plus a
//! few common services that are convenient in filters and tests.

use uuid::{Uuid, uuid};

/// Bluetooth Base UUID; 16-bit assigned numbers are spliced into its first field.
pub const BASE_UUID: Uuid = uuid!("00000000-0000-1000-8000-00805f9b34fb");

/// Expand a 16-bit assigned number into a full 128-bit UUID.
///
/// ```
/// use bluewing_types::uuids::{from_short, BATTERY_SERVICE};
///
/// assert_eq!(from_short(0x180F), BATTERY_SERVICE);
/// ```
#[must_use]
pub const fn from_short(short: u16) -> Uuid {
    Uuid::from_u128(BASE_UUID.as_u128() | ((short as u128) << 96))
}

/// The 16-bit assigned number of `uuid`, if it is derived from the Base UUID.
#[must_use]
pub fn to_short(uuid: Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    let mask = !(0xFFFF_FFFFu128 << 96);
    if value & mask != BASE_UUID.as_u128() || value >> 112 != 0 {
        return None;
    }
    Some((value >> 96) as u16)
}

// --- Descriptors ---

/// Client Characteristic Configuration descriptor; toggles notify/indicate.
pub const CLIENT_CHARACTERISTIC_CONFIG: Uuid = uuid!("00002902-0000-1000-8000-00805f9b34fb");

// --- Standard BLE Service UUIDs ---

/// Generic Access Profile (GAP) service.
pub const GAP_SERVICE: Uuid = uuid!("00001800-0000-1000-8000-00805f9b34fb");

/// Generic Attribute Profile (GATT) service.
pub const GATT_SERVICE: Uuid = uuid!("00001801-0000-1000-8000-00805f9b34fb");

/// Device Information service.
pub const DEVICE_INFO_SERVICE: Uuid = uuid!("0000180a-0000-1000-8000-00805f9b34fb");

/// Battery service.
pub const BATTERY_SERVICE: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");

// --- Standard BLE Characteristic UUIDs ---

/// Device name characteristic (GAP).
pub const DEVICE_NAME: Uuid = uuid!("00002a00-0000-1000-8000-00805f9b34fb");

/// Battery level characteristic.
pub const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");

/// Manufacturer name string characteristic.
pub const MANUFACTURER_NAME: Uuid = uuid!("00002a29-0000-1000-8000-00805f9b34fb");

/// Model number string characteristic.
pub const MODEL_NUMBER: Uuid = uuid!("00002a24-0000-1000-8000-00805f9b34fb");
