//! Peripheral, service and characteristic records.
//!
//! The session owns exactly one [`Peripheral`] per [`PeripheralId`] and hands
//! out clones of it as snapshots. Services are replaced wholesale whenever
//! discovery completes; characteristic values change only when a read
//! completes or a notification arrives.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use bluewing_types::{CharacteristicProperties, ConnectionState, PeripheralId, uuids};

/// A remote BLE device known to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peripheral {
    /// Stable identity for the lifetime of the session.
    pub id: PeripheralId,
    /// Advertised or cached name.
    pub name: Option<String>,
    /// Most recent signal strength in dBm.
    pub rssi: Option<i16>,
    /// Discovered services, in the order the platform reported them.
    pub services: Vec<Service>,
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Last MTU reported (or echoed) for this link.
    pub mtu: Option<u16>,
    /// When the peripheral was last seen advertising.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_seen: Option<OffsetDateTime>,
}

impl Peripheral {
    /// Create a record in the [`ConnectionState::Discovered`] state.
    pub fn new(id: PeripheralId) -> Self {
        Self {
            id,
            name: None,
            rssi: None,
            services: Vec::new(),
            state: ConnectionState::Discovered,
            mtu: None,
            last_seen: None,
        }
    }

    /// Every characteristic across every service.
    pub fn characteristics(&self) -> impl Iterator<Item = &Characteristic> {
        self.services.iter().flat_map(|s| s.characteristics.iter())
    }

    /// Every characteristic whose UUID equals `uuid`, across all services.
    pub fn find_characteristics(&self, uuid: Uuid) -> impl Iterator<Item = &Characteristic> {
        self.characteristics().filter(move |c| c.uuid == uuid)
    }

    /// Look up one service by UUID.
    pub fn service(&self, uuid: Uuid) -> Option<&Service> {
        self.services.iter().find(|s| s.uuid == uuid)
    }

    /// Apply a sighting: the name is only replaced by a present value.
    pub(crate) fn record_sighting(&mut self, name: Option<String>, rssi: Option<i16>) {
        if let Some(name) = name {
            self.name = Some(name);
        }
        if rssi.is_some() {
            self.rssi = rssi;
        }
        self.last_seen = Some(OffsetDateTime::now_utc());
    }

    pub(crate) fn characteristic_mut(
        &mut self,
        target: &CharacteristicTarget,
    ) -> Option<&mut Characteristic> {
        self.services
            .iter_mut()
            .flat_map(|s| s.characteristics.iter_mut())
            .find(|c| target.matches(c))
    }
}

/// A GATT service on a peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub uuid: Uuid,
    /// Whether this is a primary service.
    pub primary: bool,
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    /// Create a primary service with no characteristics.
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            primary: true,
            characteristics: Vec::new(),
        }
    }

    /// Add a characteristic, pointing its back-reference at this service.
    #[must_use]
    pub fn with_characteristic(mut self, mut characteristic: Characteristic) -> Self {
        characteristic.service_uuid = self.uuid;
        self.characteristics.push(characteristic);
        self
    }

    /// Mark the service as secondary.
    #[must_use]
    pub fn secondary(mut self) -> Self {
        self.primary = false;
        self
    }
}

/// A GATT characteristic.
///
/// `handle` distinguishes two instances of the same UUID. Backends that do
/// not expose attribute handles number characteristics in discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Characteristic {
    pub uuid: Uuid,
    /// UUID of the owning service.
    pub service_uuid: Uuid,
    pub handle: u16,
    pub properties: CharacteristicProperties,
    /// Last value read or notified.
    pub value: Option<Vec<u8>>,
    #[serde(skip)]
    pub(crate) descriptors: Vec<Descriptor>,
}

impl Characteristic {
    /// Create a characteristic with no value and no descriptors.
    pub fn new(uuid: Uuid, handle: u16, properties: CharacteristicProperties) -> Self {
        Self {
            uuid,
            service_uuid: Uuid::nil(),
            handle,
            properties,
            value: None,
            descriptors: Vec::new(),
        }
    }

    /// Declare a descriptor on this characteristic.
    #[must_use]
    pub fn with_descriptor(mut self, uuid: Uuid) -> Self {
        self.descriptors.push(Descriptor { uuid, value: None });
        self
    }

    /// The UUID rendered as text.
    pub fn name(&self) -> String {
        self.uuid.to_string()
    }

    /// Raw value bytes.
    pub fn value_bytes(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// The value decoded as UTF-8, or `None` if absent or not valid UTF-8.
    ///
    /// ```
    /// use bluewing_core::Characteristic;
    /// use bluewing_types::{CharacteristicProperties, uuids};
    ///
    /// let mut c = Characteristic::new(uuids::DEVICE_NAME, 3, CharacteristicProperties::READ);
    /// assert_eq!(c.value_string(), None);
    /// c.value = Some(b"Thermo".to_vec());
    /// assert_eq!(c.value_string().as_deref(), Some("Thermo"));
    /// c.value = Some(vec![0xff, 0xfe]);
    /// assert_eq!(c.value_string(), None);
    /// ```
    pub fn value_string(&self) -> Option<String> {
        let bytes = self.value.as_ref()?;
        String::from_utf8(bytes.clone()).ok()
    }

    /// Address of this instance for adapter requests.
    pub fn target(&self) -> CharacteristicTarget {
        CharacteristicTarget {
            service_uuid: self.service_uuid,
            characteristic_uuid: self.uuid,
            handle: self.handle,
        }
    }

    /// The payload last written to the client configuration descriptor.
    ///
    /// `None` if the characteristic has no such descriptor or notifications
    /// were never toggled.
    pub fn client_config(&self) -> Option<&[u8]> {
        self.descriptors
            .iter()
            .find(|d| d.uuid == uuids::CLIENT_CHARACTERISTIC_CONFIG)
            .and_then(|d| d.value.as_deref())
    }

    /// The client configuration descriptor, if the platform reported one.
    pub(crate) fn client_config_mut(&mut self) -> Option<&mut Descriptor> {
        self.descriptors
            .iter_mut()
            .find(|d| d.uuid == uuids::CLIENT_CHARACTERISTIC_CONFIG)
    }

    /// Payload for the client configuration descriptor.
    ///
    /// Notifications are preferred; indications are used only when the
    /// characteristic cannot notify.
    pub(crate) fn client_config_payload(&self, enabled: bool) -> [u8; 2] {
        if !enabled {
            return [0x00, 0x00];
        }
        if !self.properties.contains(CharacteristicProperties::NOTIFY)
            && self.properties.contains(CharacteristicProperties::INDICATE)
        {
            [0x02, 0x00]
        } else {
            [0x01, 0x00]
        }
    }
}

/// A GATT descriptor. Only used internally to toggle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Descriptor {
    pub(crate) uuid: Uuid,
    pub(crate) value: Option<Vec<u8>>,
}

/// Address of one characteristic instance on a peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacteristicTarget {
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    pub handle: u16,
}

impl CharacteristicTarget {
    fn matches(&self, c: &Characteristic) -> bool {
        c.uuid == self.characteristic_uuid
            && c.service_uuid == self.service_uuid
            && c.handle == self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluewing_types::uuids::{BATTERY_LEVEL, BATTERY_SERVICE, DEVICE_INFO_SERVICE};

    fn sample() -> Peripheral {
        let mut p = Peripheral::new(PeripheralId::new("AA:BB"));
        p.services = vec![
            Service::new(BATTERY_SERVICE).with_characteristic(Characteristic::new(
                BATTERY_LEVEL,
                10,
                CharacteristicProperties::READ | CharacteristicProperties::NOTIFY,
            )),
            Service::new(DEVICE_INFO_SERVICE).with_characteristic(Characteristic::new(
                BATTERY_LEVEL,
                20,
                CharacteristicProperties::READ,
            )),
        ];
        p
    }

    #[test]
    fn test_find_characteristics_spans_services() {
        let p = sample();
        let found: Vec<_> = p.find_characteristics(BATTERY_LEVEL).collect();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].service_uuid, BATTERY_SERVICE);
        assert_eq!(found[1].service_uuid, DEVICE_INFO_SERVICE);
    }

    #[test]
    fn test_characteristic_mut_uses_full_target() {
        let mut p = sample();
        let target = CharacteristicTarget {
            service_uuid: DEVICE_INFO_SERVICE,
            characteristic_uuid: BATTERY_LEVEL,
            handle: 20,
        };
        p.characteristic_mut(&target).unwrap().value = Some(vec![42]);
        assert_eq!(p.services[0].characteristics[0].value, None);
        assert_eq!(p.services[1].characteristics[0].value, Some(vec![42]));

        let wrong_handle = CharacteristicTarget { handle: 99, ..target };
        assert!(p.characteristic_mut(&wrong_handle).is_none());
    }

    #[test]
    fn test_sighting_never_clears_name() {
        let mut p = Peripheral::new(PeripheralId::new("AA:BB"));
        p.record_sighting(Some("Thermo".into()), Some(-60));
        p.record_sighting(None, Some(-70));
        assert_eq!(p.name.as_deref(), Some("Thermo"));
        assert_eq!(p.rssi, Some(-70));
        assert!(p.last_seen.is_some());

        p.record_sighting(Some("Thermo 2".into()), None);
        assert_eq!(p.name.as_deref(), Some("Thermo 2"));
        assert_eq!(p.rssi, Some(-70));
    }

    #[test]
    fn test_client_config_payloads() {
        let notify = Characteristic::new(BATTERY_LEVEL, 1, CharacteristicProperties::NOTIFY);
        assert_eq!(notify.client_config_payload(true), [0x01, 0x00]);
        assert_eq!(notify.client_config_payload(false), [0x00, 0x00]);

        let indicate = Characteristic::new(BATTERY_LEVEL, 1, CharacteristicProperties::INDICATE);
        assert_eq!(indicate.client_config_payload(true), [0x02, 0x00]);

        let both = Characteristic::new(
            BATTERY_LEVEL,
            1,
            CharacteristicProperties::NOTIFY | CharacteristicProperties::INDICATE,
        );
        assert_eq!(both.client_config_payload(true), [0x01, 0x00]);
    }

    #[test]
    fn test_client_config_lookup() {
        let mut plain = Characteristic::new(BATTERY_LEVEL, 1, CharacteristicProperties::NOTIFY);
        assert!(plain.client_config_mut().is_none());
        let mut with_cccd = plain.with_descriptor(uuids::CLIENT_CHARACTERISTIC_CONFIG);
        assert!(with_cccd.client_config_mut().is_some());
    }

    #[test]
    fn test_peripheral_serializes_to_json() {
        let p = sample();
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["id"], "AA:BB");
        assert_eq!(json["state"], "discovered");
        assert_eq!(json["services"].as_array().unwrap().len(), 2);
        assert!(json["last_seen"].is_null());
    }
}
