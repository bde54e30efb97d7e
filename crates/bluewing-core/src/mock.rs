//! Mock platform adapter for testing.
//!
//! [`MockAdapter`] implements [`PlatformAdapter`] without any BLE hardware.
//! It records every request a session issues and can answer some of them
//! automatically, synchronously from inside `submit`, the way an eager
//! backend would.
//!
//! # Features
//!
//! - **Request journal**: inspect exactly what the session asked for
//! - **Failure injection**: refuse permission or report a non-ready radio
//! - **Scripted responses**: connections, service trees, read values, RSSI, MTU
//! - **Raw injection**: [`MockAdapter::emit`] delivers any [`PlatformEvent`]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use bluewing_types::{AdapterState, PeripheralId};

use crate::adapter::{AdapterCapabilities, AdapterRequest, EventSink, PlatformAdapter, PlatformEvent};
use crate::model::Service;

/// A scripted advertisement replayed when a scan starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockAdvertisement {
    pub id: PeripheralId,
    pub name: Option<String>,
    pub rssi: Option<i16>,
}

/// A platform adapter that records requests and replays scripted responses.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use bluewing_core::{AdapterRequest, MockAdapter, Session, SessionConfig};
/// use bluewing_types::{AdapterState, PeripheralId};
///
/// let adapter = Arc::new(MockAdapter::builder()
///     .adapter_state(AdapterState::PoweredOff)
///     .build());
/// let session = Session::new(adapter.clone(), SessionConfig::default()).unwrap();
///
/// assert!(session.start_scan(None).is_err());
/// assert!(adapter.requests().is_empty());
///
/// adapter.set_adapter_state(AdapterState::PoweredOn);
/// session.start_scan(None).unwrap();
/// assert_eq!(adapter.requests(), vec![AdapterRequest::StartScan { filter: None }]);
/// ```
pub struct MockAdapter {
    permission: AtomicBool,
    state: Mutex<AdapterState>,
    capabilities: AdapterCapabilities,
    sink: Mutex<EventSink>,
    journal: Mutex<Vec<AdapterRequest>>,
    submit_count: AtomicU32,
    auto_connect: AtomicBool,
    auto_mtu: AtomicBool,
    advertisements: Vec<MockAdvertisement>,
    services: Mutex<Option<Vec<Service>>>,
    read_values: Mutex<HashMap<Uuid, Vec<u8>>>,
    rssi: Mutex<Option<i16>>,
}

impl std::fmt::Debug for MockAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockAdapter")
            .field("permission", &self.permission.load(Ordering::Relaxed))
            .field("state", &*lock(&self.state))
            .field("capabilities", &self.capabilities)
            .field("submitted", &self.submit_count.load(Ordering::Relaxed))
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAdapter {
    /// A powered-on adapter with permission granted and no scripted responses.
    pub fn new() -> Self {
        MockAdapterBuilder::new().build()
    }

    /// Start configuring a mock adapter.
    pub fn builder() -> MockAdapterBuilder {
        MockAdapterBuilder::new()
    }

    /// A random identifier in the style of a mock MAC.
    pub fn random_id() -> PeripheralId {
        PeripheralId::new(format!("MOCK-{:06X}", rand::random::<u32>() % 0xFFFFFF))
    }

    /// Deliver `event` to the attached session, as a native callback would.
    pub fn emit(&self, event: PlatformEvent) {
        let sink = lock(&self.sink).clone();
        sink.deliver(event);
    }

    /// Change the reported radio state and notify the session.
    pub fn power(&self, state: AdapterState) {
        self.set_adapter_state(state);
        self.emit(PlatformEvent::AdapterStateChanged(state));
    }

    /// Change the reported radio state without notifying anyone.
    pub fn set_adapter_state(&self, state: AdapterState) {
        *lock(&self.state) = state;
    }

    /// Grant or revoke scanning permission.
    pub fn set_permission(&self, granted: bool) {
        self.permission.store(granted, Ordering::SeqCst);
    }

    /// Answer `Connect`/`Disconnect` with connection callbacks.
    pub fn set_auto_connect(&self, enabled: bool) {
        self.auto_connect.store(enabled, Ordering::SeqCst);
    }

    /// Replace the service tree returned for `DiscoverServices`.
    pub fn set_services(&self, services: Vec<Service>) {
        *lock(&self.services) = Some(services);
    }

    /// Script the value returned for reads of `characteristic`.
    pub fn set_read_value(&self, characteristic: Uuid, value: Vec<u8>) {
        lock(&self.read_values).insert(characteristic, value);
    }

    /// Every request submitted so far, in order.
    pub fn requests(&self) -> Vec<AdapterRequest> {
        lock(&self.journal).clone()
    }

    /// Drain the journal.
    pub fn take_requests(&self) -> Vec<AdapterRequest> {
        std::mem::take(&mut *lock(&self.journal))
    }

    /// Empty the journal.
    pub fn clear_requests(&self) {
        lock(&self.journal).clear();
    }

    /// Total number of requests ever submitted, including cleared ones.
    pub fn submit_count(&self) -> u32 {
        self.submit_count.load(Ordering::Relaxed)
    }

    /// Whether a live session is attached.
    pub fn is_attached(&self) -> bool {
        lock(&self.sink).is_attached()
    }

    fn respond(&self, request: &AdapterRequest) -> Vec<PlatformEvent> {
        let auto_connect = self.auto_connect.load(Ordering::SeqCst);
        match request {
            AdapterRequest::StartScan { .. } => self
                .advertisements
                .iter()
                .map(|ad| PlatformEvent::Discovered {
                    id: ad.id.clone(),
                    name: ad.name.clone(),
                    rssi: ad.rssi,
                })
                .collect(),
            AdapterRequest::Connect(id) if auto_connect => {
                let name = self
                    .advertisements
                    .iter()
                    .find(|ad| &ad.id == id)
                    .and_then(|ad| ad.name.clone());
                vec![PlatformEvent::ConnectionChanged {
                    id: id.clone(),
                    connected: true,
                    name,
                }]
            }
            AdapterRequest::Disconnect(id) if auto_connect => {
                vec![PlatformEvent::ConnectionChanged {
                    id: id.clone(),
                    connected: false,
                    name: None,
                }]
            }
            AdapterRequest::DiscoverServices(id) => lock(&self.services)
                .clone()
                .map(|services| PlatformEvent::ServicesReady {
                    id: id.clone(),
                    services,
                })
                .into_iter()
                .collect(),
            AdapterRequest::Read { id, target } => lock(&self.read_values)
                .get(&target.characteristic_uuid)
                .map(|value| PlatformEvent::CharacteristicChanged {
                    id: id.clone(),
                    target: *target,
                    value: value.clone(),
                })
                .into_iter()
                .collect(),
            AdapterRequest::RequestRssi(id) => lock(&self.rssi)
                .map(|rssi| PlatformEvent::RssiRead {
                    id: id.clone(),
                    rssi,
                })
                .into_iter()
                .collect(),
            AdapterRequest::RequestMtu { id, size } if self.auto_mtu.load(Ordering::SeqCst) => {
                vec![PlatformEvent::MtuChanged {
                    id: id.clone(),
                    mtu: *size,
                }]
            }
            _ => Vec::new(),
        }
    }
}

impl PlatformAdapter for MockAdapter {
    fn capabilities(&self) -> AdapterCapabilities {
        self.capabilities
    }

    fn permission_granted(&self) -> bool {
        self.permission.load(Ordering::SeqCst)
    }

    fn adapter_state(&self) -> AdapterState {
        *lock(&self.state)
    }

    fn attach(&self, sink: EventSink) {
        *lock(&self.sink) = sink;
    }

    fn submit(&self, request: AdapterRequest) {
        self.submit_count.fetch_add(1, Ordering::Relaxed);
        let responses = self.respond(&request);
        lock(&self.journal).push(request);
        for event in responses {
            self.emit(event);
        }
    }
}

/// Builder for [`MockAdapter`].
#[derive(Debug, Clone)]
pub struct MockAdapterBuilder {
    permission: bool,
    state: AdapterState,
    capabilities: AdapterCapabilities,
    auto_connect: bool,
    auto_mtu: bool,
    advertisements: Vec<MockAdvertisement>,
    services: Option<Vec<Service>>,
    read_values: HashMap<Uuid, Vec<u8>>,
    rssi: Option<i16>,
}

impl Default for MockAdapterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAdapterBuilder {
    /// Create a builder with default values.
    pub fn new() -> Self {
        Self {
            permission: true,
            state: AdapterState::PoweredOn,
            capabilities: AdapterCapabilities::default(),
            auto_connect: false,
            auto_mtu: false,
            advertisements: Vec::new(),
            services: None,
            read_values: HashMap::new(),
            rssi: None,
        }
    }

    /// Whether scanning permission is granted.
    pub fn permission(mut self, granted: bool) -> Self {
        self.permission = granted;
        self
    }

    /// Initial radio state.
    pub fn adapter_state(mut self, state: AdapterState) -> Self {
        self.state = state;
        self
    }

    /// Reported capabilities.
    pub fn capabilities(mut self, capabilities: AdapterCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Answer `Connect` and `Disconnect` with connection callbacks.
    pub fn auto_connect(mut self, enabled: bool) -> Self {
        self.auto_connect = enabled;
        self
    }

    /// Answer `RequestMtu` with `MtuChanged` for the requested size.
    pub fn auto_mtu(mut self, enabled: bool) -> Self {
        self.auto_mtu = enabled;
        self
    }

    /// Report this advertisement every time a scan starts.
    pub fn advertise(mut self, id: impl Into<PeripheralId>, name: Option<&str>, rssi: i16) -> Self {
        self.advertisements.push(MockAdvertisement {
            id: id.into(),
            name: name.map(String::from),
            rssi: Some(rssi),
        });
        self
    }

    /// Answer `DiscoverServices` with this tree.
    pub fn services(mut self, services: Vec<Service>) -> Self {
        self.services = Some(services);
        self
    }

    /// Answer reads of `characteristic` with `value`.
    pub fn read_value(mut self, characteristic: Uuid, value: Vec<u8>) -> Self {
        self.read_values.insert(characteristic, value);
        self
    }

    /// Answer `RequestRssi` with `rssi`.
    pub fn rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    /// Build the mock adapter.
    pub fn build(self) -> MockAdapter {
        MockAdapter {
            permission: AtomicBool::new(self.permission),
            state: Mutex::new(self.state),
            capabilities: self.capabilities,
            sink: Mutex::new(EventSink::detached()),
            journal: Mutex::new(Vec::new()),
            submit_count: AtomicU32::new(0),
            auto_connect: AtomicBool::new(self.auto_connect),
            auto_mtu: AtomicBool::new(self.auto_mtu),
            advertisements: self.advertisements,
            services: Mutex::new(self.services),
            read_values: Mutex::new(self.read_values),
            rssi: Mutex::new(self.rssi),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Characteristic;
    use crate::{Session, SessionConfig, SessionEvent};
    use bluewing_types::uuids::{BATTERY_LEVEL, BATTERY_SERVICE};
    use bluewing_types::{CharacteristicProperties, ConnectionState};
    use std::sync::Arc;

    #[test]
    fn test_builder_defaults() {
        let adapter = MockAdapter::new();
        assert!(adapter.permission_granted());
        assert_eq!(adapter.adapter_state(), AdapterState::PoweredOn);
        assert_eq!(adapter.capabilities(), AdapterCapabilities::default());
        assert!(!adapter.is_attached());
        assert_eq!(adapter.submit_count(), 0);
    }

    #[test]
    fn test_journal_records_in_order() {
        let adapter = MockAdapter::new();
        adapter.submit(AdapterRequest::StartScan { filter: None });
        adapter.submit(AdapterRequest::StopScan);
        assert_eq!(
            adapter.take_requests(),
            vec![AdapterRequest::StartScan { filter: None }, AdapterRequest::StopScan]
        );
        assert!(adapter.requests().is_empty());
        assert_eq!(adapter.submit_count(), 2);
    }

    #[test]
    fn test_random_id_format() {
        let id = MockAdapter::random_id();
        assert!(id.as_str().starts_with("MOCK-"));
        assert_eq!(id.as_str().len(), 11);
    }

    #[test]
    fn test_scripted_advertisements_on_scan() {
        let adapter = Arc::new(
            MockAdapter::builder()
                .advertise("aa:01", Some("One"), -40)
                .advertise("aa:02", None, -70)
                .build(),
        );
        let session = Session::new(adapter.clone(), SessionConfig::default()).unwrap();
        session.start_scan(None).unwrap();

        let peripherals = session.peripherals();
        assert_eq!(peripherals.len(), 2);
        assert_eq!(peripherals[0].name.as_deref(), Some("One"));
        assert_eq!(peripherals[1].rssi, Some(-70));
    }

    #[test]
    fn test_auto_connect_full_lifecycle() {
        let services = vec![Service::new(BATTERY_SERVICE).with_characteristic(
            Characteristic::new(BATTERY_LEVEL, 3, CharacteristicProperties::READ),
        )];
        let adapter = Arc::new(
            MockAdapter::builder()
                .auto_connect(true)
                .services(services)
                .rssi(-33)
                .build(),
        );
        let session = Session::new(adapter.clone(), SessionConfig::default()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        session.subscribe(Arc::new(move |event: &SessionEvent| {
            sink.lock().unwrap().push(event.clone());
        }));

        let id = PeripheralId::new("aa");
        session.connect(&id).unwrap();
        let p = session.peripheral(&id).unwrap();
        assert_eq!(p.state, ConnectionState::Ready);
        assert_eq!(p.rssi, Some(-33));

        session.disconnect(&id).unwrap();
        let disconnects = seen
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, SessionEvent::Disconnected { .. }))
            .count();
        assert_eq!(disconnects, 1);
    }

    #[test]
    fn test_runtime_script_changes() {
        let adapter = Arc::new(MockAdapter::new());
        let session = Session::new(adapter.clone(), SessionConfig::default()).unwrap();
        adapter.set_permission(false);
        assert!(session.start_scan(None).is_err());
        adapter.set_permission(true);
        assert!(session.start_scan(None).is_ok());

        adapter.power(AdapterState::Resetting);
        assert_eq!(session.adapter_state(), AdapterState::Resetting);
        assert!(!session.is_scanning());

        adapter.set_auto_connect(true);
        adapter.set_read_value(BATTERY_LEVEL, vec![99]);
        adapter.set_services(vec![Service::new(BATTERY_SERVICE).with_characteristic(
            Characteristic::new(BATTERY_LEVEL, 1, CharacteristicProperties::READ),
        )]);
        let id = PeripheralId::new("bb");
        session.connect(&id).unwrap();
        assert_eq!(session.read_characteristic(&id, BATTERY_LEVEL).unwrap(), 1);
        let value = session.peripheral(&id).unwrap().services[0].characteristics[0]
            .value
            .clone();
        assert_eq!(value, Some(vec![99]));
    }
}
