//! The session manager.
//!
//! A [`Session`] owns one canonical [`Peripheral`] record per id, drives each
//! record through the connection state machine, and turns the backend's
//! [`PlatformEvent`]s into [`SessionEvent`]s for its delegates.
//!
//! Every operation and every inbound event follows the same discipline: under
//! the state lock, compute the events to emit and the requests to issue;
//! release the lock; dispatch the events; then submit the requests. Delegates
//! may therefore call back into the session, and a backend that answers
//! synchronously from inside `submit` still produces `Connected` before
//! `ServicesDiscovered`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use bluewing_types::{
    AdapterState, CharacteristicProperties, ConnectionState, PeripheralId, ScanFailure, uuids,
};

use crate::adapter::{AdapterCapabilities, AdapterRequest, EventSink, PlatformAdapter, PlatformEvent};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::events::{DisconnectReason, EventReceiver, SessionEvent};
use crate::logger::Logger;
use crate::model::{Characteristic, CharacteristicTarget, Peripheral, Service};
use crate::registry::{DelegateRegistry, SessionDelegate, SubscriptionId};
use crate::{ble_debug, ble_error, ble_verbose};

/// A BLE central session over one platform adapter.
///
/// Cheap to clone; clones share the same state.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use bluewing_core::{MockAdapter, Session, SessionConfig, SessionEvent};
/// use bluewing_types::PeripheralId;
///
/// let adapter = Arc::new(MockAdapter::builder().auto_connect(true).build());
/// let session = Session::new(adapter, SessionConfig::default()).unwrap();
///
/// session.subscribe(Arc::new(|event: &SessionEvent| {
///     if let SessionEvent::Connected { peripheral } = event {
///         println!("connected to {}", peripheral.id);
///     }
/// }));
///
/// let id = PeripheralId::new("aa:bb:cc:dd:ee:ff");
/// session.connect(&id).unwrap();
/// assert!(session.peripheral(&id).unwrap().state.is_connected());
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    adapter: Arc<dyn PlatformAdapter>,
    registry: DelegateRegistry,
    config: SessionConfig,
    state: Mutex<SessionState>,
}

struct SessionState {
    scanning: bool,
    adapter_state: AdapterState,
    peripherals: Vec<Peripheral>,
    index: HashMap<PeripheralId, usize>,
    /// RSSI updates held back until discovery on that peripheral completes.
    held_rssi: HashSet<PeripheralId>,
}

impl SessionState {
    fn get(&self, id: &PeripheralId) -> Option<&Peripheral> {
        self.index.get(id).and_then(|&i| self.peripherals.get(i))
    }

    fn get_mut(&mut self, id: &PeripheralId) -> Option<&mut Peripheral> {
        let i = *self.index.get(id)?;
        self.peripherals.get_mut(i)
    }

    fn require(&self, id: &PeripheralId) -> Result<&Peripheral> {
        self.get(id)
            .ok_or_else(|| Error::UnknownPeripheral(id.clone()))
    }

    fn require_mut(&mut self, id: &PeripheralId) -> Result<&mut Peripheral> {
        self.get_mut(id)
            .ok_or_else(|| Error::UnknownPeripheral(id.clone()))
    }

    fn get_or_insert(&mut self, id: &PeripheralId) -> &mut Peripheral {
        let i = match self.index.get(id) {
            Some(&i) => i,
            None => {
                self.peripherals.push(Peripheral::new(id.clone()));
                let i = self.peripherals.len() - 1;
                self.index.insert(id.clone(), i);
                i
            }
        };
        &mut self.peripherals[i]
    }
}

/// Events and requests produced under the lock, run after it is released.
#[derive(Default)]
struct Outcome {
    events: Vec<SessionEvent>,
    requests: Vec<AdapterRequest>,
}

impl Outcome {
    fn emit(&mut self, event: SessionEvent) {
        self.events.push(event);
    }

    fn request(&mut self, request: AdapterRequest) {
        self.requests.push(request);
    }
}

fn mark_disconnected(peripheral: &mut Peripheral) {
    peripheral.state = ConnectionState::Disconnected;
    peripheral.services.clear();
    peripheral.mtu = None;
}

impl Session {
    /// Create a session over `adapter`.
    ///
    /// Validates `config`, applies its log level to the process-wide logger,
    /// and attaches the adapter's event sink.
    pub fn new(adapter: Arc<dyn PlatformAdapter>, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Logger::global().set_level(config.log_level);

        let inner = Arc::new(SessionInner {
            registry: DelegateRegistry::new(config.event_capacity),
            state: Mutex::new(SessionState {
                scanning: false,
                adapter_state: adapter.adapter_state(),
                peripherals: Vec::new(),
                index: HashMap::new(),
                held_rssi: HashSet::new(),
            }),
            adapter,
            config,
        });
        inner
            .adapter
            .attach(EventSink::new(Arc::downgrade(&inner)));
        ble_debug!("session created");
        Ok(Self { inner })
    }

    pub(crate) fn from_inner(inner: Arc<SessionInner>) -> Self {
        Self { inner }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mutate state under the lock, then dispatch and submit with it released.
    fn transact<R>(&self, f: impl FnOnce(&mut SessionState, &mut Outcome) -> R) -> R {
        let mut outcome = Outcome::default();
        let result = {
            let mut state = self.lock();
            f(&mut state, &mut outcome)
        };
        for event in &outcome.events {
            self.inner.registry.notify(event);
        }
        for request in outcome.requests {
            self.inner.adapter.submit(request);
        }
        result
    }

    // --- Scanning ---

    /// Start continuous discovery.
    ///
    /// `service_filter` falls back to the configured default filter. Calling
    /// this while already scanning restarts the scan with the new filter.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] if the platform has not granted permission,
    /// [`Error::RadioUnavailable`] if the adapter is not powered on.
    pub fn start_scan(&self, service_filter: Option<Uuid>) -> Result<()> {
        let adapter = &self.inner.adapter;
        if !adapter.permission_granted() {
            ble_error!("scan refused: permission not granted");
            return Err(Error::PermissionDenied);
        }
        let radio = adapter.adapter_state();
        if !radio.is_ready() {
            ble_error!("scan refused: adapter is {}", radio);
            return Err(Error::radio_unavailable(radio));
        }

        let filter = service_filter.or(self.inner.config.service_filter);
        self.transact(|state, out| {
            state.adapter_state = radio;
            if state.scanning {
                out.request(AdapterRequest::StopScan);
            }
            state.scanning = true;
            out.request(AdapterRequest::StartScan { filter });
        });
        ble_debug!("scan started (filter: {:?})", filter);
        Ok(())
    }

    /// Stop discovery. A no-op when not scanning.
    pub fn stop_scan(&self) {
        let stopped = self.transact(|state, out| {
            if !state.scanning {
                return false;
            }
            state.scanning = false;
            out.request(AdapterRequest::StopScan);
            true
        });
        if stopped {
            ble_debug!("scan stopped");
        }
    }

    /// Whether discovery results are currently being delivered.
    pub fn is_scanning(&self) -> bool {
        self.lock().scanning
    }

    // --- Connection lifecycle ---

    /// Connect to a peripheral, creating its record if it was never seen.
    ///
    /// No timeout is applied. On backends without connect-failure reporting a
    /// failed attempt produces no event at all.
    pub fn connect(&self, id: &PeripheralId) -> Result<()> {
        self.transact(|state, out| {
            let peripheral = state.get_or_insert(id);
            if peripheral.state.is_linked() {
                ble_verbose!("connect ignored: {} is {}", id, peripheral.state);
                return;
            }
            peripheral.state = ConnectionState::Connecting;
            out.request(AdapterRequest::Connect(id.clone()));
            ble_debug!("connecting to {}", id);
        });
        Ok(())
    }

    /// Tear down the link to a peripheral.
    ///
    /// `Disconnected` is emitted immediately; the platform's own confirmation
    /// is then suppressed. A no-op if the peripheral has no link.
    pub fn disconnect(&self, id: &PeripheralId) -> Result<()> {
        self.transact(|state, out| -> Result<()> {
            let peripheral = state.require_mut(id)?;
            if !peripheral.state.is_linked() {
                return Ok(());
            }
            mark_disconnected(peripheral);
            out.emit(SessionEvent::Disconnected {
                peripheral: peripheral.clone(),
                reason: DisconnectReason::UserRequested,
            });
            out.request(AdapterRequest::Disconnect(id.clone()));
            ble_debug!("disconnecting from {}", id);
            Ok(())
        })
    }

    /// Request service discovery again.
    ///
    /// Discovery runs automatically after every connection; this is for
    /// refreshing the tree. A no-op unless the peripheral is connected.
    pub fn discover_services(&self, id: &PeripheralId) -> Result<()> {
        self.transact(|state, out| -> Result<()> {
            let peripheral = state.require_mut(id)?;
            if !peripheral.state.is_connected() {
                ble_debug!("discovery skipped: {} is {}", id, peripheral.state);
                return Ok(());
            }
            peripheral.state = ConnectionState::ServicesDiscovering;
            out.request(AdapterRequest::DiscoverServices(id.clone()));
            Ok(())
        })
    }

    // --- GATT operations ---

    /// Read every characteristic with this UUID, across all services.
    ///
    /// Returns how many reads were issued; zero before services are known.
    pub fn read_characteristic(&self, id: &PeripheralId, characteristic: Uuid) -> Result<usize> {
        self.for_each_match(id, characteristic, |c, out| {
            out.request(AdapterRequest::Read {
                id: id.clone(),
                target: c.target(),
            });
        })
    }

    /// Enable or disable value notifications for every matching characteristic.
    ///
    /// Each match gets the local notify toggle plus a write of the enable or
    /// disable payload to its client configuration descriptor, when it has one.
    pub fn set_notifications(
        &self,
        id: &PeripheralId,
        characteristic: Uuid,
        enabled: bool,
    ) -> Result<usize> {
        self.for_each_match(id, characteristic, |c, out| {
            let target = c.target();
            out.request(AdapterRequest::SetNotify {
                id: id.clone(),
                target,
                enabled,
            });
            let payload = c.client_config_payload(enabled);
            if let Some(descriptor) = c.client_config_mut() {
                descriptor.value = Some(payload.to_vec());
                out.request(AdapterRequest::WriteDescriptor {
                    id: id.clone(),
                    target,
                    descriptor: uuids::CLIENT_CHARACTERISTIC_CONFIG,
                    payload: payload.to_vec(),
                });
            }
        })
    }

    /// Write `value` as UTF-8 to every matching characteristic.
    ///
    /// Completion is not reported; a `CharacteristicValueChanged` follows only
    /// if the peripheral itself notifies.
    pub fn write_characteristic(
        &self,
        id: &PeripheralId,
        characteristic: Uuid,
        value: &str,
    ) -> Result<usize> {
        self.write_characteristic_bytes(id, characteristic, value.as_bytes())
    }

    /// Write raw bytes to every matching characteristic.
    pub fn write_characteristic_bytes(
        &self,
        id: &PeripheralId,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<usize> {
        self.for_each_match(id, characteristic, |c, out| {
            out.request(AdapterRequest::Write {
                id: id.clone(),
                target: c.target(),
                payload: payload.to_vec(),
            });
        })
    }

    fn for_each_match(
        &self,
        id: &PeripheralId,
        characteristic: Uuid,
        mut f: impl FnMut(&mut Characteristic, &mut Outcome),
    ) -> Result<usize> {
        self.transact(|state, out| -> Result<usize> {
            let peripheral = state.require_mut(id)?;
            let mut count = 0;
            for c in peripheral
                .services
                .iter_mut()
                .flat_map(|s| s.characteristics.iter_mut())
                .filter(|c| c.uuid == characteristic)
            {
                f(c, out);
                count += 1;
            }
            if count == 0 {
                ble_debug!(
                    "no characteristic {} on {} ({})",
                    characteristic,
                    id,
                    peripheral.state
                );
            }
            Ok(count)
        })
    }

    /// Ask for a new MTU.
    ///
    /// Backends that cannot negotiate get an immediate
    /// `MtuUpdated { negotiated: false }` echoing `size`.
    pub fn change_mtu(&self, id: &PeripheralId, size: u16) -> Result<()> {
        let negotiates = self.inner.adapter.capabilities().mtu_negotiation;
        self.transact(|state, out| -> Result<()> {
            let peripheral = state.require_mut(id)?;
            if negotiates {
                out.request(AdapterRequest::RequestMtu {
                    id: id.clone(),
                    size,
                });
            } else {
                peripheral.mtu = Some(size);
                out.emit(SessionEvent::MtuUpdated {
                    peripheral: peripheral.clone(),
                    mtu: size,
                    negotiated: false,
                });
            }
            Ok(())
        })
    }

    /// Refresh the peripheral's RSSI.
    pub fn read_rssi(&self, id: &PeripheralId) -> Result<()> {
        self.transact(|state, out| -> Result<()> {
            state.require(id)?;
            out.request(AdapterRequest::RequestRssi(id.clone()));
            Ok(())
        })
    }

    // --- Queries ---

    /// Snapshot of one peripheral.
    pub fn peripheral(&self, id: &PeripheralId) -> Option<Peripheral> {
        self.lock().get(id).cloned()
    }

    /// Snapshot of every known peripheral, in first-seen order.
    pub fn peripherals(&self) -> Vec<Peripheral> {
        self.lock().peripherals.clone()
    }

    /// Last adapter state observed.
    pub fn adapter_state(&self) -> AdapterState {
        self.lock().adapter_state
    }

    /// Guarantees the backend provides.
    pub fn capabilities(&self) -> AdapterCapabilities {
        self.inner.adapter.capabilities()
    }

    /// The configuration this session was created with.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    // --- Subscriptions ---

    /// Register a delegate for every subsequent event.
    pub fn subscribe(&self, delegate: Arc<dyn SessionDelegate>) -> SubscriptionId {
        self.inner.registry.subscribe(delegate)
    }

    /// Remove a delegate. Safe to call from inside its own callback.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.registry.unsubscribe(id)
    }

    /// Receive every subsequent event over a broadcast channel.
    pub fn events(&self) -> EventReceiver {
        self.inner.registry.events()
    }

    // --- Inbound ---

    /// Feed one backend callback into the state machine.
    ///
    /// Backends normally call this through their [`EventSink`]; it is public
    /// for custom backends and tests.
    pub fn handle_event(&self, event: PlatformEvent) {
        self.transact(|state, out| match event {
            PlatformEvent::AdapterStateChanged(radio) => on_adapter_state(state, out, radio),
            PlatformEvent::Discovered { id, name, rssi } => {
                on_discovered(state, out, id, name, rssi)
            }
            PlatformEvent::ConnectionChanged {
                id,
                connected: true,
                name,
            } => on_connected(state, out, id, name),
            PlatformEvent::ConnectionChanged {
                id,
                connected: false,
                ..
            } => on_disconnected(state, out, id),
            PlatformEvent::ServicesReady { id, services } => {
                on_services_ready(state, out, id, services)
            }
            PlatformEvent::CharacteristicChanged { id, target, value } => {
                on_characteristic_changed(state, out, id, target, value)
            }
            PlatformEvent::RssiRead { id, rssi } => on_rssi(state, out, id, rssi),
            PlatformEvent::MtuChanged { id, mtu } => {
                if let Some(peripheral) = state.get_mut(&id) {
                    peripheral.mtu = Some(mtu);
                    out.emit(SessionEvent::MtuUpdated {
                        peripheral: peripheral.clone(),
                        mtu,
                        negotiated: true,
                    });
                } else {
                    ble_verbose!("mtu for unknown peripheral {} dropped", id);
                }
            }
            PlatformEvent::ScanFailed(reason) => {
                ble_error!("scan failed: {}", reason);
                state.scanning = false;
                out.emit(SessionEvent::ScanFailed { reason });
            }
        });
    }
}

fn on_adapter_state(state: &mut SessionState, out: &mut Outcome, radio: AdapterState) {
    ble_debug!("adapter is {}", radio);
    state.adapter_state = radio;
    out.emit(SessionEvent::AdapterStateChanged { state: radio });
    if radio.is_ready() {
        return;
    }

    state.scanning = false;
    out.emit(SessionEvent::ScanFailed {
        reason: ScanFailure::AdapterUnavailable(radio),
    });
    for peripheral in state.peripherals.iter_mut().filter(|p| p.state.is_linked()) {
        mark_disconnected(peripheral);
        out.emit(SessionEvent::Disconnected {
            peripheral: peripheral.clone(),
            reason: DisconnectReason::AdapterUnavailable,
        });
    }
}

fn on_discovered(
    state: &mut SessionState,
    out: &mut Outcome,
    id: PeripheralId,
    name: Option<String>,
    rssi: Option<i16>,
) {
    if !state.scanning {
        ble_verbose!("sighting of {} dropped: not scanning", id);
        return;
    }
    let peripheral = state.get_or_insert(&id);
    peripheral.record_sighting(name, rssi);
    if peripheral.state == ConnectionState::Disconnected {
        peripheral.state = ConnectionState::Discovered;
    }
    ble_verbose!("discovered {} (rssi {:?})", id, peripheral.rssi);
    out.emit(SessionEvent::PeripheralDiscovered {
        peripheral: peripheral.clone(),
    });
}

fn on_connected(state: &mut SessionState, out: &mut Outcome, id: PeripheralId, name: Option<String>) {
    state.held_rssi.remove(&id);
    let peripheral = state.get_or_insert(&id);
    if peripheral.state.is_connected() {
        ble_verbose!("duplicate connect for {} ignored", id);
        return;
    }
    if peripheral.name.is_none() {
        peripheral.name = name;
    }
    peripheral.state = ConnectionState::Connected;
    ble_debug!("connected to {}", id);
    out.emit(SessionEvent::Connected {
        peripheral: peripheral.clone(),
    });

    peripheral.state = ConnectionState::ServicesDiscovering;
    out.request(AdapterRequest::DiscoverServices(id.clone()));
    out.request(AdapterRequest::RequestRssi(id));
}

fn on_disconnected(state: &mut SessionState, out: &mut Outcome, id: PeripheralId) {
    let Some(peripheral) = state.get_mut(&id) else {
        ble_verbose!("disconnect for unknown peripheral {} ignored", id);
        return;
    };
    if !peripheral.state.is_linked() {
        ble_verbose!("disconnect for {} suppressed: already {}", id, peripheral.state);
        return;
    }
    mark_disconnected(peripheral);
    ble_debug!("disconnected from {}", id);
    out.emit(SessionEvent::Disconnected {
        peripheral: peripheral.clone(),
        reason: DisconnectReason::Remote,
    });
}

fn on_services_ready(
    state: &mut SessionState,
    out: &mut Outcome,
    id: PeripheralId,
    services: Vec<Service>,
) {
    let Some(peripheral) = state.get_mut(&id) else {
        ble_verbose!("services for unknown peripheral {} dropped", id);
        return;
    };
    if !peripheral.state.is_connected() {
        ble_debug!("services for {} dropped: {}", id, peripheral.state);
        return;
    }
    peripheral.services = services
        .into_iter()
        .map(|mut service| {
            for c in &mut service.characteristics {
                c.service_uuid = service.uuid;
            }
            service
        })
        .collect();
    peripheral.state = ConnectionState::Ready;
    ble_debug!("{} services discovered on {}", peripheral.services.len(), id);

    let snapshot = peripheral.clone();
    out.emit(SessionEvent::ServicesDiscovered {
        peripheral: snapshot.clone(),
    });
    out.emit(SessionEvent::CharacteristicsDiscovered {
        peripheral: snapshot.clone(),
    });
    if state.held_rssi.remove(&id) {
        out.emit(SessionEvent::RssiUpdated {
            peripheral: snapshot,
        });
    }
}

// Discovery events must directly follow `Connected`, so an RSSI reading
// that lands first is stored now and reported once discovery completes.
fn on_rssi(state: &mut SessionState, out: &mut Outcome, id: PeripheralId, rssi: i16) {
    let Some(peripheral) = state.get_mut(&id) else {
        ble_verbose!("rssi for unknown peripheral {} dropped", id);
        return;
    };
    peripheral.rssi = Some(rssi);
    if peripheral.state == ConnectionState::ServicesDiscovering {
        ble_verbose!("rssi for {} held until discovery completes", id);
        state.held_rssi.insert(id);
        return;
    }
    out.emit(SessionEvent::RssiUpdated {
        peripheral: peripheral.clone(),
    });
}

fn on_characteristic_changed(
    state: &mut SessionState,
    out: &mut Outcome,
    id: PeripheralId,
    target: CharacteristicTarget,
    value: Vec<u8>,
) {
    let Some(peripheral) = state.get_mut(&id) else {
        ble_verbose!("value for unknown peripheral {} dropped", id);
        return;
    };
    let characteristic = match peripheral.characteristic_mut(&target) {
        Some(c) => {
            c.value = Some(value);
            c.clone()
        }
        None => {
            let mut detached = Characteristic::new(
                target.characteristic_uuid,
                target.handle,
                CharacteristicProperties::empty(),
            );
            detached.service_uuid = target.service_uuid;
            detached.value = Some(value);
            detached
        }
    };
    ble_verbose!("{} changed on {}", characteristic.uuid, id);
    out.emit(SessionEvent::CharacteristicValueChanged {
        peripheral: peripheral.clone(),
        characteristic,
    });
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Session")
            .field("scanning", &state.scanning)
            .field("adapter_state", &state.adapter_state)
            .field("peripherals", &state.peripherals.len())
            .field("delegates", &self.inner.registry.len())
            .finish()
    }
}
