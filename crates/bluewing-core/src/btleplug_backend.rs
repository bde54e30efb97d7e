//! Platform adapter backed by btleplug.
//!
//! btleplug covers CoreBluetooth, BlueZ and WinRT behind one async API.
//! Requests run on the tokio runtime the adapter was created on, one lane per
//! peripheral plus one for scanning: requests for the same peripheral execute
//! in the order the session issued them. A single pump task translates
//! btleplug's central events. Differences from the other backends:
//!
//! - no MTU negotiation: the session echoes the requested size instead
//! - RSSI refresh re-reads the last advertisement RSSI
//! - the client configuration descriptor is written by btleplug itself when
//!   subscribing, so explicit writes to it are skipped
//! - characteristic handles are assigned in discovery order
//! - notifications carry only a characteristic UUID. They are routed to the
//!   subscribed instance with that UUID, so two subscribed instances sharing
//!   a UUID cannot be told apart
//! - a `Disconnect` issued while a connection attempt is pending withdraws
//!   the attempt, which then reports nothing

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic as NativeCharacteristic, Manager as _,
    Peripheral as _, ScanFilter, Service as NativeService, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral as NativePeripheral, PeripheralId as NativeId};
use futures::{FutureExt, StreamExt};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use bluewing_types::{AdapterState, CharacteristicProperties, PeripheralId, ScanFailure, uuids};

use crate::adapter::{AdapterCapabilities, AdapterRequest, EventSink, PlatformAdapter, PlatformEvent};
use crate::error::{Error, Result};
use crate::model::{Characteristic, CharacteristicTarget, Service};
use crate::queue::SerialQueues;
use crate::util::create_identifier;
use crate::{ble_debug, ble_error, ble_verbose};

/// A [`PlatformAdapter`] over the first btleplug adapter on this host.
///
/// Must be created inside a tokio runtime.
///
/// ```no_run
/// use std::sync::Arc;
/// use bluewing_core::{BtleplugAdapter, Session, SessionConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let adapter = Arc::new(BtleplugAdapter::new().await?);
///     let session = Session::new(adapter, SessionConfig::default())?;
///     session.start_scan(None)?;
///     Ok(())
/// }
/// ```
pub struct BtleplugAdapter {
    shared: Arc<Shared>,
    lanes: SerialQueues<Option<PeripheralId>, Queued>,
    runtime: Handle,
}

/// A request plus, for `Connect`, the token a later `Disconnect` cancels.
type Queued = (AdapterRequest, Option<CancellationToken>);

struct Shared {
    adapter: Adapter,
    sink: Mutex<EventSink>,
    known: Mutex<HashMap<PeripheralId, NativeId>>,
    links: Mutex<HashMap<PeripheralId, CancellationToken>>,
    connecting: Mutex<HashMap<PeripheralId, CancellationToken>>,
    subscribed: Mutex<HashMap<PeripheralId, Vec<CharacteristicTarget>>>,
    state: Mutex<AdapterState>,
    cancel: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl BtleplugAdapter {
    /// Use the first Bluetooth adapter on this host.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(Error::NoAdapter)?;
        Ok(Self::with_adapter(adapter))
    }

    /// Wrap an adapter the caller already selected.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn with_adapter(adapter: Adapter) -> Self {
        let shared = Arc::new(Shared {
            adapter,
            sink: Mutex::new(EventSink::detached()),
            known: Mutex::new(HashMap::new()),
            links: Mutex::new(HashMap::new()),
            connecting: Mutex::new(HashMap::new()),
            subscribed: Mutex::new(HashMap::new()),
            state: Mutex::new(AdapterState::PoweredOn),
            cancel: CancellationToken::new(),
        });
        let runtime = Handle::current();
        let worker = Arc::clone(&shared);
        let lanes = SerialQueues::new(runtime.clone(), move |(request, token): Queued| {
            let shared = Arc::clone(&worker);
            async move {
                let label = format!("{:?}", request);
                if let Err(e) = shared.execute(request, token).await {
                    ble_error!("{} failed: {}", label, e);
                }
            }
            .boxed()
        });
        Self {
            shared,
            lanes,
            runtime,
        }
    }

    /// The underlying btleplug adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.shared.adapter
    }

    /// Wait until every request submitted so far has been carried out.
    ///
    /// Call this before the runtime shuts down so a final `Disconnect` or
    /// `StopScan` actually reaches the radio.
    pub async fn flush(&self) {
        self.lanes.flush().await;
    }
}

impl PlatformAdapter for BtleplugAdapter {
    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            mtu_negotiation: false,
            write_completion: true,
            connect_failure_reporting: true,
        }
    }

    // Permission problems surface as scan errors instead.
    fn permission_granted(&self) -> bool {
        true
    }

    fn adapter_state(&self) -> AdapterState {
        *lock(&self.shared.state)
    }

    fn attach(&self, sink: EventSink) {
        *lock(&self.shared.sink) = sink;
        let shared = Arc::clone(&self.shared);
        self.runtime.spawn(shared.pump());
    }

    fn submit(&self, request: AdapterRequest) {
        let token = match &request {
            AdapterRequest::Connect(id) => {
                let token = CancellationToken::new();
                lock(&self.shared.connecting).insert(id.clone(), token.clone());
                Some(token)
            }
            AdapterRequest::Disconnect(id) => {
                if let Some(pending) = lock(&self.shared.connecting).get(id) {
                    pending.cancel();
                }
                None
            }
            _ => None,
        };
        let lane = request.peripheral_id().cloned();
        self.lanes.push(lane, (request, token));
    }
}

impl Drop for BtleplugAdapter {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

impl Shared {
    fn emit(&self, event: PlatformEvent) {
        let sink = lock(&self.sink).clone();
        sink.deliver(event);
    }

    /// Translate btleplug central events until cancelled.
    async fn pump(self: Arc<Self>) {
        let mut events = match self.adapter.events().await {
            Ok(events) => events,
            Err(e) => {
                ble_error!("cannot listen for adapter events: {}", e);
                return;
            }
        };
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = events.next() => match event {
                    Some(event) => self.translate(event).await,
                    None => break,
                },
            }
        }
        ble_debug!("adapter event pump stopped");
    }

    async fn translate(self: &Arc<Self>, event: CentralEvent) {
        match event {
            CentralEvent::DeviceDiscovered(native) | CentralEvent::DeviceUpdated(native) => {
                if let Some((id, name, rssi)) = self.identify(&native).await {
                    self.emit(PlatformEvent::Discovered { id, name, rssi });
                }
            }
            CentralEvent::DeviceConnected(native) => {
                if let Some((id, name, _)) = self.identify(&native).await {
                    if self.withdrawn(&id) {
                        ble_verbose!("connection to {} withdrawn, not reported", id);
                        return;
                    }
                    self.emit(PlatformEvent::ConnectionChanged {
                        id,
                        connected: true,
                        name,
                    });
                }
            }
            CentralEvent::DeviceDisconnected(native) => {
                if let Some((id, _, _)) = self.identify(&native).await {
                    self.stop_watching(&id);
                    self.emit(PlatformEvent::ConnectionChanged {
                        id,
                        connected: false,
                        name: None,
                    });
                }
            }
            _ => {}
        }
    }

    /// Resolve a native id to our identity plus advertised name and RSSI.
    async fn identify(&self, native: &NativeId) -> Option<(PeripheralId, Option<String>, Option<i16>)> {
        let peripheral = self.adapter.peripheral(native).await.ok()?;
        let properties = peripheral.properties().await.ok().flatten();
        let address = properties
            .as_ref()
            .map(|p| p.address)
            .unwrap_or_else(|| peripheral.address());
        let id = create_identifier(&address.to_string(), native);
        lock(&self.known).insert(id.clone(), native.clone());
        let (name, rssi) = properties
            .map(|p| (p.local_name, p.rssi))
            .unwrap_or((None, None));
        Some((id, name, rssi))
    }

    fn withdrawn(&self, id: &PeripheralId) -> bool {
        lock(&self.connecting)
            .get(id)
            .is_some_and(CancellationToken::is_cancelled)
    }

    async fn resolve(&self, id: &PeripheralId) -> Option<NativePeripheral> {
        let native = lock(&self.known).get(id).cloned();
        if let Some(native) = native {
            return self.adapter.peripheral(&native).await.ok();
        }
        for peripheral in self.adapter.peripherals().await.ok()? {
            let native = peripheral.id();
            let candidate = create_identifier(&peripheral.address().to_string(), &native);
            if &candidate == id {
                lock(&self.known).insert(candidate, native);
                return Some(peripheral);
            }
        }
        None
    }

    async fn require(&self, id: &PeripheralId) -> btleplug::Result<NativePeripheral> {
        self.resolve(id).await.ok_or(btleplug::Error::DeviceNotFound)
    }

    async fn execute(
        self: &Arc<Self>,
        request: AdapterRequest,
        token: Option<CancellationToken>,
    ) -> btleplug::Result<()> {
        match request {
            AdapterRequest::StartScan { filter } => {
                let filter = ScanFilter {
                    services: filter.into_iter().collect(),
                };
                if let Err(e) = self.adapter.start_scan(filter).await {
                    self.emit(PlatformEvent::ScanFailed(scan_failure(&e)));
                    return Err(e);
                }
            }
            AdapterRequest::StopScan => self.adapter.stop_scan().await?,
            AdapterRequest::Connect(id) => {
                let token = token.unwrap_or_else(CancellationToken::new);
                if token.is_cancelled() {
                    ble_debug!("connect to {} withdrawn before it started", id);
                    return Ok(());
                }
                let connected = match self.resolve(&id).await {
                    Some(peripheral) => {
                        let attempt = tokio::select! {
                            _ = token.cancelled() => None,
                            result = peripheral.connect() => Some(result),
                        };
                        match attempt {
                            Some(result) if !token.is_cancelled() => result.map(|()| peripheral),
                            _ => {
                                ble_debug!("connect to {} withdrawn", id);
                                let _ = peripheral.disconnect().await;
                                return Ok(());
                            }
                        }
                    }
                    None => Err(btleplug::Error::DeviceNotFound),
                };
                match connected {
                    Ok(peripheral) => {
                        self.watch_notifications(&id, &peripheral).await;
                        let name = peripheral
                            .properties()
                            .await
                            .ok()
                            .flatten()
                            .and_then(|p| p.local_name);
                        self.emit(PlatformEvent::ConnectionChanged {
                            id,
                            connected: true,
                            name,
                        });
                    }
                    Err(e) => {
                        self.emit(PlatformEvent::ConnectionChanged {
                            id,
                            connected: false,
                            name: None,
                        });
                        return Err(e);
                    }
                }
            }
            AdapterRequest::Disconnect(id) => {
                self.stop_watching(&id);
                self.require(&id).await?.disconnect().await?;
            }
            AdapterRequest::DiscoverServices(id) => {
                let peripheral = self.require(&id).await?;
                peripheral.discover_services().await?;
                let services = convert_services(&peripheral.services());
                self.emit(PlatformEvent::ServicesReady { id, services });
            }
            AdapterRequest::Read { id, target } => {
                let peripheral = self.require(&id).await?;
                let characteristic = native_characteristic(&peripheral.services(), &target)?;
                let value = peripheral.read(&characteristic).await?;
                self.emit(PlatformEvent::CharacteristicChanged { id, target, value });
            }
            AdapterRequest::Write {
                id,
                target,
                payload,
            } => {
                let peripheral = self.require(&id).await?;
                let characteristic = native_characteristic(&peripheral.services(), &target)?;
                let write_type = if characteristic.properties.contains(CharPropFlags::WRITE) {
                    WriteType::WithResponse
                } else {
                    WriteType::WithoutResponse
                };
                peripheral
                    .write(&characteristic, &payload, write_type)
                    .await?;
            }
            AdapterRequest::SetNotify {
                id,
                target,
                enabled,
            } => {
                let peripheral = self.require(&id).await?;
                let characteristic = native_characteristic(&peripheral.services(), &target)?;
                if enabled {
                    peripheral.subscribe(&characteristic).await?;
                    let mut subscribed = lock(&self.subscribed);
                    let targets = subscribed.entry(id).or_default();
                    if !targets.contains(&target) {
                        targets.push(target);
                    }
                } else {
                    peripheral.unsubscribe(&characteristic).await?;
                    if let Some(targets) = lock(&self.subscribed).get_mut(&id) {
                        targets.retain(|t| *t != target);
                    }
                }
            }
            AdapterRequest::WriteDescriptor {
                id,
                target,
                descriptor,
                payload,
            } => {
                if descriptor == uuids::CLIENT_CHARACTERISTIC_CONFIG {
                    ble_verbose!("client configuration on {} set by subscribe", id);
                    return Ok(());
                }
                let peripheral = self.require(&id).await?;
                let characteristic = native_characteristic(&peripheral.services(), &target)?;
                let native = characteristic
                    .descriptors
                    .iter()
                    .find(|d| d.uuid == descriptor)
                    .cloned()
                    .ok_or(btleplug::Error::NoSuchCharacteristic)?;
                peripheral.write_descriptor(&native, &payload).await?;
            }
            AdapterRequest::RequestRssi(id) => {
                let peripheral = self.require(&id).await?;
                if let Some(rssi) = peripheral.properties().await?.and_then(|p| p.rssi) {
                    self.emit(PlatformEvent::RssiRead { id, rssi });
                }
            }
            AdapterRequest::RequestMtu { id, size } => {
                ble_debug!("MTU {} for {} not negotiable on this backend", size, id);
            }
        }
        Ok(())
    }

    /// Forward value notifications for `id` until it disconnects.
    async fn watch_notifications(self: &Arc<Self>, id: &PeripheralId, peripheral: &NativePeripheral) {
        let mut stream = match peripheral.notifications().await {
            Ok(stream) => stream,
            Err(e) => {
                ble_error!("cannot listen for notifications from {}: {}", id, e);
                return;
            }
        };
        let token = self.cancel.child_token();
        if let Some(previous) = lock(&self.links).insert(id.clone(), token.clone()) {
            previous.cancel();
        }

        let shared = Arc::clone(self);
        let peripheral = peripheral.clone();
        let id = id.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    notification = stream.next() => {
                        let Some(notification) = notification else { break };
                        let services = convert_services(&peripheral.services());
                        let subscribed = lock(&shared.subscribed).get(&id).cloned().unwrap_or_default();
                        let Some(target) = route_notification(&subscribed, &services, notification.uuid)
                        else {
                            ble_verbose!("notification for unknown {} dropped", notification.uuid);
                            continue;
                        };
                        shared.emit(PlatformEvent::CharacteristicChanged {
                            id: id.clone(),
                            target,
                            value: notification.value,
                        });
                    }
                }
            }
        });
    }

    fn stop_watching(&self, id: &PeripheralId) {
        if let Some(token) = lock(&self.links).remove(id) {
            token.cancel();
        }
        lock(&self.subscribed).remove(id);
    }
}

/// The instance a value notification for `uuid` belongs to: a subscribed
/// instance when there is one, else the first instance in the tree.
fn route_notification(
    subscribed: &[CharacteristicTarget],
    services: &[Service],
    uuid: Uuid,
) -> Option<CharacteristicTarget> {
    subscribed
        .iter()
        .find(|t| t.characteristic_uuid == uuid)
        .copied()
        .or_else(|| {
            services
                .iter()
                .flat_map(|s| s.characteristics.iter())
                .find(|c| c.uuid == uuid)
                .map(Characteristic::target)
        })
}

fn scan_failure(error: &btleplug::Error) -> ScanFailure {
    match error {
        btleplug::Error::PermissionDenied => ScanFailure::PermissionDenied,
        btleplug::Error::NotSupported(_) => ScanFailure::FeatureUnsupported,
        other => ScanFailure::Other(other.to_string()),
    }
}

/// Convert a btleplug service tree, numbering characteristics in order.
fn convert_services(services: &BTreeSet<NativeService>) -> Vec<Service> {
    let mut handle: u16 = 0;
    services
        .iter()
        .map(|native| {
            let mut service = Service::new(native.uuid);
            if !native.primary {
                service = service.secondary();
            }
            for c in &native.characteristics {
                handle = handle.wrapping_add(1);
                let mut characteristic = Characteristic::new(
                    c.uuid,
                    handle,
                    CharacteristicProperties::from_bits(c.properties.bits()),
                );
                for descriptor in &c.descriptors {
                    characteristic = characteristic.with_descriptor(descriptor.uuid);
                }
                service = service.with_characteristic(characteristic);
            }
            service
        })
        .collect()
}

/// Find the native characteristic numbered `target.handle` by [`convert_services`].
fn native_characteristic(
    services: &BTreeSet<NativeService>,
    target: &CharacteristicTarget,
) -> btleplug::Result<NativeCharacteristic> {
    services
        .iter()
        .flat_map(|s| s.characteristics.iter())
        .zip(1u16..)
        .find(|(c, handle)| *handle == target.handle && c.uuid == target.characteristic_uuid)
        .map(|(c, _)| c.clone())
        .ok_or(btleplug::Error::NoSuchCharacteristic)
}
