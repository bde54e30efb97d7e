//! Platform adapter contract.
//!
//! A backend translates its native BLE stack into two vocabularies: the
//! [`AdapterRequest`]s a session issues, and the [`PlatformEvent`]s it reports
//! back through an [`EventSink`]. Requests are fire-and-forget; every outcome
//! arrives later as an event (or never, on stacks that do not report it; see
//! [`AdapterCapabilities`]).

use std::sync::Weak;

use uuid::Uuid;

use bluewing_types::{AdapterState, PeripheralId, ScanFailure};

use crate::model::{CharacteristicTarget, Service};
use crate::session::{Session, SessionInner};

/// Native callbacks, normalised.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    /// The adapter's radio state changed.
    AdapterStateChanged(AdapterState),
    /// An advertisement was received.
    Discovered {
        id: PeripheralId,
        name: Option<String>,
        rssi: Option<i16>,
    },
    /// A link came up or went down.
    ConnectionChanged {
        id: PeripheralId,
        connected: bool,
        /// Name cached by the OS, if the connection object carries one.
        name: Option<String>,
    },
    /// Service discovery finished with this tree.
    ServicesReady {
        id: PeripheralId,
        services: Vec<Service>,
    },
    /// A read completed or a notification arrived.
    CharacteristicChanged {
        id: PeripheralId,
        target: CharacteristicTarget,
        value: Vec<u8>,
    },
    /// An RSSI read completed.
    RssiRead { id: PeripheralId, rssi: i16 },
    /// The link MTU changed.
    MtuChanged { id: PeripheralId, mtu: u16 },
    /// The platform stopped an ongoing scan.
    ScanFailed(ScanFailure),
}

/// Requests a session issues to its backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterRequest {
    StartScan { filter: Option<Uuid> },
    StopScan,
    Connect(PeripheralId),
    Disconnect(PeripheralId),
    DiscoverServices(PeripheralId),
    Read {
        id: PeripheralId,
        target: CharacteristicTarget,
    },
    /// Write with response; the payload is already encoded.
    Write {
        id: PeripheralId,
        target: CharacteristicTarget,
        payload: Vec<u8>,
    },
    /// Toggle the local notification flag for a characteristic.
    SetNotify {
        id: PeripheralId,
        target: CharacteristicTarget,
        enabled: bool,
    },
    WriteDescriptor {
        id: PeripheralId,
        target: CharacteristicTarget,
        descriptor: Uuid,
        payload: Vec<u8>,
    },
    RequestRssi(PeripheralId),
    RequestMtu { id: PeripheralId, size: u16 },
}

impl AdapterRequest {
    /// The peripheral this request addresses, if any.
    pub fn peripheral_id(&self) -> Option<&PeripheralId> {
        match self {
            AdapterRequest::StartScan { .. } | AdapterRequest::StopScan => None,
            AdapterRequest::Connect(id)
            | AdapterRequest::Disconnect(id)
            | AdapterRequest::DiscoverServices(id)
            | AdapterRequest::RequestRssi(id) => Some(id),
            AdapterRequest::Read { id, .. }
            | AdapterRequest::Write { id, .. }
            | AdapterRequest::SetNotify { id, .. }
            | AdapterRequest::WriteDescriptor { id, .. }
            | AdapterRequest::RequestMtu { id, .. } => Some(id),
        }
    }
}

/// Guarantees that differ between native stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterCapabilities {
    /// The backend really renegotiates the MTU. When false the session
    /// echoes the requested size back as `MtuUpdated { negotiated: false }`.
    pub mtu_negotiation: bool,
    /// The backend learns when a write completes.
    pub write_completion: bool,
    /// The backend reports failed connection attempts. When false a failed
    /// connect produces no event at all.
    pub connect_failure_reporting: bool,
}

impl Default for AdapterCapabilities {
    fn default() -> Self {
        Self {
            mtu_negotiation: true,
            write_completion: true,
            connect_failure_reporting: true,
        }
    }
}

/// A native BLE central stack.
///
/// Implementations must not call back into the sink synchronously while
/// holding their own locks; the session may issue further requests from
/// inside event handling.
pub trait PlatformAdapter: Send + Sync {
    /// What this backend can and cannot report.
    fn capabilities(&self) -> AdapterCapabilities;

    /// Whether the OS has granted the permissions scanning needs.
    fn permission_granted(&self) -> bool;

    /// Current radio state.
    fn adapter_state(&self) -> AdapterState;

    /// Called once when a session takes ownership of the adapter.
    fn attach(&self, sink: EventSink);

    /// Issue a request. Must not block.
    fn submit(&self, request: AdapterRequest);
}

/// Handle a backend uses to report [`PlatformEvent`]s.
///
/// Safe to clone and to use from any thread. Delivery after the session has
/// been dropped is silently ignored.
#[derive(Clone, Default)]
pub struct EventSink {
    session: Weak<SessionInner>,
}

impl EventSink {
    pub(crate) fn new(session: Weak<SessionInner>) -> Self {
        Self { session }
    }

    /// A sink connected to nothing.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Feed one event into the owning session.
    pub fn deliver(&self, event: PlatformEvent) {
        if let Some(inner) = self.session.upgrade() {
            Session::from_inner(inner).handle_event(event);
        }
    }

    /// Whether the owning session is still alive.
    pub fn is_attached(&self) -> bool {
        self.session.strong_count() > 0
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("attached", &self.is_attached())
            .finish()
    }
}
