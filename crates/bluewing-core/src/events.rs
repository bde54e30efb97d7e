//! Session event vocabulary.
//!
//! Every lifecycle change a session observes is reported as one
//! [`SessionEvent`], delivered to registered delegates and to any
//! [`EventReceiver`] obtained from [`Session::events`](crate::Session::events).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use bluewing_types::{AdapterState, PeripheralId, ScanFailure};

use crate::model::{Characteristic, Peripheral};

/// Events emitted by a session.
///
/// Peripheral-carrying variants hold a snapshot taken at the moment the event
/// was produced. For one peripheral, `Connected` is always delivered before
/// `ServicesDiscovered`, which is always immediately followed by
/// `CharacteristicsDiscovered`.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SessionEvent {
    /// The local adapter changed state.
    AdapterStateChanged { state: AdapterState },
    /// An advertisement was received. Every sighting is reported.
    PeripheralDiscovered { peripheral: Peripheral },
    /// The link to a peripheral came up.
    Connected { peripheral: Peripheral },
    /// The link to a peripheral went down.
    Disconnected {
        peripheral: Peripheral,
        reason: DisconnectReason,
    },
    /// Service discovery completed and the service list was replaced.
    ServicesDiscovered { peripheral: Peripheral },
    /// Characteristics of the new service list are available.
    CharacteristicsDiscovered { peripheral: Peripheral },
    /// A read completed or a notification arrived.
    CharacteristicValueChanged {
        peripheral: Peripheral,
        characteristic: Characteristic,
    },
    /// A fresh RSSI value was read.
    RssiUpdated { peripheral: Peripheral },
    /// The MTU changed.
    ///
    /// `negotiated` is false when the backend cannot negotiate and the
    /// requested size was only echoed back.
    MtuUpdated {
        peripheral: Peripheral,
        mtu: u16,
        negotiated: bool,
    },
    /// Scanning stopped for a platform reason.
    ScanFailed { reason: ScanFailure },
}

impl SessionEvent {
    /// The id of the peripheral this event concerns, if any.
    pub fn peripheral_id(&self) -> Option<&PeripheralId> {
        self.peripheral().map(|p| &p.id)
    }

    /// The peripheral snapshot carried by this event, if any.
    pub fn peripheral(&self) -> Option<&Peripheral> {
        match self {
            SessionEvent::PeripheralDiscovered { peripheral }
            | SessionEvent::Connected { peripheral }
            | SessionEvent::Disconnected { peripheral, .. }
            | SessionEvent::ServicesDiscovered { peripheral }
            | SessionEvent::CharacteristicsDiscovered { peripheral }
            | SessionEvent::CharacteristicValueChanged { peripheral, .. }
            | SessionEvent::RssiUpdated { peripheral }
            | SessionEvent::MtuUpdated { peripheral, .. } => Some(peripheral),
            SessionEvent::AdapterStateChanged { .. } | SessionEvent::ScanFailed { .. } => None,
        }
    }
}

/// Reason for disconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The application called `disconnect`.
    UserRequested,
    /// The peripheral or the platform dropped the link.
    Remote,
    /// The adapter stopped being powered on.
    AdapterUnavailable,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DisconnectReason::UserRequested => "requested by application",
            DisconnectReason::Remote => "link lost",
            DisconnectReason::AdapterUnavailable => "adapter unavailable",
        };
        f.write_str(s)
    }
}

/// Sender for session events.
pub type EventSender = broadcast::Sender<SessionEvent>;

/// Receiver for session events.
pub type EventReceiver = broadcast::Receiver<SessionEvent>;

/// Broadcast fan-out for async consumers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    ///
    /// `capacity` must be greater than zero; callers validate it first.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: SessionEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = SessionEvent::Disconnected {
            peripheral: Peripheral::new(PeripheralId::new("aa:bb")),
            reason: DisconnectReason::UserRequested,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "disconnected");
        assert_eq!(json["reason"], "user_requested");
        assert_eq!(json["peripheral"]["id"], "AA:BB");

        let back: SessionEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_scan_failed_serialization() {
        let event = SessionEvent::ScanFailed {
            reason: ScanFailure::AdapterUnavailable(AdapterState::PoweredOff),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "scan_failed");
        assert_eq!(json["reason"]["kind"], "adapter_unavailable");
        assert_eq!(json["reason"]["detail"], "powered_off");
    }

    #[test]
    fn test_peripheral_id_helper() {
        let p = Peripheral::new(PeripheralId::new("11:22"));
        let event = SessionEvent::RssiUpdated { peripheral: p };
        assert_eq!(event.peripheral_id().map(|id| id.as_str()), Some("11:22"));

        let event = SessionEvent::AdapterStateChanged {
            state: AdapterState::PoweredOn,
        };
        assert!(event.peripheral_id().is_none());
    }

    #[tokio::test]
    async fn test_dispatcher_fans_out() {
        let dispatcher = EventDispatcher::new(8);
        let mut rx1 = dispatcher.subscribe();
        let mut rx2 = dispatcher.subscribe();
        assert_eq!(dispatcher.receiver_count(), 2);

        dispatcher.send(SessionEvent::AdapterStateChanged {
            state: AdapterState::Resetting,
        });

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                SessionEvent::AdapterStateChanged { state } => {
                    assert_eq!(state, AdapterState::Resetting)
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[test]
    fn test_dispatcher_without_receivers_is_silent() {
        let dispatcher = EventDispatcher::default();
        dispatcher.send(SessionEvent::ScanFailed {
            reason: ScanFailure::InternalError,
        });
        assert_eq!(dispatcher.receiver_count(), 0);
    }
}
