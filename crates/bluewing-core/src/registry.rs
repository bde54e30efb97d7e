//! Delegate registry.
//!
//! Delegates are invoked synchronously on whatever thread produced the event.
//! The member list is snapshotted before dispatch and the lock is released
//! before any callback runs, so a delegate may subscribe or unsubscribe
//! (itself or others) from inside `on_event`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::events::{EventDispatcher, EventReceiver, SessionEvent};

/// Observer of session events.
///
/// Implemented for any `Fn(&SessionEvent) + Send + Sync` closure.
///
/// ```
/// use std::sync::Arc;
/// use bluewing_core::{DelegateRegistry, SessionDelegate, SessionEvent};
///
/// let registry = DelegateRegistry::new(16);
/// let delegate: Arc<dyn SessionDelegate> = Arc::new(|event: &SessionEvent| {
///     println!("{:?}", event);
/// });
/// let id = registry.subscribe(delegate);
/// assert!(registry.unsubscribe(id));
/// ```
pub trait SessionDelegate: Send + Sync {
    /// Called once per event.
    fn on_event(&self, event: &SessionEvent);
}

impl<F> SessionDelegate for F
where
    F: Fn(&SessionEvent) + Send + Sync,
{
    fn on_event(&self, event: &SessionEvent) {
        self(event)
    }
}

/// Handle returned by [`DelegateRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Member = (SubscriptionId, Arc<dyn SessionDelegate>);

/// Set of delegates plus a broadcast channel for async consumers.
pub struct DelegateRegistry {
    members: Mutex<Vec<Member>>,
    next_id: AtomicU64,
    dispatcher: EventDispatcher,
}

impl DelegateRegistry {
    /// Create an empty registry whose broadcast channel holds `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            members: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            dispatcher: EventDispatcher::new(capacity),
        }
    }

    /// Register a delegate.
    pub fn subscribe(&self, delegate: Arc<dyn SessionDelegate>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, delegate));
        id
    }

    /// Remove a delegate. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut members = self.lock();
        let before = members.len();
        members.retain(|(member, _)| *member != id);
        members.len() != before
    }

    /// Whether `id` is currently registered.
    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.lock().iter().any(|(member, _)| *member == id)
    }

    /// Deliver `event` to every delegate, then to broadcast receivers.
    ///
    /// A delegate removed by another delegate during this dispatch is skipped.
    pub fn notify(&self, event: &SessionEvent) {
        let snapshot: Vec<Member> = self.lock().clone();
        for (id, delegate) in snapshot {
            if self.is_subscribed(id) {
                delegate.on_event(event);
            }
        }
        self.dispatcher.send(event.clone());
    }

    /// Receive every subsequent event asynchronously.
    pub fn events(&self) -> EventReceiver {
        self.dispatcher.subscribe()
    }

    /// Number of registered delegates.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no delegate is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Member>> {
        self.members.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for DelegateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegateRegistry")
            .field("delegates", &self.len())
            .field("receivers", &self.dispatcher.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;
    use std::sync::atomic::AtomicUsize;

    use bluewing_types::{AdapterState, ScanFailure};

    fn state_event() -> SessionEvent {
        SessionEvent::AdapterStateChanged {
            state: AdapterState::PoweredOn,
        }
    }

    fn counter(count: Arc<AtomicUsize>) -> Arc<dyn SessionDelegate> {
        Arc::new(move |_: &SessionEvent| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_every_delegate_receives_event() {
        let registry = DelegateRegistry::new(4);
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        registry.subscribe(counter(a.clone()));
        registry.subscribe(counter(b.clone()));

        registry.notify(&state_event());
        registry.notify(&state_event());

        assert_eq!(a.load(Ordering::SeqCst), 2);
        assert_eq!(b.load(Ordering::SeqCst), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unsubscribe_unknown_returns_false() {
        let registry = DelegateRegistry::new(4);
        let id = registry.subscribe(counter(Arc::new(AtomicUsize::new(0))));
        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_self_unsubscribe_during_callback() {
        let registry = Arc::new(DelegateRegistry::new(4));
        let own_id: Arc<OnceLock<SubscriptionId>> = Arc::new(OnceLock::new());
        let self_calls = Arc::new(AtomicUsize::new(0));
        let other_calls = Arc::new(AtomicUsize::new(0));

        let self_removing: Arc<dyn SessionDelegate> = {
            let registry = Arc::downgrade(&registry);
            let own_id = own_id.clone();
            let calls = self_calls.clone();
            Arc::new(move |_: &SessionEvent| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let (Some(registry), Some(id)) = (registry.upgrade(), own_id.get()) {
                    registry.unsubscribe(*id);
                }
            })
        };
        let id = registry.subscribe(self_removing);
        own_id.set(id).unwrap();
        registry.subscribe(counter(other_calls.clone()));

        registry.notify(&state_event());
        assert_eq!(self_calls.load(Ordering::SeqCst), 1);
        assert_eq!(other_calls.load(Ordering::SeqCst), 1);

        registry.notify(&state_event());
        assert_eq!(self_calls.load(Ordering::SeqCst), 1);
        assert_eq!(other_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_delegate_removed_by_another_is_skipped() {
        let registry = Arc::new(DelegateRegistry::new(4));
        let victim_calls = Arc::new(AtomicUsize::new(0));
        let victim_id: Arc<OnceLock<SubscriptionId>> = Arc::new(OnceLock::new());

        let remover: Arc<dyn SessionDelegate> = {
            let registry = Arc::downgrade(&registry);
            let victim_id = victim_id.clone();
            Arc::new(move |_: &SessionEvent| {
                if let (Some(registry), Some(id)) = (registry.upgrade(), victim_id.get()) {
                    registry.unsubscribe(*id);
                }
            })
        };
        registry.subscribe(remover);
        victim_id
            .set(registry.subscribe(counter(victim_calls.clone())))
            .unwrap();

        registry.notify(&state_event());
        assert_eq!(victim_calls.load(Ordering::SeqCst), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_subscribe_during_callback_does_not_deadlock() {
        let registry = Arc::new(DelegateRegistry::new(4));
        let late_calls = Arc::new(AtomicUsize::new(0));
        let added = Arc::new(AtomicUsize::new(0));

        let adder: Arc<dyn SessionDelegate> = {
            let registry = Arc::downgrade(&registry);
            let late_calls = late_calls.clone();
            let added = added.clone();
            Arc::new(move |_: &SessionEvent| {
                if added.fetch_add(1, Ordering::SeqCst) == 0 {
                    if let Some(registry) = registry.upgrade() {
                        registry.subscribe(counter(late_calls.clone()));
                    }
                }
            })
        };
        registry.subscribe(adder);

        registry.notify(&state_event());
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        registry.notify(&state_event());
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_broadcast_receives_after_delegates() {
        let registry = DelegateRegistry::new(4);
        let mut rx = registry.events();
        registry.notify(&SessionEvent::ScanFailed {
            reason: ScanFailure::FeatureUnsupported,
        });
        match rx.recv().await.unwrap() {
            SessionEvent::ScanFailed { reason } => {
                assert_eq!(reason, ScanFailure::FeatureUnsupported)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
