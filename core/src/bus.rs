//! In-process lifecycle event bus.
//!
//! Listener lists are ordered sequences: insertion order is invocation
//! order, and the same callback registered twice is tracked as two
//! independent occurrences. Dispatch snapshots the list before invoking, so
//! registrations and removals made from inside a listener only affect
//! subsequent dispatches.
//!
//! Terminal dispatches (`success`, `error`, `cancelled`) additionally fan
//! out to every `resolved` listener, after the kind's own listeners, with a
//! payload that names the terminal kind but carries neither result nor
//! error. `request` dispatches never reach `resolved` listeners.

use crate::error::ApiError;
use crate::event::{Event, LifecycleEvent};
use crate::response::ApiResponse;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Callback invoked with dispatched payloads.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

struct Registered {
    id: u64,
    listener: Listener,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    lists: HashMap<LifecycleEvent, Vec<Registered>>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    registry.lock().unwrap()
}

/// Per-instance listener registry and dispatcher.
///
/// Each bus owns independent listener lists; nothing is shared across
/// instances.
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    /// A bus with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Register `listener` for `kind`.
    ///
    /// The listener is appended to the kind's list and invoked, in
    /// registration order, on every subsequent dispatch of that kind. The
    /// returned [`Subscription`] removes exactly this occurrence.
    pub fn subscribe(
        &self,
        kind: LifecycleEvent,
        listener: impl Fn(&Event) + Send + Sync + 'static,
    ) -> Subscription {
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.lists.entry(kind).or_default().push(Registered {
            id,
            listener: Arc::new(listener),
        });
        Subscription {
            registry: Arc::clone(&self.registry),
            kind,
            id,
        }
    }

    /// Runtime registration contract taking an event-kind tag.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Configuration`] when `event` is not one of the
    /// five recognized kinds; no listener is added in that case.
    pub fn add_event_listener(
        &self,
        event: &str,
        listener: impl Fn(&Event) + Send + Sync + 'static,
    ) -> Result<Subscription, ApiError> {
        let kind = event.parse::<LifecycleEvent>()?;
        Ok(self.subscribe(kind, listener))
    }

    /// Dispatch a payload to every listener registered for `kind`, in
    /// registration order. Terminal kinds then reach every `resolved`
    /// listener with a result/error-free payload.
    pub fn dispatch(
        &self,
        kind: LifecycleEvent,
        action: &str,
        result: Option<Arc<ApiResponse>>,
        error: Option<Arc<ApiError>>,
    ) {
        tracing::debug!(action, kind = %kind, "dispatching lifecycle event");
        let mut payload = Event::new(kind, action);
        payload.result = result;
        payload.error = error;
        self.notify(kind, &payload);
        if kind.is_terminal() {
            self.notify(LifecycleEvent::Resolved, &Event::new(kind, action));
        }
    }

    /// Number of listeners currently registered for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: LifecycleEvent) -> usize {
        lock(&self.registry)
            .lists
            .get(&kind)
            .map_or(0, Vec::len)
    }

    fn notify(&self, list: LifecycleEvent, payload: &Event) {
        let snapshot: Vec<Listener> = lock(&self.registry)
            .lists
            .get(&list)
            .map(|entries| entries.iter().map(|entry| Arc::clone(&entry.listener)).collect())
            .unwrap_or_default();
        for listener in snapshot {
            (*listener)(payload);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

/// Handle removing one listener occurrence.
///
/// Dropping the handle does **not** unsubscribe; removal happens only
/// through [`Subscription::unsubscribe`], which is a no-op once the
/// occurrence is gone.
pub struct Subscription {
    registry: Arc<Mutex<Registry>>,
    kind: LifecycleEvent,
    id: u64,
}

impl Subscription {
    /// Remove the listener occurrence this subscription refers to.
    pub fn unsubscribe(&self) {
        let mut registry = lock(&self.registry);
        if let Some(list) = registry.lists.get_mut(&self.kind) {
            list.retain(|entry| entry.id != self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Test code can use unwrap/panic
mod tests {
    use super::*;

    #[test]
    fn listeners_fire_in_registration_order() {
        let bus = EventBus::new();
        let sink = Arc::new(Mutex::new(Vec::new()));
        for tag in [1, 2, 3] {
            let sink = Arc::clone(&sink);
            let _sub = bus.subscribe(LifecycleEvent::Success, move |_| {
                sink.lock().unwrap().push(tag);
            });
        }
        bus.dispatch(LifecycleEvent::Success, "load", None, None);
        assert_eq!(*sink.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn every_listener_receives_the_dispatched_payload() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..3 {
            let sink = Arc::clone(&seen);
            let _sub = bus.subscribe(LifecycleEvent::Error, move |event| {
                sink.lock().unwrap().push((event.action.clone(), event.kind));
            });
        }
        let error = Arc::new(ApiError::Network("reset".to_string()));
        bus.dispatch(LifecycleEvent::Error, "save", None, Some(error));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(
            seen.iter()
                .all(|(action, kind)| action == "save" && *kind == LifecycleEvent::Error)
        );
    }

    #[test]
    fn unsubscribe_removes_exactly_one_occurrence() {
        let bus = EventBus::new();
        let counter = Arc::new(Mutex::new(0u32));
        let subscriptions: Vec<Subscription> = (0..2)
            .map(|_| {
                let counter = Arc::clone(&counter);
                bus.subscribe(LifecycleEvent::Success, move |_| {
                    *counter.lock().unwrap() += 1;
                })
            })
            .collect();
        assert_eq!(bus.listener_count(LifecycleEvent::Success), 2);

        subscriptions[0].unsubscribe();
        assert_eq!(bus.listener_count(LifecycleEvent::Success), 1);

        bus.dispatch(LifecycleEvent::Success, "load", None, None);
        assert_eq!(*counter.lock().unwrap(), 1);
    }

    #[test]
    fn unsubscribing_twice_is_a_noop() {
        let bus = EventBus::new();
        let subscription = bus.subscribe(LifecycleEvent::Request, |_| {});
        subscription.unsubscribe();
        subscription.unsubscribe();
        assert_eq!(bus.listener_count(LifecycleEvent::Request), 0);
    }

    #[test]
    fn dropping_a_subscription_does_not_unsubscribe() {
        let bus = EventBus::new();
        drop(bus.subscribe(LifecycleEvent::Request, |_| {}));
        assert_eq!(bus.listener_count(LifecycleEvent::Request), 1);
    }

    #[test]
    fn terminal_dispatches_fan_out_to_resolved_listeners() {
        let bus = EventBus::new();
        let resolved = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&resolved);
        let _sub = bus.subscribe(LifecycleEvent::Resolved, move |event| {
            sink.lock().unwrap().push(event.kind);
        });

        bus.dispatch(LifecycleEvent::Success, "a", None, None);
        bus.dispatch(LifecycleEvent::Error, "a", None, None);
        bus.dispatch(LifecycleEvent::Cancelled, "a", None, None);
        bus.dispatch(LifecycleEvent::Request, "a", None, None);

        assert_eq!(
            *resolved.lock().unwrap(),
            vec![
                LifecycleEvent::Success,
                LifecycleEvent::Error,
                LifecycleEvent::Cancelled,
            ]
        );
    }

    #[test]
    fn resolved_payloads_carry_neither_result_nor_error() {
        let bus = EventBus::new();
        let captured = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&captured);
        let _sub = bus.subscribe(LifecycleEvent::Resolved, move |event| {
            sink.lock()
                .unwrap()
                .push((event.result.is_some(), event.error.is_some()));
        });

        let response = Arc::new(ApiResponse::new(200, "http://api.test"));
        bus.dispatch(LifecycleEvent::Success, "a", Some(response), None);
        assert_eq!(*captured.lock().unwrap(), vec![(false, false)]);
    }

    #[test]
    fn kind_listeners_fire_before_resolved_listeners() {
        let bus = EventBus::new();
        let sink = Arc::new(Mutex::new(Vec::new()));
        let success_sink = Arc::clone(&sink);
        let resolved_sink = Arc::clone(&sink);
        let _a = bus.subscribe(LifecycleEvent::Success, move |_| {
            success_sink.lock().unwrap().push(1);
        });
        let _b = bus.subscribe(LifecycleEvent::Resolved, move |_| {
            resolved_sink.lock().unwrap().push(2);
        });
        bus.dispatch(LifecycleEvent::Success, "a", None, None);
        assert_eq!(*sink.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn unknown_event_names_fail_registration_and_add_nothing() {
        let bus = EventBus::new();
        match bus.add_event_listener("bogus", |_| {}) {
            Err(ApiError::Configuration(name)) => assert_eq!(name, "bogus"),
            other => panic!("expected a configuration error, got {other:?}"),
        }
        for kind in LifecycleEvent::ALL {
            assert_eq!(bus.listener_count(kind), 0);
        }
    }

    #[test]
    fn registration_by_name_is_case_insensitive() {
        let bus = EventBus::new();
        let counter = Arc::new(Mutex::new(0u32));
        let sink = Arc::clone(&counter);
        let _sub = bus
            .add_event_listener("SUCCESS", move |_| *sink.lock().unwrap() += 1)
            .unwrap();
        bus.dispatch(LifecycleEvent::Success, "load", None, None);
        assert_eq!(*counter.lock().unwrap(), 1);
    }

    #[test]
    fn removal_during_dispatch_only_affects_subsequent_dispatches() {
        let bus = EventBus::new();
        let counter = Arc::new(Mutex::new(0u32));

        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let unsubscriber_slot = Arc::clone(&slot);
        let _first = bus.subscribe(LifecycleEvent::Success, move |_| {
            if let Some(subscription) = unsubscriber_slot.lock().unwrap().take() {
                subscription.unsubscribe();
            }
        });
        let sink = Arc::clone(&counter);
        let second = bus.subscribe(LifecycleEvent::Success, move |_| {
            *sink.lock().unwrap() += 1;
        });
        *slot.lock().unwrap() = Some(second);

        // the snapshot taken at dispatch time still includes the second listener
        bus.dispatch(LifecycleEvent::Success, "a", None, None);
        assert_eq!(*counter.lock().unwrap(), 1);

        bus.dispatch(LifecycleEvent::Success, "a", None, None);
        assert_eq!(*counter.lock().unwrap(), 1);
    }
}
