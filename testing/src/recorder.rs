//! Event capture for asserting on lifecycle dispatch order.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use reqtrack_core::{Event, EventBus, LifecycleEvent, Subscription};
use std::sync::{Arc, Mutex};

/// One captured dispatch, tagged with the listener list it arrived on.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    /// Listener list that received the payload.
    pub channel: LifecycleEvent,
    /// `kind` field of the payload; for `resolved` fan-outs this is the
    /// terminal kind, not `Resolved`.
    pub kind: LifecycleEvent,
    /// Action carried by the payload.
    pub action: String,
    /// Whether a result was attached.
    pub has_result: bool,
    /// Whether an error was attached.
    pub has_error: bool,
}

/// Records every dispatch on a bus, across all five listener lists, in
/// arrival order.
#[derive(Debug)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
    _subscriptions: Vec<Subscription>,
}

impl EventRecorder {
    /// Subscribe a recording listener to every lifecycle kind on `bus`.
    #[must_use]
    pub fn attach(bus: &EventBus) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let subscriptions = LifecycleEvent::ALL
            .into_iter()
            .map(|channel| {
                let sink = Arc::clone(&events);
                bus.subscribe(channel, move |event: &Event| {
                    sink.lock().unwrap().push(RecordedEvent {
                        channel,
                        kind: event.kind,
                        action: event.action.clone(),
                        has_result: event.result.is_some(),
                        has_error: event.error.is_some(),
                    });
                })
            })
            .collect();
        Self {
            events,
            _subscriptions: subscriptions,
        }
    }

    /// Everything captured so far, in dispatch order.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Captures that arrived on `channel`.
    #[must_use]
    pub fn on_channel(&self, channel: LifecycleEvent) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.channel == channel)
            .collect()
    }

    /// Number of captures on `channel`.
    #[must_use]
    pub fn count(&self, channel: LifecycleEvent) -> usize {
        self.on_channel(channel).len()
    }

    /// Drop everything captured so far, for test isolation.
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_arrive_in_dispatch_order_with_channel_tags() {
        let bus = EventBus::new();
        let recorder = EventRecorder::attach(&bus);

        bus.dispatch(LifecycleEvent::Request, "load", None, None);
        bus.dispatch(LifecycleEvent::Success, "load", None, None);

        let events = recorder.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].channel, LifecycleEvent::Request);
        assert_eq!(events[1].channel, LifecycleEvent::Success);
        // the resolved fan-out carries the terminal kind in its payload
        assert_eq!(events[2].channel, LifecycleEvent::Resolved);
        assert_eq!(events[2].kind, LifecycleEvent::Success);
    }

    #[test]
    fn clear_resets_the_capture_log() {
        let bus = EventBus::new();
        let recorder = EventRecorder::attach(&bus);
        bus.dispatch(LifecycleEvent::Request, "load", None, None);
        recorder.clear();
        assert!(recorder.events().is_empty());
    }
}
