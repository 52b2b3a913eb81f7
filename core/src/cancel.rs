//! Cancellation bookkeeping for in-flight tracked operations.
//!
//! At most one [`CancelToken`] exists per action. Cancellation is
//! cooperative: cancelling invokes the token's cancel function, which arms
//! whatever signal the transport observes, and announces a `cancelled`
//! event. It does not forcibly terminate I/O, and callers must not assume
//! synchronous teardown.
//!
//! All table mutations are synchronous; the lock is never held across a
//! suspension point or while user code (cancel functions, listeners) runs.

use crate::bus::EventBus;
use crate::environment::{Clock, SystemClock};
use crate::event::LifecycleEvent;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Snapshot of a token handed to cancel-message factories.
#[derive(Debug, Clone)]
pub struct CancelContext {
    /// Action the token belongs to.
    pub action: String,
    /// When the tracked operation started.
    pub created_at: DateTime<Utc>,
}

/// Message attached to a cancellation: either a literal, or a factory
/// receiving the cancelled token's context.
#[derive(Clone)]
pub enum CancelMessage {
    /// Fixed message used as-is.
    Literal(String),
    /// Message computed from the cancelled token's context.
    Factory(Arc<dyn Fn(&CancelContext) -> String + Send + Sync>),
}

impl CancelMessage {
    /// Resolve the message for a concrete token.
    #[must_use]
    pub fn resolve(&self, context: &CancelContext) -> String {
        match self {
            Self::Literal(message) => message.clone(),
            Self::Factory(factory) => (**factory)(context),
        }
    }

    /// Default message naming the action and the elapsed seconds.
    #[must_use]
    pub fn elapsed() -> Self {
        Self::Factory(Arc::new(|context| {
            #[allow(clippy::cast_precision_loss)]
            let seconds = (Utc::now() - context.created_at).num_milliseconds() as f64 / 1000.0;
            format!(
                "action {} cancelled after {} seconds",
                context.action, seconds
            )
        }))
    }
}

impl Default for CancelMessage {
    fn default() -> Self {
        Self::elapsed()
    }
}

impl From<&str> for CancelMessage {
    fn from(message: &str) -> Self {
        Self::Literal(message.to_string())
    }
}

impl From<String> for CancelMessage {
    fn from(message: String) -> Self {
        Self::Literal(message)
    }
}

// Manual Debug since factories do not implement Debug
impl fmt::Debug for CancelMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(message) => f.debug_tuple("Literal").field(message).finish(),
            Self::Factory(_) => write!(f, "Factory(<factory>)"),
        }
    }
}

type CancelFn = Box<dyn FnOnce(String) + Send>;

/// Record binding an action to the in-flight operation's cancel mechanism
/// and start time.
pub struct CancelToken {
    /// Action the token is keyed under.
    pub action: String,
    /// When the tracked operation started.
    pub created_at: DateTime<Utc>,
    cancel: CancelFn,
}

impl CancelToken {
    fn context(&self) -> CancelContext {
        CancelContext {
            action: self.action.clone(),
            created_at: self.created_at,
        }
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("action", &self.action)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Table of active cancellation tokens, keyed by action.
///
/// Holds at most one token per action. Cancelling dispatches a `cancelled`
/// event on the associated bus for every token it actually cancels.
pub struct CancelRegistry {
    tokens: Mutex<HashMap<String, CancelToken>>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
}

impl CancelRegistry {
    /// A registry dispatching `cancelled` events on `bus`, stamping tokens
    /// with system time.
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self::with_clock(bus, Arc::new(SystemClock))
    }

    /// A registry with an injected clock.
    #[must_use]
    pub fn with_clock(bus: Arc<EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            bus,
            clock,
        }
    }

    /// Store a fresh token for `action`, overwriting any existing one.
    ///
    /// No-op when `action` is empty: untracked operations never hold a
    /// token.
    pub fn create(&self, action: &str, cancel: impl FnOnce(String) + Send + 'static) {
        if action.is_empty() {
            return;
        }
        let token = CancelToken {
            action: action.to_string(),
            created_at: self.clock.now(),
            cancel: Box::new(cancel),
        };
        if self.lock().insert(action.to_string(), token).is_some() {
            tracing::trace!(action, "replaced existing cancellation token");
        }
    }

    /// Cancel every listed action that currently holds a token.
    ///
    /// For each hit: the token is removed, its cancel function is invoked
    /// with the resolved message, and a `cancelled` event is dispatched for
    /// the action. Actions with no active token are silently skipped.
    pub fn cancel<I, S>(&self, actions: I, message: &CancelMessage)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for action in actions {
            let action = action.as_ref();
            let Some(token) = self.lock().remove(action) else {
                continue;
            };
            let resolved = message.resolve(&token.context());
            tracing::debug!(action, message = %resolved, "cancelling in-flight request");
            (token.cancel)(resolved);
            self.bus
                .dispatch(LifecycleEvent::Cancelled, action, None, None);
        }
    }

    /// Remove the token for `action` without cancelling, if present.
    pub fn clear(&self, action: &str) {
        if action.is_empty() {
            return;
        }
        self.lock().remove(action);
    }

    /// Whether an operation is currently tracked under `action`.
    #[must_use]
    pub fn is_tracking(&self, action: &str) -> bool {
        self.lock().contains_key(action)
    }

    /// Number of tracked operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no operation is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CancelToken>> {
        #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
        self.tokens.lock().unwrap()
    }
}

impl fmt::Debug for CancelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelRegistry")
            .field("tracked", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Clone, Copy)]
    struct FrozenClock(DateTime<Utc>);

    impl Clock for FrozenClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn registry() -> (CancelRegistry, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        (CancelRegistry::new(Arc::clone(&bus)), bus)
    }

    #[test]
    fn creating_with_an_empty_action_is_a_noop() {
        let (registry, _bus) = registry();
        registry.create("", |_| {});
        assert!(registry.is_empty());
    }

    #[test]
    fn the_table_never_holds_two_entries_per_action() {
        let (registry, _bus) = registry();
        let first_ran = Arc::new(AtomicBool::new(false));
        let second_ran = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&first_ran);
        registry.create("search", move |_| flag.store(true, Ordering::SeqCst));
        let flag = Arc::clone(&second_ran);
        registry.create("search", move |_| flag.store(true, Ordering::SeqCst));
        assert_eq!(registry.len(), 1);

        registry.cancel(["search"], &CancelMessage::from("stop"));
        assert!(!first_ran.load(Ordering::SeqCst));
        assert!(second_ran.load(Ordering::SeqCst));
    }

    #[test]
    fn cancelling_resolves_literal_messages() {
        let (registry, _bus) = registry();
        let seen = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&seen);
        registry.create("search", move |message| *sink.lock().unwrap() = message);
        registry.cancel(["search"], &CancelMessage::from("stop right there"));
        assert_eq!(*seen.lock().unwrap(), "stop right there");
    }

    #[test]
    fn cancelling_resolves_factory_messages_with_the_token_context() {
        let bus = Arc::new(EventBus::new());
        let frozen = Utc::now();
        let registry = CancelRegistry::with_clock(Arc::clone(&bus), Arc::new(FrozenClock(frozen)));

        let seen = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&seen);
        registry.create("search", move |message| *sink.lock().unwrap() = message);

        let message = CancelMessage::Factory(Arc::new(move |context| {
            format!("{} started at {}", context.action, context.created_at)
        }));
        registry.cancel(["search"], &message);
        assert_eq!(
            *seen.lock().unwrap(),
            format!("search started at {frozen}")
        );
    }

    #[test]
    fn the_default_message_names_the_action_and_elapsed_seconds() {
        let context = CancelContext {
            action: "search".to_string(),
            created_at: Utc::now() - chrono::Duration::seconds(2),
        };
        let message = CancelMessage::default().resolve(&context);
        assert!(message.starts_with("action search cancelled after "));
        assert!(message.ends_with(" seconds"));
    }

    #[test]
    fn cancelling_dispatches_a_cancelled_event_and_removes_the_token() {
        let (registry, bus) = registry();
        let cancelled = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&cancelled);
        let _sub = bus.subscribe(LifecycleEvent::Cancelled, move |event| {
            sink.lock().unwrap().push(event.action.clone());
        });

        registry.create("search", |_| {});
        registry.cancel(["search"], &CancelMessage::from("stop"));

        assert_eq!(*cancelled.lock().unwrap(), vec!["search".to_string()]);
        assert!(!registry.is_tracking("search"));
    }

    #[test]
    fn unknown_actions_are_silently_skipped() {
        let (registry, bus) = registry();
        let count = Arc::new(Mutex::new(0u32));
        let sink = Arc::clone(&count);
        let _sub = bus.subscribe(LifecycleEvent::Cancelled, move |_| {
            *sink.lock().unwrap() += 1;
        });

        registry.cancel(["missing"], &CancelMessage::from("stop"));
        assert_eq!(*count.lock().unwrap(), 0);
    }

    #[test]
    fn cancelling_many_actions_only_touches_tracked_ones() {
        let (registry, bus) = registry();
        let cancelled = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&cancelled);
        let _sub = bus.subscribe(LifecycleEvent::Cancelled, move |event| {
            sink.lock().unwrap().push(event.action.clone());
        });

        registry.create("alpha", |_| {});
        registry.create("beta", |_| {});
        registry.cancel(["alpha", "missing", "beta"], &CancelMessage::from("stop"));

        assert_eq!(
            *cancelled.lock().unwrap(),
            vec!["alpha".to_string(), "beta".to_string()]
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn clearing_removes_without_cancelling() {
        let (registry, bus) = registry();
        let ran = Arc::new(AtomicBool::new(false));
        let events = Arc::new(Mutex::new(0u32));
        let sink = Arc::clone(&events);
        let _sub = bus.subscribe(LifecycleEvent::Cancelled, move |_| {
            *sink.lock().unwrap() += 1;
        });

        let flag = Arc::clone(&ran);
        registry.create("search", move |_| flag.store(true, Ordering::SeqCst));
        registry.clear("search");

        assert!(!ran.load(Ordering::SeqCst));
        assert!(!registry.is_tracking("search"));
        assert_eq!(*events.lock().unwrap(), 0);
    }
}
