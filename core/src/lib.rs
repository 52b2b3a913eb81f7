//! # Reqtrack Core
//!
//! Transport-independent building blocks for the reqtrack tracked HTTP
//! client: lifecycle events and the in-process bus, cooperative cancellation
//! bookkeeping, the error taxonomy with status normalization, and the
//! contract required of the underlying transport.
//!
//! ## Core Concepts
//!
//! - **Action**: caller-assigned name grouping related requests for
//!   cancellation and lifecycle tracking
//! - **Tracked request**: a request issued through the orchestration path,
//!   participating in events and cancellation policy
//! - **Cancellation token**: record binding an action to the in-flight
//!   operation's cancel mechanism and start time
//! - **Lifecycle event**: one of `request`, `success`, `error`,
//!   `cancelled`, `resolved`
//! - **Resolved**: meta-event fired alongside every terminal lifecycle
//!   event, for generic "operation finished" observers
//!
//! ## Example
//!
//! ```
//! use reqtrack_core::{EventBus, LifecycleEvent};
//! use std::sync::{Arc, Mutex};
//!
//! let bus = EventBus::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! let _subscription = bus.subscribe(LifecycleEvent::Success, move |event| {
//!     sink.lock().unwrap().push(event.action.clone());
//! });
//!
//! bus.dispatch(LifecycleEvent::Success, "load-users", None, None);
//! assert_eq!(seen.lock().unwrap().as_slice(), ["load-users"]);
//! ```

pub mod bus;
pub mod cancel;
pub mod environment;
pub mod error;
pub mod event;
pub mod response;
pub mod transport;

pub use bus::{EventBus, Listener, Subscription};
pub use cancel::{CancelContext, CancelMessage, CancelRegistry, CancelToken};
pub use error::{ApiError, ErrorFactory, ErrorNormalizer, ErrorTransformer};
pub use event::{Event, LifecycleEvent};
pub use response::ApiResponse;
pub use transport::{Method, RequestSpec, Transport, TransportFuture};
