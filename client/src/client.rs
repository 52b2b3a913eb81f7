//! Tracked client facade: request verbs, lifecycle events, cancellation.
//!
//! A [`TrackedClient`] coordinates three collaborators per instance: the
//! event bus listeners observe, the cancellation registry keyed by action,
//! and the error normalizer failures pass through before anyone sees them.
//! Requests come in two shapes. Untracked verbs go straight to the
//! transport: no events, no token bookkeeping, failures normalized and
//! always propagated. Tracked verbs, scoped by [`TrackedClient::tracked`],
//! run the full lifecycle: optional supersede of the previous operation
//! under the same action, a `request` event, the transport call with a
//! cancellation signal armed, and a terminal event once the operation
//! settles.

use crate::config::ClientConfig;
use crate::http::HttpTransport;
use reqtrack_core::{
    ApiError, ApiResponse, CancelMessage, CancelRegistry, ErrorNormalizer, Event, EventBus,
    LifecycleEvent, Method, RequestSpec, Subscription, Transport,
};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    mutex.lock().unwrap()
}

/// Per-call options for a single request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Headers for this call; they win over the client-wide defaults.
    pub headers: HashMap<String, String>,
    /// Per-request timeout, passed through to the transport untouched.
    pub timeout: Option<Duration>,
}

/// Tracking policy for requests issued through [`TrackedClient::tracked`].
#[derive(Debug, Clone)]
pub struct Tracking {
    /// Logical name grouping this request stream.
    pub action: String,
    /// Cancel any pending operation under the same action before starting.
    pub cancel_previous: bool,
    /// Rethrow normalized failures to the caller instead of swallowing
    /// them.
    pub throw_error: bool,
}

impl Tracking {
    /// Tracking under `action` with both flags off.
    #[must_use]
    pub fn action(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            cancel_previous: false,
            throw_error: false,
        }
    }

    /// Set whether a pending operation under the same action is cancelled
    /// first.
    #[must_use]
    pub fn cancel_previous(mut self, cancel_previous: bool) -> Self {
        self.cancel_previous = cancel_previous;
        self
    }

    /// Set whether normalized failures are rethrown to the caller.
    #[must_use]
    pub fn throw_error(mut self, throw_error: bool) -> Self {
        self.throw_error = throw_error;
        self
    }
}

/// Top-level coordinator for tracked and untracked requests.
///
/// Every instance owns an independent listener registry and token table;
/// no process-wide state is involved.
pub struct TrackedClient {
    transport: Arc<dyn Transport>,
    bus: Arc<EventBus>,
    registry: CancelRegistry,
    normalizer: ErrorNormalizer,
    headers: Mutex<HashMap<String, String>>,
    root: String,
    default_cancel_message: CancelMessage,
}

impl TrackedClient {
    /// Build a client backed by the reqwest transport.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] when the transport cannot be
    /// constructed.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let transport = Arc::new(HttpTransport::new(config.timeout)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Build a client around an injected transport.
    #[must_use]
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let bus = Arc::new(EventBus::new());
        let registry = CancelRegistry::new(Arc::clone(&bus));
        let normalizer =
            ErrorNormalizer::new(config.error_transformer.clone(), config.default_error.clone());
        Self {
            transport,
            registry,
            normalizer,
            headers: Mutex::new(config.headers.clone()),
            root: config.root(),
            default_cancel_message: config.default_cancel_message.clone(),
            bus,
        }
    }

    /// The lifecycle event bus of this instance.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// The cancellation token table of this instance.
    #[must_use]
    pub fn cancellations(&self) -> &CancelRegistry {
        &self.registry
    }

    /// Register `listener` for the lifecycle event named `event`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Configuration`] when `event` is not one of the
    /// five recognized kinds.
    pub fn add_event_listener(
        &self,
        event: &str,
        listener: impl Fn(&Event) + Send + Sync + 'static,
    ) -> Result<Subscription, ApiError> {
        self.bus.add_event_listener(event, listener)
    }

    /// Register `listener` for `kind`.
    pub fn subscribe(
        &self,
        kind: LifecycleEvent,
        listener: impl Fn(&Event) + Send + Sync + 'static,
    ) -> Subscription {
        self.bus.subscribe(kind, listener)
    }

    /// Replace the factory behind [`ApiError::Unknown`] fallbacks.
    pub fn set_default_error(&self, factory: impl Fn() -> ApiError + Send + Sync + 'static) {
        self.normalizer.set_default_error(Arc::new(factory));
    }

    /// Set or remove a header applied to every request.
    ///
    /// `None` removes a previously set header; subsequent requests omit it.
    pub fn set_request_header(&self, name: &str, value: Option<&str>) {
        let mut headers = lock(&self.headers);
        match value {
            Some(value) => {
                headers.insert(name.to_string(), value.to_string());
            }
            None => {
                headers.remove(name);
            }
        }
    }

    /// Issue an untracked request described by `spec`.
    ///
    /// No events are dispatched and no cancellation token is created;
    /// failures are normalized and always propagated.
    ///
    /// # Errors
    ///
    /// Returns the normalized failure when the transport rejects.
    pub async fn request(&self, spec: RequestSpec) -> Result<ApiResponse, ApiError> {
        self.perform(String::new(), spec).await
    }

    /// Untracked GET.
    ///
    /// # Errors
    ///
    /// Returns the normalized failure when the transport rejects.
    pub async fn get(
        &self,
        url: &str,
        options: Option<RequestOptions>,
    ) -> Result<ApiResponse, ApiError> {
        self.request(self.spec(Method::Get, url, None, options)).await
    }

    /// Untracked DELETE.
    ///
    /// # Errors
    ///
    /// Returns the normalized failure when the transport rejects.
    pub async fn delete(
        &self,
        url: &str,
        options: Option<RequestOptions>,
    ) -> Result<ApiResponse, ApiError> {
        self.request(self.spec(Method::Delete, url, None, options))
            .await
    }

    /// Untracked POST with an optional JSON body.
    ///
    /// # Errors
    ///
    /// Returns the normalized failure when the transport rejects.
    pub async fn post(
        &self,
        url: &str,
        body: impl Into<Option<Value>>,
        options: Option<RequestOptions>,
    ) -> Result<ApiResponse, ApiError> {
        self.request(self.spec(Method::Post, url, body.into(), options))
            .await
    }

    /// Untracked PUT with an optional JSON body.
    ///
    /// # Errors
    ///
    /// Returns the normalized failure when the transport rejects.
    pub async fn put(
        &self,
        url: &str,
        body: impl Into<Option<Value>>,
        options: Option<RequestOptions>,
    ) -> Result<ApiResponse, ApiError> {
        self.request(self.spec(Method::Put, url, body.into(), options))
            .await
    }

    /// Untracked PATCH with an optional JSON body.
    ///
    /// # Errors
    ///
    /// Returns the normalized failure when the transport rejects.
    pub async fn patch(
        &self,
        url: &str,
        body: impl Into<Option<Value>>,
        options: Option<RequestOptions>,
    ) -> Result<ApiResponse, ApiError> {
        self.request(self.spec(Method::Patch, url, body.into(), options))
            .await
    }

    /// Scope the verb set under a tracking policy.
    #[must_use]
    pub fn tracked(&self, tracking: Tracking) -> TrackedScope<'_> {
        TrackedScope {
            client: self,
            tracking,
        }
    }

    fn spec(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
        options: Option<RequestOptions>,
    ) -> RequestSpec {
        let options = options.unwrap_or_default();
        let mut spec = RequestSpec::new(method, self.resolve_url(url));
        spec.headers = options.headers;
        spec.body = body;
        spec.timeout = options.timeout;
        spec
    }

    fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}{}", self.root, url)
        }
    }

    // Instance headers fill in anything the call did not set itself.
    fn merge_headers(&self, spec: &mut RequestSpec) {
        let defaults = lock(&self.headers).clone();
        for (name, value) in defaults {
            spec.headers.entry(name).or_insert(value);
        }
    }

    /// Hand `spec` to the transport with a cancellation signal armed under
    /// `action`. An empty action skips all token bookkeeping.
    async fn perform(&self, action: String, mut spec: RequestSpec) -> Result<ApiResponse, ApiError> {
        self.merge_headers(&mut spec);
        tracing::debug!(action = %action, method = %spec.method, url = %spec.url, "performing request");

        let outcome = if action.is_empty() {
            self.transport.send(spec).await
        } else {
            let (arm, fired) = oneshot::channel::<String>();
            self.registry.create(&action, move |message| {
                let _ = arm.send(message);
            });
            let cancelled = async move {
                match fired.await {
                    Ok(message) => message,
                    // Token replaced or cleared without cancelling: stay out
                    // of the race and let the transport settle.
                    Err(_) => std::future::pending().await,
                }
            };
            tokio::select! {
                // A settled response wins over a simultaneous cancel.
                biased;
                outcome = self.transport.send(spec) => outcome,
                message = cancelled => Err(ApiError::Cancelled {
                    action: action.clone(),
                    message,
                }),
            }
        };

        match &outcome {
            // The canceller already removed the token, and a successor may
            // own the slot by now.
            Err(error) if self.transport.is_cancellation(error) => {}
            _ => self.registry.clear(&action),
        }

        outcome.map_err(|error| self.normalizer.normalize(Some(error)))
    }

    /// Run one tracked operation: supersede, `request` event, transport
    /// call, terminal event, settle policy.
    async fn tracked_request<F, Fut>(
        &self,
        tracking: &Tracking,
        perform: F,
    ) -> Result<Option<ApiResponse>, ApiError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<ApiResponse, ApiError>>,
    {
        if tracking.cancel_previous && !tracking.action.is_empty() {
            self.registry
                .cancel([tracking.action.as_str()], &self.default_cancel_message);
        }

        self.bus
            .dispatch(LifecycleEvent::Request, &tracking.action, None, None);

        match perform(tracking.action.clone()).await {
            Ok(response) => {
                self.bus.dispatch(
                    LifecycleEvent::Success,
                    &tracking.action,
                    Some(Arc::new(response.clone())),
                    None,
                );
                Ok(Some(response))
            }
            // Superseded: the canceller already observed the `cancelled`
            // event; this caller only sees the cancellation failure.
            Err(error) if self.transport.is_cancellation(&error) => Err(error),
            Err(error) => {
                self.bus.dispatch(
                    LifecycleEvent::Error,
                    &tracking.action,
                    None,
                    Some(Arc::new(error.clone())),
                );
                if tracking.throw_error {
                    Err(error)
                } else {
                    Ok(None)
                }
            }
        }
    }
}

impl std::fmt::Debug for TrackedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedClient")
            .field("root", &self.root)
            .field("tracked", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// Verb set bound to one [`Tracking`] policy.
///
/// Every verb resolves with `Ok(Some(response))` on success, `Ok(None)` when
/// a failure was swallowed (`throw_error` off), and `Err` for cancellations
/// and, with `throw_error` on, normalized failures.
#[derive(Debug)]
pub struct TrackedScope<'a> {
    client: &'a TrackedClient,
    tracking: Tracking,
}

impl TrackedScope<'_> {
    /// Tracked request described by `spec`.
    ///
    /// # Errors
    ///
    /// Returns the cancellation failure when superseded, or the normalized
    /// failure when `throw_error` is set.
    pub async fn request(&self, spec: RequestSpec) -> Result<Option<ApiResponse>, ApiError> {
        self.run(spec).await
    }

    /// Tracked GET.
    ///
    /// # Errors
    ///
    /// Returns the cancellation failure when superseded, or the normalized
    /// failure when `throw_error` is set.
    pub async fn get(
        &self,
        url: &str,
        options: Option<RequestOptions>,
    ) -> Result<Option<ApiResponse>, ApiError> {
        self.run(self.client.spec(Method::Get, url, None, options))
            .await
    }

    /// Tracked DELETE.
    ///
    /// # Errors
    ///
    /// Returns the cancellation failure when superseded, or the normalized
    /// failure when `throw_error` is set.
    pub async fn delete(
        &self,
        url: &str,
        options: Option<RequestOptions>,
    ) -> Result<Option<ApiResponse>, ApiError> {
        self.run(self.client.spec(Method::Delete, url, None, options))
            .await
    }

    /// Tracked POST with an optional JSON body.
    ///
    /// # Errors
    ///
    /// Returns the cancellation failure when superseded, or the normalized
    /// failure when `throw_error` is set.
    pub async fn post(
        &self,
        url: &str,
        body: impl Into<Option<Value>>,
        options: Option<RequestOptions>,
    ) -> Result<Option<ApiResponse>, ApiError> {
        self.run(self.client.spec(Method::Post, url, body.into(), options))
            .await
    }

    /// Tracked PUT with an optional JSON body.
    ///
    /// # Errors
    ///
    /// Returns the cancellation failure when superseded, or the normalized
    /// failure when `throw_error` is set.
    pub async fn put(
        &self,
        url: &str,
        body: impl Into<Option<Value>>,
        options: Option<RequestOptions>,
    ) -> Result<Option<ApiResponse>, ApiError> {
        self.run(self.client.spec(Method::Put, url, body.into(), options))
            .await
    }

    /// Tracked PATCH with an optional JSON body.
    ///
    /// # Errors
    ///
    /// Returns the cancellation failure when superseded, or the normalized
    /// failure when `throw_error` is set.
    pub async fn patch(
        &self,
        url: &str,
        body: impl Into<Option<Value>>,
        options: Option<RequestOptions>,
    ) -> Result<Option<ApiResponse>, ApiError> {
        self.run(self.client.spec(Method::Patch, url, body.into(), options))
            .await
    }

    async fn run(&self, spec: RequestSpec) -> Result<Option<ApiResponse>, ApiError> {
        self.client
            .tracked_request(&self.tracking, |action| self.client.perform(action, spec))
            .await
    }
}
