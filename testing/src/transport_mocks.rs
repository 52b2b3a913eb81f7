//! Scripted transport for deterministic client tests.
//!
//! [`MockTransport`] pops programmed outcomes in FIFO order and records
//! every [`RequestSpec`] it receives. Gated outcomes stay in flight until
//! released, which is how supersede and cancellation flows are exercised
//! without a network.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use reqtrack_core::{ApiError, ApiResponse, RequestSpec, Transport, TransportFuture};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

enum Scripted {
    Respond(ApiResponse),
    Fail(ApiError),
    Gated {
        response: ApiResponse,
        gate: oneshot::Receiver<()>,
    },
}

/// Handle releasing a gated response.
///
/// Dropping the handle unopened also releases the response; an operation
/// that should stay pending for a whole test must keep its gate alive.
#[derive(Debug)]
pub struct Gate {
    release: oneshot::Sender<()>,
}

impl Gate {
    /// Let the gated response settle.
    pub fn open(self) {
        let _ = self.release.send(());
    }
}

/// Scripted FIFO transport.
///
/// Clones share the same script and request log, so a clone can be handed
/// to a client while the original keeps enqueueing and asserting.
///
/// # Example
///
/// ```
/// use reqtrack_core::{Method, RequestSpec, Transport};
/// use reqtrack_testing::{MockTransport, json_response};
///
/// # async fn example() {
/// let transport = MockTransport::new();
/// transport.enqueue_response(json_response(200, r#"{"ok":true}"#));
///
/// let outcome = transport
///     .send(RequestSpec::new(Method::Get, "mock://resource"))
///     .await;
/// assert!(outcome.is_ok());
/// assert_eq!(transport.request_count(), 1);
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<RequestSpec>>>,
}

impl MockTransport {
    /// A transport with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    pub fn enqueue_response(&self, response: ApiResponse) {
        self.script.lock().unwrap().push_back(Scripted::Respond(response));
    }

    /// Queue a failure.
    pub fn enqueue_error(&self, error: ApiError) {
        self.script.lock().unwrap().push_back(Scripted::Fail(error));
    }

    /// Queue a response that stays in flight until the returned gate opens.
    #[must_use]
    pub fn enqueue_gated(&self, response: ApiResponse) -> Gate {
        let (release, gate) = oneshot::channel();
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Gated { response, gate });
        Gate { release }
    }

    /// Every request received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<RequestSpec> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests received so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Transport for MockTransport {
    fn send(&self, spec: RequestSpec) -> TransportFuture<'_> {
        self.requests.lock().unwrap().push(spec);
        let next = self.script.lock().unwrap().pop_front();
        Box::pin(async move {
            match next {
                Some(Scripted::Respond(response)) => Ok(response),
                Some(Scripted::Fail(error)) => Err(error),
                Some(Scripted::Gated { response, gate }) => {
                    // Err means the gate was dropped unopened; settle anyway.
                    let _ = gate.await;
                    Ok(response)
                }
                None => Err(ApiError::Unknown(
                    "mock transport script exhausted".to_string(),
                )),
            }
        })
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("scripted", &self.script.lock().unwrap().len())
            .field("received", &self.request_count())
            .finish()
    }
}

/// Shorthand for a successful response with a JSON body.
#[must_use]
pub fn json_response(status: u16, body: &str) -> ApiResponse {
    ApiResponse::new(status, "mock://request")
        .with_header("content-type", "application/json")
        .with_body(body.as_bytes().to_vec())
}

/// Shorthand for a response failure with the given status and no flags set.
#[must_use]
pub fn status_failure(status: u16) -> ApiError {
    ApiError::Response {
        status,
        url: "mock://request".to_string(),
        body: String::new(),
        is_401: false,
        is_502: false,
    }
}
