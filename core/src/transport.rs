//! The contract required of the underlying HTTP transport.
//!
//! The orchestration layer stays out of wire-level concerns: connection
//! handling, serialization, retries, and timeouts all belong to the
//! transport. The layer only needs to hand a [`RequestSpec`] over, receive
//! an owned [`ApiResponse`] or an [`ApiError`], and ask whether a given
//! rejection was caused by a cancellation signal.
//!
//! # Dyn Compatibility
//!
//! [`Transport::send`] returns an explicit `Pin<Box<dyn Future>>` instead of
//! using `async fn` so the trait can be used as a trait object
//! (`Arc<dyn Transport>`) and injected into the client.

use crate::error::ApiError;
use crate::response::ApiResponse;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// HTTP verb of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// DELETE
    Delete,
    /// GET
    Get,
    /// PATCH
    Patch,
    /// POST
    Post,
    /// PUT
    Put,
}

impl Method {
    /// Upper-case verb name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Get => "GET",
            Self::Patch => "PATCH",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the transport needs to issue one request.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    /// HTTP verb.
    pub method: Method,
    /// Fully resolved URL.
    pub url: String,
    /// Headers for this request.
    pub headers: HashMap<String, String>,
    /// JSON body, for verbs that carry one.
    pub body: Option<serde_json::Value>,
    /// Per-request timeout, passed through to the transport untouched.
    pub timeout: Option<Duration>,
}

impl RequestSpec {
    /// A bare spec for `method` and `url`.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// Attach a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach a per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<ApiResponse, ApiError>> + Send + 'a>>;

/// An HTTP collaborator the orchestration layer can drive.
pub trait Transport: Send + Sync {
    /// Issue the request described by `spec` and settle with an owned
    /// response or a failure carrying enough shape for normalization.
    fn send(&self, spec: RequestSpec) -> TransportFuture<'_>;

    /// Distinguish "this rejection is a cancellation" from any other
    /// failure.
    fn is_cancellation(&self, error: &ApiError) -> bool {
        error.is_cancelled()
    }
}
