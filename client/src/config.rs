//! Client configuration and defaults.

use reqtrack_core::{ApiError, CancelMessage, ErrorFactory, ErrorTransformer};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration consumed by [`TrackedClient`](crate::TrackedClient).
///
/// The defaults match what an unconfigured client needs: empty base URL and
/// prefix, no default headers, an elapsed-time cancel message, an
/// "unknown API error" factory, and an identity error transform.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL prepended to relative request URLs.
    pub base_url: String,
    /// Path prefix concatenated onto the base URL.
    pub prefix: String,
    /// Headers applied to every request unless overridden per call.
    pub headers: HashMap<String, String>,
    /// Message attached to supersede cancellations.
    pub default_cancel_message: CancelMessage,
    /// Factory for the error used when a failure carries no context.
    pub default_error: ErrorFactory,
    /// Transform applied to response failures without a dedicated flag.
    pub error_transformer: ErrorTransformer,
    /// Client-wide request timeout, passed through to the transport.
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            prefix: String::new(),
            headers: HashMap::new(),
            default_cancel_message: CancelMessage::default(),
            default_error: Arc::new(|| {
                ApiError::Unknown("unknown API error occurred".to_string())
            }),
            error_transformer: Arc::new(|error| error),
            timeout: None,
        }
    }
}

impl ClientConfig {
    /// Create a new config builder.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    /// Base URL and prefix concatenated, as relative requests see it.
    #[must_use]
    pub fn root(&self) -> String {
        format!("{}{}", self.base_url, self.prefix)
    }
}

// Manual Debug since the error factory and transform are opaque closures
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("prefix", &self.prefix)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the base URL prepended to relative request URLs.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Set the path prefix concatenated onto the base URL.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = prefix.into();
        self
    }

    /// Add a header applied to every request.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(name.into(), value.into());
        self
    }

    /// Set the message attached to supersede cancellations.
    #[must_use]
    pub fn default_cancel_message(mut self, message: impl Into<CancelMessage>) -> Self {
        self.config.default_cancel_message = message.into();
        self
    }

    /// Set the factory for the error used when a failure carries no context.
    #[must_use]
    pub fn default_error(mut self, factory: impl Fn() -> ApiError + Send + Sync + 'static) -> Self {
        self.config.default_error = Arc::new(factory);
        self
    }

    /// Set the transform applied to response failures without a dedicated
    /// flag.
    #[must_use]
    pub fn error_transformer(
        mut self,
        transformer: impl Fn(ApiError) -> ApiError + Send + Sync + 'static,
    ) -> Self {
        self.config.error_transformer = Arc::new(transformer);
        self
    }

    /// Set the client-wide request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Build the [`ClientConfig`].
    #[must_use]
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
