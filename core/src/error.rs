//! Error taxonomy and normalization for tracked requests.
//!
//! Every failure a caller can observe is an [`ApiError`]. Before a failure
//! reaches an `error` lifecycle event it is routed through an
//! [`ErrorNormalizer`], which annotates the statuses the application cares
//! about (401, 502) and hands every other response failure to a configurable
//! transform. Cancellation markers and failures without a response shape are
//! never rewritten.

use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors produced by the tracked request pipeline.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    /// Invalid listener registration: the event name is not one of the five
    /// recognized lifecycle kinds.
    #[error("\"{0}\" is not a valid event to subscribe to")]
    Configuration(String),

    /// The operation was superseded or explicitly cancelled.
    ///
    /// Never normalized and never dispatched as an `error` event: the
    /// superseded caller receives this directly, while the canceller
    /// observes a `cancelled` event instead.
    #[error("request for action \"{action}\" cancelled: {message}")]
    Cancelled {
        /// Action the cancelled operation was tracked under.
        action: String,
        /// Resolved cancellation message.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("server responded with status {status} for {url}")]
    Response {
        /// HTTP status code of the failed response.
        status: u16,
        /// URL the response was served from.
        url: String,
        /// Response body as text, for inspection by callers and transforms.
        body: String,
        /// Set by the normalizer when `status` is 401.
        is_401: bool,
        /// Set by the normalizer when `status` is 502.
        is_502: bool,
    },

    /// The request never produced a response (connect failure, reset, TLS
    /// setup, ...).
    #[error("transport failure: {0}")]
    Network(String),

    /// A response body could not be decoded into the requested type.
    #[error("failed to decode response body: {0}")]
    Decode(String),

    /// Fallback produced by the default error factory when no other error
    /// context exists.
    #[error("{0}")]
    Unknown(String),
}

impl ApiError {
    /// Whether this failure is a cancellation marker.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Status code carried by a response failure, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Response { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Transform applied to response failures whose status has no dedicated
/// flag. The default is the identity.
pub type ErrorTransformer = Arc<dyn Fn(ApiError) -> ApiError + Send + Sync>;

/// Factory producing the error used when a failure carries no context.
pub type ErrorFactory = Arc<dyn Fn() -> ApiError + Send + Sync>;

/// Maps raw transport failures into the categorized taxonomy.
///
/// Cancellations and failures without a response shape pass through
/// unchanged. Response failures get their status inspected: 401 and 502
/// receive their dedicated flags, everything else goes through the
/// configured transform.
pub struct ErrorNormalizer {
    transformer: ErrorTransformer,
    default_error: Mutex<ErrorFactory>,
}

impl ErrorNormalizer {
    /// Build a normalizer from a status transform and a default-error
    /// factory.
    #[must_use]
    pub fn new(transformer: ErrorTransformer, default_error: ErrorFactory) -> Self {
        Self {
            transformer,
            default_error: Mutex::new(default_error),
        }
    }

    /// Replace the default-error factory.
    pub fn set_default_error(&self, factory: ErrorFactory) {
        *self.lock() = factory;
    }

    /// The error produced when no other error context exists.
    #[must_use]
    pub fn default_error(&self) -> ApiError {
        let factory = Arc::clone(&*self.lock());
        (*factory)()
    }

    /// Categorize a raw failure.
    ///
    /// `None` stands for a failure with no context at all and yields the
    /// default error.
    #[must_use]
    pub fn normalize(&self, error: Option<ApiError>) -> ApiError {
        let Some(error) = error else {
            return self.default_error();
        };
        match error {
            ApiError::Response {
                status: 401,
                url,
                body,
                ..
            } => ApiError::Response {
                status: 401,
                url,
                body,
                is_401: true,
                is_502: false,
            },
            ApiError::Response {
                status: 502,
                url,
                body,
                ..
            } => ApiError::Response {
                status: 502,
                url,
                body,
                is_401: false,
                is_502: true,
            },
            ApiError::Response { .. } => (*self.transformer)(error),
            other => other,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ErrorFactory> {
        #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
        self.default_error.lock().unwrap()
    }
}

impl Default for ErrorNormalizer {
    fn default() -> Self {
        Self::new(
            Arc::new(|error| error),
            Arc::new(|| ApiError::Unknown("unknown API error occurred".to_string())),
        )
    }
}

// Manual Debug since the transform and factory are opaque closures
impl fmt::Debug for ErrorNormalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorNormalizer").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Test code can use unwrap/panic
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn response_failure(status: u16) -> ApiError {
        ApiError::Response {
            status,
            url: "http://api.test/resource".to_string(),
            body: String::new(),
            is_401: false,
            is_502: false,
        }
    }

    #[test]
    fn unauthorized_gets_the_401_flag_only() {
        let normalizer = ErrorNormalizer::default();
        match normalizer.normalize(Some(response_failure(401))) {
            ApiError::Response {
                status,
                is_401,
                is_502,
                ..
            } => {
                assert_eq!(status, 401);
                assert!(is_401);
                assert!(!is_502);
            }
            other => panic!("expected a response failure, got {other:?}"),
        }
    }

    #[test]
    fn bad_gateway_gets_the_502_flag_only() {
        let normalizer = ErrorNormalizer::default();
        match normalizer.normalize(Some(response_failure(502))) {
            ApiError::Response {
                status,
                is_401,
                is_502,
                ..
            } => {
                assert_eq!(status, 502);
                assert!(!is_401);
                assert!(is_502);
            }
            other => panic!("expected a response failure, got {other:?}"),
        }
    }

    #[test]
    fn other_statuses_go_through_the_configured_transform() {
        let normalizer = ErrorNormalizer::new(
            Arc::new(|error| match error {
                ApiError::Response { status, url, .. } => ApiError::Response {
                    status,
                    url,
                    body: "transformed".to_string(),
                    is_401: false,
                    is_502: false,
                },
                other => other,
            }),
            Arc::new(|| ApiError::Unknown("unused".to_string())),
        );
        match normalizer.normalize(Some(response_failure(500))) {
            ApiError::Response { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "transformed");
            }
            other => panic!("expected a response failure, got {other:?}"),
        }
    }

    #[test]
    fn flagged_statuses_bypass_the_transform() {
        let normalizer = ErrorNormalizer::new(
            Arc::new(|_| ApiError::Unknown("transform ran".to_string())),
            Arc::new(|| ApiError::Unknown("unused".to_string())),
        );
        assert!(matches!(
            normalizer.normalize(Some(response_failure(401))),
            ApiError::Response { is_401: true, .. }
        ));
        assert!(matches!(
            normalizer.normalize(Some(response_failure(502))),
            ApiError::Response { is_502: true, .. }
        ));
    }

    #[test]
    fn cancellations_pass_through_unchanged() {
        let normalizer = ErrorNormalizer::default();
        let cancelled = ApiError::Cancelled {
            action: "search".to_string(),
            message: "superseded".to_string(),
        };
        assert!(matches!(
            normalizer.normalize(Some(cancelled)),
            ApiError::Cancelled { .. }
        ));
    }

    #[test]
    fn failures_without_a_response_shape_pass_through() {
        let normalizer = ErrorNormalizer::default();
        assert!(matches!(
            normalizer.normalize(Some(ApiError::Network("connection reset".to_string()))),
            ApiError::Network(_)
        ));
    }

    #[test]
    fn missing_errors_fall_back_to_the_default_factory() {
        let normalizer = ErrorNormalizer::default();
        match normalizer.normalize(None) {
            ApiError::Unknown(message) => assert_eq!(message, "unknown API error occurred"),
            other => panic!("expected the default error, got {other:?}"),
        }
    }

    #[test]
    fn the_default_factory_can_be_replaced() {
        let normalizer = ErrorNormalizer::default();
        normalizer.set_default_error(Arc::new(|| ApiError::Unknown("replaced".to_string())));
        match normalizer.normalize(None) {
            ApiError::Unknown(message) => assert_eq!(message, "replaced"),
            other => panic!("expected the replaced error, got {other:?}"),
        }
    }

    #[test]
    fn status_accessor_only_reads_response_failures() {
        assert_eq!(response_failure(503).status(), Some(503));
        assert_eq!(ApiError::Network("reset".to_string()).status(), None);
    }

    proptest! {
        #[test]
        fn unflagged_statuses_stay_unflagged(status in 100u16..600) {
            prop_assume!(status != 401 && status != 502);
            let normalizer = ErrorNormalizer::default();
            match normalizer.normalize(Some(response_failure(status))) {
                ApiError::Response { is_401, is_502, .. } => {
                    prop_assert!(!is_401);
                    prop_assert!(!is_502);
                }
                other => prop_assert!(false, "expected a response failure, got {other:?}"),
            }
        }
    }
}
