//! Lifecycle event kinds and the payload delivered to listeners.

use crate::error::ApiError;
use crate::response::ApiResponse;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The five lifecycle kinds a tracked request can emit.
///
/// `Resolved` is a meta-kind: its listeners are invoked alongside every
/// terminal kind (`Success`, `Error`, `Cancelled`) but never alongside
/// `Request`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// A tracked operation started.
    Request,
    /// A tracked operation settled with a response.
    Success,
    /// A tracked operation settled with a normalized failure.
    Error,
    /// A tracked operation was superseded or explicitly cancelled.
    Cancelled,
    /// Meta-kind observed whenever any terminal kind fires.
    Resolved,
}

impl LifecycleEvent {
    /// Every recognized kind.
    pub const ALL: [Self; 5] = [
        Self::Request,
        Self::Success,
        Self::Error,
        Self::Cancelled,
        Self::Resolved,
    ];

    /// Wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Success => "success",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
            Self::Resolved => "resolved",
        }
    }

    /// Terminal kinds settle an operation and fan out to `resolved`
    /// listeners.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Cancelled)
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleEvent {
    type Err = ApiError;

    /// Case-insensitive lookup by wire name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ApiError::Configuration(s.to_string()))
    }
}

/// Payload delivered to listeners.
///
/// `result` is present only on `success` dispatches and `error` only on
/// `error` dispatches. The `resolved` fan-out reuses the terminal kind in
/// `kind` and carries neither field.
#[derive(Debug, Clone)]
pub struct Event {
    /// Action the operation was tracked under.
    pub action: String,
    /// Kind of the dispatch this payload belongs to.
    pub kind: LifecycleEvent,
    /// Settled response, on `success` dispatches.
    pub result: Option<Arc<ApiResponse>>,
    /// Normalized failure, on `error` dispatches.
    pub error: Option<Arc<ApiError>>,
}

impl Event {
    /// A payload with neither result nor error attached.
    #[must_use]
    pub fn new(kind: LifecycleEvent, action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            kind,
            result: None,
            error: None,
        }
    }
}
