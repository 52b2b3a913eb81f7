//! # Reqtrack Testing
//!
//! Testing utilities and helpers for reqtrack consumers.
//!
//! This crate provides:
//! - [`MockTransport`]: scripted transport with gated in-flight responses
//! - [`EventRecorder`]: captures lifecycle dispatches across all channels
//! - [`FixedClock`]: deterministic time for cancellation-token assertions
//! - [`init_tracing`]: opt-in tracing output for tests
//!
//! ## Example
//!
//! ```
//! use reqtrack_core::EventBus;
//! use reqtrack_testing::{EventRecorder, MockTransport, json_response};
//!
//! let transport = MockTransport::new();
//! transport.enqueue_response(json_response(200, r#"{"ok":true}"#));
//!
//! let bus = EventBus::new();
//! let recorder = EventRecorder::attach(&bus);
//! assert!(recorder.events().is_empty());
//! ```

pub mod recorder;
pub mod transport_mocks;

/// Mock implementations of environment traits.
pub mod mocks {
    use chrono::{DateTime, Utc};
    use reqtrack_core::environment::Clock;

    /// Fixed clock for deterministic tests.
    ///
    /// Always returns the same time, making cancellation-token timestamps
    /// reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use reqtrack_testing::mocks::FixedClock;
    /// use reqtrack_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC).
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Install a compact tracing subscriber for test output.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};
pub use recorder::{EventRecorder, RecordedEvent};
pub use transport_mocks::{Gate, MockTransport, json_response, status_failure};
