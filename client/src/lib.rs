//! # Reqtrack Client
//!
//! Tracked HTTP client built on the `reqtrack-core` lifecycle layer: every
//! request can carry a logical action name, at most one operation is in
//! flight per action, superseded operations are cooperatively cancelled, and
//! lifecycle events (`request`, `success`, `error`, `cancelled`, `resolved`)
//! are broadcast to observers. Failures are normalized into the core
//! taxonomy before they reach callers or listeners.
//!
//! ## Example
//!
//! ```no_run
//! use reqtrack_client::{ClientConfig, TrackedClient, Tracking};
//! use reqtrack_core::LifecycleEvent;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = TrackedClient::new(
//!         ClientConfig::builder()
//!             .base_url("https://api.example.com")
//!             .prefix("/v1")
//!             .build(),
//!     )?;
//!
//!     let _subscription = client.subscribe(LifecycleEvent::Request, |event| {
//!         println!("loading {}", event.action);
//!     });
//!
//!     // A fresh search supersedes the previous one still in flight.
//!     let results = client
//!         .tracked(Tracking::action("search").cancel_previous(true))
//!         .get("/search?q=reqtrack", None)
//!         .await?;
//!
//!     println!("{results:?}");
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod http;

pub use client::{RequestOptions, TrackedClient, TrackedScope, Tracking};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use http::HttpTransport;
