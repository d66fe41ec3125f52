//! # gatewatch-core
//!
//! Payload construction core for API-traffic observability inside an API
//! gateway.
//!
//! For every request/response exchange the [`Pipeline`] decides whether a
//! monitoring event should be emitted and, if so, builds a privacy-scrubbed
//! JSON description of the exchange for a remote collector. The pipeline
//! runs synchronously on the host request path and never fails it: every
//! problem becomes a [`SuppressReason`] and a log line.
//!
//! ## Modules
//!
//! - [`redact`] - sensitive field masking for JSON values and headers
//! - [`endpoint`] - blocked endpoint rules
//! - [`body`] - body size capping and JSON decoding
//! - [`classify`] - fault and HTTP status error classification
//! - [`event`] - the collector's wire schema and event assembly
//! - [`pipeline`] - the gated per-exchange pipeline
//! - [`dispatch`] - hand-off of finished payloads
//! - [`config`] - immutable configuration, optionally from the environment
//!
//! ## Features
//!
//! - `env-config` (default) - load configuration from `GATEWATCH_*`
//!   environment variables and `.env` files
//!
//! ## Example
//!
//! ```
//! use gatewatch_core::prelude::*;
//! use rand::thread_rng;
//!
//! let pipeline = Pipeline::new(
//!     ObserverConfig::new()
//!         .api_key("sdk-token")
//!         .project_id("project-42")
//!         .masking_keywords(["authorization"]),
//! );
//!
//! let exchange = Exchange::new(
//!     ObservedRequest::new("POST", "https://api.example.com/login")
//!         .with_path("/login")
//!         .with_body(r#"{"user":"ada","password":"hunter2"}"#),
//!     ObservedResponse::new(200),
//! );
//!
//! let emission = pipeline
//!     .process(&exchange, &MapContext::new(), &mut thread_rng())
//!     .unwrap();
//! assert!(!emission.payload.contains("hunter2"));
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod body;
pub mod classify;
pub mod clock;
pub mod config;
pub mod context;
pub mod destination;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod exchange;
pub mod logging;
pub mod pipeline;
pub mod redact;

pub use config::ObserverConfig;
pub use error::{ConfigError, CredentialProblem, DispatchError, Result, SuppressReason};
pub use event::TelemetryEvent;
pub use pipeline::{Outcome, Pipeline};

/// Commonly used types.
pub mod prelude {
    pub use crate::clock::{Clock, FixedClock, SystemClock};
    pub use crate::config::ObserverConfig;
    pub use crate::context::{HostContext, MapContext};
    pub use crate::destination::{Destination, SelectionMode};
    pub use crate::dispatch::{DispatchSink, Emission, MemorySink, VariableSink};
    pub use crate::error::SuppressReason;
    pub use crate::exchange::{Exchange, ObservedRequest, ObservedResponse, RawBody};
    pub use crate::pipeline::{Outcome, Pipeline};
}
