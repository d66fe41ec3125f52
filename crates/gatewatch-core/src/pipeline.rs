//! The per-exchange decision pipeline.
//!
//! Each exchange runs through a fixed sequence of gates:
//!
//! ```text
//! config check -> endpoint check -> build payload -> serialize
//!              -> select destination -> emit
//! ```
//!
//! Every gate runs inside its own panic boundary. A gate that fails
//! suppresses the event, except the endpoint check, which lets the exchange
//! through when it fails. [`Pipeline::observe`] is the outermost boundary
//! and never lets a failure reach the host.
//!
//! # Example
//!
//! ```
//! use gatewatch_core::prelude::*;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let pipeline = Pipeline::new(
//!     ObserverConfig::new()
//!         .api_key("sdk-token")
//!         .project_id("project-42"),
//! );
//! let sink = MemorySink::new();
//!
//! let exchange = Exchange::new(
//!     ObservedRequest::new("GET", "https://api.example.com/v1/users").with_path("/users"),
//!     ObservedResponse::new(200),
//! );
//! let outcome = pipeline.observe(&exchange, &MapContext::new(), &mut StdRng::seed_from_u64(1), &sink);
//!
//! assert!(outcome.is_emitted());
//! assert_eq!(sink.len(), 1);
//! ```

use crate::body::BodyCodec;
use crate::clock::{Clock, SystemClock};
use crate::config::ObserverConfig;
use crate::context::HostContext;
use crate::destination::Destination;
use crate::dispatch::{DispatchSink, Emission, CONTENT_TYPE_JSON};
use crate::error::{Result, SuppressReason};
use crate::event::{EventAssembler, FallbackPayload};
use crate::exchange::Exchange;
use rand::Rng;
use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// What happened to one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// An event was handed to the sink
    Emitted {
        /// Where the event is going
        destination: Destination,
        /// Serialized payload length in bytes
        size: usize,
    },
    /// No event was emitted
    Suppressed(SuppressReason),
}

impl Outcome {
    /// Whether an event was handed to the sink.
    pub fn is_emitted(&self) -> bool {
        matches!(self, Outcome::Emitted { .. })
    }

    /// The suppression reason, if any.
    pub fn reason(&self) -> Option<&SuppressReason> {
        match self {
            Outcome::Suppressed(reason) => Some(reason),
            Outcome::Emitted { .. } => None,
        }
    }
}

/// Observation pipeline sharing one immutable configuration.
///
/// Cheap to clone; clones share configuration and clock.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<ObserverConfig>,
    codec: Arc<BodyCodec>,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    /// Create a pipeline using the system clock.
    pub fn new(config: ObserverConfig) -> Self {
        let codec = config.body_codec();
        Self {
            config: Arc::new(config),
            codec: Arc::new(codec),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// The pipeline configuration.
    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    /// Run every gate up to, but not including, the hand-off to a sink.
    pub fn process<C, R>(&self, exchange: &Exchange, ctx: &C, rng: &mut R) -> Result<Emission>
    where
        C: HostContext + ?Sized,
        R: Rng + ?Sized,
    {
        let endpoints = self.config.endpoints();
        self.run_gates(exchange, ctx, rng, |path| endpoints.is_blocked(path))
    }

    fn run_gates<C, R>(
        &self,
        exchange: &Exchange,
        ctx: &C,
        rng: &mut R,
        is_blocked: impl FnOnce(Option<&str>) -> bool,
    ) -> Result<Emission>
    where
        C: HostContext + ?Sized,
        R: Rng + ?Sized,
    {
        let config = &*self.config;
        let ctx = &ctx;

        // Gate 1: credentials
        let credentials = match guarded(|| config.resolve_credentials(ctx)) {
            Ok(Ok(credentials)) => credentials,
            Ok(Err(problems)) => return Err(SuppressReason::ConfigurationInvalid(problems)),
            Err(panic) => return Err(SuppressReason::UnexpectedInternalFailure(panic)),
        };
        self.debug("config_check", "Configuration validated");

        // Gate 2: endpoint filter, fails open
        let path = exchange.request.path.as_deref();
        match guarded(|| is_blocked(path)) {
            Ok(true) => {
                return Err(SuppressReason::EndpointBlocked(
                    path.unwrap_or_default().to_string(),
                ))
            }
            Ok(false) => self.debug("endpoint_check", "Endpoint allowed for tracking"),
            Err(panic) => tracing::error!(
                gate = "endpoint_check",
                path = path.unwrap_or_default(),
                error = %panic,
                "Endpoint check failed, allowing tracking"
            ),
        }

        // Gate 3: payload
        let now = self.clock.now();
        let event = guarded(|| {
            EventAssembler::new(config, &self.codec).build(exchange, &credentials, ctx, now)
        })
        .map_err(SuppressReason::PayloadBuildFailed)?;
        self.debug("build_payload", "Payload built");

        // Gate 4: serialization
        let payload = self.serialize(&event, &now)?;
        if config.is_debug() {
            tracing::debug!(gate = "serialize", size = payload.len(), "Payload serialized");
        }

        // Gate 5: destination
        let destination = match guarded(|| config.destinations().select(rng)) {
            Ok(Ok(destination)) => destination,
            Ok(Err(e)) => return Err(SuppressReason::DestinationSelectionFailed(e.to_string())),
            Err(panic) => return Err(SuppressReason::DestinationSelectionFailed(panic)),
        };
        if config.is_debug() {
            tracing::debug!(gate = "select_destination", destination = %destination, "Destination selected");
        }

        Ok(Emission {
            payload,
            content_type: CONTENT_TYPE_JSON.to_string(),
            api_key: credentials.api_key,
            user_agent: config.user_agent.clone(),
            destination,
        })
    }

    /// Process an exchange and hand the result to a sink.
    ///
    /// Never panics and never returns an error; the outcome is logged and
    /// returned for the caller's information only.
    pub fn observe<C, R, S>(&self, exchange: &Exchange, ctx: &C, rng: &mut R, sink: &S) -> Outcome
    where
        C: HostContext + ?Sized,
        R: Rng + ?Sized,
        S: DispatchSink + ?Sized,
    {
        let result = guarded(|| -> Result<Outcome> {
            let emission = self.process(exchange, ctx, rng)?;
            sink.dispatch(&emission)?;
            Ok(Outcome::Emitted {
                size: emission.payload.len(),
                destination: emission.destination,
            })
        })
        .unwrap_or_else(|panic| Err(SuppressReason::UnexpectedInternalFailure(panic)));

        match result {
            Ok(outcome) => {
                self.debug("emit", "Payload handed off");
                outcome
            }
            Err(reason) => {
                self.log_suppressed(exchange, &reason);
                Outcome::Suppressed(reason)
            }
        }
    }

    fn serialize<T: Serialize>(&self, event: &T, now: &chrono::DateTime<chrono::Utc>) -> Result<String> {
        let error = match guarded(|| serde_json::to_string(event)) {
            Ok(Ok(payload)) => return Ok(payload),
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic,
        };

        if !self.config.fallback_on_serialize_error {
            return Err(SuppressReason::SerializationFailed(error));
        }

        tracing::error!(gate = "serialize", error = %error, "Serialization failed, sending fallback payload");
        serde_json::to_string(&FallbackPayload::new(error, now))
            .map_err(|e| SuppressReason::SerializationFailed(e.to_string()))
    }

    fn debug(&self, gate: &'static str, message: &str) {
        if self.config.is_debug() {
            tracing::debug!(gate, "{}", message);
        }
    }

    fn log_suppressed(&self, exchange: &Exchange, reason: &SuppressReason) {
        let path = exchange.request.path.as_deref().unwrap_or_default();
        if reason.is_expected() {
            if self.config.is_debug() {
                tracing::debug!(path, reason = %reason, "Skipping event");
            }
        } else {
            tracing::error!(path, reason = %reason, "Skipping event");
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Run a closure, turning a panic into its message.
fn guarded<T>(f: impl FnOnce() -> T) -> std::result::Result<T, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::context::{vars, MapContext};
    use crate::destination::SelectionMode;
    use crate::dispatch::MemorySink;
    use crate::error::{CredentialProblem, DispatchError};
    use crate::exchange::{ObservedRequest, ObservedResponse};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde::Serializer;

    fn configured() -> ObserverConfig {
        ObserverConfig::new().api_key("key").project_id("project")
    }

    fn exchange(path: &str) -> Exchange {
        Exchange::new(
            ObservedRequest::new("GET", format!("https://api.example.com{}", path)).with_path(path),
            ObservedResponse::new(200),
        )
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(3)
    }

    #[test]
    fn test_pipeline_is_shareable() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<Pipeline>();
    }

    #[test]
    fn test_process_builds_emission() {
        let pipeline = Pipeline::new(configured()).with_clock(FixedClock::at_millis(0));

        let emission = pipeline
            .process(&exchange("/users"), &MapContext::new(), &mut rng())
            .unwrap();

        assert_eq!(emission.content_type, "application/json");
        assert_eq!(emission.api_key, "key");
        assert_eq!(emission.user_agent, "Apigee-plugin-treblle");
        let payload: serde_json::Value = serde_json::from_str(&emission.payload).unwrap();
        assert_eq!(payload["project_id"], "project");
        assert_eq!(payload["data"]["request"]["route_path"], "/users");
    }

    #[test]
    fn test_missing_credentials() {
        let pipeline = Pipeline::new(ObserverConfig::new());
        let err = pipeline
            .process(&exchange("/users"), &MapContext::new(), &mut rng())
            .unwrap_err();
        assert_eq!(
            err,
            SuppressReason::ConfigurationInvalid(vec![
                CredentialProblem::MissingApiKey,
                CredentialProblem::MissingProjectId,
            ])
        );
    }

    #[test]
    fn test_blocked_endpoint() {
        let pipeline = Pipeline::new(configured());
        let err = pipeline
            .process(&exchange("/health"), &MapContext::new(), &mut rng())
            .unwrap_err();
        assert_eq!(err, SuppressReason::EndpointBlocked("/health".into()));
        assert!(err.is_expected());
    }

    #[test]
    fn test_blocked_endpoint_skips_fault_inspection() {
        let pipeline = Pipeline::new(configured());
        let ctx = PanickingContext {
            inner: MapContext::new(),
            poisoned: vars::FAULT_NAME,
        };
        let err = pipeline
            .process(&exchange("/admin/users"), &ctx, &mut rng())
            .unwrap_err();
        assert!(matches!(err, SuppressReason::EndpointBlocked(_)));
    }

    struct PanickingContext {
        inner: MapContext,
        poisoned: &'static str,
    }

    impl HostContext for PanickingContext {
        fn variable(&self, name: &str) -> Option<String> {
            if name == self.poisoned {
                panic!("variable store exploded");
            }
            self.inner.variable(name)
        }
    }

    #[test]
    fn test_panic_during_build_suppresses() {
        let pipeline = Pipeline::new(configured());
        let ctx = PanickingContext {
            inner: MapContext::new(),
            poisoned: vars::FAULT_NAME,
        };
        let err = pipeline
            .process(&exchange("/users"), &ctx, &mut rng())
            .unwrap_err();
        assert_eq!(
            err,
            SuppressReason::PayloadBuildFailed("variable store exploded".into())
        );
    }

    #[test]
    fn test_panic_during_config_check_suppresses() {
        let pipeline = Pipeline::new(ObserverConfig::new());
        let ctx = PanickingContext {
            inner: MapContext::new(),
            poisoned: vars::SDK_TOKEN,
        };
        let outcome = pipeline.observe(&exchange("/users"), &ctx, &mut rng(), &MemorySink::new());
        assert!(matches!(
            outcome.reason(),
            Some(SuppressReason::UnexpectedInternalFailure(_))
        ));
    }

    #[test]
    fn test_failing_endpoint_check_lets_exchange_through() {
        let pipeline = Pipeline::new(configured());

        let emission = pipeline
            .run_gates(&exchange("/health"), &MapContext::new(), &mut rng(), |_| {
                panic!("endpoint rules unreadable")
            })
            .unwrap();

        let payload: serde_json::Value = serde_json::from_str(&emission.payload).unwrap();
        assert_eq!(payload["data"]["request"]["route_path"], "/health");
    }

    #[test]
    fn test_endpoint_check_receives_route_path() {
        let pipeline = Pipeline::new(configured());
        let err = pipeline
            .run_gates(&exchange("/orders"), &MapContext::new(), &mut rng(), |path| {
                path == Some("/orders")
            })
            .unwrap_err();
        assert_eq!(err, SuppressReason::EndpointBlocked("/orders".into()));
    }

    #[test]
    fn test_no_hosts_suppresses() {
        let config = configured().collector_hosts(Vec::<String>::new());
        let err = Pipeline::new(config)
            .process(&exchange("/users"), &MapContext::new(), &mut rng())
            .unwrap_err();
        assert_eq!(
            err,
            SuppressReason::DestinationSelectionFailed("no collector hosts configured".into())
        );
    }

    #[test]
    fn test_destination_is_deterministic_for_seed() {
        let pipeline = Pipeline::new(configured().selection_mode(SelectionMode::PrimaryFallback))
            .with_clock(FixedClock::at_millis(0));
        let a = pipeline
            .process(&exchange("/users"), &MapContext::new(), &mut StdRng::seed_from_u64(9))
            .unwrap();
        let b = pipeline
            .process(&exchange("/users"), &MapContext::new(), &mut StdRng::seed_from_u64(9))
            .unwrap();
        assert_eq!(a, b);
        assert!(a.destination.fallback.is_some());
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("cannot encode"))
        }
    }

    #[test]
    fn test_serialize_failure_suppresses_by_default() {
        let pipeline = Pipeline::new(configured());
        let now = FixedClock::at_millis(0).0;
        let err = pipeline.serialize(&Unserializable, &now).unwrap_err();
        assert_eq!(err, SuppressReason::SerializationFailed("cannot encode".into()));
    }

    #[test]
    fn test_serialize_failure_fallback_payload() {
        let pipeline = Pipeline::new(configured().fallback_on_serialize_error(true));
        let now = FixedClock::at_millis(0).0;

        let payload = pipeline.serialize(&Unserializable, &now).unwrap();

        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["error"], "Failed to generate payload");
        assert_eq!(value["errorMessage"], "cannot encode");
        assert_eq!(value["timestamp"], "1970-01-01 00:00:00");
    }

    struct FailingSink;

    impl DispatchSink for FailingSink {
        fn dispatch(&self, _emission: &Emission) -> std::result::Result<(), DispatchError> {
            Err(DispatchError::Unavailable("closed".into()))
        }
    }

    struct PanickingSink;

    impl DispatchSink for PanickingSink {
        fn dispatch(&self, _emission: &Emission) -> std::result::Result<(), DispatchError> {
            panic!("sink exploded")
        }
    }

    #[test]
    fn test_observe_contains_sink_failures() {
        let pipeline = Pipeline::new(configured());

        let outcome = pipeline.observe(&exchange("/users"), &MapContext::new(), &mut rng(), &FailingSink);
        assert_eq!(
            outcome,
            Outcome::Suppressed(SuppressReason::DispatchFailed(DispatchError::Unavailable(
                "closed".into()
            )))
        );

        let outcome = pipeline.observe(&exchange("/users"), &MapContext::new(), &mut rng(), &PanickingSink);
        assert_eq!(
            outcome,
            Outcome::Suppressed(SuppressReason::UnexpectedInternalFailure("sink exploded".into()))
        );
    }

    #[test]
    fn test_observe_emits_once() {
        let pipeline = Pipeline::new(configured().debug(true));
        let sink = MemorySink::new();

        let outcome = pipeline.observe(&exchange("/users"), &MapContext::new(), &mut rng(), &sink);

        let emissions = sink.emissions();
        assert_eq!(emissions.len(), 1);
        assert_eq!(
            outcome,
            Outcome::Emitted {
                destination: emissions[0].destination.clone(),
                size: emissions[0].payload.len(),
            }
        );
    }
}
