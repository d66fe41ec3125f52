//! Error types for gatewatch-core
//!
//! Nothing in this module ever reaches the host request path. Every failure
//! is converted by the [`Pipeline`](crate::pipeline::Pipeline) into a
//! [`SuppressReason`] and reported through a log line.

use thiserror::Error;

/// Why no event was emitted for an exchange.
///
/// Returned by [`Pipeline::process`](crate::pipeline::Pipeline::process).
/// A host binding maps every variant to a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SuppressReason {
    /// Credentials are missing or still set to the placeholder value
    #[error("configuration invalid: {}", join_problems(.0))]
    ConfigurationInvalid(Vec<CredentialProblem>),

    /// The route path matched a blocked endpoint rule (not an error)
    #[error("endpoint blocked from tracking: {0}")]
    EndpointBlocked(String),

    /// Event assembly failed
    #[error("failed to build payload: {0}")]
    PayloadBuildFailed(String),

    /// The assembled event could not be converted to JSON
    #[error("failed to serialize payload: {0}")]
    SerializationFailed(String),

    /// No collector destination could be chosen
    #[error("failed to select destination: {0}")]
    DestinationSelectionFailed(String),

    /// The dispatch sink refused the emission
    #[error("failed to hand off payload: {0}")]
    DispatchFailed(#[from] DispatchError),

    /// Anything not covered above, including panics caught at the boundary
    #[error("unexpected internal failure: {0}")]
    UnexpectedInternalFailure(String),
}

impl SuppressReason {
    /// Whether this reason is a deliberate skip rather than a failure.
    ///
    /// Blocked endpoints are logged at debug level, everything else at error.
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::EndpointBlocked(_))
    }
}

/// A credential that cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CredentialProblem {
    /// API key is absent, blank or the placeholder
    #[error("API key is not configured")]
    MissingApiKey,

    /// Project id is absent, blank or the placeholder
    #[error("project id is not configured")]
    MissingProjectId,
}

fn join_problems(problems: &[CredentialProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Error raised by a [`DispatchSink`](crate::dispatch::DispatchSink).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The host refused to store a variable
    #[error("host rejected variable '{name}': {reason}")]
    VariableRejected {
        /// Variable name
        name: String,
        /// Host-supplied reason
        reason: String,
    },

    /// Sink is closed or otherwise unavailable
    #[error("dispatch sink unavailable: {0}")]
    Unavailable(String),
}

/// Error raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable deserialization failed
    #[cfg(feature = "env-config")]
    #[error("configuration error: {0}")]
    Env(#[from] envy::Error),

    /// A value was present but could not be used
    #[error("invalid value for '{field}': {reason}")]
    Invalid {
        /// Setting name
        field: String,
        /// Why it was rejected
        reason: String,
    },
}

/// Result type alias for gatewatch operations
pub type Result<T, E = SuppressReason> = std::result::Result<T, E>;
