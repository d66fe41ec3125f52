//! Hand-off of finished payloads to the dispatch collaborator.
//!
//! The pipeline never performs network I/O. It produces an [`Emission`] and
//! passes it to a [`DispatchSink`]; the sink decides how the payload reaches
//! the collector. [`VariableSink`] publishes the emission as host variables
//! for a downstream send step, [`MemorySink`] keeps emissions in memory.

use crate::destination::Destination;
use crate::error::DispatchError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Content type of every emitted payload.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Host variables written by [`VariableSink`].
pub mod out_vars {
    /// Serialized event
    pub const PAYLOAD: &str = "treblle.payload.json";
    /// Payload content type
    pub const CONTENT_TYPE: &str = "treblle.content.type";
    /// Collector API key
    pub const API_KEY: &str = "treblle.api.key";
    /// User agent for the collector request
    pub const USER_AGENT: &str = "treblle.user.agent";
    /// Host to send to
    pub const SELECTED_HOST: &str = "treblle.selected.host";
    /// Host to try first
    pub const PRIMARY_HOST: &str = "treblle.primary.host";
    /// Host to try when the primary fails
    pub const FALLBACK_HOST: &str = "treblle.fallback.host";
}

/// A serialized event addressed to a collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emission {
    /// Serialized JSON payload
    pub payload: String,
    /// Always `application/json`
    pub content_type: String,
    /// Collector API key
    pub api_key: String,
    /// User agent for the collector request
    pub user_agent: String,
    /// Chosen collector host(s)
    pub destination: Destination,
}

/// Receives finished emissions.
///
/// Implementations must not block for long; they run on the host request
/// path.
pub trait DispatchSink: Send + Sync {
    /// Accept one emission.
    fn dispatch(&self, emission: &Emission) -> Result<(), DispatchError>;
}

impl<S: DispatchSink + ?Sized> DispatchSink for Arc<S> {
    fn dispatch(&self, emission: &Emission) -> Result<(), DispatchError> {
        (**self).dispatch(emission)
    }
}

impl<S: DispatchSink + ?Sized> DispatchSink for &S {
    fn dispatch(&self, emission: &Emission) -> Result<(), DispatchError> {
        (**self).dispatch(emission)
    }
}

/// Writable side of the host variable store.
pub trait VariableStore: Send + Sync {
    /// Set a variable, replacing any previous value.
    fn set_variable(&self, name: &str, value: &str) -> Result<(), DispatchError>;
}

impl VariableStore for Mutex<HashMap<String, String>> {
    fn set_variable(&self, name: &str, value: &str) -> Result<(), DispatchError> {
        let mut vars = self
            .lock()
            .map_err(|e| DispatchError::Unavailable(e.to_string()))?;
        vars.insert(name.to_string(), value.to_string());
        Ok(())
    }
}

impl<S: VariableStore + ?Sized> VariableStore for &S {
    fn set_variable(&self, name: &str, value: &str) -> Result<(), DispatchError> {
        (**self).set_variable(name, value)
    }
}

/// Publishes emissions as host variables for a downstream send step.
#[derive(Debug)]
pub struct VariableSink<S> {
    store: S,
}

impl<S: VariableStore> VariableSink<S> {
    /// Wrap a variable store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The wrapped store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Unwrap the store.
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S: VariableStore> DispatchSink for VariableSink<S> {
    fn dispatch(&self, emission: &Emission) -> Result<(), DispatchError> {
        let destination = &emission.destination;
        self.store.set_variable(out_vars::PAYLOAD, &emission.payload)?;
        self.store
            .set_variable(out_vars::CONTENT_TYPE, &emission.content_type)?;
        self.store.set_variable(out_vars::API_KEY, &emission.api_key)?;
        self.store
            .set_variable(out_vars::USER_AGENT, &emission.user_agent)?;
        self.store
            .set_variable(out_vars::SELECTED_HOST, &destination.primary)?;
        self.store
            .set_variable(out_vars::PRIMARY_HOST, &destination.primary)?;
        if let Some(fallback) = &destination.fallback {
            self.store.set_variable(out_vars::FALLBACK_HOST, fallback)?;
        }
        Ok(())
    }
}

/// Collects emissions in memory.
///
/// Cloning shares the underlying buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    emissions: Arc<Mutex<Vec<Emission>>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of every emission received so far.
    pub fn emissions(&self) -> Vec<Emission> {
        self.emissions
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Number of emissions received so far.
    pub fn len(&self) -> usize {
        self.emissions.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether nothing has been received.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return every emission.
    pub fn drain(&self) -> Vec<Emission> {
        self.emissions
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }
}

impl DispatchSink for MemorySink {
    fn dispatch(&self, emission: &Emission) -> Result<(), DispatchError> {
        self.emissions
            .lock()
            .map_err(|e| DispatchError::Unavailable(e.to_string()))?
            .push(emission.clone());
        Ok(())
    }
}
