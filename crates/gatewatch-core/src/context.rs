//! Read-only access to the host gateway's variable store.
//!
//! The pipeline never talks to a gateway runtime directly. A host binding
//! implements [`HostContext`] over whatever variable mechanism the gateway
//! exposes; tests use [`MapContext`].

use std::collections::HashMap;

/// Well-known host variable names.
pub mod vars {
    /// Collector API key (sent as `api_key`)
    pub const SDK_TOKEN: &str = "treblle.sdk.token";
    /// Collector project identifier (sent as `project_id`)
    pub const PROJECT_ID: &str = "treblle.api.key";
    /// Name of the proxy the policy runs in (sent as `internal_id`)
    pub const PROXY_NAME: &str = "apiproxy.name";
    /// Epoch milliseconds at which the gateway received the request
    pub const REQUEST_START: &str = "client.received.start.timestamp";
    /// Transport-layer client address
    pub const CLIENT_IP: &str = "client.ip";
    /// Scheme the client connected with
    pub const CLIENT_SCHEME: &str = "client.scheme";
    /// Address of the gateway node
    pub const SYSTEM_IP: &str = "system.interface.eth0";
    /// Gateway runtime version
    pub const SYSTEM_VERSION: &str = "system.version";

    /// Name of the active fault
    pub const FAULT_NAME: &str = "fault.name";
    /// Human readable fault reason
    pub const FAULT_REASON: &str = "fault.reason";
    /// Fault category
    pub const FAULT_CATEGORY: &str = "fault.category";
    /// Fault subcategory
    pub const FAULT_SUBCATEGORY: &str = "fault.subcategory";
    /// Explicit error message set by a policy
    pub const ERROR_MESSAGE: &str = "error.message";
    /// Error payload set by a policy
    pub const ERROR_CONTENT: &str = "error.content";
    /// Numeric error state
    pub const ERROR_STATE: &str = "error.state";
}

/// Read-only view of the host variable store.
///
/// Implementations must be cheap to query; the pipeline reads each variable
/// at most a handful of times per exchange.
pub trait HostContext {
    /// Look up a variable. Absent variables return `None`.
    fn variable(&self, name: &str) -> Option<String>;

    /// Look up a variable, treating the empty string as absent.
    fn non_empty(&self, name: &str) -> Option<String> {
        self.variable(name).filter(|v| !v.is_empty())
    }
}

impl<C: HostContext + ?Sized> HostContext for &C {
    fn variable(&self, name: &str) -> Option<String> {
        (**self).variable(name)
    }
}

impl HostContext for HashMap<String, String> {
    fn variable(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// In-memory variable store.
///
/// # Example
///
/// ```
/// use gatewatch_core::context::{vars, HostContext, MapContext};
///
/// let ctx = MapContext::new()
///     .with(vars::CLIENT_IP, "10.1.2.3")
///     .with(vars::FAULT_NAME, "");
///
/// assert_eq!(ctx.variable(vars::CLIENT_IP).as_deref(), Some("10.1.2.3"));
/// assert_eq!(ctx.non_empty(vars::FAULT_NAME), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MapContext {
    values: HashMap<String, String>,
}

impl MapContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable (builder style).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Add or replace a variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }
}

impl HostContext for MapContext {
    fn variable(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Fault information reported by the gateway for the current exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultState {
    /// Fault name; a fault is active when this is set
    pub name: Option<String>,
    /// Fault reason
    pub reason: Option<String>,
    /// Fault category
    pub category: Option<String>,
    /// Fault subcategory
    pub subcategory: Option<String>,
    /// Explicit error message
    pub error_message: Option<String>,
    /// Error content
    pub error_content: Option<String>,
    /// Raw error state
    pub error_state: Option<String>,
}

impl FaultState {
    /// Read the fault variables from the host. Empty values count as absent.
    pub fn from_context(ctx: &impl HostContext) -> Self {
        Self {
            name: ctx.non_empty(vars::FAULT_NAME),
            reason: ctx.non_empty(vars::FAULT_REASON),
            category: ctx.non_empty(vars::FAULT_CATEGORY),
            subcategory: ctx.non_empty(vars::FAULT_SUBCATEGORY),
            error_message: ctx.non_empty(vars::ERROR_MESSAGE),
            error_content: ctx.non_empty(vars::ERROR_CONTENT),
            error_state: ctx.non_empty(vars::ERROR_STATE),
        }
    }

    /// A fault with only a name set.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Whether the host reports an active fault.
    pub fn is_active(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.is_empty())
    }
}
