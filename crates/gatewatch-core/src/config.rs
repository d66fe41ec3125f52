//! Configuration for the observation pipeline.
//!
//! [`ObserverConfig`] is built once per process and never changes while
//! exchanges are processed. It can be assembled with the builder methods or,
//! with the `env-config` feature, loaded from `GATEWATCH_*` environment
//! variables through [`ObserverSettings`].
//!
//! ```
//! use gatewatch_core::config::ObserverConfig;
//! use gatewatch_core::destination::SelectionMode;
//!
//! let config = ObserverConfig::new()
//!     .api_key("sdk-token")
//!     .project_id("project-42")
//!     .blocked_endpoints(["health", "admin/*"])
//!     .masking_keywords(["authorization"])
//!     .max_body_size(1024 * 1024)
//!     .selection_mode(SelectionMode::PrimaryFallback);
//!
//! assert!(config.sensitive_keys().contains("Authorization"));
//! ```

use crate::body::{BodyCodec, DEFAULT_MAX_BODY_SIZE};
use crate::context::{vars, HostContext};
use crate::destination::{DestinationSelector, SelectionMode};
use crate::endpoint::{EndpointFilter, DEFAULT_BLOCKED_ENDPOINTS};
#[cfg(feature = "env-config")]
use crate::error::ConfigError;
use crate::error::CredentialProblem;
use crate::redact::SensitiveKeys;

/// Value operators leave in credential slots until they are configured.
pub const PLACEHOLDER: &str = "fixme";
/// Default `sdk` field of the event.
pub const DEFAULT_SDK_NAME: &str = "apigee";
/// Default `version` field of the event.
pub const DEFAULT_SCHEMA_VERSION: u32 = 20;
/// Default gateway name reported in the server and language sections.
pub const DEFAULT_PLATFORM_NAME: &str = "Apigee";
/// Default user agent handed to the dispatcher.
pub const DEFAULT_USER_AGENT: &str = "Apigee-plugin-treblle";

/// Immutable pipeline configuration.
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    pub(crate) api_key: Option<String>,
    pub(crate) project_id: Option<String>,
    pub(crate) internal_id: Option<String>,
    pub(crate) log_body: bool,
    pub(crate) debug: bool,
    pub(crate) endpoints: EndpointFilter,
    pub(crate) sensitive_keys: SensitiveKeys,
    pub(crate) max_body_size: usize,
    pub(crate) destinations: DestinationSelector,
    pub(crate) sdk_name: String,
    pub(crate) schema_version: u32,
    pub(crate) platform_name: String,
    pub(crate) user_agent: String,
    pub(crate) fallback_on_serialize_error: bool,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ObserverConfig {
    /// Create a configuration with default values.
    ///
    /// Defaults:
    /// - No credentials (read from host variables at request time)
    /// - Body logging on, debug logging off
    /// - Blocked endpoints: `health, status, ping, admin/*, internal/*`
    /// - Built-in sensitive keys only
    /// - Body ceiling: 2 MiB
    /// - Three collector hosts, one picked at random
    pub fn new() -> Self {
        Self {
            api_key: None,
            project_id: None,
            internal_id: None,
            log_body: true,
            debug: false,
            endpoints: EndpointFilter::from_patterns(DEFAULT_BLOCKED_ENDPOINTS),
            sensitive_keys: SensitiveKeys::default(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            destinations: DestinationSelector::default(),
            sdk_name: DEFAULT_SDK_NAME.to_string(),
            schema_version: DEFAULT_SCHEMA_VERSION,
            platform_name: DEFAULT_PLATFORM_NAME.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            fallback_on_serialize_error: false,
        }
    }

    /// Set the collector API key. Overrides the host variable.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the collector project id. Overrides the host variable.
    pub fn project_id(mut self, id: impl Into<String>) -> Self {
        self.project_id = Some(id.into());
        self
    }

    /// Set the internal id. Overrides the proxy name host variable.
    pub fn internal_id(mut self, id: impl Into<String>) -> Self {
        self.internal_id = Some(id.into());
        self
    }

    /// Enable or disable embedding of JSON bodies.
    pub fn log_body(mut self, enabled: bool) -> Self {
        self.log_body = enabled;
        self
    }

    /// Enable or disable per-gate debug logging.
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Replace the blocked endpoint patterns.
    pub fn blocked_endpoints(mut self, patterns: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        self.endpoints = EndpointFilter::from_patterns(patterns);
        self
    }

    /// Add masking keywords on top of the built-in sensitive keys.
    pub fn masking_keywords(mut self, keywords: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        self.sensitive_keys = SensitiveKeys::with_defaults(keywords);
        self
    }

    /// Set the body ceiling in bytes.
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Replace the collector host candidates.
    pub fn collector_hosts(mut self, hosts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.destinations = DestinationSelector::new(hosts, self.destinations.mode());
        self
    }

    /// Choose between single and primary/fallback destinations.
    pub fn selection_mode(mut self, mode: SelectionMode) -> Self {
        self.destinations = DestinationSelector::new(self.destinations.hosts().to_vec(), mode);
        self
    }

    /// Set the `sdk` field of the event.
    pub fn sdk_name(mut self, name: impl Into<String>) -> Self {
        self.sdk_name = name.into();
        self
    }

    /// Set the `version` field of the event.
    pub fn schema_version(mut self, version: u32) -> Self {
        self.schema_version = version;
        self
    }

    /// Set the gateway name reported in the server and language sections.
    pub fn platform_name(mut self, name: impl Into<String>) -> Self {
        self.platform_name = name.into();
        self
    }

    /// Set the user agent handed to the dispatcher.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Emit a minimal error payload when the event cannot be serialized.
    pub fn fallback_on_serialize_error(mut self, enabled: bool) -> Self {
        self.fallback_on_serialize_error = enabled;
        self
    }

    /// Whether per-gate debug logging is on.
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Whether JSON bodies are embedded.
    pub fn is_logging_body(&self) -> bool {
        self.log_body
    }

    /// The compiled endpoint filter.
    pub fn endpoints(&self) -> &EndpointFilter {
        &self.endpoints
    }

    /// The effective sensitive key set.
    pub fn sensitive_keys(&self) -> &SensitiveKeys {
        &self.sensitive_keys
    }

    /// The collector destination selector.
    pub fn destinations(&self) -> &DestinationSelector {
        &self.destinations
    }

    /// The body ceiling in bytes.
    pub fn body_limit(&self) -> usize {
        self.max_body_size
    }

    /// Build the body codec matching this configuration.
    pub fn body_codec(&self) -> BodyCodec {
        BodyCodec::new(self.sensitive_keys.clone(), self.max_body_size, self.log_body)
    }

    /// Resolve credentials, falling back to host variables.
    ///
    /// Returns every problem found when the api key or project id is missing
    /// or still the placeholder. The internal id is optional.
    pub fn resolve_credentials(
        &self,
        ctx: &impl HostContext,
    ) -> Result<Credentials, Vec<CredentialProblem>> {
        let api_key = usable(self.api_key.clone().or_else(|| ctx.variable(vars::SDK_TOKEN)));
        let project_id = usable(self.project_id.clone().or_else(|| ctx.variable(vars::PROJECT_ID)));
        let internal_id = usable(
            self.internal_id
                .clone()
                .or_else(|| ctx.variable(vars::PROXY_NAME)),
        );

        match (api_key, project_id) {
            (Some(api_key), Some(project_id)) => Ok(Credentials {
                api_key,
                project_id,
                internal_id,
            }),
            (api_key, project_id) => {
                let mut problems = Vec::new();
                if api_key.is_none() {
                    problems.push(CredentialProblem::MissingApiKey);
                }
                if project_id.is_none() {
                    problems.push(CredentialProblem::MissingProjectId);
                }
                Err(problems)
            }
        }
    }
}

/// Credentials identifying the sender to the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Collector API key
    pub api_key: String,
    /// Collector project id
    pub project_id: String,
    /// Optional sender identifier
    pub internal_id: Option<String>,
}

fn usable(value: Option<String>) -> Option<String> {
    value.filter(|v| {
        let trimmed = v.trim();
        !trimmed.is_empty() && trimmed != PLACEHOLDER
    })
}

/// Configuration read from `GATEWATCH_*` environment variables.
///
/// Every field is optional; unset fields keep the [`ObserverConfig`]
/// default. List fields are comma-separated, e.g.
/// `GATEWATCH_BLOCKED_ENDPOINTS=health,admin/*`.
#[cfg(feature = "env-config")]
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ObserverSettings {
    /// `GATEWATCH_API_KEY`
    pub api_key: Option<String>,
    /// `GATEWATCH_PROJECT_ID`
    pub project_id: Option<String>,
    /// `GATEWATCH_INTERNAL_ID`
    pub internal_id: Option<String>,
    /// `GATEWATCH_LOG_BODY`
    pub log_body: Option<bool>,
    /// `GATEWATCH_DEBUG`
    pub debug: Option<bool>,
    /// `GATEWATCH_BLOCKED_ENDPOINTS`
    pub blocked_endpoints: Option<Vec<String>>,
    /// `GATEWATCH_MASKING_KEYWORDS`
    pub masking_keywords: Option<Vec<String>>,
    /// `GATEWATCH_MAX_BODY_SIZE`
    pub max_body_size: Option<usize>,
    /// `GATEWATCH_COLLECTOR_HOSTS`
    pub collector_hosts: Option<Vec<String>>,
    /// `GATEWATCH_SELECTION_MODE` (`single` or `primary_fallback`)
    pub selection_mode: Option<String>,
    /// `GATEWATCH_SDK_NAME`
    pub sdk_name: Option<String>,
    /// `GATEWATCH_PLATFORM_NAME`
    pub platform_name: Option<String>,
    /// `GATEWATCH_FALLBACK_ON_SERIALIZE_ERROR`
    pub fallback_on_serialize_error: Option<bool>,
}

#[cfg(feature = "env-config")]
impl ObserverSettings {
    /// Environment variable prefix.
    pub const PREFIX: &'static str = "GATEWATCH_";

    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(envy::prefixed(Self::PREFIX).from_env::<Self>()?)
    }

    /// Apply the settings on top of the defaults.
    pub fn into_config(self) -> Result<ObserverConfig, ConfigError> {
        let mut config = ObserverConfig::new();

        if let Some(key) = self.api_key {
            config = config.api_key(key);
        }
        if let Some(id) = self.project_id {
            config = config.project_id(id);
        }
        if let Some(id) = self.internal_id {
            config = config.internal_id(id);
        }
        if let Some(enabled) = self.log_body {
            config = config.log_body(enabled);
        }
        if let Some(enabled) = self.debug {
            config = config.debug(enabled);
        }
        if let Some(patterns) = self.blocked_endpoints {
            config = config.blocked_endpoints(patterns);
        }
        if let Some(keywords) = self.masking_keywords {
            config = config.masking_keywords(keywords);
        }
        if let Some(size) = self.max_body_size {
            if size == 0 {
                return Err(ConfigError::Invalid {
                    field: "max_body_size".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
            config = config.max_body_size(size);
        }
        if let Some(hosts) = self.collector_hosts {
            config = config.collector_hosts(hosts);
            if config.destinations.hosts().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "collector_hosts".to_string(),
                    reason: "at least one host is required".to_string(),
                });
            }
        }
        if let Some(mode) = self.selection_mode {
            let mode = mode
                .parse::<SelectionMode>()
                .map_err(|e| ConfigError::Invalid {
                    field: "selection_mode".to_string(),
                    reason: e.to_string(),
                })?;
            config = config.selection_mode(mode);
        }
        if let Some(name) = self.sdk_name {
            config = config.sdk_name(name);
        }
        if let Some(name) = self.platform_name {
            config = config.platform_name(name);
        }
        if let Some(enabled) = self.fallback_on_serialize_error {
            config = config.fallback_on_serialize_error(enabled);
        }

        Ok(config)
    }
}

#[cfg(feature = "env-config")]
impl ObserverConfig {
    /// Load configuration from `GATEWATCH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        ObserverSettings::from_env()?.into_config()
    }

    /// Load a `.env` file from the current directory, then read
    /// `GATEWATCH_*` variables as [`from_env`](Self::from_env) does.
    ///
    /// Variables already set in the process win over the file.
    pub fn from_env_with_dotenv() -> Result<Self, ConfigError> {
        load_dotenv();
        Self::from_env()
    }
}

/// Load variables from a `.env` file in the current directory.
///
/// A missing file is not an error; existing variables are not overridden.
#[cfg(feature = "env-config")]
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}
