//! Telemetry event schema and assembly.
//!
//! The structs in this module serialize to the collector's wire format.
//! Field declaration order is the serialized order.

use crate::body::BodyCodec;
use crate::classify::{classify, ErrorRecord};
use crate::clock::{elapsed_millis, format_timestamp, from_epoch_millis};
use crate::config::{Credentials, ObserverConfig};
use crate::context::{vars, FaultState, HostContext};
use crate::exchange::{flatten_header, parse_leading_int, Exchange};
use crate::redact::mask_headers;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Address reported when no client or server address is known.
pub const UNKNOWN_IP: &str = "bogon";

/// Headers consulted for the client address, in priority order.
const CLIENT_IP_HEADERS: &[&str] = &["x-forwarded-for", "x-real-ip", "x-client-ip"];

/// One monitoring event, ready for serialization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
    /// Collector API key
    pub api_key: String,
    /// Collector project id
    pub project_id: String,
    /// Schema version
    pub version: u32,
    /// SDK name
    pub sdk: String,
    /// Sender identifier, omitted when unknown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_id: Option<String>,
    /// Exchange description
    pub data: EventData,
}

/// The `data` section of an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventData {
    /// Gateway node description
    pub server: ServerInfo,
    /// Gateway runtime description
    pub language: LanguageInfo,
    /// The inbound request
    pub request: RequestInfo,
    /// The outbound response
    pub response: ResponseInfo,
    /// At most one classified error
    pub errors: Vec<ErrorRecord>,
}

/// Gateway node description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    /// Node address
    pub ip: String,
    /// Always `UTC`
    pub timezone: String,
    /// Gateway product name
    pub software: String,
    /// Client protocol, e.g. `HTTPS/1.1`
    pub protocol: String,
    /// Operating system description
    pub os: OsInfo,
}

/// Operating system description. Only the name is known to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OsInfo {
    /// Gateway product name
    pub name: String,
    /// Always `null`
    pub release: Option<String>,
    /// Always `null`
    pub architecture: Option<String>,
}

/// Gateway runtime description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageInfo {
    /// Gateway product name
    pub name: String,
    /// Runtime version, `null` when unknown
    pub version: Option<String>,
}

/// The `request` section of an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestInfo {
    /// Request start, `YYYY-MM-DD HH:mm:ss` UTC
    pub timestamp: String,
    /// Client address
    pub ip: String,
    /// Full request URL
    pub url: String,
    /// `User-Agent` header, empty when absent
    pub user_agent: String,
    /// Upper-cased method
    pub method: String,
    /// Flattened and masked headers
    pub headers: Map<String, Value>,
    /// Decoded body
    pub body: Value,
    /// Route path relative to the proxy
    pub route_path: String,
    /// Decoded query parameters
    pub query: Map<String, Value>,
}

/// The `response` section of an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseInfo {
    /// Flattened and masked headers
    pub headers: Map<String, Value>,
    /// Status code, 0 when unknown
    pub code: u16,
    /// Response size in bytes
    pub size: u64,
    /// Milliseconds between request start and assembly
    pub load_time: u64,
    /// Decoded body
    pub body: Value,
}

/// Builds [`TelemetryEvent`]s from exchanges.
///
/// Assembly is total: every missing input degrades to a default value.
#[derive(Debug, Clone)]
pub struct EventAssembler<'a> {
    config: &'a ObserverConfig,
    codec: &'a BodyCodec,
}

impl<'a> EventAssembler<'a> {
    /// Create an assembler over a configuration and its body codec.
    pub fn new(config: &'a ObserverConfig, codec: &'a BodyCodec) -> Self {
        Self { config, codec }
    }

    /// Assemble the event for one exchange.
    pub fn build(
        &self,
        exchange: &Exchange,
        credentials: &Credentials,
        ctx: &impl HostContext,
        now: DateTime<Utc>,
    ) -> TelemetryEvent {
        let started = request_start(ctx).unwrap_or(now);
        let keys = self.config.sensitive_keys();
        let req = &exchange.request;
        let res = &exchange.response;

        let request = RequestInfo {
            timestamp: format_timestamp(&started),
            ip: client_ip(exchange, ctx),
            url: req.url.clone().unwrap_or_default(),
            user_agent: flatten_header(&req.headers, "user-agent").unwrap_or_default(),
            method: req.method_or_default(),
            headers: mask_headers(&req.headers, keys),
            body: self
                .codec
                .decode(req.body.as_ref(), content_type(&req.headers).as_deref())
                .into_value(),
            route_path: req.path.clone().unwrap_or_default(),
            query: req.query_params(),
        };

        let code = res.status.unwrap_or(0);
        let response_body = self
            .codec
            .decode(res.body.as_ref(), content_type(&res.headers).as_deref())
            .into_value();
        let errors = classify(&FaultState::from_context(ctx), &response_body, code);

        let response = ResponseInfo {
            headers: mask_headers(&res.headers, keys),
            code,
            size: res.size(),
            load_time: elapsed_millis(&started, &now),
            body: response_body,
        };

        TelemetryEvent {
            api_key: credentials.api_key.clone(),
            project_id: credentials.project_id.clone(),
            version: self.config.schema_version,
            sdk: self.config.sdk_name.clone(),
            internal_id: credentials.internal_id.clone(),
            data: EventData {
                server: self.server_info(ctx),
                language: LanguageInfo {
                    name: self.config.platform_name.clone(),
                    version: ctx.non_empty(vars::SYSTEM_VERSION),
                },
                request,
                response,
                errors,
            },
        }
    }

    fn server_info(&self, ctx: &impl HostContext) -> ServerInfo {
        let platform = &self.config.platform_name;
        ServerInfo {
            ip: ctx
                .non_empty(vars::SYSTEM_IP)
                .or_else(|| ctx.non_empty(vars::CLIENT_IP))
                .unwrap_or_else(|| UNKNOWN_IP.to_string()),
            timezone: "UTC".to_string(),
            software: platform.clone(),
            protocol: ctx
                .non_empty(vars::CLIENT_SCHEME)
                .map(|scheme| format!("{}/1.1", scheme.to_uppercase()))
                .unwrap_or_else(|| "HTTP/1.1".to_string()),
            os: OsInfo {
                name: platform.clone(),
                release: None,
                architecture: None,
            },
        }
    }
}

/// The minimal payload emitted when an event cannot be serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackPayload {
    /// Always `Failed to generate payload`
    pub error: String,
    /// The serialization error
    #[serde(rename = "errorMessage")]
    pub error_message: String,
    /// Time of the failure
    pub timestamp: String,
}

impl FallbackPayload {
    /// Describe a serialization failure.
    pub fn new(error_message: impl Into<String>, now: &DateTime<Utc>) -> Self {
        Self {
            error: "Failed to generate payload".to_string(),
            error_message: error_message.into(),
            timestamp: format_timestamp(now),
        }
    }
}

/// Client address: forwarding headers first, then the transport address.
fn client_ip(exchange: &Exchange, ctx: &impl HostContext) -> String {
    let headers = &exchange.request.headers;
    CLIENT_IP_HEADERS
        .iter()
        .filter_map(|name| flatten_header(headers, name))
        .filter_map(|value| {
            let first = value.split(',').next().unwrap_or_default().trim();
            (!first.is_empty()).then(|| first.to_string())
        })
        .next()
        .or_else(|| ctx.non_empty(vars::CLIENT_IP))
        .unwrap_or_else(|| UNKNOWN_IP.to_string())
}

fn request_start(ctx: &impl HostContext) -> Option<DateTime<Utc>> {
    ctx.non_empty(vars::REQUEST_START)
        .and_then(|raw| parse_leading_int(&raw))
        .and_then(from_epoch_millis)
}

fn content_type(headers: &http::HeaderMap) -> Option<String> {
    flatten_header(headers, "content-type")
}
