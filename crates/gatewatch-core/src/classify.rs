//! Error classification.
//!
//! Turns gateway fault state or an HTTP error status into the collector's
//! error record format. Fault state always wins; at most one record is
//! produced per exchange.

use crate::context::FaultState;
use crate::exchange::parse_leading_int;
use serde::Serialize;
use serde_json::Value;

/// `file` value for faults without a category.
pub const POLICY_FILE: &str = "apigee-policy";
/// `file` value for HTTP-status-derived errors.
pub const HTTP_RESPONSE_FILE: &str = "http-response";
/// `type` value for HTTP-status-derived errors.
pub const HTTP_ERROR_TYPE: &str = "API Request failure";
/// Message used when a fault carries no text at all.
pub const FAULT_FALLBACK_MESSAGE: &str = "An Apigee policy error occurred";

/// Longest message taken from a textual response body, in characters.
const MAX_TEXT_MESSAGE: usize = 200;

/// Fault-name fragments that mark a fault as an exception.
const EXCEPTION_MARKERS: &[&str] = &["Exception", "Timeout", "Connection"];

/// Where an error originated, as understood by the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorSource {
    /// Regular error
    #[serde(rename = "onError")]
    OnError,
    /// Exception-like failure (timeouts, connection problems)
    #[serde(rename = "onException")]
    OnException,
    /// Failure during shutdown
    #[serde(rename = "onShutdown")]
    OnShutdown,
}

/// One entry of the event's `errors` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    /// Origin of the error
    pub source: ErrorSource,
    /// Error type
    #[serde(rename = "type")]
    pub error_type: String,
    /// Human readable message
    pub message: String,
    /// Location hint
    pub file: String,
    /// Numeric location hint
    pub line: i64,
}

/// Classify the exchange's error state.
pub fn classify(fault: &FaultState, response_body: &Value, status: u16) -> Vec<ErrorRecord> {
    if let Some(record) = from_fault(fault) {
        return vec![record];
    }
    if status >= 400 {
        return vec![from_status(response_body, status)];
    }
    Vec::new()
}

fn from_fault(fault: &FaultState) -> Option<ErrorRecord> {
    let name = fault.name.as_deref().filter(|n| !n.is_empty())?;

    let message = [&fault.error_message, &fault.error_content, &fault.reason]
        .into_iter()
        .flatten()
        .find(|m| !m.is_empty())
        .cloned()
        .unwrap_or_else(|| FAULT_FALLBACK_MESSAGE.to_string());

    let source = if EXCEPTION_MARKERS.iter().any(|m| name.contains(m)) {
        ErrorSource::OnException
    } else {
        ErrorSource::OnError
    };

    let file = match (&fault.category, &fault.subcategory) {
        (Some(category), Some(sub)) if !category.is_empty() && !sub.is_empty() => {
            format!("{}.{}", category, sub)
        }
        (Some(category), _) if !category.is_empty() => category.clone(),
        _ => POLICY_FILE.to_string(),
    };

    let line = fault
        .error_state
        .as_deref()
        .and_then(parse_leading_int)
        .unwrap_or(0);

    Some(ErrorRecord {
        source,
        error_type: name.to_string(),
        message,
        file,
        line,
    })
}

fn from_status(body: &Value, status: u16) -> ErrorRecord {
    let message = match body {
        Value::Object(map) => ["message", "error"]
            .into_iter()
            .find_map(|field| map.get(field).and_then(message_text)),
        Value::String(text) if !text.is_empty() => {
            Some(text.chars().take(MAX_TEXT_MESSAGE).collect())
        }
        _ => None,
    }
    .unwrap_or_else(|| format!("HTTP Error {}", status));

    ErrorRecord {
        source: ErrorSource::OnError,
        error_type: HTTP_ERROR_TYPE.to_string(),
        message,
        file: HTTP_RESPONSE_FILE.to_string(),
        line: 0,
    }
}

/// Text of a body field, `None` for falsy values (null, false, 0, "").
fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
