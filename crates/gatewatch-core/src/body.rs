//! Request/response body decoding.
//!
//! Raw bodies are never embedded in an event. JSON bodies under the size
//! ceiling are parsed and masked; oversized bodies are replaced by a
//! descriptor carrying only size metadata; everything else becomes `{}`.

use crate::exchange::RawBody;
use crate::redact::{mask_in_place, SensitiveKeys};
use serde::Serialize;
use serde_json::{Map, Value};

/// Default body ceiling: 2 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// Descriptor substituted for a body above the ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OversizedBody {
    /// Human readable explanation
    pub message: String,
    /// Size of the original content
    pub original_size: usize,
    /// Configured ceiling
    pub limit_size: usize,
    /// Content type of the original content, `unknown` when absent
    pub content_type: String,
}

impl OversizedBody {
    fn new(original_size: usize, limit_size: usize, content_type: Option<&str>) -> Self {
        Self {
            message: format!(
                "Payload exceeds {} limit and has been truncated",
                human_size(limit_size)
            ),
            original_size,
            limit_size,
            content_type: content_type
                .filter(|ct| !ct.is_empty())
                .unwrap_or("unknown")
                .to_string(),
        }
    }
}

/// Result of decoding a body.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    /// Parsed and masked JSON content
    Structured(Value),
    /// Content above the ceiling
    Oversized(OversizedBody),
    /// JSON content that failed to parse
    Unparsable,
    /// No content, non-JSON content, or body logging disabled
    Empty,
}

impl ParsedBody {
    /// Convert into the value embedded in the event.
    ///
    /// Unparsable and empty bodies both become `{}`.
    pub fn into_value(self) -> Value {
        match self {
            ParsedBody::Structured(value) => value,
            ParsedBody::Oversized(descriptor) => {
                serde_json::to_value(descriptor).unwrap_or_else(|_| empty_object())
            }
            ParsedBody::Unparsable | ParsedBody::Empty => empty_object(),
        }
    }
}

/// Body decoder configured once at startup.
#[derive(Debug, Clone)]
pub struct BodyCodec {
    keys: SensitiveKeys,
    max_size: usize,
    log_body: bool,
}

impl BodyCodec {
    /// Create a codec.
    pub fn new(keys: SensitiveKeys, max_size: usize, log_body: bool) -> Self {
        Self {
            keys,
            max_size,
            log_body,
        }
    }

    /// Decode a body given its `Content-Type` header value.
    pub fn decode(&self, content: Option<&RawBody>, content_type: Option<&str>) -> ParsedBody {
        let Some(content) = content.filter(|c| !c.is_empty()) else {
            return ParsedBody::Empty;
        };

        let size = content.size();
        if size > self.max_size {
            tracing::debug!(size, limit = self.max_size, "Body exceeds size ceiling");
            return ParsedBody::Oversized(OversizedBody::new(size, self.max_size, content_type));
        }

        if !self.log_body || !is_json(content_type) {
            return ParsedBody::Empty;
        }

        let mut value = match content {
            RawBody::Structured(value) => value.clone(),
            RawBody::Bytes(bytes) => match serde_json::from_slice::<Value>(bytes) {
                Ok(value) => value,
                Err(e) => {
                    tracing::debug!(error = %e, "Body is not valid JSON");
                    return ParsedBody::Unparsable;
                }
            },
        };
        mask_in_place(&mut value, &self.keys);
        ParsedBody::Structured(value)
    }
}

impl Default for BodyCodec {
    fn default() -> Self {
        Self::new(SensitiveKeys::default(), DEFAULT_MAX_BODY_SIZE, true)
    }
}

/// Whether a content type denotes JSON (`application/json`,
/// `application/problem+json`, ...).
pub fn is_json(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("json"))
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Render a byte count the way the oversized message shows it.
fn human_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;
    if bytes >= MB && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else if bytes >= KB && bytes % KB == 0 {
        format!("{}KB", bytes / KB)
    } else {
        format!("{} bytes", bytes)
    }
}
