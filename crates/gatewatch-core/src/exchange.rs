//! Observed request/response data handed over by the host pipeline.
//!
//! These types are read-only inputs: the core never mutates them and derives
//! every output value from copies.

use bytes::Bytes;
use http::HeaderMap;
use serde_json::{Map, Value};

/// Body content as observed by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum RawBody {
    /// Raw content bytes
    Bytes(Bytes),
    /// Content the host already holds in structured form
    Structured(Value),
}

impl RawBody {
    /// Whether there is anything to decode.
    ///
    /// Empty byte strings and JSON `null` count as no content.
    pub fn is_empty(&self) -> bool {
        match self {
            RawBody::Bytes(bytes) => bytes.is_empty(),
            RawBody::Structured(value) => value.is_null(),
        }
    }

    /// Size used for the payload ceiling.
    ///
    /// Raw content is measured in bytes, structured content by the length of
    /// its compact JSON text.
    pub fn size(&self) -> usize {
        match self {
            RawBody::Bytes(bytes) => bytes.len(),
            RawBody::Structured(value) => value.to_string().len(),
        }
    }
}

impl From<&'static str> for RawBody {
    fn from(text: &'static str) -> Self {
        RawBody::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

impl From<String> for RawBody {
    fn from(text: String) -> Self {
        RawBody::Bytes(Bytes::from(text))
    }
}

impl From<Vec<u8>> for RawBody {
    fn from(bytes: Vec<u8>) -> Self {
        RawBody::Bytes(Bytes::from(bytes))
    }
}

impl From<Bytes> for RawBody {
    fn from(bytes: Bytes) -> Self {
        RawBody::Bytes(bytes)
    }
}

impl From<Value> for RawBody {
    fn from(value: Value) -> Self {
        RawBody::Structured(value)
    }
}

/// The inbound request.
#[derive(Debug, Clone, Default)]
pub struct ObservedRequest {
    /// HTTP method as reported by the host
    pub method: Option<String>,
    /// Full request URL including the query string
    pub url: Option<String>,
    /// Route path relative to the proxy base path
    pub path: Option<String>,
    /// Request headers
    pub headers: HeaderMap,
    /// Request body
    pub body: Option<RawBody>,
}

impl ObservedRequest {
    /// Create a request with a method and URL.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Set the route path used for endpoint filtering.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Replace the header map.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the request body.
    pub fn with_body(mut self, body: impl Into<RawBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Upper-cased method, `GET` when the host did not report one.
    pub fn method_or_default(&self) -> String {
        self.method
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_uppercase)
            .unwrap_or_else(|| "GET".to_string())
    }

    /// Parse query parameters from the URL.
    ///
    /// Only `key=value` pairs with a single `=` are kept. Keys and values are
    /// percent-decoded; a pair that fails to decode is kept as-is.
    pub fn query_params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        let Some(query) = self.url.as_deref().and_then(|url| url.split('?').nth(1)) else {
            return params;
        };
        for pair in query.split('&') {
            let mut parts = pair.split('=');
            let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
                continue;
            };
            match (urlencoding::decode(key), urlencoding::decode(value)) {
                (Ok(k), Ok(v)) => {
                    params.insert(k.into_owned(), Value::String(v.into_owned()));
                }
                _ => {
                    params.insert(key.to_string(), Value::String(value.to_string()));
                }
            }
        }
        params
    }
}

/// The outbound response.
#[derive(Debug, Clone, Default)]
pub struct ObservedResponse {
    /// Status code, when the host reported one
    pub status: Option<u16>,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Option<RawBody>,
}

impl ObservedResponse {
    /// Create a response with a status code.
    pub fn new(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Replace the header map.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the response body.
    pub fn with_body(mut self, body: impl Into<RawBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Reported size: the `Content-Length` header when usable, else the body
    /// length.
    pub fn size(&self) -> u64 {
        flatten_header(&self.headers, "content-length")
            .and_then(|len| parse_leading_int(&len))
            .map(|len| len.max(0) as u64)
            .unwrap_or_else(|| self.body.as_ref().map_or(0, |b| b.size() as u64))
    }
}

/// One request/response pair observed by the gateway.
#[derive(Debug, Clone, Default)]
pub struct Exchange {
    /// The inbound request
    pub request: ObservedRequest,
    /// The outbound response
    pub response: ObservedResponse,
}

impl Exchange {
    /// Pair a request with its response.
    pub fn new(request: ObservedRequest, response: ObservedResponse) -> Self {
        Self { request, response }
    }
}

/// Read a header as a single string, joining repeated values with `,`.
///
/// Returns `None` when the header is absent. Bytes that are not valid UTF-8
/// are replaced rather than dropped.
pub fn flatten_header(headers: &HeaderMap, name: &str) -> Option<String> {
    let mut values = headers.get_all(name).iter().peekable();
    values.peek()?;
    let joined = values
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .collect::<Vec<_>>()
        .join(",");
    Some(joined)
}

/// Parse the leading integer of a string, like a lenient `parseInt`.
///
/// `"42"`, `" 42ms"` and `"-7.5"` parse as 42, 42 and -7; strings without a
/// leading number yield `None`.
pub fn parse_leading_int(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let digits_start = usize::from(trimmed.starts_with(['-', '+']));
    let digits = trimmed[digits_start..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return None;
    }
    trimmed[..digits_start + digits].parse().ok()
}
