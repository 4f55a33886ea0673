// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request types passed between the gateway and the adapters.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::{Map, Value};

/// An inbound request with the provider segment already stripped.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Upstream path including the leading `/` and any query string,
    /// e.g. `/v1/chat/completions?x=1`.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A fully shaped request ready to send upstream.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    /// `None` for methods that carry no body.
    pub body: Option<Bytes>,
}

/// Whether the body of a request with this method is forwarded.
pub fn carries_body(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD)
}

/// For streamed chat completions, ask the upstream to append a usage record
/// to the event stream. Returns whether the body was changed.
pub fn request_stream_usage(body: &mut Value, path: &str) -> bool {
    if !path.contains("chat/completions") || !is_truthy(body.get("stream")) {
        return false;
    }
    let Some(object) = body.as_object_mut() else {
        return false;
    };
    let options = object
        .entry("stream_options")
        .or_insert_with(|| Value::Object(Map::new()));
    if !options.is_object() {
        *options = Value::Object(Map::new());
    }
    if let Some(options) = options.as_object_mut() {
        options.insert("include_usage".into(), Value::Bool(true));
    }
    true
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}
