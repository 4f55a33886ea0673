// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Header forwarding rules.

use aipipe_core::AipipeError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};

/// Request headers never forwarded upstream. `cf-*` is matched as a prefix.
const SKIP_REQUEST: &[&str] = &[
    "content-length",
    "host",
    "connection",
    "accept-encoding",
    "authorization",
];

/// Response headers never copied back to the caller.
const SKIP_RESPONSE: &[&str] = &["transfer-encoding", "connection", "content-length"];

fn skip_request(name: &HeaderName) -> bool {
    let name = name.as_str();
    SKIP_REQUEST.contains(&name) || name.starts_with("cf-")
}

/// Copy the caller's headers minus hop-by-hop, platform and credential
/// headers, then inject `Authorization: Bearer <api_key>`.
pub fn upstream_request_headers(inbound: &HeaderMap, api_key: &str) -> Result<HeaderMap, AipipeError> {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 1);
    for (name, value) in inbound {
        if !skip_request(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    let mut bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|e| AipipeError::Config(format!("invalid provider API key: {e}")))?;
    bearer.set_sensitive(true);
    headers.insert(AUTHORIZATION, bearer);
    Ok(headers)
}

/// Copy upstream response headers except those describing the upstream connection.
///
/// `content-length` is dropped as well; the server recomputes it for buffered
/// bodies and streams chunked otherwise.
pub fn downstream_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if !SKIP_RESPONSE.contains(&name.as_str()) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (k, v) in pairs {
            headers.append(*k, HeaderValue::from_static(*v));
        }
        headers
    }

    #[test]
    fn strips_platform_and_hop_headers_and_replaces_credential() {
        let inbound = map(&[
            ("authorization", "Bearer caller-token"),
            ("content-type", "application/json"),
            ("content-length", "42"),
            ("host", "aipipe.example"),
            ("cf-connecting-ip", "1.2.3.4"),
            ("cf-ray", "abc"),
            ("connection", "keep-alive"),
            ("accept-encoding", "gzip"),
            ("x-custom", "kept"),
        ]);
        let out = upstream_request_headers(&inbound, "sk-upstream").unwrap();
        assert_eq!(out.get("authorization").unwrap(), "Bearer sk-upstream");
        assert_eq!(out.get("content-type").unwrap(), "application/json");
        assert_eq!(out.get("x-custom").unwrap(), "kept");
        for gone in ["content-length", "host", "cf-connecting-ip", "cf-ray", "connection", "accept-encoding"] {
            assert!(out.get(gone).is_none(), "{gone} should be stripped");
        }
        assert_eq!(out.get_all("authorization").iter().count(), 1);
    }

    #[test]
    fn response_drops_transfer_encoding_and_connection() {
        let upstream = map(&[
            ("transfer-encoding", "chunked"),
            ("connection", "close"),
            ("content-type", "text/event-stream"),
            ("x-request-id", "r1"),
        ]);
        let out = downstream_response_headers(&upstream);
        assert!(out.get("transfer-encoding").is_none());
        assert!(out.get("connection").is_none());
        assert_eq!(out.get("content-type").unwrap(), "text/event-stream");
        assert_eq!(out.get("x-request-id").unwrap(), "r1");
    }
}
