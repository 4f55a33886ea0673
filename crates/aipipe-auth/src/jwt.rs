// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Compact JWS serialization helpers shared by both token formats.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Header {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

/// A token split into its three segments.
pub(crate) struct Compact<'a> {
    pub header: Header,
    pub payload: &'a str,
    /// `header.payload`, the bytes covered by the signature.
    pub signing_input: &'a str,
    pub signature: Vec<u8>,
}

impl<'a> Compact<'a> {
    pub fn parse(token: &'a str) -> Result<Self, String> {
        let (signing_input, signature) = token
            .rsplit_once('.')
            .ok_or_else(|| "expected three dot-separated segments".to_string())?;
        let (header, payload) = signing_input
            .split_once('.')
            .filter(|(_, payload)| !payload.contains('.'))
            .ok_or_else(|| "expected three dot-separated segments".to_string())?;

        Ok(Self {
            header: decode_json(header)?,
            payload,
            signing_input,
            signature: URL_SAFE_NO_PAD
                .decode(signature)
                .map_err(|e| format!("signature is not base64url: {e}"))?,
        })
    }

    pub fn claims<T: DeserializeOwned>(&self) -> Result<T, String> {
        decode_json(self.payload)
    }
}

pub(crate) fn decode_json<T: DeserializeOwned>(segment: &str) -> Result<T, String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| format!("segment is not base64url: {e}"))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("segment is not valid JSON: {e}"))
}

pub(crate) fn encode_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(value)?))
}

pub(crate) fn encode_bytes(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}
