// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `{"type", "data"}` frame envelope.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from frame encoding and decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode {kind} frame: {source}")]
    Encode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A decoded frame: the type string plus its still-untyped payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
}

impl Envelope {
    /// Decode the payload into a concrete frame type.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        serde_json::from_value(self.data.clone())
            .map_err(|source| ProtocolError::Payload { kind: self.kind.clone(), source })
    }
}

/// Decode a text frame into its envelope.
pub fn decode(text: &str) -> Result<Envelope, ProtocolError> {
    serde_json::from_str(text).map_err(ProtocolError::Malformed)
}

/// Encode a payload under the given frame type.
pub(crate) fn encode_frame<T: Serialize>(kind: &str, payload: &T) -> Result<String, ProtocolError> {
    let data = serde_json::to_value(payload)
        .map_err(|source| ProtocolError::Encode { kind: kind.to_string(), source })?;
    let envelope = Envelope { kind: kind.to_string(), data };
    serde_json::to_string(&envelope)
        .map_err(|source| ProtocolError::Encode { kind: kind.to_string(), source })
}
