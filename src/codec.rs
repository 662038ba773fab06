//! Payload codec: raw frame payload → application-level JSON value.
//!
//! Pipeline:
//! 1. Decide whether the payload is compressed. The explicit `compressed:`
//!    field wins; without it a heuristic is applied (long, base64 alphabet,
//!    length multiple of 4). The heuristic can misclassify a long
//!    base64-looking plain string; the fallback parse below covers that case.
//! 2. Base64-decode + gunzip when compressed.
//! 3. Parse JSON and peel up to [`MAX_ENVELOPE_DEPTH`] `{ "data": ... }`
//!    envelope levels.
//! 4. If anything above fails, re-parse the raw payload as plain JSON once
//!    before reporting a [`LinkError::DecodeError`].

use crate::compression::{decompress_base64_gzip, is_base64_charset};
use crate::error::{LinkError, Result};
use crate::models::RawFrame;
use serde_json::Value as JsonValue;

/// Minimum payload length for the compression heuristic to fire.
pub const MIN_HEURISTIC_LEN: usize = 100;

/// Base64 block size; encoded payloads are always a multiple of it.
const BASE64_BLOCK: usize = 4;

/// Maximum number of `{ "data": ... }` wrappers peeled off a payload.
pub const MAX_ENVELOPE_DEPTH: usize = 2;

/// Keys allowed next to `data` for an object to count as an envelope.
const ENVELOPE_METADATA_KEYS: &[&str] = &["id", "event", "timestamp", "compressed"];

/// How a payload was classified before decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionDetection {
    /// The frame carried an explicit `compressed:` field.
    Flagged(bool),
    /// No flag; the heuristic decided.
    Heuristic(bool),
}

impl CompressionDetection {
    pub fn is_compressed(self) -> bool {
        match self {
            CompressionDetection::Flagged(c) | CompressionDetection::Heuristic(c) => c,
        }
    }
}

/// Stateless decoder for frame payloads.
#[derive(Debug, Clone)]
pub struct PayloadCodec {
    heuristic_enabled: bool,
    min_heuristic_len: usize,
}

impl Default for PayloadCodec {
    fn default() -> Self {
        Self {
            heuristic_enabled: true,
            min_heuristic_len: MIN_HEURISTIC_LEN,
        }
    }
}

impl PayloadCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable the length/charset heuristic; only the explicit flag counts.
    pub fn with_heuristic(mut self, enabled: bool) -> Self {
        self.heuristic_enabled = enabled;
        self
    }

    pub fn with_min_heuristic_len(mut self, len: usize) -> Self {
        self.min_heuristic_len = len;
        self
    }

    /// Classify a payload as compressed or plain.
    pub fn detect(&self, explicit_flag: Option<bool>, payload: &str) -> CompressionDetection {
        if let Some(flag) = explicit_flag {
            return CompressionDetection::Flagged(flag);
        }
        if !self.heuristic_enabled {
            return CompressionDetection::Heuristic(false);
        }
        let trimmed = payload.trim();
        let looks_compressed = trimmed.len() >= self.min_heuristic_len
            && trimmed.len() % BASE64_BLOCK == 0
            && is_base64_charset(trimmed);
        CompressionDetection::Heuristic(looks_compressed)
    }

    /// Decode a frame's payload.
    pub fn decode_frame(&self, frame: &RawFrame) -> Result<JsonValue> {
        self.decode(frame.compressed, &frame.data)
    }

    /// Decode a payload with an optional explicit compression flag.
    pub fn decode(&self, explicit_flag: Option<bool>, payload: &str) -> Result<JsonValue> {
        let detection = self.detect(explicit_flag, payload);

        match self.decode_primary(detection, payload) {
            Ok(value) => Ok(value),
            Err(primary_err) => {
                log::debug!(
                    "[skyclust-link] Primary decode failed ({:?}): {}; trying plain parse",
                    detection,
                    primary_err
                );
                match serde_json::from_str::<JsonValue>(payload) {
                    Ok(value) => Ok(unwrap_envelopes(value)),
                    Err(fallback_err) => Err(LinkError::DecodeError(format!(
                        "{} (fallback parse: {})",
                        primary_err, fallback_err
                    ))),
                }
            },
        }
    }

    fn decode_primary(&self, detection: CompressionDetection, payload: &str) -> Result<JsonValue> {
        let value = if detection.is_compressed() {
            let bytes = decompress_base64_gzip(payload)
                .map_err(|e| LinkError::DecodeError(format!("Failed to decompress payload: {}", e)))?;
            serde_json::from_slice::<JsonValue>(&bytes)
                .map_err(|e| LinkError::DecodeError(format!("Invalid JSON after decompression: {}", e)))?
        } else {
            serde_json::from_str::<JsonValue>(payload)
                .map_err(|e| LinkError::DecodeError(format!("Invalid JSON payload: {}", e)))?
        };
        Ok(unwrap_envelopes(value))
    }
}

fn is_envelope(value: &JsonValue) -> bool {
    match value {
        JsonValue::Object(map) => {
            map.contains_key("data")
                && map
                    .keys()
                    .all(|k| k == "data" || ENVELOPE_METADATA_KEYS.contains(&k.as_str()))
        },
        _ => false,
    }
}

/// Peel `{ "data": ... }` wrappers, at most [`MAX_ENVELOPE_DEPTH`] levels.
pub fn unwrap_envelopes(mut value: JsonValue) -> JsonValue {
    for _ in 0..MAX_ENVELOPE_DEPTH {
        if !is_envelope(&value) {
            break;
        }
        value = match value {
            JsonValue::Object(mut map) => map.remove("data").unwrap_or(JsonValue::Null),
            other => other,
        };
    }
    value
}
