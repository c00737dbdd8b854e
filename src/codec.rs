//! Serialization and compression seams.
//!
//! Cached payloads are self-describing JSON by default. Policies may carry a
//! custom [`Codec`] for key families with different wire needs, and may opt
//! into compression through the pluggable [`Compressor`] seam (the default
//! implementation is a passthrough; a real codec can be substituted without
//! touching call sites).

use bytes::Bytes;
use thiserror::Error;

/// Failure inside a codec or compressor. The strategy engine attaches the
/// affected key before surfacing it.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct CodecError(pub String);

/// Converts between structured values and cached payload bytes.
pub trait Codec: Send + Sync {
    fn name(&self) -> &'static str;
    fn encode(&self, value: &serde_json::Value) -> Result<Bytes, CodecError>;
    fn decode(&self, raw: &[u8]) -> Result<serde_json::Value, CodecError>;
}

/// Default codec: compact JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, value: &serde_json::Value) -> Result<Bytes, CodecError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|err| CodecError(err.to_string()))
    }

    fn decode(&self, raw: &[u8]) -> Result<serde_json::Value, CodecError> {
        serde_json::from_slice(raw).map_err(|err| CodecError(err.to_string()))
    }
}

/// Optional payload compression applied after encoding.
pub trait Compressor: Send + Sync {
    fn name(&self) -> &'static str;
    fn compress(&self, raw: Bytes) -> Result<Bytes, CodecError>;
    fn decompress(&self, raw: Bytes) -> Result<Bytes, CodecError>;
}

/// Default compressor: passthrough.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn compress(&self, raw: Bytes) -> Result<Bytes, CodecError> {
        Ok(raw)
    }

    fn decompress(&self, raw: Bytes) -> Result<Bytes, CodecError> {
        Ok(raw)
    }
}
