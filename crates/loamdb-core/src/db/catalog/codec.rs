use crate::{db::catalog::CatalogEntry, error::EngineError};
use serde::{Deserialize, Serialize};
use std::panic::{AssertUnwindSafe, catch_unwind};
use thiserror::Error as ThisError;
use xxhash_rust::xxh3::xxh3_64;

const CHECKSUM_LEN: usize = 8;
const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

///
/// CodecError
///

#[derive(Debug, ThisError)]
pub enum CodecError {
    #[error("catalog frame encode failed: {0}")]
    Encode(String),

    #[error("catalog frame is truncated")]
    Truncated,

    #[error("catalog frame exceeds maximum allowed size")]
    TooLarge,

    #[error("catalog frame checksum mismatch")]
    ChecksumMismatch,

    #[error("catalog frame decode failed: {0}")]
    Decode(String),
}

impl From<CodecError> for EngineError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Encode(_) => Self::serialize_internal(err.to_string()),
            _ => Self::catalog_corruption(err.to_string()),
        }
    }
}

///
/// CatalogFrame
///
/// On-disk shape of one persisted catalog snapshot. The checksum witnesses
/// the CBOR payload, not the descriptor semantics.
///

#[derive(Debug, Deserialize, Serialize)]
struct CatalogFrame {
    #[serde(with = "serde_bytes")]
    checksum: Vec<u8>,
    #[serde(with = "serde_bytes")]
    payload: Vec<u8>,
}

/// Encode the full catalog entry set into a checksummed frame.
pub(super) fn encode(entries: &[CatalogEntry]) -> Result<Vec<u8>, CodecError> {
    let payload =
        serde_cbor::to_vec(&entries).map_err(|err| CodecError::Encode(err.to_string()))?;

    let frame = CatalogFrame {
        checksum: xxh3_64(&payload).to_be_bytes().to_vec(),
        payload,
    };

    serde_cbor::to_vec(&frame).map_err(|err| CodecError::Encode(err.to_string()))
}

/// Decode a frame produced by [`encode`], verifying the checksum first.
///
/// Any panic during CBOR decode is caught and reported as a decode error;
/// no panic escapes this function.
pub(super) fn decode(bytes: &[u8]) -> Result<Vec<CatalogEntry>, CodecError> {
    if bytes.len() > MAX_FRAME_BYTES {
        return Err(CodecError::TooLarge);
    }

    let frame: CatalogFrame = decode_cbor(bytes)?;

    if frame.checksum.len() != CHECKSUM_LEN {
        return Err(CodecError::Truncated);
    }
    if frame.checksum != xxh3_64(&frame.payload).to_be_bytes() {
        return Err(CodecError::ChecksumMismatch);
    }

    decode_cbor(&frame.payload)
}

fn decode_cbor<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    let result = catch_unwind(AssertUnwindSafe(|| serde_cbor::from_slice(bytes)));

    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(CodecError::Decode(err.to_string())),
        Err(_) => Err(CodecError::Decode("panic during CBOR decode".into())),
    }
}

///
/// TESTS
///
