//! Error types for Folio Metrics

use thiserror::Error;

/// Structural failures raised by the bit packer and the sectioned blob codec.
///
/// These always indicate a caller bug or corrupt stored data and are never
/// silently absorbed by the codec itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Invalid bit width {0}: must be between 1 and 32")]
    InvalidWidth(u8),

    #[error("Value {value} does not fit in {bits} bits")]
    ValueOverflow { value: u32, bits: u8 },

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid blob format: {0}")]
    InvalidFormat(String),

    #[error("Truncated input: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Section {id} range {offset}..{end} exceeds blob length {len}")]
    OutOfBounds {
        id: u8,
        offset: usize,
        end: usize,
        len: usize,
    },

    #[error("Section {0} not found")]
    NotFound(u8),

    #[error("Checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
}

/// Errors that can occur in the engagement pipeline and its JSON entry points
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
