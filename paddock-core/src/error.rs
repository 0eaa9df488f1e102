//! Error types for record decoding

use thiserror::Error;

/// Errors that can occur when decoding telemetry records
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Not enough bytes left to populate the record
    #[error("Record too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    /// Record type tag is outside the known type table
    #[error("Unknown record type: {0}")]
    UnknownRecordType(u8),

    /// Record type is known but has no decoder
    #[error("Record type {0} is not decoded")]
    NotDecoded(&'static str),

    /// Event sub-record code not recognized
    #[error("Unknown event code: {0:?}")]
    UnknownEventCode([u8; 4]),

    /// Failed to deserialize or serialize a fixed layout
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),
}

impl From<bincode::Error> for ParseError {
    fn from(e: bincode::Error) -> Self {
        ParseError::DeserializationFailed(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;
