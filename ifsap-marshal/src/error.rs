//! Codec error types.

use crate::marker::Marker;
use thiserror::Error;

/// Errors raised while encoding or decoding a marshalled tree.
#[derive(Debug, Error)]
pub enum MarshalError {
    #[error("read past end of buffer: offset {offset}, need {needed} bytes, have {available}")]
    OutOfRange {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("seek to {0} is outside the buffer")]
    InvalidSeek(i64),

    #[error("unexpected delimiter: expected {expected:?}, got {}", describe(.found))]
    UnexpectedDelimiter {
        expected: Marker,
        found: Option<Marker>,
    },

    #[error("buffer node '{0}' does not hold a node list")]
    NotAList(String),

    #[error("binary length {0} does not fit a 4-byte prefix")]
    BinaryTooLarge(usize),

    #[error("unsupported attribute type: {0}")]
    UnsupportedType(String),

    #[error("'{name}' holds marker byte {byte:#04x} outside counted text; use an LPA or LPT value")]
    MarkerInText { name: String, byte: u8 },

    #[error("invalid {type_tag} value: {value:?}")]
    InvalidValue { type_tag: String, value: String },
}

fn describe(found: &Option<Marker>) -> String {
    match found {
        Some(marker) => format!("{:?}", marker),
        None => "nothing".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MarshalError::UnexpectedDelimiter {
            expected: Marker::EndBuffer,
            found: Some(Marker::Value),
        };
        assert_eq!(
            err.to_string(),
            "unexpected delimiter: expected EndBuffer, got Value"
        );

        let err = MarshalError::UnexpectedDelimiter {
            expected: Marker::BeginBuffer,
            found: None,
        };
        assert_eq!(
            err.to_string(),
            "unexpected delimiter: expected BeginBuffer, got nothing"
        );

        let err = MarshalError::UnsupportedType("XYZ".into());
        assert_eq!(err.to_string(), "unsupported attribute type: XYZ");
    }
}
