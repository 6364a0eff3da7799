//! Marker-driven tokenizer.
//!
//! A token is the run of content bytes up to the next structural marker,
//! paired with that marker (the token's *delimiter*). Changed/unchanged
//! markers inside a run are dropped.

use crate::buffer::ByteCursor;
use crate::error::MarshalError;
use crate::marker::Marker;
use crate::text::decode_utf8;

/// Splits a byte stream into `(text, delimiter)` tokens.
#[derive(Debug)]
pub struct Tokenizer {
    cursor: ByteCursor,
    delimiter: Option<Marker>,
}

impl Tokenizer {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            cursor: ByteCursor::from_bytes(data),
            delimiter: None,
        }
    }

    /// Delimiter of the most recent token, `None` before the first read.
    pub fn delimiter(&self) -> Option<Marker> {
        self.delimiter
    }

    pub fn is_eof(&self) -> bool {
        self.cursor.is_eof()
    }

    /// Raw access for counted reads between tokens.
    pub fn cursor_mut(&mut self) -> &mut ByteCursor {
        &mut self.cursor
    }

    pub fn peek_byte(&self) -> Option<u8> {
        self.cursor.peek_u8()
    }

    /// Reads the next token and records its delimiter.
    ///
    /// Running out of bytes before a delimiter is an error.
    pub fn next_token(&mut self) -> Result<String, MarshalError> {
        let mut content = Vec::new();
        loop {
            let byte = self.cursor.get_u8()?;
            match Marker::from_byte(byte) {
                Some(marker) if marker.ends_token() => {
                    self.delimiter = Some(marker);
                    return Ok(decode_utf8(&content));
                }
                Some(marker) if marker.is_skipped() => {}
                _ => content.push(byte),
            }
        }
    }

    /// Advances past the current delimiter if it is `expected`.
    pub fn match_delimiter(&mut self, expected: Marker) -> Result<String, MarshalError> {
        self.check_delimiter(expected)?;
        self.next_token()
    }

    /// Fails unless the current delimiter is `expected`; never advances.
    pub fn check_delimiter(&self, expected: Marker) -> Result<(), MarshalError> {
        if self.delimiter == Some(expected) {
            Ok(())
        } else {
            Err(MarshalError::UnexpectedDelimiter {
                expected,
                found: self.delimiter,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(parts: &[&[u8]]) -> Vec<u8> {
        parts.concat()
    }

    #[test]
    fn test_token_sequence() {
        let data = stream(&[&[0x1B, 0x18], b"NAME", &[0x17], b"LPA", &[0x15], b"x", &[0x1A]]);
        let mut tokens = Tokenizer::new(data);

        assert_eq!(tokens.next_token().unwrap(), "");
        assert_eq!(tokens.delimiter(), Some(Marker::BeginBuffer));
        assert_eq!(tokens.next_token().unwrap(), "");
        assert_eq!(tokens.delimiter(), Some(Marker::Name));
        assert_eq!(tokens.next_token().unwrap(), "NAME");
        assert_eq!(tokens.delimiter(), Some(Marker::Type));
        assert_eq!(tokens.next_token().unwrap(), "LPA");
        assert_eq!(tokens.delimiter(), Some(Marker::Value));
        assert_eq!(tokens.next_token().unwrap(), "x");
        assert_eq!(tokens.delimiter(), Some(Marker::EndBuffer));
        assert!(tokens.is_eof());
        assert!(tokens.next_token().is_err());
    }

    #[test]
    fn test_changed_markers_skipped() {
        let data = stream(&[b"ab", &[0x10], b"c", &[0x0F, 0x15]]);
        let mut tokens = Tokenizer::new(data);
        assert_eq!(tokens.next_token().unwrap(), "abc");
        assert_eq!(tokens.delimiter(), Some(Marker::Value));
    }

    #[test]
    fn test_head_and_control_bytes_are_content() {
        let data = stream(&[&[0x19], b"lbl", &[0x01, 0x1B]]);
        let mut tokens = Tokenizer::new(data);
        assert_eq!(tokens.next_token().unwrap(), "\u{19}lbl\u{1}");
        assert_eq!(tokens.delimiter(), Some(Marker::BeginBuffer));
    }

    #[test]
    fn test_match_and_check() {
        let mut tokens = Tokenizer::new(vec![0x1B, 0x15, b'v', 0x1A]);
        assert!(tokens.check_delimiter(Marker::BeginBuffer).is_err());

        tokens.next_token().unwrap();
        tokens.check_delimiter(Marker::BeginBuffer).unwrap();
        // check never advances
        assert_eq!(tokens.delimiter(), Some(Marker::BeginBuffer));

        let err = tokens.match_delimiter(Marker::EndBuffer).unwrap_err();
        assert!(matches!(
            err,
            MarshalError::UnexpectedDelimiter {
                expected: Marker::EndBuffer,
                found: Some(Marker::BeginBuffer)
            }
        ));
        // failed match leaves the tokenizer in place
        assert_eq!(tokens.match_delimiter(Marker::BeginBuffer).unwrap(), "");
        assert_eq!(tokens.delimiter(), Some(Marker::Value));
        assert_eq!(tokens.match_delimiter(Marker::Value).unwrap(), "v");
        assert_eq!(tokens.delimiter(), Some(Marker::EndBuffer));
    }
}
