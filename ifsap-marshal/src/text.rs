//! Text codecs: lenient UTF-8 decoding and line-wrapped Base64.
//!
//! Encoding text needs nothing beyond `str::as_bytes`; the legacy decoder
//! accepts the historical 5- and 6-byte forms the gateway may still emit.

use crate::error::MarshalError;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;

/// Base64 output line length.
pub const BASE64_LINE: usize = 76;

/// Input bytes per Base64 output line.
const BASE64_LINE_INPUT: usize = BASE64_LINE / 4 * 3;

const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decodes a UTF-8 byte run, accepting legacy sequences of up to 6 bytes.
///
/// A lead byte whose sequence would run past the end of the input is taken
/// as a code point on its own. Code points that are not Unicode scalar
/// values become U+FFFD.
pub fn decode_utf8(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut idx = 0;

    while idx < bytes.len() {
        let lead = bytes[idx];
        let remaining = bytes.len() - idx - 1;
        let (extra, init) = match lead {
            0xFC..=0xFD if remaining >= 5 => (5, u32::from(lead & 0x01)),
            0xF8..=0xFB if remaining >= 4 => (4, u32::from(lead & 0x03)),
            0xF0..=0xF7 if remaining >= 3 => (3, u32::from(lead & 0x07)),
            0xE0..=0xEF if remaining >= 2 => (2, u32::from(lead & 0x0F)),
            0xC0..=0xDF if remaining >= 1 => (1, u32::from(lead & 0x1F)),
            _ => (0, u32::from(lead)),
        };

        let mut code_point = init;
        for &cont in &bytes[idx + 1..idx + 1 + extra] {
            code_point = (code_point << 6) | u32::from(cont & 0x3F);
        }
        out.push(char::from_u32(code_point).unwrap_or(char::REPLACEMENT_CHARACTER));
        idx += 1 + extra;
    }

    out
}

/// Encodes bytes as Base64, breaking lines with CRLF every 76 characters.
///
/// No trailing line break is written.
pub fn encode_base64(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4 + bytes.len() / 28);
    for (i, chunk) in bytes.chunks(BASE64_LINE_INPUT).enumerate() {
        if i > 0 {
            out.push_str("\r\n");
        }
        STANDARD.encode_string(chunk, &mut out);
    }
    out
}

/// Encodes text as Base64 over its UTF-8 bytes.
pub fn encode_base64_str(text: &str) -> String {
    encode_base64(text.as_bytes())
}

/// Decodes Base64, ignoring every character outside the alphabet.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, MarshalError> {
    let mut clean: Vec<u8> = text
        .bytes()
        .filter(|b| b.is_ascii_alphanumeric() || *b == b'+' || *b == b'/')
        .collect();
    // a lone trailing sextet cannot complete a byte
    if clean.len() % 4 == 1 {
        clean.pop();
    }
    LENIENT
        .decode(&clean)
        .map_err(|e| MarshalError::InvalidValue {
            type_tag: "R.B64".to_string(),
            value: e.to_string(),
        })
}

/// Decodes Base64 text that carries UTF-8.
pub fn decode_base64_str(text: &str) -> Result<String, MarshalError> {
    Ok(decode_utf8(&decode_base64(text)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_base64_vectors() {
        assert_eq!(
            encode_base64(b"This is test array"),
            "VGhpcyBpcyB0ZXN0IGFycmF5"
        );
        assert_eq!(
            encode_base64_str("This is test string"),
            "VGhpcyBpcyB0ZXN0IHN0cmluZw=="
        );
        assert_eq!(
            decode_base64("VGhpcyBpcyB0ZXN0IGFycmF5").unwrap(),
            b"This is test array"
        );
        assert_eq!(
            decode_base64_str("VGhpcyBpcyB0ZXN0IHN0cmluZw==").unwrap(),
            "This is test string"
        );
    }

    #[test]
    fn test_base64_line_breaks() {
        let data = vec![0xA5u8; 120];
        let encoded = encode_base64(&data);
        let lines: Vec<&str> = encoded.split("\r\n").collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), BASE64_LINE);
        assert_eq!(lines[1].len(), BASE64_LINE);
        assert_eq!(lines[2].len(), 8);

        // exactly one line: no trailing break
        let encoded = encode_base64(&[1u8; 57]);
        assert_eq!(encoded.len(), BASE64_LINE);
        assert!(!encoded.contains('\r'));
    }

    #[test]
    fn test_base64_decode_ignores_noise() {
        assert_eq!(
            decode_base64("VGhp\r\ncyBp cyB0\tZXN0IGFy-cmF5").unwrap(),
            b"This is test array"
        );
        assert_eq!(decode_base64("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_utf8_national() {
        let text = "ĄĆĘŁŃÓŚŹŻ ąćęłńóśźż €𝄞";
        assert_eq!(decode_utf8(text.as_bytes()), text);
    }

    #[test]
    fn test_decode_utf8_truncated_sequence() {
        // 3-byte lead with only one continuation left
        assert_eq!(decode_utf8(&[b'a', 0xE2, 0x82]), "a\u{E2}\u{82}");
    }

    #[test]
    fn test_decode_utf8_legacy_forms() {
        // 5-byte encoding of U+0041 is overlong but structurally valid
        assert_eq!(decode_utf8(&[0xF8, 0x80, 0x80, 0x81, 0x81]), "A");
        // 6-byte form beyond the scalar range
        assert_eq!(
            decode_utf8(&[0xFD, 0xBF, 0xBF, 0xBF, 0xBF, 0xBF]),
            "\u{FFFD}"
        );
    }

    proptest! {
        #[test]
        fn prop_utf8_inverse(text in any::<String>()) {
            prop_assert_eq!(decode_utf8(text.as_bytes()), text);
        }

        #[test]
        fn prop_base64_inverse(data in proptest::collection::vec(any::<u8>(), 0..400)) {
            prop_assert_eq!(decode_base64(&encode_base64(&data)).unwrap(), data);
        }
    }
}
