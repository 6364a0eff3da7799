//! Single-byte structural markers.
//!
//! Every byte at or below [`MAX_MARKER`] has a structural meaning in the
//! stream; bytes above it are content. The binary-data marker (`0x21`) is an
//! exception that only has meaning directly after a value marker on an
//! `R.B64` node.

/// Highest byte value that can act as a structural marker.
pub const MAX_MARKER: u8 = 0x1C;

/// Structural marker bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Marker {
    RowIdentity = 0x0E,
    Unchanged = 0x0F,
    Changed = 0x10,
    Count = 0x11,
    Invalid = 0x12,
    NoValue = 0x13,
    Null = 0x14,
    Value = 0x15,
    Status = 0x16,
    Type = 0x17,
    Name = 0x18,
    Head = 0x19,
    EndBuffer = 0x1A,
    BeginBuffer = 0x1B,
    Action = 0x1C,
    BinaryData = 0x21,
}

impl Marker {
    /// Classifies a byte as a structural marker.
    ///
    /// Returns `None` for content bytes, including `0x21`, which is only a
    /// marker in the binary value position.
    pub fn from_byte(byte: u8) -> Option<Self> {
        let marker = match byte {
            0x0E => Marker::RowIdentity,
            0x0F => Marker::Unchanged,
            0x10 => Marker::Changed,
            0x11 => Marker::Count,
            0x12 => Marker::Invalid,
            0x13 => Marker::NoValue,
            0x14 => Marker::Null,
            0x15 => Marker::Value,
            0x16 => Marker::Status,
            0x17 => Marker::Type,
            0x18 => Marker::Name,
            0x19 => Marker::Head,
            0x1A => Marker::EndBuffer,
            0x1B => Marker::BeginBuffer,
            0x1C => Marker::Action,
            _ => return None,
        };
        Some(marker)
    }

    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Markers that close a token run in the tokenizer.
    pub fn ends_token(self) -> bool {
        matches!(
            self,
            Marker::RowIdentity
                | Marker::Action
                | Marker::BeginBuffer
                | Marker::EndBuffer
                | Marker::Name
                | Marker::Null
                | Marker::NoValue
                | Marker::Status
                | Marker::Type
                | Marker::Invalid
                | Marker::Count
                | Marker::Value
        )
    }

    /// Markers the tokenizer drops without ending the current run.
    pub fn is_skipped(self) -> bool {
        matches!(self, Marker::Changed | Marker::Unchanged)
    }

    /// Markers whose token is kept as a scalar value when non-empty.
    pub(crate) fn is_block_marker(self) -> bool {
        matches!(
            self,
            Marker::Invalid
                | Marker::Changed
                | Marker::Unchanged
                | Marker::Type
                | Marker::Action
                | Marker::RowIdentity
                | Marker::Count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_byte_roundtrip() {
        for byte in 0x0E..=MAX_MARKER {
            let marker = Marker::from_byte(byte).unwrap();
            assert_eq!(marker.byte(), byte);
        }
    }

    #[test]
    fn test_content_bytes() {
        assert_eq!(Marker::from_byte(0x00), None);
        assert_eq!(Marker::from_byte(0x0D), None);
        assert_eq!(Marker::from_byte(0x1D), None);
        assert_eq!(Marker::from_byte(b'A'), None);
        // binary marker is positional only
        assert_eq!(Marker::from_byte(0x21), None);
    }

    #[test]
    fn test_token_classes() {
        assert!(Marker::Value.ends_token());
        assert!(Marker::BeginBuffer.ends_token());
        assert!(!Marker::Head.ends_token());
        assert!(!Marker::Changed.ends_token());
        assert!(Marker::Changed.is_skipped());
        assert!(Marker::Unchanged.is_skipped());
        assert!(!Marker::Value.is_skipped());
    }
}
