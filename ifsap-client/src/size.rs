//! Encoded sizes of request fragments.
//!
//! Every figure here mirrors what the encoder writes for the node shapes
//! the request builders produce, so the request buffer can be allocated
//! once at its final size.

use ifsap_marshal::text_length_size;

/// One marker byte.
pub const MARKER: usize = 1;
/// Begin and end markers of a buffer.
pub const BUFFER: usize = 2;
/// Binary marker plus the 4-byte length.
const BINARY_PREFIX: usize = 1 + 4;

/// A name, type or status field: marker plus text.
pub const fn field(text: &str) -> usize {
    if text.is_empty() {
        0
    } else {
        MARKER + text.len()
    }
}

/// A plain text value node.
pub fn text(name: &str, type_tag: &str, value_len: usize) -> usize {
    field(name) + field(type_tag) + MARKER + value_len
}

/// A length-prefixed (`LPA`/`LPT`) value node.
pub fn counted(name: &str, type_tag: &str, value_len: usize) -> usize {
    field(name) + field(type_tag) + MARKER + text_length_size(value_len) + value_len
}

/// A named buffer node holding `inner` bytes of children.
pub fn buffer(name: &str, inner: usize) -> usize {
    field(name) + BUFFER + inner
}

/// A row-identity node.
pub fn row_identity(name: &str, type_tag: &str, status: &str, value_len: usize) -> usize {
    field(name) + field(type_tag) + field(status) + MARKER + value_len
}

/// An `R.B64` node wrapping a nested buffer of `inner` bytes.
pub fn binary_buffer(name: &str, inner: usize) -> usize {
    field(name) + field(ifsap_marshal::TYPE_BINARY) + MARKER + BINARY_PREFIX + BUFFER + inner
}

/// The payload of an `R.B64` bytes value.
pub fn binary_bytes(len: usize) -> usize {
    MARKER + BINARY_PREFIX + len
}

/// Decimal digits of `n`.
pub fn digits(n: u64) -> usize {
    n.to_string().len()
}
