//! Recursive encoder and decoder for marshalled buffers.
//!
//! A buffer on the wire:
//!
//! ```text
//! BEGIN [HEAD label] { [NAME n] [TYPE t] [STATUS s] payload }* END
//!
//! payload := NULL
//!          | NO_VALUE
//!          | VALUE text                         (plain types)
//!          | VALUE length-prefix text           (LPA, LPT)
//!          | VALUE BINARY u32-be bytes          (R.B64 binary)
//!          | VALUE BINARY u32-be buffer         (R.B64 wrapped buffer)
//!          | buffer                             (nested buffer)
//!          | MARKER text                        (row identity, action, ...)
//! ```
//!
//! The length prefix is written in 6-bit chunks, most significant first;
//! every chunk but the last has bit `0x40` set.

use crate::buffer::ByteCursor;
use crate::datum::Row;
use crate::error::MarshalError;
use crate::marker::Marker;
use crate::node::{is_counted_text, Node, Value, TYPE_BINARY};
use crate::tokenizer::Tokenizer;
use bytes::Bytes;

/// Continuation flag of a text-length chunk.
const LENGTH_CONTINUATION: u8 = 0x40;
/// Payload bits of a text-length chunk.
const LENGTH_BITS: u8 = 0x3F;
/// Longest accepted text-length prefix.
const MAX_LENGTH_CHUNKS: usize = 10;

/// Number of bytes the text-length prefix of `len` occupies.
pub fn text_length_size(len: usize) -> usize {
    let mut chunks = 1;
    let mut rest = len >> 6;
    while rest > 0 {
        chunks += 1;
        rest >>= 6;
    }
    chunks
}

/// Writes the text-length prefix of `len`.
pub fn put_text_length(cursor: &mut ByteCursor, len: usize) {
    let chunks = text_length_size(len);
    for i in (1..chunks).rev() {
        cursor.put_u8(((len >> (6 * i)) as u8 & LENGTH_BITS) | LENGTH_CONTINUATION);
    }
    cursor.put_u8(len as u8 & LENGTH_BITS);
}

/// Reads a text-length prefix.
pub fn get_text_length(cursor: &mut ByteCursor) -> Result<usize, MarshalError> {
    let mut len = 0usize;
    for _ in 0..MAX_LENGTH_CHUNKS {
        let byte = cursor.get_u8()?;
        len = (len << 6) | usize::from(byte & LENGTH_BITS);
        if byte & LENGTH_CONTINUATION == 0 {
            return Ok(len);
        }
    }
    Err(MarshalError::InvalidValue {
        type_tag: "length".to_string(),
        value: format!("more than {} chunks", MAX_LENGTH_CHUNKS),
    })
}

// =============================================================================
// Encoding
// =============================================================================

/// Encodes one buffer.
pub fn marshal(nodes: &[Node]) -> Result<Bytes, MarshalError> {
    let mut cursor = ByteCursor::new();
    write_buffer(&mut cursor, nodes, "")?;
    Ok(cursor.into_bytes())
}

/// Encodes a sequence of top-level buffers, each given as a buffer node.
pub fn marshal_all(buffers: &[Node]) -> Result<Bytes, MarshalError> {
    let mut cursor = ByteCursor::new();
    for buffer in buffers {
        write_buffer_node(&mut cursor, buffer)?;
    }
    Ok(cursor.into_bytes())
}

fn write_buffer_node(cursor: &mut ByteCursor, node: &Node) -> Result<(), MarshalError> {
    match &node.value {
        Value::List(children) => write_buffer(cursor, children, &node.buffer_name),
        Value::Row(row) => write_row(cursor, row, &node.buffer_name),
        _ => Err(MarshalError::NotAList(node.name.clone())),
    }
}

fn write_row(cursor: &mut ByteCursor, row: &Row, label: &str) -> Result<(), MarshalError> {
    write_buffer(cursor, &row.to_nodes(), label)
}

/// Writes a buffer: begin marker, optional label, nodes, end marker.
pub fn write_buffer(cursor: &mut ByteCursor, nodes: &[Node], label: &str) -> Result<(), MarshalError> {
    cursor.put_u8(Marker::BeginBuffer.byte());
    if !label.is_empty() {
        cursor.put_u8(Marker::Head.byte());
        put_token(cursor, "buffer label", label.as_bytes())?;
    }
    for node in nodes {
        write_node(cursor, node)?;
    }
    cursor.put_u8(Marker::EndBuffer.byte());
    Ok(())
}

fn write_node(cursor: &mut ByteCursor, node: &Node) -> Result<(), MarshalError> {
    for (marker, field) in [
        (Marker::Name, &node.name),
        (Marker::Type, &node.type_tag),
        (Marker::Status, &node.status),
    ] {
        if !field.is_empty() {
            cursor.put_u8(marker.byte());
            put_token(cursor, &node.name, field.as_bytes())?;
        }
    }

    let delimiter = node.effective_delimiter();
    let binary_type = node.type_tag == TYPE_BINARY;

    match &node.value {
        Value::Null => cursor.put_u8(Marker::Null.byte()),
        Value::Absent if delimiter == Marker::Value => cursor.put_u8(Marker::NoValue.byte()),
        value if delimiter != Marker::Value && !binary_type => match value {
            Value::List(_) | Value::Row(_) => write_buffer_node(cursor, node)?,
            other => {
                cursor.put_u8(delimiter.byte());
                write_scalar(cursor, &node.name, other)?;
            }
        },
        value => {
            cursor.put_u8(Marker::Value.byte());
            if binary_type {
                write_binary_value(cursor, node, value)?;
            } else if is_counted_text(&node.type_tag) {
                let text = scalar_text(value);
                put_text_length(cursor, text.len());
                cursor.put_str(text);
            } else {
                write_scalar(cursor, &node.name, value)?;
            }
        }
    }
    Ok(())
}

fn write_binary_value(cursor: &mut ByteCursor, node: &Node, value: &Value) -> Result<(), MarshalError> {
    match value {
        Value::List(_) | Value::Row(_) => {
            cursor.put_u8(Marker::BinaryData.byte());
            let at = cursor.reserve_zeroed(4);
            write_buffer_node(cursor, node)?;
            let len = cursor.position() - at - 4;
            let len = u32::try_from(len).map_err(|_| MarshalError::BinaryTooLarge(len))?;
            cursor.patch_u32(at, len)?;
        }
        Value::Bytes(bytes) => {
            cursor.put_u8(Marker::BinaryData.byte());
            let len = u32::try_from(bytes.len()).map_err(|_| MarshalError::BinaryTooLarge(bytes.len()))?;
            cursor.put_u32(len);
            cursor.put_slice(bytes);
        }
        other => write_scalar(cursor, &node.name, other)?,
    }
    Ok(())
}

fn scalar_text(value: &Value) -> &str {
    match value {
        Value::Text(text) => text,
        _ => "",
    }
}

fn write_scalar(cursor: &mut ByteCursor, name: &str, value: &Value) -> Result<(), MarshalError> {
    match value {
        Value::Bytes(bytes) => put_token(cursor, name, bytes),
        other => put_token(cursor, name, scalar_text(other).as_bytes()),
    }
}

/// Writes an uncounted token. A marker byte inside it would end or split
/// the token on decode, so it is rejected.
fn put_token(cursor: &mut ByteCursor, name: &str, bytes: &[u8]) -> Result<(), MarshalError> {
    if let Some(&byte) = bytes.iter().find(|&&b| is_reserved(b)) {
        return Err(MarshalError::MarkerInText {
            name: name.to_string(),
            byte,
        });
    }
    cursor.put_slice(bytes);
    Ok(())
}

/// Bytes the tokenizer treats as structure rather than content.
fn is_reserved(byte: u8) -> bool {
    Marker::from_byte(byte).is_some_and(|m| m.ends_token() || m.is_skipped())
}

// =============================================================================
// Decoding
// =============================================================================

/// Hook applied to every nested buffer node as it is decoded.
///
/// Receives the path of the buffer that contains the node (names joined
/// by `/`, unnamed buffers contributing an empty segment) and returns the
/// node to keep in its place.
pub trait Rewrite {
    fn rewrite(&mut self, path: &str, node: Node) -> Result<Node, MarshalError>;
}

impl<F> Rewrite for F
where
    F: FnMut(&str, Node) -> Result<Node, MarshalError>,
{
    fn rewrite(&mut self, path: &str, node: Node) -> Result<Node, MarshalError> {
        self(path, node)
    }
}

/// Leaves every node unchanged.
#[derive(Debug, Default)]
pub struct NoRewrite;

impl Rewrite for NoRewrite {
    fn rewrite(&mut self, _path: &str, node: Node) -> Result<Node, MarshalError> {
        Ok(node)
    }
}

/// Decodes every top-level buffer in `data`.
///
/// Each buffer is returned as an unnamed buffer node.
pub fn unmarshal(data: &[u8]) -> Result<Vec<Node>, MarshalError> {
    unmarshal_with(data, &mut NoRewrite)
}

/// Decodes every top-level buffer, passing nested buffers through `hook`.
pub fn unmarshal_with(data: &[u8], hook: &mut dyn Rewrite) -> Result<Vec<Node>, MarshalError> {
    let mut decoder = Decoder {
        tokens: Tokenizer::new(data.to_vec()),
        hook,
    };
    let mut buffers = Vec::new();
    while !decoder.tokens.is_eof() {
        decoder.tokens.next_token()?;
        decoder.tokens.check_delimiter(Marker::BeginBuffer)?;
        let (label, children) = decoder.read_buffer("")?;
        buffers.push(Node::buffer(children).with_buffer_name(label));
    }
    Ok(buffers)
}

struct Decoder<'h> {
    tokens: Tokenizer,
    hook: &'h mut dyn Rewrite,
}

impl Decoder<'_> {
    /// Reads a buffer whose begin marker has just been consumed.
    ///
    /// Returns with the end marker as the current delimiter.
    fn read_buffer(&mut self, path: &str) -> Result<(String, Vec<Node>), MarshalError> {
        let label = if self.tokens.peek_byte() == Some(Marker::Head.byte()) {
            self.tokens.cursor_mut().skip(1)?;
            self.tokens.next_token()?
        } else {
            self.tokens.next_token()?;
            String::new()
        };

        let mut nodes = Vec::new();
        while self.tokens.delimiter() != Some(Marker::EndBuffer) {
            nodes.push(self.read_node(path)?);
        }
        self.tokens.check_delimiter(Marker::EndBuffer)?;
        Ok((label, nodes))
    }

    fn read_field(&mut self, marker: Marker) -> Result<String, MarshalError> {
        if self.tokens.delimiter() == Some(marker) {
            self.tokens.next_token()
        } else {
            Ok(String::new())
        }
    }

    fn read_node(&mut self, path: &str) -> Result<Node, MarshalError> {
        let mut node = Node::new(self.read_field(Marker::Name)?);
        node.type_tag = self.read_field(Marker::Type)?;
        node.status = self.read_field(Marker::Status)?;

        let delimiter = self.tokens.delimiter().ok_or(MarshalError::UnexpectedDelimiter {
            expected: Marker::Value,
            found: None,
        })?;

        match delimiter {
            Marker::Null => {
                node.value = Value::Null;
                self.tokens.next_token()?;
            }
            Marker::NoValue => {
                self.tokens.next_token()?;
            }
            Marker::Value => {
                if node.type_tag == TYPE_BINARY {
                    return self.read_binary(node, path);
                }
                node.value = if is_counted_text(&node.type_tag) {
                    let len = get_text_length(self.tokens.cursor_mut())?;
                    let text = self.tokens.cursor_mut().read_utf8(len)?;
                    self.tokens.next_token()?;
                    Value::Text(text)
                } else {
                    Value::Text(self.tokens.next_token()?)
                };
            }
            Marker::BeginBuffer => {
                let (label, children) = self.read_buffer(&format!("{}/{}", path, node.name))?;
                node.buffer_name = label;
                node.value = Value::List(children);
                node = self.hook.rewrite(path, node)?;
                self.tokens.match_delimiter(Marker::EndBuffer)?;
            }
            marker if marker.is_block_marker() => {
                node.delimiter = Some(marker);
                let text = self.tokens.next_token()?;
                if !text.is_empty() {
                    node.value = Value::Text(text);
                }
            }
            other => {
                return Err(MarshalError::UnexpectedDelimiter {
                    expected: Marker::Value,
                    found: Some(other),
                })
            }
        }
        Ok(node)
    }

    fn read_binary(&mut self, mut node: Node, path: &str) -> Result<Node, MarshalError> {
        if self.tokens.peek_byte() != Some(Marker::BinaryData.byte()) {
            node.value = Value::Text(self.tokens.next_token()?);
            return Ok(node);
        }

        let cursor = self.tokens.cursor_mut();
        cursor.skip(1)?;
        let len = cursor.get_u32()? as usize;

        if len > 0 && cursor.peek_u8() == Some(Marker::BeginBuffer.byte()) {
            self.tokens.next_token()?;
            let (label, children) = self.read_buffer(&format!("{}/{}", path, node.name))?;
            node.buffer_name = label;
            node.value = Value::List(children);
            node = self.hook.rewrite(path, node)?;
        } else {
            node.value = Value::Bytes(self.tokens.cursor_mut().read_bytes(len)?);
        }
        self.tokens.next_token()?;
        Ok(node)
    }
}
