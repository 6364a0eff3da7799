//! Tagged tree nodes.

use crate::datum::Row;
use crate::marker::Marker;

/// Type tag of Base64/binary values and binary-wrapped buffers.
pub const TYPE_BINARY: &str = "R.B64";
/// Type tag of length-prefixed alpha values.
pub const TYPE_LPA: &str = "LPA";
/// Type tag of length-prefixed text values.
pub const TYPE_LPT: &str = "LPT";

/// Returns whether values of this type carry a text-length prefix.
pub fn is_counted_text(type_tag: &str) -> bool {
    type_tag == TYPE_LPA || type_tag == TYPE_LPT
}

/// Payload of a node.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value at all (encoded as a no-value marker).
    #[default]
    Absent,
    Null,
    Text(String),
    /// Raw binary span.
    Bytes(Vec<u8>),
    /// Nested buffer.
    List(Vec<Node>),
    /// A nested buffer collapsed into typed columns.
    Row(Row),
}

/// One element of a marshalled buffer.
///
/// Empty `name`, `type_tag`, `status` and `buffer_name` are treated as
/// absent and are not written.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    pub name: String,
    pub type_tag: String,
    pub status: String,
    /// Explicit delimiter; `None` means the value marker, or begin-buffer
    /// for buffer values.
    pub delimiter: Option<Marker>,
    pub value: Value,
    /// Label written after the begin marker of a nested buffer.
    pub buffer_name: String,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// An unnamed nested buffer.
    pub fn buffer(children: Vec<Node>) -> Self {
        Self {
            value: Value::List(children),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, type_tag: impl Into<String>) -> Self {
        self.type_tag = type_tag.into();
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_delimiter(mut self, delimiter: Marker) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.value = Value::Text(text.into());
        self
    }

    pub fn with_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.value = Value::Bytes(bytes.into());
        self
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.value = Value::List(children);
        self
    }

    pub fn with_null(mut self) -> Self {
        self.value = Value::Null;
        self
    }

    pub fn with_buffer_name(mut self, label: impl Into<String>) -> Self {
        self.buffer_name = label.into();
        self
    }

    pub fn is_null(&self) -> bool {
        matches!(self.value, Value::Null)
    }

    pub fn is_binary(&self) -> bool {
        matches!(self.value, Value::Bytes(_))
    }

    pub fn is_buffer(&self) -> bool {
        matches!(self.value, Value::List(_) | Value::Row(_))
    }

    /// Delimiter written in front of the value.
    pub fn effective_delimiter(&self) -> Marker {
        match self.delimiter {
            Some(marker) => marker,
            None if self.is_buffer() => Marker::BeginBuffer,
            None => Marker::Value,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.value {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn children(&self) -> Option<&[Node]> {
        match &self.value {
            Value::List(children) => Some(children),
            _ => None,
        }
    }

    pub fn row(&self) -> Option<&Row> {
        match &self.value {
            Value::Row(row) => Some(row),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_delimiter() {
        assert_eq!(Node::new("A").effective_delimiter(), Marker::Value);
        assert_eq!(Node::buffer(vec![]).effective_delimiter(), Marker::BeginBuffer);
        assert_eq!(
            Node::new("DATA")
                .with_delimiter(Marker::RowIdentity)
                .effective_delimiter(),
            Marker::RowIdentity
        );
    }

    #[test]
    fn test_value_kinds() {
        let node = Node::new("X").with_null();
        assert!(node.is_null());
        assert!(!node.is_buffer());

        let node = Node::new("B").with_type(TYPE_BINARY).with_bytes(vec![1, 2]);
        assert!(node.is_binary());
        assert_eq!(node.text(), None);

        let node = Node::new("L").with_children(vec![Node::new("C").with_text("v")]);
        assert!(node.is_buffer());
        assert_eq!(node.children().unwrap()[0].text(), Some("v"));
    }

    #[test]
    fn test_counted_text() {
        assert!(is_counted_text("LPA"));
        assert!(is_counted_text("LPT"));
        assert!(!is_counted_text("LT"));
        assert!(!is_counted_text(""));
    }
}
