//! Native values and the gateway's attribute type tags.

use crate::error::MarshalError;
use crate::node::{Node, Value, TYPE_BINARY, TYPE_LPT};
use crate::text::decode_base64;
use chrono::{NaiveDate, NaiveDateTime};

/// Date/time layout used on the wire: `yyyy-mm-dd-hh.mi.ss`.
pub const DATE_FORMAT: &str = "%Y-%m-%d-%H.%M.%S";

/// A native value converted from (or to) a tagged wire string.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Bytes(Vec<u8>),
    Date(NaiveDateTime),
}

impl Datum {
    /// Converts a node value according to its type tag.
    ///
    /// Null and absent values map to [`Datum::Null`]; so does empty text
    /// for every non-textual tag.
    pub fn from_value(value: &Value, type_tag: &str) -> Result<Datum, MarshalError> {
        let text = match value {
            Value::Absent | Value::Null => return Ok(Datum::Null),
            Value::Bytes(bytes) => return Ok(Datum::Bytes(bytes.clone())),
            Value::List(_) | Value::Row(_) => {
                return Err(MarshalError::InvalidValue {
                    type_tag: type_tag.to_string(),
                    value: "nested buffer".to_string(),
                })
            }
            Value::Text(text) => text,
        };

        let datum = match type_tag {
            "A" | "LPA" | "LT" | "T" | "LPT" => Datum::Text(text.clone()),
            "AGGREGATE" | "ASPECT" | "ARRAY" | "ENUM" | "R.SA" => Datum::Text(text.clone()),
            _ if text.is_empty() => {
                // still reject unknown tags
                check_known(type_tag)?;
                Datum::Null
            }
            "I" => Datum::Integer(parse_integer(text)?),
            "DEC" | "N" => Datum::Float(text.trim().parse().map_err(|_| invalid(type_tag, text))?),
            "B" => Datum::Boolean(text == "TRUE"),
            "R.B64" => Datum::Bytes(decode_base64(text)?),
            "D" | "DT" | "DTS" => Datum::Date(parse_date(text)?),
            other => return Err(MarshalError::UnsupportedType(other.to_string())),
        };
        Ok(datum)
    }

    /// Wire form of a scalar; `None` for null and binary values.
    pub fn to_ifs_string(&self) -> Option<String> {
        match self {
            Datum::Null | Datum::Bytes(_) => None,
            Datum::Text(text) => Some(text.clone()),
            Datum::Integer(n) => Some(n.to_string()),
            Datum::Float(f) => Some(f.to_string()),
            Datum::Boolean(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
            Datum::Date(date) => Some(format_date(date)),
        }
    }

    /// Type tag used when writing this value back to the wire.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Datum::Null => "",
            Datum::Text(_) => TYPE_LPT,
            Datum::Integer(_) => "I",
            Datum::Float(_) => "N",
            Datum::Boolean(_) => "B",
            Datum::Bytes(_) => TYPE_BINARY,
            Datum::Date(_) => "DT",
        }
    }

    /// Builds a wire node carrying this value.
    pub fn to_node(&self, name: &str) -> Node {
        let node = Node::new(name).with_type(self.type_tag());
        match self {
            Datum::Null => node.with_null(),
            Datum::Bytes(bytes) => node.with_bytes(bytes.clone()),
            other => node.with_text(other.to_ifs_string().unwrap_or_default()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Float(f) => Some(*f),
            Datum::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Datum::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Datum::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            Datum::Date(date) => Some(*date),
            _ => None,
        }
    }
}

fn check_known(type_tag: &str) -> Result<(), MarshalError> {
    match type_tag {
        "I" | "DEC" | "N" | "B" | "R.B64" | "D" | "DT" | "DTS" => Ok(()),
        other => Err(MarshalError::UnsupportedType(other.to_string())),
    }
}

fn invalid(type_tag: &str, text: &str) -> MarshalError {
    MarshalError::InvalidValue {
        type_tag: type_tag.to_string(),
        value: text.to_string(),
    }
}

/// Parses the leading integer of `text`, ignoring any fractional tail.
fn parse_integer(text: &str) -> Result<i64, MarshalError> {
    let trimmed = text.trim_start();
    let digits_end = trimmed
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map_or(trimmed.len(), |(i, _)| i);
    trimmed[..digits_end]
        .parse()
        .map_err(|_| invalid("I", text))
}

/// Formats a date/time as `yyyy-mm-dd-hh.mi.ss`.
pub fn format_date(date: &NaiveDateTime) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parses `yyyy-mm-dd` or `yyyy-mm-dd-hh.mi.ss[...]`.
pub fn parse_date(text: &str) -> Result<NaiveDateTime, MarshalError> {
    let parts: Vec<u32> = text
        .trim()
        .split(['-', '.'])
        .map(|part| part.parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|_| invalid("DT", text))?;

    let date = match parts.as_slice() {
        [y, m, d] => NaiveDate::from_ymd_opt(*y as i32, *m, *d).and_then(|d| d.and_hms_opt(0, 0, 0)),
        [y, m, d, hh, mi, ss, ..] => NaiveDate::from_ymd_opt(*y as i32, *m, *d)
            .and_then(|d| d.and_hms_opt(*hh, *mi, *ss)),
        _ => None,
    };
    date.ok_or_else(|| invalid("DT", text))
}

/// A result row or binding map: named values in wire order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<(String, Datum)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Converts a buffer of typed column nodes.
    pub fn from_nodes(nodes: &[Node]) -> Result<Self, MarshalError> {
        let mut row = Row::new();
        for node in nodes {
            let datum = Datum::from_value(&node.value, &node.type_tag)?;
            row.insert(node.name.clone(), datum);
        }
        Ok(row)
    }

    /// Sets a column, replacing an existing one of the same name.
    pub fn insert(&mut self, name: impl Into<String>, datum: Datum) {
        let name = name.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = datum,
            None => self.columns.push((name, datum)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Datum> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Datum)> {
        self.columns.iter().map(|(n, d)| (n.as_str(), d))
    }

    /// Column nodes for writing the row back as a buffer.
    pub fn to_nodes(&self) -> Vec<Node> {
        self.columns
            .iter()
            .map(|(name, datum)| datum.to_node(name))
            .collect()
    }
}

impl FromIterator<(String, Datum)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Datum)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (name, datum) in iter {
            row.insert(name, datum);
        }
        row
    }
}
