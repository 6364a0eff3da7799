//! Bind variables.
//!
//! A [`Params`] map is what callers write; a [`BindingSet`] is what a
//! command sends: one [`Bindings`] list per iteration. Supplying a list of
//! maps switches the set to multi-row mode, where every map becomes its own
//! iteration of the same statement.

use crate::size;
use chrono::{NaiveDate, NaiveDateTime};
use ifsap_marshal::node::is_counted_text;
use ifsap_marshal::text::encode_base64;
use ifsap_marshal::{format_date, text_length_size, Node, TYPE_BINARY, TYPE_LPT};
use std::fmt;

/// Longest string bound as `LPT`; longer strings use `LT`.
pub const MAX_LPT_CHARS: usize = 4000;

/// Direction of a bind variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    InOut,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
            Direction::InOut => "IN_OUT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A native value bound to a variable.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDateTime),
    Bytes(Vec<u8>),
}

impl BindValue {
    /// Type tag derived from the value itself.
    pub fn inferred_type(&self) -> &'static str {
        match self {
            BindValue::Text(text) if text.chars().count() > MAX_LPT_CHARS => "LT",
            BindValue::Text(_) => TYPE_LPT,
            BindValue::Integer(_) => "I",
            BindValue::Float(f) if f.is_finite() && f.fract() == 0.0 => "I",
            BindValue::Float(_) => "N",
            BindValue::Date(_) => "DT",
            BindValue::Bytes(_) => TYPE_BINARY,
        }
    }

    /// Wire text of the value.
    pub fn to_ifs_string(&self) -> String {
        match self {
            BindValue::Text(text) => text.clone(),
            BindValue::Integer(n) => n.to_string(),
            BindValue::Float(f) => f.to_string(),
            BindValue::Date(date) => format_date(date),
            BindValue::Bytes(bytes) => encode_base64(bytes),
        }
    }

    /// Empty text and zero count as "no value".
    pub fn is_falsy(&self) -> bool {
        match self {
            BindValue::Text(text) => text.is_empty(),
            BindValue::Integer(n) => *n == 0,
            BindValue::Float(f) => *f == 0.0 || f.is_nan(),
            BindValue::Date(_) | BindValue::Bytes(_) => false,
        }
    }
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        BindValue::Text(value.to_string())
    }
}

impl From<String> for BindValue {
    fn from(value: String) -> Self {
        BindValue::Text(value)
    }
}

impl From<i64> for BindValue {
    fn from(value: i64) -> Self {
        BindValue::Integer(value)
    }
}

impl From<i32> for BindValue {
    fn from(value: i32) -> Self {
        BindValue::Integer(value.into())
    }
}

impl From<f64> for BindValue {
    fn from(value: f64) -> Self {
        BindValue::Float(value)
    }
}

impl From<NaiveDateTime> for BindValue {
    fn from(value: NaiveDateTime) -> Self {
        BindValue::Date(value)
    }
}

impl From<NaiveDate> for BindValue {
    fn from(value: NaiveDate) -> Self {
        BindValue::Date(value.and_time(chrono::NaiveTime::MIN))
    }
}

impl From<Vec<u8>> for BindValue {
    fn from(value: Vec<u8>) -> Self {
        BindValue::Bytes(value)
    }
}

impl From<&[u8]> for BindValue {
    fn from(value: &[u8]) -> Self {
        BindValue::Bytes(value.to_vec())
    }
}

/// Typed output slot with a default value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Varchar2,
    Integer,
    Number,
    Date,
    Clob,
    Blob,
}

impl Placeholder {
    pub fn type_tag(self) -> &'static str {
        match self {
            Placeholder::Varchar2 => TYPE_LPT,
            Placeholder::Integer => "I",
            Placeholder::Number => "N",
            Placeholder::Date => "DT",
            Placeholder::Clob => "LT",
            Placeholder::Blob => TYPE_BINARY,
        }
    }

    pub fn default_value(self) -> BindValue {
        match self {
            Placeholder::Varchar2 | Placeholder::Clob => BindValue::Text(String::new()),
            Placeholder::Integer => BindValue::Integer(0),
            Placeholder::Number => BindValue::Float(0.0),
            Placeholder::Date => BindValue::Date(
                NaiveDate::from_ymd_opt(2000, 1, 1)
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .unwrap_or(NaiveDateTime::MIN),
            ),
            Placeholder::Blob => BindValue::Bytes(Vec::new()),
        }
    }
}

/// What a caller binds to a name.
#[derive(Debug, Clone, PartialEq)]
pub enum BindParam {
    /// Sent `IN_OUT` with an inferred type.
    Value(BindValue),
    /// Sent `OUT` with the placeholder's type and default.
    Placeholder(Placeholder),
    /// Sent exactly as given.
    Explicit {
        direction: Direction,
        type_tag: String,
        value: BindValue,
    },
}

impl BindParam {
    pub fn explicit(direction: Direction, type_tag: impl Into<String>, value: impl Into<BindValue>) -> Self {
        BindParam::Explicit {
            direction,
            type_tag: type_tag.into(),
            value: value.into(),
        }
    }
}

macro_rules! bind_param_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for BindParam {
                fn from(value: $ty) -> Self {
                    BindParam::Value(value.into())
                }
            }
        )*
    };
}

bind_param_from!(&str, String, i64, i32, f64, NaiveDateTime, NaiveDate, Vec<u8>, &[u8]);

impl From<BindValue> for BindParam {
    fn from(value: BindValue) -> Self {
        BindParam::Value(value)
    }
}

impl From<Placeholder> for BindParam {
    fn from(placeholder: Placeholder) -> Self {
        BindParam::Placeholder(placeholder)
    }
}

/// Named parameters for one iteration, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, BindParam)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: impl Into<String>, param: impl Into<BindParam>) -> Self {
        self.entries.push((name.into(), param.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BindParam)> {
        self.entries.iter().map(|(n, p)| (n.as_str(), p))
    }
}

/// One resolved bind variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub direction: Direction,
    pub type_tag: String,
    pub value: BindValue,
}

impl Binding {
    pub fn resolve(name: &str, param: &BindParam) -> Self {
        let (direction, type_tag, value) = match param {
            BindParam::Value(value) => (Direction::InOut, value.inferred_type().to_string(), value.clone()),
            BindParam::Placeholder(p) => (Direction::Out, p.type_tag().to_string(), p.default_value()),
            BindParam::Explicit {
                direction,
                type_tag,
                value,
            } => (*direction, type_tag.clone(), value.clone()),
        };
        Self {
            name: name.to_string(),
            direction,
            type_tag,
            value,
        }
    }

    /// Empty counted text travels as null.
    fn is_null(&self) -> bool {
        self.value.is_falsy() && is_counted_text(&self.type_tag)
    }

    /// Wire node, optionally with a forced direction.
    pub fn to_node(&self, direction: Direction) -> Node {
        let node = Node::new(&self.name)
            .with_type(&self.type_tag)
            .with_status(direction.as_str());
        if self.is_null() {
            return node.with_null();
        }
        match &self.value {
            BindValue::Bytes(bytes) if self.type_tag == TYPE_BINARY => node.with_bytes(bytes.clone()),
            value => node.with_text(value.to_ifs_string()),
        }
    }

    /// Exact encoded size of [`to_node`](Self::to_node).
    pub fn encoded_size(&self, direction: Direction) -> usize {
        let header = size::field(&self.name) + size::field(&self.type_tag) + size::field(direction.as_str());
        let value = if self.is_null() {
            size::MARKER
        } else {
            match &self.value {
                BindValue::Bytes(bytes) if self.type_tag == TYPE_BINARY => size::binary_bytes(bytes.len()),
                value => {
                    let len = value.to_ifs_string().len();
                    if is_counted_text(&self.type_tag) {
                        size::MARKER + text_length_size(len) + len
                    } else {
                        size::MARKER + len
                    }
                }
            }
        };
        header + value
    }
}

/// The bind variables of one iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    items: Vec<Binding>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_params(params: &Params) -> Self {
        let mut bindings = Self::new();
        bindings.add(params);
        bindings
    }

    /// Appends every parameter of `params`; an empty map is a no-op.
    pub fn add(&mut self, params: &Params) {
        for (name, param) in params.iter() {
            self.items.push(Binding::resolve(name, param));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.items.iter()
    }

    /// Wire nodes; `force_in` sends every variable as `IN`.
    pub fn to_nodes(&self, force_in: bool) -> Vec<Node> {
        self.items
            .iter()
            .map(|b| b.to_node(if force_in { Direction::In } else { b.direction }))
            .collect()
    }

    pub fn encoded_size(&self, force_in: bool) -> usize {
        self.items
            .iter()
            .map(|b| b.encoded_size(if force_in { Direction::In } else { b.direction }))
            .sum()
    }
}

/// All iterations of a command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingSet {
    sets: Vec<Bindings>,
    multi_row: bool,
}

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a single map into the first iteration.
    pub fn add(&mut self, params: &Params) {
        if params.is_empty() {
            return;
        }
        match self.sets.first_mut() {
            Some(first) => first.add(params),
            None => self.sets.push(Bindings::from_params(params)),
        }
    }

    /// Replaces the iterations with one per map and switches to
    /// multi-row mode; an empty list is ignored.
    pub fn add_rows(&mut self, rows: &[Params]) {
        if rows.is_empty() {
            return;
        }
        self.multi_row = true;
        self.sets = rows.iter().map(Bindings::from_params).collect();
    }

    pub fn is_multi_row(&self) -> bool {
        self.multi_row
    }

    /// Number of iterations that carry bindings.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Bindings> {
        self.sets.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bindings> {
        self.sets.iter()
    }

    /// Names of every bound variable, across iterations.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.iter().flat_map(|s| s.iter().map(|b| b.name.as_str()))
    }
}
