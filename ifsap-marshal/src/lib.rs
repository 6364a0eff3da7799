//! # ifsap-marshal
//!
//! Binary tree codec spoken by the IFS AccessPlsql gateway.
//!
//! This crate provides:
//! - A growable byte cursor with seekable read/write offset
//! - Lenient UTF-8 decoding and line-wrapped Base64
//! - Marker tokenizer and recursive buffer encoder/decoder
//! - Path queries over decoded trees
//! - Conversion between wire type tags and native values

pub mod buffer;
pub mod codec;
pub mod datum;
pub mod error;
pub mod marker;
pub mod node;
pub mod query;
pub mod text;
pub mod tokenizer;

pub use buffer::ByteCursor;
pub use codec::{
    get_text_length, marshal, marshal_all, put_text_length, text_length_size, unmarshal,
    unmarshal_with, write_buffer, NoRewrite, Rewrite,
};
pub use datum::{format_date, parse_date, Datum, Row};
pub use error::MarshalError;
pub use marker::{Marker, MAX_MARKER};
pub use node::{Node, Value, TYPE_BINARY, TYPE_LPA, TYPE_LPT};
pub use query::{extract, extract_in, Predicate, Step};
pub use tokenizer::Tokenizer;
