//! # ifsap-client
//!
//! Client library for the IFS AccessPlsql gateway.
//!
//! This crate provides:
//! - Typed bind variables, single and multi-row
//! - SQL queries and PL/SQL calls with exact request size prediction
//! - Paged results through server-side cursors
//! - Command batches sent in one round trip
//! - Autocommit and transaction handling on the connection
//! - HTTP/1.1 transport with optional TLS

pub mod bindings;
pub mod block;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod exchange;
pub mod id;
pub mod response;
pub mod size;
pub mod statement;
pub mod stream;
pub mod tls;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use bindings::{BindParam, BindValue, Direction, Params, Placeholder};
pub use block::CommandBlock;
pub use command::{Command, CommandOptions};
pub use config::{ConfigError, ConnectionConfig, GatewayVersion, TlsClientConfig};
pub use connection::{Connection, ExecutionState};
pub use error::ClientError;
pub use response::{Outcome, Response};
pub use transport::{HttpReply, HttpRequest, HttpTransport, Transport, TransportError};
