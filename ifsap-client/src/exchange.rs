//! One request/reply round trip with the gateway.
//!
//! A request is two top-level buffers: the `FND_CONTEXT` header and the
//! `PLSQL_INVOCATION` body that carries the command fragments. Commands and
//! batches build their fragments; everything else happens here.

use crate::connection::Connection;
use crate::error::ClientError;
use crate::id::{new_id, ID_LEN};
use crate::size;
use crate::transport::{HttpRequest, OCTET_STREAM};
use bytes::Bytes;
use ifsap_marshal::{
    extract, extract_in, unmarshal_with, write_buffer, ByteCursor, Marker, MarshalError, Node,
    Predicate, Row, Step, Value,
};
use std::time::Duration;

/// Path under which result rows are collapsed into [`Row`] values.
pub const RESULT_PATH: &str = "/PLSQL_INVOCATION//COMMANDS//RESULT";

const MISSING_STATUS: &str =
    "Wrong returned data structure. I can't find a record with status information.";

/// Connection state a request is built from.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub url: String,
    pub authorization: String,
    pub client_id: String,
    pub locale: String,
    pub run_as: String,
    pub debug: bool,
    pub timeout: Option<Duration>,
    pub transaction_id: String,
    pub client_session_id: String,
}

/// A decoded reply, or the text of a failure the gateway reported.
#[derive(Debug)]
pub enum Reply {
    Failed(String),
    Decoded(Vec<Node>),
}

/// Encoded request bytes.
#[derive(Debug)]
pub struct EncodedRequest {
    pub header_len: usize,
    pub bytes: Bytes,
    pub predicted_len: usize,
}

/// The `FND_CONTEXT` header buffer.
pub fn header_tree(ctx: &RequestContext) -> Node {
    let mut context = vec![
        Node::new("CLIENT_ID").with_text(&ctx.client_id),
        Node::new("REQUEST_ID").with_text(new_id()),
        Node::new("LOCALE").with_text(&ctx.locale),
        Node::new("ENCODE_BINARY_VALUE").with_text("FALSE"),
    ];
    if ctx.debug {
        let mut debug: Vec<Node> = [
            "CALL_SEQUENCE",
            "DB_ACCESS",
            "SKELETON_ARGUMENTS",
            "STUB_ARGUMENTS",
            "APPLICATION_CODE",
        ]
        .into_iter()
        .map(|name| Node::new(name).with_text("DEBUG"))
        .collect();
        debug.push(Node::new("OUTPUT").with_text(""));
        context.push(Node::new("DEBUG").with_children(debug));
    }
    if !ctx.run_as.is_empty() {
        context.push(Node::new("RUN_AS").with_text(&ctx.run_as));
    }
    Node::new("FND_CONTEXT").with_children(context)
}

/// Encoded size of the header, top-level buffer included.
pub fn header_size(ctx: &RequestContext) -> usize {
    let mut inner = size::text("CLIENT_ID", "", ctx.client_id.len())
        + size::text("REQUEST_ID", "", ID_LEN)
        + size::text("LOCALE", "", ctx.locale.len())
        + size::text("ENCODE_BINARY_VALUE", "", "FALSE".len());
    if ctx.debug {
        let debug = size::text("CALL_SEQUENCE", "", 5)
            + size::text("DB_ACCESS", "", 5)
            + size::text("SKELETON_ARGUMENTS", "", 5)
            + size::text("STUB_ARGUMENTS", "", 5)
            + size::text("APPLICATION_CODE", "", 5)
            + size::text("OUTPUT", "", 0);
        inner += size::buffer("DEBUG", debug);
    }
    if !ctx.run_as.is_empty() {
        inner += size::text("RUN_AS", "", ctx.run_as.len());
    }
    size::BUFFER + size::buffer("FND_CONTEXT", inner)
}

/// The `PLSQL_INVOCATION` body buffer around the command fragments.
pub fn body_tree(transaction_id: &str, commands: Vec<Node>) -> Node {
    let mut data = Vec::with_capacity(commands.len() + 1);
    if !transaction_id.is_empty() {
        data.push(
            Node::new("TRANSACTION_ID")
                .with_type("LPT")
                .with_text(transaction_id),
        );
    }
    data.extend(commands);

    Node::new("PLSQL_INVOCATION").with_children(vec![
        Node::new("DATA")
            .with_type("PLSQL_INVOCATION")
            .with_status("Create")
            .with_delimiter(Marker::RowIdentity)
            .with_text(new_id()),
        Node::buffer(data),
    ])
}

/// Encoded size of the body without its command fragments.
pub fn body_size(transaction_id: &str) -> usize {
    let mut data = 0;
    if !transaction_id.is_empty() {
        data += size::counted("TRANSACTION_ID", "LPT", transaction_id.len());
    }
    let invocation = size::row_identity("DATA", "PLSQL_INVOCATION", "Create", ID_LEN)
        + size::buffer("", data);
    size::BUFFER + size::buffer("PLSQL_INVOCATION", invocation)
}

/// Encodes header and body into one buffer sized by prediction.
pub fn encode_request(
    ctx: &RequestContext,
    commands: Vec<Node>,
    commands_size: usize,
) -> Result<EncodedRequest, MarshalError> {
    let predicted_len = header_size(ctx) + body_size(&ctx.transaction_id) + commands_size;
    let mut cursor = ByteCursor::with_capacity(predicted_len);

    write_buffer(&mut cursor, &[header_tree(ctx)], "")?;
    let header_len = cursor.position();
    write_buffer(&mut cursor, &[body_tree(&ctx.transaction_id, commands)], "")?;

    if cursor.len() != predicted_len {
        tracing::warn!(
            "Request size prediction off: predicted {} bytes, encoded {}",
            predicted_len,
            cursor.len()
        );
    }

    Ok(EncodedRequest {
        header_len,
        bytes: cursor.into_bytes(),
        predicted_len,
    })
}

fn http_request(ctx: &RequestContext, encoded: EncodedRequest) -> HttpRequest {
    let mut headers = vec![
        ("Content-Type".to_string(), OCTET_STREAM.to_string()),
        ("Request-Header-Length".to_string(), encoded.header_len.to_string()),
        ("Authorization".to_string(), ctx.authorization.clone()),
        ("Client-Session-Id".to_string(), ctx.client_session_id.clone()),
        ("Os-User".to_string(), String::new()),
    ];
    if let Some(timeout) = ctx.timeout {
        headers.push(("X-Ifs-Timeout".to_string(), timeout.as_millis().to_string()));
    }
    HttpRequest {
        url: ctx.url.clone(),
        headers,
        body: encoded.bytes,
        timeout: ctx.timeout,
    }
}

/// Collapses every result row into a [`Row`].
pub fn flatten_rows(path: &str, node: Node) -> Result<Node, MarshalError> {
    if path != RESULT_PATH {
        return Ok(node);
    }
    match node.value {
        Value::List(columns) => Ok(Node {
            value: Value::Row(Row::from_nodes(&columns)?),
            ..node
        }),
        value => Ok(Node { value, ..node }),
    }
}

/// The unnamed data buffer of the `PLSQL_INVOCATION` body.
pub fn invocation_data(nodes: &[Node]) -> Option<&Node> {
    extract(
        nodes,
        &[
            Step::Index(1),
            Predicate::new().name("PLSQL_INVOCATION").buffer(true).into(),
            Predicate::new().name("").buffer(true).into(),
        ],
    )
}

/// Transaction id carried by a reply; empty when absent or null.
pub fn transaction_id(nodes: &[Node]) -> String {
    invocation_data(nodes)
        .and_then(|data| extract_in(data, &[Step::named("TRANSACTION_ID")]))
        .and_then(|node| node.text())
        .unwrap_or_default()
        .to_string()
}

/// Server status check: `Ok(None)` for `DONE`, `Ok(Some(text))` for a
/// reported failure.
pub fn status_error(nodes: &[Node]) -> Result<Option<String>, ClientError> {
    let status = extract(nodes, &[Step::Index(0), Step::named("STATUS")])
        .ok_or_else(|| ClientError::Protocol(MISSING_STATUS.to_string()))?;

    match status.text().unwrap_or_default() {
        "DONE" => Ok(None),
        "ERROR" => {
            let text = match extract(nodes, &[Step::Index(0), Step::named("ERROR")]) {
                Some(error) => extract_in(error, &[Step::named("MESSAGE")])
                    .and_then(|m| m.text())
                    .unwrap_or("Wrong returned data structure")
                    .to_string(),
                None => "Wrong returned data structure. Status is ERROR but I can't find an error message."
                    .to_string(),
            };
            Ok(Some(text))
        }
        other => Ok(Some(format!("Something wrong in returned data. Status = {}", other))),
    }
}

/// Sends the fragments and returns the decoded reply.
///
/// `session_id` overrides the connection's client session (temporary
/// sessions for cursors). A `DONE` reply refreshes the connection's
/// transaction id; failures leave it as it was.
pub async fn invoke(
    connection: &Connection,
    session_id: Option<&str>,
    commands: Vec<Node>,
    commands_size: usize,
) -> Result<Reply, ClientError> {
    let ctx = connection.request_context(session_id);
    let encoded = encode_request(&ctx, commands, commands_size)?;
    tracing::debug!(
        "Invoking gateway: {} bytes (header {}), session {}",
        encoded.bytes.len(),
        encoded.header_len,
        ctx.client_session_id
    );

    let reply = match connection.transport().send(http_request(&ctx, encoded)).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::debug!("Gateway request failed: {}", e);
            return Ok(Reply::Failed(e.to_string()));
        }
    };
    if !reply.is_success() {
        tracing::debug!("Gateway replied with status {}", reply.status);
        let text = reply.text();
        return Ok(Reply::Failed(if text.is_empty() {
            format!("HTTP status {}", reply.status)
        } else {
            text
        }));
    }

    let nodes = unmarshal_with(&reply.body, &mut flatten_rows)?;
    match status_error(&nodes)? {
        Some(text) => {
            tracing::debug!("Gateway reported failure: {}", text);
            Ok(Reply::Failed(text))
        }
        None => {
            connection.set_transaction_id(transaction_id(&nodes));
            Ok(Reply::Decoded(nodes))
        }
    }
}
