//! Scripted transport and gateway reply builders for unit tests.

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::exchange::invocation_data;
use crate::id::new_id;
use crate::statement;
use crate::transport::{HttpReply, HttpRequest, Transport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use ifsap_marshal::{marshal_all, unmarshal, Marker, Node};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Header buffer carrying `STATUS`.
pub fn reply_header(status: &str) -> Node {
    Node::buffer(vec![Node::new("STATUS").with_text(status)])
}

/// A failed reply with an `ERROR/MESSAGE` text.
pub fn error_reply(message: &str) -> Bytes {
    marshal_all(&[Node::buffer(vec![
        Node::new("STATUS").with_text("ERROR"),
        Node::new("ERROR").with_children(vec![Node::new("MESSAGE").with_text(message)]),
    ])])
    .unwrap()
}

/// A result row with one `NAME` column.
pub fn result_row(name: &str) -> Node {
    Node::buffer(vec![Node::new("NAME").with_type("LPT").with_text(name)])
}

/// Echoed result of one command iteration.
#[derive(Debug, Clone, Default)]
pub struct ReplyCommand {
    /// `None` takes the id of the request iteration at the same position.
    id: Option<String>,
    bindings: Vec<Node>,
    rows: Vec<Node>,
    cursor: Option<String>,
}

impl ReplyCommand {
    pub fn new(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Default::default()
        }
    }

    pub fn any() -> Self {
        Self::default()
    }

    pub fn binding(mut self, name: &str, type_tag: &str, value: &str) -> Self {
        self.bindings
            .push(Node::new(name).with_type(type_tag).with_text(value));
        self
    }

    pub fn rows(mut self, rows: Vec<Node>) -> Self {
        self.rows = rows;
        self
    }

    pub fn cursor(mut self, cursor: &str) -> Self {
        self.cursor = Some(cursor.to_string());
        self
    }

    fn into_nodes(self, id: String) -> Vec<Node> {
        let mut data = Vec::new();
        if !self.bindings.is_empty() {
            data.push(
                Node::new("BIND_VARIABLES")
                    .with_type(ifsap_marshal::TYPE_BINARY)
                    .with_children(self.bindings),
            );
        }
        data.push(Node::new("RESULT").with_children(self.rows));
        data.push(match self.cursor {
            Some(cursor) => Node::new("CURSOR_ID").with_type("LPA").with_text(cursor),
            None => Node::new("CURSOR_ID").with_type("LPA").with_null(),
        });
        vec![
            Node::new("DATA")
                .with_type("COMMAND")
                .with_status("Create")
                .with_delimiter(Marker::RowIdentity)
                .with_text(id),
            Node::buffer(data),
        ]
    }
}

fn build_reply(transaction_id: &str, commands: Vec<(String, ReplyCommand)>) -> Bytes {
    let transaction = Node::new("TRANSACTION_ID").with_type("LPT");
    let transaction = if transaction_id.is_empty() {
        transaction.with_null()
    } else {
        transaction.with_text(transaction_id)
    };
    let array = commands
        .into_iter()
        .flat_map(|(id, command)| command.into_nodes(id))
        .collect();
    let body = Node::new("PLSQL_INVOCATION").with_children(vec![
        Node::new("DATA")
            .with_type("PLSQL_INVOCATION")
            .with_status("Create")
            .with_delimiter(Marker::RowIdentity)
            .with_text(new_id()),
        Node::buffer(vec![
            transaction,
            Node::new("COMMANDS").with_type("ARRAY").with_children(array),
        ]),
    ]);
    marshal_all(&[reply_header("DONE"), Node::buffer(vec![body])]).unwrap()
}

/// A `DONE` reply with the given iterations; every id must be explicit.
pub fn command_reply(transaction_id: &str, commands: Vec<ReplyCommand>) -> Bytes {
    let commands = commands
        .into_iter()
        .map(|c| (c.id.clone().unwrap_or_default(), c))
        .collect();
    build_reply(transaction_id, commands)
}

/// `(iteration id, data nodes)` of every command in a request.
pub fn request_commands(request: &HttpRequest) -> Vec<(String, Vec<Node>)> {
    let nodes = unmarshal(&request.body).unwrap();
    let data = invocation_data(&nodes).and_then(|d| d.children()).unwrap_or_default();
    data.iter()
        .filter(|n| n.name == "COMMANDS")
        .filter_map(|n| n.children())
        .flat_map(|array| {
            array.chunks(2).map(|pair| {
                let id = pair[0].text().unwrap_or_default().to_string();
                let data = pair.get(1).and_then(|b| b.children()).unwrap_or_default().to_vec();
                (id, data)
            })
        })
        .collect()
}

/// Data nodes of the `index`-th command in a request.
pub fn command_data(request: &HttpRequest, index: usize) -> Vec<Node> {
    request_commands(request).swap_remove(index).1
}

/// `STATEMENT` text of every command in a request.
pub fn request_statements(request: &HttpRequest) -> Vec<String> {
    request_commands(request)
        .into_iter()
        .filter_map(|(_, data)| {
            data.iter()
                .find(|n| n.name == "STATEMENT")
                .and_then(|n| n.text())
                .map(str::to_string)
        })
        .collect()
}

enum Scripted {
    Reply(HttpReply),
    Commands {
        transaction_id: String,
        commands: Vec<ReplyCommand>,
    },
}

#[derive(Default)]
struct MockState {
    replies: VecDeque<Scripted>,
    requests: Vec<HttpRequest>,
    transaction_id: String,
}

/// Transport that records requests and answers from a script.
///
/// With the script exhausted every request is echoed: one empty result per
/// iteration, plus the configured transaction id unless the request ends a
/// transaction or session.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reply: HttpReply) {
        self.state.lock().replies.push_back(Scripted::Reply(reply));
    }

    pub fn push_reply(&self, body: Bytes) {
        self.push(HttpReply::octet_stream(body));
    }

    /// Queues a `DONE` reply whose anonymous iterations take their ids
    /// from the request.
    pub fn push_commands(&self, transaction_id: &str, commands: Vec<ReplyCommand>) {
        self.state.lock().replies.push_back(Scripted::Commands {
            transaction_id: transaction_id.to_string(),
            commands,
        });
    }

    /// Transaction id carried by echoed replies.
    pub fn echo_transaction(&self, transaction_id: &str) {
        self.state.lock().transaction_id = transaction_id.to_string();
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.lock().requests.clone()
    }

    fn echo(request: &HttpRequest, transaction_id: &str) -> Bytes {
        let closes = request_statements(request)
            .iter()
            .any(|s| statement::is_control(s));
        let transaction_id = if closes { "" } else { transaction_id };
        let commands = request_commands(request)
            .into_iter()
            .map(|(id, _)| (id, ReplyCommand::any()))
            .collect();
        build_reply(transaction_id, commands)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpReply, TransportError> {
        let reply = {
            let mut state = self.state.lock();
            let reply = match state.replies.pop_front() {
                Some(Scripted::Reply(reply)) => reply,
                Some(Scripted::Commands {
                    transaction_id,
                    commands,
                }) => {
                    let ids = request_commands(&request);
                    let commands = commands
                        .into_iter()
                        .enumerate()
                        .map(|(i, c)| {
                            let id = c
                                .id
                                .clone()
                                .or_else(|| ids.get(i).map(|(id, _)| id.clone()))
                                .unwrap_or_default();
                            (id, c)
                        })
                        .collect();
                    HttpReply::octet_stream(build_reply(&transaction_id, commands))
                }
                None => HttpReply::octet_stream(Self::echo(&request, &state.transaction_id)),
            };
            state.requests.push(request);
            reply
        };
        tokio::task::yield_now().await;
        Ok(reply)
    }
}

/// A connection to `ifs.test.com` over a fresh mock transport.
pub fn mock_connection() -> (Connection, MockTransport) {
    let transport = MockTransport::new();
    let config = ConnectionConfig::new("ifs.test.com").with_credentials("ifsapp", "ifsapp");
    (
        Connection::with_transport(config, Arc::new(transport.clone())),
        transport,
    )
}
