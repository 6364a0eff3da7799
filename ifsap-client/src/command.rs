//! A single SQL query or PL/SQL call.
//!
//! A command is sent as one `COMMANDS` fragment per iteration: one per
//! binding set in multi-row mode, otherwise exactly one. Iterations are
//! tagged `commandId` (single) or `commandId-index` (multi-row) and the
//! reply is matched back by that tag, so the server may answer in any
//! order.
//!
//! Queries can be paged: [`Command::open_cursor`] sets the page size and
//! allocates a temporary client session, the first execution returns a
//! cursor id per iteration, and [`Command::fetch`] continues every open
//! cursor with a `FETCH` statement until the server stops returning one.

use crate::bindings::{BindingSet, Params};
use crate::connection::Connection;
use crate::error::ClientError;
use crate::exchange::{self, invocation_data, Reply};
use crate::id::new_id;
use crate::response::{Outcome, Response};
use crate::size;
use crate::statement::{self, END_CLIENT_SESSION, FETCH};
use ifsap_marshal::{extract_in, Marker, Node, Predicate, Row, Step, TYPE_LPA};

const NO_RESULT_RECORD: &str = "Error in returned data. I can't find a record with result data.";
const FETCH_NEEDS_SESSION: &str = "Fetch method is available if you used maxRows in a previous query.";
const FETCH_NEEDS_CURSORS: &str =
    "Fetch method is available for a binding array only if every row has an open cursor.";

/// Optional gateway instructions attached to a command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOptions {
    pub generate_outer_block: bool,
    pub debug_context_name: String,
    pub debug_app_stack_frame: String,
    pub debug_bind_info: String,
    pub select_columns: String,
    pub debug_into_info: String,
}

impl CommandOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_generate_outer_block(mut self) -> Self {
        self.generate_outer_block = true;
        self
    }

    pub fn with_debug_context_name(mut self, name: impl Into<String>) -> Self {
        self.debug_context_name = name.into();
        self
    }

    pub fn with_debug_app_stack_frame(mut self, frame: impl Into<String>) -> Self {
        self.debug_app_stack_frame = frame.into();
        self
    }

    pub fn with_debug_bind_info(mut self, info: impl Into<String>) -> Self {
        self.debug_bind_info = info.into();
        self
    }

    pub fn with_select_columns(mut self, columns: impl Into<String>) -> Self {
        self.select_columns = columns.into();
        self
    }

    pub fn with_debug_into_info(mut self, info: impl Into<String>) -> Self {
        self.debug_into_info = info.into();
        self
    }
}

/// One planned iteration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Iteration {
    /// Binding set index; `None` when the command has no bindings.
    pub index: Option<usize>,
    /// Open cursor to continue, or empty.
    pub cursor: String,
}

/// A SQL query or PL/SQL call bound to a connection.
#[derive(Debug, Clone)]
pub struct Command {
    connection: Connection,
    statement: String,
    command_id: String,
    bindings: BindingSet,
    options: CommandOptions,
    max_rows: Option<u64>,
    skip_rows: Option<u64>,
    /// Cursor per iteration; empty when closed.
    cursors: Vec<String>,
    /// Temporary client session holding the cursors.
    session_id: String,
    response: Option<Response>,
}

impl Command {
    /// Creates a command; bare calls are wrapped in `BEGIN ... END;`.
    pub fn new(connection: Connection, statement: &str) -> Self {
        Self {
            connection,
            statement: statement::fix_statement(statement),
            command_id: new_id(),
            bindings: BindingSet::new(),
            options: CommandOptions::default(),
            max_rows: None,
            skip_rows: None,
            cursors: Vec::new(),
            session_id: String::new(),
            response: None,
        }
    }

    /// Adds one map of bind variables.
    pub fn with_params(mut self, params: &Params) -> Result<Self, ClientError> {
        self.bindings.add(params);
        self.check_bindings()?;
        Ok(self)
    }

    /// Binds a list of maps; the statement runs once per map.
    pub fn with_rows(mut self, rows: &[Params]) -> Result<Self, ClientError> {
        self.bindings.add_rows(rows);
        self.check_bindings()?;
        Ok(self)
    }

    pub fn with_options(mut self, options: CommandOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_command_id(mut self, command_id: impl Into<String>) -> Self {
        self.command_id = command_id.into();
        self
    }

    /// Limits the rows returned; no session is opened, so the rest of the
    /// result cannot be fetched later.
    pub fn with_max_rows(mut self, max_rows: u64) -> Self {
        self.max_rows = (max_rows > 0).then_some(max_rows);
        self
    }

    pub fn with_skip_rows(mut self, skip_rows: u64) -> Self {
        self.skip_rows = (skip_rows > 0).then_some(skip_rows);
        self
    }

    fn check_bindings(&self) -> Result<(), ClientError> {
        match self
            .bindings
            .names()
            .find(|name| !statement::mentions_binding(&self.statement, name))
        {
            Some(name) => Err(ClientError::UnknownBinding(name.to_string())),
            None => Ok(()),
        }
    }

    /// Pages the result by `max_rows` and allocates the temporary session
    /// that keeps the cursor alive between fetches.
    pub fn open_cursor(&mut self, max_rows: u64) {
        self.max_rows = (max_rows > 0).then_some(max_rows);
        if self.session_id.is_empty() {
            self.session_id = new_id();
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn command_id(&self) -> &str {
        &self.command_id
    }

    pub fn bindings(&self) -> &BindingSet {
        &self.bindings
    }

    pub fn options(&self) -> &CommandOptions {
        &self.options
    }

    pub fn is_multi_row(&self) -> bool {
        self.bindings.is_multi_row()
    }

    pub fn max_rows(&self) -> Option<u64> {
        self.max_rows
    }

    pub fn skip_rows(&self) -> Option<u64> {
        self.skip_rows
    }

    /// Temporary client session id; empty when none is open.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn cursor_ids(&self) -> &[String] {
        &self.cursors
    }

    /// Whether any iteration has an open cursor.
    pub fn partial_result(&self) -> bool {
        self.cursors.iter().any(|c| !c.is_empty())
    }

    pub fn executed(&self) -> bool {
        self.response.is_some()
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    fn iteration_count(&self) -> usize {
        self.bindings.len().max(1)
    }

    /// Tag of iteration `index` in the request and reply.
    pub fn iteration_id(&self, index: Option<usize>) -> String {
        match index {
            Some(i) if self.is_multi_row() => format!("{}-{}", self.command_id, i),
            _ => self.command_id.clone(),
        }
    }

    /// Iterations to send: all of them, or only those with an open cursor.
    pub(crate) fn plan(&self, fetching: bool) -> Vec<Iteration> {
        let indexes: Vec<Option<usize>> = if self.bindings.is_empty() {
            vec![None]
        } else {
            (0..self.bindings.len()).map(Some).collect()
        };
        indexes
            .into_iter()
            .filter_map(|index| {
                let cursor = if fetching {
                    self.cursors.get(index.unwrap_or(0)).cloned().unwrap_or_default()
                } else {
                    String::new()
                };
                (!fetching || !cursor.is_empty()).then_some(Iteration { index, cursor })
            })
            .collect()
    }

    fn force_in(&self) -> bool {
        statement::is_select(&self.statement)
    }

    fn bind_variables(&self, iteration: &Iteration) -> Option<&crate::bindings::Bindings> {
        iteration
            .index
            .and_then(|i| self.bindings.get(i))
            .filter(|b| !b.is_empty())
    }

    fn fragment(&self, iteration: &Iteration) -> Node {
        let mut data = Vec::new();
        let statement = if iteration.cursor.is_empty() {
            self.statement.as_str()
        } else {
            FETCH
        };
        data.push(lpa("STATEMENT", statement));

        if let Some(bindings) = self.bind_variables(iteration) {
            data.push(
                Node::new("BIND_VARIABLES")
                    .with_type(ifsap_marshal::TYPE_BINARY)
                    .with_children(bindings.to_nodes(self.force_in())),
            );
        }
        if self.options.generate_outer_block {
            data.push(Node::new("GENERATE_OUTER_BLOCK").with_type("B").with_text("TRUE"));
        }
        for (name, value) in [
            ("DEBUG_CONTEXT_NAME", &self.options.debug_context_name),
            ("DEBUG_APP_STACK_FRAME", &self.options.debug_app_stack_frame),
            ("DEBUG_BIND_INFO", &self.options.debug_bind_info),
        ] {
            if !value.is_empty() {
                data.push(lpa(name, value));
            }
        }
        if self.wants_result_record(iteration) {
            data.push(lpa("RESULT_RECORD_TYPE", ""));
        }
        if let Some(max_rows) = self.max_rows {
            data.push(Node::new("MAX_ROWS").with_type("I").with_text(max_rows.to_string()));
        }
        if let Some(skip_rows) = self.skip_rows {
            data.push(Node::new("SKIP_ROWS").with_type("I").with_text(skip_rows.to_string()));
        }
        if !iteration.cursor.is_empty() {
            data.push(lpa("CURSOR_ID", &iteration.cursor));
        }
        for (name, value) in [
            ("SELECT_COLUMNS", &self.options.select_columns),
            ("DEBUG_INTO_INFO", &self.options.debug_into_info),
        ] {
            if !value.is_empty() {
                data.push(lpa(name, value));
            }
        }

        Node::new("COMMANDS")
            .with_type("ARRAY")
            .with_status("*")
            .with_children(vec![
                Node::new("DATA")
                    .with_type("COMMAND")
                    .with_status("Create")
                    .with_delimiter(Marker::RowIdentity)
                    .with_text(self.iteration_id(iteration.index)),
                Node::buffer(data),
            ])
    }

    fn fragment_size(&self, iteration: &Iteration) -> usize {
        let statement = if iteration.cursor.is_empty() {
            self.statement.as_str()
        } else {
            FETCH
        };
        let mut data = size::counted("STATEMENT", TYPE_LPA, statement.len());

        if let Some(bindings) = self.bind_variables(iteration) {
            data += size::binary_buffer("BIND_VARIABLES", bindings.encoded_size(self.force_in()));
        }
        if self.options.generate_outer_block {
            data += size::text("GENERATE_OUTER_BLOCK", "B", "TRUE".len());
        }
        for (name, value) in [
            ("DEBUG_CONTEXT_NAME", &self.options.debug_context_name),
            ("DEBUG_APP_STACK_FRAME", &self.options.debug_app_stack_frame),
            ("DEBUG_BIND_INFO", &self.options.debug_bind_info),
            ("SELECT_COLUMNS", &self.options.select_columns),
            ("DEBUG_INTO_INFO", &self.options.debug_into_info),
        ] {
            if !value.is_empty() {
                data += size::counted(name, TYPE_LPA, value.len());
            }
        }
        if self.wants_result_record(iteration) {
            data += size::counted("RESULT_RECORD_TYPE", TYPE_LPA, 0);
        }
        if let Some(max_rows) = self.max_rows {
            data += size::text("MAX_ROWS", "I", size::digits(max_rows));
        }
        if let Some(skip_rows) = self.skip_rows {
            data += size::text("SKIP_ROWS", "I", size::digits(skip_rows));
        }
        if !iteration.cursor.is_empty() {
            data += size::counted("CURSOR_ID", TYPE_LPA, iteration.cursor.len());
        }

        let id_len = self.iteration_id(iteration.index).len();
        let envelope = size::row_identity("DATA", "COMMAND", "Create", id_len) + size::buffer("", data);
        size::field("COMMANDS") + size::field("ARRAY") + size::field("*") + size::BUFFER + envelope
    }

    fn wants_result_record(&self, iteration: &Iteration) -> bool {
        !iteration.cursor.is_empty() || !statement::is_control(&self.statement)
    }

    /// Request fragments and their encoded size.
    pub(crate) fn fragments(&self, fetching: bool) -> (Vec<Node>, usize) {
        let plan = self.plan(fetching);
        let nodes = plan.iter().map(|it| self.fragment(it)).collect();
        let size = plan.iter().map(|it| self.fragment_size(it)).sum();
        (nodes, size)
    }

    /// Maps a decoded reply onto this command's iterations.
    ///
    /// During a fetch, iterations missing from the reply keep their earlier
    /// rows and new rows are appended to them.
    pub(crate) fn map_response(&mut self, nodes: &[Node], fetching: bool) -> Result<Response, ClientError> {
        let arrays: Vec<&Node> = invocation_data(nodes)
            .and_then(|data| data.children())
            .map(|children| {
                children
                    .iter()
                    .filter(|n| n.name == "COMMANDS" && n.type_tag == "ARRAY" && n.is_buffer())
                    .collect()
            })
            .unwrap_or_default();

        let count = self.iteration_count();
        let previous = self.response.take();
        self.cursors.resize(count, String::new());
        let mut outcomes = Vec::with_capacity(count);

        for slot in 0..count {
            let index = (!self.bindings.is_empty()).then_some(slot);
            let id = self.iteration_id(index);
            let earlier = previous
                .as_ref()
                .filter(|_| fetching)
                .and_then(|r| r.outcome(slot))
                .cloned();

            let data = arrays.iter().find_map(|array| {
                extract_in(array, &[Step::from(Predicate::new().name("DATA").value(id.as_str()).next())])
            });
            let Some(data) = data else {
                match earlier {
                    Some(outcome) => {
                        outcomes.push(outcome);
                        continue;
                    }
                    None => {
                        self.cursors.iter_mut().for_each(String::clear);
                        return Ok(Response::error(NO_RESULT_RECORD));
                    }
                }
            };

            let bindings = match extract_in(data, &[Step::named("BIND_VARIABLES")]).and_then(|n| n.children()) {
                Some(columns) => Row::from_nodes(columns)?,
                None => Row::new(),
            };
            let mut rows = earlier.map(|o| o.rows).unwrap_or_default();
            if let Some(result) = extract_in(data, &[Step::named("RESULT")]).and_then(|n| n.children()) {
                for row in result {
                    match (row.row(), row.children()) {
                        (Some(row), _) => rows.push(row.clone()),
                        (None, Some(columns)) => rows.push(Row::from_nodes(columns)?),
                        (None, None) => {}
                    }
                }
            }
            let cursor = extract_in(data, &[Step::named("CURSOR_ID")])
                .and_then(|n| n.text())
                .unwrap_or_default()
                .to_string();

            outcomes.push(Outcome {
                bindings,
                rows,
                partial_result: !cursor.is_empty(),
            });
            self.cursors[slot] = cursor;
        }

        Ok(Response::success(outcomes))
    }

    pub(crate) fn store(&mut self, response: Response) -> Response {
        self.response = Some(response.clone());
        response
    }

    async fn run(&mut self, fetching: bool) -> Result<Response, ClientError> {
        let (fragments, size) = self.fragments(fetching);
        let session = (!self.session_id.is_empty()).then(|| self.session_id.clone());
        tracing::debug!(
            "Executing command {} ({} fragment(s), fetching: {})",
            self.command_id,
            fragments.len(),
            fetching
        );

        let response = match exchange::invoke(&self.connection, session.as_deref(), fragments, size).await? {
            Reply::Failed(text) => Response::error(text),
            Reply::Decoded(nodes) => self.map_response(&nodes, fetching)?,
        };
        Ok(self.store(response))
    }

    /// Sends the command and maps the reply.
    pub async fn execute(&mut self) -> Result<Response, ClientError> {
        self.response = None;
        self.cursors.clear();
        self.run(false).await
    }

    /// Continues every open cursor by `rows` more rows.
    ///
    /// Runs the first execution when the command was never executed and
    /// returns the existing response when no cursor is open. Usage errors
    /// leave the stored response untouched.
    pub async fn fetch(&mut self, rows: u64) -> Result<Response, ClientError> {
        if self.session_id.is_empty() {
            return Ok(Response::error(FETCH_NEEDS_SESSION));
        }
        if self.is_multi_row()
            && self.executed()
            && (self.cursors.len() < self.iteration_count() || self.cursors.iter().any(String::is_empty))
        {
            return Ok(Response::error(FETCH_NEEDS_CURSORS));
        }

        self.max_rows = (rows > 0).then_some(rows);
        if self.partial_result() {
            self.run(true).await
        } else if !self.executed() {
            self.execute().await
        } else {
            Ok(self.response.clone().unwrap_or_else(Response::empty))
        }
    }

    /// Ends the temporary session, which closes its cursors.
    pub async fn close_cursor(&mut self) -> Result<Response, ClientError> {
        self.close_temp_session().await
    }

    /// Sends `END_CLIENT_SESSION` for the temporary session, if any.
    ///
    /// Cursor and session state are cleared either way; rows already
    /// fetched stay in [`response`](Self::response).
    pub async fn close_temp_session(&mut self) -> Result<Response, ClientError> {
        if self.session_id.is_empty() {
            return Ok(Response::empty());
        }
        let mut end = Command::new(self.connection.clone(), END_CLIENT_SESSION);
        end.session_id = std::mem::take(&mut self.session_id);
        let response = end.execute().await;

        self.cursors.iter_mut().for_each(String::clear);
        if let Some(current) = self.response.as_mut() {
            current.outcomes.iter_mut().for_each(|o| o.partial_result = false);
        }
        response
    }
}

fn lpa(name: &str, value: &str) -> Node {
    Node::new(name).with_type(TYPE_LPA).with_text(value)
}
