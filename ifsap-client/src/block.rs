//! Command batches.
//!
//! A [`CommandBlock`] sends the fragments of all its commands in one
//! request and maps the shared reply back onto each member.

use crate::bindings::Params;
use crate::command::Command;
use crate::connection::Connection;
use crate::error::ClientError;
use crate::exchange::{self, Reply};
use crate::response::Response;
use crate::statement::{self, COMMIT, END_CLIENT_SESSION, ROLLBACK};

/// Many commands, one round trip.
#[derive(Debug, Clone)]
pub struct CommandBlock {
    connection: Connection,
    commands: Vec<Command>,
    in_transaction: bool,
    response: Option<Response>,
}

impl CommandBlock {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            commands: Vec::new(),
            in_transaction: false,
            response: None,
        }
    }

    /// Appends a query; `max_rows` and `skip_rows` page its result.
    pub fn sql(
        &mut self,
        statement: &str,
        params: &Params,
        max_rows: Option<u64>,
        skip_rows: Option<u64>,
    ) -> Result<&mut Command, ClientError> {
        if !statement::is_select(statement) {
            return Err(ClientError::NotSelect(statement.to_string()));
        }
        let command = Command::new(self.connection.clone(), statement)
            .with_params(params)?
            .with_max_rows(max_rows.unwrap_or(0))
            .with_skip_rows(skip_rows.unwrap_or(0));
        Ok(self.push(command))
    }

    /// Appends a PL/SQL block.
    pub fn plsql(&mut self, statement: &str, params: &Params) -> Result<&mut Command, ClientError> {
        if !statement::is_plsql(statement) {
            return Err(ClientError::NotPlSql(statement.to_string()));
        }
        let command = Command::new(self.connection.clone(), statement).with_params(params)?;
        Ok(self.push(command))
    }

    fn push(&mut self, command: Command) -> &mut Command {
        self.commands.push(command);
        let last = self.commands.len() - 1;
        &mut self.commands[last]
    }

    fn keyword(&mut self, keyword: &str) -> &mut Command {
        let command = Command::new(self.connection.clone(), keyword);
        self.push(command)
    }

    /// Marks the block as one transaction.
    pub fn begin_transaction(&mut self) {
        self.in_transaction = true;
    }

    pub fn is_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn commit(&mut self) -> &mut Command {
        self.keyword(COMMIT)
    }

    pub fn rollback(&mut self) -> &mut Command {
        self.keyword(ROLLBACK)
    }

    pub fn end_session(&mut self) -> &mut Command {
        self.keyword(END_CLIENT_SESSION)
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn executed(&self) -> bool {
        self.response.is_some()
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// Sends every member in one request.
    ///
    /// The response carries one outcome per member. It fails when any
    /// member fails, with the error text of the last failing member. Each
    /// member also keeps its own response.
    pub async fn execute(&mut self) -> Result<Response, ClientError> {
        let mut fragments = Vec::new();
        let mut size = 0;
        for command in &self.commands {
            let (nodes, nodes_size) = command.fragments(false);
            fragments.extend(nodes);
            size += nodes_size;
        }
        tracing::debug!(
            "Executing command block: {} command(s), {} fragment(s)",
            self.commands.len(),
            fragments.len()
        );

        let response = match exchange::invoke(&self.connection, None, fragments, size).await? {
            Reply::Failed(text) => {
                for command in &mut self.commands {
                    command.store(Response::error(text.clone()));
                }
                Response::error(text)
            }
            Reply::Decoded(nodes) => {
                let mut outcomes = Vec::with_capacity(self.commands.len());
                let mut failure = None;
                for command in &mut self.commands {
                    let member = command.map_response(&nodes, false)?;
                    let member = command.store(member);
                    if !member.ok {
                        failure = Some(member.error_text.clone());
                    }
                    outcomes.push(member.outcomes.into_iter().next().unwrap_or_default());
                }
                match failure {
                    Some(text) => Response::error(text),
                    None => Response::success(outcomes),
                }
            }
        };
        self.response = Some(response.clone());
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{mock_connection, request_commands, request_statements, result_row, ReplyCommand};
    use ifsap_marshal::{marshal, Datum};

    #[test]
    fn test_statement_kinds() {
        let (conn, _) = mock_connection();
        let mut block = conn.command_block();
        assert!(matches!(
            block.sql("declare", &Params::new(), None, None),
            Err(ClientError::NotSelect(_))
        ));
        assert!(block.sql("select", &Params::new(), None, None).is_ok());
        assert!(block.plsql("declare", &Params::new()).is_ok());
        assert!(matches!(block.plsql("select", &Params::new()), Err(ClientError::NotPlSql(_))));
        assert!(block.sql("select", &Params::new().bind("par1", 1), None, None).is_err());
    }

    #[test]
    fn test_members() {
        let (conn, _) = mock_connection();
        let mut block = conn.command_block();
        block.begin_transaction();
        block.sql("SELECT", &Params::new(), None, None).unwrap();
        block.plsql("DECLARE;", &Params::new()).unwrap();
        block.commit();
        block.rollback();
        block.end_session();

        assert!(block.is_transaction());
        let statements: Vec<_> = block.commands().iter().map(|c| c.statement()).collect();
        assert_eq!(statements, vec!["SELECT", "DECLARE;", "COMMIT", "ROLLBACK", "END_CLIENT_SESSION"]);
    }

    #[test]
    fn test_fragment_size() {
        let (conn, _) = mock_connection();
        let mut block = conn.command_block();
        block
            .sql("SELECT :A FROM dual", &Params::new().bind("A", "x"), Some(10), Some(5))
            .unwrap();
        block
            .plsql("BEGIN :B := :B * 2; END;", &Params::new().bind("B", 21))
            .unwrap();
        block.commit();

        let mut nodes = Vec::new();
        let mut size = 0;
        for command in block.commands() {
            let (fragments, fragments_size) = command.fragments(false);
            nodes.extend(fragments);
            size += fragments_size;
        }
        assert_eq!(nodes.len(), 3);
        assert_eq!(size, marshal(&nodes).unwrap().len() - crate::size::BUFFER);
    }

    #[tokio::test]
    async fn test_execute() {
        let (conn, transport) = mock_connection();
        let mut block = conn.command_block();
        let query = block.sql("SELECT name FROM person", &Params::new(), None, None).unwrap();
        let query_id = query.command_id().to_string();
        let call = block
            .plsql("BEGIN :B := :B * 2; END;", &Params::new().bind("B", 21))
            .unwrap();
        let call_id = call.command_id().to_string();
        block.commit();

        // Out of order; the anonymous entry answers the third command.
        transport.push_commands(
            "",
            vec![
                ReplyCommand::new(&call_id).binding("B", "I", "42"),
                ReplyCommand::new(&query_id).rows(vec![result_row("Alain")]),
                ReplyCommand::any(),
            ],
        );
        let response = block.execute().await.unwrap();
        assert!(response.ok, "{}", response.error_text);
        assert_eq!(response.outcomes.len(), 3);
        assert_eq!(response.outcomes[0].rows.len(), 1);
        assert_eq!(response.outcomes[1].bindings.get("B"), Some(&Datum::Integer(42)));
        assert!(block.executed());

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            request_statements(&requests[0]),
            vec!["SELECT name FROM person", "BEGIN :B := :B * 2; END;", "COMMIT"]
        );
        assert_eq!(request_commands(&requests[0])[1].0, call_id);
    }

    #[tokio::test]
    async fn test_members_keep_responses() {
        let (conn, transport) = mock_connection();
        let mut block = conn.command_block();
        block
            .plsql("BEGIN :B := :B * 2; END;", &Params::new().bind("B", 21))
            .unwrap();
        block.sql("SELECT name FROM person", &Params::new(), None, None).unwrap();

        transport.push_commands(
            "",
            vec![
                ReplyCommand::any().binding("B", "I", "42"),
                ReplyCommand::any().rows(vec![result_row("Alain")]).cursor("CUR-1"),
            ],
        );
        let response = block.execute().await.unwrap();
        assert!(response.ok);

        let call = &block.commands()[0];
        assert!(call.executed());
        assert_eq!(
            call.response().unwrap().outcomes[0].bindings.get("B"),
            Some(&Datum::Integer(42))
        );
        let query = &block.commands()[1];
        assert!(query.executed());
        assert_eq!(query.response().unwrap().rows().len(), 1);
        assert!(query.partial_result());
        assert_eq!(query.cursor_ids(), &["CUR-1".to_string()]);
    }

    #[tokio::test]
    async fn test_members_keep_failure() {
        let (conn, transport) = mock_connection();
        let mut block = conn.command_block();
        block.plsql("BEGIN NULL; END;", &Params::new()).unwrap();
        block.commit();
        transport.push(crate::transport::HttpReply::new(500, Some("text/plain"), "gateway down"));

        let response = block.execute().await.unwrap();
        assert!(!response.ok);
        for command in block.commands() {
            assert!(command.executed());
            assert_eq!(command.response().unwrap().error_text, "gateway down");
        }
    }

    #[tokio::test]
    async fn test_member_failure() {
        let (conn, transport) = mock_connection();
        let mut block = conn.command_block();
        let id = block.plsql("BEGIN NULL; END;", &Params::new()).unwrap().command_id().to_string();
        block.plsql("BEGIN NULL; END;", &Params::new()).unwrap();

        transport.push_commands("", vec![ReplyCommand::new(&id)]);
        let response = block.execute().await.unwrap();
        assert!(!response.ok);
        assert!(response.error_text.contains("can't find a record with result data"));
    }
}
