//! Connection and transaction orchestration.
//!
//! A [`Connection`] is a cheap, cloneable handle over shared state: the
//! configuration, the transport, and the session state that changes as
//! commands run (transaction id, client session id, execution state).
//!
//! With autocommit on, every standalone PL/SQL call is followed by a
//! `COMMIT` (or `ROLLBACK` on failure) whenever the server opened a
//! transaction. A call made while another one is still in flight runs on a
//! forked connection with its own session, so the two never share a
//! transaction.

use crate::block::CommandBlock;
use crate::bindings::Params;
use crate::command::Command;
use crate::config::{basic_authorization, ConnectionConfig};
use crate::error::ClientError;
use crate::exchange::RequestContext;
use crate::id::new_id;
use crate::response::Response;
use crate::statement::{self, COMMIT, END_CLIENT_SESSION, ROLLBACK};
use crate::transport::{HttpTransport, Transport};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Whether an autocommit PL/SQL call is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionState {
    #[default]
    Idle,
    InFlight,
}

#[derive(Debug, Default)]
struct State {
    authorization: String,
    run_as: String,
    transaction_id: String,
    client_session_id: String,
    execution: ExecutionState,
}

struct Inner {
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    state: Mutex<State>,
}

/// Handle to a gateway connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Connection")
            .field("endpoint", &self.inner.config.endpoint)
            .field("transaction_id", &state.transaction_id)
            .field("client_session_id", &state.client_session_id)
            .field("execution", &state.execution)
            .finish()
    }
}

/// Resets the execution state when dropped.
struct InFlightGuard<'a> {
    connection: &'a Connection,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.connection.inner.state.lock().execution = ExecutionState::Idle;
    }
}

impl Connection {
    /// Creates a connection over HTTP(S).
    pub fn new(config: ConnectionConfig) -> Self {
        let transport = Arc::new(HttpTransport::new(config.tls.clone()));
        Self::with_transport(config, transport)
    }

    /// Creates a connection over a caller-supplied transport.
    pub fn with_transport(config: ConnectionConfig, transport: Arc<dyn Transport>) -> Self {
        let state = State {
            authorization: config.authorization(),
            run_as: config.run_as.clone(),
            ..Default::default()
        };
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                state: Mutex::new(state),
            }),
        }
    }

    /// Loads the configuration from file and environment, then connects
    /// over HTTP(S).
    pub fn from_env() -> Result<Self, ClientError> {
        let config = ConnectionConfig::load()?;
        config.validate()?;
        Ok(Self::new(config))
    }

    /// A new connection with the same configuration, credentials and
    /// run-as identity, but no session or transaction.
    pub fn fork(&self) -> Self {
        self.fork_with(self.inner.config.clone())
    }

    fn fork_with(&self, config: ConnectionConfig) -> Self {
        let (authorization, run_as) = {
            let state = self.inner.state.lock();
            (state.authorization.clone(), state.run_as.clone())
        };
        let forked = Self::with_transport(config, self.inner.transport.clone());
        {
            let mut state = forked.inner.state.lock();
            state.authorization = authorization;
            state.run_as = run_as;
        }
        forked
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &dyn Transport {
        self.inner.transport.as_ref()
    }

    /// Replaces the credentials; the client session is dropped.
    pub fn set_credentials(&self, user: &str, password: &str) {
        let mut state = self.inner.state.lock();
        state.authorization = basic_authorization(user, password);
        state.client_session_id.clear();
    }

    pub fn authorization(&self) -> String {
        self.inner.state.lock().authorization.clone()
    }

    /// Changes the run-as identity; the client session is dropped.
    pub fn set_run_as(&self, run_as: &str) {
        let mut state = self.inner.state.lock();
        state.run_as = run_as.to_string();
        state.client_session_id.clear();
    }

    pub fn run_as(&self) -> String {
        self.inner.state.lock().run_as.clone()
    }

    pub fn transaction_id(&self) -> String {
        self.inner.state.lock().transaction_id.clone()
    }

    pub(crate) fn set_transaction_id(&self, transaction_id: String) {
        self.inner.state.lock().transaction_id = transaction_id;
    }

    pub fn is_transaction_active(&self) -> bool {
        !self.inner.state.lock().transaction_id.is_empty()
    }

    /// Client session id, created on first use.
    pub fn client_session_id(&self) -> String {
        let mut state = self.inner.state.lock();
        if state.client_session_id.is_empty() {
            state.client_session_id = new_id();
        }
        state.client_session_id.clone()
    }

    /// Whether a client session id has been handed out.
    pub fn has_session(&self) -> bool {
        !self.inner.state.lock().client_session_id.is_empty()
    }

    pub fn execution_state(&self) -> ExecutionState {
        self.inner.state.lock().execution
    }

    /// Everything a request needs from this connection.
    ///
    /// `session_override` replaces the client session id, for commands
    /// that hold a temporary session.
    pub(crate) fn request_context(&self, session_override: Option<&str>) -> RequestContext {
        let client_session_id = match session_override {
            Some(id) => id.to_string(),
            None => self.client_session_id(),
        };
        let config = &self.inner.config;
        let state = self.inner.state.lock();
        RequestContext {
            url: config.invoke_url(),
            authorization: state.authorization.clone(),
            client_id: config.client_id.clone(),
            locale: config.effective_locale().to_string(),
            run_as: state.run_as.clone(),
            debug: config.debug,
            timeout: config.timeout(),
            transaction_id: state.transaction_id.clone(),
            client_session_id,
        }
    }

    fn begin_execution(&self) -> Option<InFlightGuard<'_>> {
        let mut state = self.inner.state.lock();
        match state.execution {
            ExecutionState::Idle => {
                state.execution = ExecutionState::InFlight;
                Some(InFlightGuard { connection: self })
            }
            ExecutionState::InFlight => None,
        }
    }

    /// A command on this connection; nothing is validated or sent.
    pub fn command(&self, statement: &str) -> Command {
        Command::new(self.clone(), statement)
    }

    /// An empty batch on this connection.
    pub fn command_block(&self) -> CommandBlock {
        CommandBlock::new(self.clone())
    }

    /// Runs a query and returns the executed command.
    ///
    /// With `max_rows` set the result is paged: the command holds an open
    /// cursor and [`Command::fetch`] returns the following pages.
    pub async fn sql(
        &self,
        statement: &str,
        params: &Params,
        max_rows: Option<u64>,
        skip_rows: Option<u64>,
    ) -> Result<Command, ClientError> {
        if !statement::is_select(statement) {
            return Err(ClientError::NotSelect(statement.to_string()));
        }
        let mut command = self
            .command(statement)
            .with_params(params)?
            .with_skip_rows(skip_rows.unwrap_or(0));
        if let Some(max_rows) = max_rows.filter(|n| *n > 0) {
            command.open_cursor(max_rows);
        }
        command.execute().await?;
        Ok(command)
    }

    /// Runs a PL/SQL block, committing or rolling back afterwards when
    /// autocommit is on.
    pub async fn plsql(&self, statement: &str, params: &Params) -> Result<Response, ClientError> {
        if !statement::is_plsql(statement) {
            return Err(ClientError::NotPlSql(statement.to_string()));
        }
        if !self.inner.config.auto_commit {
            return self.command(statement).with_params(params)?.execute().await;
        }

        match self.begin_execution() {
            Some(_guard) => {
                let mut response = self.command(statement).with_params(params)?.execute().await?;
                if self.is_transaction_active() {
                    let closing = if response.ok {
                        self.commit().await?
                    } else {
                        self.rollback().await?
                    };
                    if !closing.ok {
                        response.append_error(&closing.error_text);
                    }
                }
                Ok(response)
            }
            None => {
                tracing::warn!("Connection busy, running PL/SQL call on a forked connection");
                let fork = self.fork();
                let mut response = fork.command(statement).with_params(params)?.execute().await?;

                let mut block = fork.command_block();
                if fork.is_transaction_active() {
                    if response.ok {
                        block.commit();
                    } else {
                        block.rollback();
                    }
                }
                block.end_session();
                let closing = block.execute().await?;
                if !closing.ok {
                    response.append_error(&closing.error_text);
                }
                Ok(response)
            }
        }
    }

    /// A forked connection with autocommit off; its transaction stays open
    /// until [`commit`](Self::commit) or [`rollback`](Self::rollback).
    pub fn begin_transaction(&self) -> Connection {
        let mut config = self.inner.config.clone();
        config.auto_commit = false;
        self.fork_with(config)
    }

    async fn close_transaction(&self, statement: &str) -> Result<Response, ClientError> {
        if !self.is_transaction_active() {
            return Ok(Response::empty());
        }
        let response = self.command(statement).execute().await?;
        if self.is_transaction_active() {
            tracing::debug!("Transaction still open after {}", statement);
        }
        Ok(response)
    }

    /// Commits the open transaction; succeeds locally when there is none.
    pub async fn commit(&self) -> Result<Response, ClientError> {
        self.close_transaction(COMMIT).await
    }

    /// Rolls back the open transaction; succeeds locally when there is none.
    pub async fn rollback(&self) -> Result<Response, ClientError> {
        self.close_transaction(ROLLBACK).await
    }

    /// Ends the client session, if one was started.
    pub async fn end_session(&self) -> Result<Response, ClientError> {
        let result = if self.has_session() {
            self.command(END_CLIENT_SESSION).execute().await
        } else {
            Ok(Response::empty())
        };
        {
            let mut state = self.inner.state.lock();
            state.client_session_id.clear();
            state.transaction_id.clear();
        }
        result
    }
}
