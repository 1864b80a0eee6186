//! Logical connection lifecycle for the host engine.
//!
//! [`AthenaConnectionManager`] opens and closes a [`Connection`], runs
//! statement batches through its [`ConnectionWrapper`], and translates every
//! driver failure into [`AdapterError`]. Athena has no transactions, so the
//! transaction hooks of [`TransactionControl`] are no-ops.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::config::AthenaCredentials;
use crate::driver::{CancelHandle, Connector, QueryState};
use crate::error::AdapterError;
use crate::escape::BindValue;
use crate::split::split_statements;
use crate::table::Table;
use crate::wrapper::ConnectionWrapper;

/// Characters of SQL kept in the log when abridging.
const ABRIDGED_SQL_CHARS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Closed => f.write_str("closed"),
            ConnectionState::Open => f.write_str("open"),
        }
    }
}

/// A logical connection as seen by the host engine.
#[derive(Debug)]
pub struct Connection {
    pub name: String,
    pub state: ConnectionState,
    pub credentials: Arc<AthenaCredentials>,
    /// Present exactly while the connection is open.
    pub handle: Option<ConnectionWrapper>,
}

impl Connection {
    /// A closed connection; no driver session exists until it is opened.
    pub fn new(name: impl Into<String>, credentials: AthenaCredentials) -> Self {
        Self {
            name: name.into(),
            state: ConnectionState::Closed,
            credentials: Arc::new(credentials),
            handle: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// The cursor of the last executed statement.
    pub fn cursor(&mut self) -> Option<&mut ConnectionWrapper> {
        self.handle.as_mut()
    }
}

/// Uniform outcome of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Ok,
    Error,
}

impl QueryStatus {
    /// Only a SUCCEEDED completion counts as OK; anything else, including no
    /// state at all, is an error.
    pub fn from_state(state: Option<QueryState>) -> Self {
        match state {
            Some(QueryState::Succeeded) => QueryStatus::Ok,
            _ => QueryStatus::Error,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueryStatus::Ok => "OK",
            QueryStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction hooks the host engine calls around statements.
///
/// Athena has no transactions: every hook only records that it was skipped.
pub trait TransactionControl {
    fn begin(&mut self) {
        debug!("NotImplemented: begin");
    }

    fn commit(&mut self) {
        debug!("NotImplemented: commit");
    }

    fn rollback(&mut self) {
        debug!("NotImplemented: rollback");
    }

    fn add_begin_query(&mut self) {
        debug!("NotImplemented: add_begin_query");
    }

    fn add_commit_query(&mut self) {
        debug!("NotImplemented: add_commit_query");
    }
}

pub struct AthenaConnectionManager {
    connector: Box<dyn Connector>,
    connection: Connection,
}

impl AthenaConnectionManager {
    pub const TYPE: &'static str = "athena";

    /// Manage `connection`, opening driver sessions through `connector`.
    pub fn new(connector: impl Connector + 'static, connection: Connection) -> Self {
        Self {
            connector: Box::new(connector),
            connection,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    /// Open the managed connection unless it already is.
    ///
    /// Opening an open connection is a no-op and creates no driver session.
    /// Statements open the connection lazily, so calling this first only
    /// surfaces connect failures early.
    pub fn open(&mut self) -> Result<&mut Connection, AdapterError> {
        open_connection(self.connector.as_ref(), &mut self.connection)
    }

    /// Handle that stops the statement the managed connection is running,
    /// usable from another thread while `add_query` or `execute` blocks.
    /// `None` until the connection is open.
    pub fn cancel_handle(&self) -> Option<CancelHandle> {
        self.connection
            .handle
            .as_ref()
            .map(ConnectionWrapper::cancel_handle)
    }

    /// Close the managed connection and release its driver session.
    pub fn close(&mut self) -> Result<(), AdapterError> {
        let connection = &mut self.connection;
        if let Some(mut handle) = connection.handle.take() {
            translate_failure("close", || handle.close())?;
        }
        connection.state = ConnectionState::Closed;
        debug!(connection = %connection.name, "Connection closed");
        Ok(())
    }

    /// Cancel the running statement, if any. Never fails because nothing is
    /// running or the connection was never opened.
    pub fn cancel(&mut self) -> Result<(), AdapterError> {
        let name = &self.connection.name;
        match self.connection.handle.as_mut() {
            Some(handle) => {
                info!(connection = %name, "Cancelling query");
                translate_failure("cancel", || handle.cancel())
            }
            None => {
                debug!(connection = %name, "No open handle to cancel");
                Ok(())
            }
        }
    }

    /// Normalize the completion state of `cursor` to OK / ERROR.
    pub fn get_status(cursor: &ConnectionWrapper) -> QueryStatus {
        QueryStatus::from_state(cursor.completion_state())
    }

    /// Run a statement batch.
    ///
    /// `sql` is split into statements, each stripped of one trailing `;`.
    /// Statements holding only whitespace and comments are skipped; the rest
    /// run in order with the same `bindings`. The returned connection's
    /// cursor belongs to the last statement that ran. A batch in which no
    /// statement ran is an error.
    pub fn add_query(
        &mut self,
        sql: &str,
        auto_begin: bool,
        bindings: Option<&[BindValue]>,
        abridge_sql_log: bool,
    ) -> Result<&mut Connection, AdapterError> {
        let mut executed = 0usize;
        for statement in split_statements(sql) {
            if statement.is_blank() {
                debug!(statement = statement.text(), "Skipping empty statement");
                continue;
            }
            self.add_single_query(statement.text(), auto_begin, bindings, abridge_sql_log)?;
            executed += 1;
        }

        if executed == 0 {
            return Err(AdapterError::EmptyQuery {
                connection: self.connection.name.clone(),
                sql: sql.to_string(),
            });
        }
        Ok(&mut self.connection)
    }

    /// Run a batch and materialize the result of its last statement.
    ///
    /// Athena results are always prefetched, so the table is built whether
    /// or not `fetch` is set; the flag is kept for the host engine's call
    /// signature.
    pub fn execute(
        &mut self,
        sql: &str,
        auto_begin: bool,
        fetch: bool,
    ) -> Result<(QueryStatus, Table), AdapterError> {
        let connection = self.add_query(sql, auto_begin, None, false)?;
        let cursor = connection
            .cursor()
            .ok_or_else(|| AdapterError::Runtime("connection has no cursor".into()))?;

        let status = Self::get_status(cursor);
        let table = Self::get_result_from_cursor(cursor)?;
        debug!(%status, fetch, rows = table.row_count(), "Statement executed");
        Ok((status, table))
    }

    /// Build a table from the cursor's description and buffered rows.
    pub fn get_result_from_cursor(cursor: &mut ConnectionWrapper) -> Result<Table, AdapterError> {
        match translate_failure("describe", || cursor.description())? {
            Some(columns) => Ok(Table::new(columns, cursor.fetchall().unwrap_or_default())),
            None => Ok(Table::empty()),
        }
    }

    /// Run `f`, translating any failure into [`AdapterError::Runtime`] after
    /// logging the statement and the underlying error.
    pub fn exception_handler<T, E: fmt::Display>(
        sql: &str,
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, AdapterError> {
        f().map_err(|e| {
            debug!("Error while running:\n{sql}");
            debug!(error = %e, "Athena error");
            AdapterError::Runtime(e.to_string())
        })
    }

    fn add_single_query(
        &mut self,
        sql: &str,
        auto_begin: bool,
        bindings: Option<&[BindValue]>,
        abridge_sql_log: bool,
    ) -> Result<(), AdapterError> {
        open_connection(self.connector.as_ref(), &mut self.connection)?;
        if auto_begin {
            self.begin();
        }

        let name = &self.connection.name;
        debug!(connection = %name, "Using {} connection \"{name}\"", Self::TYPE);
        let log_sql: Cow<'_, str> = if abridge_sql_log {
            abridge(sql)
        } else {
            Cow::Borrowed(sql)
        };
        debug!(connection = %name, "On {name}: {log_sql}");

        let started = Instant::now();
        let handle = self
            .connection
            .handle
            .as_mut()
            .ok_or_else(|| AdapterError::Runtime(format!("connection '{name}' is not open")))?;
        Self::exception_handler(sql, || {
            handle.cursor()?.execute(sql, bindings)?;
            Ok::<_, crate::error::CursorError>(())
        })?;

        let execution = handle.execution();
        debug!(
            query_id = handle.query_id().unwrap_or_default(),
            bytes_scanned = execution.map_or(0, |qe| qe.bytes_scanned),
            engine_time_ms = execution.map_or(0, |qe| qe.execution_time_ms),
            output_location = execution
                .and_then(|qe| qe.output_location.as_deref())
                .unwrap_or_default(),
            "SQL status: {} in {:.2} seconds",
            Self::get_status(handle),
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }
}

impl TransactionControl for AthenaConnectionManager {}

impl fmt::Debug for AthenaConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AthenaConnectionManager")
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

fn open_connection<'c>(
    connector: &dyn Connector,
    connection: &'c mut Connection,
) -> Result<&'c mut Connection, AdapterError> {
    if connection.is_open() {
        debug!(connection = %connection.name, "Connection is already open, skipping open.");
        return Ok(connection);
    }

    let handle = translate_failure("open", || connector.connect(&connection.credentials))?;
    connection.handle = Some(ConnectionWrapper::new(handle));
    connection.state = ConnectionState::Open;

    let info = connection
        .credentials
        .connection_info()
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(", ");
    info!(connection = %connection.name, "Opened Athena connection ({info})");
    Ok(connection)
}

/// Like [`AthenaConnectionManager::exception_handler`] for connection
/// operations that carry no statement text.
fn translate_failure<T, E: fmt::Display>(
    operation: &'static str,
    f: impl FnOnce() -> Result<T, E>,
) -> Result<T, AdapterError> {
    f().map_err(|e| {
        debug!(operation, error = %e, "Athena {operation} failed");
        AdapterError::Runtime(e.to_string())
    })
}

fn abridge(sql: &str) -> Cow<'_, str> {
    match sql.char_indices().nth(ABRIDGED_SQL_CHARS) {
        Some((cut, _)) => Cow::Owned(format!("{}...", &sql[..cut])),
        None => Cow::Borrowed(sql),
    }
}
