//! The cursor executor.
//!
//! [`ConnectionWrapper`] owns a driver connection and its single current
//! cursor, and presents the cursor interface the connection manager expects:
//!
//! - results are prefetched in full on `execute`, so a statement has run to
//!   completion by the time `execute` returns, and are handed out once by
//!   `fetchall`
//! - `cancel` lives on the same object as `commit`/`rollback`; a
//!   [`CancelHandle`] reaches a statement while `execute` is blocked on it

use tracing::debug;

use crate::driver::{CancelHandle, DriverConnection, DriverCursor, QueryExecution, QueryState};
use crate::error::CursorError;
use crate::escape::{format_bindings, BindValue};
use crate::manager::TransactionControl;
use crate::table::{ColumnDescription, Row};

pub struct ConnectionWrapper {
    handle: Box<dyn DriverConnection>,
    cursor: Option<Box<dyn DriverCursor>>,
    query_id: Option<String>,
    completion_state: Option<QueryState>,
    execution: Option<QueryExecution>,
    fetch_result: Option<Vec<Row>>,
}

impl ConnectionWrapper {
    pub fn new(handle: Box<dyn DriverConnection>) -> Self {
        Self {
            handle,
            cursor: None,
            query_id: None,
            completion_state: None,
            execution: None,
            fetch_result: None,
        }
    }

    /// Replace the current cursor with a fresh one from the driver.
    ///
    /// Any buffered result of the previous cursor is dropped.
    pub fn cursor(&mut self) -> Result<&mut Self, CursorError> {
        if let Some(mut old) = self.cursor.take() {
            old.close()?;
        }
        self.cursor = Some(self.handle.cursor()?);
        self.query_id = None;
        self.completion_state = None;
        self.execution = None;
        self.fetch_result = None;
        Ok(self)
    }

    /// Run one statement and buffer its full result set.
    ///
    /// With `bindings`, each value is escaped and substituted for the `%s`
    /// placeholders of `sql` in order before submission.
    pub fn execute(
        &mut self,
        sql: &str,
        bindings: Option<&[BindValue]>,
    ) -> Result<&mut Self, CursorError> {
        let sql = match bindings {
            Some(bindings) => format_bindings(sql, bindings)?,
            None => sql.to_string(),
        };

        let cursor = match self.cursor.take() {
            Some(cursor) => cursor,
            None => self.handle.cursor()?,
        };
        let cursor = self.cursor.insert(cursor);

        self.fetch_result = None;
        let executed = cursor.execute(&sql);
        self.query_id = cursor.query_id().map(str::to_string);
        self.completion_state = cursor.state();
        self.execution = cursor.execution().cloned();
        executed?;

        self.fetch_result = Some(cursor.fetchall()?);
        debug!(
            query_id = self.query_id.as_deref().unwrap_or_default(),
            rows = self.fetch_result.as_ref().map_or(0, Vec::len),
            "Buffered result set"
        );
        Ok(self)
    }

    /// Hand out the buffered rows of the last statement.
    ///
    /// Returns `None` before any execution and on every call after the first.
    pub fn fetchall(&mut self) -> Option<Vec<Row>> {
        self.fetch_result.take()
    }

    /// Column descriptions of the last statement.
    pub fn description(&mut self) -> Result<Option<Vec<ColumnDescription>>, CursorError> {
        match self.cursor.as_mut() {
            Some(cursor) => Ok(cursor.description()?),
            None => Ok(None),
        }
    }

    /// Cancel the running statement of the current cursor, if there is one.
    pub fn cancel(&mut self) -> Result<(), CursorError> {
        match self.cursor.as_mut() {
            Some(cursor) => Ok(cursor.cancel()?),
            None => Ok(()),
        }
    }

    pub fn close(&mut self) -> Result<(), CursorError> {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close()?;
        }
        self.fetch_result = None;
        self.handle.close().map_err(CursorError::from)
    }

    /// Driver-assigned id of the last executed statement.
    pub fn query_id(&self) -> Option<&str> {
        self.query_id.as_deref()
    }

    /// Completion state of the last executed statement.
    pub fn completion_state(&self) -> Option<QueryState> {
        self.completion_state
    }

    /// Terminal execution of the last statement, with its scan statistics.
    pub fn execution(&self) -> Option<&QueryExecution> {
        self.execution.as_ref()
    }

    /// Handle that stops the running statement from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.cancel_handle()
    }

    pub fn has_cursor(&self) -> bool {
        self.cursor.is_some()
    }
}

impl TransactionControl for ConnectionWrapper {}

impl std::fmt::Debug for ConnectionWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionWrapper")
            .field("has_cursor", &self.cursor.is_some())
            .field("query_id", &self.query_id)
            .field("completion_state", &self.completion_state)
            .field("buffered_rows", &self.fetch_result.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}
