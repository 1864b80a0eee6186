//! Driver layer: the capability interface the connection wrapper talks to,
//! and the two Athena driver generations that implement it.
//!
//! - [`BlockingCursor`] runs each statement to completion inline and raises
//!   on failure, like a classic DB-API cursor.
//! - [`AsyncCursor`] submits statements to a worker pool and hands back a
//!   future; its `execute` blocks on that future and inspects the resolved
//!   state.
//!
//! The generation is chosen once per connection from
//! [`AthenaCredentials::cursor`](crate::config::AthenaCredentials::cursor).

use std::fmt;

use aws_sdk_athena::types::QueryExecutionState;
use serde::{Deserialize, Serialize};

use crate::config::AthenaCredentials;
use crate::error::DriverError;
use crate::table::{ColumnDescription, Row};

pub mod api;
pub mod blocking;
pub mod connect;
pub mod future;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
mod poll;

pub use api::{AthenaApi, ExecutionContext, ResultPage, SdkAthenaApi};
pub use blocking::BlockingCursor;
pub use connect::{AthenaConnector, AthenaDriverConnection, CancelHandle};
pub use future::{AsyncCursor, QueryFuture};
pub use poll::PollSettings;

/// Completion state of a submitted statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl QueryState {
    /// `true` once the statement can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            QueryState::Succeeded | QueryState::Failed | QueryState::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueryState::Queued => "QUEUED",
            QueryState::Running => "RUNNING",
            QueryState::Succeeded => "SUCCEEDED",
            QueryState::Failed => "FAILED",
            QueryState::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&QueryExecutionState> for QueryState {
    fn from(state: &QueryExecutionState) -> Self {
        match state {
            QueryExecutionState::Running => QueryState::Running,
            QueryExecutionState::Succeeded => QueryState::Succeeded,
            QueryExecutionState::Failed => QueryState::Failed,
            QueryExecutionState::Cancelled => QueryState::Cancelled,
            QueryExecutionState::Queued => QueryState::Queued,
            // A state this client does not know can never be waited out.
            _ => QueryState::Failed,
        }
    }
}

/// Snapshot of a query execution as reported by Athena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryExecution {
    pub query_id: String,
    pub state: QueryState,
    /// Athena's explanation for the current state, set on failure.
    pub state_change_reason: Option<String>,
    pub bytes_scanned: u64,
    pub execution_time_ms: u64,
    pub output_location: Option<String>,
}

impl QueryExecution {
    /// Reason to report when the execution did not succeed.
    pub fn failure_reason(&self) -> String {
        self.state_change_reason
            .clone()
            .unwrap_or_else(|| format!("query {} finished in state {}", self.query_id, self.state))
    }
}

/// The uniform cursor capability both driver generations provide.
pub trait DriverCursor: Send {
    /// Run `sql` to completion. Fails with [`DriverError::Operational`] when
    /// the statement does not succeed.
    fn execute(&mut self, sql: &str) -> Result<(), DriverError>;

    /// All rows of the last statement's result set.
    fn fetchall(&mut self) -> Result<Vec<Row>, DriverError>;

    /// Column descriptions of the last statement, if it produced a result set.
    fn description(&mut self) -> Result<Option<Vec<ColumnDescription>>, DriverError>;

    /// Best-effort cancellation of the last submitted statement.
    fn cancel(&mut self) -> Result<(), DriverError>;

    /// Driver-assigned id of the last submitted statement.
    fn query_id(&self) -> Option<&str>;

    /// Completion state of the last submitted statement.
    fn state(&self) -> Option<QueryState> {
        self.execution().map(|qe| qe.state)
    }

    /// Terminal execution of the last statement, if it resolved.
    fn execution(&self) -> Option<&QueryExecution>;

    fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

/// A physical driver session.
pub trait DriverConnection: Send {
    fn cursor(&mut self) -> Result<Box<dyn DriverCursor>, DriverError>;

    /// Handle that stops whichever statement this connection is running.
    fn cancel_handle(&self) -> CancelHandle;

    fn close(&mut self) -> Result<(), DriverError>;
}

/// Factory for driver sessions.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        credentials: &AthenaCredentials,
    ) -> Result<Box<dyn DriverConnection>, DriverError>;
}
