use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;
use tracing::debug;

use super::connect::Session;
use super::poll::{fetch_all_pages, wait_for_completion};
use super::{DriverCursor, QueryExecution, QueryState};
use crate::error::DriverError;
use crate::table::{ColumnDescription, Row};

/// A submitted statement whose terminal execution resolves on the worker pool.
pub struct QueryFuture {
    query_id: String,
    handle: JoinHandle<Result<QueryExecution, DriverError>>,
}

impl QueryFuture {
    pub fn query_id(&self) -> &str {
        &self.query_id
    }
}

impl Future for QueryFuture {
    type Output = Result<QueryExecution, DriverError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| {
            joined.unwrap_or_else(|e| Err(DriverError::Api(format!("worker task failed: {e}"))))
        })
    }
}

/// Asynchronous driver generation.
///
/// [`submit`](Self::submit) starts the statement and returns a
/// [`QueryFuture`] that polls it on the connection's worker pool. The
/// [`DriverCursor`] implementation blocks on that future and turns a
/// non-succeeded state into [`DriverError::Operational`]. Results and the
/// description are fetched by query id afterwards.
pub struct AsyncCursor {
    session: Session,
    execution: Option<QueryExecution>,
    query_id: Option<String>,
    description: Option<Vec<ColumnDescription>>,
}

impl AsyncCursor {
    pub(crate) fn new(session: Session) -> Self {
        Self {
            session,
            execution: None,
            query_id: None,
            description: None,
        }
    }

    /// Start `sql` and return a future resolving to its terminal execution.
    pub fn submit(&self, sql: &str) -> Result<QueryFuture, DriverError> {
        let query_id = self
            .session
            .runtime
            .block_on(self.session.api.start_query_execution(sql, &self.session.context))?;

        self.session.in_flight.start(&query_id);
        let api = Arc::clone(&self.session.api);
        let in_flight = self.session.in_flight.clone();
        let poll = self.session.poll;
        let id = query_id.clone();
        let handle = self.session.runtime.spawn(async move {
            let waited = wait_for_completion(api.as_ref(), &id, poll).await;
            in_flight.finish();
            waited
        });

        Ok(QueryFuture { query_id, handle })
    }

    fn succeeded_query_id(&self) -> Option<&str> {
        self.execution
            .as_ref()
            .filter(|qe| qe.state == QueryState::Succeeded)
            .map(|qe| qe.query_id.as_str())
    }
}

impl DriverCursor for AsyncCursor {
    fn execute(&mut self, sql: &str) -> Result<(), DriverError> {
        self.execution = None;
        self.description = None;

        let future = self.submit(sql)?;
        self.query_id = Some(future.query_id().to_string());

        let qe = self.session.runtime.block_on(future)?;
        debug!(query_id = %qe.query_id, state = %qe.state, "Query future resolved");

        let outcome = if qe.state == QueryState::Succeeded {
            Ok(())
        } else {
            Err(DriverError::Operational(qe.failure_reason()))
        };
        self.execution = Some(qe);
        outcome
    }

    fn fetchall(&mut self) -> Result<Vec<Row>, DriverError> {
        let Some(query_id) = self.succeeded_query_id().map(str::to_string) else {
            return Ok(Vec::new());
        };
        let (columns, rows) = self
            .session
            .runtime
            .block_on(fetch_all_pages(self.session.api.as_ref(), &query_id))?;
        self.description.get_or_insert(columns);
        Ok(rows)
    }

    fn description(&mut self) -> Result<Option<Vec<ColumnDescription>>, DriverError> {
        if self.description.is_none() {
            let Some(query_id) = self.succeeded_query_id().map(str::to_string) else {
                return Ok(None);
            };
            let page = self
                .session
                .runtime
                .block_on(self.session.api.get_query_results(&query_id, None))?;
            self.description = Some(page.columns);
        }
        Ok(self.description.clone())
    }

    fn cancel(&mut self) -> Result<(), DriverError> {
        let resolved = self.execution.as_ref().is_some_and(|qe| qe.state.is_terminal());
        match &self.query_id {
            Some(query_id) if !resolved => self
                .session
                .runtime
                .block_on(self.session.api.stop_query_execution(query_id)),
            _ => Ok(()),
        }
    }

    fn query_id(&self) -> Option<&str> {
        self.query_id.as_deref()
    }

    fn execution(&self) -> Option<&QueryExecution> {
        self.execution.as_ref()
    }
}
