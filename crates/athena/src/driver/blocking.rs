use tracing::debug;

use super::connect::Session;
use super::poll::{fetch_all_pages, wait_for_completion};
use super::{DriverCursor, QueryExecution, QueryState};
use crate::error::DriverError;
use crate::table::{ColumnDescription, Row};

/// Synchronous driver generation.
///
/// `execute` submits the statement, polls it to a terminal state and pulls
/// the full result set before returning, all on the calling thread.
pub struct BlockingCursor {
    session: Session,
    query_id: Option<String>,
    execution: Option<QueryExecution>,
    columns: Option<Vec<ColumnDescription>>,
    rows: Vec<Row>,
}

impl BlockingCursor {
    pub(crate) fn new(session: Session) -> Self {
        Self {
            session,
            query_id: None,
            execution: None,
            columns: None,
            rows: Vec::new(),
        }
    }
}

impl DriverCursor for BlockingCursor {
    fn execute(&mut self, sql: &str) -> Result<(), DriverError> {
        self.query_id = None;
        self.execution = None;
        self.columns = None;
        self.rows.clear();

        let api = self.session.api.as_ref();
        let query_id = self
            .session
            .runtime
            .block_on(api.start_query_execution(sql, &self.session.context))?;
        self.query_id = Some(query_id.clone());

        self.session.in_flight.start(&query_id);
        let waited = self
            .session
            .runtime
            .block_on(wait_for_completion(api, &query_id, self.session.poll));
        self.session.in_flight.finish();

        let qe = self.execution.insert(waited?);
        if qe.state != QueryState::Succeeded {
            return Err(DriverError::Operational(qe.failure_reason()));
        }

        let (columns, rows) = self
            .session
            .runtime
            .block_on(fetch_all_pages(api, &query_id))?;
        debug!(query_id = %query_id, rows = rows.len(), "Statement complete");
        self.columns = Some(columns);
        self.rows = rows;
        Ok(())
    }

    fn fetchall(&mut self) -> Result<Vec<Row>, DriverError> {
        Ok(std::mem::take(&mut self.rows))
    }

    fn description(&mut self) -> Result<Option<Vec<ColumnDescription>>, DriverError> {
        Ok(self.columns.clone())
    }

    fn cancel(&mut self) -> Result<(), DriverError> {
        match (&self.query_id, self.state()) {
            (Some(query_id), state) if !state.is_some_and(QueryState::is_terminal) => self
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
