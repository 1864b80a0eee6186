//! In-memory stand-ins for Athena, for tests that exercise the full
//! connection stack without AWS credentials.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::api::{AthenaApi, ExecutionContext, ResultPage};
use super::connect::AthenaDriverConnection;
use super::{Connector, DriverConnection, QueryExecution, QueryState};
use crate::config::AthenaCredentials;
use crate::error::DriverError;
use crate::table::{ColumnDescription, Row};

#[derive(Debug, Clone)]
enum Outcome {
    Success {
        columns: Vec<ColumnDescription>,
        rows: Vec<Row>,
    },
    Failure(String),
}

#[derive(Debug)]
struct Execution {
    outcome: Outcome,
    pending_polls: usize,
    cancelled: bool,
}

#[derive(Debug, Default)]
struct MockState {
    queued: VecDeque<Outcome>,
    executions: HashMap<String, Execution>,
    submitted: Vec<String>,
    contexts: Vec<ExecutionContext>,
    stopped: Vec<String>,
    pending_polls: usize,
    page_size: Option<usize>,
    polls: usize,
    result_calls: usize,
}

/// Scripted [`AthenaApi`]. Clones share state.
///
/// Statements consume queued outcomes in submission order; once the queue is
/// empty every statement succeeds with an empty result set.
#[derive(Debug, Clone, Default)]
pub struct MockAthenaApi {
    state: Arc<Mutex<MockState>>,
}

impl MockAthenaApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful statement returning `rows` under varchar `columns`.
    pub fn push_result(&self, columns: &[&str], rows: Vec<Row>) {
        let columns = columns
            .iter()
            .map(|name| ColumnDescription {
                name: name.to_string(),
                data_type: "varchar".to_string(),
            })
            .collect();
        self.lock().queued.push_back(Outcome::Success { columns, rows });
    }

    /// Queue a statement that fails with `reason`.
    pub fn push_failure(&self, reason: &str) {
        self.lock().queued.push_back(Outcome::Failure(reason.to_string()));
    }

    /// Number of RUNNING polls each statement reports before finishing.
    pub fn set_pending_polls(&self, polls: usize) {
        self.lock().pending_polls = polls;
    }

    /// Split results into pages of `size` rows.
    pub fn set_page_size(&self, size: usize) {
        self.lock().page_size = Some(size.max(1));
    }

    /// SQL text of every submitted statement, in order.
    pub fn submitted(&self) -> Vec<String> {
        self.lock().submitted.clone()
    }

    /// Execution context of every submitted statement, in order.
    pub fn contexts(&self) -> Vec<ExecutionContext> {
        self.lock().contexts.clone()
    }

    /// Query ids passed to `stop_query_execution`.
    pub fn stopped(&self) -> Vec<String> {
        self.lock().stopped.clone()
    }

    pub fn polls(&self) -> usize {
        self.lock().polls
    }

    pub fn result_calls(&self) -> usize {
        self.lock().result_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

fn not_found(query_id: &str) -> DriverError {
    DriverError::Api(format!("unknown query execution {query_id}"))
}

#[async_trait]
impl AthenaApi for MockAthenaApi {
    async fn start_query_execution(
        &self,
        sql: &str,
        context: &ExecutionContext,
    ) -> Result<String, DriverError> {
        let mut state = self.lock();
        state.submitted.push(sql.to_string());
        state.contexts.push(context.clone());

        let outcome = state.queued.pop_front().unwrap_or(Outcome::Success {
            columns: Vec::new(),
            rows: Vec::new(),
        });
        let query_id = format!("query-{}", state.submitted.len());
        let pending_polls = state.pending_polls;
        state.executions.insert(
            query_id.clone(),
            Execution {
                outcome,
                pending_polls,
                cancelled: false,
            },
        );
        Ok(query_id)
    }

    async fn get_query_execution(&self, query_id: &str) -> Result<QueryExecution, DriverError> {
        let mut state = self.lock();
        state.polls += 1;
        let exec = state
            .executions
            .get_mut(query_id)
            .ok_or_else(|| not_found(query_id))?;

        let (query_state, reason) = if exec.cancelled {
            (QueryState::Cancelled, Some("Query cancelled by user".to_string()))
        } else if exec.pending_polls > 0 {
            exec.pending_polls -= 1;
            (QueryState::Running, None)
        } else {
            match &exec.outcome {
                Outcome::Success { .. } => (QueryState::Succeeded, None),
                Outcome::Failure(reason) => (QueryState::Failed, Some(reason.clone())),
            }
        };

        Ok(QueryExecution {
            query_id: query_id.to_string(),
            state: query_state,
            state_change_reason: reason,
            bytes_scanned: 0,
            execution_time_ms: 0,
            output_location: Some(format!("s3://test-bucket/staging/{query_id}.csv")),
        })
    }

    async fn get_query_results(
        &self,
        query_id: &str,
        next_token: Option<String>,
    ) -> Result<ResultPage, DriverError> {
        let mut state = self.lock();
        state.result_calls += 1;
        let page_size = state.page_size;
        let exec = state
            .executions
            .get(query_id)
            .ok_or_else(|| not_found(query_id))?;

        let Outcome::Success { columns, rows } = &exec.outcome else {
            return Err(DriverError::Api(format!("query {query_id} has no results")));
        };

        let offset: usize = match next_token {
            Some(token) => token
                .parse()
                .map_err(|_| DriverError::Api(format!("bad next token {token}")))?,
            None => 0,
        };
        let end = page_size.map_or(rows.len(), |size| (offset + size).min(rows.len()));

        Ok(ResultPage {
            columns: columns.clone(),
            rows: rows[offset.min(end)..end].to_vec(),
            next_token: (end < rows.len()).then(|| end.to_string()),
        })
    }

    async fn stop_query_execution(&self, query_id: &str) -> Result<(), DriverError> {
        let mut state = self.lock();
        state.stopped.push(query_id.to_string());
        if let Some(exec) = state.executions.get_mut(query_id) {
            exec.cancelled = true;
        }
        Ok(())
    }
}

/// [`Connector`] that wires real driver connections to a [`MockAthenaApi`].
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    api: MockAthenaApi,
    connects: Arc<Mutex<usize>>,
    fail_with: Option<String>,
}

impl MockConnector {
    pub fn new(api: MockAthenaApi) -> Self {
        Self {
            api,
            ..Self::default()
        }
    }

    /// A connector whose every connect attempt fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn api(&self) -> &MockAthenaApi {
        &self.api
    }

    /// Number of driver sessions created so far.
    pub fn connects(&self) -> usize {
        *self.connects.lock().unwrap()
    }
}

impl Connector for MockConnector {
    fn connect(
        &self,
        credentials: &AthenaCredentials,
    ) -> Result<Box<dyn DriverConnection>, DriverError> {
        if let Some(message) = &self.fail_with {
            return Err(DriverError::Connect(message.clone()));
        }
        *self.connects.lock().unwrap() += 1;
        let conn = AthenaDriverConnection::with_api(credentials, Arc::new(self.api.clone()))?;
        Ok(Box::new(conn))
    }
}
