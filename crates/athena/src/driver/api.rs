//! The seam between the driver generations and AWS.
//!
//! [`AthenaApi`] exposes the four Athena calls a cursor needs. [`SdkAthenaApi`]
//! implements it over `aws-sdk-athena`; tests substitute
//! [`MockAthenaApi`](super::mock::MockAthenaApi).

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_athena::error::DisplayErrorContext;
use aws_sdk_athena::operation::get_query_results::GetQueryResultsOutput;
use aws_sdk_athena::types::{QueryExecutionContext, QueryExecutionState, ResultConfiguration};
use tracing::{debug, info};

use super::{QueryExecution, QueryState};
use crate::config::AthenaCredentials;
use crate::error::DriverError;
use crate::table::{ColumnDescription, Row};

/// Where and how a statement runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Athena data catalog.
    pub catalog: Option<String>,
    /// Athena database.
    pub database: Option<String>,
    /// S3 location for query results.
    pub output_location: Option<String>,
    pub work_group: Option<String>,
}

impl From<&AthenaCredentials> for ExecutionContext {
    fn from(creds: &AthenaCredentials) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            catalog: non_empty(&creds.database),
            database: non_empty(&creds.schema),
            output_location: non_empty(&creds.s3_staging_dir),
            work_group: creds.work_group.as_deref().and_then(non_empty),
        }
    }
}

/// One page of `GetQueryResults`, with the header echo row already removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPage {
    pub columns: Vec<ColumnDescription>,
    pub rows: Vec<Row>,
    pub next_token: Option<String>,
}

#[async_trait]
pub trait AthenaApi: Send + Sync {
    /// Submit `sql`; returns the query execution id.
    async fn start_query_execution(
        &self,
        sql: &str,
        context: &ExecutionContext,
    ) -> Result<String, DriverError>;

    async fn get_query_execution(&self, query_id: &str) -> Result<QueryExecution, DriverError>;

    /// Fetch one page of results. `next_token == None` requests the first page.
    async fn get_query_results(
        &self,
        query_id: &str,
        next_token: Option<String>,
    ) -> Result<ResultPage, DriverError>;

    async fn stop_query_execution(&self, query_id: &str) -> Result<(), DriverError>;
}

/// [`AthenaApi`] backed by the AWS SDK.
pub struct SdkAthenaApi {
    client: aws_sdk_athena::Client,
}

impl SdkAthenaApi {
    pub fn new(client: aws_sdk_athena::Client) -> Self {
        Self { client }
    }

    /// Load the default AWS credential chain for `region`.
    pub async fn from_region(region: &str) -> Self {
        let region = aws_sdk_athena::config::Region::new(region.to_string());
        let aws_cfg = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;
        Self::new(aws_sdk_athena::Client::new(&aws_cfg))
    }
}

fn sdk_error<E: std::error::Error>(e: E) -> DriverError {
    DriverError::Api(DisplayErrorContext(e).to_string())
}

#[async_trait]
impl AthenaApi for SdkAthenaApi {
    async fn start_query_execution(
        &self,
        sql: &str,
        context: &ExecutionContext,
    ) -> Result<String, DriverError> {
        let mut ctx = QueryExecutionContext::builder();
        if let Some(catalog) = &context.catalog {
            ctx = ctx.catalog(catalog);
        }
        if let Some(database) = &context.database {
            ctx = ctx.database(database);
        }

        let mut request = self
            .client
            .start_query_execution()
            .query_string(sql)
            .query_execution_context(ctx.build());
        if let Some(location) = &context.output_location {
            request = request.result_configuration(
                ResultConfiguration::builder()
                    .output_location(location)
                    .build(),
            );
        }
        if let Some(work_group) = &context.work_group {
            request = request.work_group(work_group);
        }

        let resp = request.send().await.map_err(sdk_error)?;
        let query_id = resp
            .query_execution_id()
            .ok_or_else(|| DriverError::Api("No query execution ID returned".into()))?
            .to_string();

        info!(query_id = %query_id, "Query execution started");
        Ok(query_id)
    }

    async fn get_query_execution(&self, query_id: &str) -> Result<QueryExecution, DriverError> {
        let resp = self
            .client
            .get_query_execution()
            .query_execution_id(query_id)
            .send()
            .await
            .map_err(sdk_error)?;

        let qe = resp
            .query_execution()
            .ok_or_else(|| DriverError::Api("No query execution in response".into()))?;

        Ok(extract_execution(query_id, qe))
    }

    async fn get_query_results(
        &self,
        query_id: &str,
        next_token: Option<String>,
    ) -> Result<ResultPage, DriverError> {
        let first_page = next_token.is_none();
        let output = self
            .client
            .get_query_results()
            .query_execution_id(query_id)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(sdk_error)?;

        parse_page(&output, first_page)
    }

    async fn stop_query_execution(&self, query_id: &str) -> Result<(), DriverError> {
        info!(query_id = %query_id, "Cancelling query");
        self.client
            .stop_query_execution()
            .query_execution_id(query_id)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }
}

/// Convert an SDK `QueryExecution` into ours.
fn extract_execution(query_id: &str, qe: &aws_sdk_athena::types::QueryExecution) -> QueryExecution {
    let stats = qe.statistics();
    let status = qe.status();

    let sdk_state = status.and_then(|s| s.state());
    let unrecognized = sdk_state.filter(|s| {
        !matches!(
            s,
            QueryExecutionState::Queued
                | QueryExecutionState::Running
                | QueryExecutionState::Succeeded
                | QueryExecutionState::Failed
                | QueryExecutionState::Cancelled
        )
    });
    let state_change_reason = status
        .and_then(|s| s.state_change_reason())
        .map(str::to_string)
        .or_else(|| unrecognized.map(|s| format!("unrecognized query state {}", s.as_str())));

    QueryExecution {
        query_id: query_id.to_string(),
        state: sdk_state.map(QueryState::from).unwrap_or(QueryState::Queued),
        state_change_reason,
        bytes_scanned: stats
            .and_then(|s| s.data_scanned_in_bytes())
            .unwrap_or(0) as u64,
        execution_time_ms: stats
            .and_then(|s| s.engine_execution_time_in_millis())
            .unwrap_or(0) as u64,
        output_location: qe
            .result_configuration()
            .and_then(|rc| rc.output_location())
            .map(str::to_string),
    }
}

/// Athena returns column metadata in `ResultSetMetadata` and data rows in
/// `ResultSet.Rows`. On the first page of a SELECT (no `UpdateCount`) the
/// first row echoes the column headers and is skipped.
fn parse_page(output: &GetQueryResultsOutput, first_page: bool) -> Result<ResultPage, DriverError> {
    let result_set = output
        .result_set()
        .ok_or_else(|| DriverError::Parse("No ResultSet in response".into()))?;

    let columns: Vec<ColumnDescription> = result_set
        .result_set_metadata()
        .map(|meta| {
            meta.column_info()
                .iter()
                .map(|ci| ColumnDescription {
                    name: ci.name().to_string(),
                    data_type: ci.r#type().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let raw_rows = result_set.rows();
    let skip = usize::from(first_page && output.update_count().is_none() && !raw_rows.is_empty());

    let rows: Vec<Row> = raw_rows
        .iter()
        .skip(skip)
        .map(|row| {
            row.data()
                .iter()
                .map(|datum| datum.var_char_value().map(str::to_string))
                .collect()
        })
        .collect();

    debug!(columns = columns.len(), rows = rows.len(), "Parsed result page");

    Ok(ResultPage {
        columns,
        rows,
        next_token: output.next_token().map(str::to_string),
    })
}
