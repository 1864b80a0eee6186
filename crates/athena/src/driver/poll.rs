use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use super::api::AthenaApi;
use super::QueryExecution;
use crate::config::AthenaCredentials;
use crate::error::DriverError;
use crate::table::{ColumnDescription, Row};

const MAX_DELAY_MS: u64 = 2000;
const BACKOFF_FACTOR: f64 = 1.5;

/// Backoff and timeout for status polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub initial_delay: Duration,
    /// `None` polls until a terminal state.
    pub timeout: Option<Duration>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            timeout: None,
        }
    }
}

impl From<&AthenaCredentials> for PollSettings {
    fn from(creds: &AthenaCredentials) -> Self {
        Self {
            // A zero interval would leave only jitter between polls.
            initial_delay: Duration::from_millis(creds.poll_interval_ms.max(1)),
            timeout: (creds.query_timeout_seconds > 0)
                .then(|| Duration::from_secs(creds.query_timeout_seconds)),
        }
    }
}

/// Poll `GetQueryExecution` with exponential backoff until the query reaches
/// a terminal state. The terminal execution is returned whatever its state;
/// callers decide what a failure means.
///
/// On timeout the query is stopped (best effort) and
/// [`DriverError::Timeout`] is returned.
pub(crate) async fn wait_for_completion(
    api: &dyn AthenaApi,
    query_id: &str,
    settings: PollSettings,
) -> Result<QueryExecution, DriverError> {
    let start = Instant::now();
    let mut delay_ms = (settings.initial_delay.as_millis() as u64).max(1);

    loop {
        let qe = api.get_query_execution(query_id).await?;

        debug!(
            query_id = %query_id,
            state = %qe.state,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Polling query status"
        );

        if qe.state.is_terminal() {
            return Ok(qe);
        }

        if let Some(timeout) = settings.timeout {
            if start.elapsed() > timeout {
                warn!(query_id = %query_id, ?timeout, "Query timed out, cancelling");
                // Best-effort cancel; the timeout is what gets reported.
                let _ = api.stop_query_execution(query_id).await;
                return Err(DriverError::Timeout {
                    query_id: query_id.to_string(),
                    elapsed: start.elapsed(),
                });
            }
        }

        tokio::time::sleep(Duration::from_millis(delay_ms + jitter_ms())).await;
        delay_ms = next_delay(delay_ms);
    }
}

/// Fetch every page of a query's results.
pub(crate) async fn fetch_all_pages(
    api: &dyn AthenaApi,
    query_id: &str,
) -> Result<(Vec<ColumnDescription>, Vec<Row>), DriverError> {
    let first = api.get_query_results(query_id, None).await?;
    let columns = first.columns;
    let mut rows = first.rows;
    let mut next_token = first.next_token;

    while let Some(token) = next_token {
        let page = api.get_query_results(query_id, Some(token)).await?;
        rows.extend(page.rows);
        next_token = page.next_token;
    }

    debug!(query_id = %query_id, rows = rows.len(), "Fetched query results");
    Ok((columns, rows))
}

/// Jitter without rand: nanosecond fraction of the current time, in [0, 100).
fn jitter_ms() -> u64 {
    u64::from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos()
            % 100,
    )
}

fn next_delay(delay_ms: u64) -> u64 {
    ((delay_ms as f64 * BACKOFF_FACTOR).ceil() as u64).min(MAX_DELAY_MS)
}
