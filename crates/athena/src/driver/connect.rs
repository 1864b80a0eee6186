use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

use super::api::{AthenaApi, ExecutionContext, SdkAthenaApi};
use super::blocking::BlockingCursor;
use super::future::AsyncCursor;
use super::poll::PollSettings;
use super::{Connector, DriverConnection, DriverCursor};
use crate::config::{AthenaCredentials, CursorKind};
use crate::error::DriverError;

/// Id of the statement a connection is currently waiting on. Clones share
/// the slot.
#[derive(Debug, Clone, Default)]
pub(crate) struct InFlight(Arc<Mutex<Option<String>>>);

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        // The guarded value is a plain id, so a poisoned lock is still usable.
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn start(&self, query_id: &str) {
        *self.lock() = Some(query_id.to_string());
    }

    /// The statement reached a terminal state or was abandoned.
    pub(crate) fn finish(&self) {
        self.lock().take();
    }

    pub(crate) fn current(&self) -> Option<String> {
        self.lock().clone()
    }
}

/// Everything a cursor needs to talk to Athena, shared by all cursors of a
/// connection.
#[derive(Clone)]
pub(crate) struct Session {
    pub(crate) api: Arc<dyn AthenaApi>,
    pub(crate) runtime: Arc<Runtime>,
    pub(crate) context: ExecutionContext,
    pub(crate) poll: PollSettings,
    pub(crate) in_flight: InFlight,
}

impl Session {
    pub(crate) fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            api: Arc::clone(&self.api),
            runtime: Arc::clone(&self.runtime),
            in_flight: self.in_flight.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(api: impl AthenaApi + 'static) -> Self {
        let creds = AthenaCredentials::new("s3://test-bucket/staging/");
        Self {
            api: Arc::new(api),
            runtime: Arc::new(build_runtime(CursorKind::Async, 2).expect("test runtime")),
            context: ExecutionContext::from(&creds),
            poll: PollSettings {
                initial_delay: std::time::Duration::from_millis(1),
                timeout: None,
            },
            in_flight: InFlight::default(),
        }
    }
}

/// Stops the statement a connection is running, from any thread.
///
/// Obtained before a statement starts and moved to another thread; the
/// statement's own `execute` then returns with the CANCELLED state. Must not
/// be used from inside an async context.
#[derive(Clone)]
pub struct CancelHandle {
    api: Arc<dyn AthenaApi>,
    runtime: Arc<Runtime>,
    in_flight: InFlight,
}

impl CancelHandle {
    /// Id of the statement currently running on the connection.
    pub fn in_flight(&self) -> Option<String> {
        self.in_flight.current()
    }

    /// Ask Athena to stop the running statement. Returns `false` when nothing
    /// was running.
    pub fn cancel(&self) -> Result<bool, DriverError> {
        let Some(query_id) = self.in_flight() else {
            debug!("No statement in flight to cancel");
            return Ok(false);
        };
        info!(query_id = %query_id, "Cancelling in-flight query");
        self.runtime
            .block_on(self.api.stop_query_execution(&query_id))?;
        Ok(true)
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

/// Both generations get a worker-driven runtime so a [`CancelHandle`] on
/// another thread can reach the network while the caller is blocked; the
/// blocking generation is given a single worker.
fn build_runtime(kind: CursorKind, threads: usize) -> Result<Runtime, DriverError> {
    let workers = match kind {
        CursorKind::Blocking => 1,
        CursorKind::Async => threads.max(1),
    };
    Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .thread_name("athena-driver")
        .build()
        .map_err(|e| DriverError::Connect(format!("failed to start driver runtime: {e}")))
}

/// A driver session against Athena.
///
/// Owns a tokio runtime sized at open time: one worker for the blocking
/// generation, a `threads`-wide worker pool for the async one. All calls
/// block the caller, so a connection must not be driven from inside another
/// tokio runtime.
pub struct AthenaDriverConnection {
    session: Session,
    kind: CursorKind,
    closed: bool,
}

impl AthenaDriverConnection {
    /// Connect using the default AWS credential chain for `credentials.region_name`.
    pub fn open(credentials: &AthenaCredentials) -> Result<Self, DriverError> {
        validate(credentials)?;
        let runtime = build_runtime(credentials.cursor, credentials.threads)?;
        let api = runtime.block_on(SdkAthenaApi::from_region(&credentials.region_name));
        Self::assemble(credentials, Arc::new(api), runtime)
    }

    /// Connect through a caller-supplied [`AthenaApi`].
    pub fn with_api(
        credentials: &AthenaCredentials,
        api: Arc<dyn AthenaApi>,
    ) -> Result<Self, DriverError> {
        validate(credentials)?;
        let runtime = build_runtime(credentials.cursor, credentials.threads)?;
        Self::assemble(credentials, api, runtime)
    }

    fn assemble(
        credentials: &AthenaCredentials,
        api: Arc<dyn AthenaApi>,
        runtime: Runtime,
    ) -> Result<Self, DriverError> {
        info!(
            region = %credentials.region_name,
            schema = %credentials.schema,
            cursor = ?credentials.cursor,
            threads = credentials.threads,
            "Athena driver connection established"
        );
        Ok(Self {
            session: Session {
                api,
                runtime: Arc::new(runtime),
                context: ExecutionContext::from(credentials),
                poll: PollSettings::from(credentials),
                in_flight: InFlight::default(),
            },
            kind: credentials.cursor,
            closed: false,
        })
    }

    pub fn kind(&self) -> CursorKind {
        self.kind
    }
}

fn validate(credentials: &AthenaCredentials) -> Result<(), DriverError> {
    let has_work_group = credentials
        .work_group
        .as_deref()
        .is_some_and(|wg| !wg.is_empty());
    if credentials.s3_staging_dir.is_empty() && !has_work_group {
        return Err(DriverError::Connect(
            "one of s3_staging_dir or work_group must be specified".into(),
        ));
    }
    Ok(())
}

impl DriverConnection for AthenaDriverConnection {
    fn cursor(&mut self) -> Result<Box<dyn DriverCursor>, DriverError> {
        if self.closed {
            return Err(DriverError::Connect("connection is closed".into()));
        }
        let session = self.session.clone();
        Ok(match self.kind {
            CursorKind::Blocking => Box::new(BlockingCursor::new(session)),
            CursorKind::Async => Box::new(AsyncCursor::new(session)),
        })
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.session.cancel_handle()
    }

    fn close(&mut self) -> Result<(), DriverError> {
        // Athena has no server-side session to tear down.
        self.closed = true;
        Ok(())
    }
}

/// Production [`Connector`]: one [`AthenaDriverConnection`] per open.
#[derive(Debug, Clone, Copy, Default)]
pub struct AthenaConnector;

impl Connector for AthenaConnector {
    fn connect(
        &self,
        credentials: &AthenaCredentials,
    ) -> Result<Box<dyn DriverConnection>, DriverError> {
        Ok(Box::new(AthenaDriverConnection::open(credentials)?))
    }
}
