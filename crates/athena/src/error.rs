//! Error types for each layer of the adapter.
//!
//! Driver and cursor errors stay internal to the connection layer;
//! [`AdapterError`] is the only error callers of the connection manager see.

use std::time::Duration;

/// Errors raised by a driver generation (blocking or async cursor).
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// No driver session could be established.
    #[error("could not connect to Athena: {0}")]
    Connect(String),

    /// The statement reached a terminal state other than SUCCEEDED.
    /// Carries Athena's state change reason.
    #[error("{0}")]
    Operational(String),

    /// The statement did not reach a terminal state in time.
    #[error("query {query_id} timed out after {elapsed:?}")]
    Timeout { query_id: String, elapsed: Duration },

    /// An AWS SDK or worker pool error (stringified).
    #[error("AWS SDK error: {0}")]
    Api(String),

    /// Athena returned a response we could not interpret.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Errors raised while turning bind values into SQL text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EscapeError {
    /// The value kind has no literal representation.
    #[error("cannot escape value of type {kind}")]
    Unescapable { kind: &'static str },

    /// Placeholders and bindings do not line up.
    #[error("cannot format statement: {0}")]
    Format(String),
}

/// Errors at the cursor wrapper boundary.
#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    #[error(transparent)]
    Escape(#[from] EscapeError),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// The caller-facing error surface of the connection manager.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Any driver, cursor or binding failure, translated to text.
    #[error("Runtime Error\n  {0}")]
    Runtime(String),

    /// Every statement of the batch was blank after comment stripping.
    #[error(
        "Tried to run an empty query on model '{connection}'. If you are conditionally \
         running\nsql, eg. in a model hook, make sure your `else` clause contains valid \
         sql!\n\nProvided SQL:\n{sql}"
    )]
    EmptyQuery { connection: String, sql: String },
}
