//! athena-run: run a SQL batch against Athena through the connection manager.
//!
//! Credentials come from `ATHENA_*` environment variables (and `.env`), with
//! an optional profile prefix. The result of the last statement is printed.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use athena_adapter::{
    load_dotenv, AdapterError, AthenaConnectionManager, AthenaConnector, AthenaCredentials,
    Connection, CursorKind, QueryStatus, Table,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Run SQL against AWS Athena.
#[derive(Parser, Debug)]
#[command(name = "athena-run", version, about)]
struct Cli {
    /// SQL batch to run.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    sql: Option<String>,

    /// File containing the SQL batch to run.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Credential profile prefix (e.g. PROD reads PROD_ATHENA_*).
    #[arg(long, env = "ATHENA_ADAPTER_PROFILE", default_value = "")]
    profile: String,

    /// Driver generation: blocking or async.
    #[arg(long)]
    cursor: Option<CursorKind>,

    /// Worker count for the async driver.
    #[arg(long)]
    threads: Option<usize>,

    /// Connection name used in logs.
    #[arg(long, default_value = "athena-run")]
    name: String,

    /// Abridge logged SQL to its first 512 characters.
    #[arg(long)]
    abridge: bool,
}

// ── main ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let sql = match (&cli.sql, &cli.file) {
        (Some(sql), _) => sql.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => anyhow::bail!("one of --sql or --file is required"),
    };

    let mut credentials = AthenaCredentials::from_env_profiled(&cli.profile.to_uppercase());
    if let Some(cursor) = cli.cursor {
        credentials.cursor = cursor;
    }
    if let Some(threads) = cli.threads {
        credentials.threads = threads.max(1);
    }

    let mut manager =
        AthenaConnectionManager::new(AthenaConnector, Connection::new(&cli.name, credentials));

    let outcome = run(&mut manager, &sql, cli.abridge);
    let closed = manager.close();
    let (status, table) = outcome?;
    closed?;

    println!("{table}");
    info!(%status, "athena-run finished");
    println!("{status}");
    Ok(())
}

/// Run the batch and materialize the last statement's result.
fn run(
    manager: &mut AthenaConnectionManager,
    sql: &str,
    abridge: bool,
) -> Result<(QueryStatus, Table), AdapterError> {
    if !abridge {
        return manager.execute(sql, false, true);
    }
    let connection = manager.add_query(sql, false, None, true)?;
    let cursor = connection
        .cursor()
        .ok_or_else(|| AdapterError::Runtime("connection has no cursor".into()))?;
    let status = AthenaConnectionManager::get_status(cursor);
    Ok((status, AthenaConnectionManager::get_result_from_cursor(cursor)?))
}
