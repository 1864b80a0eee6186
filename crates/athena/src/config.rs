use std::env;

use serde::{Deserialize, Serialize};

const DEFAULT_CATALOG: &str = "awsdatacatalog";
const DEFAULT_SCHEMA: &str = "default";
const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

// ── Env helpers ──────────────────────────────────────────────────

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries `{PROFILE}_{KEY}` first, falls back to `{KEY}`.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        if let Some(v) = env_opt(&format!("{profile}_{key}")) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── CursorKind ───────────────────────────────────────────────────

/// Which driver generation a connection uses. Fixed at open time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorKind {
    /// Statements run inline on the calling thread.
    #[default]
    Blocking,
    /// Statements run on a worker pool; the caller blocks on the returned future.
    Async,
}

impl std::str::FromStr for CursorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blocking" | "sync" => Ok(CursorKind::Blocking),
            "async" => Ok(CursorKind::Async),
            other => Err(format!("unknown cursor kind: {other}")),
        }
    }
}

// ── AthenaCredentials ────────────────────────────────────────────

/// Connection parameters for an Athena logical connection.
///
/// `database` is the Athena data catalog and `schema` the Athena database,
/// matching the host engine's three-level naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AthenaCredentials {
    #[serde(alias = "catalog", default = "default_catalog")]
    pub database: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    /// S3 location for query results.
    #[serde(default)]
    pub s3_staging_dir: String,
    #[serde(default = "default_region")]
    pub region_name: String,
    #[serde(default)]
    pub work_group: Option<String>,
    /// Worker count for the async driver generation.
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default)]
    pub cursor: CursorKind,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Driver-side query timeout; 0 disables it.
    #[serde(default)]
    pub query_timeout_seconds: u64,
}

fn default_catalog() -> String {
    DEFAULT_CATALOG.to_string()
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_threads() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl AthenaCredentials {
    /// Credentials with defaults for everything but the staging location.
    pub fn new(s3_staging_dir: impl Into<String>) -> Self {
        Self {
            database: default_catalog(),
            schema: default_schema(),
            s3_staging_dir: s3_staging_dir.into(),
            region_name: default_region(),
            work_group: None,
            threads: default_threads(),
            cursor: CursorKind::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            query_timeout_seconds: 0,
        }
    }

    /// Build credentials from environment variables.
    ///
    /// Reads `ATHENA_ADAPTER_PROFILE` to determine the profile prefix.
    pub fn from_env() -> Self {
        let profile = env_opt("ATHENA_ADAPTER_PROFILE")
            .map(|s| s.to_uppercase())
            .unwrap_or_default();
        Self::from_env_profiled(&profile)
    }

    /// Build credentials for a specific named profile.
    ///
    /// `ATHENA_REGION` falls back to `AWS_REGION` before using the default.
    pub fn from_env_profiled(profile: &str) -> Self {
        let region_name = profiled_env_opt(profile, "ATHENA_REGION")
            .or_else(|| profiled_env_opt(profile, "AWS_REGION"))
            .unwrap_or_else(default_region);

        Self {
            database: profiled_env_or(profile, "ATHENA_DATABASE", DEFAULT_CATALOG),
            schema: profiled_env_or(profile, "ATHENA_SCHEMA", DEFAULT_SCHEMA),
            s3_staging_dir: profiled_env_or(profile, "ATHENA_S3_STAGING_DIR", ""),
            region_name,
            work_group: profiled_env_opt(profile, "ATHENA_WORK_GROUP"),
            threads: profiled_env_parse(profile, "ATHENA_THREADS", default_threads()).max(1),
            cursor: profiled_env_parse(profile, "ATHENA_CURSOR", CursorKind::default()),
            poll_interval_ms: profiled_env_parse(
                profile,
                "ATHENA_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            ),
            query_timeout_seconds: profiled_env_parse(profile, "ATHENA_QUERY_TIMEOUT_SECONDS", 0),
        }
    }

    /// Fields shown when describing the connection in logs.
    pub fn connection_keys() -> &'static [&'static str] {
        &[
            "s3_staging_dir",
            "database",
            "schema",
            "region_name",
            "work_group",
            "threads",
        ]
    }

    /// `key=value` pairs for [`Self::connection_keys`].
    pub fn connection_info(&self) -> Vec<(&'static str, String)> {
        Self::connection_keys()
            .iter()
            .map(|&key| {
                let value = match key {
                    "s3_staging_dir" => self.s3_staging_dir.clone(),
                    "database" => self.database.clone(),
                    "schema" => self.schema.clone(),
                    "region_name" => self.region_name.clone(),
                    "work_group" => self.work_group.clone().unwrap_or_default(),
                    _ => self.threads.to_string(),
                };
                (key, value)
            })
            .collect()
    }
}

// ── Tests ────────────────────────────────────────────────────────
