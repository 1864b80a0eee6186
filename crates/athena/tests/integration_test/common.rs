//! Shared fixtures.

use athena_adapter::driver::mock::{MockAthenaApi, MockConnector};
use athena_adapter::*;

pub fn credentials(kind: CursorKind) -> AthenaCredentials {
    let mut creds = AthenaCredentials::new("s3://test-bucket/staging/");
    creds.schema = "analytics".to_string();
    creds.cursor = kind;
    creds.threads = 2;
    creds.poll_interval_ms = 1;
    creds
}

pub fn manager_with(connector: MockConnector, kind: CursorKind) -> AthenaConnectionManager {
    AthenaConnectionManager::new(connector, Connection::new("model.jaffle.orders", credentials(kind)))
}

pub fn manager(api: &MockAthenaApi, kind: CursorKind) -> AthenaConnectionManager {
    manager_with(MockConnector::new(api.clone()), kind)
}

pub fn row(cells: &[Option<&str>]) -> Row {
    cells.iter().map(|c| c.map(str::to_string)).collect()
}

pub const KINDS: [CursorKind; 2] = [CursorKind::Blocking, CursorKind::Async];
