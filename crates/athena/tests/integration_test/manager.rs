//! Tests for AthenaConnectionManager: batches, status, errors and lifecycle.

use std::thread;
use std::time::Duration;

use athena_adapter::driver::mock::{MockAthenaApi, MockConnector};
use athena_adapter::*;

use crate::common::{credentials, manager, manager_with, row, KINDS};

// ── Batches ──────────────────────────────────────────────────────────

#[test]
fn test_comment_fragment_is_skipped() {
    for kind in KINDS {
        let api = MockAthenaApi::new();
        api.push_result(&["a"], vec![row(&[Some("1")])]);
        api.push_result(&["b"], vec![row(&[Some("2")])]);
        let mut mgr = manager(&api, kind);

        let conn = mgr
            .add_query("SELECT 1 AS a; -- comment\n; SELECT 2 AS b;", false, None, false)
            .unwrap();

        let cursor = conn.cursor().expect("cursor of last statement");
        assert_eq!(cursor.query_id(), Some("query-2"));
        assert_eq!(cursor.fetchall(), Some(vec![row(&[Some("2")])]));
        assert_eq!(api.submitted(), vec!["SELECT 1 AS a", "SELECT 2 AS b"]);
    }
}

#[test]
fn test_only_non_blank_statements_run() {
    let api = MockAthenaApi::new();
    let mut mgr = manager(&api, CursorKind::Blocking);

    let sql = "CREATE TABLE t (x int);\n\
               /* staging */;\n\
               INSERT INTO t VALUES (1);\n\
               -- trailing note\n;\n\
               SELECT count(*) FROM t;\n";
    mgr.add_query(sql, false, None, false).unwrap();

    assert_eq!(
        api.submitted(),
        vec![
            "CREATE TABLE t (x int)",
            "INSERT INTO t VALUES (1)",
            "SELECT count(*) FROM t"
        ]
    );
}

#[test]
fn test_semicolon_inside_literal_does_not_split() {
    let api = MockAthenaApi::new();
    let mut mgr = manager(&api, CursorKind::Blocking);

    mgr.add_query("SELECT 'a;b' AS s; SELECT 2", false, None, false)
        .unwrap();
    assert_eq!(api.submitted(), vec!["SELECT 'a;b' AS s", "SELECT 2"]);
}

#[test]
fn test_backslash_literal_ends_statement() {
    let api = MockAthenaApi::new();
    let mut mgr = manager(&api, CursorKind::Blocking);

    mgr.add_query("SELECT 'C:\\' AS path; SELECT 2", false, None, false)
        .unwrap();
    assert_eq!(api.submitted(), vec!["SELECT 'C:\\' AS path", "SELECT 2"]);
}

#[test]
fn test_empty_batch_is_an_error() {
    let api = MockAthenaApi::new();
    let connector = MockConnector::new(api.clone());
    let mut mgr = manager_with(connector.clone(), CursorKind::Blocking);

    let sql = "-- nothing to see\n;  ; /* still nothing */";
    let err = mgr.add_query(sql, false, None, false).unwrap_err();

    match &err {
        AdapterError::EmptyQuery { connection, sql: provided } => {
            assert_eq!(connection, "model.jaffle.orders");
            assert_eq!(provided, sql);
        }
        other => panic!("expected EmptyQuery, got {other:?}"),
    }
    assert!(err.to_string().contains("model.jaffle.orders"));
    assert!(api.submitted().is_empty());
    assert_eq!(connector.connects(), 0);
}

#[test]
fn test_same_bindings_apply_to_every_statement() {
    let api = MockAthenaApi::new();
    let mut mgr = manager(&api, CursorKind::Blocking);
    let bindings = [BindValue::from("O'Brien"), BindValue::from(7i64)];

    mgr.add_query(
        "DELETE FROM people WHERE name = %s AND id = %s; \
         INSERT INTO people VALUES (%s, %s)",
        false,
        Some(&bindings[..]),
        false,
    )
    .unwrap();

    assert_eq!(
        api.submitted(),
        vec![
            "DELETE FROM people WHERE name = 'O''Brien' AND id = 7",
            "INSERT INTO people VALUES ('O''Brien', 7)"
        ]
    );
}

#[test]
fn test_unescapable_binding_becomes_runtime_error() {
    let api = MockAthenaApi::new();
    let mut mgr = manager(&api, CursorKind::Blocking);

    let err = mgr
        .add_query("SELECT %s", false, Some(&[BindValue::Boolean(true)][..]), false)
        .unwrap_err();

    assert!(matches!(err, AdapterError::Runtime(ref m) if m.contains("boolean")));
    assert!(api.submitted().is_empty());
}

#[test]
fn test_abridged_logging_does_not_alter_sql() {
    let api = MockAthenaApi::new();
    let mut mgr = manager(&api, CursorKind::Blocking);
    let long = format!("SELECT '{}'", "x".repeat(2000));

    mgr.add_query(&long, false, None, true).unwrap();
    assert_eq!(api.submitted(), vec![long]);
}

// ── Execute ──────────────────────────────────────────────────────────

#[test]
fn test_execute_returns_status_and_table() {
    for kind in KINDS {
        let api = MockAthenaApi::new();
        api.push_result(
            &["id", "name"],
            vec![row(&[Some("1"), Some("alpha")]), row(&[Some("2"), None])],
        );
        let mut mgr = manager(&api, kind);

        let (status, table) = mgr.execute("SELECT id, name FROM t", false, true).unwrap();

        assert_eq!(status, QueryStatus::Ok);
        assert_eq!(status.to_string(), "OK");
        assert_eq!(table.column_names(), vec!["id", "name"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.get_value(0, "name"), Some("alpha"));
        assert_eq!(table.get_value(1, "name"), None);
    }
}

#[test]
fn test_execute_without_fetch_still_materializes() {
    let api = MockAthenaApi::new();
    api.push_result(&["n"], vec![row(&[Some("3")])]);
    let mut mgr = manager(&api, CursorKind::Blocking);

    let (status, table) = mgr.execute("SELECT 3 AS n", false, false).unwrap();
    assert_eq!(status, QueryStatus::Ok);
    assert_eq!(table.row_count(), 1);
}

#[test]
fn test_execute_ddl_gives_empty_table() {
    let api = MockAthenaApi::new();
    let mut mgr = manager(&api, CursorKind::Blocking);

    let (status, table) = mgr.execute("DROP TABLE IF EXISTS t", false, true).unwrap();
    assert_eq!(status, QueryStatus::Ok);
    assert!(table.is_empty());
    assert_eq!(table.column_count(), 0);
}

#[test]
fn test_execute_reads_every_page() {
    for kind in KINDS {
        let api = MockAthenaApi::new();
        api.set_page_size(2);
        let rows: Vec<Row> = (0..5).map(|i| vec![Some(i.to_string())]).collect();
        api.push_result(&["i"], rows.clone());
        let mut mgr = manager(&api, kind);

        let (_, table) = mgr.execute("SELECT i FROM series", false, true).unwrap();
        assert_eq!(table.rows, rows);
    }
}

#[test]
fn test_execute_failure_is_runtime_error() {
    for kind in KINDS {
        let api = MockAthenaApi::new();
        api.push_failure("SYNTAX_ERROR: line 1:8: Column 'nope' cannot be resolved");
        let mut mgr = manager(&api, kind);

        let err = mgr.execute("SELECT nope", false, true).unwrap_err();
        let AdapterError::Runtime(message) = &err else {
            panic!("expected Runtime, got {err:?}");
        };
        assert!(message.contains("Column 'nope' cannot be resolved"));
        assert!(err.to_string().starts_with("Runtime Error"));

        // The failed statement still left its state on the cursor.
        let cursor = mgr.connection_mut().cursor().unwrap();
        assert_eq!(
            AthenaConnectionManager::get_status(cursor),
            QueryStatus::Error
        );
    }
}

#[test]
fn test_statement_waits_for_completion() {
    let api = MockAthenaApi::new();
    api.set_pending_polls(3);
    api.push_result(&["x"], vec![row(&[Some("1")])]);
    let mut mgr = manager(&api, CursorKind::Blocking);

    let (status, _) = mgr.execute("SELECT 1 AS x", false, true).unwrap();
    assert_eq!(status, QueryStatus::Ok);
    assert!(api.polls() >= 4);
}

// ── Cursor results ───────────────────────────────────────────────────

#[test]
fn test_fetchall_consumes_result_once() {
    for kind in KINDS {
        let api = MockAthenaApi::new();
        api.push_result(&["x"], vec![row(&[Some("42")])]);
        let mut mgr = manager(&api, kind);

        let conn = mgr.add_query("SELECT 42 AS x", false, None, false).unwrap();
        let cursor = conn.cursor().unwrap();

        assert_eq!(cursor.fetchall(), Some(vec![row(&[Some("42")])]));
        assert_eq!(cursor.fetchall(), None);

        // Columns survive, rows do not.
        let table = AthenaConnectionManager::get_result_from_cursor(cursor).unwrap();
        assert_eq!(table.column_names(), vec!["x"]);
        assert_eq!(table.row_count(), 0);
    }
}

#[test]
fn test_execution_context_follows_credentials() {
    let api = MockAthenaApi::new();
    let mut mgr = manager(&api, CursorKind::Blocking);

    mgr.add_query("SELECT 1", false, None, false).unwrap();

    let ctx = &api.contexts()[0];
    assert_eq!(ctx.catalog.as_deref(), Some("awsdatacatalog"));
    assert_eq!(ctx.database.as_deref(), Some("analytics"));
    assert_eq!(ctx.output_location.as_deref(), Some("s3://test-bucket/staging/"));
    assert_eq!(ctx.work_group, None);
}

// ── Lifecycle ────────────────────────────────────────────────────────

#[test]
fn test_open_twice_connects_once() {
    let connector = MockConnector::new(MockAthenaApi::new());
    let mut mgr = manager_with(connector.clone(), CursorKind::Blocking);

    let conn = mgr.open().unwrap();
    assert!(conn.is_open());
    assert_eq!(conn.state, ConnectionState::Open);
    assert!(conn.handle.is_some());

    mgr.open().unwrap();
    mgr.add_query("SELECT 1", false, None, false).unwrap();
    assert_eq!(connector.connects(), 1);
}

#[test]
fn test_eager_open_surfaces_connect_failure() {
    let mut mgr = manager_with(
        MockConnector::failing("expired token"),
        CursorKind::Blocking,
    );

    let err = mgr.open().unwrap_err();
    assert!(matches!(err, AdapterError::Runtime(ref m) if m.contains("expired token")));
    assert_eq!(mgr.connection().state, ConnectionState::Closed);
}

#[test]
fn test_connection_reused_across_batches() {
    let api = MockAthenaApi::new();
    let connector = MockConnector::new(api.clone());
    let mut mgr = manager_with(connector.clone(), CursorKind::Async);

    mgr.add_query("SELECT 1", false, None, false).unwrap();
    mgr.add_query("SELECT 2", true, None, false).unwrap();
    mgr.execute("SELECT 3", false, true).unwrap();

    assert_eq!(connector.connects(), 1);
    assert_eq!(api.submitted().len(), 3);
}

#[test]
fn test_connect_failure_is_runtime_error() {
    let mut mgr = manager_with(
        MockConnector::failing("no credentials in chain"),
        CursorKind::Blocking,
    );

    let err = mgr.add_query("SELECT 1", false, None, false).unwrap_err();
    assert!(matches!(err, AdapterError::Runtime(ref m) if m.contains("no credentials in chain")));
    assert!(!mgr.connection().is_open());
    assert!(mgr.connection().handle.is_none());
}

#[test]
fn test_missing_staging_and_work_group_fails_to_open() {
    let api = MockAthenaApi::new();
    let mut creds = credentials(CursorKind::Blocking);
    creds.s3_staging_dir.clear();
    let mut mgr =
        AthenaConnectionManager::new(MockConnector::new(api.clone()), Connection::new("c", creds));

    let err = mgr.add_query("SELECT 1", false, None, false).unwrap_err();
    assert!(matches!(err, AdapterError::Runtime(ref m) if m.contains("work_group")));

    mgr.connection_mut().credentials = std::sync::Arc::new(AthenaCredentials {
        s3_staging_dir: String::new(),
        work_group: Some("primary".into()),
        ..credentials(CursorKind::Blocking)
    });
    mgr.add_query("SELECT 1", false, None, false).unwrap();
    assert_eq!(api.contexts()[0].work_group.as_deref(), Some("primary"));
}

#[test]
fn test_cancel_before_any_cursor() {
    let api = MockAthenaApi::new();
    let mut mgr = manager(&api, CursorKind::Async);

    // Never opened.
    mgr.cancel().unwrap();
    assert!(mgr.cancel_handle().is_none());

    // Opened, but no statement ran yet.
    mgr.open().unwrap();
    assert!(!mgr.connection_mut().cursor().unwrap().has_cursor());
    mgr.cancel().unwrap();
    assert!(!mgr.cancel_handle().unwrap().cancel().unwrap());

    assert!(api.stopped().is_empty());
}

#[test]
fn test_cancel_running_statement_from_another_thread() {
    for kind in KINDS {
        let api = MockAthenaApi::new();
        api.set_pending_polls(usize::MAX);
        let mut mgr = manager(&api, kind);
        mgr.open().unwrap();

        let cancel = mgr.cancel_handle().unwrap();
        let canceller = thread::spawn(move || loop {
            if cancel.cancel().unwrap() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        });

        let err = mgr
            .add_query("SELECT count(*) FROM huge_table", false, None, false)
            .unwrap_err();
        canceller.join().unwrap();

        assert!(matches!(err, AdapterError::Runtime(ref m) if m.contains("cancelled")));
        assert_eq!(api.stopped(), vec!["query-1"]);
        let cursor = mgr.connection_mut().cursor().unwrap();
        assert_eq!(cursor.completion_state(), Some(QueryState::Cancelled));
        assert_eq!(
            AthenaConnectionManager::get_status(cursor),
            QueryStatus::Error
        );
    }
}

#[test]
fn test_cancel_after_completion_is_noop() {
    for kind in KINDS {
        let api = MockAthenaApi::new();
        let mut mgr = manager(&api, kind);

        mgr.add_query("SELECT 1", false, None, false).unwrap();
        mgr.cancel().unwrap();
        assert!(api.stopped().is_empty());
    }
}

#[test]
fn test_close_releases_handle() {
    let api = MockAthenaApi::new();
    let mut mgr = manager(&api, CursorKind::Blocking);

    mgr.add_query("SELECT 1", false, None, false).unwrap();
    assert!(mgr.connection().is_open());

    mgr.close().unwrap();
    assert_eq!(mgr.connection().state, ConnectionState::Closed);
    assert!(mgr.connection_mut().cursor().is_none());
}

#[test]
fn test_transaction_hooks_do_nothing() {
    let api = MockAthenaApi::new();
    let mut mgr = manager(&api, CursorKind::Blocking);

    mgr.add_query("SELECT 1", true, None, false).unwrap();
    mgr.begin();
    mgr.commit();
    mgr.rollback();

    let cursor = mgr.connection_mut().cursor().unwrap();
    cursor.begin();
    cursor.commit();
    cursor.rollback();

    assert_eq!(api.submitted(), vec!["SELECT 1"]);
}

// ── Real AWS Tests (ignored by default) ──────────────────────────────

/// This test requires valid AWS credentials and network access.
///
/// Run with: `cargo test test_real_athena_query -- --ignored`
///
/// Set `ATHENA_S3_STAGING_DIR` (or `ATHENA_WORK_GROUP`) and make AWS
/// credentials available to the default chain before running.
#[test]
#[ignore]
fn test_real_athena_query() {
    load_dotenv();
    let creds = AthenaCredentials::from_env();
    let mut mgr = AthenaConnectionManager::new(AthenaConnector, Connection::new("real", creds));

    let (status, table) = mgr
        .execute("SELECT 1 AS test_column", false, true)
        .expect("Query execution failed");

    assert_eq!(status, QueryStatus::Ok);
    assert_eq!(table.get_value(0, "test_column"), Some("1"));
    println!("{table}");

    mgr.close().unwrap();
}
