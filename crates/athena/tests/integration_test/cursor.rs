//! Tests for the driver generations behind ConnectionWrapper.

use std::sync::Arc;

use athena_adapter::driver::mock::{MockAthenaApi, MockConnector};
use athena_adapter::driver::{AthenaDriverConnection, DriverConnection, QueryState};
use athena_adapter::*;

use crate::common::{credentials, manager, row, KINDS};

fn wrapper(api: &MockAthenaApi, kind: CursorKind) -> ConnectionWrapper {
    let handle = MockConnector::new(api.clone())
        .connect(&credentials(kind))
        .expect("connect");
    ConnectionWrapper::new(handle)
}

#[test]
fn test_connection_kind_selects_generation() {
    for kind in KINDS {
        let conn =
            AthenaDriverConnection::with_api(&credentials(kind), Arc::new(MockAthenaApi::new()))
                .unwrap();
        assert_eq!(conn.kind(), kind);
    }
}

#[test]
fn test_closed_connection_hands_out_no_cursor() {
    let mut conn = AthenaDriverConnection::with_api(
        &credentials(CursorKind::Blocking),
        Arc::new(MockAthenaApi::new()),
    )
    .unwrap();

    assert!(conn.cursor().is_ok());
    conn.close().unwrap();
    let err = conn.cursor().err().expect("closed connection");
    assert!(matches!(err, DriverError::Connect(_)));
}

#[test]
fn test_both_generations_agree() {
    let mut outcomes = Vec::new();
    for kind in KINDS {
        let api = MockAthenaApi::new();
        api.set_pending_polls(2);
        api.push_result(
            &["k", "v"],
            vec![row(&[Some("a"), Some("1")]), row(&[Some("b"), None])],
        );
        let mut w = wrapper(&api, kind);

        w.execute("SELECT k, v FROM kv", None).unwrap();
        let description = w.description().unwrap().unwrap();
        outcomes.push((
            w.completion_state(),
            description.iter().map(|c| c.name.clone()).collect::<Vec<_>>(),
            w.fetchall(),
        ));
    }
    assert_eq!(outcomes[0], outcomes[1]);
    assert_eq!(outcomes[0].0, Some(QueryState::Succeeded));
}

#[test]
fn test_execute_reuses_current_cursor() {
    let api = MockAthenaApi::new();
    api.push_result(&["x"], vec![row(&[Some("1")])]);
    api.push_result(&["y"], vec![row(&[Some("2")])]);
    let mut w = wrapper(&api, CursorKind::Async);

    w.execute("SELECT 1 AS x", None).unwrap();
    assert_eq!(w.query_id(), Some("query-1"));
    w.execute("SELECT 2 AS y", None).unwrap();
    assert_eq!(w.query_id(), Some("query-2"));

    let names: Vec<_> = w
        .description()
        .unwrap()
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["y"]);
    assert_eq!(w.fetchall(), Some(vec![row(&[Some("2")])]));
}

#[test]
fn test_timed_out_statement_is_stopped() {
    for kind in KINDS {
        let api = MockAthenaApi::new();
        let mut creds = credentials(kind);
        creds.query_timeout_seconds = 1;
        api.set_pending_polls(usize::MAX);
        let handle = MockConnector::new(api.clone()).connect(&creds).unwrap();
        let mut w = ConnectionWrapper::new(handle);

        let err = w.execute("SELECT sleep_forever()", None).unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err}");
        assert_eq!(api.stopped(), vec!["query-1"]);
        assert_eq!(
            AthenaConnectionManager::get_status(&w),
            QueryStatus::Error
        );
    }
}

#[test]
fn test_manager_over_async_pool() {
    let api = MockAthenaApi::new();
    for i in 0..4 {
        api.push_result(&["i"], vec![row(&[Some(i.to_string().as_str())])]);
    }
    let mut mgr = manager(&api, CursorKind::Async);

    let conn = mgr
        .add_query("SELECT 0; SELECT 1; SELECT 2; SELECT 3", false, None, false)
        .unwrap();
    assert_eq!(conn.credentials.threads, 2);

    let cursor = conn.cursor().unwrap();
    assert_eq!(cursor.fetchall(), Some(vec![row(&[Some("3")])]));
    assert_eq!(api.submitted().len(), 4);
}
