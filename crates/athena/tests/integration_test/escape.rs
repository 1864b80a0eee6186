//! Tests for bind value escaping and placeholder substitution.

use std::str::FromStr;

use athena_adapter::*;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;

#[test]
fn test_format_mixed_bindings() {
    let ts = NaiveDate::from_ymd_opt(2025, 1, 15)
        .unwrap()
        .and_hms_milli_opt(10, 30, 0, 250)
        .unwrap();
    let bindings = [
        BindValue::from("O'Brien"),
        BindValue::from(-3i64),
        BindValue::from(0.25f64),
        BindValue::from(BigDecimal::from_str("19.99").unwrap()),
        BindValue::from(ts),
        BindValue::from(None::<i64>),
    ];

    let sql = format_bindings(
        "INSERT INTO t VALUES (%s, %s, %s, %s, %s, %s) -- 100%% done",
        &bindings,
    )
    .unwrap();

    assert_eq!(
        sql,
        "INSERT INTO t VALUES ('O''Brien', -3, 0.25, 19.99, \
         TIMESTAMP '2025-01-15 10:30:00.250', NULL) -- 100% done"
    );
}

#[test]
fn test_unsupported_kinds_are_rejected() {
    let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
    for value in [
        BindValue::Boolean(false),
        BindValue::Date(date),
        BindValue::Bytes(b"raw".to_vec()),
        BindValue::Float(f64::NAN),
        BindValue::Float(f64::INFINITY),
    ] {
        let err = escape(&value).unwrap_err();
        assert!(matches!(err, EscapeError::Unescapable { .. }), "{value:?}");
    }
}

#[test]
fn test_placeholder_count_mismatch() {
    let one = [BindValue::from(1i64)];
    assert!(matches!(
        format_bindings("SELECT %s, %s", &one),
        Err(EscapeError::Format(_))
    ));
    assert!(matches!(
        format_bindings("SELECT 1", &one),
        Err(EscapeError::Format(_))
    ));
    assert!(matches!(
        format_bindings("SELECT %d", &one),
        Err(EscapeError::Format(_))
    ));
}

#[test]
fn test_quote_heavy_text_round_trips_through_literal() {
    for text in ["", "'", "''", "a'b'c", "'); DROP TABLE t; --"] {
        let literal = escape(&BindValue::from(text)).unwrap();
        assert!(literal.starts_with('\'') && literal.ends_with('\''));
        let inner = &literal[1..literal.len() - 1];
        assert_eq!(inner.replace("''", "'"), text);
    }
}
