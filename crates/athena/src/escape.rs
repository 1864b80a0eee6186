//! Textual parameter binding.
//!
//! Athena performs no server-side binding, so bind values are rendered as SQL
//! literals and interpolated into the statement in place of `%s` placeholders.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};

use crate::error::EscapeError;

/// A typed value to substitute for a `%s` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Decimal(BigDecimal),
    Timestamp(NaiveDateTime),
    /// Accepted from callers but has no literal form here.
    Boolean(bool),
    /// Accepted from callers but has no literal form here.
    Date(NaiveDate),
    /// Accepted from callers but has no literal form here.
    Bytes(Vec<u8>),
}

impl BindValue {
    /// Short name of the value kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            BindValue::Null => "null",
            BindValue::Text(_) => "text",
            BindValue::Integer(_) => "integer",
            BindValue::Float(_) => "float",
            BindValue::Decimal(_) => "decimal",
            BindValue::Timestamp(_) => "timestamp",
            BindValue::Boolean(_) => "boolean",
            BindValue::Date(_) => "date",
            BindValue::Bytes(_) => "bytes",
        }
    }
}

impl From<&str> for BindValue {
    fn from(v: &str) -> Self {
        BindValue::Text(v.to_string())
    }
}

impl From<String> for BindValue {
    fn from(v: String) -> Self {
        BindValue::Text(v)
    }
}

impl From<i64> for BindValue {
    fn from(v: i64) -> Self {
        BindValue::Integer(v)
    }
}

impl From<i32> for BindValue {
    fn from(v: i32) -> Self {
        BindValue::Integer(i64::from(v))
    }
}

impl From<f64> for BindValue {
    fn from(v: f64) -> Self {
        BindValue::Float(v)
    }
}

impl From<BigDecimal> for BindValue {
    fn from(v: BigDecimal) -> Self {
        BindValue::Decimal(v)
    }
}

impl From<NaiveDateTime> for BindValue {
    fn from(v: NaiveDateTime) -> Self {
        BindValue::Timestamp(v)
    }
}

impl From<DateTime<Utc>> for BindValue {
    fn from(v: DateTime<Utc>) -> Self {
        BindValue::Timestamp(v.naive_utc())
    }
}

impl<T: Into<BindValue>> From<Option<T>> for BindValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(BindValue::Null, Into::into)
    }
}

/// Render a bind value as a standalone SQL literal.
pub fn escape(value: &BindValue) -> Result<String, EscapeError> {
    match value {
        BindValue::Null => Ok("NULL".to_string()),
        BindValue::Text(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
        BindValue::Integer(n) => Ok(n.to_string()),
        BindValue::Float(f) if f.is_finite() => Ok(format!("{f:?}")),
        BindValue::Float(_) => Err(EscapeError::Unescapable {
            kind: "non-finite float",
        }),
        BindValue::Decimal(d) => Ok(d.to_string()),
        BindValue::Timestamp(ts) => Ok(format!("TIMESTAMP '{}'", format_timestamp(ts))),
        other => Err(EscapeError::Unescapable { kind: other.kind() }),
    }
}

/// `YYYY-MM-DD HH:MM:SS.mmm`, truncating sub-millisecond precision.
fn format_timestamp(ts: &NaiveDateTime) -> String {
    // Leap seconds report nanoseconds >= 1e9.
    let millis = (ts.nanosecond() % 1_000_000_000) / 1_000_000;
    format!("{}.{millis:03}", ts.format("%Y-%m-%d %H:%M:%S"))
}

/// Substitute escaped `bindings` for the `%s` placeholders of `sql`, in order.
///
/// `%%` renders a literal `%`. Any other directive, or a placeholder count that
/// differs from the number of bindings, is an error. Every binding is escaped
/// before any text is produced, so an unescapable value fails regardless of
/// where it sits.
pub fn format_bindings(sql: &str, bindings: &[BindValue]) -> Result<String, EscapeError> {
    let literals = bindings.iter().map(escape).collect::<Result<Vec<_>, _>>()?;
    let mut literals = literals.into_iter();

    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => {
                let literal = literals.next().ok_or_else(|| {
                    EscapeError::Format("not enough bindings for placeholders".into())
                })?;
                out.push_str(&literal);
            }
            Some('%') => out.push('%'),
            Some(other) => {
                return Err(EscapeError::Format(format!(
                    "unsupported format character '{other}'"
                )))
            }
            None => return Err(EscapeError::Format("incomplete format".into())),
        }
    }

    if literals.next().is_some() {
        return Err(EscapeError::Format(
            "not all bindings converted during formatting".into(),
        ));
    }
    Ok(out)
}
