//! # Value Normalization
//!
//! Converts raw, untrusted filter operands into the canonical value a column
//! compares against. Every literal that ends up as a bound parameter goes
//! through [`normalize`] first.
//!
//! | Type       | Accepted JSON                                   | Canonical form            |
//! |------------|-------------------------------------------------|---------------------------|
//! | `String`   | string                                          | lower-cased when folding  |
//! | `Integer`  | integral number                                 | `i64`                     |
//! | `Number`   | any finite number                               | `f64`                     |
//! | `Boolean`  | `true`, `false`, `0`, `1`                       | `bool`                    |
//! | `Datetime` | RFC 3339, `YYYY-MM-DD`, epoch millis, `$now`    | `DateTime<Utc>`           |
//! | `Uuid`     | UUID string in any accepted notation            | lower-case hyphenated     |
//!
//! `null` is accepted for every type and stays `null`.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Key of the magic value object, e.g. `{ "$": "$now" }`
const MAGIC_KEY: &str = "$";
const MAGIC_NOW: &str = "$now";

/// Declared comparison type of a filterable column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlValueType {
    String,
    Integer,
    Number,
    Datetime,
    Boolean,
    Uuid,
}

impl SqlValueType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Datetime => "datetime",
            Self::Boolean => "boolean",
            Self::Uuid => "uuid",
        }
    }

    /// Whether `<`, `>` and friends are meaningful for this type
    #[must_use]
    pub const fn is_ordered(self) -> bool {
        !matches!(self, Self::Boolean)
    }
}

impl fmt::Display for SqlValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A filter operand after normalization
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedValue {
    Null,
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Datetime(DateTime<Utc>),
}

impl NormalizedValue {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Converts into the bound parameter type of the query builder.
    ///
    /// Returns `None` for `Null`, which is never bound: it renders as `IS NULL`.
    #[must_use]
    pub fn into_sql_value(self) -> Option<sea_orm::Value> {
        match self {
            Self::Null => None,
            Self::String(s) => Some(s.into()),
            Self::Integer(i) => Some(i.into()),
            Self::Number(n) => Some(n.into()),
            Self::Boolean(b) => Some(b.into()),
            Self::Datetime(d) => Some(d.into()),
        }
    }
}

/// Why a raw operand could not be normalized
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    #[error("cannot compare a {found} with a {expected} column")]
    ShapeMismatch {
        expected: SqlValueType,
        found: &'static str,
    },

    #[error("{0} is not a valid {1}")]
    OutOfRange(String, SqlValueType),

    #[error("`{0}` is not a valid date or datetime")]
    InvalidDate(String),

    #[error("`{0}` is not a valid uuid")]
    InvalidUuid(String),

    #[error("string values are limited to {max} characters")]
    TooLong { max: usize },

    #[error("unsupported magic value `{0}`")]
    UnknownMagic(String),
}

/// Per-column normalization settings
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    /// Lower-case string operands so comparisons are case-insensitive
    pub fold_case: bool,
    pub max_string_length: usize,
    /// Clock used to resolve `$now`
    pub now: DateTime<Utc>,
}

/// Normalize a raw operand against the declared column type.
///
/// # Errors
///
/// Returns a [`ValueError`] when the runtime shape of `raw` does not fit
/// `value_type`, or when a string/number cannot be parsed into it.
pub fn normalize(
    raw: &Value,
    value_type: SqlValueType,
    options: &NormalizeOptions,
) -> Result<NormalizedValue, ValueError> {
    let mismatch = |found| ValueError::ShapeMismatch {
        expected: value_type,
        found,
    };

    match raw {
        Value::Null => Ok(NormalizedValue::Null),
        Value::Object(map) => {
            let date = magic_value(map, options)?.ok_or(mismatch("object"))?;
            match value_type {
                SqlValueType::Datetime => Ok(NormalizedValue::Datetime(date)),
                _ => Err(mismatch("date")),
            }
        }
        Value::Array(_) => Err(mismatch("array")),
        Value::String(s) => normalize_string(s, value_type, options),
        Value::Number(n) => normalize_number(n, value_type),
        Value::Bool(b) => match value_type {
            SqlValueType::Boolean => Ok(NormalizedValue::Boolean(*b)),
            _ => Err(mismatch("boolean")),
        },
    }
}

/// Recognizes `{ "$": "$now" }`. Any other object is not a magic value.
fn magic_value(
    map: &Map<String, Value>,
    options: &NormalizeOptions,
) -> Result<Option<DateTime<Utc>>, ValueError> {
    if map.len() != 1 {
        return Ok(None);
    }
    match map.get(MAGIC_KEY) {
        Some(Value::String(name)) if name == MAGIC_NOW => Ok(Some(options.now)),
        Some(other) => Err(ValueError::UnknownMagic(other.to_string())),
        None => Ok(None),
    }
}

/// Whether `value` is a magic value object rather than an operator object
#[must_use]
pub fn is_magic_value(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| map.len() == 1 && map.contains_key(MAGIC_KEY))
}

fn normalize_string(
    s: &str,
    value_type: SqlValueType,
    options: &NormalizeOptions,
) -> Result<NormalizedValue, ValueError> {
    if s.chars().count() > options.max_string_length {
        return Err(ValueError::TooLong {
            max: options.max_string_length,
        });
    }

    match value_type {
        SqlValueType::String => Ok(NormalizedValue::String(if options.fold_case {
            s.to_lowercase()
        } else {
            s.to_string()
        })),
        SqlValueType::Uuid => Uuid::parse_str(s.trim())
            .map(|id| NormalizedValue::String(id.hyphenated().to_string()))
            .map_err(|_| ValueError::InvalidUuid(s.to_string())),
        SqlValueType::Datetime => parse_datetime(s).map(NormalizedValue::Datetime),
        _ => Err(ValueError::ShapeMismatch {
            expected: value_type,
            found: "string",
        }),
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, ValueError> {
    let trimmed = s.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(date.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ValueError::InvalidDate(s.to_string()))
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::float_cmp
)]
fn integral(n: &serde_json::Number, value_type: SqlValueType) -> Result<i64, ValueError> {
    if let Some(i) = n.as_i64() {
        return Ok(i);
    }
    match n.as_f64() {
        // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => Ok(f as i64),
        _ => Err(ValueError::OutOfRange(n.to_string(), value_type)),
    }
}

fn normalize_number(
    n: &serde_json::Number,
    value_type: SqlValueType,
) -> Result<NormalizedValue, ValueError> {
    match value_type {
        SqlValueType::Integer => integral(n, value_type).map(NormalizedValue::Integer),
        SqlValueType::Number => n
            .as_f64()
            .filter(|f| f.is_finite())
            .map(NormalizedValue::Number)
            .ok_or_else(|| ValueError::OutOfRange(n.to_string(), value_type)),
        SqlValueType::Boolean => match integral(n, value_type) {
            Ok(0) => Ok(NormalizedValue::Boolean(false)),
            Ok(1) => Ok(NormalizedValue::Boolean(true)),
            _ => Err(ValueError::ShapeMismatch {
                expected: value_type,
                found: "number",
            }),
        },
        SqlValueType::Datetime => integral(n, value_type).and_then(|millis| {
            DateTime::from_timestamp_millis(millis)
                .map(NormalizedValue::Datetime)
                .ok_or_else(|| ValueError::InvalidDate(n.to_string()))
        }),
        SqlValueType::String | SqlValueType::Uuid => Err(ValueError::ShapeMismatch {
            expected: value_type,
            found: "number",
        }),
    }
}
