//! Scalar cell values
//!
//! `Value` is the bridge between Arrow arrays and predicate arguments: cells
//! are materialized into values for key construction, range predicates and
//! equality matches. Comparisons are typed: numbers compare numerically,
//! temporal values on the epoch timeline, strings lexicographically. A null
//! never matches any predicate.

use std::cmp::Ordering;

use arrow::array::{
    Array, BooleanArray, Date32Array, Date64Array, Float32Array, Float64Array, Int16Array,
    Int32Array, Int64Array, Int8Array, LargeStringArray, StringArray, TimestampMicrosecondArray,
    TimestampMillisecondArray, TimestampNanosecondArray, TimestampSecondArray, UInt16Array,
    UInt32Array, UInt64Array, UInt8Array,
};
use arrow::datatypes::{DataType, TimeUnit};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{FlatError, Result};

const MICROS_PER_DAY: i64 = 86_400_000_000;

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    /// Days since the Unix epoch
    Date(i32),
    /// Microseconds since the Unix epoch
    Timestamp(i64),
}

impl Value {
    /// Parse a `YYYY-MM-DD` string into a date value
    pub fn parse_date(s: &str) -> Result<Value> {
        let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|e| FlatError::InvalidValue(format!("not a date '{s}': {e}")))?;
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        Ok(Value::Date(date.signed_duration_since(epoch).num_days() as i32))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view: integers and floats only
    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(i) => Some(*i as f64),
            Value::Float64(f) => Some(*f),
            _ => None,
        }
    }

    /// Temporal view: dates collapse to midnight on the epoch timeline
    fn as_micros(&self) -> Option<i64> {
        match self {
            Value::Date(d) => Some(*d as i64 * MICROS_PER_DAY),
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Typed comparison; `None` when the values are not comparable
    /// (mismatched kinds, or either side null).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => {
                if let (Some(a), Some(b)) = (self.as_micros(), other.as_micros()) {
                    return Some(a.cmp(&b));
                }
                match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => None,
                }
            }
        }
    }

    /// Exact-match equality under the same coercion rules as [`compare`](Self::compare)
    pub fn equals(&self, other: &Value) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// Inclusive range membership: `min <= self <= max`
    pub fn in_range(&self, min: &Value, max: &Value) -> bool {
        matches!(
            min.compare(self),
            Some(Ordering::Less) | Some(Ordering::Equal)
        ) && matches!(
            self.compare(max),
            Some(Ordering::Less) | Some(Ordering::Equal)
        )
    }

    /// Canonical token used when building key tuples. Integral floats render
    /// the same as integers so that schema-inference drift between two files
    /// of the same table does not break key matching.
    pub(crate) fn key_token(&self) -> String {
        match self {
            Value::Null => "\u{0}".to_string(),
            Value::Bool(b) => format!("b:{b}"),
            Value::Int64(i) => format!("n:{i}"),
            Value::Float64(f) => {
                if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 {
                    format!("n:{}", *f as i64)
                } else {
                    format!("f:{f}")
                }
            }
            Value::String(s) => format!("s:{s}"),
            Value::Date(d) => format!("d:{d}"),
            Value::Timestamp(t) => format!("t:{t}"),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int64(i) => write!(f, "{i}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Date(d) => {
                let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
                match epoch.checked_add_signed(chrono::Duration::days(*d as i64)) {
                    Some(date) => write!(f, "{}", date.format("%Y-%m-%d")),
                    None => write!(f, "{d}d"),
                }
            }
            Value::Timestamp(t) => match chrono::DateTime::from_timestamp_micros(*t) {
                Some(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.6f")),
                None => write!(f, "{t}us"),
            },
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// Materialize one cell from an Arrow array.
///
/// All integer widths collapse to `Int64`, floats to `Float64`, timestamps to
/// microseconds. Unrecognized types fall back to their display rendering.
pub fn value_at(array: &dyn Array, row: usize) -> Value {
    if array.is_null(row) {
        return Value::Null;
    }
    match array.data_type() {
        DataType::Boolean => {
            Value::Bool(array.as_any().downcast_ref::<BooleanArray>().unwrap().value(row))
        }
        DataType::Int8 => {
            Value::Int64(array.as_any().downcast_ref::<Int8Array>().unwrap().value(row) as i64)
        }
        DataType::Int16 => {
            Value::Int64(array.as_any().downcast_ref::<Int16Array>().unwrap().value(row) as i64)
        }
        DataType::Int32 => {
            Value::Int64(array.as_any().downcast_ref::<Int32Array>().unwrap().value(row) as i64)
        }
        DataType::Int64 => {
            Value::Int64(array.as_any().downcast_ref::<Int64Array>().unwrap().value(row))
        }
        DataType::UInt8 => {
            Value::Int64(array.as_any().downcast_ref::<UInt8Array>().unwrap().value(row) as i64)
        }
        DataType::UInt16 => {
            Value::Int64(array.as_any().downcast_ref::<UInt16Array>().unwrap().value(row) as i64)
        }
        DataType::UInt32 => {
            Value::Int64(array.as_any().downcast_ref::<UInt32Array>().unwrap().value(row) as i64)
        }
        DataType::UInt64 => {
            Value::Int64(array.as_any().downcast_ref::<UInt64Array>().unwrap().value(row) as i64)
        }
        DataType::Float32 => {
            Value::Float64(array.as_any().downcast_ref::<Float32Array>().unwrap().value(row) as f64)
        }
        DataType::Float64 => {
            Value::Float64(array.as_any().downcast_ref::<Float64Array>().unwrap().value(row))
        }
        DataType::Utf8 => {
            Value::String(array.as_any().downcast_ref::<StringArray>().unwrap().value(row).to_string())
        }
        DataType::LargeUtf8 => Value::String(
            array.as_any().downcast_ref::<LargeStringArray>().unwrap().value(row).to_string(),
        ),
        DataType::Date32 => {
            Value::Date(array.as_any().downcast_ref::<Date32Array>().unwrap().value(row))
        }
        DataType::Date64 => Value::Timestamp(
            array.as_any().downcast_ref::<Date64Array>().unwrap().value(row) * 1000,
        ),
        DataType::Timestamp(unit, _) => {
            let micros = match unit {
                TimeUnit::Second => {
                    array.as_any().downcast_ref::<TimestampSecondArray>().unwrap().value(row)
                        * 1_000_000
                }
                TimeUnit::Millisecond => {
                    array.as_any().downcast_ref::<TimestampMillisecondArray>().unwrap().value(row)
                        * 1000
                }
                TimeUnit::Microsecond => {
                    array.as_any().downcast_ref::<TimestampMicrosecondArray>().unwrap().value(row)
                }
                TimeUnit::Nanosecond => {
                    array.as_any().downcast_ref::<TimestampNanosecondArray>().unwrap().value(row)
                        / 1000
                }
            };
            Value::Timestamp(micros)
        }
        _ => {
            // Fallback: display rendering keeps unknown types usable as keys
            let options = FormatOptions::default();
            match ArrayFormatter::try_new(array, &options) {
                Ok(fmt) => Value::String(fmt.value(row).to_string()),
                Err(_) => Value::Null,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_comparison_coerces() {
        assert_eq!(
            Value::Int64(3).compare(&Value::Float64(3.0)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Value::Float64(2.5).compare(&Value::Int64(3)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_null_never_matches() {
        assert_eq!(Value::Null.compare(&Value::Int64(1)), None);
        assert!(!Value::Null.equals(&Value::Null));
        assert!(!Value::Null.in_range(&Value::Int64(0), &Value::Int64(10)));
    }

    #[test]
    fn test_range_is_inclusive() {
        let min = Value::Int64(5);
        let max = Value::Int64(10);
        assert!(Value::Int64(5).in_range(&min, &max));
        assert!(Value::Int64(10).in_range(&min, &max));
        assert!(!Value::Int64(4).in_range(&min, &max));
        assert!(!Value::Int64(11).in_range(&min, &max));
    }

    #[test]
    fn test_date_and_timestamp_share_a_timeline() {
        let day = Value::parse_date("1970-01-02").unwrap();
        assert_eq!(day, Value::Date(1));
        assert_eq!(
            day.compare(&Value::Timestamp(86_400_000_000)),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_key_token_unifies_integral_floats() {
        assert_eq!(Value::Int64(7).key_token(), Value::Float64(7.0).key_token());
        assert_ne!(Value::Int64(7).key_token(), Value::String("7".into()).key_token());
    }

    #[test]
    fn test_incomparable_kinds() {
        assert_eq!(Value::String("5".into()).compare(&Value::Int64(5)), None);
        assert!(!Value::String("a".into()).equals(&Value::Bool(true)));
    }
}
