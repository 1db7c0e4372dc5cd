//! Dynamic row values
//!
//! Ordering for sorts:
//! - null < boolean < number < date < string
//! - integers and doubles compare numerically with each other
//! - same type compares naturally

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::{CodecError, CodecResult, Input, Output};

const TAG_NULL: u8 = 0;
const TAG_BOOLEAN: u8 = 1;
const TAG_INTEGER: u8 = 2;
const TAG_DOUBLE: u8 = 3;
const TAG_STRING: u8 = 4;
const TAG_DATE: u8 = 5;

/// A single typed value flowing through extraction, grouping and sorting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Val {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    /// Compared, hashed and encoded at millisecond precision
    Date(DateTime<Utc>),
}

impl Val {
    pub fn is_null(&self) -> bool {
        matches!(self, Val::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Val::Integer(_) | Val::Double(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Val::Integer(i) => Some(*i as f64),
            Val::Double(d) => Some(*d),
            Val::Date(d) => Some(d.timestamp_millis() as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Val::Integer(i) => Some(*i),
            Val::Double(d) if d.fract() == 0.0 => Some(*d as i64),
            Val::Date(d) => Some(d.timestamp_millis()),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Null => "null",
            Val::Boolean(_) => "boolean",
            Val::Integer(_) => "integer",
            Val::Double(_) => "double",
            Val::String(_) => "string",
            Val::Date(_) => "date",
        }
    }

    fn type_order(&self) -> u8 {
        match self {
            Val::Null => 0,
            Val::Boolean(_) => 1,
            Val::Integer(_) | Val::Double(_) => 2,
            Val::Date(_) => 3,
            Val::String(_) => 4,
        }
    }

    /// Total ordering used by sorts and min/max.
    pub fn compare(&self, other: &Val) -> Ordering {
        let type_cmp = self.type_order().cmp(&other.type_order());
        if type_cmp != Ordering::Equal {
            return type_cmp;
        }

        match (self, other) {
            (Val::Boolean(a), Val::Boolean(b)) => a.cmp(b),
            (Val::Integer(a), Val::Integer(b)) => a.cmp(b),
            (Val::String(a), Val::String(b)) => a.cmp(b),
            (Val::Date(a), Val::Date(b)) => a.timestamp_millis().cmp(&b.timestamp_millis()),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => Ordering::Equal,
            },
        }
    }

    /// Numeric addition with null as identity. Non-numeric operands yield null.
    pub fn add(&self, other: &Val) -> Val {
        match (self, other) {
            (Val::Null, v) | (v, Val::Null) if v.is_numeric() || v.is_null() => v.clone(),
            (Val::Integer(a), Val::Integer(b)) => match a.checked_add(*b) {
                Some(sum) => Val::Integer(sum),
                None => Val::Double(*a as f64 + *b as f64),
            },
            (a, b) => match (a.is_numeric(), b.is_numeric()) {
                (true, true) => Val::Double(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0)),
                _ => Val::Null,
            },
        }
    }

    pub fn write(&self, out: &mut Output) -> CodecResult<()> {
        match self {
            Val::Null => out.write_u8(TAG_NULL),
            Val::Boolean(b) => {
                out.write_u8(TAG_BOOLEAN);
                out.write_bool(*b);
            }
            Val::Integer(i) => {
                out.write_u8(TAG_INTEGER);
                out.write_i64(*i);
            }
            Val::Double(d) => {
                out.write_u8(TAG_DOUBLE);
                out.write_f64(*d);
            }
            Val::String(s) => {
                out.write_u8(TAG_STRING);
                out.write_string(s)?;
            }
            Val::Date(d) => {
                out.write_u8(TAG_DATE);
                out.write_i64(d.timestamp_millis());
            }
        }
        Ok(())
    }

    pub fn read(input: &mut Input<'_>) -> CodecResult<Val> {
        let tag = input.read_u8()?;
        Ok(match tag {
            TAG_NULL => Val::Null,
            TAG_BOOLEAN => Val::Boolean(input.read_bool()?),
            TAG_INTEGER => Val::Integer(input.read_i64()?),
            TAG_DOUBLE => Val::Double(input.read_f64()?),
            TAG_STRING => Val::String(input.read_string()?),
            TAG_DATE => {
                let millis = input.read_i64()?;
                match Utc.timestamp_millis_opt(millis).single() {
                    Some(date) => Val::Date(date),
                    None => return Err(CodecError::InvalidTag { what: "date", tag }),
                }
            }
            tag => return Err(CodecError::InvalidTag { what: "value", tag }),
        })
    }
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::Null, Val::Null) => true,
            (Val::Boolean(a), Val::Boolean(b)) => a == b,
            (Val::Integer(a), Val::Integer(b)) => a == b,
            (Val::Double(a), Val::Double(b)) => a.to_bits() == b.to_bits(),
            (Val::String(a), Val::String(b)) => a == b,
            (Val::Date(a), Val::Date(b)) => a.timestamp_millis() == b.timestamp_millis(),
            _ => false,
        }
    }
}

impl Eq for Val {}

impl Hash for Val {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Val::Null => {}
            Val::Boolean(b) => b.hash(state),
            Val::Integer(i) => i.hash(state),
            Val::Double(d) => d.to_bits().hash(state),
            Val::String(s) => s.hash(state),
            Val::Date(d) => d.timestamp_millis().hash(state),
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Null => Ok(()),
            Val::Boolean(b) => write!(f, "{}", b),
            Val::Integer(i) => write!(f, "{}", i),
            Val::Double(d) => write!(f, "{}", d),
            Val::String(s) => f.write_str(s),
            Val::Date(d) => f.write_str(&d.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

impl From<&serde_json::Value> for Val {
    fn from(value: &serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Val::Null,
            Value::Bool(b) => Val::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Val::Integer(i),
                None => n.as_f64().map(Val::Double).unwrap_or(Val::Null),
            },
            Value::String(s) => Val::String(s.clone()),
            other => Val::String(other.to_string()),
        }
    }
}

impl From<bool> for Val {
    fn from(value: bool) -> Self {
        Val::Boolean(value)
    }
}

impl From<i64> for Val {
    fn from(value: i64) -> Self {
        Val::Integer(value)
    }
}

impl From<f64> for Val {
    fn from(value: f64) -> Self {
        Val::Double(value)
    }
}

impl From<&str> for Val {
    fn from(value: &str) -> Self {
        Val::String(value.to_string())
    }
}

impl From<String> for Val {
    fn from(value: String) -> Self {
        Val::String(value)
    }
}

impl From<DateTime<Utc>> for Val {
    fn from(value: DateTime<Utc>) -> Self {
        Val::Date(value)
    }
}
