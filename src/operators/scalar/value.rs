use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use ordered_float::OrderedFloat;

use crate::datatypes::DataType;

/// Supported scalar values.
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(OrderedFloat<f64>),
    String(String),
}

impl ScalarValue {
    /// Returns the type of this scalar value.
    pub fn data_type(&self) -> DataType {
        match self {
            ScalarValue::Null => DataType::Null,
            ScalarValue::Bool(_) => DataType::Bool,
            ScalarValue::Int32(_) => DataType::Int32,
            ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::Float64(_) => DataType::Float64,
            ScalarValue::String(_) => DataType::String,
        }
    }

    /// Returns `true` if this is a NULL value.
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Converts a numeric value to `f64`. Returns `None` for non numeric values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Int32(v) => Some(*v as f64),
            ScalarValue::Int64(v) => Some(*v as f64),
            ScalarValue::Float64(v) => Some(v.0),
            _ => None,
        }
    }

    /// Compares two values using SQL semantics: NULLs are incomparable and
    /// numeric values of different types are compared by their numeric value.
    pub fn sql_cmp(&self, other: &ScalarValue) -> Option<Ordering> {
        match (self, other) {
            (ScalarValue::Null, _) | (_, ScalarValue::Null) => None,
            (ScalarValue::Bool(l), ScalarValue::Bool(r)) => Some(l.cmp(r)),
            (ScalarValue::String(l), ScalarValue::String(r)) => Some(l.cmp(r)),
            (ScalarValue::Int32(l), ScalarValue::Int32(r)) => Some(l.cmp(r)),
            (ScalarValue::Int64(l), ScalarValue::Int64(r)) => Some(l.cmp(r)),
            (l, r) => match (l.as_f64(), r.as_f64()) {
                (Some(l), Some(r)) => OrderedFloat(l).partial_cmp(&OrderedFloat(r)),
                _ => None,
            },
        }
    }
}

impl Display for ScalarValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Bool(value) => write!(f, "{}", value),
            ScalarValue::Int32(value) => write!(f, "{}", value),
            ScalarValue::Int64(value) => write!(f, "{}", value),
            ScalarValue::Float64(value) => write!(f, "{}", value),
            ScalarValue::String(value) => write!(f, "'{}'", value),
        }
    }
}
