//! Data types.

use std::fmt::{Display, Formatter};

/// Data types supported in scalar expressions and column definitions.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DataType {
    Null,
    Bool,
    Int32,
    Int64,
    Float64,
    String,
}

impl DataType {
    /// Estimated width of a value of this type in bytes.
    /// Used by the cost model to estimate the amount of data moved between workers.
    pub fn width(&self) -> usize {
        match self {
            DataType::Null => 1,
            DataType::Bool => 1,
            DataType::Int32 => 4,
            DataType::Int64 => 8,
            DataType::Float64 => 8,
            DataType::String => 24,
        }
    }

    /// Returns `true` if this is a numeric type.
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64 | DataType::Float64)
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Null => write!(f, "Null"),
            DataType::Bool => write!(f, "Bool"),
            DataType::Int32 => write!(f, "Int32"),
            DataType::Int64 => write!(f, "Int64"),
            DataType::Float64 => write!(f, "Float64"),
            DataType::String => write!(f, "String"),
        }
    }
}
