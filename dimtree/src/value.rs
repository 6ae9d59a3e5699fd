//! Raw attribute values
//!
//! Records and queries are expressed with the closed [`Value`] variant. Each
//! dimension resolves a `Value` into canonical codes once, at ingestion, so the
//! tree walk never inspects raw values.
//!
//! Accepted shapes per attribute:
//! - `Value::Absent` (also produced by `None` through the `Option` conversion)
//! - a single scalar (`Bool`, `Long`, `Text`, `Enum`)
//! - `Value::List` - multi-valued input, OR-combined for query purposes
//! - `Value::Array` - an explicit `{values, operation}` set for array dimensions

use crate::error::{Result, TreeError};
use crate::operator::Operator;
use std::fmt;
use std::str::FromStr;

/// A raw attribute value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Value {
    /// Missing value (null / empty optional)
    #[default]
    Absent,
    Bool(bool),
    Long(i64),
    Text(String),
    /// Enumerated value, identified by its variant name
    Enum(String),
    /// Multi-valued input
    List(Vec<Value>),
    /// Set value with an explicit combination operation
    Array(ArrayValue),
}

impl Value {
    /// Build an enumerated value from its variant name
    pub fn variant(name: impl Into<String>) -> Self {
        Value::Enum(name.into())
    }

    /// True for `Absent`, an empty list, or an empty array value
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Absent => true,
            Value::List(items) => items.is_empty(),
            Value::Array(array) => array.is_empty(),
            _ => false,
        }
    }

    /// Short type description used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Absent => "absent",
            Value::Bool(_) => "boolean",
            Value::Long(_) => "long",
            Value::Text(_) => "text",
            Value::Enum(_) => "enum",
            Value::List(_) => "list",
            Value::Array(_) => "array",
        }
    }

    /// Rendering used for the query line of a trace report.
    ///
    /// Empty values render as `UNKNOWN`.
    pub fn display_query(&self) -> String {
        if self.is_empty() {
            UNKNOWN_LABEL.to_string()
        } else {
            self.to_string()
        }
    }

    /// Compact rendering used next to trace evidence (`[a,b]` for lists).
    pub fn display_compact(&self) -> String {
        match self {
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                format!("[{}]", parts.join(","))
            }
            other => other.to_string(),
        }
    }
}

/// Label for a missing value in human-oriented output
pub const UNKNOWN_LABEL: &str = "UNKNOWN";

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Absent => f.write_str(UNKNOWN_LABEL),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Long(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::Enum(name) => f.write_str(name),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Array(array) => write!(f, "{}", array),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Long(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Long(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Long(i64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<ArrayValue> for Value {
    fn from(value: ArrayValue) -> Self {
        Value::Array(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Absent, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

/// How the members of an [`ArrayValue`] combine against a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArrayOperation {
    /// At least one query code is a member
    Or,
    /// Every member is present in the query
    And,
    /// No query code is a member
    Not,
}

impl ArrayOperation {
    /// Comparison operator this operation reports as
    pub fn operator(self) -> Operator {
        match self {
            ArrayOperation::Or => Operator::Contains,
            ArrayOperation::And => Operator::ContainsAll,
            ArrayOperation::Not => Operator::NotContains,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArrayOperation::Or => "OR",
            ArrayOperation::And => "AND",
            ArrayOperation::Not => "NOT",
        }
    }
}

impl fmt::Display for ArrayOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArrayOperation {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "OR" => Ok(ArrayOperation::Or),
            "AND" => Ok(ArrayOperation::And),
            "NOT" => Ok(ArrayOperation::Not),
            other => Err(TreeError::unknown_operator(other)),
        }
    }
}

/// A set of values combined with an [`ArrayOperation`]
///
/// Members are kept sorted and deduplicated, so two arrays holding the same
/// members with the same operation are equal regardless of input order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArrayValue {
    values: Vec<Value>,
    operation: ArrayOperation,
}

impl ArrayValue {
    pub fn new<I, V>(operation: ArrayOperation, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut values: Vec<Value> = values.into_iter().map(Into::into).collect();
        values.sort();
        values.dedup();
        Self { values, operation }
    }

    pub fn or<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(ArrayOperation::Or, values)
    }

    pub fn and<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(ArrayOperation::And, values)
    }

    pub fn not<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(ArrayOperation::Not, values)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn operation(&self) -> ArrayOperation {
        self.operation
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

impl fmt::Display for ArrayValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
        write!(f, "{}[{}]", self.operation, parts.join(", "))
    }
}

/// A record: one raw value per dimension plus the selection it yields
#[derive(Debug, Clone, PartialEq)]
pub struct ValueData<T> {
    pub attributes: Vec<Value>,
    pub selection: T,
}

impl<T> ValueData<T> {
    pub fn new<I, V>(selection: T, attributes: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            attributes: attributes.into_iter().map(Into::into).collect(),
            selection,
        }
    }
}
