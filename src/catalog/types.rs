use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Stored scalar kinds. Each may additionally be nullable at the column level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Double,
    String,
    Binary,
    Timestamp,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::String => "string",
            ValueType::Binary => "binary",
            ValueType::Timestamp => "timestamp",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ValueType::Int | ValueType::Float | ValueType::Double)
    }

    /// Value stored in a freshly created row of a non-nullable column.
    pub fn default_value(self) -> Value {
        match self {
            ValueType::Bool => Value::Bool(false),
            ValueType::Int => Value::Int(0),
            ValueType::Float => Value::Float(0.0),
            ValueType::Double => Value::Double(0.0),
            ValueType::String => Value::String(CompactString::default()),
            ValueType::Binary => Value::Binary(Vec::new()),
            ValueType::Timestamp => Value::Timestamp(Timestamp::default()),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ColumnType {
    Scalar(ValueType),
    /// Ordered references to rows of the named table.
    LinkList { target: String },
    /// Ordered scalars kept in a per-row single-column table.
    List(ValueType),
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Scalar(value_type) => write!(f, "{value_type}"),
            ColumnType::LinkList { target } => write!(f, "link list<{target}>"),
            ColumnType::List(value_type) => write!(f, "list<{value_type}>"),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanoseconds: i32,
}

impl Timestamp {
    pub fn new(seconds: i64, nanoseconds: i32) -> Self {
        Self {
            seconds,
            nanoseconds,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f32),
    Double(f64),
    String(CompactString),
    Binary(Vec<u8>),
    Timestamp(Timestamp),
}

impl Value {
    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Double(_) => 4,
            Value::Timestamp(_) => 5,
            Value::String(_) => 6,
            Value::Binary(_) => 7,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueType::Bool),
            Value::Int(_) => Some(ValueType::Int),
            Value::Float(_) => Some(ValueType::Float),
            Value::Double(_) => Some(ValueType::Double),
            Value::String(_) => Some(ValueType::String),
            Value::Binary(_) => Some(ValueType::Binary),
            Value::Timestamp(_) => Some(ValueType::Timestamp),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        self.value_type().map_or("null", ValueType::as_str)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.into())
    }
}

impl From<Timestamp> for Value {
    fn from(value: Timestamp) -> Self {
        Value::Timestamp(value)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        let rank_cmp = self.kind_rank().cmp(&other.kind_rank());
        if rank_cmp != Ordering::Equal {
            return rank_cmp;
        }

        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Binary(a), Value::Binary(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Timestamp, Value, ValueType};
    use proptest::prelude::*;
    use std::cmp::Ordering;

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            any::<f32>()
                .prop_filter("finite float only", |v| v.is_finite())
                .prop_map(Value::Float),
            any::<f64>()
                .prop_filter("finite double only", |v| v.is_finite())
                .prop_map(Value::Double),
            "\\PC{0,32}".prop_map(|s| Value::String(s.into())),
            prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::Binary),
            (any::<i64>(), 0..1_000_000_000i32)
                .prop_map(|(s, n)| Value::Timestamp(Timestamp::new(s, n))),
            Just(Value::Null),
        ]
    }

    proptest! {
        #[test]
        fn ordering_is_antisymmetric(a in arb_value(), b in arb_value()) {
            prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        }

        #[test]
        fn null_sorts_first(v in arb_value()) {
            prop_assert_ne!(Value::Null.cmp(&v), Ordering::Greater);
        }
    }

    #[test]
    fn null_is_distinct_from_zero() {
        assert_ne!(Value::Null, Value::Int(0));
        assert_ne!(Value::Null, Value::Bool(false));
        assert_eq!(Value::Int(0), Value::from(0i64));
    }

    #[test]
    fn defaults_match_their_type() {
        for value_type in [
            ValueType::Bool,
            ValueType::Int,
            ValueType::Float,
            ValueType::Double,
            ValueType::String,
            ValueType::Binary,
            ValueType::Timestamp,
        ] {
            assert_eq!(value_type.default_value().value_type(), Some(value_type));
        }
    }
}
