//! Per-type aggregate dispatch over column values.
//!
//! Nulls never contribute. `sum` distinguishes "no rows contributed" on a
//! nullable column (`None`) from the empty sum of a non-nullable column
//! (`Some(0)`); `average`, `min` and `max` are `None` whenever nothing
//! contributed.

use crate::catalog::schema::ColumnDef;
use crate::catalog::types::{ColumnType, Value, ValueType};
use crate::error::CollectionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Min,
    Max,
    Sum,
    Average,
}

impl AggregateOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Sum => "sum",
            AggregateOp::Average => "average",
        }
    }
}

/// Rejects columns `op` cannot be computed over. Runs before any values are read.
pub fn check_supported(op: AggregateOp, column: &ColumnDef) -> Result<ValueType, CollectionError> {
    let unsupported = || CollectionError::UnsupportedColumnType {
        column: column.name.clone(),
        column_type: column.col_type.to_string(),
        operation: op.as_str(),
    };
    let ColumnType::Scalar(value_type) = column.col_type else {
        return Err(unsupported());
    };
    let supported = match op {
        AggregateOp::Min | AggregateOp::Max => {
            value_type.is_numeric() || value_type == ValueType::Timestamp
        }
        AggregateOp::Sum | AggregateOp::Average => value_type.is_numeric(),
    };
    if supported {
        Ok(value_type)
    } else {
        Err(unsupported())
    }
}

pub fn min(values: &[Value]) -> Option<Value> {
    values.iter().filter(|v| !v.is_null()).min().cloned()
}

pub fn max(values: &[Value]) -> Option<Value> {
    values.iter().filter(|v| !v.is_null()).max().cloned()
}

/// Integers sum as `Int` with wrapping; floats and doubles sum as `Double`.
pub fn sum(value_type: ValueType, nullable: bool, values: &[Value]) -> Option<Value> {
    let mut contributed = 0usize;
    let total = match value_type {
        ValueType::Int => {
            let mut acc = 0i64;
            for value in values {
                if let Value::Int(v) = value {
                    acc = acc.wrapping_add(*v);
                    contributed += 1;
                }
            }
            Value::Int(acc)
        }
        _ => {
            let mut acc = 0f64;
            for value in values {
                if let Some(v) = as_f64(value) {
                    acc += v;
                    contributed += 1;
                }
            }
            Value::Double(acc)
        }
    };
    if contributed == 0 && nullable {
        None
    } else {
        Some(total)
    }
}

pub fn average(values: &[Value]) -> Option<f64> {
    let (total, count) = values
        .iter()
        .filter_map(as_f64)
        .fold((0f64, 0usize), |(total, count), v| (total + v, count + 1));
    (count > 0).then(|| total / count as f64)
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(v) => Some(*v as f64),
        Value::Float(v) => Some(f64::from(*v)),
        Value::Double(v) => Some(*v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sums_depend_on_nullability() {
        assert_eq!(sum(ValueType::Int, false, &[]), Some(Value::Int(0)));
        assert_eq!(sum(ValueType::Int, true, &[]), None);
        assert_eq!(sum(ValueType::Int, true, &[Value::Null, Value::Null]), None);
        assert_eq!(
            sum(ValueType::Int, true, &[Value::Null, Value::Int(4)]),
            Some(Value::Int(4))
        );
        assert_eq!(sum(ValueType::Double, false, &[]), Some(Value::Double(0.0)));
    }

    #[test]
    fn average_ignores_nulls_and_is_none_when_empty() {
        assert_eq!(average(&[]), None);
        assert_eq!(average(&[Value::Null]), None);
        assert_eq!(
            average(&[Value::Int(1), Value::Null, Value::Int(4)]),
            Some(2.5)
        );
        assert_eq!(average(&[Value::Float(1.5), Value::Float(2.5)]), Some(2.0));
    }

    #[test]
    fn min_max_skip_nulls() {
        let values = [Value::Null, Value::Int(3), Value::Int(-2)];
        assert_eq!(min(&values), Some(Value::Int(-2)));
        assert_eq!(max(&values), Some(Value::Int(3)));
        assert_eq!(min(&[Value::Null]), None);
    }

    #[test]
    fn type_support_is_checked_per_operation() {
        let ts = ColumnDef::scalar("at", ValueType::Timestamp);
        assert_eq!(
            check_supported(AggregateOp::Max, &ts).expect("max on timestamp"),
            ValueType::Timestamp
        );
        let err = check_supported(AggregateOp::Sum, &ts).expect_err("sum on timestamp");
        assert_eq!(err.code_str(), "unsupported_column_type");

        let name = ColumnDef::scalar("name", ValueType::String);
        assert!(check_supported(AggregateOp::Min, &name).is_err());
        let links = ColumnDef::link_list("dogs", "class_Dog");
        assert!(check_supported(AggregateOp::Average, &links).is_err());
    }

    #[test]
    fn integer_sums_wrap() {
        assert_eq!(
            sum(ValueType::Int, false, &[Value::Int(i64::MAX), Value::Int(1)]),
            Some(Value::Int(i64::MIN))
        );
    }
}
