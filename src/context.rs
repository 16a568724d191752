//! Conversion between stored values and a caller-chosen representation.

use crate::catalog::types::{Timestamp, Value, ValueType};
use crate::error::CollectionError;
use crate::storage::RowRef;
use serde_json::json;

/// Boxes stored values into `Self::Boxed` and unboxes them back.
///
/// Collections take a context on their `*_with` methods so binding layers
/// can pass their own value type straight through.
pub trait AccessorContext {
    type Boxed;

    fn box_value(&self, value: &Value) -> Self::Boxed;

    fn box_row(&self, row: &RowRef) -> Result<Self::Boxed, CollectionError>;

    /// Converts `boxed` into a value of `value_type`. A null box is accepted
    /// only when `nullable` is set; otherwise it fails with `NotNullable`.
    fn unbox_value(
        &self,
        boxed: &Self::Boxed,
        value_type: ValueType,
        nullable: bool,
    ) -> Result<Value, CollectionError>;

    /// Index into the target table named by a boxed row reference.
    fn unbox_row_index(&self, boxed: &Self::Boxed) -> Result<usize, CollectionError>;

    fn is_null(&self, boxed: &Self::Boxed) -> bool;
}

/// Represents values as `serde_json::Value`. Binary is hex encoded;
/// timestamps and rows are objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonContext;

fn unbox_mismatch(value_type: ValueType, boxed: &serde_json::Value) -> CollectionError {
    CollectionError::TypeMismatch {
        column: "<boxed>".into(),
        expected: value_type.to_string(),
        actual: boxed.to_string(),
    }
}

impl AccessorContext for JsonContext {
    type Boxed = serde_json::Value;

    fn box_value(&self, value: &Value) -> serde_json::Value {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(v) => json!(v),
            Value::Int(v) => json!(v),
            Value::Float(v) => json!(v),
            Value::Double(v) => json!(v),
            Value::String(v) => json!(v.as_str()),
            Value::Binary(v) => json!(hex::encode(v)),
            Value::Timestamp(ts) => json!({
                "seconds": ts.seconds,
                "nanoseconds": ts.nanoseconds,
            }),
        }
    }

    fn box_row(&self, row: &RowRef) -> Result<serde_json::Value, CollectionError> {
        Ok(json!({
            "table": row.table().name()?,
            "row": row.index()?,
        }))
    }

    fn unbox_value(
        &self,
        boxed: &serde_json::Value,
        value_type: ValueType,
        nullable: bool,
    ) -> Result<Value, CollectionError> {
        if boxed.is_null() {
            if nullable {
                return Ok(Value::Null);
            }
            return Err(CollectionError::NotNullable {
                table: "<boxed>".into(),
                column: "<boxed>".into(),
            });
        }
        let value = match value_type {
            ValueType::Bool => boxed.as_bool().map(Value::Bool),
            ValueType::Int => boxed.as_i64().map(Value::Int),
            ValueType::Float => boxed.as_f64().map(|v| Value::Float(v as f32)),
            ValueType::Double => boxed.as_f64().map(Value::Double),
            ValueType::String => boxed.as_str().map(Value::from),
            ValueType::Binary => boxed
                .as_str()
                .and_then(|s| hex::decode(s).ok())
                .map(Value::Binary),
            ValueType::Timestamp => {
                let seconds = boxed.get("seconds").and_then(serde_json::Value::as_i64);
                let nanos = boxed
                    .get("nanoseconds")
                    .and_then(serde_json::Value::as_i64)
                    .and_then(|n| i32::try_from(n).ok());
                seconds
                    .zip(nanos)
                    .map(|(s, n)| Value::Timestamp(Timestamp::new(s, n)))
            }
        };
        value.ok_or_else(|| unbox_mismatch(value_type, boxed))
    }

    fn unbox_row_index(&self, boxed: &serde_json::Value) -> Result<usize, CollectionError> {
        boxed
            .get("row")
            .or(Some(boxed))
            .and_then(serde_json::Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| CollectionError::TypeMismatch {
                column: "<boxed>".into(),
                expected: "row index".into(),
                actual: boxed.to_string(),
            })
    }

    fn is_null(&self, boxed: &serde_json::Value) -> bool {
        boxed.is_null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_and_timestamps_survive_boxing() {
        let ctx = JsonContext;
        let bytes = Value::Binary(vec![0xde, 0xad]);
        let boxed = ctx.box_value(&bytes);
        assert_eq!(boxed, json!("dead"));
        assert_eq!(
            ctx.unbox_value(&boxed, ValueType::Binary, false).expect("unbox"),
            bytes
        );

        let ts = Value::Timestamp(Timestamp::new(12, 34));
        let boxed = ctx.box_value(&ts);
        assert_eq!(boxed["seconds"], json!(12));
        assert_eq!(
            ctx.unbox_value(&boxed, ValueType::Timestamp, false).expect("unbox"),
            ts
        );
    }

    #[test]
    fn null_unboxes_only_into_nullable_columns() {
        let ctx = JsonContext;
        assert_eq!(
            ctx.unbox_value(&json!(null), ValueType::Int, true).expect("nullable"),
            Value::Null
        );
        let err = ctx
            .unbox_value(&json!(null), ValueType::Int, false)
            .expect_err("required");
        assert_eq!(err.code_str(), "not_nullable");
        let err = ctx
            .unbox_value(&json!("x"), ValueType::Int, false)
            .expect_err("string into int");
        assert_eq!(err.code_str(), "type_mismatch");
    }

    #[test]
    fn row_indices_unbox_from_objects_or_numbers() {
        let ctx = JsonContext;
        assert_eq!(ctx.unbox_row_index(&json!({"row": 2})).expect("object"), 2);
        assert_eq!(ctx.unbox_row_index(&json!(5)).expect("number"), 5);
        assert!(ctx.unbox_row_index(&json!("x")).is_err());
    }
}
