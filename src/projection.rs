//! Typed access to untyped column values.
//!
//! A [`Projection`] names the stored type it reads and writes. `Option<T>`
//! maps a null cell to `None` and back, so nullability is carried by the
//! Rust type rather than checked by hand at each call site.

use crate::catalog::schema::ColumnDef;
use crate::catalog::types::{Timestamp, Value, ValueType};
use crate::error::CollectionError;
use crate::storage::{TableRef, TableView};

pub trait Projection: Sized {
    fn value_type() -> ValueType;

    fn is_optional() -> bool {
        false
    }

    fn from_value(value: &Value, column: &str) -> Result<Self, CollectionError>;

    fn into_value(self) -> Value;
}

fn mismatch(column: &str, expected: ValueType, value: &Value) -> CollectionError {
    CollectionError::TypeMismatch {
        column: column.to_string(),
        expected: expected.to_string(),
        actual: value.kind_name().to_string(),
    }
}

macro_rules! impl_projection {
    ($ty:ty, $value_type:ident, $variant:ident, |$v:ident| $read:expr, |$w:ident| $write:expr) => {
        impl Projection for $ty {
            fn value_type() -> ValueType {
                ValueType::$value_type
            }

            fn from_value(value: &Value, column: &str) -> Result<Self, CollectionError> {
                match value {
                    Value::$variant($v) => Ok($read),
                    other => Err(mismatch(column, ValueType::$value_type, other)),
                }
            }

            fn into_value(self) -> Value {
                let $w = self;
                Value::$variant($write)
            }
        }
    };
}

impl_projection!(bool, Bool, Bool, |v| *v, |v| v);
impl_projection!(i64, Int, Int, |v| *v, |v| v);
impl_projection!(f32, Float, Float, |v| *v, |v| v);
impl_projection!(f64, Double, Double, |v| *v, |v| v);
impl_projection!(String, String, String, |v| v.to_string(), |v| v.into());
impl_projection!(Vec<u8>, Binary, Binary, |v| v.clone(), |v| v);
impl_projection!(Timestamp, Timestamp, Timestamp, |v| *v, |v| v);

impl<T: Projection> Projection for Option<T> {
    fn value_type() -> ValueType {
        T::value_type()
    }

    fn is_optional() -> bool {
        true
    }

    fn from_value(value: &Value, column: &str) -> Result<Self, CollectionError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other, column).map(Some),
        }
    }

    fn into_value(self) -> Value {
        self.map_or(Value::Null, T::into_value)
    }
}

/// Rejects `T` unless it names the column's stored type.
pub fn check_column<T: Projection>(column: &ColumnDef) -> Result<(), CollectionError> {
    match column.scalar_type() {
        Some(value_type) if value_type == T::value_type() => Ok(()),
        _ => Err(CollectionError::TypeMismatch {
            column: column.name.clone(),
            expected: column.col_type.to_string(),
            actual: T::value_type().to_string(),
        }),
    }
}

pub fn read<T: Projection>(
    table: &TableRef,
    index: usize,
    column: usize,
) -> Result<T, CollectionError> {
    table.read(|t| {
        let def = t.column_def(column)?;
        check_column::<T>(def)?;
        T::from_value(&t.get(t.key_at(index)?, column)?, &def.name)
    })
}

/// Writing `None` into a non-nullable column fails with `NotNullable`.
pub(crate) fn write<T: Projection>(
    table: &TableRef,
    index: usize,
    column: usize,
    value: T,
) -> Result<(), CollectionError> {
    table.read(|t| check_column::<T>(t.column_def(column)?))?;
    table.set(index, column, value.into_value())
}

/// What a search looks for. A null lookup and a value lookup never match
/// each other's rows.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchTarget {
    Null,
    Equal(Value),
}

impl SearchTarget {
    pub fn for_value(value: Value) -> Self {
        if value.is_null() {
            SearchTarget::Null
        } else {
            SearchTarget::Equal(value)
        }
    }

    pub fn find_in_table(
        &self,
        table: &TableRef,
        column: usize,
    ) -> Result<Option<usize>, CollectionError> {
        match self {
            SearchTarget::Null => table.find_first_null(column),
            SearchTarget::Equal(value) => table.find_first(column, value),
        }
    }

    pub fn find_in_view(
        &self,
        view: &TableView,
        column: usize,
    ) -> Result<Option<usize>, CollectionError> {
        match self {
            SearchTarget::Null => view.find_first_null(column),
            SearchTarget::Equal(value) => view.find_first(column, value),
        }
    }
}

pub fn search_target<T: Projection>(value: T) -> SearchTarget {
    SearchTarget::for_value(value.into_value())
}

/// First row of `table` whose `column` matches `value`.
pub fn find<T: Projection>(
    table: &TableRef,
    column: usize,
    value: T,
) -> Result<Option<usize>, CollectionError> {
    table.read(|t| check_column::<T>(t.column_def(column)?))?;
    search_target(value).find_in_table(table, column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::schema::{ColumnDef, TableSchema};
    use crate::storage::Group;

    fn scores() -> (std::sync::Arc<Group>, TableRef) {
        let group = Group::new();
        group.begin_write().expect("begin");
        let table = group
            .create_table(TableSchema::new(
                "scores",
                vec![
                    ColumnDef::scalar("points", ValueType::Int).nullable(),
                    ColumnDef::scalar("label", ValueType::String),
                ],
            ))
            .expect("create");
        (group, table)
    }

    #[test]
    fn optional_reads_map_null_to_none() {
        let (_group, table) = scores();
        table.add_empty_row().expect("row");
        write(&table, 0, 0, None::<i64>).expect("write none");
        assert_eq!(read::<Option<i64>>(&table, 0, 0).expect("read"), None);
        write(&table, 0, 0, Some(7i64)).expect("write some");
        assert_eq!(read::<Option<i64>>(&table, 0, 0).expect("read"), Some(7));
        assert_eq!(read::<i64>(&table, 0, 0).expect("read"), 7);
    }

    #[test]
    fn null_into_required_column_fails() {
        let (_group, table) = scores();
        table.add_empty_row().expect("row");
        let err = write(&table, 0, 1, None::<String>).expect_err("not nullable");
        assert_eq!(err.code_str(), "not_nullable");
        let err = write(&table, 0, 1, 3i64).expect_err("wrong type");
        assert_eq!(err.code_str(), "type_mismatch");
    }

    #[test]
    fn null_search_never_matches_values() {
        let (_group, table) = scores();
        for _ in 0..3 {
            table.add_empty_row().expect("row");
        }
        write(&table, 0, 0, Some(0i64)).expect("zero");
        write(&table, 1, 0, None::<i64>).expect("null");
        write(&table, 2, 0, Some(5i64)).expect("five");
        assert_eq!(find(&table, 0, None::<i64>).expect("find"), Some(1));
        assert_eq!(find(&table, 0, Some(0i64)).expect("find"), Some(0));
        assert_eq!(find(&table, 0, Some(9i64)).expect("find"), None);
    }
}
