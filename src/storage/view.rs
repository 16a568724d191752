use crate::catalog::types::Value;
use crate::error::CollectionError;
use crate::query::operators::{compare_values, compile_expr, eval_compiled_expr};
use crate::query::plan::{Expr, Order, SortDescriptor};
use crate::storage::accessor::{RowRef, TableRef};
use crate::storage::table::RowKey;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// A concrete, ordered selection of rows from one table.
///
/// Rows are held by key, so a view stays readable after rows it names have
/// been removed; such rows report as detached.
#[derive(Debug, Clone)]
pub struct TableView {
    table: TableRef,
    keys: Vec<RowKey>,
}

impl TableView {
    pub fn new(table: TableRef, keys: Vec<RowKey>) -> Self {
        Self { table, keys }
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn size(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> &[RowKey] {
        &self.keys
    }

    pub fn key(&self, index: usize) -> Option<RowKey> {
        self.keys.get(index).copied()
    }

    pub fn is_row_attached(&self, index: usize) -> bool {
        self.key(index)
            .is_some_and(|key| self.table.contains_key(key))
    }

    /// Row at `index`, or `None` when the index is past the end or the row was removed.
    pub fn row(&self, index: usize) -> Option<RowRef> {
        let key = self.key(index)?;
        self.table
            .contains_key(key)
            .then(|| RowRef::new(self.table.clone(), key))
    }

    /// Reads a detached row as `Value::Null`.
    pub fn get(&self, index: usize, column: usize) -> Result<Value, CollectionError> {
        let key = self
            .key(index)
            .ok_or_else(|| CollectionError::out_of_bounds(index, self.size()))?;
        if !self.table.is_attached() {
            return Ok(Value::Null);
        }
        self.table.read(|t| {
            t.column_def(column)?;
            Ok(t.row(key)
                .map_or(Value::Null, |row| row.values[column].clone()))
        })
    }

    pub fn position_of(&self, key: RowKey) -> Option<usize> {
        self.keys.iter().position(|k| *k == key)
    }

    pub fn find_first(
        &self,
        column: usize,
        value: &Value,
    ) -> Result<Option<usize>, CollectionError> {
        self.find_by(column, |v| compare_values(v, value).is_some_and(|o| o.is_eq()))
    }

    pub fn find_first_null(&self, column: usize) -> Result<Option<usize>, CollectionError> {
        self.find_by(column, Value::is_null)
    }

    fn find_by(
        &self,
        column: usize,
        matches: impl Fn(&Value) -> bool,
    ) -> Result<Option<usize>, CollectionError> {
        self.table.read(|t| {
            t.column_def(column)?;
            Ok(self.keys.iter().position(|key| {
                t.row(*key)
                    .is_some_and(|row| matches(&row.values[column]))
            }))
        })
    }

    /// Stable sort by the descriptor's columns. Removed rows sort last.
    pub fn sort(&mut self, descriptor: &SortDescriptor) -> Result<(), CollectionError> {
        if descriptor.is_empty() {
            return Ok(());
        }
        let mut keyed = self.table.read(|t| {
            for (column, _) in descriptor.columns() {
                t.column_def(*column)?;
            }
            Ok(self
                .keys
                .iter()
                .map(|key| {
                    let values = t.row(*key).map(|row| {
                        descriptor
                            .columns()
                            .iter()
                            .map(|(column, _)| row.values[*column].clone())
                            .collect::<Vec<_>>()
                    });
                    (values, *key)
                })
                .collect::<Vec<_>>())
        })?;
        keyed.sort_by(|(a, _), (b, _)| match (a, b) {
            (Some(a), Some(b)) => compare_sort_values(a, b, descriptor.columns()),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        self.keys = keyed.into_iter().map(|(_, key)| key).collect();
        Ok(())
    }

    /// Keeps the rows matching `predicate`. Removed rows are dropped.
    pub fn filter(&mut self, predicate: &Expr) -> Result<(), CollectionError> {
        let keys = self.table.read(|t| {
            let compiled = compile_expr(predicate, &t.schema)?;
            Ok(self
                .keys
                .iter()
                .copied()
                .filter(|key| {
                    t.row(*key)
                        .is_some_and(|row| eval_compiled_expr(&compiled, &row.values))
                })
                .collect::<Vec<_>>())
        })?;
        self.keys = keys;
        Ok(())
    }

    /// Keeps the first row for each distinct value of `column`. Removed rows are dropped.
    pub fn distinct(&mut self, column: usize) -> Result<(), CollectionError> {
        let keys = self.table.read(|t| {
            t.column_def(column)?;
            let mut seen = BTreeSet::new();
            Ok(self
                .keys
                .iter()
                .filter(|key| {
                    t.row(**key)
                        .is_some_and(|row| seen.insert(row.values[column].clone()))
                })
                .copied()
                .collect::<Vec<_>>())
        })?;
        self.keys = keys;
        Ok(())
    }

    pub fn row_states(&self) -> Result<Vec<(RowKey, u64)>, CollectionError> {
        self.table.row_states(&self.keys)
    }

    /// Values of `column` for the rows still attached, in view order.
    pub fn column_values(&self, column: usize) -> Result<Vec<Value>, CollectionError> {
        if !self.table.is_attached() {
            return Ok(Vec::new());
        }
        self.table.column_values(column, Some(&self.keys))
    }
}

fn compare_sort_values(a: &[Value], b: &[Value], columns: &[(usize, Order)]) -> Ordering {
    for (i, (_, order)) in columns.iter().enumerate() {
        let cmp = a[i].cmp(&b[i]);
        let ord = match order {
            Order::Asc => cmp,
            Order::Desc => cmp.reverse(),
        };
        if !ord.is_eq() {
            return ord;
        }
    }
    Ordering::Equal
}
