use crate::catalog::schema::{ColumnDef, TableSchema};
use crate::catalog::types::{ColumnType, Value};
use crate::error::CollectionError;
use crate::query::operators::compare_values;
use im::{HashMap, OrdMap, Vector};

/// Stable row identity, independent of the row's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u64);

#[derive(Debug, Clone)]
pub struct RowData {
    pub values: Vec<Value>,
    /// Stamp of the last write touching this row.
    pub version: u64,
}

/// Location of the row cell that owns a hidden list table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Owner {
    pub table: TableId,
    pub column: usize,
    pub row: RowKey,
}

#[derive(Debug, Clone)]
pub struct TableData {
    pub(crate) id: TableId,
    pub(crate) schema: TableSchema,
    pub(crate) rows: OrdMap<RowKey, RowData>,
    pub(crate) order: Vector<RowKey>,
    pub(crate) link_lists: HashMap<(usize, RowKey), Vector<RowKey>>,
    pub(crate) subtables: HashMap<(usize, RowKey), TableId>,
    pub(crate) owner: Option<Owner>,
}

impl TableData {
    pub(crate) fn new(id: TableId, schema: TableSchema, owner: Option<Owner>) -> Self {
        Self {
            id,
            schema,
            rows: OrdMap::new(),
            order: Vector::new(),
            link_lists: HashMap::new(),
            subtables: HashMap::new(),
            owner,
        }
    }

    pub fn size(&self) -> usize {
        self.order.len()
    }

    pub fn name(&self) -> &str {
        &self.schema.table_name
    }

    pub fn key_at(&self, index: usize) -> Result<RowKey, CollectionError> {
        self.order
            .get(index)
            .copied()
            .ok_or_else(|| CollectionError::out_of_bounds(index, self.size()))
    }

    pub fn position_of(&self, key: RowKey) -> Option<usize> {
        self.order.index_of(&key)
    }

    pub fn row(&self, key: RowKey) -> Option<&RowData> {
        self.rows.get(&key)
    }

    pub fn contains(&self, key: RowKey) -> bool {
        self.rows.contains_key(&key)
    }

    pub fn column_def(&self, column: usize) -> Result<&ColumnDef, CollectionError> {
        self.schema
            .column(column)
            .ok_or_else(|| CollectionError::ColumnNotFound {
                table: self.schema.table_name.clone(),
                column: format!("#{column}"),
            })
    }

    pub fn get(&self, key: RowKey, column: usize) -> Result<Value, CollectionError> {
        self.column_def(column)?;
        let row = self.row(key).ok_or(CollectionError::Invalidated)?;
        Ok(row.values.get(column).cloned().unwrap_or(Value::Null))
    }

    /// Type and nullability check for a scalar write.
    pub fn check_value(&self, column: usize, value: &Value) -> Result<(), CollectionError> {
        let def = self.column_def(column)?;
        let ColumnType::Scalar(expected) = def.col_type else {
            return Err(CollectionError::TypeMismatch {
                column: def.name.clone(),
                expected: def.col_type.to_string(),
                actual: value.kind_name().to_string(),
            });
        };
        match value.value_type() {
            None if def.nullable => Ok(()),
            None => Err(CollectionError::NotNullable {
                table: self.schema.table_name.clone(),
                column: def.name.clone(),
            }),
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => Err(CollectionError::TypeMismatch {
                column: def.name.clone(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            }),
        }
    }

    pub(crate) fn set(
        &mut self,
        key: RowKey,
        column: usize,
        value: Value,
        stamp: u64,
    ) -> Result<(), CollectionError> {
        self.check_value(column, &value)?;
        let row = self.rows.get_mut(&key).ok_or(CollectionError::Invalidated)?;
        row.values[column] = value;
        row.version = stamp;
        Ok(())
    }

    pub(crate) fn touch(&mut self, key: RowKey, stamp: u64) {
        if let Some(row) = self.rows.get_mut(&key) {
            row.version = stamp;
        }
    }

    /// Inserts a row holding column defaults. Link and list cells are created by the group.
    pub(crate) fn insert_row(
        &mut self,
        index: usize,
        key: RowKey,
        stamp: u64,
    ) -> Result<(), CollectionError> {
        if index > self.size() {
            return Err(CollectionError::out_of_bounds(index, self.size()));
        }
        let values = self
            .schema
            .columns
            .iter()
            .map(|c| match c.col_type {
                ColumnType::Scalar(value_type) if !c.nullable => value_type.default_value(),
                _ => Value::Null,
            })
            .collect();
        self.rows.insert(
            key,
            RowData {
                values,
                version: stamp,
            },
        );
        self.order.insert(index, key);
        Ok(())
    }

    /// Detaches the row at `index` and returns its key plus the hidden tables it owned.
    pub(crate) fn remove_at(
        &mut self,
        index: usize,
    ) -> Result<(RowKey, Vec<TableId>), CollectionError> {
        let key = self.key_at(index)?;
        self.order.remove(index);
        self.rows.remove(&key);
        let cells: Vec<(usize, RowKey)> = self
            .link_lists
            .keys()
            .filter(|(_, row)| *row == key)
            .copied()
            .collect();
        for cell in cells {
            self.link_lists.remove(&cell);
        }
        let owned: Vec<(usize, RowKey)> = self
            .subtables
            .keys()
            .filter(|(_, row)| *row == key)
            .copied()
            .collect();
        let mut dropped = Vec::with_capacity(owned.len());
        for cell in owned {
            if let Some(id) = self.subtables.remove(&cell) {
                dropped.push(id);
            }
        }
        Ok((key, dropped))
    }

    pub(crate) fn swap(&mut self, a: usize, b: usize) -> Result<(), CollectionError> {
        let size = self.size();
        if a >= size || b >= size {
            return Err(CollectionError::out_of_bounds(a.max(b), size));
        }
        self.order.swap(a, b);
        Ok(())
    }

    pub(crate) fn move_row(&mut self, from: usize, to: usize) -> Result<(), CollectionError> {
        let size = self.size();
        if from >= size || to >= size {
            return Err(CollectionError::out_of_bounds(from.max(to), size));
        }
        let key = self.order.remove(from);
        self.order.insert(to, key);
        Ok(())
    }

    pub fn find_first(
        &self,
        column: usize,
        value: &Value,
    ) -> Result<Option<usize>, CollectionError> {
        self.column_def(column)?;
        Ok(self.order.iter().position(|key| {
            self.row(*key).is_some_and(|row| {
                compare_values(&row.values[column], value).is_some_and(|o| o.is_eq())
            })
        }))
    }

    pub fn find_first_null(&self, column: usize) -> Result<Option<usize>, CollectionError> {
        self.column_def(column)?;
        Ok(self.order.iter().position(|key| {
            self.row(*key)
                .is_some_and(|row| row.values[column].is_null())
        }))
    }

    pub fn row_states(&self, keys: &[RowKey]) -> Vec<(RowKey, u64)> {
        keys.iter()
            .map(|key| (*key, self.row(*key).map_or(0, |row| row.version)))
            .collect()
    }
}
