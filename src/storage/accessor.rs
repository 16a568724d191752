use crate::catalog::schema::TableSchema;
use crate::catalog::types::{ColumnType, Value};
use crate::error::CollectionError;
use crate::storage::group::{Group, GroupState, ListLocation};
use crate::storage::table::{RowKey, TableData, TableId};
use crate::thread::ThreadConfinement;
use im::Vector;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub type TableRef = Arc<TableAccessor>;
pub type LinkListRef = Arc<LinkListAccessor>;

/// Handle to one table of a [`Group`]. Interned: two live accessors for the
/// same table are the same allocation.
pub struct TableAccessor {
    group: Arc<Group>,
    id: TableId,
    attached: AtomicBool,
}

impl fmt::Debug for TableAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableAccessor")
            .field("id", &self.id)
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl TableAccessor {
    pub(crate) fn new(group: Arc<Group>, id: TableId) -> Self {
        Self {
            group,
            id,
            attached: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    pub(crate) fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }

    pub(crate) fn group(&self) -> &Arc<Group> {
        &self.group
    }

    pub(crate) fn read<R>(
        &self,
        f: impl FnOnce(&TableData) -> Result<R, CollectionError>,
    ) -> Result<R, CollectionError> {
        if !self.is_attached() {
            return Err(CollectionError::Invalidated);
        }
        self.group.read(|state| f(state.table(self.id)?))
    }

    fn write<R>(
        &self,
        operation: &str,
        f: impl FnOnce(&mut GroupState, TableId, u64) -> Result<R, CollectionError>,
    ) -> Result<R, CollectionError> {
        if !self.is_attached() {
            return Err(CollectionError::Invalidated);
        }
        let id = self.id;
        self.group.write(operation, |state, stamp| f(state, id, stamp))
    }

    pub fn name(&self) -> Result<String, CollectionError> {
        self.read(|t| Ok(t.name().to_string()))
    }

    pub fn schema(&self) -> Result<TableSchema, CollectionError> {
        self.read(|t| Ok(t.schema.clone()))
    }

    pub fn size(&self) -> Result<usize, CollectionError> {
        self.read(|t| Ok(t.size()))
    }

    pub fn keys(&self) -> Result<Vec<RowKey>, CollectionError> {
        self.read(|t| Ok(t.order.iter().copied().collect()))
    }

    pub fn row_key(&self, index: usize) -> Result<RowKey, CollectionError> {
        self.read(|t| t.key_at(index))
    }

    pub fn position_of(&self, key: RowKey) -> Result<Option<usize>, CollectionError> {
        self.read(|t| Ok(t.position_of(key)))
    }

    pub fn contains_key(&self, key: RowKey) -> bool {
        self.read(|t| Ok(t.contains(key))).unwrap_or(false)
    }

    pub fn get(&self, index: usize, column: usize) -> Result<Value, CollectionError> {
        self.read(|t| t.get(t.key_at(index)?, column))
    }

    pub fn get_by_key(&self, key: RowKey, column: usize) -> Result<Value, CollectionError> {
        self.read(|t| t.get(key, column))
    }

    pub(crate) fn set(
        &self,
        index: usize,
        column: usize,
        value: Value,
    ) -> Result<(), CollectionError> {
        self.write("set a value", |state, id, stamp| {
            let table = state.table_mut(id)?;
            let key = table.key_at(index)?;
            table.set(key, column, value, stamp)
        })
    }

    pub(crate) fn set_by_key(
        &self,
        key: RowKey,
        column: usize,
        value: Value,
    ) -> Result<(), CollectionError> {
        self.write("set a value", |state, id, stamp| {
            state.table_mut(id)?.set(key, column, value, stamp)
        })
    }

    /// Appends a row holding column defaults and returns its index.
    pub(crate) fn add_empty_row(&self) -> Result<usize, CollectionError> {
        self.write("add a row", |state, id, stamp| {
            let index = state.table(id)?.size();
            state.insert_row(id, index, stamp)?;
            Ok(index)
        })
    }

    pub(crate) fn insert_empty_row(&self, index: usize) -> Result<(), CollectionError> {
        self.write("insert a row", |state, id, stamp| {
            state.insert_row(id, index, stamp).map(|_| ())
        })
    }

    /// Inserts a row and writes `value` into `column`. The value is checked
    /// before the row exists, so a rejected value leaves the table untouched.
    pub(crate) fn insert_row_with(
        &self,
        index: usize,
        column: usize,
        value: Value,
    ) -> Result<(), CollectionError> {
        self.write("insert a row", |state, id, stamp| {
            let table = state.table(id)?;
            table.check_value(column, &value)?;
            if index > table.size() {
                return Err(CollectionError::out_of_bounds(index, table.size()));
            }
            let key = state.insert_row(id, index, stamp)?;
            state.table_mut(id)?.set(key, column, value, stamp)
        })
    }

    pub(crate) fn remove(&self, index: usize) -> Result<(), CollectionError> {
        self.write("remove a row", |state, id, stamp| {
            state.remove_row(id, index, stamp).map(|_| ())
        })
    }

    pub(crate) fn remove_by_key(&self, key: RowKey) -> Result<(), CollectionError> {
        self.write("remove a row", |state, id, stamp| {
            let index = state
                .table(id)?
                .position_of(key)
                .ok_or(CollectionError::Invalidated)?;
            state.remove_row(id, index, stamp).map(|_| ())
        })
    }

    pub(crate) fn swap_rows(&self, a: usize, b: usize) -> Result<(), CollectionError> {
        self.write("swap rows", |state, id, stamp| {
            let table = state.table_mut(id)?;
            table.swap(a, b)?;
            let owner = table.owner;
            if let Some(owner) = owner {
                state.touch_owner(owner, stamp);
            }
            Ok(())
        })
    }

    pub(crate) fn move_row(&self, from: usize, to: usize) -> Result<(), CollectionError> {
        self.write("move a row", |state, id, stamp| {
            let table = state.table_mut(id)?;
            table.move_row(from, to)?;
            let owner = table.owner;
            if let Some(owner) = owner {
                state.touch_owner(owner, stamp);
            }
            Ok(())
        })
    }

    pub(crate) fn clear(&self) -> Result<(), CollectionError> {
        self.write("clear a table", |state, id, stamp| state.clear_table(id, stamp))
    }

    pub fn find_first(
        &self,
        column: usize,
        value: &Value,
    ) -> Result<Option<usize>, CollectionError> {
        self.read(|t| t.find_first(column, value))
    }

    pub fn find_first_null(&self, column: usize) -> Result<Option<usize>, CollectionError> {
        self.read(|t| t.find_first_null(column))
    }

    /// Link list stored in `column` of the row at `index`.
    pub fn link_list(
        self: &Arc<Self>,
        column: usize,
        index: usize,
    ) -> Result<LinkListRef, CollectionError> {
        let (location, target) = self.read(|t| {
            let def = t.column_def(column)?;
            let ColumnType::LinkList { target } = &def.col_type else {
                return Err(CollectionError::TypeMismatch {
                    column: def.name.clone(),
                    expected: "link list".into(),
                    actual: def.col_type.to_string(),
                });
            };
            let location = ListLocation {
                origin: self.id,
                column,
                row: t.key_at(index)?,
            };
            Ok((location, target.clone()))
        })?;
        let target = self
            .group
            .table(&target)
            .ok_or(CollectionError::TableNotFound(target))?;
        Ok(self
            .group
            .link_list_accessor(Arc::clone(self), location, target))
    }

    /// Hidden table holding the scalar list stored in `column` of the row at `index`.
    pub fn subtable(&self, column: usize, index: usize) -> Result<TableRef, CollectionError> {
        let id = self.read(|t| {
            let def = t.column_def(column)?;
            if !matches!(def.col_type, ColumnType::List(_)) {
                return Err(CollectionError::TypeMismatch {
                    column: def.name.clone(),
                    expected: "list".into(),
                    actual: def.col_type.to_string(),
                });
            }
            let key = t.key_at(index)?;
            t.subtables
                .get(&(column, key))
                .copied()
                .ok_or(CollectionError::Invalidated)
        })?;
        Ok(self.group.table_accessor(id))
    }

    /// Position of the row owning this table, for tables backing a scalar list.
    pub fn parent_row_index(&self) -> Result<Option<usize>, CollectionError> {
        let Some(owner) = self.read(|t| Ok(t.owner))? else {
            return Ok(None);
        };
        self.group
            .read(|state| Ok(state.table(owner.table)?.position_of(owner.row)))
    }

    pub fn row(self: &Arc<Self>, index: usize) -> Result<RowRef, CollectionError> {
        let key = self.row_key(index)?;
        Ok(RowRef::new(Arc::clone(self), key))
    }

    pub fn row_states(&self, keys: &[RowKey]) -> Result<Vec<(RowKey, u64)>, CollectionError> {
        self.read(|t| Ok(t.row_states(keys)))
    }

    pub fn all_row_states(&self) -> Result<Vec<(RowKey, u64)>, CollectionError> {
        self.read(|t| {
            let keys: Vec<RowKey> = t.order.iter().copied().collect();
            Ok(t.row_states(&keys))
        })
    }

    /// Values of `column` for `keys` (or every row, in table order). Missing rows are skipped.
    pub fn column_values(
        &self,
        column: usize,
        keys: Option<&[RowKey]>,
    ) -> Result<Vec<Value>, CollectionError> {
        self.read(|t| {
            t.column_def(column)?;
            let pick = |key: &RowKey| t.row(*key).map(|row| row.values[column].clone());
            Ok(match keys {
                Some(keys) => keys.iter().filter_map(pick).collect(),
                None => t.order.iter().filter_map(pick).collect(),
            })
        })
    }
}

/// Handle to the link list stored in one cell of an origin table.
pub struct LinkListAccessor {
    origin: TableRef,
    location: ListLocation,
    target: TableRef,
    attached: AtomicBool,
}

impl fmt::Debug for LinkListAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkListAccessor")
            .field("origin", &self.location.origin)
            .field("column", &self.location.column)
            .field("row", &self.location.row)
            .field("target", &self.target.id())
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl LinkListAccessor {
    pub(crate) fn new(origin: TableRef, location: ListLocation, target: TableRef) -> Self {
        Self {
            origin,
            location,
            target,
            attached: AtomicBool::new(true),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
            && self.origin.is_attached()
            && self.target.is_attached()
    }

    pub(crate) fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }

    pub fn origin(&self) -> &TableRef {
        &self.origin
    }

    pub fn target(&self) -> &TableRef {
        &self.target
    }

    pub fn column(&self) -> usize {
        self.location.column
    }

    pub fn origin_row_index(&self) -> Result<usize, CollectionError> {
        if !self.is_attached() {
            return Err(CollectionError::Invalidated);
        }
        self.origin
            .position_of(self.location.row)?
            .ok_or(CollectionError::Invalidated)
    }

    fn read<R>(
        &self,
        f: impl FnOnce(&Vector<RowKey>) -> Result<R, CollectionError>,
    ) -> Result<R, CollectionError> {
        if !self.is_attached() {
            return Err(CollectionError::Invalidated);
        }
        self.origin
            .group()
            .read(|state| f(state.link_list(self.location)?))
    }

    fn write<R>(
        &self,
        operation: &str,
        f: impl FnOnce(&mut Vector<RowKey>) -> Result<R, CollectionError>,
    ) -> Result<R, CollectionError> {
        if !self.is_attached() {
            return Err(CollectionError::Invalidated);
        }
        let location = self.location;
        self.origin.group().write(operation, |state, stamp| {
            f(state.link_list_mut(location, stamp)?)
        })
    }

    /// Like `write`, but rejects `key` unless it names a live row of the target table.
    fn write_link<R>(
        &self,
        operation: &str,
        key: RowKey,
        f: impl FnOnce(&mut Vector<RowKey>) -> Result<R, CollectionError>,
    ) -> Result<R, CollectionError> {
        if !self.is_attached() {
            return Err(CollectionError::Invalidated);
        }
        let location = self.location;
        let target = self.target.id();
        self.origin.group().write(operation, |state, stamp| {
            if !state.table(target)?.contains(key) {
                return Err(CollectionError::Invalidated);
            }
            f(state.link_list_mut(location, stamp)?)
        })
    }

    pub fn size(&self) -> Result<usize, CollectionError> {
        self.read(|links| Ok(links.len()))
    }

    pub fn get(&self, index: usize) -> Result<RowKey, CollectionError> {
        self.read(|links| {
            links
                .get(index)
                .copied()
                .ok_or_else(|| CollectionError::out_of_bounds(index, links.len()))
        })
    }

    pub fn keys(&self) -> Result<Vec<RowKey>, CollectionError> {
        self.read(|links| Ok(links.iter().copied().collect()))
    }

    pub fn find(&self, key: RowKey) -> Result<Option<usize>, CollectionError> {
        self.read(|links| Ok(links.index_of(&key)))
    }

    pub(crate) fn add(&self, key: RowKey) -> Result<(), CollectionError> {
        self.write_link("add a link", key, |links| {
            links.push_back(key);
            Ok(())
        })
    }

    pub(crate) fn insert(&self, index: usize, key: RowKey) -> Result<(), CollectionError> {
        self.write_link("insert a link", key, |links| {
            if index > links.len() {
                return Err(CollectionError::out_of_bounds(index, links.len()));
            }
            links.insert(index, key);
            Ok(())
        })
    }

    pub(crate) fn set(&self, index: usize, key: RowKey) -> Result<(), CollectionError> {
        self.write_link("set a link", key, |links| {
            if index >= links.len() {
                return Err(CollectionError::out_of_bounds(index, links.len()));
            }
            links.set(index, key);
            Ok(())
        })
    }

    pub(crate) fn remove(&self, index: usize) -> Result<(), CollectionError> {
        self.write("remove a link", |links| {
            if index >= links.len() {
                return Err(CollectionError::out_of_bounds(index, links.len()));
            }
            links.remove(index);
            Ok(())
        })
    }

    pub(crate) fn move_item(&self, from: usize, to: usize) -> Result<(), CollectionError> {
        self.write("move a link", |links| {
            let size = links.len();
            if from >= size || to >= size {
                return Err(CollectionError::out_of_bounds(from.max(to), size));
            }
            let key = links.remove(from);
            links.insert(to, key);
            Ok(())
        })
    }

    pub(crate) fn swap(&self, a: usize, b: usize) -> Result<(), CollectionError> {
        self.write("swap links", |links| {
            let size = links.len();
            if a >= size || b >= size {
                return Err(CollectionError::out_of_bounds(a.max(b), size));
            }
            links.swap(a, b);
            Ok(())
        })
    }

    pub(crate) fn clear(&self) -> Result<(), CollectionError> {
        self.write("clear a link list", |links| {
            links.clear();
            Ok(())
        })
    }

    /// Deletes every target row this list links to. Links to those rows in
    /// other lists go away with them.
    pub(crate) fn remove_all_target_rows(&self) -> Result<(), CollectionError> {
        if !self.is_attached() {
            return Err(CollectionError::Invalidated);
        }
        let location = self.location;
        let target = self.target.id();
        self.origin
            .group()
            .write("delete linked rows", |state, stamp| {
                let links = state.link_list(location)?.clone();
                for key in links.iter() {
                    if let Some(index) = state.table(target)?.position_of(*key) {
                        state.remove_row(target, index, stamp)?;
                    }
                }
                state.link_list_mut(location, stamp)?.clear();
                Ok(())
            })
    }
}

/// Stable reference to one row. Resolves its position on every access.
///
/// A row is confined to the thread that resolved it, like the session it
/// came from; reads and writes from any other thread fail.
#[derive(Clone)]
pub struct RowRef {
    table: TableRef,
    key: RowKey,
    confinement: ThreadConfinement,
}

impl fmt::Debug for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowRef")
            .field("table", &self.table.id())
            .field("key", &self.key)
            .field("owner", &self.confinement.owner())
            .finish()
    }
}

impl PartialEq for RowRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.table, &other.table) && self.key == other.key
    }
}

impl Eq for RowRef {}

impl RowRef {
    pub(crate) fn new(table: TableRef, key: RowKey) -> Self {
        Self {
            table,
            key,
            confinement: ThreadConfinement::current(),
        }
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn key(&self) -> RowKey {
        self.key
    }

    pub fn is_attached(&self) -> bool {
        self.table.contains_key(self.key)
    }

    pub fn index(&self) -> Result<usize, CollectionError> {
        self.confinement.verify()?;
        self.table
            .position_of(self.key)?
            .ok_or(CollectionError::Invalidated)
    }

    pub fn get(&self, column: usize) -> Result<Value, CollectionError> {
        self.confinement.verify()?;
        self.table.get_by_key(self.key, column)
    }

    pub(crate) fn set(&self, column: usize, value: Value) -> Result<(), CollectionError> {
        self.confinement.verify()?;
        self.table.set_by_key(self.key, column, value)
    }
}
