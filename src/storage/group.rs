use crate::catalog::schema::TableSchema;
use crate::catalog::types::ColumnType;
use crate::error::CollectionError;
use crate::storage::accessor::{LinkListAccessor, LinkListRef, TableAccessor, TableRef};
use crate::storage::table::{Owner, RowKey, TableData, TableId};
use im::{OrdMap, Vector};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap as StdHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Every table of a database. Cloning is O(1); write transactions keep a
/// clone as their rollback point.
#[derive(Debug, Clone, Default)]
pub struct GroupState {
    pub(crate) tables: OrdMap<TableId, TableData>,
    pub(crate) names: OrdMap<String, TableId>,
    pub(crate) next_table_id: u64,
    pub(crate) next_row_key: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ListLocation {
    pub origin: TableId,
    pub column: usize,
    pub row: RowKey,
}

impl GroupState {
    pub(crate) fn table(&self, id: TableId) -> Result<&TableData, CollectionError> {
        self.tables.get(&id).ok_or(CollectionError::Invalidated)
    }

    pub(crate) fn table_mut(&mut self, id: TableId) -> Result<&mut TableData, CollectionError> {
        self.tables.get_mut(&id).ok_or(CollectionError::Invalidated)
    }

    pub(crate) fn table_id(&self, name: &str) -> Option<TableId> {
        self.names.get(name).copied()
    }

    fn allocate_table_id(&mut self) -> TableId {
        self.next_table_id += 1;
        TableId(self.next_table_id)
    }

    fn allocate_row_key(&mut self) -> RowKey {
        self.next_row_key += 1;
        RowKey(self.next_row_key)
    }

    pub(crate) fn create_table(&mut self, schema: TableSchema) -> Result<TableId, CollectionError> {
        if self.names.contains_key(&schema.table_name) {
            return Err(CollectionError::TableAlreadyExists(schema.table_name));
        }
        for column in &schema.columns {
            if let ColumnType::LinkList { target } = &column.col_type
                && *target != schema.table_name
                && !self.names.contains_key(target)
            {
                return Err(CollectionError::TableNotFound(target.clone()));
            }
        }
        let id = self.allocate_table_id();
        self.names.insert(schema.table_name.clone(), id);
        self.tables.insert(id, TableData::new(id, schema, None));
        Ok(id)
    }

    pub(crate) fn remove_table(&mut self, name: &str) -> Result<(), CollectionError> {
        let id = self
            .names
            .remove(name)
            .ok_or_else(|| CollectionError::TableNotFound(name.to_string()))?;
        self.drop_table(id);
        Ok(())
    }

    fn drop_table(&mut self, id: TableId) {
        if let Some(table) = self.tables.remove(&id) {
            for (_, sub) in table.subtables.iter() {
                self.drop_table(*sub);
            }
        }
    }

    /// Inserts a row and creates the empty link lists and hidden list tables it owns.
    pub(crate) fn insert_row(
        &mut self,
        id: TableId,
        index: usize,
        stamp: u64,
    ) -> Result<RowKey, CollectionError> {
        let key = self.allocate_row_key();
        let table = self.table_mut(id)?;
        table.insert_row(index, key, stamp)?;
        let owner = table.owner;
        let table_name = table.schema.table_name.clone();
        let columns = table.schema.columns.clone();
        for (column, def) in columns.iter().enumerate() {
            match &def.col_type {
                ColumnType::LinkList { .. } => {
                    self.table_mut(id)?
                        .link_lists
                        .insert((column, key), Vector::new());
                }
                ColumnType::List(value_type) => {
                    let sub_id = self.allocate_table_id();
                    let schema = TableSchema::for_list(
                        format!("{table_name}.{}[{}]", def.name, key.0),
                        *value_type,
                        def.nullable,
                    );
                    let owner = Owner {
                        table: id,
                        column,
                        row: key,
                    };
                    self.tables
                        .insert(sub_id, TableData::new(sub_id, schema, Some(owner)));
                    self.table_mut(id)?.subtables.insert((column, key), sub_id);
                }
                ColumnType::Scalar(_) => {}
            }
        }
        if let Some(owner) = owner {
            self.touch_owner(owner, stamp);
        }
        Ok(key)
    }

    /// Removes a row, the tables it owns and every link pointing at it.
    pub(crate) fn remove_row(
        &mut self,
        id: TableId,
        index: usize,
        stamp: u64,
    ) -> Result<RowKey, CollectionError> {
        let table = self.table_mut(id)?;
        let (key, owned) = table.remove_at(index)?;
        let owner = table.owner;
        let table_name = table.schema.table_name.clone();
        for sub in owned {
            self.drop_table(sub);
        }
        self.purge_links(&table_name, key, stamp);
        if let Some(owner) = owner {
            self.touch_owner(owner, stamp);
        }
        Ok(key)
    }

    pub(crate) fn clear_table(&mut self, id: TableId, stamp: u64) -> Result<(), CollectionError> {
        while self.table(id)?.size() > 0 {
            let last = self.table(id)?.size() - 1;
            self.remove_row(id, last, stamp)?;
        }
        Ok(())
    }

    fn purge_links(&mut self, target: &str, key: RowKey, stamp: u64) {
        let origins: Vec<(TableId, Vec<usize>)> = self
            .tables
            .iter()
            .filter_map(|(id, table)| {
                let columns: Vec<usize> = table
                    .schema
                    .columns
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| {
                        matches!(&c.col_type, ColumnType::LinkList { target: t } if t == target)
                    })
                    .map(|(i, _)| i)
                    .collect();
                (!columns.is_empty()).then_some((*id, columns))
            })
            .collect();
        for (id, columns) in origins {
            let Ok(table) = self.table_mut(id) else {
                continue;
            };
            let cells: Vec<(usize, RowKey)> = table
                .link_lists
                .iter()
                .filter(|((column, _), links)| columns.contains(column) && links.contains(&key))
                .map(|(cell, _)| *cell)
                .collect();
            for cell in cells {
                if let Some(links) = table.link_lists.get_mut(&cell) {
                    links.retain(|k| *k != key);
                }
                table.touch(cell.1, stamp);
            }
        }
    }

    pub(crate) fn touch_owner(&mut self, owner: Owner, stamp: u64) {
        if let Ok(table) = self.table_mut(owner.table) {
            table.touch(owner.row, stamp);
        }
    }

    pub(crate) fn link_list(
        &self,
        location: ListLocation,
    ) -> Result<&Vector<RowKey>, CollectionError> {
        self.table(location.origin)?
            .link_lists
            .get(&(location.column, location.row))
            .ok_or(CollectionError::Invalidated)
    }

    pub(crate) fn link_list_mut(
        &mut self,
        location: ListLocation,
        stamp: u64,
    ) -> Result<&mut Vector<RowKey>, CollectionError> {
        let table = self.table_mut(location.origin)?;
        table.touch(location.row, stamp);
        table
            .link_lists
            .get_mut(&(location.column, location.row))
            .ok_or(CollectionError::Invalidated)
    }

    fn list_exists(&self, location: &ListLocation) -> bool {
        self.tables.get(&location.origin).is_some_and(|t| {
            t.link_lists
                .contains_key(&(location.column, location.row))
        })
    }
}

/// Shared root of the reference storage engine.
///
/// Accessors handed out by the group are interned per location and detached
/// for good once their location disappears, including through rollback.
pub struct Group {
    state: RwLock<GroupState>,
    write_snapshot: Mutex<Option<GroupState>>,
    stamp: AtomicU64,
    committed: AtomicU64,
    table_accessors: Mutex<StdHashMap<TableId, Weak<TableAccessor>>>,
    list_accessors: Mutex<StdHashMap<ListLocation, Weak<LinkListAccessor>>>,
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("committed", &self.committed_version())
            .field("content_version", &self.content_version())
            .field("writing", &self.is_writing())
            .finish()
    }
}

impl Group {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(GroupState::default()),
            write_snapshot: Mutex::new(None),
            stamp: AtomicU64::new(0),
            committed: AtomicU64::new(0),
            table_accessors: Mutex::new(StdHashMap::new()),
            list_accessors: Mutex::new(StdHashMap::new()),
        })
    }

    pub fn committed_version(&self) -> u64 {
        self.committed.load(Ordering::Acquire)
    }

    /// Bumped by every write and by rollback. Never decreases.
    pub fn content_version(&self) -> u64 {
        self.stamp.load(Ordering::Acquire)
    }

    pub fn is_writing(&self) -> bool {
        self.write_snapshot.lock().is_some()
    }

    pub(crate) fn begin_write(&self) -> Result<(), CollectionError> {
        let mut snapshot = self.write_snapshot.lock();
        if snapshot.is_some() {
            return Err(CollectionError::WriteInProgress);
        }
        *snapshot = Some(self.state.read().clone());
        Ok(())
    }

    pub(crate) fn commit(&self) -> Result<u64, CollectionError> {
        let mut snapshot = self.write_snapshot.lock();
        if snapshot.take().is_none() {
            return Err(CollectionError::not_in_write("commit"));
        }
        let version = self.committed.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(version, "write transaction committed");
        Ok(version)
    }

    pub(crate) fn rollback(&self) -> Result<(), CollectionError> {
        let restored = self
            .write_snapshot
            .lock()
            .take()
            .ok_or_else(|| CollectionError::not_in_write("roll back"))?;
        {
            // Identities handed out inside the transaction must never be reissued.
            let mut state = self.state.write();
            let next_table_id = state.next_table_id;
            let next_row_key = state.next_row_key;
            *state = restored;
            state.next_table_id = next_table_id;
            state.next_row_key = next_row_key;
        }
        self.stamp.fetch_add(1, Ordering::AcqRel);
        self.sweep();
        debug!("write transaction rolled back");
        Ok(())
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&GroupState) -> R) -> R {
        f(&self.state.read())
    }

    /// Runs a mutation inside the active write transaction, then detaches
    /// accessors whose location it removed.
    pub(crate) fn write<R>(
        &self,
        operation: &str,
        f: impl FnOnce(&mut GroupState, u64) -> Result<R, CollectionError>,
    ) -> Result<R, CollectionError> {
        if !self.is_writing() {
            return Err(CollectionError::not_in_write(operation));
        }
        let result = {
            let mut state = self.state.write();
            let stamp = self.stamp.fetch_add(1, Ordering::AcqRel) + 1;
            f(&mut state, stamp)
        };
        self.sweep();
        result
    }

    pub(crate) fn create_table(
        self: &Arc<Self>,
        schema: TableSchema,
    ) -> Result<TableRef, CollectionError> {
        let id = self.write("create a table", |state, _| state.create_table(schema))?;
        Ok(self.table_accessor(id))
    }

    pub(crate) fn remove_table(&self, name: &str) -> Result<(), CollectionError> {
        self.write("remove a table", |state, _| state.remove_table(name))
    }

    pub fn table(self: &Arc<Self>, name: &str) -> Option<TableRef> {
        let id = self.read(|state| state.table_id(name))?;
        Some(self.table_accessor(id))
    }

    pub fn table_schemas(&self) -> Vec<TableSchema> {
        self.read(|state| {
            state
                .names
                .values()
                .filter_map(|id| state.tables.get(id).map(|t| t.schema.clone()))
                .collect()
        })
    }

    pub(crate) fn table_accessor(self: &Arc<Self>, id: TableId) -> TableRef {
        let mut accessors = self.table_accessors.lock();
        if let Some(existing) = accessors.get(&id).and_then(Weak::upgrade)
            && existing.is_attached()
        {
            return existing;
        }
        let accessor = Arc::new(TableAccessor::new(Arc::clone(self), id));
        accessors.insert(id, Arc::downgrade(&accessor));
        accessor
    }

    pub(crate) fn link_list_accessor(
        self: &Arc<Self>,
        origin: TableRef,
        location: ListLocation,
        target: TableRef,
    ) -> LinkListRef {
        let mut accessors = self.list_accessors.lock();
        if let Some(existing) = accessors.get(&location).and_then(Weak::upgrade)
            && existing.is_attached()
        {
            return existing;
        }
        let accessor = Arc::new(LinkListAccessor::new(origin, location, target));
        accessors.insert(location, Arc::downgrade(&accessor));
        accessor
    }

    fn sweep(&self) {
        let state = self.state.read();
        let mut detached = 0usize;
        self.table_accessors.lock().retain(|id, weak| {
            let Some(accessor) = weak.upgrade() else {
                return false;
            };
            if state.tables.contains_key(id) {
                return true;
            }
            accessor.detach();
            detached += 1;
            false
        });
        self.list_accessors.lock().retain(|location, weak| {
            let Some(accessor) = weak.upgrade() else {
                return false;
            };
            if state.list_exists(location) && accessor.target().is_attached() {
                return true;
            }
            accessor.detach();
            detached += 1;
            false
        });
        if detached > 0 {
            debug!(detached, "detached accessors after structural change");
        }
    }
}
