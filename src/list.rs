//! Live handle over a list property.
//!
//! A [`List`] references its storage rather than copying it: clones share the
//! same link list or backing table, and every operation re-checks that the
//! storage still exists before touching it.

use crate::catalog::schema::{ColumnDef, ObjectSchema};
use crate::catalog::types::{ColumnType, Value};
use crate::context::AccessorContext;
use crate::error::CollectionError;
use crate::notifications::notifier::{NotifierEntry, NotifierKey, NotifierSource};
use crate::notifications::{CollectionCallback, CollectionChangeSet, NotificationToken};
use crate::object::Object;
use crate::projection::{self, Projection, SearchTarget, check_column};
use crate::query::plan::{Expr, Query, Sort, SortDescriptor};
use crate::results::{PrimitiveResults, Results};
use crate::session::Session;
use crate::storage::{LinkListRef, RowKey, RowRef, TableRef};
use parking_lot::Mutex;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock, Weak};

#[derive(Clone)]
enum StoredLocation {
    LinkList(LinkListRef),
    /// Single-column table holding the elements of a scalar list.
    Table(TableRef),
}

impl StoredLocation {
    fn is_attached(&self) -> bool {
        match self {
            StoredLocation::LinkList(list) => list.is_attached(),
            StoredLocation::Table(table) => table.is_attached(),
        }
    }

    fn address(&self) -> usize {
        match self {
            StoredLocation::LinkList(list) => Arc::as_ptr(list).cast::<()>() as usize,
            StoredLocation::Table(table) => Arc::as_ptr(table).cast::<()>() as usize,
        }
    }
}

/// Ordered collection of links to rows, or of scalars.
///
/// `List::default()` is unattached and fails every operation with
/// `Invalidated`.
#[derive(Default)]
pub struct List {
    session: Option<Session>,
    location: Option<StoredLocation>,
    object_schema: OnceLock<ObjectSchema>,
    notifier: Mutex<Weak<NotifierEntry>>,
}

impl Clone for List {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            location: self.location.clone(),
            object_schema: self.object_schema.clone(),
            notifier: Mutex::new(self.notifier.lock().clone()),
        }
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = match &self.location {
            None => "unattached",
            Some(StoredLocation::LinkList(_)) => "link_list",
            Some(StoredLocation::Table(_)) => "table",
        };
        f.debug_struct("List")
            .field("location", &location)
            .field("session", &self.session.as_ref().map(Session::id))
            .finish()
    }
}

/// Two handles are equal when they reference the same storage.
impl PartialEq for List {
    fn eq(&self, other: &Self) -> bool {
        match (&self.location, &other.location) {
            (Some(StoredLocation::LinkList(a)), Some(StoredLocation::LinkList(b))) => {
                Arc::ptr_eq(a, b)
            }
            (Some(StoredLocation::Table(a)), Some(StoredLocation::Table(b))) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for List {}

impl Hash for List {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.location.as_ref().map(StoredLocation::address).hash(state);
    }
}

fn link_only(operation: &'static str) -> CollectionError {
    CollectionError::UnsupportedOperation {
        operation,
        reason: "only available on lists of objects".into(),
    }
}

fn scalar_only(operation: &'static str) -> CollectionError {
    CollectionError::UnsupportedOperation {
        operation,
        reason: "only available on lists of values".into(),
    }
}

impl List {
    pub(crate) fn from_link_list(session: Session, list: LinkListRef) -> Self {
        Self {
            session: Some(session),
            location: Some(StoredLocation::LinkList(list)),
            ..Self::default()
        }
    }

    pub(crate) fn from_table(session: Session, table: TableRef) -> Self {
        Self {
            session: Some(session),
            location: Some(StoredLocation::Table(table)),
            ..Self::default()
        }
    }

    /// Thread first, then attachment.
    fn attached(&self) -> Result<(&Session, &StoredLocation), CollectionError> {
        let (Some(session), Some(location)) = (&self.session, &self.location) else {
            return Err(CollectionError::Invalidated);
        };
        session.verify_handle()?;
        if !location.is_attached() {
            return Err(CollectionError::Invalidated);
        }
        Ok((session, location))
    }

    fn writable(&self, operation: &str) -> Result<&StoredLocation, CollectionError> {
        let (session, location) = self.attached()?;
        session.verify_in_transaction(operation)?;
        Ok(location)
    }

    fn link_list(&self, operation: &'static str) -> Result<&LinkListRef, CollectionError> {
        match self.attached()?.1 {
            StoredLocation::LinkList(list) => Ok(list),
            StoredLocation::Table(_) => Err(link_only(operation)),
        }
    }

    fn value_table(&self, operation: &'static str) -> Result<&TableRef, CollectionError> {
        match self.attached()?.1 {
            StoredLocation::Table(table) => Ok(table),
            StoredLocation::LinkList(_) => Err(scalar_only(operation)),
        }
    }

    fn writable_link_list(&self, operation: &'static str) -> Result<&LinkListRef, CollectionError> {
        match self.writable(operation)? {
            StoredLocation::LinkList(list) => Ok(list),
            StoredLocation::Table(_) => Err(link_only(operation)),
        }
    }

    fn writable_value_table(&self, operation: &'static str) -> Result<&TableRef, CollectionError> {
        match self.writable(operation)? {
            StoredLocation::Table(table) => Ok(table),
            StoredLocation::LinkList(_) => Err(scalar_only(operation)),
        }
    }

    fn value_column(table: &TableRef) -> Result<ColumnDef, CollectionError> {
        table.read(|t| t.column_def(0).cloned())
    }

    /// `Ok(false)` once the storage is gone; errors only on a thread violation.
    pub fn is_valid(&self) -> Result<bool, CollectionError> {
        let (Some(session), Some(location)) = (&self.session, &self.location) else {
            return Ok(false);
        };
        session.verify_thread()?;
        Ok(!session.is_closed() && location.is_attached())
    }

    pub fn verify_attached(&self) -> Result<(), CollectionError> {
        self.attached().map(|_| ())
    }

    pub fn verify_in_transaction(&self) -> Result<(), CollectionError> {
        self.writable("modify a list").map(|_| ())
    }

    pub fn size(&self) -> Result<usize, CollectionError> {
        match self.attached()?.1 {
            StoredLocation::LinkList(list) => list.size(),
            StoredLocation::Table(table) => table.size(),
        }
    }

    pub fn is_empty(&self) -> Result<bool, CollectionError> {
        Ok(self.size()? == 0)
    }

    pub fn get<T: Projection>(&self, index: usize) -> Result<T, CollectionError> {
        projection::read(self.value_table("get a value")?, index, 0)
    }

    pub fn get_value(&self, index: usize) -> Result<Value, CollectionError> {
        self.value_table("get a value")?.get(index, 0)
    }

    /// Target row linked at `index`.
    pub fn get_row(&self, index: usize) -> Result<RowRef, CollectionError> {
        let list = self.link_list("get a row")?;
        let key = list.get(index)?;
        Ok(RowRef::new(list.target().clone(), key))
    }

    pub fn get_object(&self, index: usize) -> Result<Object, CollectionError> {
        let row = self.get_row(index)?;
        let session = self.attached()?.0;
        Object::from_row(session, row)
    }

    pub fn add<T: Projection>(&self, value: T) -> Result<(), CollectionError> {
        let table = self.writable_value_table("add a value")?;
        table.read(|t| check_column::<T>(t.column_def(0)?))?;
        table.insert_row_with(table.size()?, 0, value.into_value())
    }

    pub fn add_value(&self, value: Value) -> Result<(), CollectionError> {
        let table = self.writable_value_table("add a value")?;
        table.insert_row_with(table.size()?, 0, value)
    }

    /// Inserting at `size()` appends.
    pub fn insert<T: Projection>(&self, index: usize, value: T) -> Result<(), CollectionError> {
        let table = self.writable_value_table("insert a value")?;
        table.read(|t| check_column::<T>(t.column_def(0)?))?;
        table.insert_row_with(index, 0, value.into_value())
    }

    pub fn insert_value(&self, index: usize, value: Value) -> Result<(), CollectionError> {
        self.writable_value_table("insert a value")?
            .insert_row_with(index, 0, value)
    }

    pub fn set<T: Projection>(&self, index: usize, value: T) -> Result<(), CollectionError> {
        projection::write(self.writable_value_table("set a value")?, index, 0, value)
    }

    pub fn set_value(&self, index: usize, value: Value) -> Result<(), CollectionError> {
        self.writable_value_table("set a value")?.set(index, 0, value)
    }

    fn target_key(list: &LinkListRef, row: &RowRef) -> Result<RowKey, CollectionError> {
        if !Arc::ptr_eq(row.table(), list.target()) {
            return Err(CollectionError::WrongTargetTable {
                expected: list.target().name()?,
                actual: row.table().name()?,
            });
        }
        if !row.is_attached() {
            return Err(CollectionError::Invalidated);
        }
        Ok(row.key())
    }

    /// Appends a link to `row`, which must belong to the target table.
    pub fn add_row(&self, row: &RowRef) -> Result<(), CollectionError> {
        let list = self.writable_link_list("add a link")?;
        list.add(Self::target_key(list, row)?)
    }

    pub fn insert_row(&self, index: usize, row: &RowRef) -> Result<(), CollectionError> {
        let list = self.writable_link_list("insert a link")?;
        list.insert(index, Self::target_key(list, row)?)
    }

    pub fn set_row(&self, index: usize, row: &RowRef) -> Result<(), CollectionError> {
        let list = self.writable_link_list("set a link")?;
        list.set(index, Self::target_key(list, row)?)
    }

    /// Appends a link to the target row at `target_index`.
    pub fn add_link(&self, target_index: usize) -> Result<(), CollectionError> {
        let list = self.writable_link_list("add a link")?;
        list.add(list.target().row_key(target_index)?)
    }

    pub fn insert_link(&self, index: usize, target_index: usize) -> Result<(), CollectionError> {
        let list = self.writable_link_list("insert a link")?;
        list.insert(index, list.target().row_key(target_index)?)
    }

    pub fn set_link(&self, index: usize, target_index: usize) -> Result<(), CollectionError> {
        let list = self.writable_link_list("set a link")?;
        list.set(index, list.target().row_key(target_index)?)
    }

    /// Removes the element at `index`. Target rows are left alone.
    pub fn remove(&self, index: usize) -> Result<(), CollectionError> {
        match self.writable("remove an element")? {
            StoredLocation::LinkList(list) => list.remove(index),
            StoredLocation::Table(table) => table.remove(index),
        }
    }

    pub fn remove_all(&self) -> Result<(), CollectionError> {
        match self.writable("remove all elements")? {
            StoredLocation::LinkList(list) => list.clear(),
            StoredLocation::Table(table) => table.clear(),
        }
    }

    pub fn move_item(&self, from: usize, to: usize) -> Result<(), CollectionError> {
        match self.writable("move an element")? {
            StoredLocation::LinkList(list) => list.move_item(from, to),
            StoredLocation::Table(table) => table.move_row(from, to),
        }
    }

    pub fn swap(&self, a: usize, b: usize) -> Result<(), CollectionError> {
        match self.writable("swap elements")? {
            StoredLocation::LinkList(list) => list.swap(a, b),
            StoredLocation::Table(table) => table.swap_rows(a, b),
        }
    }

    /// Deletes the linked target rows themselves, or every value of a scalar list.
    pub fn delete_all(&self) -> Result<(), CollectionError> {
        match self.writable("delete all elements")? {
            StoredLocation::LinkList(list) => list.remove_all_target_rows(),
            StoredLocation::Table(table) => table.clear(),
        }
    }

    /// `find(None::<T>)` looks for a null element, never for a default value.
    pub fn find<T: Projection>(&self, value: T) -> Result<Option<usize>, CollectionError> {
        projection::find(self.value_table("find a value")?, 0, value)
    }

    pub fn find_value(&self, value: &Value) -> Result<Option<usize>, CollectionError> {
        SearchTarget::for_value(value.clone()).find_in_table(self.value_table("find a value")?, 0)
    }

    /// Index of the first link to `row`. A removed row is never found.
    pub fn find_row(&self, row: &RowRef) -> Result<Option<usize>, CollectionError> {
        let list = self.link_list("find a row")?;
        if !row.is_attached() {
            return Ok(None);
        }
        list.find(Self::target_key(list, row)?)
    }

    fn query(&self) -> Result<Query, CollectionError> {
        Ok(match self.attached()?.1 {
            StoredLocation::LinkList(list) => Query::for_link_list(list.clone()),
            StoredLocation::Table(table) => Query::new(table.clone()),
        })
    }

    pub fn get_query(&self) -> Result<Query, CollectionError> {
        self.query()
    }

    fn session(&self) -> Result<Session, CollectionError> {
        Ok(self.attached()?.0.clone())
    }

    /// Live view over the elements, in list order.
    pub fn as_results(&self) -> Result<Results, CollectionError> {
        let session = self.session()?;
        Ok(match self.attached()?.1 {
            StoredLocation::LinkList(list) => Results::from_query(
                session,
                Query::for_link_list(list.clone()),
                SortDescriptor::default(),
            ),
            StoredLocation::Table(table) => Results::from_table(session, table.clone()),
        })
    }

    pub fn sort(&self, sort: SortDescriptor) -> Result<Results, CollectionError> {
        Ok(Results::from_query(self.session()?, self.query()?, sort))
    }

    pub fn filter(&self, predicate: Expr) -> Result<Results, CollectionError> {
        let session = self.session()?;
        predicate.validate_depth(session.config().max_expr_depth)?;
        let query = self.query()?.and_where(predicate);
        Ok(Results::from_query(session, query, SortDescriptor::default()))
    }

    /// Frozen view of the current elements.
    pub fn snapshot(&self) -> Result<Results, CollectionError> {
        self.as_results()?.snapshot()
    }

    pub fn sort_values(&self, sort: Sort) -> Result<PrimitiveResults, CollectionError> {
        let table = self.value_table("sort values")?;
        Ok(PrimitiveResults::new(Results::from_query(
            self.session()?,
            Query::new(table.clone()),
            SortDescriptor::for_values(sort),
        )))
    }

    pub fn primitive_results(&self) -> Result<PrimitiveResults, CollectionError> {
        let table = self.value_table("view values")?;
        Ok(PrimitiveResults::new(Results::from_table(
            self.session()?,
            table.clone(),
        )))
    }

    /// Column of the target table for object lists; ignored for scalar lists.
    fn aggregate_column(&self, column: usize) -> Result<usize, CollectionError> {
        Ok(match self.attached()?.1 {
            StoredLocation::LinkList(_) => column,
            StoredLocation::Table(_) => 0,
        })
    }

    pub fn max(&self, column: usize) -> Result<Option<Value>, CollectionError> {
        self.as_results()?.max(self.aggregate_column(column)?)
    }

    pub fn min(&self, column: usize) -> Result<Option<Value>, CollectionError> {
        self.as_results()?.min(self.aggregate_column(column)?)
    }

    pub fn sum(&self, column: usize) -> Result<Option<Value>, CollectionError> {
        self.as_results()?.sum(self.aggregate_column(column)?)
    }

    pub fn average(&self, column: usize) -> Result<Option<f64>, CollectionError> {
        self.as_results()?.average(self.aggregate_column(column)?)
    }

    /// Index of the row owning this list.
    pub fn get_origin_row_index(&self) -> Result<usize, CollectionError> {
        match self.attached()?.1 {
            StoredLocation::LinkList(list) => list.origin_row_index(),
            StoredLocation::Table(table) => table
                .parent_row_index()?
                .ok_or(CollectionError::Invalidated),
        }
    }

    /// Schema of the object type this list links to.
    pub fn get_object_schema(&self) -> Result<ObjectSchema, CollectionError> {
        let list = self.link_list("get the object schema")?;
        if let Some(schema) = self.object_schema.get() {
            return Ok(schema.clone());
        }
        let table_schema = list.target().schema()?;
        let schema = ObjectSchema::from_table(&table_schema)
            .ok_or(CollectionError::TableNotFound(table_schema.table_name))?;
        Ok(self.object_schema.get_or_init(|| schema).clone())
    }

    /// Element type: the target table's name or a scalar type.
    pub fn element_type(&self) -> Result<ColumnType, CollectionError> {
        Ok(match self.attached()?.1 {
            StoredLocation::LinkList(list) => ColumnType::LinkList {
                target: list.target().name()?,
            },
            StoredLocation::Table(table) => {
                let def = Self::value_column(table)?;
                ColumnType::List(def.scalar_type().ok_or(CollectionError::Invalidated)?)
            }
        })
    }

    /// Handles referencing the same storage share one registry entry.
    pub fn add_notification_callback(
        &self,
        callback: impl FnMut(&CollectionChangeSet, Option<&CollectionError>) + Send + 'static,
    ) -> Result<NotificationToken, CollectionError> {
        let (session, location) = self.attached()?;
        let entry = {
            let mut cached = self.notifier.lock();
            match cached.upgrade() {
                Some(entry) => entry,
                None => {
                    let entry = session.coordinator().find_or_register(
                        session.id(),
                        NotifierKey::Location(location.address()),
                        || match location {
                            StoredLocation::LinkList(list) => {
                                NotifierSource::LinkList(list.clone())
                            }
                            StoredLocation::Table(table) => NotifierSource::Table(table.clone()),
                        },
                    )?;
                    *cached = Arc::downgrade(&entry);
                    entry
                }
            }
        };
        let callback: CollectionCallback = Box::new(callback);
        let token_id = entry.add_callback(callback)?;
        Ok(NotificationToken::new(entry, token_id))
    }

    pub fn get_with<C: AccessorContext>(
        &self,
        ctx: &C,
        index: usize,
    ) -> Result<C::Boxed, CollectionError> {
        match self.attached()?.1 {
            StoredLocation::LinkList(_) => ctx.box_row(&self.get_row(index)?),
            StoredLocation::Table(_) => Ok(ctx.box_value(&self.get_value(index)?)),
        }
    }

    fn unbox<C: AccessorContext>(
        &self,
        ctx: &C,
        table: &TableRef,
        boxed: &C::Boxed,
    ) -> Result<Value, CollectionError> {
        let def = Self::value_column(table)?;
        let value_type = def.scalar_type().ok_or(CollectionError::Invalidated)?;
        match ctx.unbox_value(boxed, value_type, def.nullable) {
            Err(CollectionError::NotNullable { .. }) => Err(CollectionError::NotNullable {
                table: table.name()?,
                column: def.name,
            }),
            unboxed => unboxed,
        }
    }

    /// Object lists take a boxed target row index; scalar lists a boxed value.
    pub fn add_with<C: AccessorContext>(
        &self,
        ctx: &C,
        boxed: &C::Boxed,
    ) -> Result<(), CollectionError> {
        match self.writable("add an element")? {
            StoredLocation::LinkList(_) => self.add_link(ctx.unbox_row_index(boxed)?),
            StoredLocation::Table(table) => {
                let value = self.unbox(ctx, table, boxed)?;
                self.add_value(value)
            }
        }
    }

    pub fn insert_with<C: AccessorContext>(
        &self,
        ctx: &C,
        index: usize,
        boxed: &C::Boxed,
    ) -> Result<(), CollectionError> {
        match self.writable("insert an element")? {
            StoredLocation::LinkList(_) => self.insert_link(index, ctx.unbox_row_index(boxed)?),
            StoredLocation::Table(table) => {
                let value = self.unbox(ctx, table, boxed)?;
                self.insert_value(index, value)
            }
        }
    }

    pub fn set_with<C: AccessorContext>(
        &self,
        ctx: &C,
        index: usize,
        boxed: &C::Boxed,
    ) -> Result<(), CollectionError> {
        match self.writable("set an element")? {
            StoredLocation::LinkList(_) => self.set_link(index, ctx.unbox_row_index(boxed)?),
            StoredLocation::Table(table) => {
                let value = self.unbox(ctx, table, boxed)?;
                self.set_value(index, value)
            }
        }
    }

    pub fn find_with<C: AccessorContext>(
        &self,
        ctx: &C,
        boxed: &C::Boxed,
    ) -> Result<Option<usize>, CollectionError> {
        match self.attached()?.1 {
            StoredLocation::LinkList(list) => {
                let row = list.target().row(ctx.unbox_row_index(boxed)?)?;
                self.find_row(&row)
            }
            StoredLocation::Table(table) => {
                if ctx.is_null(boxed) {
                    return table.find_first_null(0);
                }
                let value = self.unbox(ctx, table, boxed)?;
                self.find_value(&value)
            }
        }
    }
}
