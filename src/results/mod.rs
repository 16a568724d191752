//! Lazily materialized views over a table, a link list or a query.
//!
//! A `Table` view reads the table directly. A `Query` view materializes on
//! first use and re-materializes whenever the group's content version moves
//! past the cached one. A `TableView` is pinned: snapshots and distinct views
//! never re-run, and rows removed since they were taken read as absent.

mod primitive;

pub use primitive::PrimitiveResults;

use crate::catalog::schema::ColumnDef;
use crate::catalog::types::{Value, ValueType};
use crate::context::AccessorContext;
use crate::error::CollectionError;
use crate::notifications::notifier::{NotifierEntry, NotifierSource};
use crate::notifications::{CollectionCallback, CollectionChangeSet, NotificationToken};
use crate::object::Object;
use crate::projection::{Projection, SearchTarget, check_column};
use crate::query::plan::{Expr, Query, SortDescriptor};
use crate::session::Session;
use crate::storage::aggregate::{self, AggregateOp};
use crate::storage::{RowRef, TableRef, TableView};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Empty,
    Table,
    Query,
    TableView,
}

#[derive(Clone)]
enum Source {
    Empty,
    Table(TableRef),
    Query(Query),
    View(TableView),
}

#[derive(Clone, Default)]
struct ViewCache {
    view: Option<TableView>,
    version: u64,
}

pub struct Results {
    session: Option<Session>,
    source: Source,
    sort: SortDescriptor,
    cache: Mutex<ViewCache>,
    notifier: Mutex<Weak<NotifierEntry>>,
}

impl Clone for Results {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            source: self.source.clone(),
            sort: self.sort.clone(),
            cache: Mutex::new(self.cache.lock().clone()),
            notifier: Mutex::new(self.notifier.lock().clone()),
        }
    }
}

impl fmt::Debug for Results {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Results")
            .field("mode", &self.mode())
            .field("sort", &self.sort)
            .finish()
    }
}

impl Default for Results {
    fn default() -> Self {
        Self::empty()
    }
}

fn no_query(operation: &'static str) -> CollectionError {
    CollectionError::UnsupportedOperation {
        operation,
        reason: "snapshot and distinct views are fixed sets of rows".into(),
    }
}

impl Results {
    fn build(session: Option<Session>, source: Source, sort: SortDescriptor) -> Self {
        Self {
            session,
            source,
            sort,
            cache: Mutex::new(ViewCache::default()),
            notifier: Mutex::new(Weak::new()),
        }
    }

    /// A view with no backing storage. Every read is empty.
    pub fn empty() -> Self {
        Self::build(None, Source::Empty, SortDescriptor::default())
    }

    pub(crate) fn from_table(session: Session, table: TableRef) -> Self {
        Self::build(Some(session), Source::Table(table), SortDescriptor::default())
    }

    pub(crate) fn from_query(session: Session, query: Query, sort: SortDescriptor) -> Self {
        Self::build(Some(session), Source::Query(query), sort)
    }

    fn pinned(&self, view: TableView) -> Self {
        Self::build(self.session.clone(), Source::View(view), SortDescriptor::default())
    }

    fn derived(&self, query: Query, sort: SortDescriptor) -> Self {
        Self::build(self.session.clone(), Source::Query(query), sort)
    }

    pub fn mode(&self) -> Mode {
        match self.source {
            Source::Empty => Mode::Empty,
            Source::Table(_) => Mode::Table,
            Source::Query(_) => Mode::Query,
            Source::View(_) => Mode::TableView,
        }
    }

    pub fn table(&self) -> Option<&TableRef> {
        match &self.source {
            Source::Empty => None,
            Source::Table(table) => Some(table),
            Source::Query(query) => Some(query.table()),
            Source::View(view) => Some(view.table()),
        }
    }

    pub fn get_sort(&self) -> &SortDescriptor {
        &self.sort
    }

    fn validate(&self) -> Result<(), CollectionError> {
        let Some(session) = &self.session else {
            return Ok(());
        };
        session.verify_handle()?;
        let attached = match &self.source {
            Source::Empty | Source::View(_) => true,
            Source::Table(table) => table.is_attached(),
            Source::Query(query) => query.is_attached(),
        };
        if attached {
            Ok(())
        } else {
            Err(CollectionError::Invalidated)
        }
    }

    /// `Ok(false)` once the storage is gone; errors only on a thread violation.
    pub fn is_valid(&self) -> Result<bool, CollectionError> {
        match self.validate() {
            Ok(()) => Ok(true),
            Err(CollectionError::Invalidated) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Runs `f` on the current materialization. Only for `Query` and `View`.
    fn with_view<R>(
        &self,
        f: impl FnOnce(&TableView) -> Result<R, CollectionError>,
    ) -> Result<R, CollectionError> {
        match &self.source {
            Source::View(view) => f(view),
            Source::Query(query) => {
                let version = query.table().group().content_version();
                let mut cache = self.cache.lock();
                let view = match cache.view.take() {
                    Some(view) if cache.version == version => view,
                    _ => query.materialize(&self.sort)?,
                };
                cache.version = version;
                let view = cache.view.insert(view);
                f(view)
            }
            Source::Empty | Source::Table(_) => Err(CollectionError::UnsupportedOperation {
                operation: "materialize",
                reason: "view is not query backed".into(),
            }),
        }
    }

    fn current_view(&self) -> Result<Option<TableView>, CollectionError> {
        Ok(match &self.source {
            Source::Empty => None,
            Source::Table(table) => Some(TableView::new(table.clone(), table.keys()?)),
            Source::Query(_) | Source::View(_) => Some(self.with_view(|view| Ok(view.clone()))?),
        })
    }

    pub fn size(&self) -> Result<usize, CollectionError> {
        self.validate()?;
        match &self.source {
            Source::Empty => Ok(0),
            Source::Table(table) => table.size(),
            Source::Query(_) | Source::View(_) => self.with_view(|view| Ok(view.size())),
        }
    }

    pub fn is_empty(&self) -> Result<bool, CollectionError> {
        Ok(self.size()? == 0)
    }

    /// `None` for a pinned row that has since been removed.
    pub fn get_row(&self, index: usize) -> Result<Option<RowRef>, CollectionError> {
        self.validate()?;
        match &self.source {
            Source::Empty => Err(CollectionError::out_of_bounds(index, 0)),
            Source::Table(table) => table.row(index).map(Some),
            Source::Query(_) | Source::View(_) => self.with_view(|view| {
                if index >= view.size() {
                    return Err(CollectionError::out_of_bounds(index, view.size()));
                }
                Ok(view.row(index))
            }),
        }
    }

    pub fn get_object(&self, index: usize) -> Result<Option<Object>, CollectionError> {
        let Some(row) = self.get_row(index)? else {
            return Ok(None);
        };
        let session = self.session.as_ref().ok_or(CollectionError::Invalidated)?;
        Object::from_row(session, row).map(Some)
    }

    /// A pinned row that has since been removed reads as `Value::Null`.
    pub fn get_value(&self, index: usize, column: usize) -> Result<Value, CollectionError> {
        self.validate()?;
        match &self.source {
            Source::Empty => Err(CollectionError::out_of_bounds(index, 0)),
            Source::Table(table) => table.get(index, column),
            Source::Query(_) | Source::View(_) => self.with_view(|view| view.get(index, column)),
        }
    }

    /// `None` for a pinned row that has since been removed.
    pub fn get<T: Projection>(
        &self,
        index: usize,
        column: usize,
    ) -> Result<Option<T>, CollectionError> {
        self.validate()?;
        if let Source::View(view) = &self.source {
            if index >= view.size() {
                return Err(CollectionError::out_of_bounds(index, view.size()));
            }
            if !view.table().is_attached() || !view.is_row_attached(index) {
                return Ok(None);
            }
        }
        let def = self.column_def(column)?;
        check_column::<T>(&def)?;
        let value = self.get_value(index, column)?;
        T::from_value(&value, &def.name).map(Some)
    }

    fn column_def(&self, column: usize) -> Result<ColumnDef, CollectionError> {
        let table = self.table().ok_or(CollectionError::Invalidated)?;
        table.read(|t| t.column_def(column).cloned())
    }

    pub fn first(&self) -> Result<Option<RowRef>, CollectionError> {
        if self.size()? == 0 {
            return Ok(None);
        }
        self.get_row(0)
    }

    pub fn last(&self) -> Result<Option<RowRef>, CollectionError> {
        match self.size()? {
            0 => Ok(None),
            size => self.get_row(size - 1),
        }
    }

    pub fn index_of_row(&self, row: &RowRef) -> Result<Option<usize>, CollectionError> {
        self.validate()?;
        let Some(table) = self.table() else {
            return Ok(None);
        };
        if !Arc::ptr_eq(row.table(), table) {
            return Err(CollectionError::WrongTargetTable {
                expected: table.name()?,
                actual: row.table().name()?,
            });
        }
        match &self.source {
            Source::Empty => Ok(None),
            Source::Table(table) => table.position_of(row.key()),
            Source::Query(_) | Source::View(_) => {
                self.with_view(|view| Ok(view.position_of(row.key())))
            }
        }
    }

    fn search(
        &self,
        column: usize,
        target: SearchTarget,
    ) -> Result<Option<usize>, CollectionError> {
        match &self.source {
            Source::Empty => Ok(None),
            Source::Table(table) => target.find_in_table(table, column),
            Source::Query(_) | Source::View(_) => {
                self.with_view(|view| target.find_in_view(view, column))
            }
        }
    }

    /// A null `value` finds the first null cell and nothing else.
    pub fn index_of_value(
        &self,
        column: usize,
        value: &Value,
    ) -> Result<Option<usize>, CollectionError> {
        self.validate()?;
        self.search(column, SearchTarget::for_value(value.clone()))
    }

    pub fn index_of<T: Projection>(
        &self,
        column: usize,
        value: T,
    ) -> Result<Option<usize>, CollectionError> {
        self.validate()?;
        if let Source::Empty = self.source {
            return Ok(None);
        }
        check_column::<T>(&self.column_def(column)?)?;
        self.search(column, crate::projection::search_target(value))
    }

    /// Type support is checked before any value is read.
    fn aggregate_input(
        &self,
        op: AggregateOp,
        column: usize,
    ) -> Result<Option<(ValueType, bool, Vec<Value>)>, CollectionError> {
        self.validate()?;
        if let Source::Empty = self.source {
            return Ok(None);
        }
        let def = self.column_def(column)?;
        let value_type = aggregate::check_supported(op, &def)?;
        let values = match &self.source {
            Source::Table(table) => table.column_values(column, None)?,
            _ => self.with_view(|view| view.column_values(column))?,
        };
        Ok(Some((value_type, def.nullable, values)))
    }

    pub fn max(&self, column: usize) -> Result<Option<Value>, CollectionError> {
        Ok(self
            .aggregate_input(AggregateOp::Max, column)?
            .and_then(|(_, _, values)| aggregate::max(&values)))
    }

    pub fn min(&self, column: usize) -> Result<Option<Value>, CollectionError> {
        Ok(self
            .aggregate_input(AggregateOp::Min, column)?
            .and_then(|(_, _, values)| aggregate::min(&values)))
    }

    /// `Some(0)` over no rows of a required column; `None` when a nullable
    /// column had no non-null values.
    pub fn sum(&self, column: usize) -> Result<Option<Value>, CollectionError> {
        Ok(self
            .aggregate_input(AggregateOp::Sum, column)?
            .and_then(|(value_type, nullable, values)| {
                aggregate::sum(value_type, nullable, &values)
            }))
    }

    pub fn average(&self, column: usize) -> Result<Option<f64>, CollectionError> {
        Ok(self
            .aggregate_input(AggregateOp::Average, column)?
            .and_then(|(_, _, values)| aggregate::average(&values)))
    }

    /// New view ordered by `sort`, replacing any previous ordering. The
    /// receiver is unchanged.
    pub fn sort(&self, sort: SortDescriptor) -> Result<Results, CollectionError> {
        self.validate()?;
        Ok(match &self.source {
            Source::Empty => Results::empty(),
            Source::Table(table) => self.derived(Query::new(table.clone()), sort),
            Source::Query(query) => self.derived(query.clone(), sort),
            Source::View(view) => {
                let mut view = view.clone();
                view.sort(&sort)?;
                self.pinned(view)
            }
        })
    }

    /// New view restricted to rows matching `predicate`, keeping the current
    /// ordering.
    pub fn filter(&self, predicate: Expr) -> Result<Results, CollectionError> {
        self.validate()?;
        let Some(session) = &self.session else {
            return Ok(Results::empty());
        };
        predicate.validate_depth(session.config().max_expr_depth)?;
        Ok(match &self.source {
            Source::Empty => Results::empty(),
            Source::Table(table) => self.derived(
                Query::new(table.clone()).and_where(predicate),
                SortDescriptor::default(),
            ),
            Source::Query(query) => {
                self.derived(query.clone().and_where(predicate), self.sort.clone())
            }
            Source::View(view) => {
                let mut view = view.clone();
                view.filter(&predicate)?;
                self.pinned(view)
            }
        })
    }

    /// Pinned view keeping the first row for each value of `column`.
    pub fn distinct(&self, column: usize) -> Result<Results, CollectionError> {
        self.validate()?;
        let Some(mut view) = self.current_view()? else {
            return Ok(Results::empty());
        };
        view.distinct(column)?;
        Ok(self.pinned(view))
    }

    /// Pinned copy of the current rows. It never re-materializes.
    pub fn snapshot(&self) -> Result<Results, CollectionError> {
        self.validate()?;
        Ok(match self.current_view()? {
            Some(view) => self.pinned(view),
            None => Results::empty(),
        })
    }

    pub fn get_query(&self) -> Result<Query, CollectionError> {
        self.validate()?;
        match &self.source {
            Source::Table(table) => Ok(Query::new(table.clone())),
            Source::Query(query) => Ok(query.clone()),
            Source::Empty | Source::View(_) => Err(no_query("get the query")),
        }
    }

    /// Registers `callback` for changes to this view. Empty views hand back an
    /// inert token; pinned views cannot change and are rejected.
    pub fn add_notification_callback(
        &self,
        callback: impl FnMut(&CollectionChangeSet, Option<&CollectionError>) + Send + 'static,
    ) -> Result<NotificationToken, CollectionError> {
        self.validate()?;
        let source = match &self.source {
            Source::Empty => return Ok(NotificationToken::inert()),
            Source::View(_) => return Err(no_query("add a notification callback")),
            Source::Table(table) => NotifierSource::Table(table.clone()),
            Source::Query(query) => NotifierSource::Query {
                query: query.clone(),
                sort: self.sort.clone(),
            },
        };
        let session = self.session.as_ref().ok_or(CollectionError::Invalidated)?;
        let entry = {
            let mut cached = self.notifier.lock();
            match cached.upgrade() {
                Some(entry) => entry,
                None => {
                    let entry = session.coordinator().register(session.id(), source)?;
                    *cached = Arc::downgrade(&entry);
                    entry
                }
            }
        };
        let callback: CollectionCallback = Box::new(callback);
        let token_id = entry.add_callback(callback)?;
        Ok(NotificationToken::new(entry, token_id))
    }

    /// Boxes row `index` through `ctx`. A pinned row that has since been
    /// removed boxes as null.
    pub fn get_with<C: AccessorContext>(
        &self,
        ctx: &C,
        index: usize,
    ) -> Result<C::Boxed, CollectionError> {
        match self.get_row(index)? {
            Some(row) => ctx.box_row(&row),
            None => Ok(ctx.box_value(&Value::Null)),
        }
    }

    /// Single-column view, for results over a scalar list.
    pub fn into_primitive(self) -> PrimitiveResults {
        PrimitiveResults::new(self)
    }
}
