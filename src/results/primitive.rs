use super::{Mode, Results};
use crate::catalog::types::Value;
use crate::context::AccessorContext;
use crate::error::CollectionError;
use crate::notifications::{CollectionChangeSet, NotificationToken};
use crate::projection::Projection;
use crate::query::plan::{Expr, Sort, SortDescriptor};

const VALUE_COLUMN: usize = 0;

/// [`Results`] over the single value column of a scalar list.
#[derive(Debug, Clone, Default)]
pub struct PrimitiveResults {
    inner: Results,
}

impl PrimitiveResults {
    pub(crate) fn new(inner: Results) -> Self {
        Self { inner }
    }

    pub fn results(&self) -> &Results {
        &self.inner
    }

    pub fn into_results(self) -> Results {
        self.inner
    }

    pub fn mode(&self) -> Mode {
        self.inner.mode()
    }

    pub fn is_valid(&self) -> Result<bool, CollectionError> {
        self.inner.is_valid()
    }

    pub fn size(&self) -> Result<usize, CollectionError> {
        self.inner.size()
    }

    pub fn is_empty(&self) -> Result<bool, CollectionError> {
        self.inner.is_empty()
    }

    pub fn get<T: Projection>(&self, index: usize) -> Result<Option<T>, CollectionError> {
        self.inner.get(index, VALUE_COLUMN)
    }

    pub fn get_value(&self, index: usize) -> Result<Value, CollectionError> {
        self.inner.get_value(index, VALUE_COLUMN)
    }

    pub fn first<T: Projection>(&self) -> Result<Option<T>, CollectionError> {
        match self.size()? {
            0 => Ok(None),
            _ => self.get(0),
        }
    }

    pub fn last<T: Projection>(&self) -> Result<Option<T>, CollectionError> {
        match self.size()? {
            0 => Ok(None),
            size => self.get(size - 1),
        }
    }

    pub fn index_of<T: Projection>(&self, value: T) -> Result<Option<usize>, CollectionError> {
        self.inner.index_of(VALUE_COLUMN, value)
    }

    pub fn index_of_value(&self, value: &Value) -> Result<Option<usize>, CollectionError> {
        self.inner.index_of_value(VALUE_COLUMN, value)
    }

    pub fn max(&self) -> Result<Option<Value>, CollectionError> {
        self.inner.max(VALUE_COLUMN)
    }

    pub fn min(&self) -> Result<Option<Value>, CollectionError> {
        self.inner.min(VALUE_COLUMN)
    }

    pub fn sum(&self) -> Result<Option<Value>, CollectionError> {
        self.inner.sum(VALUE_COLUMN)
    }

    pub fn average(&self) -> Result<Option<f64>, CollectionError> {
        self.inner.average(VALUE_COLUMN)
    }

    pub fn sort(&self, sort: Sort) -> Result<PrimitiveResults, CollectionError> {
        self.inner
            .sort(SortDescriptor::for_values(sort))
            .map(PrimitiveResults::new)
    }

    pub fn filter(&self, predicate: Expr) -> Result<PrimitiveResults, CollectionError> {
        self.inner.filter(predicate).map(PrimitiveResults::new)
    }

    pub fn distinct(&self) -> Result<PrimitiveResults, CollectionError> {
        self.inner.distinct(VALUE_COLUMN).map(PrimitiveResults::new)
    }

    pub fn snapshot(&self) -> Result<PrimitiveResults, CollectionError> {
        self.inner.snapshot().map(PrimitiveResults::new)
    }

    pub fn add_notification_callback(
        &self,
        callback: impl FnMut(&CollectionChangeSet, Option<&CollectionError>) + Send + 'static,
    ) -> Result<NotificationToken, CollectionError> {
        self.inner.add_notification_callback(callback)
    }

    pub fn get_with<C: AccessorContext>(
        &self,
        ctx: &C,
        index: usize,
    ) -> Result<C::Boxed, CollectionError> {
        Ok(ctx.box_value(&self.get_value(index)?))
    }
}
