use crate::catalog::types::Value;
use crate::error::CollectionError;
use crate::storage::{LinkListRef, TableRef, TableView};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default nesting limit for predicates.
pub const MAX_EXPR_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

/// Ordering of a view over a single scalar column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Sort {
    #[default]
    None,
    Ascending,
    Descending,
}

/// Ordered list of `(column index, direction)` sort keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SortDescriptor {
    columns: Vec<(usize, Order)>,
}

impl SortDescriptor {
    pub fn new(columns: Vec<(usize, Order)>) -> Self {
        Self { columns }
    }

    pub fn ascending(column: usize) -> Self {
        Self::new(vec![(column, Order::Asc)])
    }

    pub fn descending(column: usize) -> Self {
        Self::new(vec![(column, Order::Desc)])
    }

    /// Sort on a single-column view.
    pub fn for_values(sort: Sort) -> Self {
        match sort {
            Sort::None => Self::default(),
            Sort::Ascending => Self::ascending(0),
            Sort::Descending => Self::descending(0),
        }
    }

    pub fn then(mut self, column: usize, order: Order) -> Self {
        self.columns.push((column, order));
        self
    }

    pub fn columns(&self) -> &[(usize, Order)] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    In(String, Vec<Value>),
    Between(String, Value, Value),
    IsNull(String),
    IsNotNull(String),
    Like(String, String),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn and(self, rhs: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(rhs))
    }

    pub fn or(self, rhs: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(rhs))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    pub fn depth(&self) -> usize {
        match self {
            Expr::Eq(_, _)
            | Expr::Ne(_, _)
            | Expr::Lt(_, _)
            | Expr::Lte(_, _)
            | Expr::Gt(_, _)
            | Expr::Gte(_, _)
            | Expr::In(_, _)
            | Expr::Between(_, _, _)
            | Expr::IsNull(_)
            | Expr::IsNotNull(_)
            | Expr::Like(_, _) => 1,
            Expr::Not(inner) => 1 + inner.depth(),
            Expr::And(left, right) | Expr::Or(left, right) => 1 + left.depth().max(right.depth()),
        }
    }

    pub fn validate_depth(&self, max_depth: usize) -> Result<(), CollectionError> {
        let depth = self.depth();
        if depth > max_depth {
            return Err(CollectionError::InvalidQuery(format!(
                "expression depth {depth} exceeds maximum allowed depth of {max_depth}"
            )));
        }
        Ok(())
    }
}

pub fn col(name: &str) -> ColumnRef {
    ColumnRef(name.to_string())
}

/// Builder sugar: `col("age").gt(3)`.
pub struct ColumnRef(String);

impl ColumnRef {
    pub fn eq(self, value: impl Into<Value>) -> Expr {
        Expr::Eq(self.0, value.into())
    }

    pub fn ne(self, value: impl Into<Value>) -> Expr {
        Expr::Ne(self.0, value.into())
    }

    pub fn lt(self, value: impl Into<Value>) -> Expr {
        Expr::Lt(self.0, value.into())
    }

    pub fn lte(self, value: impl Into<Value>) -> Expr {
        Expr::Lte(self.0, value.into())
    }

    pub fn gt(self, value: impl Into<Value>) -> Expr {
        Expr::Gt(self.0, value.into())
    }

    pub fn gte(self, value: impl Into<Value>) -> Expr {
        Expr::Gte(self.0, value.into())
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull(self.0)
    }

    pub fn like(self, pattern: &str) -> Expr {
        Expr::Like(self.0, pattern.to_string())
    }
}

/// Predicate over one table, optionally restricted to (and ordered by) a link list.
///
/// Column names are resolved when the query runs, so a query naming an
/// unknown column is accepted here and fails at materialization.
#[derive(Clone)]
pub struct Query {
    table: TableRef,
    link_list: Option<LinkListRef>,
    predicate: Option<Expr>,
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("table", &self.table.id())
            .field("link_list", &self.link_list.is_some())
            .field("predicate", &self.predicate)
            .finish()
    }
}

impl Query {
    pub fn new(table: TableRef) -> Self {
        Self {
            table,
            link_list: None,
            predicate: None,
        }
    }

    pub fn for_link_list(list: LinkListRef) -> Self {
        Self {
            table: list.target().clone(),
            link_list: Some(list),
            predicate: None,
        }
    }

    pub fn and_where(mut self, expr: Expr) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn link_list(&self) -> Option<&LinkListRef> {
        self.link_list.as_ref()
    }

    pub fn predicate(&self) -> Option<&Expr> {
        self.predicate.as_ref()
    }

    pub fn is_attached(&self) -> bool {
        self.table.is_attached() && self.link_list.as_ref().is_none_or(|l| l.is_attached())
    }

    /// Matching rows, in link-list order when restricted to a list, else table order.
    pub fn find_all(&self) -> Result<TableView, CollectionError> {
        let keys = match &self.link_list {
            Some(list) => list.keys()?,
            None => self.table.keys()?,
        };
        let mut view = TableView::new(self.table.clone(), keys);
        if let Some(predicate) = &self.predicate {
            view.filter(predicate)?;
        }
        Ok(view)
    }

    pub fn count(&self) -> Result<usize, CollectionError> {
        Ok(self.find_all()?.size())
    }

    /// Runs the query, then sorts.
    pub fn materialize(&self, sort: &SortDescriptor) -> Result<TableView, CollectionError> {
        let mut view = self.find_all()?;
        view.sort(sort)?;
        Ok(view)
    }
}
