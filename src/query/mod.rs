pub mod operators;
pub mod plan;

pub use plan::{Expr, Order, Query, Sort, SortDescriptor, col};
