//! In-memory transactional table store backing the collection layer.

pub mod accessor;
pub mod aggregate;
pub mod group;
pub mod table;
pub mod view;

pub use accessor::{LinkListAccessor, LinkListRef, RowRef, TableAccessor, TableRef};
pub use group::Group;
pub use table::{RowKey, TableId};
pub use view::TableView;
