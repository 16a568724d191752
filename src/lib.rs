//! Live, thread-confined collection handles over an in-memory table store.
//!
//! A [`Database`] owns the shared storage [`Group`](storage::Group) and the
//! notification [`Coordinator`]. Each [`Session`] is bound to the thread that
//! opened it; [`List`], [`Results`] and [`Object`] handles borrow a session
//! and always reflect the latest committed (or in-progress) state.
//!
//! ```no_run
//! use livestore::catalog::schema::ColumnDef;
//! use livestore::catalog::types::ValueType;
//! use livestore::{Database, DatabaseConfig, Object};
//!
//! # fn main() -> Result<(), livestore::CollectionError> {
//! let db = Database::open(DatabaseConfig::default())?;
//! let session = db.session()?;
//! session.begin_write()?;
//! session.create_object_type("Dog", vec![ColumnDef::scalar("name", ValueType::String)])?;
//! session.create_object_type(
//!     "Person",
//!     vec![ColumnDef::link_list("dogs", "class_Dog")],
//! )?;
//! let dog = Object::create(&session, "Dog")?;
//! dog.set_property("name", "Rex".to_string())?;
//! let person = Object::create(&session, "Person")?;
//! let dogs = person.get_list("dogs")?;
//! dogs.add_row(dog.row())?;
//! session.commit_write()?;
//! assert_eq!(dogs.size()?, 1);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod list;
pub mod notifications;
pub mod object;
pub mod projection;
pub mod query;
pub mod results;
pub mod session;
pub mod storage;
pub mod thread;

pub use config::DatabaseConfig;
pub use context::{AccessorContext, JsonContext};
pub use error::{CollectionError, CollectionErrorCode};
pub use list::List;
pub use notifications::{CollectionChangeSet, Coordinator, IndexSet, Move, NotificationToken};
pub use object::Object;
pub use projection::Projection;
pub use query::{Expr, Order, Query, Sort, SortDescriptor, col};
pub use results::{Mode, PrimitiveResults, Results};
pub use session::{Database, Session};
pub use thread::ThreadConfinement;
