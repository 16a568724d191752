//! Change notifications for live collections.

pub mod changeset;
pub mod coordinator;
pub(crate) mod notifier;
pub mod signal;
pub mod token;

pub use changeset::{CollectionChangeSet, IndexSet, Move};
pub use coordinator::Coordinator;
pub use notifier::CollectionCallback;
pub use signal::WakeSignal;
pub use token::NotificationToken;
