use crate::error::CollectionError;
use std::thread::{self, ThreadId};
use tracing::error;

/// Records the thread a session was opened on and rejects access from any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadConfinement {
    owner: ThreadId,
}

impl ThreadConfinement {
    pub fn current() -> Self {
        Self {
            owner: thread::current().id(),
        }
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    pub fn is_owner(&self) -> bool {
        thread::current().id() == self.owner
    }

    pub fn verify(&self) -> Result<(), CollectionError> {
        let current = thread::current().id();
        if current == self.owner {
            return Ok(());
        }
        let owner = format!("{:?}", self.owner);
        let current = format!("{current:?}");
        error!(%owner, %current, "session accessed from incorrect thread");
        Err(CollectionError::IncorrectThread { owner, current })
    }
}
