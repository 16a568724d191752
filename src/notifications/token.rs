use crate::notifications::notifier::NotifierEntry;
use std::fmt;
use std::sync::Arc;

/// Keeps one callback registered. Dropping the token deregisters it.
#[must_use = "dropping the token immediately deregisters the callback"]
#[derive(Default)]
pub struct NotificationToken {
    entry: Option<Arc<NotifierEntry>>,
    token_id: u64,
}

impl fmt::Debug for NotificationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationToken")
            .field("entry", &self.entry.as_ref().map(|e| e.id()))
            .field("token_id", &self.token_id)
            .finish()
    }
}

impl NotificationToken {
    pub(crate) fn new(entry: Arc<NotifierEntry>, token_id: u64) -> Self {
        Self {
            entry: Some(entry),
            token_id,
        }
    }

    /// A token that observes nothing, handed out for empty views.
    pub fn inert() -> Self {
        Self::default()
    }

    pub fn is_registered(&self) -> bool {
        self.entry
            .as_ref()
            .is_some_and(|entry| entry.has_callback(self.token_id))
    }

    /// Skips the next delivery to this callback only.
    pub fn suppress_next(&self) {
        if let Some(entry) = &self.entry {
            entry.suppress_next(self.token_id);
        }
    }

    pub fn unregister(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(entry) = self.entry.take() {
            entry.remove_callback(self.token_id);
        }
    }
}

impl Drop for NotificationToken {
    fn drop(&mut self) {
        self.release();
    }
}
