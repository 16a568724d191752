use crate::config::DatabaseConfig;
use crate::error::CollectionError;
use crate::notifications::notifier::{
    EntryLimits, NotifierEntry, NotifierKey, NotifierSource, PreparedDelivery,
};
use crate::notifications::signal::WakeSignal;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Tracks live notifier entries for one database and schedules their delivery.
///
/// Entries of the committing session deliver during the commit. Entries of
/// other sessions are marked pending and their session is woken; they deliver
/// on that session's next refresh, on its own thread. A refresh never computes
/// changes while a write transaction is open.
#[derive(Debug)]
pub struct Coordinator {
    entries: Mutex<Vec<Weak<NotifierEntry>>>,
    wakers: Mutex<HashMap<u64, WakeSignal>>,
    next_entry_id: AtomicU64,
    max_notifiers: usize,
    max_callbacks: usize,
    slow_callback_warn_ms: u64,
}

impl Coordinator {
    pub(crate) fn new(config: &DatabaseConfig) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            wakers: Mutex::new(HashMap::new()),
            next_entry_id: AtomicU64::new(1),
            max_notifiers: config.max_notifiers,
            max_callbacks: config.max_callbacks_per_notifier,
            slow_callback_warn_ms: config.slow_callback_warn_ms,
        }
    }

    pub(crate) fn register_session(&self, session_id: u64, wake: WakeSignal) {
        self.wakers.lock().insert(session_id, wake);
    }

    /// Upgrades every live entry, pruning dead ones. Delivery happens on the
    /// returned list so no callback ever runs under the registry lock.
    fn live(&self) -> Vec<Arc<NotifierEntry>> {
        let mut entries = self.entries.lock();
        let mut live = Vec::with_capacity(entries.len());
        entries.retain(|weak| match weak.upgrade() {
            Some(entry) => {
                live.push(entry);
                true
            }
            None => false,
        });
        live
    }

    pub fn live_notifiers(&self) -> usize {
        self.live().len()
    }

    /// The entry already observing `key` for this session, or a new one.
    pub(crate) fn find_or_register(
        &self,
        session_id: u64,
        key: NotifierKey,
        source: impl FnOnce() -> NotifierSource,
    ) -> Result<Arc<NotifierEntry>, CollectionError> {
        if let Some(existing) = self
            .live()
            .into_iter()
            .find(|entry| entry.session_id() == session_id && entry.key() == key)
        {
            return Ok(existing);
        }
        self.insert(session_id, Some(key), source())
    }

    /// A new entry that is never shared with other handles.
    pub(crate) fn register(
        &self,
        session_id: u64,
        source: NotifierSource,
    ) -> Result<Arc<NotifierEntry>, CollectionError> {
        self.insert(session_id, None, source)
    }

    fn insert(
        &self,
        session_id: u64,
        key: Option<NotifierKey>,
        source: NotifierSource,
    ) -> Result<Arc<NotifierEntry>, CollectionError> {
        if self.live().len() >= self.max_notifiers {
            return Err(CollectionError::NotifierLimitReached {
                limit: self.max_notifiers,
            });
        }
        let id = self.next_entry_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(NotifierEntry::new(
            id,
            session_id,
            key.unwrap_or(NotifierKey::Unique(id)),
            source,
            EntryLimits {
                max_callbacks: self.max_callbacks,
                slow_callback_warn_ms: self.slow_callback_warn_ms,
            },
        ));
        self.entries.lock().push(Arc::downgrade(&entry));
        debug!(entry = id, session_id, "notifier entry created");
        Ok(entry)
    }

    fn wake(&self, sessions: &[u64]) {
        let wakers = self.wakers.lock();
        for id in sessions {
            if let Some(wake) = wakers.get(id) {
                wake.fire();
            }
        }
    }

    /// Delivers the committing session's entries and wakes every other
    /// session that has something to deliver.
    pub(crate) fn on_commit(&self, session_id: u64) {
        let mut own = Vec::new();
        let mut woken = Vec::new();
        for entry in self.live() {
            if entry.session_id() == session_id {
                own.push(entry);
            } else {
                entry.mark_pending();
                if !woken.contains(&entry.session_id()) {
                    woken.push(entry.session_id());
                }
            }
        }
        self.wake(&woken);
        let delivered = own.iter().filter(|entry| entry.deliver()).count();
        debug!(
            session_id,
            delivered,
            woken = woken.len(),
            "commit notifications dispatched"
        );
    }

    /// Computes the changes of this session's pending entries. The caller
    /// runs the returned deliveries once it holds no lock a callback could
    /// need.
    pub(crate) fn prepare_pending(&self, session_id: u64) -> Vec<PreparedDelivery> {
        self.live()
            .into_iter()
            .filter(|entry| entry.session_id() == session_id && entry.take_pending())
            .filter_map(|entry| entry.prepare())
            .collect()
    }

    /// After a rollback, adopts the restored state for every entry with
    /// nothing pending, whichever session owns it. Sessions still holding
    /// pending entries are woken, since their refresh waited on the write.
    pub(crate) fn on_rollback(&self, session_id: u64) {
        let mut woken = Vec::new();
        for entry in self.live() {
            if !entry.is_pending() {
                entry.rebaseline();
            } else if entry.session_id() != session_id && !woken.contains(&entry.session_id()) {
                woken.push(entry.session_id());
            }
        }
        self.wake(&woken);
        debug!(session_id, woken = woken.len(), "notifiers rebaselined after rollback");
    }

    /// Drops every entry and the wake signal of a closing session.
    pub(crate) fn evict_session(&self, session_id: u64) {
        let evicted: Vec<Arc<NotifierEntry>> = self
            .live()
            .into_iter()
            .filter(|entry| entry.session_id() == session_id)
            .collect();
        for entry in &evicted {
            entry.evict();
        }
        self.entries.lock().retain(|weak| {
            weak.upgrade()
                .is_some_and(|entry| entry.session_id() != session_id)
        });
        self.wakers.lock().remove(&session_id);
        debug!(session_id, evicted = evicted.len(), "session notifiers evicted");
    }
}
