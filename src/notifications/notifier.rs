use crate::error::CollectionError;
use crate::notifications::changeset::CollectionChangeSet;
use crate::query::plan::{Query, SortDescriptor};
use crate::storage::{LinkListRef, RowKey, TableRef};
use parking_lot::{Mutex, ReentrantMutex};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, warn};

/// Receives each non-empty changeset, or the error that stopped change
/// tracking for the collection.
pub type CollectionCallback =
    Box<dyn FnMut(&CollectionChangeSet, Option<&CollectionError>) + Send + 'static>;

/// What an entry observes.
#[derive(Clone)]
pub(crate) enum NotifierSource {
    LinkList(LinkListRef),
    Table(TableRef),
    Query { query: Query, sort: SortDescriptor },
}

impl NotifierSource {
    fn is_attached(&self) -> bool {
        match self {
            NotifierSource::LinkList(list) => list.is_attached(),
            NotifierSource::Table(table) => table.is_attached(),
            NotifierSource::Query { query, .. } => query.is_attached(),
        }
    }

    /// Current `(row key, row version)` sequence of the observed collection.
    fn row_states(&self) -> Result<Vec<(RowKey, u64)>, CollectionError> {
        match self {
            NotifierSource::LinkList(list) => list.target().row_states(&list.keys()?),
            NotifierSource::Table(table) => table.all_row_states(),
            NotifierSource::Query { query, sort } => query.materialize(sort)?.row_states(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            NotifierSource::LinkList(_) => "link_list",
            NotifierSource::Table(_) => "table",
            NotifierSource::Query { .. } => "query",
        }
    }
}

/// Identifies the collection an entry is shared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum NotifierKey {
    /// Address of an interned storage accessor.
    Location(usize),
    /// Entries that are never shared.
    Unique(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Active,
    Invalidated,
    Failed,
}

struct Baseline {
    rows: Vec<(RowKey, u64)>,
    status: Status,
}

struct CallbackSlot {
    token_id: u64,
    callback: Arc<Mutex<CollectionCallback>>,
    skip_next: bool,
}

pub(crate) struct EntryLimits {
    pub max_callbacks: usize,
    pub slow_callback_warn_ms: u64,
}

/// Registration entry for one observed collection.
///
/// Tokens hold entries strongly; handles and the coordinator only hold weak
/// references, so an entry lives exactly as long as one of its tokens.
pub(crate) struct NotifierEntry {
    id: u64,
    session_id: u64,
    key: NotifierKey,
    source: NotifierSource,
    baseline: Mutex<Baseline>,
    callbacks: Mutex<Vec<CallbackSlot>>,
    next_token: AtomicU64,
    pending: AtomicBool,
    delivery: ReentrantMutex<()>,
    limits: EntryLimits,
}

impl fmt::Debug for NotifierEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifierEntry")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("source", &self.source.kind())
            .field("callbacks", &self.callbacks.lock().len())
            .finish()
    }
}

impl NotifierEntry {
    pub(crate) fn new(
        id: u64,
        session_id: u64,
        key: NotifierKey,
        source: NotifierSource,
        limits: EntryLimits,
    ) -> Self {
        let (rows, status) = match source.row_states() {
            Ok(rows) => (rows, Status::Active),
            Err(_) if !source.is_attached() => (Vec::new(), Status::Invalidated),
            // Reported on the first delivery attempt.
            Err(_) => (Vec::new(), Status::Active),
        };
        Self {
            id,
            session_id,
            key,
            source,
            baseline: Mutex::new(Baseline { rows, status }),
            callbacks: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(1),
            pending: AtomicBool::new(false),
            delivery: ReentrantMutex::new(()),
            limits,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn session_id(&self) -> u64 {
        self.session_id
    }

    pub(crate) fn key(&self) -> NotifierKey {
        self.key
    }

    pub(crate) fn add_callback(
        &self,
        callback: CollectionCallback,
    ) -> Result<u64, CollectionError> {
        let mut callbacks = self.callbacks.lock();
        if callbacks.len() >= self.limits.max_callbacks {
            return Err(CollectionError::NotifierLimitReached {
                limit: self.limits.max_callbacks,
            });
        }
        let token_id = self.next_token.fetch_add(1, Ordering::Relaxed);
        callbacks.push(CallbackSlot {
            token_id,
            callback: Arc::new(Mutex::new(callback)),
            skip_next: false,
        });
        debug!(
            entry = self.id,
            token_id,
            source = self.source.kind(),
            "notification callback registered"
        );
        Ok(token_id)
    }

    /// Waits for an in-flight delivery of this entry unless called from
    /// inside it.
    pub(crate) fn remove_callback(&self, token_id: u64) -> bool {
        let _delivery = self.delivery.lock();
        // Dropped after the lock is released: a callback may own other tokens.
        let removed = {
            let mut callbacks = self.callbacks.lock();
            callbacks
                .iter()
                .position(|slot| slot.token_id == token_id)
                .map(|pos| callbacks.remove(pos))
        };
        let found = removed.is_some();
        if found {
            debug!(entry = self.id, token_id, "notification callback removed");
        }
        drop(removed);
        found
    }

    pub(crate) fn has_callback(&self, token_id: u64) -> bool {
        self.callbacks
            .lock()
            .iter()
            .any(|slot| slot.token_id == token_id)
    }

    pub(crate) fn suppress_next(&self, token_id: u64) {
        if let Some(slot) = self
            .callbacks
            .lock()
            .iter_mut()
            .find(|slot| slot.token_id == token_id)
        {
            slot.skip_next = true;
        }
    }

    pub(crate) fn mark_pending(&self) {
        self.pending.store(true, Ordering::Release);
    }

    pub(crate) fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Adopts the current state as the baseline without delivering.
    pub(crate) fn rebaseline(&self) {
        let _delivery = self.delivery.lock();
        let mut baseline = self.baseline.lock();
        if baseline.status == Status::Active
            && let Ok(rows) = self.source.row_states()
        {
            baseline.rows = rows;
        }
    }

    /// Drops every callback and stops tracking.
    pub(crate) fn evict(&self) {
        let _delivery = self.delivery.lock();
        self.baseline.lock().status = Status::Invalidated;
        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        drop(callbacks);
    }

    fn compute(&self) -> Option<Result<CollectionChangeSet, CollectionError>> {
        let mut baseline = self.baseline.lock();
        if baseline.status != Status::Active {
            return None;
        }
        if !self.source.is_attached() {
            baseline.status = Status::Invalidated;
            let changes = CollectionChangeSet::invalidated(baseline.rows.len());
            baseline.rows.clear();
            debug!(entry = self.id, "observed collection invalidated");
            return Some(Ok(changes));
        }
        match self.source.row_states() {
            Ok(rows) => {
                let changes = CollectionChangeSet::calculate(&baseline.rows, &rows);
                baseline.rows = rows;
                (!changes.is_empty()).then_some(Ok(changes))
            }
            Err(err) => {
                warn!(entry = self.id, error = %err, "failed to compute collection changes");
                baseline.status = Status::Failed;
                Some(Err(err))
            }
        }
    }

    /// Computes the changes since the last delivery without running callbacks.
    pub(crate) fn prepare(self: &Arc<Self>) -> Option<PreparedDelivery> {
        let _delivery = self.delivery.lock();
        let outcome = self.compute()?;
        Some(PreparedDelivery {
            entry: Arc::clone(self),
            outcome,
        })
    }

    /// Computes the changes since the last delivery and hands them to every
    /// callback. Returns whether anything was delivered.
    pub(crate) fn deliver(&self) -> bool {
        let _delivery = self.delivery.lock();
        match self.compute() {
            Some(outcome) => self.dispatch(&outcome),
            None => false,
        }
    }

    fn dispatch(&self, outcome: &Result<CollectionChangeSet, CollectionError>) -> bool {
        let _delivery = self.delivery.lock();
        let empty = CollectionChangeSet::default();
        let (changes, error) = match outcome {
            Ok(changes) => (changes, None),
            Err(err) => (&empty, Some(err)),
        };

        let targets: Vec<(u64, Arc<Mutex<CollectionCallback>>)> = {
            let mut callbacks = self.callbacks.lock();
            callbacks
                .iter_mut()
                .filter_map(|slot| {
                    if std::mem::take(&mut slot.skip_next) && error.is_none() {
                        return None;
                    }
                    Some((slot.token_id, Arc::clone(&slot.callback)))
                })
                .collect()
        };

        for (token_id, callback) in targets {
            // A callback may have dropped a token further down the list.
            if !self.has_callback(token_id) {
                continue;
            }
            // Re-entrant delivery never runs a callback inside itself.
            let Some(mut callback) = callback.try_lock() else {
                continue;
            };
            let started = Instant::now();
            if catch_unwind(AssertUnwindSafe(|| (&mut **callback)(changes, error))).is_err() {
                warn!(entry = self.id, token_id, "notification callback panicked");
            }
            let elapsed_ms = started.elapsed().as_millis() as u64;
            if self.limits.slow_callback_warn_ms > 0
                && elapsed_ms > self.limits.slow_callback_warn_ms
            {
                warn!(entry = self.id, token_id, elapsed_ms, "slow notification callback");
            }
        }
        true
    }
}

/// Changes computed for one entry, waiting to be handed to its callbacks.
pub(crate) struct PreparedDelivery {
    entry: Arc<NotifierEntry>,
    outcome: Result<CollectionChangeSet, CollectionError>,
}

impl PreparedDelivery {
    pub(crate) fn dispatch(self) -> bool {
        self.entry.dispatch(&self.outcome)
    }
}
