use crate::catalog::schema::{ColumnDef, ObjectSchema, TableSchema, table_name_for_object_type};
use crate::config::{DatabaseConfig, validate_config};
use crate::error::CollectionError;
use crate::notifications::{Coordinator, WakeSignal};
use crate::results::Results;
use crate::storage::{Group, TableRef};
use crate::thread::ThreadConfinement;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Shared root of one in-memory database. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    config: DatabaseConfig,
    group: Arc<Group>,
    coordinator: Arc<Coordinator>,
    /// Session currently holding the write transaction.
    writer: Mutex<Option<u64>>,
    next_session_id: AtomicU64,
    open_sessions: AtomicUsize,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.inner.config)
            .field("group", &self.inner.group)
            .field("writer", &*self.inner.writer.lock())
            .finish()
    }
}

impl Database {
    pub fn open(config: DatabaseConfig) -> Result<Self, CollectionError> {
        validate_config(&config)?;
        info!(
            max_notifiers = config.max_notifiers,
            max_callbacks_per_notifier = config.max_callbacks_per_notifier,
            slow_callback_warn_ms = config.slow_callback_warn_ms,
            max_sessions = config.max_sessions,
            max_expr_depth = config.max_expr_depth,
            "database opened"
        );
        let coordinator = Arc::new(Coordinator::new(&config));
        Ok(Self {
            inner: Arc::new(DatabaseInner {
                config,
                group: Group::new(),
                coordinator,
                writer: Mutex::new(None),
                next_session_id: AtomicU64::new(1),
                open_sessions: AtomicUsize::new(0),
            }),
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }

    pub fn group(&self) -> &Arc<Group> {
        &self.inner.group
    }

    pub fn live_notifiers(&self) -> usize {
        self.inner.coordinator.live_notifiers()
    }

    pub fn open_sessions(&self) -> usize {
        self.inner.open_sessions.load(Ordering::Acquire)
    }

    /// Opens a session bound to the calling thread.
    pub fn session(&self) -> Result<Session, CollectionError> {
        let limit = self.inner.config.max_sessions;
        self.inner
            .open_sessions
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| {
                (open < limit).then_some(open + 1)
            })
            .map_err(|_| CollectionError::SessionLimitReached { limit })?;

        let id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        let wake = WakeSignal::new();
        self.inner.coordinator.register_session(id, wake.clone());
        let confinement = ThreadConfinement::current();
        info!(session_id = id, thread = ?confinement.owner(), "session opened");
        Ok(Session {
            inner: Arc::new(SessionInner {
                id,
                db: self.clone(),
                confinement,
                closed: AtomicBool::new(false),
                wake,
                seen_version: AtomicU64::new(self.inner.group.committed_version()),
            }),
        })
    }
}

/// Connection to a [`Database`], confined to the thread that opened it.
///
/// At most one session holds the write transaction at a time. Handles derived
/// from a session keep it alive and re-check it on every operation.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: u64,
    db: Database,
    confinement: ThreadConfinement,
    closed: AtomicBool,
    wake: WakeSignal,
    seen_version: AtomicU64,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("owner", &self.inner.confinement.owner())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Session {}

impl SessionInner {
    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let db = &self.db.inner;
        db.coordinator.evict_session(self.id);
        let rolled_back = {
            let mut writer = db.writer.lock();
            if *writer == Some(self.id) {
                if let Err(err) = db.group.rollback() {
                    warn!(session_id = self.id, error = %err, "rollback on close failed");
                }
                *writer = None;
                true
            } else {
                false
            }
        };
        if rolled_back {
            db.coordinator.on_rollback(self.id);
        }
        db.open_sessions.fetch_sub(1, Ordering::AcqRel);
        info!(session_id = self.id, "session closed");
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Session {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn database(&self) -> &Database {
        &self.inner.db
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.db.inner.config
    }

    pub(crate) fn group(&self) -> &Arc<Group> {
        &self.inner.db.inner.group
    }

    pub(crate) fn coordinator(&self) -> &Arc<Coordinator> {
        &self.inner.db.inner.coordinator
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn verify_thread(&self) -> Result<(), CollectionError> {
        self.inner.confinement.verify()
    }

    fn verify_open(&self) -> Result<(), CollectionError> {
        self.verify_thread()?;
        if self.is_closed() {
            return Err(CollectionError::SessionClosed);
        }
        Ok(())
    }

    /// Check run by derived handles: a closed session invalidates them.
    pub(crate) fn verify_handle(&self) -> Result<(), CollectionError> {
        self.verify_thread()?;
        if self.is_closed() {
            return Err(CollectionError::Invalidated);
        }
        Ok(())
    }

    pub fn is_in_transaction(&self) -> bool {
        !self.is_closed() && *self.inner.db.inner.writer.lock() == Some(self.inner.id)
    }

    pub(crate) fn verify_in_transaction(&self, operation: &str) -> Result<(), CollectionError> {
        if self.is_in_transaction() {
            Ok(())
        } else {
            Err(CollectionError::not_in_write(operation))
        }
    }

    pub fn begin_write(&self) -> Result<(), CollectionError> {
        self.verify_open()?;
        let db = &self.inner.db.inner;
        let mut writer = db.writer.lock();
        match *writer {
            Some(id) if id == self.inner.id => Err(CollectionError::InvalidTransaction(
                "a write transaction is already active on this session".into(),
            )),
            Some(_) => Err(CollectionError::WriteInProgress),
            None => {
                db.group.begin_write()?;
                *writer = Some(self.inner.id);
                debug!(session_id = self.inner.id, "write transaction started");
                Ok(())
            }
        }
    }

    /// Commits, then delivers this session's notifications before returning.
    pub fn commit_write(&self) -> Result<u64, CollectionError> {
        self.verify_open()?;
        let db = &self.inner.db.inner;
        let version = {
            let mut writer = db.writer.lock();
            if *writer != Some(self.inner.id) {
                return Err(CollectionError::not_in_write("commit"));
            }
            let version = db.group.commit()?;
            *writer = None;
            version
        };
        self.inner.seen_version.store(version, Ordering::Release);
        db.coordinator.on_commit(self.inner.id);
        Ok(version)
    }

    pub fn cancel_write(&self) -> Result<(), CollectionError> {
        self.verify_open()?;
        let db = &self.inner.db.inner;
        {
            let mut writer = db.writer.lock();
            if *writer != Some(self.inner.id) {
                return Err(CollectionError::not_in_write("cancel"));
            }
            db.group.rollback()?;
            *writer = None;
        }
        db.coordinator.on_rollback(self.inner.id);
        Ok(())
    }

    /// Delivers notifications for commits made by other sessions. Returns
    /// whether anything changed since the last refresh.
    ///
    /// While any session holds the write transaction nothing is delivered:
    /// pending changes stay pending until that write commits or rolls back.
    pub fn refresh(&self) -> Result<bool, CollectionError> {
        self.verify_open()?;
        let (advanced, prepared) = {
            let writer = self.inner.db.inner.writer.lock();
            if let Some(holder) = *writer {
                if holder != self.inner.id {
                    debug!(
                        session_id = self.inner.id,
                        writer = holder,
                        "refresh deferred by an open write transaction"
                    );
                }
                return Ok(false);
            }
            let committed = self.group().committed_version();
            let advanced = self.inner.seen_version.swap(committed, Ordering::AcqRel) < committed;
            (advanced, self.coordinator().prepare_pending(self.inner.id))
        };
        let delivered = prepared
            .into_iter()
            .map(|delivery| delivery.dispatch())
            .filter(|&sent| sent)
            .count();
        Ok(advanced || delivered > 0)
    }

    /// Resolves once another session commits a change this session observes.
    /// Follow with [`Session::refresh`] on the owning thread.
    pub async fn wait_for_change(&self) {
        self.inner.wake.wait().await;
    }

    /// Evicts this session's notifiers and rolls back an open write.
    /// Every handle derived from the session becomes invalid.
    pub fn close(&self) -> Result<(), CollectionError> {
        self.verify_thread()?;
        self.inner.shutdown();
        Ok(())
    }

    pub fn create_table(
        &self,
        name: &str,
        columns: Vec<ColumnDef>,
    ) -> Result<TableRef, CollectionError> {
        self.verify_open()?;
        self.verify_in_transaction("create a table")?;
        self.group().create_table(TableSchema::new(name, columns))
    }

    /// Creates the table backing `object_type`. Link-list columns name
    /// their target by table name.
    pub fn create_object_type(
        &self,
        object_type: &str,
        columns: Vec<ColumnDef>,
    ) -> Result<ObjectSchema, CollectionError> {
        let table = self.create_table(&table_name_for_object_type(object_type), columns)?;
        ObjectSchema::from_table(&table.schema()?)
            .ok_or_else(|| CollectionError::TableNotFound(object_type.to_string()))
    }

    pub fn table(&self, name: &str) -> Result<TableRef, CollectionError> {
        self.verify_open()?;
        self.group()
            .table(name)
            .ok_or_else(|| CollectionError::TableNotFound(name.to_string()))
    }

    pub fn object_table(&self, object_type: &str) -> Result<TableRef, CollectionError> {
        self.table(&table_name_for_object_type(object_type))
    }

    pub fn remove_table(&self, name: &str) -> Result<(), CollectionError> {
        self.verify_open()?;
        self.verify_in_transaction("remove a table")?;
        self.group().remove_table(name)
    }

    pub fn schema(&self) -> Result<Vec<ObjectSchema>, CollectionError> {
        self.verify_open()?;
        Ok(self
            .group()
            .table_schemas()
            .iter()
            .filter_map(ObjectSchema::from_table)
            .collect())
    }

    pub fn object_schema(&self, object_type: &str) -> Result<ObjectSchema, CollectionError> {
        self.schema()?
            .into_iter()
            .find(|schema| schema.name == object_type)
            .ok_or_else(|| CollectionError::TableNotFound(object_type.to_string()))
    }

    /// Live view over every object of `object_type`.
    pub fn objects(&self, object_type: &str) -> Result<Results, CollectionError> {
        let table = self.object_table(object_type)?;
        Ok(Results::from_table(self.clone(), table))
    }
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::config::DatabaseConfig;

    #[test]
    fn one_writer_at_a_time() {
        let db = Database::open(DatabaseConfig::default()).expect("open");
        let a = db.session().expect("a");
        let b = db.session().expect("b");
        a.begin_write().expect("a writes");
        assert_eq!(b.begin_write().expect_err("b blocked").code_str(), "write_in_progress");
        assert_eq!(
            a.begin_write().expect_err("nested").code_str(),
            "invalid_transaction"
        );
        a.commit_write().expect("commit");
        b.begin_write().expect("b writes");
        b.cancel_write().expect("cancel");
        assert_eq!(b.commit_write().expect_err("nothing open").code_str(), "invalid_transaction");
    }

    #[test]
    fn session_limit_is_enforced() {
        let db = Database::open(DatabaseConfig::default().with_max_sessions(1)).expect("open");
        let first = db.session().expect("first");
        assert_eq!(
            db.session().expect_err("limit").code_str(),
            "session_limit_reached"
        );
        first.close().expect("close");
        drop(first);
        db.session().expect("slot freed");
    }

    #[test]
    fn closing_rolls_back_the_open_write() {
        let db = Database::open(DatabaseConfig::default()).expect("open");
        let session = db.session().expect("session");
        session.begin_write().expect("begin");
        session
            .create_table("scratch", Vec::new())
            .expect("create");
        session.close().expect("close");
        assert!(db.group().table("scratch").is_none());
        assert_eq!(session.begin_write().expect_err("closed").code_str(), "session_closed");

        let other = db.session().expect("other");
        other.begin_write().expect("writer released");
    }
}
