use livestore::catalog::schema::ColumnDef;
use livestore::catalog::types::ValueType;
use livestore::{
    CollectionChangeSet, CollectionError, Database, DatabaseConfig, IndexSet, List, Move, Object,
    Session, SortDescriptor, col,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

type Log = Arc<Mutex<Vec<CollectionChangeSet>>>;

fn open(config: DatabaseConfig) -> (Database, Session) {
    let db = Database::open(config).expect("open");
    let session = db.session().expect("session");
    (db, session)
}

fn setup(session: &Session) -> Object {
    session.begin_write().expect("begin");
    session
        .create_object_type("Target", vec![ColumnDef::scalar("value", ValueType::Int)])
        .expect("target type");
    session
        .create_object_type(
            "Origin",
            vec![
                ColumnDef::link_list("links", "class_Target"),
                ColumnDef::list("ints", ValueType::Int),
            ],
        )
        .expect("origin type");
    for i in 0..10 {
        Object::create(session, "Target")
            .expect("target")
            .set_property("value", i as i64)
            .expect("value");
    }
    let origin = Object::create(session, "Origin").expect("origin");
    let links = origin.get_list("links").expect("links");
    for i in 0..5 {
        links.add_link(i).expect("link");
    }
    session.commit_write().expect("commit");
    origin
}

fn record(list: &List) -> (Log, livestore::NotificationToken) {
    let log: Log = Arc::default();
    let sink = Arc::clone(&log);
    let token = list
        .add_notification_callback(move |changes, error| {
            assert!(error.is_none(), "unexpected error: {error:?}");
            sink.lock().push(changes.clone());
        })
        .expect("register");
    (log, token)
}

fn indices(set: &IndexSet) -> Vec<usize> {
    set.iter().collect()
}

#[test]
fn insertion_is_reported_at_its_index() {
    let (_db, session) = open(DatabaseConfig::default());
    let origin = setup(&session);
    let links = origin.get_list("links").expect("links");
    let (log, _token) = record(&links);
    assert!(log.lock().is_empty(), "no delivery on registration");

    session.begin_write().expect("begin");
    links.insert_link(3, 9).expect("insert");
    session.commit_write().expect("commit");

    let log = log.lock();
    assert_eq!(log.len(), 1);
    assert_eq!(indices(&log[0].insertions), vec![3]);
    assert!(log[0].deletions.is_empty());
    assert!(log[0].modifications.is_empty());
    assert!(log[0].moves.is_empty());
}

#[test]
fn scalar_list_append_is_reported_at_the_end() {
    let (_db, session) = open(DatabaseConfig::default());
    let origin = setup(&session);
    let ints = origin.get_list("ints").expect("ints");
    session.begin_write().expect("begin");
    for v in [1i64, 2, 3] {
        ints.add(v).expect("add");
    }
    session.commit_write().expect("commit");
    let (log, _token) = record(&ints);

    session.begin_write().expect("begin");
    ints.add(4i64).expect("append");
    session.commit_write().expect("commit");

    let log = log.lock();
    assert_eq!(log.len(), 1);
    assert_eq!(indices(&log[0].insertions), vec![3]);
    assert!(log[0].modifications.is_empty());
    assert_eq!(ints.size(), Ok(4));
    assert_eq!(ints.get::<i64>(3), Ok(4));
}

#[test]
fn deletions_modifications_and_moves() {
    let (_db, session) = open(DatabaseConfig::default());
    let origin = setup(&session);
    let links = origin.get_list("links").expect("links");
    let (log, _token) = record(&links);

    session.begin_write().expect("begin");
    links.remove(1).expect("remove");
    session.commit_write().expect("commit");

    session.begin_write().expect("begin");
    links.get_object(0).expect("first").set_property("value", 42i64).expect("set");
    session.commit_write().expect("commit");

    session.begin_write().expect("begin");
    links.move_item(0, 3).expect("move");
    session.commit_write().expect("commit");

    let log = log.lock();
    assert_eq!(log.len(), 3);
    assert_eq!(indices(&log[0].deletions), vec![1]);
    assert_eq!(indices(&log[1].modifications), vec![0]);
    assert_eq!(indices(&log[1].modifications_new), vec![0]);
    assert_eq!(log[2].moves, vec![Move { from: 0, to: 3 }]);
    assert_eq!(indices(&log[2].deletions), vec![0]);
    assert_eq!(indices(&log[2].insertions), vec![3]);
}

#[test]
fn commits_without_changes_are_not_delivered() {
    let (_db, session) = open(DatabaseConfig::default());
    let origin = setup(&session);
    let links = origin.get_list("links").expect("links");
    let (log, _token) = record(&links);

    session.begin_write().expect("begin");
    Object::create(&session, "Target").expect("unlinked target");
    session.commit_write().expect("commit");
    assert!(log.lock().is_empty());
}

#[test]
fn dropped_token_stops_its_callback_only() {
    let (db, session) = open(DatabaseConfig::default());
    let origin = setup(&session);
    let links = origin.get_list("links").expect("links");
    let other_handle = origin.get_list("links").expect("links again");
    let (first, first_token) = record(&links);
    let (second, second_token) = record(&other_handle);
    assert_eq!(db.live_notifiers(), 1, "handles on one list share an entry");

    drop(first_token);
    assert!(second_token.is_registered());

    session.begin_write().expect("begin");
    links.add_link(7).expect("add");
    session.commit_write().expect("commit");

    assert!(first.lock().is_empty());
    assert_eq!(second.lock().len(), 1);
    second_token.unregister();
    assert_eq!(db.live_notifiers(), 0);
}

#[test]
fn suppressed_delivery_skips_one_round() {
    let (_db, session) = open(DatabaseConfig::default());
    let origin = setup(&session);
    let links = origin.get_list("links").expect("links");
    let (log, token) = record(&links);

    session.begin_write().expect("begin");
    links.add_link(5).expect("add");
    token.suppress_next();
    session.commit_write().expect("commit");
    assert!(log.lock().is_empty());

    session.begin_write().expect("begin");
    links.add_link(6).expect("add");
    session.commit_write().expect("commit");
    let log = log.lock();
    assert_eq!(log.len(), 1);
    assert_eq!(indices(&log[0].insertions), vec![6]);
}

#[test]
fn cancelled_writes_are_never_reported() {
    let (_db, session) = open(DatabaseConfig::default());
    let origin = setup(&session);
    let links = origin.get_list("links").expect("links");
    let (log, _token) = record(&links);

    session.begin_write().expect("begin");
    links.remove_all().expect("clear");
    session.cancel_write().expect("cancel");

    session.begin_write().expect("begin");
    links.add_link(8).expect("add");
    session.commit_write().expect("commit");

    let log = log.lock();
    assert_eq!(log.len(), 1);
    assert_eq!(indices(&log[0].insertions), vec![5]);
    assert!(log[0].deletions.is_empty());
}

#[test]
fn deleting_the_owner_reports_invalidation() {
    let (_db, session) = open(DatabaseConfig::default());
    let origin = setup(&session);
    let links = origin.get_list("links").expect("links");
    let (log, _token) = record(&links);

    session.begin_write().expect("begin");
    origin.delete().expect("delete");
    session.commit_write().expect("commit");

    let log = log.lock();
    assert_eq!(log.len(), 1);
    assert!(log[0].collection_invalidated);
    assert_eq!(indices(&log[0].deletions), vec![0, 1, 2, 3, 4]);
}

#[test]
fn other_sessions_deliver_on_refresh() {
    let db = Database::open(DatabaseConfig::default()).expect("open");
    let writer = db.session().expect("writer");
    let reader = db.session().expect("reader");
    setup(&writer);

    let origin = Object::get(&reader, "Origin", 0).expect("origin");
    let links = origin.get_list("links").expect("links");
    let (log, _token) = record(&links);

    writer.begin_write().expect("begin");
    Object::get(&writer, "Origin", 0)
        .expect("origin")
        .get_list("links")
        .expect("links")
        .remove(0)
        .expect("remove");
    writer.commit_write().expect("commit");

    assert!(log.lock().is_empty(), "delivered only on the reader's refresh");
    assert!(reader.refresh().expect("refresh"));
    assert_eq!(log.lock().len(), 1);
    assert_eq!(indices(&log.lock()[0].deletions), vec![0]);
    assert!(!reader.refresh().expect("nothing new"));
}

#[test]
fn refresh_waits_for_open_writes_of_other_sessions() {
    let db = Database::open(DatabaseConfig::default()).expect("open");
    let writer = db.session().expect("writer");
    let reader = db.session().expect("reader");
    setup(&writer);
    let links = Object::get(&reader, "Origin", 0)
        .expect("origin")
        .get_list("links")
        .expect("links");
    let (log, _token) = record(&links);
    let writer_links = Object::get(&writer, "Origin", 0)
        .expect("origin")
        .get_list("links")
        .expect("links");

    writer.begin_write().expect("begin");
    writer_links.add_link(5).expect("committed link");
    writer.commit_write().expect("commit");

    writer.begin_write().expect("begin");
    writer_links.add_link(6).expect("rolled back link");
    assert_eq!(reader.refresh(), Ok(false));
    assert!(log.lock().is_empty(), "nothing delivered while a write is open");
    writer.cancel_write().expect("cancel");

    assert!(reader.refresh().expect("refresh"));
    {
        let log = log.lock();
        assert_eq!(log.len(), 1);
        assert_eq!(indices(&log[0].insertions), vec![5]);
    }
    assert_eq!(links.size(), Ok(6));

    writer.begin_write().expect("begin");
    writer_links.add_link(7).expect("next link");
    writer.commit_write().expect("commit");
    assert!(reader.refresh().expect("refresh"));
    let log = log.lock();
    assert_eq!(log.len(), 2);
    assert_eq!(indices(&log[1].insertions), vec![6]);
    assert!(log[1].deletions.is_empty());
}

#[test]
fn registering_during_a_foreign_write_ignores_its_rollback() {
    let db = Database::open(DatabaseConfig::default()).expect("open");
    let writer = db.session().expect("writer");
    let reader = db.session().expect("reader");
    setup(&writer);
    let targets = reader.objects("Target").expect("targets");

    writer.begin_write().expect("begin");
    Object::create(&writer, "Target").expect("uncommitted target");
    let log: Log = Arc::default();
    let sink = Arc::clone(&log);
    let _token = targets
        .add_notification_callback(move |changes, _| sink.lock().push(changes.clone()))
        .expect("register");
    writer.cancel_write().expect("cancel");

    writer.begin_write().expect("begin");
    Object::create(&writer, "Target").expect("committed target");
    writer.commit_write().expect("commit");
    assert!(reader.refresh().expect("refresh"));

    let log = log.lock();
    assert_eq!(log.len(), 1);
    assert_eq!(indices(&log[0].insertions), vec![10]);
    assert!(log[0].deletions.is_empty());
}

#[test]
fn results_callbacks_track_query_membership() {
    let (_db, session) = open(DatabaseConfig::default());
    setup(&session);
    let big = session
        .objects("Target")
        .expect("targets")
        .filter(col("value").gte(5i64))
        .expect("filter")
        .sort(SortDescriptor::descending(0))
        .expect("sort");
    let log: Log = Arc::default();
    let sink = Arc::clone(&log);
    let _token = big
        .add_notification_callback(move |changes, _| sink.lock().push(changes.clone()))
        .expect("register");

    session.begin_write().expect("begin");
    Object::get(&session, "Target", 0)
        .expect("zero")
        .set_property("value", 100i64)
        .expect("set");
    session.commit_write().expect("commit");

    let log = log.lock();
    assert_eq!(log.len(), 1);
    assert_eq!(indices(&log[0].insertions), vec![0]);
    assert!(
        big.snapshot()
            .expect("snapshot")
            .add_notification_callback(|_, _| {})
            .is_err()
    );
}

#[test]
fn panicking_callback_does_not_block_others() {
    let (_db, session) = open(DatabaseConfig::default());
    let origin = setup(&session);
    let links = origin.get_list("links").expect("links");
    let _bad = links
        .add_notification_callback(|_, _| panic!("callback failure"))
        .expect("register");
    let (log, _token) = record(&links);

    session.begin_write().expect("begin");
    links.add_link(9).expect("add");
    session.commit_write().expect("commit");
    assert_eq!(log.lock().len(), 1);
}

#[test]
fn callback_limit_is_enforced() {
    let config = DatabaseConfig::default().with_max_callbacks_per_notifier(1);
    let (_db, session) = open(config);
    let origin = setup(&session);
    let links = origin.get_list("links").expect("links");
    let _first = links.add_notification_callback(|_, _| {}).expect("first");
    let err = links
        .add_notification_callback(|_, _| {})
        .expect_err("second");
    assert_eq!(err, CollectionError::NotifierLimitReached { limit: 1 });
}

#[test]
fn closing_a_session_evicts_its_notifiers() {
    let (db, session) = open(DatabaseConfig::default());
    let origin = setup(&session);
    let links = origin.get_list("links").expect("links");
    let (_log, token) = record(&links);
    assert_eq!(db.live_notifiers(), 1);

    session.close().expect("close");
    assert!(!token.is_registered());
    assert_eq!(links.size(), Err(CollectionError::Invalidated));
    assert_eq!(session.begin_write(), Err(CollectionError::SessionClosed));
    drop(token);
    assert_eq!(db.live_notifiers(), 0);
}

#[tokio::test]
async fn wait_for_change_wakes_on_foreign_commit() {
    let db = Database::open(DatabaseConfig::default()).expect("open");
    let reader = db.session().expect("reader");
    setup(&reader);
    let links = Object::get(&reader, "Origin", 0)
        .expect("origin")
        .get_list("links")
        .expect("links");
    let (log, _token) = record(&links);

    let remote = db.clone();
    let writer = std::thread::spawn(move || {
        let session = remote.session().expect("writer");
        session.begin_write().expect("begin");
        Object::get(&session, "Origin", 0)
            .expect("origin")
            .get_list("links")
            .expect("links")
            .add_link(9)
            .expect("add");
        session.commit_write().expect("commit");
    });

    tokio::time::timeout(Duration::from_secs(5), reader.wait_for_change())
        .await
        .expect("woken");
    writer.join().expect("writer thread");
    assert!(reader.refresh().expect("refresh"));
    assert_eq!(indices(&log.lock()[0].insertions), vec![5]);
}
