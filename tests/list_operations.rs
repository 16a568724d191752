use livestore::catalog::schema::ColumnDef;
use livestore::catalog::types::{ColumnType, Timestamp, Value, ValueType};
use livestore::{
    CollectionError, Database, DatabaseConfig, JsonContext, List, Object, Projection, Session,
};
use serde_json::json;
use std::collections::hash_map::DefaultHasher;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};

fn open() -> (Database, Session) {
    let db = Database::open(DatabaseConfig::default()).expect("open");
    let session = db.session().expect("session");
    (db, session)
}

/// `Target` rows 0..10 hold their own index; one `Origin` row owns every list kind.
fn setup(session: &Session) -> Object {
    session.begin_write().expect("begin");
    session
        .create_object_type("Target", vec![ColumnDef::scalar("value", ValueType::Int)])
        .expect("create target");
    session
        .create_object_type(
            "Origin",
            vec![
                ColumnDef::link_list("links", "class_Target"),
                ColumnDef::list("ints", ValueType::Int),
                ColumnDef::list("opt_ints", ValueType::Int).nullable(),
                ColumnDef::list("strings", ValueType::String),
            ],
        )
        .expect("create origin");
    for i in 0..10 {
        let target = Object::create(session, "Target").expect("create target row");
        target.set_property("value", i as i64).expect("set value");
    }
    let origin = Object::create(session, "Origin").expect("create origin row");
    session.commit_write().expect("commit");
    origin
}

fn links_with(session: &Session, origin: &Object, targets: &[usize]) -> List {
    let list = origin.get_list("links").expect("links");
    session.begin_write().expect("begin");
    for target in targets {
        list.add_link(*target).expect("add link");
    }
    session.commit_write().expect("commit");
    list
}

fn target_values(list: &List) -> Vec<Value> {
    (0..list.size().expect("size"))
        .map(|i| list.get_row(i).expect("row").get(0).expect("value"))
        .collect()
}

#[test]
fn links_round_trip_in_order() {
    let (_db, session) = open();
    let origin = setup(&session);
    let list = links_with(&session, &origin, &[0, 1, 2, 3, 4]);

    assert_eq!(list.size().expect("size"), 5);
    for i in 0..5 {
        assert_eq!(
            list.get_object(i)
                .expect("object")
                .get_property::<i64>("value")
                .expect("value"),
            i as i64
        );
    }
    assert_eq!(
        list.element_type().expect("element type"),
        ColumnType::LinkList {
            target: "class_Target".into()
        }
    );
    assert_eq!(list.get_object_schema().expect("schema").name, "Target");
}

#[test]
fn insert_at_size_appends_and_past_size_fails() {
    let (_db, session) = open();
    let origin = setup(&session);
    let list = links_with(&session, &origin, &[0, 1, 2, 3, 4]);

    session.begin_write().expect("begin");
    list.insert_link(5, 9).expect("insert at size");
    assert_eq!(list.size().expect("size"), 6);
    assert_eq!(list.get_row(5).expect("row").get(0).expect("value"), Value::Int(9));
    assert_eq!(
        list.insert_link(7, 1),
        Err(CollectionError::OutOfBoundsIndex {
            requested: 7,
            valid_count: 6
        })
    );
    session.commit_write().expect("commit");
}

#[test]
fn out_of_bounds_reports_index_and_size() {
    let (_db, session) = open();
    let origin = setup(&session);
    let list = links_with(&session, &origin, &[0, 1, 2]);
    let oob = |k| CollectionError::OutOfBoundsIndex {
        requested: k,
        valid_count: 3,
    };

    assert_eq!(list.get_row(3).expect_err("get"), oob(3));
    assert_eq!(list.get_row(10).expect_err("get"), oob(10));
    session.begin_write().expect("begin");
    assert_eq!(list.remove(3), Err(oob(3)));
    assert_eq!(list.set_link(4, 0), Err(oob(4)));
    assert_eq!(list.move_item(0, 3), Err(oob(3)));
    assert_eq!(list.swap(5, 1), Err(oob(5)));
    session.cancel_write().expect("cancel");
}

#[test]
fn remove_all_keeps_targets_and_empties_list() {
    let (_db, session) = open();
    let origin = setup(&session);
    let list = links_with(&session, &origin, &[0, 1, 2, 3]);

    session.begin_write().expect("begin");
    list.remove_all().expect("remove all");
    session.commit_write().expect("commit");

    assert_eq!(list.size().expect("size"), 0);
    assert_eq!(
        list.get_row(0).expect_err("empty"),
        CollectionError::OutOfBoundsIndex {
            requested: 0,
            valid_count: 0
        }
    );
    let targets = session.objects("Target").expect("targets");
    assert_eq!(targets.size().expect("targets size"), 10);
}

#[test]
fn delete_all_removes_linked_rows() {
    let (_db, session) = open();
    let origin = setup(&session);
    let list = links_with(&session, &origin, &[1, 3]);
    let other = links_with(&session, &origin, &[]);
    assert_eq!(list, other);

    session.begin_write().expect("begin");
    list.delete_all().expect("delete all");
    session.commit_write().expect("commit");

    assert_eq!(list.size().expect("size"), 0);
    let targets = session.objects("Target").expect("targets");
    assert_eq!(targets.size().expect("targets size"), 8);
    assert_eq!(targets.index_of::<i64>(0, 1).expect("find 1"), None);
    assert_eq!(targets.index_of::<i64>(0, 3).expect("find 3"), None);
}

#[test]
fn move_and_swap_reorder_links() {
    let (_db, session) = open();
    let origin = setup(&session);
    let list = links_with(&session, &origin, &[0, 1, 2, 3]);

    session.begin_write().expect("begin");
    list.move_item(0, 3).expect("move");
    assert_eq!(
        target_values(&list),
        vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(0)]
    );
    list.swap(0, 1).expect("swap");
    list.remove(2).expect("remove");
    session.commit_write().expect("commit");
    assert_eq!(
        target_values(&list),
        vec![Value::Int(2), Value::Int(1), Value::Int(0)]
    );
}

#[test]
fn removed_target_rows_vanish_from_lists() {
    let (_db, session) = open();
    let origin = setup(&session);
    let list = links_with(&session, &origin, &[2, 4, 2]);
    let doomed = list.get_row(0).expect("row");

    session.begin_write().expect("begin");
    Object::from_row(&session, doomed.clone())
        .expect("object")
        .delete()
        .expect("delete");
    session.commit_write().expect("commit");

    assert_eq!(target_values(&list), vec![Value::Int(4)]);
    assert_eq!(list.find_row(&doomed).expect("find removed"), None);
}

#[test]
fn find_row_checks_target_table() {
    let (_db, session) = open();
    let origin = setup(&session);
    let list = links_with(&session, &origin, &[5, 6]);
    let target = session.object_table("Target").expect("target table");

    assert_eq!(list.find_row(&target.row(6).expect("row")).expect("find"), Some(1));
    assert_eq!(list.find_row(&target.row(7).expect("row")).expect("find"), None);
    let wrong = Object::get(&session, "Origin", 0).expect("origin");
    assert!(matches!(
        list.find_row(wrong.row()),
        Err(CollectionError::WrongTargetTable { .. })
    ));
    session.begin_write().expect("begin");
    assert!(matches!(
        list.add_row(wrong.row()),
        Err(CollectionError::WrongTargetTable { .. })
    ));
    session.cancel_write().expect("cancel");
}

#[test]
fn scalar_list_round_trips_values() {
    let (_db, session) = open();
    let origin = setup(&session);
    let ints = origin.get_list("ints").expect("ints");
    let strings = origin.get_list("strings").expect("strings");

    session.begin_write().expect("begin");
    for v in [10i64, 20, 30] {
        ints.add(v).expect("add");
    }
    ints.insert(3, 40i64).expect("insert at size");
    ints.insert(0, 5i64).expect("insert at front");
    ints.set(1, 11i64).expect("set");
    strings.add("a".to_string()).expect("add string");
    session.commit_write().expect("commit");

    let values: Vec<i64> = (0..ints.size().expect("size"))
        .map(|i| ints.get::<i64>(i).expect("get"))
        .collect();
    assert_eq!(values, vec![5, 11, 20, 30, 40]);
    assert_eq!(ints.find(30i64).expect("find"), Some(3));
    assert_eq!(ints.find(31i64).expect("find"), None);
    assert_eq!(strings.get::<String>(0).expect("get string"), "a");
    assert_eq!(ints.element_type().expect("type"), ColumnType::List(ValueType::Int));
    assert_eq!(ints.get_origin_row_index().expect("origin"), 0);
}

/// Adds `first` to a required list of `value_type`, overwrites it with
/// `second` and reads it back. The nullable variant does the same through
/// `Option<T>`, nulls included.
fn assert_set_get_round_trip<T>(value_type: ValueType, first: T, second: T)
where
    T: Projection + Clone + PartialEq + Debug,
{
    let (_db, session) = open();
    session.begin_write().expect("begin");
    session
        .create_object_type(
            "Holder",
            vec![
                ColumnDef::list("required", value_type),
                ColumnDef::list("optional", value_type).nullable(),
            ],
        )
        .expect("create holder");
    let holder = Object::create(&session, "Holder").expect("holder row");
    let required = holder.get_list("required").expect("required");
    let optional = holder.get_list("optional").expect("optional");

    required.add(first.clone()).expect("add");
    required.set(0, second.clone()).expect("set");
    assert!(
        matches!(
            required.set(0, None::<T>),
            Err(CollectionError::NotNullable { .. })
        ),
        "{value_type} list accepted a null"
    );
    optional.add(Some(first)).expect("add some");
    optional.add(None::<T>).expect("add none");
    optional.set(0, None::<T>).expect("set none");
    optional.set(1, Some(second.clone())).expect("set some");
    session.commit_write().expect("commit");

    assert_eq!(required.size(), Ok(1));
    assert_eq!(required.get::<T>(0).expect("get"), second, "{value_type}");
    assert_eq!(optional.get::<Option<T>>(0).expect("get none"), None);
    assert_eq!(
        optional.get::<Option<T>>(1).expect("get some"),
        Some(second),
        "{value_type}"
    );
    assert_eq!(optional.find(None::<T>).expect("find null"), Some(0));
}

#[test]
fn every_element_type_round_trips_through_set_and_get() {
    assert_set_get_round_trip(ValueType::Bool, false, true);
    assert_set_get_round_trip(ValueType::Int, 1i64, -7);
    assert_set_get_round_trip(ValueType::Float, 1.5f32, -0.25);
    assert_set_get_round_trip(ValueType::Double, 2.5f64, 1e-9);
    assert_set_get_round_trip(ValueType::String, "a".to_string(), "bc".to_string());
    assert_set_get_round_trip(ValueType::Binary, vec![0u8, 1], vec![0xff]);
    assert_set_get_round_trip(
        ValueType::Timestamp,
        Timestamp::new(1, 2),
        Timestamp::new(-3, 4),
    );
}

#[test]
fn scalar_list_rejects_wrong_types_and_nulls() {
    let (_db, session) = open();
    let origin = setup(&session);
    let ints = origin.get_list("ints").expect("ints");

    session.begin_write().expect("begin");
    assert!(matches!(
        ints.add("x".to_string()),
        Err(CollectionError::TypeMismatch { .. })
    ));
    assert!(matches!(
        ints.add_value(Value::Null),
        Err(CollectionError::NotNullable { .. })
    ));
    assert!(matches!(
        ints.add(None::<i64>),
        Err(CollectionError::NotNullable { .. })
    ));
    ints.add(Some(3i64)).expect("some into a required column");
    assert_eq!(ints.size().expect("size"), 1);
    ints.remove(0).expect("remove");
    assert_eq!(ints.size().expect("size"), 0);
    session.cancel_write().expect("cancel");
}

#[test]
fn find_none_matches_only_nulls() {
    let (_db, session) = open();
    let origin = setup(&session);
    let opt = origin.get_list("opt_ints").expect("opt ints");

    session.begin_write().expect("begin");
    opt.add(Some(0i64)).expect("add zero");
    opt.add(None::<i64>).expect("add null");
    session.commit_write().expect("commit");

    assert_eq!(opt.find(None::<i64>).expect("find null"), Some(1));
    assert_eq!(opt.find(Some(0i64)).expect("find zero"), Some(0));
    assert_eq!(opt.get::<Option<i64>>(1).expect("get null"), None);

    session.begin_write().expect("begin");
    opt.remove(1).expect("remove null");
    session.commit_write().expect("commit");
    assert_eq!(opt.find(None::<i64>).expect("find null"), None);
}

#[test]
fn mutations_require_a_write_transaction() {
    let (_db, session) = open();
    let origin = setup(&session);
    let list = origin.get_list("links").expect("links");
    let ints = origin.get_list("ints").expect("ints");

    assert!(matches!(list.add_link(0), Err(CollectionError::InvalidTransaction(_))));
    assert!(matches!(ints.add(1i64), Err(CollectionError::InvalidTransaction(_))));
    assert!(matches!(list.remove_all(), Err(CollectionError::InvalidTransaction(_))));
    assert!(list.verify_in_transaction().is_err());
    assert_eq!(list.size().expect("reads need no transaction"), 0);
}

#[test]
fn element_kind_mismatches_are_unsupported() {
    let (_db, session) = open();
    let origin = setup(&session);
    let links = links_with(&session, &origin, &[0]);
    let ints = origin.get_list("ints").expect("ints");

    assert!(matches!(
        ints.get_row(0),
        Err(CollectionError::UnsupportedOperation { .. })
    ));
    assert!(matches!(
        links.get::<i64>(0),
        Err(CollectionError::UnsupportedOperation { .. })
    ));
    assert!(matches!(
        ints.get_object_schema(),
        Err(CollectionError::UnsupportedOperation { .. })
    ));
}

#[test]
fn handles_to_the_same_property_are_equal() {
    let (_db, session) = open();
    let origin = setup(&session);
    session.begin_write().expect("begin");
    let second = Object::create(&session, "Origin").expect("second origin");
    session.commit_write().expect("commit");

    let a = origin.get_list("links").expect("a");
    let b = origin.get_list("links").expect("b");
    let c = second.get_list("links").expect("c");
    let ints = origin.get_list("ints").expect("ints");

    assert_eq!(a, b);
    assert_eq!(a, a.clone());
    assert_ne!(a, c);
    assert_ne!(a, ints);
    let hash = |list: &List| {
        let mut hasher = DefaultHasher::new();
        list.hash(&mut hasher);
        hasher.finish()
    };
    assert_eq!(hash(&a), hash(&b));
    assert_eq!(List::default(), List::default());
}

#[test]
fn deleting_the_owner_invalidates_the_list() {
    let (_db, session) = open();
    let origin = setup(&session);
    let list = links_with(&session, &origin, &[0, 1]);
    let ints = origin.get_list("ints").expect("ints");

    session.begin_write().expect("begin");
    origin.delete().expect("delete origin");
    session.commit_write().expect("commit");

    assert_eq!(list.is_valid(), Ok(false));
    assert_eq!(list.size(), Err(CollectionError::Invalidated));
    assert_eq!(ints.is_valid(), Ok(false));
    assert_eq!(ints.get::<i64>(0), Err(CollectionError::Invalidated));
    assert!(!origin.is_valid());
}

#[test]
fn unattached_list_is_invalid() {
    let list = List::default();
    assert_eq!(list.is_valid(), Ok(false));
    assert_eq!(list.size(), Err(CollectionError::Invalidated));
    assert_eq!(list.verify_attached(), Err(CollectionError::Invalidated));
}

#[test]
fn aggregates_over_lists() {
    let (_db, session) = open();
    let origin = setup(&session);
    let links = links_with(&session, &origin, &[2, 4, 6]);
    let ints = origin.get_list("ints").expect("ints");
    let opt = origin.get_list("opt_ints").expect("opt ints");
    let strings = origin.get_list("strings").expect("strings");

    assert_eq!(ints.sum(0).expect("empty sum"), Some(Value::Int(0)));
    assert_eq!(ints.average(0).expect("empty average"), None);
    assert_eq!(ints.max(0).expect("empty max"), None);
    assert_eq!(opt.sum(0).expect("empty nullable sum"), None);
    assert!(matches!(
        strings.sum(0),
        Err(CollectionError::UnsupportedColumnType { .. })
    ));

    assert_eq!(links.sum(0).expect("sum"), Some(Value::Int(12)));
    assert_eq!(links.average(0).expect("average"), Some(4.0));
    assert_eq!(links.min(0).expect("min"), Some(Value::Int(2)));
    assert_eq!(links.max(0).expect("max"), Some(Value::Int(6)));

    session.begin_write().expect("begin");
    opt.add(None::<i64>).expect("null");
    opt.add(Some(3i64)).expect("three");
    opt.add(Some(5i64)).expect("five");
    session.commit_write().expect("commit");
    assert_eq!(opt.sum(0).expect("sum"), Some(Value::Int(8)));
    assert_eq!(opt.average(0).expect("average"), Some(4.0));
}

#[test]
fn boxed_access_through_json_context() {
    let (_db, session) = open();
    let origin = setup(&session);
    let links = origin.get_list("links").expect("links");
    let ints = origin.get_list("ints").expect("ints");
    let ctx = JsonContext;

    session.begin_write().expect("begin");
    ints.add_with(&ctx, &json!(7)).expect("add boxed");
    ints.insert_with(&ctx, 0, &json!(3)).expect("insert boxed");
    links.add_with(&ctx, &json!({ "row": 8 })).expect("add boxed link");
    links.add_with(&ctx, &json!(9)).expect("add bare index");
    let boxed_null = ints
        .add_with(&ctx, &json!(null))
        .expect_err("null into a required list");
    assert!(matches!(boxed_null, CollectionError::NotNullable { .. }));
    assert_eq!(
        Err(boxed_null),
        ints.add_value(Value::Null),
        "boxed and direct writes report a null the same way"
    );
    assert!(matches!(
        ints.add_with(&ctx, &json!("seven")),
        Err(CollectionError::TypeMismatch { .. })
    ));
    session.commit_write().expect("commit");

    assert_eq!(ints.get_with(&ctx, 1).expect("get boxed"), json!(7));
    assert_eq!(ints.find_with(&ctx, &json!(3)).expect("find boxed"), Some(0));
    assert_eq!(
        links.get_with(&ctx, 0).expect("boxed row"),
        json!({ "table": "class_Target", "row": 8 })
    );
    assert_eq!(links.find_with(&ctx, &json!(9)).expect("find link"), Some(1));
}
