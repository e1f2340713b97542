//! Session and batch tests over the scripted memory transport.
//!
//! Every command is recorded by `MemoryConnectionFactory`, so these tests
//! check the SQL that reaches the wire and the number of round trips without
//! a database.

use std::collections::HashSet;
use std::sync::Arc;

use vellum_client::{MemoryConnectionFactory, TransactionEvent, TransactionOptions};
use vellum_common::{DocumentId, IdentityMapKind, Value, VellumError};
use vellum_query::{field, Predicate, Query};
use vellum_test::fixtures::{AdminUser, Colors, Issue, SuperUser, Target, User};
use vellum_test::utils::{document_row, memory_store, scalar_row, LocalCounter};

fn setup() -> (MemoryConnectionFactory, Arc<LocalCounter>) {
    (MemoryConnectionFactory::new(), Arc::new(LocalCounter::default()))
}

#[tokio::test]
async fn test_resident_load_and_two_queries_make_one_round_trip() {
    let (factory, counter) = setup();
    let store = memory_store(&factory, counter);
    let mut session = store.open_session();

    let resident = session.store(Target::new(1, Colors::Red)).await.unwrap();
    let resident_id = resident.read().id;

    let mut blue = Target::new(2, Colors::Blue);
    blue.id = 500;
    factory.push_result_sets(vec![
        vec![document_row(&blue, 500, None)],
        vec![scalar_row(7i64)],
    ]);

    let mut batch = session.batch();
    let loaded = batch.load::<Target>(resident_id).unwrap();
    let blues = batch
        .query(Query::<Target>::new().filter(field("Color").eq("Blue")))
        .unwrap();
    let big = batch
        .count(Query::<Target>::new().filter(field("Number").gt(4)))
        .unwrap();
    batch.execute().await.unwrap();

    assert!(Arc::ptr_eq(&loaded.await.unwrap().unwrap(), &resident));
    assert_eq!(blues.await.unwrap()[0].read().id, 500);
    assert_eq!(big.await.unwrap(), 7);

    assert_eq!(factory.round_trips(), 1);
    let executed = factory.last_executed().unwrap();
    assert_eq!(executed.statement_count, 2);
    assert_eq!(
        executed.sql,
        "select d.data, d.id from mt_doc_target d where d.data ->> 'Color' = $1;\n\
         select count(*) from mt_doc_target d where CAST(d.data ->> 'Number' as integer) > $2"
    );
    assert_eq!(
        executed.params,
        vec![Value::String("Blue".into()), Value::Integer(4)]
    );
}

#[tokio::test]
async fn test_nullable_member_queries() {
    let (factory, counter) = setup();
    let store = memory_store(&factory, counter);
    let mut session = store.query_session();

    for _ in 0..3 {
        factory.push_result_sets(vec![vec![scalar_row(0i64)]]);
    }

    session
        .count(Query::<Target>::new().filter(field("NullableNumber").eq(None::<i32>)))
        .await
        .unwrap();
    session
        .count(Query::<Target>::new().filter(field("NullableNumber").has_value()))
        .await
        .unwrap();
    session
        .count(Query::<Target>::new().filter(field("NullableNumber").gt(4)))
        .await
        .unwrap();

    let sql: Vec<String> = factory.executed().into_iter().map(|c| c.sql).collect();
    assert_eq!(
        sql,
        vec![
            "select count(*) from mt_doc_target d \
             where CAST(d.data ->> 'NullableNumber' as integer) is null",
            "select count(*) from mt_doc_target d \
             where CAST(d.data ->> 'NullableNumber' as integer) is not null",
            "select count(*) from mt_doc_target d \
             where CAST(d.data ->> 'NullableNumber' as integer) > $1",
        ]
    );
}

#[tokio::test]
async fn test_nullable_members_are_stored_and_read_as_json_null() {
    let (factory, counter) = setup();
    let store = memory_store(&factory, counter);
    let mut session = store.open_session();

    let values = [Some(3), None, None, Some(3), None];
    for (n, value) in values.into_iter().enumerate() {
        let target = Target::new(n as i32, Colors::Red).with_nullable(value);
        session.store(target).await.unwrap();
    }
    session.save_changes().await.unwrap();

    let written = factory.last_executed().unwrap();
    assert_eq!(written.statement_count, 5);
    let nulls = written
        .params
        .iter()
        .filter(|p| matches!(p, Value::String(json) if json.contains("\"NullableNumber\":null")))
        .count();
    assert_eq!(nulls, 3);

    let rows: Vec<_> = values
        .into_iter()
        .enumerate()
        .map(|(n, value)| {
            let id = 100 + n as i64;
            let mut target = Target::new(n as i32, Colors::Red).with_nullable(value);
            target.id = id;
            document_row(&target, id, None)
        })
        .collect();
    factory.push_result_sets(vec![rows]);

    let mut reader = store.query_session();
    let targets = reader.query(Query::<Target>::new()).await.unwrap();
    let missing = targets
        .iter()
        .filter(|t| t.read().nullable_number.is_none())
        .count();
    assert_eq!((missing, targets.len() - missing), (3, 2));
}

#[tokio::test]
async fn test_single_operators_over_two_rows_are_violations() {
    let (factory, counter) = setup();
    let store = memory_store(&factory, counter);
    let mut session = store.query_session();

    let rows = vec![
        document_row(&Target::new(1, Colors::Green), 1, None),
        document_row(&Target::new(2, Colors::Green), 2, None),
    ];
    factory.push_result_sets(vec![rows.clone()]);
    factory.push_result_sets(vec![rows]);

    let query = || Query::<Target>::new().filter(field("Color").eq("Green"));
    let single = session.single(query()).await;
    let single_or_default = session.single_or_default(query()).await;

    assert!(matches!(single, Err(VellumError::CardinalityViolation { rows: 2, .. })));
    assert!(matches!(
        single_or_default,
        Err(VellumError::CardinalityViolation { rows: 2, .. })
    ));
    assert!(factory.last_executed().unwrap().sql.ends_with(" LIMIT 2"));
}

#[tokio::test]
async fn test_single_operators_over_one_row_return_it() {
    let (factory, counter) = setup();
    let store = memory_store(&factory, counter);
    let mut session = store.query_session();

    let row = document_row(&Target::new(3, Colors::Red), 3, None);
    factory.push_result_sets(vec![vec![row.clone()]]);
    factory.push_result_sets(vec![vec![row]]);

    let query = || Query::<Target>::new().filter(field("Color").eq("Red"));
    let single = session.single(query()).await.unwrap();
    let single_or_default = session.single_or_default(query()).await.unwrap().unwrap();

    assert_eq!(single.read().number, 3);
    // Same session, same instance.
    assert!(Arc::ptr_eq(&single, &single_or_default));
}

#[tokio::test]
async fn test_first_operators_on_empty_results() {
    let (factory, counter) = setup();
    let store = memory_store(&factory, counter);
    let mut session = store.query_session();

    factory.push_result_sets(vec![vec![]]);
    factory.push_result_sets(vec![vec![]]);

    let first = session.first(Query::<Target>::new()).await;
    assert!(matches!(first, Err(VellumError::CardinalityViolation { rows: 0, .. })));

    let first_or_default = session.first_or_default(Query::<Target>::new()).await.unwrap();
    assert!(first_or_default.is_none());
    assert!(factory.last_executed().unwrap().sql.ends_with(" LIMIT 1"));
}

#[tokio::test]
async fn test_subclass_queries_filter_on_discriminator() {
    let (factory, counter) = setup();
    let store = memory_store(&factory, counter);
    let mut session = store.query_session();

    let mut admin = AdminUser::new("Ann", "north");
    admin.id = 11;
    factory.push_result_sets(vec![vec![document_row(&admin, 11, Some("admin"))]]);

    let admins = session
        .query(Query::<AdminUser>::new().filter(field("FirstName").eq("Ann")))
        .await
        .unwrap();
    assert_eq!(*admins[0].read(), admin);

    let executed = factory.last_executed().unwrap();
    assert_eq!(
        executed.sql,
        "select d.data, d.id, d.mt_doc_type from mt_doc_user d \
         where d.first_name = $1 and d.mt_doc_type = $2"
    );
    assert_eq!(
        executed.params,
        vec![Value::String("Ann".into()), Value::String("admin".into())]
    );
}

#[tokio::test]
async fn test_raw_disjunction_stays_within_subclass() {
    let (factory, counter) = setup();
    let store = memory_store(&factory, counter);
    let mut session = store.query_session();

    factory.push_result_sets(vec![vec![]]);
    let query = Query::<AdminUser>::new().filter(Predicate::sql(
        "d.data ->> 'Region' = ? or d.data ->> 'Region' = ?",
        vec!["north".into(), "south".into()],
    ));
    session.query(query).await.unwrap();

    let executed = factory.last_executed().unwrap();
    assert_eq!(
        executed.sql,
        "select d.data, d.id, d.mt_doc_type from mt_doc_user d \
         where (d.data ->> 'Region' = $1 or d.data ->> 'Region' = $2) and d.mt_doc_type = $3"
    );
    assert_eq!(executed.params[2], Value::String("admin".into()));
}

#[tokio::test]
async fn test_base_query_over_mixed_population() {
    let (factory, counter) = setup();
    let store = memory_store(&factory, counter);
    let mut session = store.open_session();

    let mut plain = User::new("Bo", "Berg");
    plain.id = 1;
    let mut admin = AdminUser::new("Eve", "west");
    admin.id = 2;
    let mut root = SuperUser::new("Sam", 9);
    root.id = 3;
    factory.push_result_sets(vec![vec![
        document_row(&plain, 1, Some("BASE")),
        document_row(&admin, 2, Some("admin")),
        document_row(&root, 3, Some("super")),
    ]]);

    let users = session.query(Query::<User>::new()).await.unwrap();
    let names: Vec<String> = users.iter().map(|u| u.read().first_name.clone()).collect();
    assert_eq!(names, vec!["Bo", "Eve", "Sam"]);
    assert_eq!(
        factory.last_executed().unwrap().sql,
        "select d.data, d.id, d.mt_doc_type from mt_doc_user d"
    );

    // Reading through the base type again reuses the same instances.
    let again = session.load::<User>(2).await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&again, &users[1]));
    assert_eq!(factory.round_trips(), 1);

    // Nothing changed, nothing to write.
    assert!(session.pending_changes().unwrap().is_empty());

    // An edit through the base type would drop the admin's fields.
    users[1].write().last_name = "Changed".to_string();
    let err = session.save_changes().await.unwrap_err();
    assert!(matches!(err, VellumError::SubclassMismatch { .. }));
    assert_eq!(factory.round_trips(), 1);
    assert!(factory.transaction_events().is_empty());
}

#[tokio::test]
async fn test_stored_subclass_is_shared_with_base_type() {
    let (factory, counter) = setup();
    let store = memory_store(&factory, counter);
    let mut session = store.open_session();

    let admin = session.store(AdminUser::new("Ann", "north")).await.unwrap();
    let id = admin.read().id;

    let same = session.load::<AdminUser>(id).await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&same, &admin));

    let as_user = session.load::<User>(id).await.unwrap().unwrap();
    assert_eq!(as_user.read().first_name, "Ann");
    assert!(as_user.read().internal);
    let as_user_again = session.load::<User>(id).await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&as_user, &as_user_again));
    assert_eq!(factory.round_trips(), 0);

    // The admin is written once, as an admin.
    session.save_changes().await.unwrap();
    let executed = factory.last_executed().unwrap();
    assert_eq!(executed.statement_count, 1);
    assert_eq!(executed.params[2], Value::String("admin".into()));
    assert!(matches!(&executed.params[1], Value::String(json) if json.contains("\"Region\":\"north\"")));
}

#[tokio::test]
async fn test_null_map_query_session_retains_nothing() {
    let (factory, counter) = setup();
    let store = memory_store(&factory, counter);
    let mut session = store.query_session_with(IdentityMapKind::Null);

    for id in 1..=50i64 {
        let mut target = Target::new(id as i32, Colors::Green);
        target.id = id;
        factory.push_result_sets(vec![vec![document_row(&target, id, None)]]);
        session.load::<Target>(id).await.unwrap().unwrap();
    }

    assert_eq!(factory.round_trips(), 50);
    assert!(session.identity_map().is_empty());
}

#[tokio::test]
async fn test_save_changes_writes_discriminator_and_duplicated_column() {
    let (factory, counter) = setup();
    let store = memory_store(&factory, counter);
    let mut session = store.open_session();

    session.store(User::new("Bo", "Berg")).await.unwrap();
    session.store(AdminUser::new("Cy", "south")).await.unwrap();
    session.save_changes().await.unwrap();

    let executed = factory.last_executed().unwrap();
    assert!(executed.in_transaction);
    assert_eq!(executed.statement_count, 2);
    assert!(executed.params.contains(&Value::String("admin".into())));
    assert!(executed.params.contains(&Value::String("BASE".into())));
    assert!(executed.params.contains(&Value::String("Bo".into())));
    assert!(executed.params.contains(&Value::String("Cy".into())));
    assert_eq!(
        factory.transaction_events(),
        vec![
            TransactionEvent::Begin(TransactionOptions::default()),
            TransactionEvent::Commit
        ]
    );
}

#[tokio::test]
async fn test_guid_documents_get_random_ids() {
    let (factory, counter) = setup();
    let store = memory_store(&factory, Arc::clone(&counter));
    let mut session = store.open_session();

    let a = session.store(Issue::new("first")).await.unwrap();
    let b = session.store(Issue::new("second")).await.unwrap();

    assert!(!a.read().id.is_nil());
    assert_ne!(a.read().id, b.read().id);
    assert_eq!(counter.calls(), 0);
}

#[tokio::test]
async fn test_hilo_advances_once_per_block() {
    let (factory, counter) = setup();
    let store = memory_store(&factory, Arc::clone(&counter));
    let mut session = store.open_session();

    // max_lo is 20: two full blocks plus five.
    let mut ids = Vec::new();
    for n in 0..45 {
        let target = session.store(Target::new(n, Colors::Red)).await.unwrap();
        ids.push(target.read().id);
    }

    assert_eq!(counter.calls(), 3);
    assert_eq!(ids, (1..=45).collect::<Vec<i64>>());
}

#[tokio::test]
async fn test_stores_sharing_a_counter_never_collide() {
    let (factory, counter) = setup();
    let first = memory_store(&factory, Arc::clone(&counter));
    let second = memory_store(&factory, Arc::clone(&counter));

    let mut tasks = Vec::new();
    for store in [first, second] {
        tasks.push(tokio::spawn(async move {
            let mut session = store.open_session();
            let mut ids = Vec::new();
            for n in 0..50 {
                let target = session.store(Target::new(n, Colors::Blue)).await.unwrap();
                ids.push(target.read().id);
            }
            ids
        }));
    }

    let mut seen = HashSet::new();
    for task in tasks {
        for id in task.await.unwrap() {
            assert!(seen.insert(id), "duplicate id {id}");
        }
    }
    assert_eq!(seen.len(), 100);
}

#[tokio::test]
async fn test_delete_by_id_is_written_with_other_changes() {
    let (factory, counter) = setup();
    let store = memory_store(&factory, counter);
    let mut session = store.open_session();

    session.store(Target::new(1, Colors::Red)).await.unwrap();
    session.delete_by_id::<Target>(99).unwrap();

    let pending = session.pending_changes().unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending.deletes[0].id, DocumentId::Long(99));

    session.save_changes().await.unwrap();
    let executed = factory.last_executed().unwrap();
    assert!(executed.sql.ends_with("delete from mt_doc_target where id = $3"));
    assert!(session.pending_changes().unwrap().is_empty());
}
