//! Live PostgreSQL tests.
//!
//! These run only when `VELLUM_TEST_DATABASE_URL` points at a database the
//! suite may reset; otherwise they are skipped. The scenarios share tables,
//! so they run in sequence from one test.

use std::sync::Arc;

use vellum_client::PgConnectionFactory;
use vellum_common::VellumError;
use vellum_query::{field, Query};
use vellum_schema::{DatabaseHiloCounter, HiloCounter};
use vellum_session::DocumentStore;
use vellum_test::fixtures::{AdminUser, Colors, Issue, Target, User};
use vellum_test::utils::live_store;

async fn nullable_counts(store: &DocumentStore) -> anyhow::Result<()> {
    let mut session = store.open_session();
    for value in [Some(3), None, None, Some(3), None] {
        session
            .store(Target::new(1, Colors::Red).with_nullable(value))
            .await?;
    }
    session.save_changes().await?;

    let mut query = store.query_session();
    let nullable = || Query::<Target>::new();
    assert_eq!(
        query
            .count(nullable().filter(field("NullableNumber").eq(None::<i32>)))
            .await?,
        3
    );
    assert_eq!(
        query
            .count(nullable().filter(field("NullableNumber").has_value().not()))
            .await?,
        3
    );
    assert_eq!(
        query
            .count(nullable().filter(field("NullableNumber").has_value()))
            .await?,
        2
    );
    assert_eq!(
        query
            .count(nullable().filter(field("NullableNumber").gt(2)))
            .await?,
        2
    );
    assert_eq!(
        query
            .count(nullable().filter(field("NullableNumber").gt(4)))
            .await?,
        0
    );
    Ok(())
}

async fn cardinality(store: &DocumentStore) -> anyhow::Result<()> {
    let mut session = store.open_session();
    session.store(Target::new(10, Colors::Blue)).await?;
    session.store(Target::new(11, Colors::Blue)).await?;
    session.store(Target::new(12, Colors::Green)).await?;
    session.save_changes().await?;

    let mut query = store.query_session();
    let blue = || Query::<Target>::new().filter(field("Color").eq("Blue"));
    let green = || Query::<Target>::new().filter(field("Color").eq("Green"));

    assert!(matches!(
        query.single(blue()).await,
        Err(VellumError::CardinalityViolation { .. })
    ));
    assert!(matches!(
        query.single_or_default(blue()).await,
        Err(VellumError::CardinalityViolation { .. })
    ));
    assert_eq!(query.single(green()).await?.read().number, 12);
    assert_eq!(
        query.single_or_default(green()).await?.map(|t| t.read().number),
        Some(12)
    );

    let first = query
        .first(blue().order_by_descending("Number"))
        .await?;
    assert_eq!(first.read().number, 11);
    assert!(!query.any(Query::<Target>::new().filter(field("Number").gt(100))).await?);
    Ok(())
}

async fn identity_and_batches(store: &DocumentStore) -> anyhow::Result<()> {
    let mut session = store.open_session();
    let stored = session.store(Target::new(42, Colors::Green).with_inner(7)).await?;
    let id = stored.read().id;
    session.save_changes().await?;

    let same = session.load::<Target>(id).await?.expect("stored target");
    assert!(Arc::ptr_eq(&same, &stored));

    let mut fresh = store.open_session();
    let distinct = fresh.load::<Target>(id).await?.expect("stored target");
    assert!(!Arc::ptr_eq(&distinct, &stored));
    assert_eq!(*distinct.read(), *stored.read());

    let mut batch = fresh.batch();
    let resident = batch.load::<Target>(id)?;
    let nested = batch.query(Query::<Target>::new().filter(field("Inner.Number").eq(7)))?;
    let total = batch.count(Query::<Target>::new())?;
    batch.execute().await?;

    assert!(Arc::ptr_eq(&resident.await?.expect("resident"), &distinct));
    assert_eq!(nested.await?.len(), 1);
    assert!(total.await? >= 1);

    distinct.write().number = 43;
    fresh.save_changes().await?;
    let mut reread = store.query_session();
    let reloaded = reread.load::<Target>(id).await?.expect("saved target");
    assert_eq!(reloaded.read().number, 43);

    let raw = reread
        .query_sql::<Target>("where d.data ->> 'Color' = ?", vec!["Green".into()])
        .await?;
    assert!(raw.iter().any(|t| t.read().id == id));

    fresh.delete_by_id::<Target>(id)?;
    fresh.save_changes().await?;
    assert!(store.query_session().load::<Target>(id).await?.is_none());
    Ok(())
}

async fn hierarchy(store: &DocumentStore) -> anyhow::Result<()> {
    let mut session = store.open_session();
    session.store(User::new("Dee", "Long")).await?;
    session.store(AdminUser::new("Eve", "west")).await?;
    session.save_changes().await?;

    let mut query = store.query_session();
    let admins = query.query(Query::<AdminUser>::new()).await?;
    assert_eq!(admins.len(), 1);
    assert_eq!(admins[0].read().region, "west");

    let dee = query
        .single(Query::<User>::new().filter(field("FirstName").eq("Dee")))
        .await?;
    assert_eq!(dee.read().last_name, "Long");

    let ids: Vec<i64> = vec![admins[0].read().id, dee.read().id, -1];
    let users = query.load_many::<AdminUser, _>(ids).await?;
    assert_eq!(users.len(), 1);
    Ok(())
}

async fn guid_documents(store: &DocumentStore) -> anyhow::Result<()> {
    let mut session = store.open_session();
    let issue = session.store(Issue::new("broken build")).await?;
    let id = issue.read().id;
    session.save_changes().await?;

    let loaded = store
        .query_session()
        .load::<Issue>(id)
        .await?
        .expect("stored issue");
    assert_eq!(loaded.read().title, "broken build");
    Ok(())
}

async fn hilo_first_use(store: &DocumentStore) -> anyhow::Result<()> {
    let connection_string = store.options().config().connection_string.clone();
    let factory = PgConnectionFactory::from_connection_string(connection_string)?;
    let counter = DatabaseHiloCounter::new(Arc::new(factory));

    // A new entity name starts at hi 0 and advances by the increment.
    assert_eq!(counter.next_hi("first_use_probe", 1).await?, 0);
    assert_eq!(counter.next_hi("first_use_probe", 1).await?, 1);
    assert_eq!(counter.next_hi("first_use_probe", 5).await?, 6);
    Ok(())
}

#[tokio::test]
async fn test_live_postgres_suite() -> anyhow::Result<()> {
    let Some(store) = live_store().await? else {
        eprintln!("Skipping live PostgreSQL suite - VELLUM_TEST_DATABASE_URL is not set");
        return Ok(());
    };

    hilo_first_use(&store).await?;
    nullable_counts(&store).await?;
    cardinality(&store).await?;
    identity_and_batches(&store).await?;
    hierarchy(&store).await?;
    guid_documents(&store).await?;
    Ok(())
}
