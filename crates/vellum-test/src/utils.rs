use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use vellum_client::{
    Command, Connection, ConnectionFactory, MemoryConnectionFactory, PgConnectionFactory, Row,
    SqlFragment,
};
use vellum_common::{DocumentId, StoreConfig, Value, VellumResult};
use vellum_schema::{HiloCounter, StoreOptions};
use vellum_session::DocumentStore;

use crate::fixtures::registrations;

/// Environment variable naming the PostgreSQL database for live suites.
pub const DATABASE_URL_VAR: &str = "VELLUM_TEST_DATABASE_URL";

/// Tables the fixtures need, created by the live suites.
pub const SCHEMA: &[&str] = &[
    "create table if not exists mt_hilo (entity_name varchar primary key, hi_value bigint not null default 0)",
    "create table if not exists mt_doc_target (id bigint primary key, data jsonb not null)",
    "create table if not exists mt_doc_user (id bigint primary key, data jsonb not null, \
     mt_doc_type varchar not null default 'BASE', first_name varchar)",
    "create table if not exists mt_doc_issue (id uuid primary key, data jsonb not null)",
    "truncate mt_hilo, mt_doc_target, mt_doc_user, mt_doc_issue",
];

/// Installs a test subscriber once; filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Hi counter kept in memory, shared by every entity.
#[derive(Debug, Default)]
pub struct LocalCounter {
    hi: AtomicI64,
    calls: AtomicUsize,
}

impl LocalCounter {
    /// Number of hi reservations made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HiloCounter for LocalCounter {
    async fn next_hi(&self, _entity: &str, increment: i32) -> VellumResult<i64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.hi.fetch_add(i64::from(increment), Ordering::SeqCst))
    }
}

/// Options with every fixture registered.
pub fn fixture_options(config: StoreConfig) -> StoreOptions {
    let mut options = StoreOptions::new(config);
    options.register_all(registrations());
    options
}

/// A store over the scripted memory transport.
pub fn memory_store(factory: &MemoryConnectionFactory, counter: Arc<LocalCounter>) -> DocumentStore {
    init_tracing();
    let config = StoreConfig::builder().hilo_max_lo(20).log_sql(true).build();
    DocumentStore::with_counter(fixture_options(config), Arc::new(factory.clone()), counter)
        .expect("fixture options are valid")
}

/// A hydration row for `document`: data, id and an optional discriminator.
pub fn document_row<T: Serialize>(document: &T, id: impl Into<DocumentId>, discriminator: Option<&str>) -> Row {
    let mut values = vec![
        Value::Json(serde_json::to_value(document).expect("fixtures serialize")),
        id.into().to_value(),
    ];
    if let Some(discriminator) = discriminator {
        values.push(Value::String(discriminator.to_string()));
    }
    Row::new(values)
}

/// A single-column row.
pub fn scalar_row(value: impl Into<Value>) -> Row {
    Row::new(vec![value.into()])
}

/// The live database URL, if configured.
pub fn database_url() -> Option<String> {
    std::env::var(DATABASE_URL_VAR)
        .ok()
        .filter(|url| !url.trim().is_empty())
}

/// A store over a freshly reset live database, or `None` when not configured.
pub async fn live_store() -> anyhow::Result<Option<DocumentStore>> {
    init_tracing();
    let Some(url) = database_url() else {
        return Ok(None);
    };

    let config = StoreConfig::builder()
        .connection_string(url)
        .hilo_max_lo(20)
        .build();
    let factory: Arc<dyn ConnectionFactory> = Arc::new(PgConnectionFactory::new(&config)?);

    // One command per statement: later statements depend on earlier DDL.
    let mut connection = factory.create().await?;
    for statement in SCHEMA {
        connection
            .execute(&Command::single(SqlFragment::raw(*statement)))
            .await?;
    }

    Ok(Some(DocumentStore::new(fixture_options(config), factory)?))
}
