//! Fixtures shared by the unit tests of this crate.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vellum_client::{MemoryConnectionFactory, Row};
use vellum_common::{DocumentId, StoreConfig, Value, VellumResult};
use vellum_schema::{Document, HiloCounter, StoreOptions};

use crate::store::DocumentStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Note {
    pub(crate) id: i64,
    pub(crate) text: String,
}

impl Note {
    pub(crate) fn new(text: &str) -> Self {
        Self {
            id: 0,
            text: text.to_string(),
        }
    }
}

impl Document for Note {
    fn id(&self) -> DocumentId {
        DocumentId::Long(self.id)
    }

    fn set_id(&mut self, id: DocumentId) {
        if let DocumentId::Long(id) = id {
            self.id = id;
        }
    }
}

/// Counter that advances in memory.
#[derive(Default)]
pub(crate) struct LocalCounter {
    hi: AtomicI64,
}

#[async_trait]
impl HiloCounter for LocalCounter {
    async fn next_hi(&self, _entity: &str, increment: i32) -> VellumResult<i64> {
        Ok(self.hi.fetch_add(i64::from(increment), Ordering::SeqCst))
    }
}

pub(crate) fn store(factory: &MemoryConnectionFactory) -> DocumentStore {
    let config = StoreConfig::builder().hilo_max_lo(10).build();
    let mut options = StoreOptions::new(config);
    options.register::<Note>();
    DocumentStore::with_counter(
        options,
        Arc::new(factory.clone()),
        Arc::new(LocalCounter::default()),
    )
    .unwrap()
}

pub(crate) fn note_row(id: i64, text: &str) -> Row {
    Row::new(vec![
        Value::Json(serde_json::json!({ "id": id, "text": text })),
        Value::Integer(id),
    ])
}
