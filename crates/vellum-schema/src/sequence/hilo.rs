use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use vellum_common::{HiloSettings, VellumError, VellumResult};

/// Shared store of hi counters.
#[async_trait]
pub trait HiloCounter: Send + Sync {
    /// Atomically advances the counter of `entity` and returns the new hi.
    ///
    /// The first call for an entity returns 0.
    async fn next_hi(&self, entity: &str, increment: i32) -> VellumResult<i64>;
}

#[derive(Debug)]
struct HiloState {
    current_hi: i64,
    current_lo: i32,
}

/// Id generator for one entity stream.
pub struct HiloSequence {
    entity: String,
    settings: HiloSettings,
    counter: Arc<dyn HiloCounter>,
    state: Mutex<HiloState>,
}

impl HiloSequence {
    /// Creates a sequence that has not reserved a block yet.
    pub fn new(entity: impl Into<String>, settings: HiloSettings, counter: Arc<dyn HiloCounter>) -> Self {
        Self {
            entity: entity.into(),
            settings,
            counter,
            state: Mutex::new(HiloState {
                current_hi: -1,
                current_lo: 1,
            }),
        }
    }

    /// Returns the entity name.
    pub fn entity_name(&self) -> &str {
        &self.entity
    }

    /// Returns the block size.
    pub fn max_lo(&self) -> i32 {
        self.settings.max_lo
    }

    /// Returns the current hi, or -1 before the first reservation.
    pub async fn current_hi(&self) -> i64 {
        self.state.lock().await.current_hi
    }

    /// Returns the lo the next id will use.
    pub async fn current_lo(&self) -> i32 {
        self.state.lock().await.current_lo
    }

    /// Returns the next id.
    ///
    /// The check, the reservation, and the emit happen under one lock, so
    /// concurrent callers never share an id. A failed reservation leaves the
    /// sequence exactly as it was.
    pub async fn next_long(&self) -> VellumResult<i64> {
        let mut state = self.state.lock().await;

        if state.current_hi < 0 || state.current_lo > self.settings.max_lo {
            let hi = self
                .counter
                .next_hi(&self.entity, self.settings.increment)
                .await
                .map_err(|e| {
                    warn!(entity = %self.entity, error = %e, "hi reservation failed");
                    VellumError::SequenceAdvance {
                        entity: self.entity.clone(),
                        reason: e.to_string(),
                    }
                })?;
            debug!(entity = %self.entity, hi, "reserved hi block");
            state.current_hi = hi;
            state.current_lo = 1;
        }

        let value = state.current_hi * i64::from(self.settings.max_lo) + i64::from(state.current_lo);
        state.current_lo += 1;
        Ok(value)
    }

    /// Returns the next id as an `i32`.
    pub async fn next_int(&self) -> VellumResult<i32> {
        let value = self.next_long().await?;
        i32::try_from(value).map_err(|_| VellumError::SequenceAdvance {
            entity: self.entity.clone(),
            reason: format!("{} does not fit in a 32-bit id", value),
        })
    }
}

impl std::fmt::Debug for HiloSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HiloSequence")
            .field("entity", &self.entity)
            .field("settings", &self.settings)
            .finish()
    }
}
