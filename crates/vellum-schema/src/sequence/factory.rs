use std::sync::Arc;

use dashmap::DashMap;
use vellum_common::HiloSettings;

use super::hilo::{HiloCounter, HiloSequence};

/// Hands out one shared [`HiloSequence`] per entity name.
pub struct SequenceFactory {
    counter: Arc<dyn HiloCounter>,
    defaults: HiloSettings,
    sequences: DashMap<String, Arc<HiloSequence>>,
}

impl SequenceFactory {
    /// Creates a factory over a counter store.
    pub fn new(counter: Arc<dyn HiloCounter>, defaults: HiloSettings) -> Self {
        Self {
            counter,
            defaults,
            sequences: DashMap::new(),
        }
    }

    /// Returns the sequence for `entity`, creating it on first use.
    ///
    /// `settings` only applies when the sequence is created.
    pub fn sequence_for(&self, entity: &str, settings: Option<HiloSettings>) -> Arc<HiloSequence> {
        if let Some(existing) = self.sequences.get(entity) {
            return Arc::clone(existing.value());
        }
        let entry = self.sequences.entry(entity.to_string()).or_insert_with(|| {
            Arc::new(HiloSequence::new(
                entity,
                settings.unwrap_or(self.defaults),
                Arc::clone(&self.counter),
            ))
        });
        Arc::clone(entry.value())
    }

    /// Returns the number of sequences created so far.
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    /// Returns true if no sequence has been created.
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}

impl std::fmt::Debug for SequenceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceFactory")
            .field("defaults", &self.defaults)
            .field("sequences", &self.sequences.len())
            .finish()
    }
}
