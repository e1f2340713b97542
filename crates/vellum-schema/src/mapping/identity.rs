use uuid::Uuid;
use vellum_common::{DocumentId, VellumError, VellumResult};

use super::{DocumentMapping, IdStrategy};
use crate::sequence::SequenceFactory;

impl DocumentMapping {
    /// Produces an id for a new document according to the id strategy.
    pub async fn next_id(&self, sequences: &SequenceFactory) -> VellumResult<DocumentId> {
        match self.id_strategy() {
            IdStrategy::HiLo => {
                let sequence = sequences.sequence_for(self.sequence_name(), self.hilo());
                Ok(DocumentId::Long(sequence.next_long().await?))
            }
            IdStrategy::Guid => Ok(DocumentId::Uuid(Uuid::new_v4())),
            IdStrategy::Assigned => Err(VellumError::InvalidIdentity {
                type_name: self.document_type().type_name().to_string(),
                reason: "ids must be assigned before the document is stored".to_string(),
            }),
        }
    }

    /// Returns `id` if it is set, otherwise a freshly assigned one.
    pub async fn ensure_id(
        &self,
        id: DocumentId,
        sequences: &SequenceFactory,
    ) -> VellumResult<Option<DocumentId>> {
        if id.is_empty() {
            self.next_id(sequences).await.map(Some)
        } else {
            Ok(None)
        }
    }
}
