use crate::model::{
    Document, DocumentId, DocumentPatch, MergeCommit, Proposal, ProposalFilter, ProposalId,
    ProposalStatus, ReviewStamp, UserId,
};
use crate::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Generic query window for paged reads. A zero limit means unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl QueryWindow {
    pub fn all() -> Self {
        Self::default()
    }
}

/// Storage interface for documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document. Fails with `Conflict` when the id is taken.
    async fn create_document(&self, document: Document) -> StorageResult<()>;

    async fn get_document(&self, document_id: &DocumentId) -> StorageResult<Option<Document>>;

    /// Apply a direct edit and return the updated record.
    async fn update_document(
        &self,
        document_id: &DocumentId,
        patch: DocumentPatch,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<Document>;

    /// Remove a single document without touching proposals.
    ///
    /// Callers that must keep proposals consistent use
    /// [`LifecycleStore::delete_document_cascade`] instead.
    async fn delete_document(&self, document_id: &DocumentId) -> StorageResult<bool>;

    /// Documents owned by `owner_id`, newest first.
    async fn list_documents_by_owner(&self, owner_id: &UserId) -> StorageResult<Vec<Document>>;

    /// Public documents, newest first.
    async fn list_public_documents(&self, window: QueryWindow) -> StorageResult<Vec<Document>>;
}

/// Storage interface for edit proposals.
#[async_trait]
pub trait ProposalStore: Send + Sync {
    /// Insert a new proposal.
    ///
    /// Fails with `Conflict` if a pending proposal already exists for the same
    /// document and proposer, and with `NotFound` if the document is absent.
    /// Both checks are atomic with the insert.
    async fn create_proposal(&self, proposal: Proposal) -> StorageResult<()>;

    async fn get_proposal(&self, proposal_id: &ProposalId) -> StorageResult<Option<Proposal>>;

    /// Compare-and-set status transition.
    async fn update_proposal_status(
        &self,
        proposal_id: &ProposalId,
        expected_from: ProposalStatus,
        to: ProposalStatus,
        stamp: ReviewStamp,
    ) -> StorageResult<Proposal>;

    /// Proposals matching every supplied filter, newest first.
    async fn list_proposals(&self, filter: &ProposalFilter) -> StorageResult<Vec<Proposal>>;

    /// Remove every proposal that references `document_id`. Returns the count.
    async fn delete_proposals_for_document(&self, document_id: &DocumentId)
        -> StorageResult<usize>;
}

/// Units of work that span both tables and must commit together.
#[async_trait]
pub trait LifecycleStore: Send + Sync {
    /// Move a pending proposal to `approved` and write its content into the
    /// target document. Either both writes land or neither does.
    async fn merge_proposal(&self, merge: MergeCommit) -> StorageResult<(Document, Proposal)>;

    /// Delete every proposal referencing the document, then the document.
    /// Returns how many proposals were removed.
    async fn delete_document_cascade(&self, document_id: &DocumentId) -> StorageResult<usize>;

    /// Short backend label for health output.
    fn backend_label(&self) -> &'static str;
}

/// Unified storage bundle consumed by the review core.
pub trait QuillStorage: DocumentStore + ProposalStore + LifecycleStore + Send + Sync {}

impl<T> QuillStorage for T where T: DocumentStore + ProposalStore + LifecycleStore + Send + Sync {}
