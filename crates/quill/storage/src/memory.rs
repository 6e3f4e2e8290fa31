//! In-memory reference implementation for Quill storage traits.
//!
//! Both tables live behind one lock, so every lifecycle unit is a single
//! critical section. Production deployments should use the PostgreSQL adapter.

use crate::model::{
    later_than, Document, DocumentId, DocumentPatch, MergeCommit, Proposal, ProposalFilter,
    ProposalId, ProposalStatus, ReviewStamp, UserId,
};
use crate::traits::{DocumentStore, LifecycleStore, ProposalStore, QueryWindow};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Tables {
    documents: HashMap<DocumentId, Document>,
    proposals: HashMap<ProposalId, Proposal>,
}

/// In-memory Quill storage adapter.
#[derive(Default)]
pub struct InMemoryQuillStorage {
    tables: RwLock<Tables>,
}

impl InMemoryQuillStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StorageError::Backend("quill tables lock poisoned".to_string()))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StorageError::Backend("quill tables lock poisoned".to_string()))
    }
}

#[async_trait]
impl DocumentStore for InMemoryQuillStorage {
    async fn create_document(&self, document: Document) -> StorageResult<()> {
        let mut guard = self.write()?;
        if guard.documents.contains_key(&document.id) {
            return Err(StorageError::Conflict(format!(
                "document {} already exists",
                document.id
            )));
        }
        guard.documents.insert(document.id.clone(), document);
        Ok(())
    }

    async fn get_document(&self, document_id: &DocumentId) -> StorageResult<Option<Document>> {
        let guard = self.read()?;
        Ok(guard.documents.get(document_id).cloned())
    }

    async fn update_document(
        &self,
        document_id: &DocumentId,
        patch: DocumentPatch,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<Document> {
        let mut guard = self.write()?;
        let document = guard
            .documents
            .get_mut(document_id)
            .ok_or_else(|| StorageError::NotFound(format!("document {document_id} not found")))?;
        patch.apply(document, updated_at);
        Ok(document.clone())
    }

    async fn delete_document(&self, document_id: &DocumentId) -> StorageResult<bool> {
        let mut guard = self.write()?;
        Ok(guard.documents.remove(document_id).is_some())
    }

    async fn list_documents_by_owner(&self, owner_id: &UserId) -> StorageResult<Vec<Document>> {
        let guard = self.read()?;
        let mut values = guard
            .documents
            .values()
            .filter(|document| &document.owner_id == owner_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(values)
    }

    async fn list_public_documents(&self, window: QueryWindow) -> StorageResult<Vec<Document>> {
        let guard = self.read()?;
        let mut values = guard
            .documents
            .values()
            .filter(|document| document.is_public)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(apply_window(values, window))
    }
}

#[async_trait]
impl ProposalStore for InMemoryQuillStorage {
    async fn create_proposal(&self, proposal: Proposal) -> StorageResult<()> {
        let mut guard = self.write()?;

        if !guard.documents.contains_key(&proposal.document_id) {
            return Err(StorageError::NotFound(format!(
                "document {} not found",
                proposal.document_id
            )));
        }
        if guard.proposals.contains_key(&proposal.id) {
            return Err(StorageError::Conflict(format!(
                "proposal {} already exists",
                proposal.id
            )));
        }
        if proposal.status == ProposalStatus::Pending
            && guard.proposals.values().any(|existing| {
                existing.status == ProposalStatus::Pending
                    && existing.document_id == proposal.document_id
                    && existing.proposer_id == proposal.proposer_id
            })
        {
            return Err(StorageError::Conflict(format!(
                "pending proposal already exists for document {} by {}",
                proposal.document_id, proposal.proposer_id
            )));
        }

        guard.proposals.insert(proposal.id.clone(), proposal);
        Ok(())
    }

    async fn get_proposal(&self, proposal_id: &ProposalId) -> StorageResult<Option<Proposal>> {
        let guard = self.read()?;
        Ok(guard.proposals.get(proposal_id).cloned())
    }

    async fn update_proposal_status(
        &self,
        proposal_id: &ProposalId,
        expected_from: ProposalStatus,
        to: ProposalStatus,
        stamp: ReviewStamp,
    ) -> StorageResult<Proposal> {
        let mut guard = self.write()?;
        let proposal = guard
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| StorageError::NotFound(format!("proposal {proposal_id} not found")))?;
        transition(proposal, expected_from, to, stamp)?;
        Ok(proposal.clone())
    }

    async fn list_proposals(&self, filter: &ProposalFilter) -> StorageResult<Vec<Proposal>> {
        let guard = self.read()?;
        let mut values = guard
            .proposals
            .values()
            .filter(|proposal| filter.matches(proposal))
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(values)
    }

    async fn delete_proposals_for_document(
        &self,
        document_id: &DocumentId,
    ) -> StorageResult<usize> {
        let mut guard = self.write()?;
        let before = guard.proposals.len();
        guard
            .proposals
            .retain(|_, proposal| &proposal.document_id != document_id);
        Ok(before - guard.proposals.len())
    }
}

#[async_trait]
impl LifecycleStore for InMemoryQuillStorage {
    async fn merge_proposal(&self, merge: MergeCommit) -> StorageResult<(Document, Proposal)> {
        let mut guard = self.write()?;
        let tables = &mut *guard;

        // Validate both records before writing either.
        let proposal = tables.proposals.get_mut(&merge.proposal_id).ok_or_else(|| {
            StorageError::NotFound(format!("proposal {} not found", merge.proposal_id))
        })?;
        if proposal.status != ProposalStatus::Pending {
            return Err(StorageError::StatusMismatch {
                expected: ProposalStatus::Pending,
                found: proposal.status,
            });
        }
        if proposal.document_id != merge.document_id {
            return Err(StorageError::InvariantViolation(format!(
                "proposal {} targets document {}, not {}",
                merge.proposal_id, proposal.document_id, merge.document_id
            )));
        }
        let document = tables.documents.get_mut(&merge.document_id).ok_or_else(|| {
            StorageError::NotFound(format!("document {} not found", merge.document_id))
        })?;

        transition(
            proposal,
            ProposalStatus::Pending,
            ProposalStatus::Approved,
            ReviewStamp {
                reviewed_at: merge.reviewed_at,
                review_message: merge.review_message,
            },
        )?;
        document.body = merge.body;
        if let Some(title) = merge.title {
            document.title = title;
        }
        document.updated_at = later_than(document.updated_at, merge.reviewed_at);

        Ok((document.clone(), proposal.clone()))
    }

    async fn delete_document_cascade(&self, document_id: &DocumentId) -> StorageResult<usize> {
        let mut guard = self.write()?;
        if !guard.documents.contains_key(document_id) {
            return Err(StorageError::NotFound(format!(
                "document {document_id} not found"
            )));
        }
        let before = guard.proposals.len();
        guard
            .proposals
            .retain(|_, proposal| &proposal.document_id != document_id);
        let removed = before - guard.proposals.len();
        guard.documents.remove(document_id);
        Ok(removed)
    }

    fn backend_label(&self) -> &'static str {
        "memory"
    }
}

fn transition(
    proposal: &mut Proposal,
    expected_from: ProposalStatus,
    to: ProposalStatus,
    stamp: ReviewStamp,
) -> StorageResult<()> {
    if proposal.status != expected_from {
        return Err(StorageError::StatusMismatch {
            expected: expected_from,
            found: proposal.status,
        });
    }
    proposal.status = to;
    proposal.reviewed_at = Some(stamp.reviewed_at);
    proposal.review_message = stamp.review_message;
    Ok(())
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}
