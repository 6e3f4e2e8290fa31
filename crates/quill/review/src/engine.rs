//! Proposal lifecycle engine.
//!
//! The engine validates a request against the stores and the authorization
//! policy, then hands the write to a single store call. Every
//! check-then-act that must not race (duplicate pending, status transition,
//! merge, cascade delete) is enforced by that store call, and store-level
//! races come back here as typed failures.

use crate::error::{ForbiddenReason, RequestReason, ReviewError, ReviewResult};
use crate::policy;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use quill_storage::{
    Document, DocumentId, DocumentStore, LifecycleStore, MergeCommit, Proposal, ProposalId,
    ProposalStatus, ProposalStore, QuillStorage, ReviewStamp, StorageError, UserId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Display name used when a caller supplies none.
pub const ANONYMOUS: &str = "Anonymous";

/// Input to [`ProposalEngine::create_proposal`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProposal {
    pub document_id: DocumentId,
    pub proposer_id: UserId,
    pub proposer_name: String,
    pub proposed_body: String,
    /// Falls back to the document title at creation time when empty.
    pub proposed_title: Option<String>,
    pub message: Option<String>,
}

/// Result of a successful proposal creation.
///
/// Document fields are a convenience copy taken at creation time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProposalReceipt {
    pub proposal_id: ProposalId,
    pub document_title: String,
    pub document_owner_name: String,
}

/// Result of an approval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeReceipt {
    pub document_id: DocumentId,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

/// Result of a rejection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectionReceipt {
    pub proposal_id: ProposalId,
    pub review_message: Option<String>,
}

/// Creates, approves and rejects proposals, and deletes documents together
/// with their proposals.
#[derive(Clone)]
pub struct ProposalEngine {
    store: Arc<dyn QuillStorage>,
}

impl ProposalEngine {
    pub fn new(store: Arc<dyn QuillStorage>) -> Self {
        Self { store }
    }

    pub async fn create_proposal(&self, request: CreateProposal) -> ReviewResult<ProposalReceipt> {
        let document = self
            .store
            .get_document(&request.document_id)
            .await?
            .ok_or_else(|| ReviewError::document_not_found(&request.document_id))?;

        // Ownership is checked first so owners always get the same answer,
        // whatever the visibility of their document.
        if policy::is_owner(&document, &request.proposer_id) {
            tracing::debug!(document_id = %document.id, proposer_id = %request.proposer_id, "self-proposal refused");
            return Err(ReviewError::InvalidRequest(RequestReason::SelfProposal));
        }
        if !policy::can_create_proposal(&document, &request.proposer_id) {
            tracing::debug!(document_id = %document.id, proposer_id = %request.proposer_id, "proposal against private document refused");
            return Err(ReviewError::Forbidden(ForbiddenReason::PrivateDocument));
        }

        let proposed_title = request
            .proposed_title
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| document.title.clone());
        let proposal = Proposal {
            id: ProposalId::generate(),
            document_id: document.id.clone(),
            original_body: document.body.clone(),
            proposed_body: request.proposed_body,
            proposed_title,
            proposer_id: request.proposer_id,
            proposer_name: display_name(request.proposer_name),
            status: ProposalStatus::Pending,
            created_at: now(),
            reviewed_at: None,
            message: request.message,
            review_message: None,
        };
        let proposal_id = proposal.id.clone();
        let proposer_id = proposal.proposer_id.clone();

        match self.store.create_proposal(proposal).await {
            Ok(()) => {}
            Err(StorageError::Conflict(_)) => {
                tracing::debug!(document_id = %document.id, proposer_id = %proposer_id, "duplicate pending proposal refused");
                return Err(ReviewError::InvalidRequest(RequestReason::DuplicatePending));
            }
            Err(StorageError::NotFound(_)) => {
                return Err(ReviewError::document_not_found(&document.id));
            }
            Err(other) => return Err(other.into()),
        }

        tracing::info!(
            proposal_id = %proposal_id,
            document_id = %document.id,
            proposer_id = %proposer_id,
            "proposal opened"
        );
        Ok(ProposalReceipt {
            proposal_id,
            document_title: document.title,
            document_owner_name: document.owner_name,
        })
    }

    /// Merge a pending proposal into its document.
    pub async fn approve_proposal(
        &self,
        proposal_id: &ProposalId,
        reviewer_id: &UserId,
        review_message: Option<String>,
    ) -> ReviewResult<MergeReceipt> {
        let (proposal, document) = self.load_reviewable(proposal_id, reviewer_id).await?;

        let title = (!proposal.proposed_title.is_empty()
            && proposal.proposed_title != document.title)
            .then(|| proposal.proposed_title.clone());
        let merge = MergeCommit {
            proposal_id: proposal.id.clone(),
            document_id: document.id.clone(),
            body: proposal.proposed_body.clone(),
            title,
            reviewed_at: advance(document.updated_at),
            review_message,
        };

        let (document, _) = match self.store.merge_proposal(merge).await {
            Ok(merged) => merged,
            Err(StorageError::StatusMismatch { found, .. }) => {
                return Err(ReviewError::InvalidState { current: found });
            }
            Err(StorageError::NotFound(_)) => {
                return Err(self.vanished_during_review(&proposal).await);
            }
            Err(other) => return Err(other.into()),
        };

        tracing::info!(
            proposal_id = %proposal_id,
            document_id = %document.id,
            reviewer_id = %reviewer_id,
            "proposal approved and merged"
        );
        Ok(MergeReceipt {
            document_id: document.id,
            title: document.title,
            updated_at: document.updated_at,
        })
    }

    /// Close a pending proposal without touching its document.
    pub async fn reject_proposal(
        &self,
        proposal_id: &ProposalId,
        reviewer_id: &UserId,
        review_message: Option<String>,
    ) -> ReviewResult<RejectionReceipt> {
        let (proposal, _) = self.load_reviewable(proposal_id, reviewer_id).await?;

        let stamp = ReviewStamp {
            reviewed_at: now(),
            review_message,
        };
        let rejected = match self
            .store
            .update_proposal_status(
                &proposal.id,
                ProposalStatus::Pending,
                ProposalStatus::Rejected,
                stamp,
            )
            .await
        {
            Ok(rejected) => rejected,
            Err(StorageError::StatusMismatch { found, .. }) => {
                return Err(ReviewError::InvalidState { current: found });
            }
            Err(StorageError::NotFound(_)) => {
                return Err(ReviewError::proposal_not_found(proposal_id));
            }
            Err(other) => return Err(other.into()),
        };

        tracing::info!(
            proposal_id = %proposal_id,
            document_id = %rejected.document_id,
            reviewer_id = %reviewer_id,
            "proposal rejected"
        );
        Ok(RejectionReceipt {
            proposal_id: rejected.id,
            review_message: rejected.review_message,
        })
    }

    /// Delete a document and every proposal that references it.
    ///
    /// Returns how many proposals were removed.
    pub async fn delete_document_cascade(
        &self,
        document_id: &DocumentId,
        caller_id: &UserId,
    ) -> ReviewResult<usize> {
        let document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| ReviewError::document_not_found(document_id))?;
        if !policy::can_mutate_document(&document, caller_id) {
            tracing::warn!(document_id = %document_id, caller_id = %caller_id, "delete by non-owner refused");
            return Err(ReviewError::Forbidden(ForbiddenReason::NotOwner));
        }

        let removed = match self.store.delete_document_cascade(document_id).await {
            Ok(removed) => removed,
            Err(StorageError::NotFound(_)) => {
                return Err(ReviewError::document_not_found(document_id));
            }
            Err(other) => return Err(other.into()),
        };

        tracing::info!(document_id = %document_id, proposals_removed = removed, "document deleted");
        Ok(removed)
    }

    /// Shared preconditions of approval and rejection, in reporting order.
    async fn load_reviewable(
        &self,
        proposal_id: &ProposalId,
        reviewer_id: &UserId,
    ) -> ReviewResult<(Proposal, Document)> {
        let proposal = self
            .store
            .get_proposal(proposal_id)
            .await?
            .ok_or_else(|| ReviewError::proposal_not_found(proposal_id))?;
        if proposal.status.is_terminal() {
            return Err(ReviewError::InvalidState {
                current: proposal.status,
            });
        }

        let Some(document) = self.store.get_document(&proposal.document_id).await? else {
            return Err(integrity_anomaly(&proposal));
        };
        if !policy::can_review(&document, reviewer_id) {
            tracing::warn!(
                proposal_id = %proposal_id,
                reviewer_id = %reviewer_id,
                "review by non-owner refused"
            );
            return Err(ReviewError::Forbidden(ForbiddenReason::NotOwner));
        }
        Ok((proposal, document))
    }

    /// A merge found a record missing. Either a cascade delete won the race
    /// and took the proposal with it, or the document went away on its own.
    async fn vanished_during_review(&self, proposal: &Proposal) -> ReviewError {
        match self.store.get_proposal(&proposal.id).await {
            Ok(None) => ReviewError::proposal_not_found(&proposal.id),
            Ok(Some(current)) => integrity_anomaly(&current),
            Err(err) => err.into(),
        }
    }
}

fn integrity_anomaly(proposal: &Proposal) -> ReviewError {
    tracing::error!(
        proposal_id = %proposal.id,
        document_id = %proposal.document_id,
        "integrity anomaly: proposal references a missing document"
    );
    ReviewError::Integrity {
        proposal_id: proposal.id.clone(),
        document_id: proposal.document_id.clone(),
    }
}

pub(crate) fn display_name(name: String) -> String {
    if name.trim().is_empty() {
        ANONYMOUS.to_string()
    } else {
        name
    }
}

/// Wall clock at the precision every backend stores.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// A timestamp strictly after `previous`.
pub(crate) fn advance(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, Subject};
    use quill_storage::{DocumentStore, InMemoryQuillStorage, ProposalStore};

    async fn seeded(owner: &str, is_public: bool) -> (Arc<InMemoryQuillStorage>, DocumentId) {
        let store = Arc::new(InMemoryQuillStorage::new());
        let at = now();
        let document = Document {
            id: DocumentId::generate(),
            title: "Ode".into(),
            body: "old".into(),
            form: None,
            tone: None,
            owner_id: UserId::new(owner),
            owner_name: owner.to_string(),
            is_public,
            created_at: at,
            updated_at: at,
        };
        let id = document.id.clone();
        store.create_document(document).await.unwrap();
        (store, id)
    }

    fn request(document_id: &DocumentId, proposer: &str, body: &str) -> CreateProposal {
        CreateProposal {
            document_id: document_id.clone(),
            proposer_id: UserId::new(proposer),
            proposer_name: String::new(),
            proposed_body: body.into(),
            proposed_title: None,
            message: None,
        }
    }

    #[test]
    fn advance_is_strictly_increasing() {
        let future = Utc::now() + Duration::seconds(60);
        assert!(advance(future) > future);
        let past = Utc::now() - Duration::seconds(60);
        assert!(advance(past) > past);
    }

    #[test]
    fn blank_names_become_anonymous() {
        assert_eq!(display_name("  ".into()), ANONYMOUS);
        assert_eq!(display_name("bob".into()), "bob");
    }

    #[tokio::test]
    async fn missing_document_is_reported_first() {
        let store = Arc::new(InMemoryQuillStorage::new());
        let engine = ProposalEngine::new(store);
        let err = engine
            .create_proposal(request(&DocumentId::new("nope"), "bob", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::NotFound(Subject::Document, _)));
    }

    #[tokio::test]
    async fn creation_captures_title_body_and_default_name() {
        let (store, doc) = seeded("alice", true).await;
        let engine = ProposalEngine::new(store.clone());
        let receipt = engine
            .create_proposal(request(&doc, "bob", "new"))
            .await
            .unwrap();
        assert_eq!(receipt.document_title, "Ode");
        assert_eq!(receipt.document_owner_name, "alice");

        let stored = store.get_proposal(&receipt.proposal_id).await.unwrap().unwrap();
        assert_eq!(stored.original_body, "old");
        assert_eq!(stored.proposed_title, "Ode");
        assert_eq!(stored.proposer_name, ANONYMOUS);
        assert_eq!(stored.status, ProposalStatus::Pending);
        assert!(stored.reviewed_at.is_none());
    }

    #[tokio::test]
    async fn approval_of_orphaned_proposal_is_an_integrity_anomaly() {
        let (store, doc) = seeded("alice", true).await;
        let engine = ProposalEngine::new(store.clone());
        let receipt = engine
            .create_proposal(request(&doc, "bob", "new"))
            .await
            .unwrap();

        // Plain delete skips the cascade and strands the proposal.
        assert!(store.delete_document(&doc).await.unwrap());

        let err = engine
            .approve_proposal(&receipt.proposal_id, &UserId::new("alice"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::Integrity { .. }));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn cascade_delete_requires_owner() {
        let (store, doc) = seeded("alice", true).await;
        let engine = ProposalEngine::new(store.clone());
        engine
            .create_proposal(request(&doc, "bob", "new"))
            .await
            .unwrap();

        let err = engine
            .delete_document_cascade(&doc, &UserId::new("bob"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let removed = engine
            .delete_document_cascade(&doc, &UserId::new("alice"))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_document(&doc).await.unwrap().is_none());

        let err = engine
            .delete_document_cascade(&doc, &UserId::new("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::NotFound(Subject::Document, _)));
    }
}
