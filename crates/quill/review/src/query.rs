//! Proposal queries and per-user statistics.
//!
//! Proposals only carry a document id. Enrichment looks each document up
//! explicitly and tolerates it being gone.

use crate::error::{ReviewError, ReviewResult};
use quill_storage::{
    Document, DocumentId, DocumentStore, Proposal, ProposalFilter, ProposalId, ProposalStatus,
    ProposalStore, QuillStorage, UserId,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Conjunctive filter over proposals. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ProposalQueryFilter {
    pub status: Option<ProposalStatus>,
    /// Only proposals against documents this user owns.
    pub document_owner_id: Option<UserId>,
    pub proposer_id: Option<UserId>,
}

/// A proposal with its document's title and owner name as of query time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProposalView {
    #[serde(flatten)]
    pub proposal: Proposal,
    pub document_title: Option<String>,
    pub document_owner_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserStatistics {
    pub total_documents: usize,
    pub public_documents: usize,
    pub proposals_received: usize,
    pub pending_received: usize,
    pub proposals_created: usize,
}

/// Read side of the proposal workflow.
#[derive(Clone)]
pub struct ProposalQuery {
    store: Arc<dyn QuillStorage>,
}

impl ProposalQuery {
    pub fn new(store: Arc<dyn QuillStorage>) -> Self {
        Self { store }
    }

    /// Matching proposals, newest first.
    pub async fn list_proposals(
        &self,
        filter: &ProposalQueryFilter,
    ) -> ReviewResult<Vec<ProposalView>> {
        let mut known = HashMap::new();
        let mut store_filter = ProposalFilter {
            status: filter.status,
            proposer_id: filter.proposer_id.clone(),
            document_ids: None,
        };

        if let Some(owner_id) = &filter.document_owner_id {
            let owned = self.store.list_documents_by_owner(owner_id).await?;
            if owned.is_empty() {
                return Ok(Vec::new());
            }
            store_filter.document_ids = Some(owned.iter().map(|d| d.id.clone()).collect());
            known.extend(owned.into_iter().map(|d| (d.id.clone(), Some(d))));
        }

        let proposals = self.store.list_proposals(&store_filter).await?;
        self.enrich(proposals, known).await
    }

    /// Proposals against one document, newest first.
    pub async fn list_for_document(
        &self,
        document_id: &DocumentId,
    ) -> ReviewResult<Vec<ProposalView>> {
        let proposals = self
            .store
            .list_proposals(&ProposalFilter::for_document(document_id.clone()))
            .await?;
        self.enrich(proposals, HashMap::new()).await
    }

    pub async fn get_proposal(&self, proposal_id: &ProposalId) -> ReviewResult<ProposalView> {
        let proposal = self
            .store
            .get_proposal(proposal_id)
            .await?
            .ok_or_else(|| ReviewError::proposal_not_found(proposal_id))?;
        let mut views = self.enrich(vec![proposal], HashMap::new()).await?;
        views
            .pop()
            .ok_or_else(|| ReviewError::proposal_not_found(proposal_id))
    }

    /// Counts for one user. Unknown users get zeros.
    ///
    /// Received and pending-received come from a single listing, so pending
    /// never exceeds received.
    pub async fn user_statistics(&self, user_id: &UserId) -> ReviewResult<UserStatistics> {
        let owned = self.store.list_documents_by_owner(user_id).await?;
        let mut stats = UserStatistics {
            total_documents: owned.len(),
            public_documents: owned.iter().filter(|d| d.is_public).count(),
            ..UserStatistics::default()
        };

        if !owned.is_empty() {
            let received = self
                .store
                .list_proposals(&ProposalFilter {
                    document_ids: Some(owned.into_iter().map(|d| d.id).collect()),
                    ..ProposalFilter::default()
                })
                .await?;
            stats.proposals_received = received.len();
            stats.pending_received = received
                .iter()
                .filter(|p| p.status == ProposalStatus::Pending)
                .count();
        }

        stats.proposals_created = self
            .store
            .list_proposals(&ProposalFilter::default().with_proposer(user_id.clone()))
            .await?
            .len();

        Ok(stats)
    }

    async fn enrich(
        &self,
        proposals: Vec<Proposal>,
        mut known: HashMap<DocumentId, Option<Document>>,
    ) -> ReviewResult<Vec<ProposalView>> {
        let mut views = Vec::with_capacity(proposals.len());
        for proposal in proposals {
            if !known.contains_key(&proposal.document_id) {
                let document = self.store.get_document(&proposal.document_id).await?;
                known.insert(proposal.document_id.clone(), document);
            }
            let document = known.get(&proposal.document_id).and_then(Option::as_ref);
            views.push(ProposalView {
                document_title: document.map(|d| d.title.clone()),
                document_owner_name: document.map(|d| d.owner_name.clone()),
                proposal,
            });
        }
        Ok(views)
    }
}
