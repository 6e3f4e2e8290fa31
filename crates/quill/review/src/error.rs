use quill_storage::{DocumentId, ProposalId, ProposalStatus, StorageError};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type for review operations.
pub type ReviewResult<T> = Result<T, ReviewError>;

/// What a `NotFound` failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    Document,
    Proposal,
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document => f.write_str("document"),
            Self::Proposal => f.write_str("proposal"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenReason {
    PrivateDocument,
    NotOwner,
}

impl fmt::Display for ForbiddenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrivateDocument => f.write_str("document is private"),
            Self::NotOwner => f.write_str("caller does not own the document"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestReason {
    SelfProposal,
    DuplicatePending,
}

impl fmt::Display for RequestReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelfProposal => f.write_str("cannot propose edits to your own document"),
            Self::DuplicatePending => {
                f.write_str("a pending proposal for this document already exists")
            }
        }
    }
}

/// Failures of the proposal lifecycle, authorization and query layers.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("{0} {1} not found")]
    NotFound(Subject, String),

    #[error("forbidden: {0}")]
    Forbidden(ForbiddenReason),

    #[error("invalid request: {0}")]
    InvalidRequest(RequestReason),

    #[error("proposal is already {current}")]
    InvalidState { current: ProposalStatus },

    /// A proposal outlived its document. Callers see `NotFound`.
    #[error("document {document_id} referenced by proposal {proposal_id} not found")]
    Integrity {
        proposal_id: ProposalId,
        document_id: DocumentId,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Coarse failure class for transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidRequest,
    InvalidState,
    Internal,
}

impl ReviewError {
    pub(crate) fn document_not_found(id: &DocumentId) -> Self {
        Self::NotFound(Subject::Document, id.to_string())
    }

    pub(crate) fn proposal_not_found(id: &ProposalId) -> Self {
        Self::NotFound(Subject::Proposal, id.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(..) | Self::Integrity { .. } => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Storage(StorageError::InvalidInput(_)) => ErrorKind::InvalidRequest,
            Self::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to hand back to a caller.
    ///
    /// Integrity anomalies read as a plain missing document; storage faults
    /// are not echoed.
    pub fn public_message(&self) -> String {
        match self {
            Self::Integrity { document_id, .. } => format!("document {document_id} not found"),
            Self::Storage(StorageError::InvalidInput(message)) => message.clone(),
            Self::Storage(_) => "internal storage error".to_string(),
            other => other.to_string(),
        }
    }
}
