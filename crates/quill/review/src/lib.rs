//! Quill review core.
//!
//! Three parts sit over an injected [`QuillStorage`](quill_storage::QuillStorage):
//! - [`policy`]: pure authorization predicates
//! - [`ProposalEngine`]: proposal creation, approval, rejection and cascade delete
//! - [`ProposalQuery`]: enriched proposal listings and per-user statistics
//!
//! [`DocumentLibrary`] covers direct owner edits, which share the same
//! ownership rule but never go through review.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod engine;
mod error;
mod library;
pub mod policy;
mod query;

pub use engine::{
    CreateProposal, MergeReceipt, ProposalEngine, ProposalReceipt, RejectionReceipt, ANONYMOUS,
};
pub use error::{ErrorKind, ForbiddenReason, RequestReason, ReviewError, ReviewResult, Subject};
pub use library::{DocumentLibrary, NewDocument, UNTITLED};
pub use query::{ProposalQuery, ProposalQueryFilter, ProposalView, UserStatistics};
