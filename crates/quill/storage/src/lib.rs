//! Quill storage abstractions.
//!
//! This crate defines the storage contract behind the proposal workflow:
//! - documents (poems) owned by a single user
//! - edit proposals that reference a document by id
//! - atomic lifecycle units that touch both tables at once
//!
//! Design stance:
//! - Stores own their records; proposals only hold a document id.
//! - Every read-check-write the review core depends on is enforced inside
//!   the adapter, so concurrent callers cannot both pass a precondition.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod model;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryQuillStorage;
pub use model::{
    Document, DocumentId, DocumentPatch, MergeCommit, Proposal, ProposalFilter, ProposalId,
    ProposalStatus, ReviewStamp, UserId,
};
pub use traits::{DocumentStore, LifecycleStore, ProposalStore, QueryWindow, QuillStorage};
