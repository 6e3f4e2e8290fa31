//! Direct document management by owners.

use crate::engine::{advance, display_name, now};
use crate::error::{ForbiddenReason, ReviewError, ReviewResult};
use crate::policy;
use quill_storage::{
    Document, DocumentId, DocumentPatch, DocumentStore, QueryWindow, QuillStorage, StorageError,
    UserId,
};
use serde::Deserialize;
use std::sync::Arc;

/// Title given to documents published without one.
pub const UNTITLED: &str = "Untitled";

/// A document about to be published.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub body: String,
    pub form: Option<String>,
    pub tone: Option<String>,
    pub owner_id: UserId,
    pub owner_name: String,
    pub is_public: bool,
}

#[derive(Clone)]
pub struct DocumentLibrary {
    store: Arc<dyn QuillStorage>,
}

impl DocumentLibrary {
    pub fn new(store: Arc<dyn QuillStorage>) -> Self {
        Self { store }
    }

    pub async fn publish(&self, new: NewDocument) -> ReviewResult<Document> {
        let at = now();
        let title = if new.title.trim().is_empty() {
            UNTITLED.to_string()
        } else {
            new.title
        };
        let document = Document {
            id: DocumentId::generate(),
            title,
            body: new.body,
            form: new.form,
            tone: new.tone,
            owner_id: new.owner_id,
            owner_name: display_name(new.owner_name),
            is_public: new.is_public,
            created_at: at,
            updated_at: at,
        };
        self.store.create_document(document.clone()).await?;

        tracing::info!(document_id = %document.id, owner_id = %document.owner_id, is_public = document.is_public, "document published");
        Ok(document)
    }

    pub async fn get(&self, document_id: &DocumentId) -> ReviewResult<Document> {
        self.store
            .get_document(document_id)
            .await?
            .ok_or_else(|| ReviewError::document_not_found(document_id))
    }

    /// Owner edit. Only supplied fields change.
    pub async fn edit(
        &self,
        document_id: &DocumentId,
        caller_id: &UserId,
        patch: DocumentPatch,
    ) -> ReviewResult<Document> {
        let document = self.get(document_id).await?;
        if !policy::can_mutate_document(&document, caller_id) {
            tracing::warn!(document_id = %document_id, caller_id = %caller_id, "edit by non-owner refused");
            return Err(ReviewError::Forbidden(ForbiddenReason::NotOwner));
        }

        match self
            .store
            .update_document(document_id, patch, advance(document.updated_at))
            .await
        {
            Ok(updated) => {
                tracing::info!(document_id = %document_id, "document edited");
                Ok(updated)
            }
            Err(StorageError::NotFound(_)) => Err(ReviewError::document_not_found(document_id)),
            Err(other) => Err(other.into()),
        }
    }

    /// Public documents, newest first.
    pub async fn explore(&self, window: QueryWindow) -> ReviewResult<Vec<Document>> {
        Ok(self.store.list_public_documents(window).await?)
    }

    /// Every document a user owns, newest first, private ones included.
    pub async fn library_for(&self, owner_id: &UserId) -> ReviewResult<Vec<Document>> {
        Ok(self.store.list_documents_by_owner(owner_id).await?)
    }
}
