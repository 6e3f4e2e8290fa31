//! Authorization predicates.
//!
//! Every function here depends only on its arguments. The engine decides
//! which failure to report; these only answer yes or no.

use quill_storage::{Document, UserId};

/// Non-owners may propose edits to public documents.
pub fn can_create_proposal(document: &Document, proposer_id: &UserId) -> bool {
    document.is_public && !is_owner(document, proposer_id)
}

/// Only the owner reviews proposals against a document.
pub fn can_review(document: &Document, reviewer_id: &UserId) -> bool {
    is_owner(document, reviewer_id)
}

/// Direct edits and deletion are owner-only.
pub fn can_mutate_document(document: &Document, caller_id: &UserId) -> bool {
    is_owner(document, caller_id)
}

pub fn is_owner(document: &Document, user_id: &UserId) -> bool {
    &document.owner_id == user_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use quill_storage::DocumentId;

    fn document(owner: &str, is_public: bool) -> Document {
        let now = Utc::now();
        Document {
            id: DocumentId::new("doc"),
            title: "Title".into(),
            body: "body".into(),
            form: None,
            tone: None,
            owner_id: UserId::new(owner),
            owner_name: owner.into(),
            is_public,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn owner_cannot_propose_even_on_public_document() {
        let doc = document("alice", true);
        assert!(!can_create_proposal(&doc, &UserId::new("alice")));
        assert!(can_create_proposal(&doc, &UserId::new("bob")));
    }

    #[test]
    fn private_documents_accept_no_proposals() {
        let doc = document("carol", false);
        assert!(!can_create_proposal(&doc, &UserId::new("dave")));
    }

    #[test]
    fn review_and_mutation_are_owner_only() {
        let doc = document("alice", false);
        assert!(can_review(&doc, &UserId::new("alice")));
        assert!(!can_review(&doc, &UserId::new("bob")));
        assert!(can_mutate_document(&doc, &UserId::new("alice")));
        assert!(!can_mutate_document(&doc, &UserId::new("bob")));
    }

    proptest! {
        #[test]
        fn review_and_proposal_rights_never_overlap(
            owner in "[a-z]{1,8}",
            caller in "[a-z]{1,8}",
            is_public in any::<bool>(),
        ) {
            let doc = document(&owner, is_public);
            let caller = UserId::new(caller);
            prop_assert!(!(can_review(&doc, &caller) && can_create_proposal(&doc, &caller)));
            prop_assert_eq!(can_review(&doc, &caller), can_mutate_document(&doc, &caller));
        }
    }
}
