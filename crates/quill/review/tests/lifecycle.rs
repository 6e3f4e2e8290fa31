//! End-to-end proposal lifecycle over the in-memory store.

use quill_review::{
    CreateProposal, DocumentLibrary, ErrorKind, NewDocument, ProposalEngine, ProposalQuery,
    ProposalQueryFilter, ReviewError, Subject, UserStatistics,
};
use quill_storage::{
    Document, DocumentId, DocumentPatch, InMemoryQuillStorage, ProposalId, ProposalStatus,
    QuillStorage, UserId,
};
use std::sync::Arc;

struct Harness {
    engine: ProposalEngine,
    query: ProposalQuery,
    library: DocumentLibrary,
}

impl Harness {
    fn new() -> Self {
        let store: Arc<dyn QuillStorage> = Arc::new(InMemoryQuillStorage::new());
        Self {
            engine: ProposalEngine::new(store.clone()),
            query: ProposalQuery::new(store.clone()),
            library: DocumentLibrary::new(store),
        }
    }

    async fn publish(&self, owner: &str, title: &str, body: &str, is_public: bool) -> Document {
        self.library
            .publish(NewDocument {
                title: title.into(),
                body: body.into(),
                form: None,
                tone: None,
                owner_id: user(owner),
                owner_name: format!("{owner} the poet"),
                is_public,
            })
            .await
            .unwrap()
    }

    async fn propose(
        &self,
        document: &Document,
        proposer: &str,
        body: &str,
    ) -> Result<ProposalId, ReviewError> {
        self.engine
            .create_proposal(proposal(&document.id, proposer, body, None))
            .await
            .map(|receipt| receipt.proposal_id)
    }

    async fn status(&self, proposal_id: &ProposalId) -> ProposalStatus {
        self.query
            .get_proposal(proposal_id)
            .await
            .unwrap()
            .proposal
            .status
    }
}

/// Keeps creation timestamps distinct so ordering is observable.
async fn tick() {
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
}

fn user(id: &str) -> UserId {
    UserId::new(id)
}

fn proposal(
    document_id: &DocumentId,
    proposer: &str,
    body: &str,
    title: Option<&str>,
) -> CreateProposal {
    CreateProposal {
        document_id: document_id.clone(),
        proposer_id: user(proposer),
        proposer_name: proposer.to_string(),
        proposed_body: body.into(),
        proposed_title: title.map(str::to_string),
        message: Some("please consider".into()),
    }
}

#[tokio::test]
async fn owners_cannot_propose_on_public_or_private_documents() {
    let h = Harness::new();
    for is_public in [true, false] {
        let doc = h.publish("alice", "Ode", "old", is_public).await;
        let err = h.propose(&doc, "alice", "mine").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }
}

#[tokio::test]
async fn private_document_refuses_proposals() {
    let h = Harness::new();
    let doc = h.publish("carol", "Secret", "hidden", false).await;
    let err = h.propose(&doc, "dave", "x").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn duplicate_pending_then_reopen_after_approval() {
    let h = Harness::new();
    let d1 = h.publish("alice", "Ode", "old", true).await;

    let p1 = h.propose(&d1, "bob", "new").await.unwrap();
    assert_eq!(h.status(&p1).await, ProposalStatus::Pending);

    let err = h.propose(&d1, "bob", "new2").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);

    h.engine
        .approve_proposal(&p1, &user("alice"), None)
        .await
        .unwrap();
    assert_eq!(h.library.get(&d1.id).await.unwrap().body, "new");

    h.propose(&d1, "bob", "new3").await.unwrap();
}

#[tokio::test]
async fn reopen_after_rejection_and_other_proposers_are_independent() {
    let h = Harness::new();
    let doc = h.publish("alice", "Ode", "old", true).await;

    let p1 = h.propose(&doc, "bob", "a").await.unwrap();
    h.propose(&doc, "erin", "b").await.unwrap();
    h.engine
        .reject_proposal(&p1, &user("alice"), Some("no".into()))
        .await
        .unwrap();
    h.propose(&doc, "bob", "c").await.unwrap();
}

#[tokio::test]
async fn only_the_owner_reviews_and_refusals_change_nothing() {
    let h = Harness::new();
    let doc = h.publish("alice", "Ode", "old", true).await;
    let p = h.propose(&doc, "bob", "new").await.unwrap();

    for intruder in ["bob", "mallory"] {
        let err = h
            .engine
            .approve_proposal(&p, &user(intruder), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let err = h
            .engine
            .reject_proposal(&p, &user(intruder), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    assert_eq!(h.status(&p).await, ProposalStatus::Pending);
    assert_eq!(h.library.get(&doc.id).await.unwrap(), doc);
}

#[tokio::test]
async fn terminal_proposals_refuse_further_review() {
    let h = Harness::new();
    let doc = h.publish("alice", "Ode", "old", true).await;
    let approved = h.propose(&doc, "bob", "new").await.unwrap();
    let rejected = h.propose(&doc, "erin", "other").await.unwrap();

    h.engine
        .approve_proposal(&approved, &user("alice"), None)
        .await
        .unwrap();
    h.engine
        .reject_proposal(&rejected, &user("alice"), None)
        .await
        .unwrap();
    let after = h.library.get(&doc.id).await.unwrap();

    for id in [&approved, &rejected] {
        let a = h
            .engine
            .approve_proposal(id, &user("alice"), None)
            .await
            .unwrap_err();
        let r = h
            .engine
            .reject_proposal(id, &user("alice"), None)
            .await
            .unwrap_err();
        assert_eq!(a.kind(), ErrorKind::InvalidState);
        assert_eq!(r.kind(), ErrorKind::InvalidState);
    }

    assert!(matches!(
        h.engine
            .reject_proposal(&approved, &user("alice"), None)
            .await,
        Err(ReviewError::InvalidState {
            current: ProposalStatus::Approved
        })
    ));
    assert_eq!(h.status(&approved).await, ProposalStatus::Approved);
    assert_eq!(h.status(&rejected).await, ProposalStatus::Rejected);
    assert_eq!(h.library.get(&doc.id).await.unwrap(), after);
}

#[tokio::test]
async fn approval_merges_title_and_body() {
    let h = Harness::new();
    let doc = h.publish("alice", "T0", "B0", true).await;
    let receipt = h
        .engine
        .create_proposal(proposal(&doc.id, "bob", "B1", Some("T1")))
        .await
        .unwrap();

    let merged = h
        .engine
        .approve_proposal(&receipt.proposal_id, &user("alice"), Some("thanks".into()))
        .await
        .unwrap();
    assert_eq!(merged.title, "T1");
    assert!(merged.updated_at > doc.updated_at);

    let after = h.library.get(&doc.id).await.unwrap();
    assert_eq!(after.title, "T1");
    assert_eq!(after.body, "B1");
    assert_eq!(after.updated_at, merged.updated_at);
    assert_eq!(after.owner_id, doc.owner_id);

    let view = h.query.get_proposal(&receipt.proposal_id).await.unwrap();
    assert_eq!(view.proposal.original_body, "B0");
    assert_eq!(view.proposal.status, ProposalStatus::Approved);
    assert_eq!(view.proposal.review_message.as_deref(), Some("thanks"));
    assert!(view.proposal.reviewed_at.is_some());
}

#[tokio::test]
async fn captured_title_is_applied_even_after_owner_renames() {
    let h = Harness::new();
    let doc = h.publish("alice", "First", "old", true).await;
    let p = h.propose(&doc, "bob", "new").await.unwrap();

    h.library
        .edit(
            &doc.id,
            &user("alice"),
            DocumentPatch {
                title: Some("Renamed".into()),
                ..DocumentPatch::default()
            },
        )
        .await
        .unwrap();

    let merged = h
        .engine
        .approve_proposal(&p, &user("alice"), None)
        .await
        .unwrap();
    assert_eq!(merged.title, "First");
}

#[tokio::test]
async fn rejection_leaves_document_identical() {
    let h = Harness::new();
    let doc = h.publish("alice", "Ode", "old", true).await;
    let p = h.propose(&doc, "bob", "new").await.unwrap();

    let receipt = h
        .engine
        .reject_proposal(&p, &user("alice"), Some("not now".into()))
        .await
        .unwrap();
    assert_eq!(receipt.review_message.as_deref(), Some("not now"));
    assert_eq!(h.library.get(&doc.id).await.unwrap(), doc);
}

#[tokio::test]
async fn cascade_delete_removes_every_proposal() {
    let h = Harness::new();
    let doc = h.publish("alice", "Ode", "old", true).await;
    let keep = h.publish("alice", "Other", "text", true).await;

    let pending = h.propose(&doc, "bob", "a").await.unwrap();
    let rejected = h.propose(&doc, "erin", "b").await.unwrap();
    h.engine
        .reject_proposal(&rejected, &user("alice"), None)
        .await
        .unwrap();
    let unrelated = h.propose(&keep, "bob", "c").await.unwrap();

    let removed = h
        .engine
        .delete_document_cascade(&doc.id, &user("alice"))
        .await
        .unwrap();
    assert_eq!(removed, 2);

    for id in [&pending, &rejected] {
        let err = h.query.get_proposal(id).await.unwrap_err();
        assert!(matches!(err, ReviewError::NotFound(Subject::Proposal, _)));
        let err = h
            .engine
            .approve_proposal(id, &user("alice"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
    assert_eq!(h.status(&unrelated).await, ProposalStatus::Pending);
}

#[tokio::test]
async fn statistics_scenario() {
    let h = Harness::new();
    let public = h.publish("u", "Public", "a", true).await;
    h.publish("u", "Private", "b", false).await;
    let theirs = h.publish("v", "Theirs", "c", true).await;

    h.propose(&public, "w", "edit").await.unwrap();
    let mine = h.propose(&theirs, "u", "edit").await.unwrap();
    h.engine
        .approve_proposal(&mine, &user("v"), None)
        .await
        .unwrap();

    let stats = h.query.user_statistics(&user("u")).await.unwrap();
    assert_eq!(
        stats,
        UserStatistics {
            total_documents: 2,
            public_documents: 1,
            proposals_received: 1,
            pending_received: 1,
            proposals_created: 1,
        }
    );
}

#[tokio::test]
async fn listings_filter_conjunctively_newest_first() {
    let h = Harness::new();
    let a = h.publish("alice", "A", "a", true).await;
    let b = h.publish("bob", "B", "b", true).await;

    let first = h.propose(&a, "carol", "1").await.unwrap();
    tick().await;
    let second = h.propose(&b, "carol", "2").await.unwrap();
    tick().await;
    let third = h.propose(&a, "dave", "3").await.unwrap();
    h.engine
        .reject_proposal(&third, &user("alice"), None)
        .await
        .unwrap();

    let all = h
        .query
        .list_proposals(&ProposalQueryFilter::default())
        .await
        .unwrap();
    let ids: Vec<_> = all.iter().map(|v| v.proposal.id.clone()).collect();
    assert_eq!(ids, vec![third.clone(), second.clone(), first.clone()]);

    let carol_on_alice = h
        .query
        .list_proposals(&ProposalQueryFilter {
            document_owner_id: Some(user("alice")),
            proposer_id: Some(user("carol")),
            ..ProposalQueryFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(carol_on_alice.len(), 1);
    assert_eq!(carol_on_alice[0].proposal.id, first);
    assert_eq!(carol_on_alice[0].document_title.as_deref(), Some("A"));
    assert_eq!(
        carol_on_alice[0].document_owner_name.as_deref(),
        Some("alice the poet")
    );

    let rejected_on_alice = h
        .query
        .list_proposals(&ProposalQueryFilter {
            status: Some(ProposalStatus::Rejected),
            document_owner_id: Some(user("alice")),
            ..ProposalQueryFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(rejected_on_alice.len(), 1);
    assert_eq!(rejected_on_alice[0].proposal.id, third);

    let for_a = h.query.list_for_document(&a.id).await.unwrap();
    assert_eq!(for_a.len(), 2);
    assert_eq!(for_a[0].proposal.id, third);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_yield_exactly_one_pending() {
    let h = Arc::new(Harness::new());
    let doc = h.publish("alice", "Ode", "old", true).await;

    let mut tasks = Vec::new();
    for i in 0..16 {
        let h = h.clone();
        let document_id = doc.id.clone();
        tasks.push(tokio::spawn(async move {
            h.engine
                .create_proposal(proposal(&document_id, "bob", &format!("v{i}"), None))
                .await
        }));
    }

    let mut created = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(err) => assert_eq!(err.kind(), ErrorKind::InvalidRequest),
        }
    }
    assert_eq!(created, 1);

    let pending = h
        .query
        .list_proposals(&ProposalQueryFilter {
            status: Some(ProposalStatus::Pending),
            proposer_id: Some(user("bob")),
            ..ProposalQueryFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn approve_and_reject_race_has_one_winner() {
    for _ in 0..20 {
        let h = Arc::new(Harness::new());
        let doc = h.publish("alice", "Ode", "old", true).await;
        let p = h.propose(&doc, "bob", "new").await.unwrap();

        let approve = {
            let h = h.clone();
            let p = p.clone();
            tokio::spawn(async move {
                h.engine
                    .approve_proposal(&p, &user("alice"), None)
                    .await
                    .map(|_| ())
            })
        };
        let reject = {
            let h = h.clone();
            let p = p.clone();
            tokio::spawn(async move {
                h.engine
                    .reject_proposal(&p, &user("alice"), None)
                    .await
                    .map(|_| ())
            })
        };

        let approved = approve.await.unwrap();
        let rejected = reject.await.unwrap();
        assert!(approved.is_ok() != rejected.is_ok());

        let loser = approved.err().or(rejected.err()).unwrap();
        assert_eq!(loser.kind(), ErrorKind::InvalidState);

        let body = h.library.get(&doc.id).await.unwrap().body;
        match h.status(&p).await {
            ProposalStatus::Approved => assert_eq!(body, "new"),
            ProposalStatus::Rejected => assert_eq!(body, "old"),
            ProposalStatus::Pending => panic!("proposal left pending"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn approval_racing_cascade_never_leaves_half_state() {
    for _ in 0..20 {
        let h = Arc::new(Harness::new());
        let doc = h.publish("alice", "Ode", "old", true).await;
        let p = h.propose(&doc, "bob", "new").await.unwrap();

        let approve = {
            let h = h.clone();
            let p = p.clone();
            tokio::spawn(async move { h.engine.approve_proposal(&p, &user("alice"), None).await })
        };
        let delete = {
            let h = h.clone();
            let id = doc.id.clone();
            tokio::spawn(async move { h.engine.delete_document_cascade(&id, &user("alice")).await })
        };

        let approved = approve.await.unwrap();
        delete.await.unwrap().unwrap();

        if let Err(err) = approved {
            assert_eq!(err.kind(), ErrorKind::NotFound);
        }
        assert!(h.library.get(&doc.id).await.is_err());
        assert!(h.query.get_proposal(&p).await.is_err());
    }
}
