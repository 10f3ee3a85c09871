//! Integration tests for the completion pipeline
//!
//! Drives `CompletionService` through the public library API against the
//! in-memory store and the built-in `demo` workflow:
//!
//! 1.1 (dep1, string) -> 1.2 (dep1, file) -> 2.1 (dep2, group)

use std::sync::Arc;

use async_trait::async_trait;
use tokio_stream::StreamExt;

use attesta::authz::{Authorizer, AuthzError, CompletionCheck};
use attesta::events::{Broadcaster, ChannelKey, LiveEvent};
use attesta::notary::{payload_digest, sha256_hex};
use attesta::process::payload::attachment_refs;
use attesta::process::{
    Actor, CompletionError, CompletionRequest, CompletionService, Process, Submission, UploadedFile,
};
use attesta::store::{AttachmentStore, InMemoryStore, NotarizationStore, ProcessStore};
use attesta::workflow::WorkflowRegistry;

// ─── Fixtures ─────────────────────────────────────────────────────────────────

/// Allows when the actor holds the substep's role
struct RoleAuthorizer;

#[async_trait]
impl Authorizer for RoleAuthorizer {
    async fn can_complete(&self, check: &CompletionCheck<'_>) -> Result<bool, AuthzError> {
        Ok(check.actor.role == check.substep.role)
    }
}

/// Denies everything
struct DenyAll;

#[async_trait]
impl Authorizer for DenyAll {
    async fn can_complete(&self, _check: &CompletionCheck<'_>) -> Result<bool, AuthzError> {
        Ok(false)
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    service: CompletionService,
    broadcaster: Broadcaster,
    process_id: String,
}

async fn harness(authorizer: Arc<dyn Authorizer>) -> Harness {
    let registry = Arc::new(WorkflowRegistry::builtin().unwrap());
    let store = Arc::new(InMemoryStore::new());
    let broadcaster = Broadcaster::default();

    let def = registry.get("demo").unwrap();
    let process = Process::start(&def, Some("org-1".to_string()), "u-starter");
    let process_id = process.id.clone();
    store.insert_process(process).await.unwrap();

    let service = CompletionService::new(registry, store.clone(), authorizer, broadcaster.clone(), 1024);
    Harness {
        store,
        service,
        broadcaster,
        process_id,
    }
}

fn actor(role: &str) -> Actor {
    Actor {
        user_id: format!("u-{}", role),
        role: role.to_string(),
        workflow_key: "demo".to_string(),
    }
}

fn request(h: &Harness, role: &str, substep: &str, submission: Submission) -> CompletionRequest {
    CompletionRequest {
        actor: actor(role),
        process_id: h.process_id.clone(),
        substep_id: substep.to_string(),
        submission,
    }
}

fn text(name: &str, value: &str) -> Submission {
    Submission::default().with_value(name, value)
}

fn file(bytes: &[u8]) -> UploadedFile {
    UploadedFile {
        filename: "policy.pdf".to_string(),
        content_type: "application/pdf".to_string(),
        bytes: bytes.to_vec(),
    }
}

fn review(bytes: &[u8]) -> Submission {
    Submission::default()
        .with_value("review.reviewer", "Grace")
        .with_value("review.risk_score", "3")
        .with_file("review.evidence", file(bytes))
}

// ─── Sequence and completion ──────────────────────────────────────────────────

#[tokio::test]
async fn test_in_order_completion_finishes_process_once() {
    let h = harness(Arc::new(RoleAuthorizer)).await;

    let first = h
        .service
        .complete(request(&h, "dep1", "1.1", text("policy_owner", "Ada")))
        .await
        .unwrap();
    assert!(!first.process_completed);
    assert_eq!(first.process.step("1.1").unwrap().data.as_ref().unwrap()["policy_owner"], "Ada");

    let policy = b"%PDF-1.7 signed";
    h.service
        .complete(request(
            &h,
            "dep1",
            "1.2",
            Submission::default().with_file("policy_document", file(policy)),
        ))
        .await
        .unwrap();

    let last = h
        .service
        .complete(request(&h, "dep2", "2.1", review(b"evidence")))
        .await
        .unwrap();
    assert!(last.process_completed);
    assert_eq!(last.process.status.as_str(), "done");
    assert!(last.process.completed_at.is_some());

    let data = &last.process.step("2.1").unwrap().data.as_ref().unwrap()["review"];
    assert_eq!(data["reviewer"], "Grace");
    assert_eq!(data["risk_score"], 3);
    assert_eq!(attachment_refs(data).len(), 1);

    let stored = h.store.get_process(&h.process_id).await.unwrap().unwrap();
    assert_eq!(stored.done_count(), 3);
    assert!(!h.store.mark_process_done(&h.process_id, chrono::Utc::now()).await.unwrap());
}

#[tokio::test]
async fn test_out_of_order_completion_conflicts() {
    let h = harness(Arc::new(RoleAuthorizer)).await;

    let err = h
        .service
        .complete(request(&h, "dep2", "2.1", review(b"evidence")))
        .await
        .unwrap_err();
    assert!(matches!(err, CompletionError::Locked));

    h.service
        .complete(request(&h, "dep1", "1.1", text("policy_owner", "Ada")))
        .await
        .unwrap();
    let err = h
        .service
        .complete(request(&h, "dep2", "2.1", review(b"evidence")))
        .await
        .unwrap_err();
    assert!(matches!(err, CompletionError::Locked));

    h.service
        .complete(request(
            &h,
            "dep1",
            "1.2",
            Submission::default().with_file("policy_document", file(b"policy")),
        ))
        .await
        .unwrap();
    h.service
        .complete(request(&h, "dep2", "2.1", review(b"evidence")))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_locked_wins_over_allow_and_deny() {
    for authorizer in [Arc::new(RoleAuthorizer) as Arc<dyn Authorizer>, Arc::new(DenyAll)] {
        let h = harness(authorizer).await;
        let err = h
            .service
            .complete(request(
                &h,
                "dep1",
                "1.2",
                Submission::default().with_file("policy_document", file(b"x")),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Locked));
    }
}

#[tokio::test]
async fn test_completing_twice_conflicts() {
    let h = harness(Arc::new(RoleAuthorizer)).await;
    h.service
        .complete(request(&h, "dep1", "1.1", text("policy_owner", "Ada")))
        .await
        .unwrap();

    let err = h
        .service
        .complete(request(&h, "dep1", "1.1", text("policy_owner", "Bob")))
        .await
        .unwrap_err();
    assert!(matches!(err, CompletionError::AlreadyDone));

    let stored = h.store.get_process(&h.process_id).await.unwrap().unwrap();
    assert_eq!(stored.step("1.1").unwrap().data.as_ref().unwrap()["policy_owner"], "Ada");
    assert_eq!(h.store.list_notarizations(&h.process_id).await.unwrap().len(), 1);
}

// ─── Denials leave no trace ───────────────────────────────────────────────────

#[tokio::test]
async fn test_denial_changes_nothing() {
    let h = harness(Arc::new(DenyAll)).await;
    let before = h.store.get_process(&h.process_id).await.unwrap().unwrap();

    let err = h
        .service
        .complete(request(&h, "dep1", "1.1", text("policy_owner", "Ada")))
        .await
        .unwrap_err();
    assert!(matches!(err, CompletionError::Forbidden));

    let after = h.store.get_process(&h.process_id).await.unwrap().unwrap();
    assert_eq!(before, after);
    assert!(h.store.list_notarizations(&h.process_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_payload_changes_nothing() {
    let h = harness(Arc::new(RoleAuthorizer)).await;
    h.service
        .complete(request(&h, "dep1", "1.1", text("policy_owner", "Ada")))
        .await
        .unwrap();

    let err = h
        .service
        .complete(request(
            &h,
            "dep1",
            "1.2",
            Submission::default().with_file("policy_document", file(&[0u8; 2048])),
        ))
        .await
        .unwrap_err();
    match err {
        CompletionError::InvalidPayload(e) => assert!(e.is_too_large()),
        other => panic!("unexpected error: {:?}", other),
    }

    assert!(h.store.list_attachments(&h.process_id).await.unwrap().is_empty());
    let stored = h.store.get_process(&h.process_id).await.unwrap().unwrap();
    assert!(!stored.is_step_done("1.2"));
}

// ─── Notarization and attachments ─────────────────────────────────────────────

#[tokio::test]
async fn test_notarization_digest_matches_payload() {
    let h = harness(Arc::new(RoleAuthorizer)).await;
    let outcome = h
        .service
        .complete(request(&h, "dep1", "1.1", text("policy_owner", "Ada")))
        .await
        .unwrap();

    let log = h.store.list_notarizations(&h.process_id).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0], outcome.notarization);
    assert_eq!(log[0].digest, payload_digest(&log[0].payload));
    assert_eq!(log[0].actor.role, "dep1");
    assert!(log[0].verify());
}

#[tokio::test]
async fn test_attachment_round_trip() {
    let h = harness(Arc::new(RoleAuthorizer)).await;
    h.service
        .complete(request(&h, "dep1", "1.1", text("policy_owner", "Ada")))
        .await
        .unwrap();

    let bytes = b"exact bytes \x00\x01\x02".to_vec();
    let outcome = h
        .service
        .complete(request(
            &h,
            "dep1",
            "1.2",
            Submission::default().with_file("policy_document", file(&bytes)),
        ))
        .await
        .unwrap();

    let refs = attachment_refs(outcome.process.step("1.2").unwrap().data.as_ref().unwrap());
    assert_eq!(refs.len(), 1);
    let (meta, stored) = h
        .store
        .get_attachment(&refs[0].attachment_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, bytes);
    assert_eq!(meta.sha256, sha256_hex(&bytes));
    assert_eq!(refs[0].sha256, meta.sha256);
    assert_eq!(meta.size, bytes.len() as u64);
}

// ─── Live updates ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_completion_notifies_process_and_next_role() {
    let h = harness(Arc::new(RoleAuthorizer)).await;
    let mut process_sub = h.broadcaster.subscribe(ChannelKey::process(&h.process_id));
    let mut dep1_sub = h.broadcaster.subscribe(ChannelKey::role("demo", "dep1"));
    let mut dep2_sub = h.broadcaster.subscribe(ChannelKey::role("demo", "dep2"));

    h.service
        .complete(request(&h, "dep1", "1.1", text("policy_owner", "Ada")))
        .await
        .unwrap();
    h.service
        .complete(request(
            &h,
            "dep1",
            "1.2",
            Submission::default().with_file("policy_document", file(b"p")),
        ))
        .await
        .unwrap();

    let first = process_sub.next().await.unwrap();
    assert_eq!(first.name(), "process-updated");
    assert_eq!(first.process_id(), h.process_id);
    assert!(matches!(dep1_sub.next().await, Some(LiveEvent::RoleUpdated { .. })));

    // 2.1 became available to dep2 after the second completion
    let event = dep2_sub.next().await.unwrap();
    assert_eq!(event.name(), "role-updated");
    assert_eq!(event.process_id(), h.process_id);
}
