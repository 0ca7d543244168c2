//! Question lifecycle controller.
//!
//! Guards the status state machine and serializes mutating operations per
//! question. The actual mutation is always delegated to the remote
//! `QuestionService`; the controller only tracks the latest snapshot the
//! service returned and broadcasts a `LifecycleEvent` for every transition.
//! It never touches the status partitions themselves.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::{LifecycleError, ServiceError};
use crate::model::{short_id, ContentField, ListStatus, Question, QuestionStatus};
use crate::traits::{ExportReceipt, QuestionService};

const EVENT_CAPACITY: usize = 256;

/// A lifecycle operation that can be requested for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Approve,
    Unapprove,
    Delete,
    Restore,
    Purge,
    Revise,
}

impl Operation {
    /// Whether the operation may start from `status`.
    ///
    /// Approve also starts from `approved`: the remote approve is
    /// idempotent, and an approve whose export step failed is finished by
    /// approving again.
    pub fn allowed_from(self, status: QuestionStatus) -> bool {
        match self {
            Operation::Approve => status.is_active() || status == QuestionStatus::Approved,
            Operation::Delete | Operation::Revise => status.is_active(),
            Operation::Unapprove => status == QuestionStatus::Approved,
            Operation::Restore | Operation::Purge => status == QuestionStatus::Deleted,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Approve => "approve",
            Operation::Unapprove => "unapprove",
            Operation::Delete => "delete",
            Operation::Restore => "restore",
            Operation::Purge => "purge",
            Operation::Revise => "revise",
        };
        f.write_str(name)
    }
}

/// What happened to a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Approved,
    Unapproved,
    Deleted,
    Restored,
    Revised,
    /// Removed locally for good. The question is the last known snapshot.
    Purged,
    /// Authoritative state re-fetched after a failed approve sequence.
    Refreshed,
}

/// A lifecycle transition, broadcast to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub kind: EventKind,
    pub question: Question,
    pub previous_status: QuestionStatus,
}

/// Successful approve sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Approval {
    pub question: Question,
    pub export: ExportReceipt,
}

/// Successful revision.
#[derive(Debug, Clone, PartialEq)]
pub struct Revision {
    pub question: Question,
    pub previous: Question,
    /// Content fields that differ between `previous` and `question`.
    pub changed_fields: Vec<ContentField>,
}

impl Revision {
    pub fn content_changed(&self) -> bool {
        !self.changed_fields.is_empty()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks a question as having an operation in flight until dropped.
struct InFlight<'a> {
    ids: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.ids).remove(&self.id);
    }
}

pub struct LifecycleController {
    service: Arc<dyn QuestionService>,
    tracked: Mutex<HashMap<String, Question>>,
    in_flight: Mutex<HashSet<String>>,
    events: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleController {
    pub fn new(service: Arc<dyn QuestionService>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            service,
            tracked: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            events,
        }
    }

    pub fn service(&self) -> &Arc<dyn QuestionService> {
        &self.service
    }

    /// Receive every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Start tracking (or replace) snapshots returned by the service.
    pub fn track<I>(&self, questions: I)
    where
        I: IntoIterator<Item = Question>,
    {
        let mut tracked = lock(&self.tracked);
        for question in questions {
            tracked.insert(question.id.clone(), question);
        }
    }

    pub fn forget(&self, id: &str) -> Option<Question> {
        lock(&self.tracked).remove(id)
    }

    /// The latest snapshot the controller holds for `id`.
    pub fn tracked(&self, id: &str) -> Option<Question> {
        lock(&self.tracked).get(id).cloned()
    }

    pub fn tracked_count(&self) -> usize {
        lock(&self.tracked).len()
    }

    /// Whether a mutating operation on `id` is pending.
    pub fn is_in_flight(&self, id: &str) -> bool {
        lock(&self.in_flight).contains(id)
    }

    /// Claim the single-flight slot for `id` and check the transition.
    fn begin(
        &self,
        id: &str,
        operation: Operation,
    ) -> Result<(InFlight<'_>, Question), LifecycleError> {
        if !lock(&self.in_flight).insert(id.to_string()) {
            tracing::debug!("{operation} on {} rejected: already in flight", short_id(id));
            return Err(LifecycleError::OperationInProgress(id.to_string()));
        }
        let guard = InFlight {
            ids: &self.in_flight,
            id: id.to_string(),
        };

        let current = self
            .tracked(id)
            .ok_or_else(|| LifecycleError::UnknownQuestion(id.to_string()))?;
        if !operation.allowed_from(current.status) {
            return Err(LifecycleError::InvalidTransition {
                operation,
                status: current.status,
            });
        }

        Ok((guard, current))
    }

    fn commit(&self, kind: EventKind, question: Question, previous_status: QuestionStatus) {
        lock(&self.tracked).insert(question.id.clone(), question.clone());
        self.emit(kind, question, previous_status);
    }

    fn emit(&self, kind: EventKind, question: Question, previous_status: QuestionStatus) {
        // No subscribers is fine.
        let _ = self.events.send(LifecycleEvent {
            kind,
            question,
            previous_status,
        });
    }

    fn remote_failure(&self, id: &str, operation: Operation, err: ServiceError) -> LifecycleError {
        tracing::warn!("{operation} of question {} failed: {err}", short_id(id));
        err.into()
    }

    /// Approve, confirm export eligibility, then export.
    ///
    /// Every step must succeed. When a later step fails after the remote
    /// approval committed, the authoritative snapshot is re-fetched and
    /// tracked instead of the optimistic one.
    pub async fn approve(&self, id: &str) -> Result<Approval, LifecycleError> {
        let (_guard, current) = self.begin(id, Operation::Approve)?;
        tracing::info!("approving question {}", short_id(id));

        let approved = self
            .service
            .approve(id)
            .await
            .map_err(|e| self.remote_failure(id, Operation::Approve, e))?;

        let eligible = match self.service.can_export(id).await {
            Ok(eligible) => eligible,
            Err(e) => {
                let err = self.remote_failure(id, Operation::Approve, e);
                self.refresh(&current, approved.version).await;
                return Err(err);
            }
        };
        if !eligible {
            tracing::warn!(
                "question {} approved but not export-eligible",
                short_id(id)
            );
            let status = self.refresh(&current, approved.version).await;
            return Err(LifecycleError::ExportNotEligible {
                id: id.to_string(),
                status,
            });
        }

        let export = match self.service.export(id).await {
            Ok(receipt) => receipt,
            Err(e) => {
                let err = self.remote_failure(id, Operation::Approve, e);
                self.refresh(&current, approved.version).await;
                return Err(err);
            }
        };

        tracing::info!("question {} approved and exported", short_id(id));
        self.commit(EventKind::Approved, approved.clone(), current.status);
        Ok(Approval {
            question: approved,
            export,
        })
    }

    /// Re-fetch the authoritative snapshot of `previous.id` from every
    /// listing, track it, and report its status.
    ///
    /// The latest remote state always wins. A version that moved away from
    /// `expected_version` means someone else modified the question meanwhile.
    async fn refresh(
        &self,
        previous: &Question,
        expected_version: u32,
    ) -> Option<QuestionStatus> {
        let listings = join_all(ListStatus::ALL.map(|status| self.service.list(status))).await;

        let mut fetch_failed = false;
        let mut found = None;
        for listing in listings {
            match listing {
                Ok(questions) => {
                    if let Some(q) = questions.into_iter().find(|q| q.id == previous.id) {
                        found = Some(q);
                    }
                }
                Err(e) => {
                    tracing::warn!("could not re-fetch question {}: {e}", previous.short_id());
                    fetch_failed = true;
                }
            }
        }

        match found {
            Some(latest) => {
                if latest.version != expected_version {
                    tracing::warn!(
                        "question {} changed concurrently (expected v{expected_version}, found v{}); keeping latest",
                        previous.short_id(),
                        latest.version
                    );
                }
                let status = latest.status;
                self.commit(EventKind::Refreshed, latest, previous.status);
                Some(status)
            }
            None => {
                if !fetch_failed {
                    tracing::warn!(
                        "question {} no longer listed by the service",
                        previous.short_id()
                    );
                }
                None
            }
        }
    }

    /// Return an approved question to review.
    pub async fn unapprove(&self, id: &str) -> Result<Question, LifecycleError> {
        let (_guard, current) = self.begin(id, Operation::Unapprove)?;

        let question = self
            .service
            .unapprove(id)
            .await
            .map_err(|e| self.remote_failure(id, Operation::Unapprove, e))?;

        tracing::info!("question {} unapproved", short_id(id));
        self.commit(EventKind::Unapproved, question.clone(), current.status);
        Ok(question)
    }

    /// Soft-delete an active question.
    pub async fn delete(&self, id: &str) -> Result<Question, LifecycleError> {
        let (_guard, current) = self.begin(id, Operation::Delete)?;

        self.service
            .delete(id)
            .await
            .map_err(|e| self.remote_failure(id, Operation::Delete, e))?;

        let now = Utc::now();
        let deleted = Question {
            status: QuestionStatus::Deleted,
            deleted_at: Some(now),
            updated_at: now,
            ..current.clone()
        };

        tracing::info!("question {} deleted", short_id(id));
        self.commit(EventKind::Deleted, deleted.clone(), current.status);
        Ok(deleted)
    }

    /// Bring a deleted question back into review.
    pub async fn restore(&self, id: &str) -> Result<Question, LifecycleError> {
        let (_guard, current) = self.begin(id, Operation::Restore)?;

        let mut question = self
            .service
            .restore(id)
            .await
            .map_err(|e| self.remote_failure(id, Operation::Restore, e))?;
        question.deleted_at = None;

        tracing::info!("question {} restored", short_id(id));
        self.commit(EventKind::Restored, question.clone(), current.status);
        Ok(question)
    }

    /// Drop a deleted question locally. There is no remote counterpart and
    /// no way back; confirm with the user before calling.
    pub async fn purge(&self, id: &str) -> Result<Question, LifecycleError> {
        let (_guard, current) = self.begin(id, Operation::Purge)?;

        self.forget(id);
        tracing::info!("question {} purged", short_id(id));
        self.emit(EventKind::Purged, current.clone(), current.status);
        Ok(current)
    }

    /// Ask the service to revise a question from a reviewer comment.
    pub async fn revise(&self, id: &str, comment: &str) -> Result<Revision, LifecycleError> {
        let (_guard, current) = self.begin(id, Operation::Revise)?;
        tracing::info!(
            "revising question {} (comment: {} chars)",
            short_id(id),
            comment.chars().count()
        );

        let revised = self
            .service
            .revise(id, comment)
            .await
            .map_err(|e| self.remote_failure(id, Operation::Revise, e))?;

        if revised.version < current.version {
            return Err(self.remote_failure(
                id,
                Operation::Revise,
                ServiceError::Rejected(format!(
                    "stale version v{} returned for v{}",
                    revised.version, current.version
                )),
            ));
        }

        let changed_fields = current.content_diff(&revised);
        if !changed_fields.is_empty() && revised.version == current.version {
            tracing::warn!(
                "question {} content changed without a version bump",
                short_id(id)
            );
        }

        tracing::info!(
            "question {} now at v{} ({} field(s) changed)",
            short_id(id),
            revised.version,
            changed_fields.len()
        );
        self.commit(EventKind::Revised, revised.clone(), current.status);
        Ok(Revision {
            question: revised,
            previous: current,
            changed_fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_question, FakeService};

    fn controller_with(questions: &[Question]) -> (Arc<FakeService>, LifecycleController) {
        let service = Arc::new(FakeService::with_questions(questions.to_vec()));
        let controller = LifecycleController::new(service.clone());
        controller.track(questions.to_vec());
        (service, controller)
    }

    #[tokio::test]
    async fn approve_deleted_is_invalid() {
        let q = sample_question("q1", QuestionStatus::Deleted);
        let (service, controller) = controller_with(&[q]);

        let err = controller.approve("q1").await.unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidTransition {
                operation: Operation::Approve,
                status: QuestionStatus::Deleted,
            }
        );
        assert_eq!(service.calls(), 0);
        assert!(!controller.is_in_flight("q1"));
    }

    #[tokio::test]
    async fn restore_in_progress_is_invalid() {
        let q = sample_question("q1", QuestionStatus::InProgress);
        let (_, controller) = controller_with(&[q]);

        let err = controller.restore("q1").await.unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn unknown_question_is_reported() {
        let (_, controller) = controller_with(&[]);
        let err = controller.delete("nope").await.unwrap_err();
        assert_eq!(err, LifecycleError::UnknownQuestion("nope".into()));
    }

    #[tokio::test]
    async fn approve_emits_event_and_tracks_remote_snapshot() {
        let q = sample_question("q1", QuestionStatus::Draft);
        let (_, controller) = controller_with(&[q]);
        let mut events = controller.subscribe();

        let approval = controller.approve("q1").await.unwrap();
        assert_eq!(approval.question.status, QuestionStatus::Approved);
        assert_eq!(
            controller.tracked("q1").unwrap().status,
            QuestionStatus::Approved
        );

        let event = events.try_recv().unwrap();
        assert_eq!(event.kind, EventKind::Approved);
        assert_eq!(event.previous_status, QuestionStatus::Draft);
    }

    #[tokio::test]
    async fn concurrent_approve_is_rejected() {
        let q = sample_question("q1", QuestionStatus::InProgress);
        let (service, controller) = controller_with(&[q]);
        service.set_latency(std::time::Duration::from_millis(20));

        let (first, second) = tokio::join!(controller.approve("q1"), controller.approve("q1"));
        assert!(first.is_ok());
        assert_eq!(
            second.unwrap_err(),
            LifecycleError::OperationInProgress("q1".into())
        );
        assert!(!controller.is_in_flight("q1"));
    }

    #[tokio::test]
    async fn different_questions_run_concurrently() {
        let a = sample_question("qa", QuestionStatus::InProgress);
        let b = sample_question("qb", QuestionStatus::InProgress);
        let (service, controller) = controller_with(&[a, b]);
        service.set_latency(std::time::Duration::from_millis(20));

        let (first, second) = tokio::join!(controller.delete("qa"), controller.approve("qb"));
        assert!(first.is_ok());
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn not_eligible_tracks_refetched_status() {
        let q = sample_question("q1", QuestionStatus::InProgress);
        let (service, controller) = controller_with(&[q]);
        service.set_export_eligible(false);
        let mut events = controller.subscribe();

        let err = controller.approve("q1").await.unwrap_err();
        assert_eq!(
            err,
            LifecycleError::ExportNotEligible {
                id: "q1".into(),
                status: Some(QuestionStatus::Approved),
            }
        );
        assert_eq!(
            controller.tracked("q1").unwrap().status,
            QuestionStatus::Approved
        );
        assert_eq!(events.try_recv().unwrap().kind, EventKind::Refreshed);
        assert!(!controller.is_in_flight("q1"));
        assert_eq!(service.exports(), 0);
    }

    #[tokio::test]
    async fn remote_failure_releases_guard() {
        let q = sample_question("q1", QuestionStatus::InProgress);
        let (service, controller) = controller_with(&[q]);
        service.fail_next(ServiceError::Unavailable("connection reset".into()));

        let err = controller.approve("q1").await.unwrap_err();
        assert_eq!(err, LifecycleError::RemoteUnavailable("connection reset".into()));
        assert!(err.is_retryable());
        assert_eq!(
            controller.tracked("q1").unwrap().status,
            QuestionStatus::InProgress
        );

        assert!(controller.approve("q1").await.is_ok());
    }

    #[tokio::test]
    async fn delete_restore_purge() {
        let q = sample_question("q1", QuestionStatus::Draft);
        let (_, controller) = controller_with(&[q]);

        let deleted = controller.delete("q1").await.unwrap();
        assert_eq!(deleted.status, QuestionStatus::Deleted);
        assert!(deleted.deleted_at.is_some());

        let restored = controller.restore("q1").await.unwrap();
        assert_eq!(restored.status, QuestionStatus::InProgress);
        assert!(restored.deleted_at.is_none());

        assert!(matches!(
            controller.purge("q1").await,
            Err(LifecycleError::InvalidTransition { .. })
        ));

        controller.delete("q1").await.unwrap();
        let mut events = controller.subscribe();
        let purged = controller.purge("q1").await.unwrap();
        assert_eq!(purged.id, "q1");
        assert!(controller.tracked("q1").is_none());
        assert_eq!(events.try_recv().unwrap().kind, EventKind::Purged);
    }

    #[tokio::test]
    async fn unapprove_requires_approved() {
        let q = sample_question("q1", QuestionStatus::InProgress);
        let (_, controller) = controller_with(&[q]);

        assert!(controller.unapprove("q1").await.is_err());
        controller.approve("q1").await.unwrap();
        let back = controller.unapprove("q1").await.unwrap();
        assert_eq!(back.status, QuestionStatus::InProgress);
    }

    #[tokio::test]
    async fn revise_bumps_version_and_reports_diff() {
        let mut q = sample_question("q1", QuestionStatus::InProgress);
        q.version = 2;
        let (_, controller) = controller_with(&[q]);

        let revision = controller.revise("q1", "fix typo").await.unwrap();
        assert_eq!(revision.question.version, 3);
        assert_eq!(revision.previous.version, 2);
        assert!(revision.content_changed());
        assert!(revision.question.improvement_explanation.is_some());
        assert_eq!(controller.tracked("q1").unwrap().version, 3);
    }

    #[tokio::test]
    async fn revise_without_change_keeps_version() {
        let mut q = sample_question("q1", QuestionStatus::InProgress);
        q.version = 2;
        let (service, controller) = controller_with(&[q]);
        service.set_revisions_change_content(false);

        let revision = controller.revise("q1", "").await.unwrap();
        assert_eq!(revision.question.version, 2);
        assert!(!revision.content_changed());
    }

    #[tokio::test]
    async fn revise_rejects_version_regression() {
        let mut q = sample_question("q1", QuestionStatus::InProgress);
        q.version = 5;
        let (service, controller) = controller_with(&[q]);
        service.set_remote_version("q1", 1);

        let err = controller.revise("q1", "shorter").await.unwrap_err();
        assert!(matches!(err, LifecycleError::RemoteRejected(_)));
        assert_eq!(controller.tracked("q1").unwrap().version, 5);
    }

    #[test]
    fn transition_table() {
        use QuestionStatus::*;

        assert!(Operation::Approve.allowed_from(Draft));
        assert!(Operation::Approve.allowed_from(InProgress));
        assert!(Operation::Approve.allowed_from(Approved));
        assert!(!Operation::Approve.allowed_from(Deleted));
        assert!(Operation::Unapprove.allowed_from(Approved));
        assert!(!Operation::Unapprove.allowed_from(InProgress));
        assert!(Operation::Restore.allowed_from(Deleted));
        assert!(!Operation::Restore.allowed_from(InProgress));
        assert!(Operation::Purge.allowed_from(Deleted));
        assert!(!Operation::Purge.allowed_from(Draft));
        assert!(Operation::Revise.allowed_from(Draft));
        assert!(!Operation::Revise.allowed_from(Approved));
        assert!(Operation::Delete.allowed_from(InProgress));
        assert!(!Operation::Delete.allowed_from(Approved));
        assert!(!Operation::Delete.allowed_from(Deleted));
    }

    #[tokio::test]
    async fn approve_retries_once_export_becomes_eligible() {
        let q = sample_question("q1", QuestionStatus::InProgress);
        let (service, controller) = controller_with(&[q]);
        service.set_export_eligible(false);

        let err = controller.approve("q1").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(service.exports(), 0);

        service.set_export_eligible(true);
        let mut events = controller.subscribe();
        let approval = controller.approve("q1").await.unwrap();
        assert_eq!(approval.question.status, QuestionStatus::Approved);
        assert_eq!(approval.export.file_path.as_deref(), Some("export.csv"));
        assert_eq!(service.exports(), 1);

        let event = events.try_recv().unwrap();
        assert_eq!(event.kind, EventKind::Approved);
        assert_eq!(event.previous_status, QuestionStatus::Approved);
    }

    #[tokio::test]
    async fn failed_refetch_keeps_previous_snapshot() {
        let q = sample_question("q1", QuestionStatus::InProgress);
        let (service, controller) = controller_with(&[q]);
        service.set_export_eligible(false);
        service.set_listings_fail(true);
        let mut events = controller.subscribe();

        let err = controller.approve("q1").await.unwrap_err();
        assert_eq!(
            err,
            LifecycleError::ExportNotEligible {
                id: "q1".into(),
                status: None,
            }
        );
        let tracked = controller.tracked("q1").unwrap();
        assert_eq!(tracked.status, QuestionStatus::InProgress);
        assert_eq!(tracked.version, 1);
        assert!(events.try_recv().is_err());
        assert!(!controller.is_in_flight("q1"));
    }

    #[tokio::test]
    async fn concurrent_edit_during_approve_keeps_latest() {
        let q = sample_question("q1", QuestionStatus::InProgress);
        let (service, controller) = controller_with(&[q]);
        service.set_export_eligible(false);
        service.set_edit_on_export_check(true);

        let err = controller.approve("q1").await.unwrap_err();
        assert_eq!(
            err,
            LifecycleError::ExportNotEligible {
                id: "q1".into(),
                status: Some(QuestionStatus::Approved),
            }
        );
        let tracked = controller.tracked("q1").unwrap();
        assert_eq!(tracked.version, 2);
        assert_eq!(tracked.status, QuestionStatus::Approved);
    }

    #[tokio::test]
    async fn export_failure_refreshes_and_reports_remote_error() {
        let q = sample_question("q1", QuestionStatus::InProgress);
        let (service, controller) = controller_with(&[q]);
        service.fail_next_export(ServiceError::Unavailable("disk full".into()));
        let mut events = controller.subscribe();

        let err = controller.approve("q1").await.unwrap_err();
        assert_eq!(err, LifecycleError::RemoteUnavailable("disk full".into()));

        let event = events.try_recv().unwrap();
        assert_eq!(event.kind, EventKind::Refreshed);
        assert_eq!(event.question.status, QuestionStatus::Approved);
        assert_eq!(event.previous_status, QuestionStatus::InProgress);
        assert_eq!(service.exports(), 0);
    }
}
