//! In-crate fake question service for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::error::ServiceError;
use crate::model::{
    GenerateRequest, ListStatus, Question, QuestionStatus, Vote, VoteMap,
};
use crate::traits::{ExportReceipt, GenerateOutcome, QuestionService};

pub fn sample_question(id: &str, status: QuestionStatus) -> Question {
    let created = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    Question {
        id: id.to_string(),
        engine: "gpt".into(),
        exam_name: "Chemistry".into(),
        language: "English".into(),
        question_type: "multiple-choice".into(),
        difficulty: 3,
        notes: String::new(),
        question: format!("Question {id}?"),
        options: Some(vec!["A".into(), "B".into()]),
        answer: "A".into(),
        explanation: "Because A.".into(),
        improvement_explanation: None,
        version: 1,
        status,
        created_at: created,
        updated_at: created,
        deleted_at: (status == QuestionStatus::Deleted).then_some(created),
    }
}

/// Remote stand-in with the same status semantics as the real service.
pub struct FakeService {
    questions: Mutex<HashMap<String, Question>>,
    generated: Mutex<Vec<Question>>,
    generated_votes: Mutex<VoteMap>,
    calls: AtomicU32,
    exports: AtomicU32,
    latency_ms: AtomicU32,
    export_eligible: AtomicBool,
    revisions_change_content: AtomicBool,
    listings_fail: AtomicBool,
    edit_on_export_check: AtomicBool,
    next_failure: Mutex<Option<ServiceError>>,
    next_export_failure: Mutex<Option<ServiceError>>,
}

impl FakeService {
    pub fn with_questions(questions: Vec<Question>) -> Self {
        Self {
            questions: Mutex::new(questions.into_iter().map(|q| (q.id.clone(), q)).collect()),
            generated: Mutex::new(Vec::new()),
            generated_votes: Mutex::new(VoteMap::new()),
            calls: AtomicU32::new(0),
            exports: AtomicU32::new(0),
            latency_ms: AtomicU32::new(0),
            export_eligible: AtomicBool::new(true),
            revisions_change_content: AtomicBool::new(true),
            listings_fail: AtomicBool::new(false),
            edit_on_export_check: AtomicBool::new(false),
            next_failure: Mutex::new(None),
            next_export_failure: Mutex::new(None),
        }
    }

    /// Questions and votes the next `generate` call returns.
    pub fn set_generation(&self, questions: Vec<Question>, votes: VoteMap) {
        *self.generated.lock().unwrap() = questions;
        *self.generated_votes.lock().unwrap() = votes;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn exports(&self) -> u32 {
        self.exports.load(Ordering::SeqCst)
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u32, Ordering::SeqCst);
    }

    pub fn set_export_eligible(&self, eligible: bool) {
        self.export_eligible.store(eligible, Ordering::SeqCst);
    }

    pub fn set_revisions_change_content(&self, change: bool) {
        self.revisions_change_content.store(change, Ordering::SeqCst);
    }

    pub fn set_remote_version(&self, id: &str, version: u32) {
        if let Some(q) = self.questions.lock().unwrap().get_mut(id) {
            q.version = version;
        }
    }

    pub fn fail_next(&self, error: ServiceError) {
        *self.next_failure.lock().unwrap() = Some(error);
    }

    /// Fail the next `export` call only.
    pub fn fail_next_export(&self, error: ServiceError) {
        *self.next_export_failure.lock().unwrap() = Some(error);
    }

    /// Make every `list` call fail until switched back.
    pub fn set_listings_fail(&self, fail: bool) {
        self.listings_fail.store(fail, Ordering::SeqCst);
    }

    /// Simulate another client revising the question while its export
    /// eligibility is being checked.
    pub fn set_edit_on_export_check(&self, edit: bool) {
        self.edit_on_export_check.store(edit, Ordering::SeqCst);
    }

    async fn enter(&self) -> Result<(), ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency as u64)).await;
        }
        match self.next_failure.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn update<F>(&self, id: &str, f: F) -> Result<Question, ServiceError>
    where
        F: FnOnce(&mut Question) -> Result<(), ServiceError>,
    {
        let mut questions = self.questions.lock().unwrap();
        let q = questions
            .get_mut(id)
            .ok_or_else(|| ServiceError::Rejected(format!("question not found: {id}")))?;
        f(q)?;
        q.updated_at = Utc::now();
        Ok(q.clone())
    }
}

#[async_trait]
impl QuestionService for FakeService {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, _request: &GenerateRequest) -> Result<GenerateOutcome, ServiceError> {
        self.enter().await?;
        let questions = self.generated.lock().unwrap().clone();
        let votes = self.generated_votes.lock().unwrap().clone();
        let mut store = self.questions.lock().unwrap();
        for q in &questions {
            store.insert(q.id.clone(), q.clone());
        }
        Ok(GenerateOutcome {
            questions,
            evaluations: (!votes.is_empty()).then_some(votes),
            winner_id: None,
        })
    }

    async fn revise(&self, question_id: &str, comment: &str) -> Result<Question, ServiceError> {
        self.enter().await?;
        let change = self.revisions_change_content.load(Ordering::SeqCst);
        let comment = comment.to_string();
        self.update(question_id, |q| {
            if change {
                q.question = format!("{} (revised)", q.question);
                q.improvement_explanation = Some(format!("Applied: {comment}"));
                q.version += 1;
            }
            q.status = QuestionStatus::InProgress;
            Ok(())
        })
    }

    async fn approve(&self, question_id: &str) -> Result<Question, ServiceError> {
        self.enter().await?;
        self.update(question_id, |q| {
            q.status = QuestionStatus::Approved;
            Ok(())
        })
    }

    async fn unapprove(&self, question_id: &str) -> Result<Question, ServiceError> {
        self.enter().await?;
        self.update(question_id, |q| {
            if q.status != QuestionStatus::Approved {
                return Err(ServiceError::Rejected("not approved".into()));
            }
            q.status = QuestionStatus::InProgress;
            Ok(())
        })
    }

    async fn delete(&self, question_id: &str) -> Result<(), ServiceError> {
        self.enter().await?;
        self.update(question_id, |q| {
            q.status = QuestionStatus::Deleted;
            q.deleted_at = Some(Utc::now());
            Ok(())
        })
        .map(|_| ())
    }

    async fn restore(&self, question_id: &str) -> Result<Question, ServiceError> {
        self.enter().await?;
        self.update(question_id, |q| {
            q.status = QuestionStatus::InProgress;
            q.deleted_at = None;
            Ok(())
        })
    }

    async fn can_export(&self, question_id: &str) -> Result<bool, ServiceError> {
        self.enter().await?;
        let mut questions = self.questions.lock().unwrap();
        let approved = questions
            .get(question_id)
            .is_some_and(|q| q.status == QuestionStatus::Approved);
        if self.edit_on_export_check.load(Ordering::SeqCst) {
            if let Some(q) = questions.get_mut(question_id) {
                q.version += 1;
            }
        }
        Ok(approved && self.export_eligible.load(Ordering::SeqCst))
    }

    async fn export(&self, _question_id: &str) -> Result<ExportReceipt, ServiceError> {
        self.enter().await?;
        if let Some(err) = self.next_export_failure.lock().unwrap().take() {
            return Err(err);
        }
        self.exports.fetch_add(1, Ordering::SeqCst);
        Ok(ExportReceipt {
            file_path: Some("export.csv".into()),
        })
    }

    async fn list(&self, status: ListStatus) -> Result<Vec<Question>, ServiceError> {
        self.enter().await?;
        if self.listings_fail.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable(format!("cannot list {status}")));
        }
        let mut listed: Vec<Question> = self
            .questions
            .lock()
            .unwrap()
            .values()
            .filter(|q| status.contains(q.status))
            .cloned()
            .collect();
        listed.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(listed)
    }
}

pub fn vote(score: f64, points: f64) -> Vote {
    Vote::new(score, "approve").with_points(points)
}
