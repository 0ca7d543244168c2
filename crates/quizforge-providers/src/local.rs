//! In-process question service.
//!
//! Behaves like the remote service (same status rules, same listing
//! partitions, export only for approved questions) without any network or
//! model calls. Question content is deterministic per engine and votes are
//! scripted per candidate engine, which makes it the stand-in for the remote
//! service in tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use quizforge_core::aggregator::select_winner;
use quizforge_core::error::ServiceError;
use quizforge_core::model::{
    EvaluatorVotes, GenerateRequest, ListStatus, Question, QuestionContent, QuestionStatus,
    VoteMap,
};
use quizforge_core::traits::{ExportReceipt, ExportSink, GenerateOutcome, QuestionService};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A question service that keeps everything in memory.
pub struct LocalQuestionService {
    questions: Mutex<HashMap<String, Question>>,
    /// Votes attached to every question generated by the keyed engine.
    engine_votes: BTreeMap<String, EvaluatorVotes>,
    export_sink: Option<Arc<dyn ExportSink>>,
    latency: Duration,
    export_blocked: AtomicBool,
    next_failure: Mutex<Option<ServiceError>>,
    call_count: AtomicU32,
    exported: Mutex<Vec<String>>,
}

impl Default for LocalQuestionService {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalQuestionService {
    pub fn new() -> Self {
        Self {
            questions: Mutex::new(HashMap::new()),
            engine_votes: BTreeMap::new(),
            export_sink: None,
            latency: Duration::ZERO,
            export_blocked: AtomicBool::new(false),
            next_failure: Mutex::new(None),
            call_count: AtomicU32::new(0),
            exported: Mutex::new(Vec::new()),
        }
    }

    /// Attach `votes` to every question `engine` generates.
    pub fn with_engine_votes(mut self, engine: &str, votes: EvaluatorVotes) -> Self {
        self.engine_votes.insert(engine.to_string(), votes);
        self
    }

    /// Write exported questions to `sink`.
    pub fn with_export_sink(mut self, sink: Arc<dyn ExportSink>) -> Self {
        self.export_sink = Some(sink);
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Seed an existing question.
    pub fn insert(&self, question: Question) {
        lock(&self.questions).insert(question.id.clone(), question);
    }

    pub fn question(&self, id: &str) -> Option<Question> {
        lock(&self.questions).get(id).cloned()
    }

    /// Report approved questions as not yet export-eligible.
    pub fn block_exports(&self, blocked: bool) {
        self.export_blocked.store(blocked, Ordering::SeqCst);
    }

    /// Fail the next call with `error`.
    pub fn fail_next(&self, error: ServiceError) {
        *lock(&self.next_failure) = Some(error);
    }

    /// Number of calls made to this service.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Ids exported so far, in order.
    pub fn exported(&self) -> Vec<String> {
        lock(&self.exported).clone()
    }

    async fn enter(&self) -> Result<(), ServiceError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match lock(&self.next_failure).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn update<F>(&self, id: &str, f: F) -> Result<Question, ServiceError>
    where
        F: FnOnce(&mut Question) -> Result<(), ServiceError>,
    {
        let mut questions = lock(&self.questions);
        let question = questions
            .get_mut(id)
            .ok_or_else(|| ServiceError::Rejected("Question not found".into()))?;
        f(question)?;
        question.updated_at = Utc::now();
        Ok(question.clone())
    }
}

/// Deterministic content for the `index`-th question from `engine`.
fn generated_content(engine: &str, request: &GenerateRequest, index: u32) -> QuestionContent {
    let multiple_choice = request.question_type.to_lowercase().contains("choice");
    let options = multiple_choice.then(|| {
        ["A", "B", "C", "D"]
            .iter()
            .map(|letter| format!("{letter}. {} option {letter}", request.exam_name))
            .collect()
    });
    let answer = if multiple_choice {
        "A".to_string()
    } else {
        format!("Reference answer {} from {engine}", index + 1)
    };

    QuestionContent {
        question: format!(
            "[{engine}] {} question {} ({}, difficulty {})",
            request.exam_name,
            index + 1,
            request.question_type,
            request.difficulty
        ),
        options,
        answer,
        explanation: format!(
            "Generated by {engine} for {} in {}.",
            request.exam_name, request.language
        ),
    }
}

#[async_trait]
impl QuestionService for LocalQuestionService {
    fn name(&self) -> &str {
        "local"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateOutcome, ServiceError> {
        self.enter().await?;

        let mut generated = Vec::new();
        let mut votes = VoteMap::new();
        for engine in &request.engines {
            for index in 0..request.num_questions {
                let content = generated_content(engine, request, index);
                let question = Question::draft(engine.as_str(), request, content);
                if let Some(scripted) = self.engine_votes.get(engine) {
                    votes.insert(question.id.clone(), scripted.clone());
                }
                generated.push(question);
            }
        }

        if generated.is_empty() {
            return Err(ServiceError::Unavailable(
                "No AI engines are configured".into(),
            ));
        }

        {
            let mut questions = lock(&self.questions);
            for question in &generated {
                questions.insert(question.id.clone(), question.clone());
            }
        }
        tracing::debug!("generated {} question(s) locally", generated.len());

        let winner_id = select_winner(&votes);
        Ok(GenerateOutcome {
            questions: generated,
            evaluations: (!votes.is_empty()).then_some(votes),
            winner_id,
        })
    }

    async fn revise(&self, question_id: &str, comment: &str) -> Result<Question, ServiceError> {
        self.enter().await?;
        let note = if comment.trim().is_empty() {
            "General clarity pass.".to_string()
        } else {
            format!("Addressed reviewer comment: {}", comment.trim())
        };
        self.update(question_id, |q| {
            q.version += 1;
            q.explanation = format!("{} (revision {})", q.explanation, q.version);
            q.improvement_explanation = Some(note);
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
                return Err(ServiceError::Rejected(format!(
                    "question is {}, not approved",
                    q.status
                )));
            }
            q.status = QuestionStatus::InProgress;
            Ok(())
        })
    }

    async fn delete(&self, question_id: &str) -> Result<(), ServiceError> {
        self.enter().await?;
        self.update(question_id, |q| {
            if q.status == QuestionStatus::Deleted {
                return Err(ServiceError::Rejected("question is already deleted".into()));
            }
            q.status = QuestionStatus::Deleted;
            q.deleted_at = Some(Utc::now());
            Ok(())
        })
        .map(|_| ())
    }

    async fn restore(&self, question_id: &str) -> Result<Question, ServiceError> {
        self.enter().await?;
        self.update(question_id, |q| {
            if q.status != QuestionStatus::Deleted {
                return Err(ServiceError::Rejected(format!(
                    "question is {}, not deleted",
                    q.status
                )));
            }
            q.status = QuestionStatus::InProgress;
            q.deleted_at = None;
            Ok(())
        })
    }

    async fn can_export(&self, question_id: &str) -> Result<bool, ServiceError> {
        self.enter().await?;
        let approved = self
            .question(question_id)
            .is_some_and(|q| q.status == QuestionStatus::Approved);
        Ok(approved && !self.export_blocked.load(Ordering::SeqCst))
    }

    async fn export(&self, question_id: &str) -> Result<ExportReceipt, ServiceError> {
        self.enter().await?;
        let question = self
            .question(question_id)
            .ok_or_else(|| ServiceError::Rejected("Question not found".into()))?;
        if question.status != QuestionStatus::Approved {
            return Err(ServiceError::Rejected(
                "Question must be approved before export".into(),
            ));
        }

        let receipt = match &self.export_sink {
            Some(sink) => sink
                .append(&question)
                .map_err(|e| ServiceError::Unavailable(format!("export failed: {e:#}")))?,
            None => ExportReceipt::default(),
        };
        lock(&self.exported).push(question.id.clone());
        Ok(receipt)
    }

    async fn list(&self, status: ListStatus) -> Result<Vec<Question>, ServiceError> {
        self.enter().await?;
        let mut listed: Vec<Question> = lock(&self.questions)
            .values()
            .filter(|q| status.contains(q.status))
            .cloned()
            .collect();
        listed.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(listed)
    }
}
