//! Core data model types for quizforge.
//!
//! These are the entity shapes the whole system passes around: generated
//! questions, evaluator votes, and the selection round that ties a single
//! generation request to its ranked outcome.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::InvalidRequest;

/// Lifecycle status of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    /// Freshly generated, never revised.
    Draft,
    /// Active and under review. Older services report this as `revised`.
    #[serde(alias = "revised")]
    InProgress,
    Approved,
    Deleted,
}

impl QuestionStatus {
    /// `draft` and `in_progress` behave identically for lifecycle purposes.
    pub fn is_active(self) -> bool {
        matches!(self, QuestionStatus::Draft | QuestionStatus::InProgress)
    }

    /// The partition a question with this status is listed under.
    pub fn partition(self) -> ListStatus {
        match self {
            QuestionStatus::Draft | QuestionStatus::InProgress => ListStatus::InProgress,
            QuestionStatus::Approved => ListStatus::Approved,
            QuestionStatus::Deleted => ListStatus::Deleted,
        }
    }
}

impl fmt::Display for QuestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionStatus::Draft => write!(f, "draft"),
            QuestionStatus::InProgress => write!(f, "in_progress"),
            QuestionStatus::Approved => write!(f, "approved"),
            QuestionStatus::Deleted => write!(f, "deleted"),
        }
    }
}

/// The three listing partitions exposed by the question service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListStatus {
    InProgress,
    Approved,
    Deleted,
}

impl ListStatus {
    pub const ALL: [ListStatus; 3] = [
        ListStatus::InProgress,
        ListStatus::Approved,
        ListStatus::Deleted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ListStatus::InProgress => "in_progress",
            ListStatus::Approved => "approved",
            ListStatus::Deleted => "deleted",
        }
    }

    /// Whether a question with `status` belongs in this partition.
    pub fn contains(self, status: QuestionStatus) -> bool {
        status.partition() == self
    }
}

impl fmt::Display for ListStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "in_progress" | "active" | "draft" => Ok(ListStatus::InProgress),
            "approved" => Ok(ListStatus::Approved),
            "deleted" => Ok(ListStatus::Deleted),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// A single generated quiz question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Opaque unique identifier, never changes.
    pub id: String,
    /// Tag of the engine that generated this question (e.g. "gpt").
    pub engine: String,
    #[serde(default)]
    pub exam_name: String,
    /// Free-text language hint, also drives right-to-left presentation.
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub question_type: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,
    #[serde(default)]
    pub notes: String,
    pub question: String,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub explanation: String,
    /// What the last revision changed and why. Only set after a revision.
    #[serde(default)]
    pub improvement_explanation: Option<String>,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_status")]
    pub status: QuestionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

fn default_difficulty() -> u8 {
    5
}

fn default_version() -> u32 {
    1
}

fn default_status() -> QuestionStatus {
    QuestionStatus::Draft
}

/// The revisable content of a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionContent {
    pub question: String,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    pub answer: String,
    pub explanation: String,
}

impl Question {
    /// Create a fresh draft at version 1 for the given engine and request.
    pub fn draft(
        engine: impl Into<String>,
        request: &GenerateRequest,
        content: QuestionContent,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            engine: engine.into(),
            exam_name: request.exam_name.clone(),
            language: request.language.clone(),
            question_type: request.question_type.clone(),
            difficulty: request.difficulty,
            notes: request.notes.clone(),
            question: content.question,
            options: content.options,
            answer: content.answer,
            explanation: content.explanation,
            improvement_explanation: None,
            version: 1,
            status: QuestionStatus::Draft,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Fields whose content differs between `self` and `other`.
    ///
    /// Used for display only: a revision snapshot always replaces the
    /// previous one wholesale.
    pub fn content_diff(&self, other: &Question) -> Vec<ContentField> {
        let mut changed = Vec::new();
        if self.question != other.question {
            changed.push(ContentField::Question);
        }
        if self.options != other.options {
            changed.push(ContentField::Options);
        }
        if self.answer != other.answer {
            changed.push(ContentField::Answer);
        }
        if self.explanation != other.explanation {
            changed.push(ContentField::Explanation);
        }
        changed
    }

    /// Short form of the id for log lines.
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

/// First eight characters of an id, the way ids show up in logs.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// A revisable content field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentField {
    Question,
    Options,
    Answer,
    Explanation,
}

impl fmt::Display for ContentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentField::Question => write!(f, "question"),
            ContentField::Options => write!(f, "options"),
            ContentField::Answer => write!(f, "answer"),
            ContentField::Explanation => write!(f, "explanation"),
        }
    }
}

/// An evaluator's verdict on a candidate.
///
/// Unknown verdict strings are kept verbatim so new evaluator vocabularies
/// never break aggregation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Verdict {
    Approve,
    #[default]
    NeedsRevision,
    Reject,
    Other(String),
}

impl Verdict {
    pub fn as_str(&self) -> &str {
        match self {
            Verdict::Approve => "approve",
            Verdict::NeedsRevision => "needs_revision",
            Verdict::Reject => "reject",
            Verdict::Other(s) => s,
        }
    }

    /// Human-readable label. Unknown verdicts pass through unchanged.
    pub fn label(&self) -> &str {
        match self {
            Verdict::Approve => "Approved",
            Verdict::NeedsRevision => "Needs revision",
            Verdict::Reject => "Rejected",
            Verdict::Other(s) => s,
        }
    }
}

impl From<String> for Verdict {
    fn from(s: String) -> Self {
        match s.as_str() {
            "approve" => Verdict::Approve,
            "needs_revision" => Verdict::NeedsRevision,
            "reject" => Verdict::Reject,
            _ => Verdict::Other(s),
        }
    }
}

impl From<&str> for Verdict {
    fn from(s: &str) -> Self {
        Verdict::from(s.to_string())
    }
}

impl From<Verdict> for String {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One evaluator's structured opinion about one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    /// Provider-defined quality score. Opaque ordered numeric.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub score: f64,
    #[serde(default)]
    pub verdict: Verdict,
    /// Either a 0–1 fraction or an open scale, depending on the evaluator.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub confidence: f64,
    #[serde(default, deserialize_with = "lenient_issues")]
    pub issues: Vec<String>,
    #[serde(default, deserialize_with = "lenient_rank", skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    #[serde(default, deserialize_with = "lenient_opt_f64", skip_serializing_if = "Option::is_none")]
    pub points: Option<f64>,
}

impl Vote {
    pub fn new(score: f64, verdict: impl Into<Verdict>) -> Self {
        Self {
            score,
            verdict: verdict.into(),
            confidence: 0.0,
            issues: Vec::new(),
            rank: None,
            points: None,
        }
    }

    pub fn with_points(mut self, points: f64) -> Self {
        self.points = Some(points);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_issues<I, S>(mut self, issues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.issues = issues.into_iter().map(Into::into).collect();
        self
    }
}

fn number_from_value(value: serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn lenient_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(number_from_value))
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_opt_f64(deserializer)?.unwrap_or(0.0))
}

fn lenient_rank<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_opt_f64(deserializer)?
        .filter(|r| r.is_finite() && *r >= 0.0)
        .map(|r| r as u32))
}

fn lenient_issues<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => vec![s],
        _ => Vec::new(),
    })
}

/// Votes for one candidate, keyed by evaluator engine.
pub type EvaluatorVotes = BTreeMap<String, Vote>;

/// Votes for a whole round, keyed by candidate question id.
pub type VoteMap = BTreeMap<String, EvaluatorVotes>;

/// A generated question taking part in a selection round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub question_id: String,
    pub engine: String,
}

impl From<&Question> for Candidate {
    fn from(q: &Question) -> Self {
        Self {
            question_id: q.id.clone(),
            engine: q.engine.clone(),
        }
    }
}

/// Parameters of one generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub exam_name: String,
    pub language: String,
    pub question_type: String,
    /// 1 (easiest) to 10.
    pub difficulty: u8,
    #[serde(default)]
    pub notes: String,
    /// 1 to 50.
    pub num_questions: u32,
    #[serde(default = "default_engines")]
    pub engines: BTreeSet<String>,
}

pub fn default_engines() -> BTreeSet<String> {
    ["gpt", "gemini"].into_iter().map(String::from).collect()
}

impl Default for GenerateRequest {
    fn default() -> Self {
        Self {
            exam_name: String::new(),
            language: String::new(),
            question_type: String::new(),
            difficulty: default_difficulty(),
            notes: String::new(),
            num_questions: 1,
            engines: default_engines(),
        }
    }
}

impl GenerateRequest {
    /// Check field bounds, reporting every violation at once.
    pub fn validate(&self) -> Result<(), InvalidRequest> {
        let mut problems = Vec::new();

        if self.exam_name.trim().is_empty() {
            problems.push("exam_name must not be empty".to_string());
        }
        if self.language.trim().is_empty() {
            problems.push("language must not be empty".to_string());
        }
        if self.question_type.trim().is_empty() {
            problems.push("question_type must not be empty".to_string());
        }
        if !(1..=10).contains(&self.difficulty) {
            problems.push(format!("difficulty must be 1..=10, got {}", self.difficulty));
        }
        if !(1..=50).contains(&self.num_questions) {
            problems.push(format!(
                "num_questions must be 1..=50, got {}",
                self.num_questions
            ));
        }
        if self.engines.is_empty() {
            problems.push("at least one engine is required".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(InvalidRequest { problems })
        }
    }
}

/// One generation request's full candidate and vote context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRound {
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub votes: VoteMap,
    /// Always a key of `votes` when present.
    #[serde(default)]
    pub winner_id: Option<String>,
    #[serde(default)]
    pub request_context: GenerateRequest,
}

impl SelectionRound {
    /// Build a round, picking the winner with the aggregator.
    pub fn new(
        candidates: Vec<Candidate>,
        votes: VoteMap,
        request_context: GenerateRequest,
    ) -> Self {
        let winner_id = crate::aggregator::select_winner(&votes);
        Self {
            candidates,
            votes,
            winner_id,
            request_context,
        }
    }

    pub fn candidate(&self, question_id: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.question_id == question_id)
    }
}
