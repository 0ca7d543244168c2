//! Renderable view models.
//!
//! Plain data built from the board snapshot and the current round. Nothing
//! here knows how it will be drawn; the CLI turns these into tables.

use serde::Serialize;

use crate::aggregator::{aggregate, format_confidence, RoundOutcome};
use crate::board::BoardSnapshot;
use crate::model::{short_id, ListStatus, Question, QuestionStatus, SelectionRound};

/// Whether text in `language` should be laid out right-to-left.
///
/// Accepts English names, ISO 639-1 codes and native names, ignoring case
/// and any region suffix ("he-IL", "Arabic (Egypt)").
pub fn is_rtl_language(language: &str) -> bool {
    let normalized = language.trim().to_lowercase();
    let primary = normalized
        .split(|c: char| c == '-' || c == '_' || c == '(' || c.is_whitespace())
        .next()
        .unwrap_or("");
    matches!(
        primary,
        "hebrew"
            | "he"
            | "iw"
            | "עברית"
            | "arabic"
            | "ar"
            | "العربية"
            | "farsi"
            | "persian"
            | "fa"
            | "فارسی"
            | "urdu"
            | "ur"
            | "اردو"
    )
}

pub fn status_label(status: QuestionStatus) -> &'static str {
    match status {
        QuestionStatus::Draft => "Draft",
        QuestionStatus::InProgress => "In progress",
        QuestionStatus::Approved => "Approved",
        QuestionStatus::Deleted => "Deleted",
    }
}

/// Drafts have never been revised, so their version is not shown.
pub fn version_label(question: &Question) -> Option<String> {
    match question.status {
        QuestionStatus::Draft => None,
        _ => Some(format!("v{}", question.version)),
    }
}

/// One question as presented on the board.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionCard {
    pub id: String,
    pub short_id: String,
    pub engine: String,
    pub status: QuestionStatus,
    pub status_label: &'static str,
    pub version_label: Option<String>,
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
    pub explanation: String,
    pub improvement_explanation: Option<String>,
    pub rtl: bool,
}

impl From<&Question> for QuestionCard {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            short_id: q.short_id().to_string(),
            engine: q.engine.clone(),
            status: q.status,
            status_label: status_label(q.status),
            version_label: version_label(q),
            question: q.question.clone(),
            options: q.options.clone().unwrap_or_default(),
            answer: q.answer.clone(),
            explanation: q.explanation.clone(),
            improvement_explanation: q.improvement_explanation.clone(),
            rtl: is_rtl_language(&q.language),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoardView {
    pub active: Vec<QuestionCard>,
    pub approved: Vec<QuestionCard>,
    pub deleted: Vec<QuestionCard>,
}

impl BoardView {
    pub fn partition(&self, status: ListStatus) -> &[QuestionCard] {
        match status {
            ListStatus::InProgress => &self.active,
            ListStatus::Approved => &self.approved,
            ListStatus::Deleted => &self.deleted,
        }
    }
}

impl From<&BoardSnapshot> for BoardView {
    fn from(snapshot: &BoardSnapshot) -> Self {
        let cards = |questions: &[Question]| -> Vec<QuestionCard> {
            questions.iter().map(QuestionCard::from).collect()
        };
        Self {
            active: cards(&snapshot.active),
            approved: cards(&snapshot.approved),
            deleted: cards(&snapshot.deleted),
        }
    }
}

/// One evaluator's vote on a candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteRow {
    pub evaluator: String,
    pub score: f64,
    pub verdict_label: String,
    pub confidence: String,
    pub points: Option<f64>,
    pub rank: Option<u32>,
    pub issues: Vec<String>,
}

/// One ranked candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateRow {
    pub position: usize,
    pub question_id: String,
    pub short_id: String,
    pub engine: String,
    pub total_points: f64,
    pub mean_score: f64,
    pub is_winner: bool,
    /// Consensus verdict label; `None` without votes.
    pub verdict_label: Option<String>,
    pub fix_hint: Option<String>,
    pub votes: Vec<VoteRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundView {
    pub exam_name: String,
    pub language: String,
    pub question_type: String,
    pub difficulty: u8,
    pub engines: Vec<String>,
    pub rows: Vec<CandidateRow>,
    pub winner_id: Option<String>,
    pub combined_issues: Vec<String>,
    pub rtl: bool,
}

impl RoundView {
    pub fn build(round: &SelectionRound) -> Self {
        let outcome = aggregate(&round.candidates, &round.votes);
        Self::from_outcome(round, &outcome)
    }

    pub fn from_outcome(round: &SelectionRound, outcome: &RoundOutcome) -> Self {
        let rows: Vec<CandidateRow> = outcome
            .standings
            .iter()
            .map(|standing| {
                let id = &standing.score.question_id;
                let votes: Vec<VoteRow> = round
                    .votes
                    .get(id)
                    .map(|evaluator_votes| {
                        evaluator_votes
                            .iter()
                            .map(|(evaluator, vote)| VoteRow {
                                evaluator: evaluator.clone(),
                                score: vote.score,
                                verdict_label: vote.verdict.label().to_string(),
                                confidence: format_confidence(vote.confidence),
                                points: vote.points,
                                rank: vote.rank,
                                issues: vote.issues.clone(),
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                CandidateRow {
                    position: standing.position,
                    question_id: id.clone(),
                    short_id: short_id(id).to_string(),
                    engine: standing.engine.clone().unwrap_or_else(|| "?".into()),
                    total_points: standing.score.total_points,
                    mean_score: standing.score.mean_score,
                    is_winner: outcome.winner_id.as_deref() == Some(id.as_str()),
                    verdict_label: standing
                        .consensus
                        .as_ref()
                        .map(|c| c.final_verdict.label().to_string()),
                    fix_hint: standing
                        .consensus
                        .as_ref()
                        .and_then(|c| c.proposed_fix_hint.clone()),
                    votes,
                }
            })
            .collect();

        let context = &round.request_context;
        Self {
            exam_name: context.exam_name.clone(),
            language: context.language.clone(),
            question_type: context.question_type.clone(),
            difficulty: context.difficulty,
            engines: context.engines.iter().cloned().collect(),
            rows,
            winner_id: outcome.winner_id.clone(),
            combined_issues: outcome.combined_issues.clone(),
            rtl: is_rtl_language(&context.language),
        }
    }

    pub fn winner(&self) -> Option<&CandidateRow> {
        self.rows.iter().find(|row| row.is_winner)
    }
}
