//! View coordinator: glue between the controller, the aggregator, the
//! board, and round persistence.
//!
//! The coordinator owns the `QuestionBoard` and the current round. It
//! dispatches user actions to the `LifecycleController`, drains the
//! controller's event channel into the board, and reports every outcome as
//! a `Notice`.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::aggregator::{aggregate, RoundOutcome};
use crate::board::{BoardSnapshot, QuestionBoard};
use crate::error::LifecycleError;
use crate::lifecycle::{LifecycleController, LifecycleEvent};
use crate::model::{short_id, Candidate, GenerateRequest, ListStatus, Question, SelectionRound};
use crate::persistence::RoundPersistence;
use crate::view::{BoardView, RoundView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// A transient, user-facing message about the outcome of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub message: String,
    pub severity: Severity,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self::with(Severity::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::with(Severity::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with(Severity::Error, message)
    }

    fn with(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<LifecycleError> for Notice {
    fn from(err: LifecycleError) -> Self {
        match &err {
            LifecycleError::ExportNotEligible {
                status: Some(status),
                ..
            } => Notice::error(format!("{err}; it is now {status}")),
            _ => Notice::error(err.to_string()),
        }
    }
}

pub struct ViewCoordinator {
    controller: Arc<LifecycleController>,
    persistence: RoundPersistence,
    events: broadcast::Receiver<LifecycleEvent>,
    board: QuestionBoard,
    round: Option<(SelectionRound, RoundOutcome)>,
    purged: BTreeSet<String>,
}

impl ViewCoordinator {
    pub fn new(controller: Arc<LifecycleController>, persistence: RoundPersistence) -> Self {
        let events = controller.subscribe();
        Self {
            controller,
            persistence,
            events,
            board: QuestionBoard::new(),
            round: None,
            purged: BTreeSet::new(),
        }
    }

    pub fn controller(&self) -> &Arc<LifecycleController> {
        &self.controller
    }

    /// Restore the persisted round and list every partition.
    ///
    /// Listing failures leave those partitions empty and are reported as a
    /// warning; startup itself never fails.
    pub async fn initialize(&mut self) -> Notice {
        self.purged = self.persistence.purged_ids();
        self.round = self.persistence.load().map(|round| {
            let outcome = aggregate(&round.candidates, &round.votes);
            (round, outcome)
        });

        let service = self.controller.service().clone();
        let listings = join_all(ListStatus::ALL.map(|status| {
            let service = service.clone();
            async move { (status, service.list(status).await) }
        }))
        .await;

        let mut questions = Vec::new();
        let mut failed = Vec::new();
        for (status, listing) in listings {
            match listing {
                Ok(listed) => questions.extend(listed),
                Err(e) => {
                    tracing::warn!("could not list {status} questions: {e}");
                    failed.push(status.as_str());
                }
            }
        }
        questions.retain(|q| !self.purged.contains(&q.id));

        self.controller.track(questions.iter().cloned());
        self.board.initialize(questions);

        let count = self.board.snapshot().len();
        tracing::info!(
            "board initialized with {count} question(s){}",
            if self.round.is_some() { ", last round restored" } else { "" }
        );

        if failed.is_empty() {
            Notice::info(format!("Loaded {count} question(s)"))
        } else {
            Notice::warning(format!(
                "Loaded {count} question(s); could not list {}",
                failed.join(", ")
            ))
        }
    }

    /// Run a generation request and make its result the current round.
    pub async fn generate(&mut self, request: GenerateRequest) -> Notice {
        if let Err(err) = request.validate() {
            return Notice::error(err.to_string());
        }

        tracing::info!(
            "generating {} question(s) with {} engine(s)",
            request.num_questions,
            request.engines.len()
        );
        let generated = match self.controller.service().generate(&request).await {
            Ok(generated) => generated,
            Err(e) => return LifecycleError::from(e).into(),
        };

        let candidates: Vec<Candidate> = generated.questions.iter().map(Candidate::from).collect();
        let votes = generated.evaluations.unwrap_or_default();
        let round = SelectionRound::new(candidates, votes, request);

        if let (Some(remote), local) = (&generated.winner_id, &round.winner_id) {
            if local.as_ref() != Some(remote) {
                tracing::warn!(
                    "service picked {} but the votes rank {} first",
                    short_id(remote),
                    local.as_deref().map(short_id).unwrap_or("nothing")
                );
            }
        }

        if let Err(e) = self.persistence.save(&round) {
            tracing::warn!("could not persist round: {e}");
        }

        let count = generated.questions.len();
        self.controller.track(generated.questions.iter().cloned());
        self.board.insert_generated(generated.questions);

        let outcome = aggregate(&round.candidates, &round.votes);
        let message = match outcome.winner() {
            Some(winner) => format!(
                "Generated {count} question(s); winner {} ({} points)",
                short_id(&winner.score.question_id),
                winner.score.total_points
            ),
            None => format!("Generated {count} question(s); no evaluations"),
        };
        tracing::info!("round created with {count} candidate(s)");
        self.round = Some((round, outcome));

        Notice::success(message)
    }

    pub async fn approve(&mut self, id: &str) -> Notice {
        let result = self.controller.approve(id).await;
        self.pump_events();
        match result {
            Ok(approval) => {
                let location = approval
                    .export
                    .file_path
                    .map(|path| format!(" to {path}"))
                    .unwrap_or_default();
                Notice::success(format!(
                    "Question {} approved and exported{location}",
                    short_id(id)
                ))
            }
            Err(e) => e.into(),
        }
    }

    pub async fn unapprove(&mut self, id: &str) -> Notice {
        let result = self.controller.unapprove(id).await;
        self.pump_events();
        match result {
            Ok(_) => Notice::success(format!("Question {} returned to review", short_id(id))),
            Err(e) => e.into(),
        }
    }

    pub async fn delete(&mut self, id: &str) -> Notice {
        let result = self.controller.delete(id).await;
        self.pump_events();
        match result {
            Ok(_) => Notice::success(format!("Question {} deleted", short_id(id))),
            Err(e) => e.into(),
        }
    }

    pub async fn restore(&mut self, id: &str) -> Notice {
        let result = self.controller.restore(id).await;
        self.pump_events();
        match result {
            Ok(_) => Notice::success(format!("Question {} restored", short_id(id))),
            Err(e) => e.into(),
        }
    }

    /// Permanently drop a deleted question from this client.
    pub async fn purge(&mut self, id: &str) -> Notice {
        let result = self.controller.purge(id).await;
        self.pump_events();
        match result {
            Ok(_) => {
                self.purged.insert(id.to_string());
                if let Err(e) = self.persistence.record_purged(id) {
                    tracing::warn!("could not remember purge of {}: {e}", short_id(id));
                    return Notice::warning(format!(
                        "Question {} purged for this session only",
                        short_id(id)
                    ));
                }
                Notice::success(format!("Question {} permanently removed", short_id(id)))
            }
            Err(e) => e.into(),
        }
    }

    pub async fn revise(&mut self, id: &str, comment: &str) -> Notice {
        let result = self.controller.revise(id, comment).await;
        self.pump_events();
        match result {
            Ok(revision) if revision.content_changed() => {
                let fields: Vec<String> = revision
                    .changed_fields
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                Notice::success(format!(
                    "Question {} revised to v{} (changed: {})",
                    short_id(id),
                    revision.question.version,
                    fields.join(", ")
                ))
            }
            Ok(revision) => Notice::info(format!(
                "Question {} unchanged at v{}",
                short_id(id),
                revision.question.version
            )),
            Err(e) => e.into(),
        }
    }

    /// Apply every pending lifecycle event to the board.
    pub fn pump_events(&mut self) -> usize {
        let mut applied = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.board.apply_transition(&event);
                    applied += 1;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!("board missed {skipped} lifecycle event(s)");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        applied
    }

    pub fn round(&self) -> Option<&SelectionRound> {
        self.round.as_ref().map(|(round, _)| round)
    }

    pub fn outcome(&self) -> Option<&RoundOutcome> {
        self.round.as_ref().map(|(_, outcome)| outcome)
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        self.board.snapshot()
    }

    pub fn round_view(&self) -> Option<RoundView> {
        self.round
            .as_ref()
            .map(|(round, outcome)| RoundView::from_outcome(round, outcome))
    }

    /// The board's current copy of `id`.
    pub fn question(&self, id: &str) -> Option<&Question> {
        self.board.get(id)
    }

    pub fn board_view(&self) -> BoardView {
        BoardView::from(&self.board.snapshot())
    }
}
