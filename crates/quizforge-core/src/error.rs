//! Error taxonomy for quizforge.
//!
//! `ServiceError` is what remote collaborators report. The lifecycle
//! controller maps it one-to-one into `LifecycleError`, which also carries
//! the controller's own guard failures. Defined here so every crate can
//! classify failures without string matching.

use thiserror::Error;

use crate::lifecycle::Operation;
use crate::model::QuestionStatus;

/// Failure reported by a remote collaborator (question service, exporter).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Transport or collaborator failure. Safe to retry the whole operation.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The collaborator refused the request (stale version, terminal state,
    /// unknown id). Re-fetch state before retrying.
    #[error("service rejected the request: {0}")]
    Rejected(String),
}

impl ServiceError {
    /// Returns `true` if the caller may retry the same request as-is.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Unavailable(_))
    }
}

/// Errors surfaced by the lifecycle controller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LifecycleError {
    /// The operation is not legal from the question's current status.
    #[error("cannot {operation} a question that is {status}")]
    InvalidTransition {
        operation: Operation,
        status: QuestionStatus,
    },

    /// Another mutating operation on the same question is still pending.
    #[error("another operation on question {0} is still in progress")]
    OperationInProgress(String),

    /// Approval committed remotely but the question is not export-eligible.
    /// `status` is the authoritative status re-fetched afterwards, if any.
    #[error("question {id} was approved but is not eligible for export")]
    ExportNotEligible {
        id: String,
        status: Option<QuestionStatus>,
    },

    #[error("question service unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("question service rejected the request: {0}")]
    RemoteRejected(String),

    /// The controller is not tracking a question with this id.
    #[error("unknown question: {0}")]
    UnknownQuestion(String),
}

impl LifecycleError {
    /// Returns `true` if the caller may simply try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LifecycleError::OperationInProgress(_)
                | LifecycleError::ExportNotEligible { .. }
                | LifecycleError::RemoteUnavailable(_)
        )
    }
}

impl From<ServiceError> for LifecycleError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(msg) => LifecycleError::RemoteUnavailable(msg),
            ServiceError::Rejected(msg) => LifecycleError::RemoteRejected(msg),
        }
    }
}

/// Failures reading or writing the persisted round.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// A stored entry could not be decoded. Recovered by discarding it.
    #[error("corrupt persisted round entry '{key}': {reason}")]
    CorruptPersistedRound { key: String, reason: String },

    /// The backing store failed.
    #[error("round store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// A generation request failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid generation request: {}", problems.join("; "))]
pub struct InvalidRequest {
    pub problems: Vec<String>,
}
