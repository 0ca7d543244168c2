//! Collaborator trait definitions.
//!
//! `QuestionService` is the remote side of every lifecycle mutation and is
//! implemented by `quizforge-providers`. `ExportSink` is implemented by
//! `quizforge-report`. `KeyValueStore` backs round persistence.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::model::{GenerateRequest, ListStatus, Question, VoteMap};

// ---------------------------------------------------------------------------
// Question service
// ---------------------------------------------------------------------------

/// The remote question service. It owns the authoritative question state.
#[async_trait]
pub trait QuestionService: Send + Sync {
    /// Human-readable backend name (e.g. "http").
    fn name(&self) -> &str;

    /// Fan a generation request out to the requested engines.
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateOutcome, ServiceError>;

    /// Revise a question from a reviewer comment. The comment may be empty.
    async fn revise(&self, question_id: &str, comment: &str) -> Result<Question, ServiceError>;

    async fn approve(&self, question_id: &str) -> Result<Question, ServiceError>;

    async fn unapprove(&self, question_id: &str) -> Result<Question, ServiceError>;

    async fn delete(&self, question_id: &str) -> Result<(), ServiceError>;

    async fn restore(&self, question_id: &str) -> Result<Question, ServiceError>;

    async fn can_export(&self, question_id: &str) -> Result<bool, ServiceError>;

    async fn export(&self, question_id: &str) -> Result<ExportReceipt, ServiceError>;

    async fn list(&self, status: ListStatus) -> Result<Vec<Question>, ServiceError>;
}

/// Result of a generation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateOutcome {
    pub questions: Vec<Question>,
    /// Evaluator votes per candidate, when the service ran evaluation.
    #[serde(default)]
    pub evaluations: Option<VoteMap>,
    /// The service's own pick. Informational; the aggregator decides.
    #[serde(default)]
    pub winner_id: Option<String>,
}

/// Acknowledgement of a successful export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReceipt {
    /// Where the row was written, if the backend reports it.
    #[serde(default)]
    pub file_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Export sink
// ---------------------------------------------------------------------------

/// Durable destination for approved questions.
pub trait ExportSink: Send + Sync {
    /// Append one approved question to the export artifact.
    fn append(&self, question: &Question) -> anyhow::Result<ExportReceipt>;
}

// ---------------------------------------------------------------------------
// Key-value store
// ---------------------------------------------------------------------------

/// Minimal string key-value store used for round persistence.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
}
