//! HTTP client for the remote question service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use quizforge_core::error::ServiceError;
use quizforge_core::model::{GenerateRequest, ListStatus, Question};
use quizforge_core::traits::{ExportReceipt, GenerateOutcome, QuestionService};

use crate::error::ProviderError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// `QuestionService` backed by the question service's JSON API.
pub struct HttpQuestionService {
    base_url: Url,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl HttpQuestionService {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ProviderError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ProviderError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::InvalidUrl(base_url.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        Ok(Self {
            base_url,
            timeout_secs,
            client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Check that the service answers at all.
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn health(&self) -> Result<ServiceHealth, ServiceError> {
        Ok(self.call(Method::GET, &["health"], None::<&()>).await?)
    }

    /// CSV export files the service holds, most recently modified first.
    #[instrument(skip(self))]
    pub async fn export_files(&self) -> Result<Vec<ExportFile>, ServiceError> {
        let response: ExportFilesResponse = self
            .call(Method::GET, &["csv", "list"], None::<&()>)
            .await?;
        let mut files = response.files;
        files.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        tracing::debug!("service holds {} export file(s)", files.len());
        Ok(files)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn call<B, T>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<T, ProviderError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        self.send(self.client.request(method, url), body).await
    }

    async fn send<B, T>(
        &self,
        mut request: reqwest::RequestBuilder,
        body: Option<&B>,
    ) -> Result<T, ProviderError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.timeout_secs)
            } else {
                ProviderError::NetworkError(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5)
                * 1000;
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry_after,
            });
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status,
                message: error_detail(&body),
            });
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("failed to parse response: {e}")))
    }

    async fn mutate(&self, endpoint: &str, question_id: &str) -> Result<Question, ServiceError> {
        let response: QuestionResponse = self
            .call(Method::POST, &[endpoint], Some(&QuestionIdBody { question_id }))
            .await?;
        Ok(response.question)
    }
}

/// Answer of the service's health endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServiceHealth {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// One CSV export file on the service side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFile {
    pub filename: String,
    pub size_bytes: u64,
    /// Unix timestamp, seconds.
    pub modified_at: i64,
}

/// FastAPI reports errors as `{"detail": "..."}`; fall back to the raw body.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) => body.to_string(),
    }
}

#[derive(Serialize)]
struct QuestionIdBody<'a> {
    question_id: &'a str,
}

#[derive(Serialize)]
struct ImproveBody<'a> {
    question_id: &'a str,
    comment: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

#[derive(Deserialize)]
struct QuestionResponse {
    question: Question,
}

#[derive(Deserialize)]
struct QuestionsResponse {
    #[serde(default)]
    questions: Vec<Question>,
}

#[derive(Deserialize)]
struct SuccessResponse {
    success: bool,
    #[serde(default)]
    file_path: Option<String>,
}

#[derive(Deserialize)]
struct ExportFilesResponse {
    #[serde(default)]
    files: Vec<ExportFile>,
}

#[derive(Deserialize)]
struct CanExportResponse {
    can_export: bool,
}

#[async_trait]
impl QuestionService for HttpQuestionService {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self, request), fields(exam = %request.exam_name, engines = request.engines.len()))]
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateOutcome, ServiceError> {
        let outcome: GenerateOutcome = self
            .call(Method::POST, &["generate"], Some(request))
            .await?;
        tracing::debug!("service returned {} question(s)", outcome.questions.len());
        Ok(outcome)
    }

    #[instrument(skip(self, comment))]
    async fn revise(&self, question_id: &str, comment: &str) -> Result<Question, ServiceError> {
        let body = ImproveBody {
            question_id,
            comment,
        };
        let response: QuestionResponse = self.call(Method::POST, &["improve"], Some(&body)).await?;
        Ok(response.question)
    }

    #[instrument(skip(self))]
    async fn approve(&self, question_id: &str) -> Result<Question, ServiceError> {
        self.mutate("approve", question_id).await
    }

    #[instrument(skip(self))]
    async fn unapprove(&self, question_id: &str) -> Result<Question, ServiceError> {
        self.mutate("unapprove", question_id).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, question_id: &str) -> Result<(), ServiceError> {
        let response: SuccessResponse = self
            .call(Method::POST, &["delete"], Some(&QuestionIdBody { question_id }))
            .await?;
        if response.success {
            Ok(())
        } else {
            Err(ServiceError::Rejected(format!(
                "delete of {question_id} was not acknowledged"
            )))
        }
    }

    #[instrument(skip(self))]
    async fn restore(&self, question_id: &str) -> Result<Question, ServiceError> {
        self.mutate("undelete", question_id).await
    }

    #[instrument(skip(self))]
    async fn can_export(&self, question_id: &str) -> Result<bool, ServiceError> {
        let response: CanExportResponse = self
            .call(Method::GET, &["can-export", question_id], None::<&()>)
            .await?;
        Ok(response.can_export)
    }

    #[instrument(skip(self))]
    async fn export(&self, question_id: &str) -> Result<ExportReceipt, ServiceError> {
        let response: SuccessResponse = self
            .call(Method::POST, &["export"], Some(&QuestionIdBody { question_id }))
            .await?;
        if !response.success {
            return Err(ServiceError::Rejected(format!(
                "export of {question_id} was not acknowledged"
            )));
        }
        Ok(ExportReceipt {
            file_path: response.file_path,
        })
    }

    #[instrument(skip(self))]
    async fn list(&self, status: ListStatus) -> Result<Vec<Question>, ServiceError> {
        let mut url = self.endpoint(&["questions"])?;
        url.query_pairs_mut().append_pair("status", status.as_str());
        let response: QuestionsResponse = self
            .send(self.client.get(url), None::<&()>)
            .await?;
        Ok(response.questions)
    }
}
