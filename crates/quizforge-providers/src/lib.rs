//! quizforge-providers: Question service implementations.
//!
//! Implements the `QuestionService` trait over HTTP against the remote
//! question service, plus an in-process `LocalQuestionService` with the
//! same semantics, and loads the client configuration.

pub mod config;
pub mod error;
pub mod http;
pub mod local;

pub use config::{
    create_http_client, create_service, load_config, load_config_from, open_persistence,
    render_config, QuizforgeConfig,
};
pub use error::ProviderError;
pub use http::{ExportFile, HttpQuestionService, ServiceHealth};
pub use local::LocalQuestionService;
