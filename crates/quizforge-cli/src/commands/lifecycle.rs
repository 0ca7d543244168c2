//! The `quizforge approve|unapprove|delete|restore` commands.

use std::path::PathBuf;

use anyhow::Result;

use super::session;

#[derive(Debug, Clone, Copy)]
pub enum Action {
    Approve,
    Unapprove,
    Delete,
    Restore,
}

pub async fn execute(action: Action, id: String, config_path: Option<PathBuf>) -> Result<()> {
    let (_, mut coordinator) = session::open(config_path).await?;
    let id = session::resolve_id(&coordinator, &id)?;

    let notice = match action {
        Action::Approve => coordinator.approve(&id).await,
        Action::Unapprove => coordinator.unapprove(&id).await,
        Action::Delete => coordinator.delete(&id).await,
        Action::Restore => coordinator.restore(&id).await,
    };
    session::report(notice)
}
