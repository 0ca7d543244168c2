//! The `quizforge revise` command.

use std::path::PathBuf;

use anyhow::Result;

use super::session;

pub async fn execute(id: String, comment: String, config_path: Option<PathBuf>) -> Result<()> {
    let (_, mut coordinator) = session::open(config_path).await?;
    let id = session::resolve_id(&coordinator, &id)?;
    session::report(coordinator.revise(&id, &comment).await)?;

    if let Some(question) = coordinator.question(&id) {
        println!("\n{}", question.question);
        if let Some(explanation) = &question.improvement_explanation {
            println!("Revision note: {explanation}");
        }
    }
    Ok(())
}
