//! The `quizforge purge` command.

use std::path::PathBuf;

use anyhow::{bail, Result};

use super::session;

pub async fn execute(id: String, yes: bool, config_path: Option<PathBuf>) -> Result<()> {
    if !yes {
        bail!("purging {id} cannot be undone; pass --yes to confirm");
    }

    let (_, mut coordinator) = session::open(config_path).await?;
    let id = session::resolve_id(&coordinator, &id)?;
    session::report(coordinator.purge(&id).await)
}
