//! The `quizforge status` command.

use std::path::PathBuf;

use anyhow::{bail, Result};

use quizforge_providers::{create_http_client, load_config_from};

pub async fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let client = create_http_client(&config)?;

    match client.health().await {
        Ok(health) => {
            let version = health
                .version
                .map(|v| format!(" (version {v})"))
                .unwrap_or_default();
            println!("Question service at {} is up{version}", client.base_url());
            Ok(())
        }
        Err(e) => bail!("question service at {} is unreachable: {e}", client.base_url()),
    }
}
