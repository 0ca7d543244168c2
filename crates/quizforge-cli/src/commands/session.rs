//! Shared setup for commands that talk to the question service.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};

use quizforge_core::coordinator::{Notice, Severity, ViewCoordinator};
use quizforge_core::lifecycle::LifecycleController;
use quizforge_providers::{create_service, load_config_from, open_persistence, QuizforgeConfig};

/// A coordinator initialized against the configured service.
pub async fn open(config_path: Option<PathBuf>) -> Result<(QuizforgeConfig, ViewCoordinator)> {
    let config = load_config_from(config_path.as_deref())?;
    let service = create_service(&config)?;
    let controller = Arc::new(LifecycleController::new(service));
    let mut coordinator = ViewCoordinator::new(controller, open_persistence(&config));

    let notice = coordinator.initialize().await;
    if notice.severity == Severity::Warning {
        eprintln!("Warning: {notice}");
    }
    Ok((config, coordinator))
}

/// Print a notice, turning an error notice into a failed command.
pub fn report(notice: Notice) -> Result<()> {
    match notice.severity {
        Severity::Error => bail!("{notice}"),
        Severity::Warning => eprintln!("Warning: {notice}"),
        Severity::Info | Severity::Success => println!("{notice}"),
    }
    Ok(())
}

/// Expand a unique id prefix to the full question id.
///
/// Ids that match nothing are passed through so the controller can report
/// them as unknown.
pub fn resolve_id(coordinator: &ViewCoordinator, given: &str) -> Result<String> {
    let snapshot = coordinator.snapshot();
    let all = snapshot
        .active
        .iter()
        .chain(&snapshot.approved)
        .chain(&snapshot.deleted);

    let mut matches = Vec::new();
    for question in all {
        if question.id == given {
            return Ok(question.id.clone());
        }
        if question.id.starts_with(given) {
            matches.push(question.id.as_str());
        }
    }

    match matches.as_slice() {
        [only] => Ok(only.to_string()),
        [] => Ok(given.to_string()),
        several => bail!(
            "id prefix '{given}' is ambiguous: matches {}",
            several.join(", ")
        ),
    }
}
