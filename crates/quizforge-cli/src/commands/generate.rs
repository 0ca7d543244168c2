//! The `quizforge generate` command.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Result;

use quizforge_core::model::GenerateRequest;

use super::round::render_text;
use super::session;

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    exam_name: String,
    language: String,
    question_type: String,
    difficulty: u8,
    notes: String,
    num_questions: u32,
    engines: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let (config, mut coordinator) = session::open(config_path).await?;

    let engines = match engines {
        Some(list) => parse_engines(&list),
        None => config.default_engines.clone(),
    };
    let request = GenerateRequest {
        exam_name,
        language,
        question_type,
        difficulty,
        notes,
        num_questions,
        engines,
    };

    session::report(coordinator.generate(request).await)?;
    if let Some(view) = coordinator.round_view() {
        println!("\n{}", render_text(&view));
    }
    Ok(())
}

fn parse_engines(list: &str) -> BTreeSet<String> {
    list.split(',')
        .map(str::trim)
        .filter(|engine| !engine.is_empty())
        .map(String::from)
        .collect()
}
