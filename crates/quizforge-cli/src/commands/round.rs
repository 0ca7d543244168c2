//! The `quizforge round` command.

use std::path::PathBuf;

use anyhow::{bail, Result};
use comfy_table::{Cell, Table};

use quizforge_core::view::RoundView;
use quizforge_providers::{load_config_from, open_persistence};
use quizforge_report::summary::{
    generate_json, generate_markdown, write_json_summary, write_markdown_summary,
};

pub fn execute(format: String, output: Option<PathBuf>, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let Some(round) = open_persistence(&config).load() else {
        println!("No round yet. Run `quizforge generate` first.");
        return Ok(());
    };
    let view = RoundView::build(&round);

    match (format.as_str(), output) {
        ("markdown" | "md", Some(path)) => {
            write_markdown_summary(&view, &path)?;
            println!("Round summary written to {}", path.display());
        }
        ("json", Some(path)) => {
            write_json_summary(&view, &path)?;
            println!("Round summary written to {}", path.display());
        }
        ("text", Some(_)) => bail!("--output needs --format markdown or json"),
        ("markdown" | "md", None) => println!("{}", generate_markdown(&view)),
        ("json", None) => println!("{}", generate_json(&view)?),
        ("text", None) => println!("{}", render_text(&view)),
        (other, _) => bail!("unknown format: {other} (expected text, markdown, or json)"),
    }

    Ok(())
}

/// Ranking table plus the winner line.
pub fn render_text(view: &RoundView) -> String {
    let mut table = Table::new();
    table.set_header(vec!["#", "Question", "Engine", "Points", "Mean", "Votes", "Verdict"]);

    for row in &view.rows {
        let position = if row.is_winner {
            format!("{} *", row.position)
        } else {
            row.position.to_string()
        };
        table.add_row(vec![
            Cell::new(position),
            Cell::new(&row.short_id),
            Cell::new(&row.engine),
            Cell::new(row.total_points),
            Cell::new(format!("{:.1}", row.mean_score)),
            Cell::new(row.votes.len()),
            Cell::new(row.verdict_label.as_deref().unwrap_or("-")),
        ]);
    }

    let winner = match view.winner() {
        Some(winner) => format!(
            "Winner: {} from {} ({} points)",
            winner.question_id, winner.engine, winner.total_points
        ),
        None => "Winner: none (no evaluations)".to_string(),
    };

    let mut text = format!(
        "{} ({}, {}, difficulty {})\n{table}\n{winner}",
        view.exam_name, view.language, view.question_type, view.difficulty
    );
    for hint in view.rows.iter().filter_map(|row| {
        row.fix_hint
            .as_ref()
            .map(|hint| format!("\n  {}: {hint}", row.short_id))
    }) {
        text.push_str(&hint);
    }
    text
}
