//! Selection round summaries.
//!
//! Renders a `RoundView` as Markdown (for pasting into review notes) or as
//! pretty JSON.

use std::path::Path;

use anyhow::{Context, Result};

use quizforge_core::view::RoundView;

/// Escape characters that would break a Markdown table cell.
fn md_escape(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

/// Generate a Markdown summary of a round.
pub fn generate_markdown(view: &RoundView) -> String {
    let mut md = String::new();

    let title = if view.exam_name.is_empty() {
        "Selection round".to_string()
    } else {
        format!("Selection round: {}", md_escape(&view.exam_name))
    };
    md.push_str(&format!("# {title}\n\n"));
    md.push_str(&format!(
        "Language: {} | Type: {} | Difficulty: {} | Engines: {}\n\n",
        md_escape(&view.language),
        md_escape(&view.question_type),
        view.difficulty,
        view.engines.join(", ")
    ));

    match view.winner() {
        Some(winner) => md.push_str(&format!(
            "**Winner:** `{}` from {} ({} points, mean score {:.1})\n\n",
            winner.short_id, winner.engine, winner.total_points, winner.mean_score
        )),
        None => md.push_str("**Winner:** none (no evaluations)\n\n"),
    }

    md.push_str("| # | Question | Engine | Points | Mean | Verdict |\n");
    md.push_str("|---|----------|--------|--------|------|---------|\n");
    for row in &view.rows {
        md.push_str(&format!(
            "| {}{} | `{}` | {} | {} | {:.1} | {} |\n",
            row.position,
            if row.is_winner { " ★" } else { "" },
            row.short_id,
            md_escape(&row.engine),
            row.total_points,
            row.mean_score,
            row.verdict_label.as_deref().unwrap_or("-"),
        ));
    }

    let votes: Vec<_> = view
        .rows
        .iter()
        .flat_map(|row| row.votes.iter().map(move |vote| (row, vote)))
        .collect();
    if !votes.is_empty() {
        md.push_str("\n## Votes\n\n");
        md.push_str("| Question | Evaluator | Score | Verdict | Confidence | Issues |\n");
        md.push_str("|----------|-----------|-------|---------|------------|--------|\n");
        for (row, vote) in votes {
            md.push_str(&format!(
                "| `{}` | {} | {} | {} | {} | {} |\n",
                row.short_id,
                md_escape(&vote.evaluator),
                vote.score,
                md_escape(&vote.verdict_label),
                vote.confidence,
                md_escape(&vote.issues.join("; ")),
            ));
        }
    }

    let hints: Vec<_> = view
        .rows
        .iter()
        .filter_map(|row| row.fix_hint.as_ref().map(|hint| (row, hint)))
        .collect();
    if !hints.is_empty() {
        md.push_str("\n## Suggested fixes\n\n");
        for (row, hint) in hints {
            md.push_str(&format!("- `{}`: {}\n", row.short_id, md_escape(hint)));
        }
    }

    if !view.combined_issues.is_empty() {
        md.push_str("\n## All issues\n\n");
        for issue in &view.combined_issues {
            md.push_str(&format!("- {}\n", md_escape(issue)));
        }
    }

    md
}

/// Generate a JSON summary of a round.
pub fn generate_json(view: &RoundView) -> Result<String> {
    Ok(serde_json::to_string_pretty(view)?)
}

/// Write a Markdown summary to a file.
pub fn write_markdown_summary(view: &RoundView, path: &Path) -> Result<()> {
    write_summary(path, &generate_markdown(view))
}

/// Write a JSON summary to a file.
pub fn write_json_summary(view: &RoundView, path: &Path) -> Result<()> {
    write_summary(path, &generate_json(view)?)
}

fn write_summary(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::debug!("round summary written to {}", path.display());
    Ok(())
}
