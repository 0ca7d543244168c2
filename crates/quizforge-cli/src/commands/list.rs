//! The `quizforge list` command.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use comfy_table::{Cell, Table};

use quizforge_core::model::ListStatus;
use quizforge_core::view::QuestionCard;

use super::session;

pub async fn execute(status: String, config_path: Option<PathBuf>) -> Result<()> {
    let partitions: Vec<ListStatus> = if status == "all" {
        ListStatus::ALL.to_vec()
    } else {
        vec![status.parse::<ListStatus>().map_err(|e: String| anyhow!(e))?]
    };

    let (_, coordinator) = session::open(config_path).await?;
    let board = coordinator.board_view();

    for partition in partitions {
        let cards = board.partition(partition);
        println!("{partition}: {} question(s)", cards.len());
        if !cards.is_empty() {
            println!("{}", render_cards(cards));
        }
    }
    Ok(())
}

fn render_cards(cards: &[QuestionCard]) -> String {
    let mut table = Table::new();
    table.set_header(vec!["ID", "Engine", "Status", "Version", "Question"]);
    for card in cards {
        table.add_row(vec![
            Cell::new(&card.short_id),
            Cell::new(&card.engine),
            Cell::new(card.status_label),
            Cell::new(card.version_label.as_deref().unwrap_or("-")),
            Cell::new(truncate(&card.question, 60)),
        ]);
    }
    table.to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars - 3).collect();
        format!("{head}...")
    }
}
