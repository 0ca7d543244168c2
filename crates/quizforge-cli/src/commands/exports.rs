//! The `quizforge exports` command.

use std::path::PathBuf;

use anyhow::Result;
use chrono::DateTime;
use comfy_table::{Cell, Table};

use quizforge_providers::{create_http_client, load_config_from, ExportFile};

pub async fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let client = create_http_client(&config)?;
    let files = client.export_files().await?;

    if files.is_empty() {
        println!("No export files yet.");
        return Ok(());
    }
    println!("{}", render_files(&files));
    Ok(())
}

fn render_files(files: &[ExportFile]) -> String {
    let mut table = Table::new();
    table.set_header(vec!["File", "Size", "Modified (UTC)"]);
    for file in files {
        table.add_row(vec![
            Cell::new(&file.filename),
            Cell::new(human_size(file.size_bytes)),
            Cell::new(modified_label(file.modified_at)),
        ]);
    }
    table.to_string()
}

fn human_size(bytes: u64) -> String {
    match bytes {
        0..=1023 => format!("{bytes} B"),
        1024..=1_048_575 => format!("{:.1} KiB", bytes as f64 / 1024.0),
        _ => format!("{:.1} MiB", bytes as f64 / 1_048_576.0),
    }
}

fn modified_label(unix_secs: i64) -> String {
    DateTime::from_timestamp(unix_secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| unix_secs.to_string())
}
