//! The `quizforge init` command.

use std::path::Path;

use anyhow::Result;

use quizforge_providers::{render_config, QuizforgeConfig};

pub fn execute() -> Result<()> {
    let path = Path::new("quizforge.toml");
    if path.exists() {
        println!("quizforge.toml already exists, skipping.");
        return Ok(());
    }

    let mut content = String::from("# quizforge configuration\n\n");
    content.push_str(&render_config(&QuizforgeConfig::default())?);
    std::fs::write(path, content)?;
    println!("Created quizforge.toml");

    println!("\nNext steps:");
    println!("  1. Point service_url at your question service");
    println!("  2. Run: quizforge generate --exam \"Biology\" --engines gpt,gemini");
    println!("  3. Run: quizforge round");

    Ok(())
}
