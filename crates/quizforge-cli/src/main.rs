//! quizforge CLI: review, rank, and approve generated quiz questions.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "quizforge",
    version,
    about = "Curate machine-generated quiz questions"
)]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter quizforge.toml
    Init,

    /// Check that the question service is reachable
    Status,

    /// Generate candidates with several engines and rank them
    Generate {
        /// Exam or subject name
        #[arg(long)]
        exam: String,

        /// Question language (e.g. "English", "Hebrew")
        #[arg(long, default_value = "English")]
        language: String,

        /// Question type (e.g. "multiple-choice", "open")
        #[arg(long = "type", default_value = "multiple-choice")]
        question_type: String,

        /// Difficulty from 1 to 10
        #[arg(long, default_value = "5")]
        difficulty: u8,

        /// Free-text guidance for the engines
        #[arg(long, default_value = "")]
        notes: String,

        /// Questions per engine
        #[arg(long, default_value = "1")]
        count: u32,

        /// Engines to use (e.g. "gpt,gemini"); defaults to the configured set
        #[arg(long)]
        engines: Option<String>,
    },

    /// Show the last selection round
    Round {
        /// Output format: text, markdown, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Write the summary to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List questions in one partition
    List {
        /// in_progress, approved, deleted, or all
        #[arg(long, default_value = "in_progress")]
        status: String,
    },

    /// Approve a question and export it
    Approve {
        /// Question id or unique id prefix
        id: String,
    },

    /// Return an approved question to review
    Unapprove {
        /// Question id or unique id prefix
        id: String,
    },

    /// Soft-delete a question
    Delete {
        /// Question id or unique id prefix
        id: String,
    },

    /// Restore a deleted question
    Restore {
        /// Question id or unique id prefix
        id: String,
    },

    /// Permanently hide a deleted question from this client
    Purge {
        /// Question id or unique id prefix
        id: String,

        /// Confirm the purge
        #[arg(long)]
        yes: bool,
    },

    /// Ask the service to revise a question
    Revise {
        /// Question id or unique id prefix
        id: String,

        /// Reviewer comment guiding the revision
        #[arg(long, default_value = "")]
        comment: String,
    },

    /// List CSV export files held by the question service
    Exports,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("quizforge=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Status => commands::status::execute(config).await,
        Commands::Generate {
            exam,
            language,
            question_type,
            difficulty,
            notes,
            count,
            engines,
        } => {
            commands::generate::execute(
                exam,
                language,
                question_type,
                difficulty,
                notes,
                count,
                engines,
                config,
            )
            .await
        }
        Commands::Round { format, output } => commands::round::execute(format, output, config),
        Commands::List { status } => commands::list::execute(status, config).await,
        Commands::Approve { id } => {
            commands::lifecycle::execute(commands::lifecycle::Action::Approve, id, config).await
        }
        Commands::Unapprove { id } => {
            commands::lifecycle::execute(commands::lifecycle::Action::Unapprove, id, config).await
        }
        Commands::Delete { id } => {
            commands::lifecycle::execute(commands::lifecycle::Action::Delete, id, config).await
        }
        Commands::Restore { id } => {
            commands::lifecycle::execute(commands::lifecycle::Action::Restore, id, config).await
        }
        Commands::Purge { id, yes } => commands::purge::execute(id, yes, config).await,
        Commands::Revise { id, comment } => commands::revise::execute(id, comment, config).await,
        Commands::Exports => commands::exports::execute(config).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
