//! CSV export sink.
//!
//! One file, one header row, one row per exported question. The file
//! starts with a UTF-8 byte order mark so spreadsheet tools pick the right
//! encoding for right-to-left languages.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::SecondsFormat;

use quizforge_core::model::Question;
use quizforge_core::traits::{ExportReceipt, ExportSink};

const BOM: &str = "\u{feff}";

pub const HEADER: [&str; 11] = [
    "exam_name",
    "language",
    "question_type",
    "difficulty",
    "engine",
    "question",
    "options",
    "answer",
    "explanation",
    "version",
    "approved_at",
];

/// Quote a field when it contains a delimiter, quote, or line break.
fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn csv_line<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let escaped: Vec<String> = fields.into_iter().map(|f| csv_escape(f.as_ref())).collect();
    format!("{}\r\n", escaped.join(","))
}

/// The export row for one question, in `HEADER` order.
pub fn export_row(question: &Question) -> Vec<String> {
    vec![
        question.exam_name.clone(),
        question.language.clone(),
        question.question_type.clone(),
        question.difficulty.to_string(),
        question.engine.clone(),
        question.question.clone(),
        question
            .options
            .as_ref()
            .map(|options| options.join(" | "))
            .unwrap_or_default(),
        question.answer.clone(),
        question.explanation.clone(),
        question.version.to_string(),
        question
            .updated_at
            .to_rfc3339_opts(SecondsFormat::Micros, false),
    ]
}

/// Appends approved questions to a CSV file.
#[derive(Debug)]
pub struct CsvExporter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file with BOM and header, or add a missing BOM to an
    /// existing file.
    fn prepare(&self) -> Result<()> {
        if !self.path.exists() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut content = String::from(BOM);
            content.push_str(&csv_line(HEADER));
            std::fs::write(&self.path, content)
                .with_context(|| format!("failed to create {}", self.path.display()))?;
            tracing::info!("initialized export file {}", self.path.display());
            return Ok(());
        }

        let existing = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        if !existing.starts_with(BOM) {
            tracing::info!("adding byte order mark to {}", self.path.display());
            std::fs::write(&self.path, format!("{BOM}{existing}"))
                .with_context(|| format!("failed to rewrite {}", self.path.display()))?;
        }
        Ok(())
    }
}

impl ExportSink for CsvExporter {
    fn append(&self, question: &Question) -> Result<ExportReceipt> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.prepare()?;

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(csv_line(export_row(question)).as_bytes())
            .with_context(|| format!("failed to append to {}", self.path.display()))?;

        tracing::info!(
            "question {} exported to {}",
            question.short_id(),
            self.path.display()
        );
        Ok(ExportReceipt {
            file_path: Some(self.path.display().to_string()),
        })
    }
}
