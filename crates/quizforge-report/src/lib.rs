//! quizforge-report: Export and summary output.
//!
//! `csv` appends approved questions to the export artifact; `summary`
//! renders a selection round as Markdown or JSON.

pub mod csv;
pub mod summary;

pub use csv::CsvExporter;
