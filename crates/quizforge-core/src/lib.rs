//! quizforge-core: Question lifecycle, round ranking, and persistence.
//!
//! This crate defines the entity model, the collaborator traits, the
//! lifecycle state machine, the selection-round aggregator, and the
//! view-side glue that the rest of quizforge builds on.

pub mod aggregator;
pub mod board;
pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod persistence;
pub mod traits;
pub mod view;

#[cfg(test)]
mod testing;
