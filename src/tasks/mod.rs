//! Task sequencing for the dataset-sample and test-then-QA targets.
//!
//! Provides:
//! - `TaskSequencer`: `fetch`, `run_qa_pipeline`, `qa_on_squad`
//! - `ProcessRunner`: seam for spawning external steps
//! - `DownloadRequest` / `Placeholders`: argv rendering

mod command;
mod runner;
mod sequencer;

pub use command::*;
pub use runner::*;
pub use sequencer::*;
