//! squad-qa - SQuAD sample download, test gating and extractive QA inference.
//!
//! ## Architecture
//!
//! squad-qa has two halves:
//! - **Task Sequencer**: Orchestrates external programs (downloader, tests, QA step)
//! - **Inference Pipeline**: Native extractive QA over a JSON-lines dataset
//!
//! ## Task Flow
//!
//! - **fetch**: Sample missing → create data dir → run downloader
//! - **run**: fetch → tests → (exit 0 only) → QA step on the sample
//!
//! ## Inference Flow
//!
//! Records → Tokenize → Span Scorer → argmax span → Decode/Clean → TSV
//!
//! ## Epistemic Design
//!
//! - K_i (Knowledge): Step order and gating are fixed in code
//! - B_i (Beliefs): External processes and HTTP calls are fallible (Result)
//! - I^R (Resolvable): Paths, commands and model settings come from config
//! - I^B (Bounded): Scorer network errors are retried with backoff

pub mod client;
pub mod inference;
pub mod models;
pub mod tasks;

// Re-exports for convenience
pub use client::{HttpSpanScorer, SpanScorer, ensure_tokenizer};
pub use inference::{QaPipeline, QaTokenizer, load_jsonl_dataset};
pub use models::{Config, QaError, Result};
pub use tasks::{DryRunner, PipelineReport, ProcessRunner, SystemRunner, TaskSequencer};
