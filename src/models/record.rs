//! Record and result types for squad-qa.
//!
//! K_i: These types represent the data flowing through inference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One dataset row: a JSON object keyed by column name.
pub type QaRecord = serde_json::Map<String, serde_json::Value>;

/// Token IDs of one tokenized batch.
///
/// K_i: Every row is padded to the same length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedBatch {
    /// `batch_size x seq_len` token IDs
    pub input_ids: Vec<Vec<u32>>,

    /// `batch_size x seq_len` attention mask (1 = real token, 0 = padding)
    pub attention_mask: Vec<Vec<u32>>,
}

impl EncodedBatch {
    /// Number of rows in the batch.
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    /// Padded sequence length (0 for an empty batch).
    pub fn seq_len(&self) -> usize {
        self.input_ids.first().map_or(0, Vec::len)
    }
}

/// Start and end logits for every token of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanScores {
    /// `batch_size x seq_len` answer start scores
    #[serde(rename = "start_logits")]
    pub start: Vec<Vec<f32>>,

    /// `batch_size x seq_len` answer end scores
    #[serde(rename = "end_logits")]
    pub end: Vec<Vec<f32>>,
}

/// Decoded prediction for a single row.
///
/// Holds the cleaned input parts followed by the cleaned answer parts,
/// normally `question, context, answer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    /// Cleaned input parts (question, context)
    pub input: Vec<String>,

    /// Cleaned answer parts (usually one, empty when no span was found)
    pub answer: Vec<String>,
}

impl Prediction {
    /// All parts in output order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.input.iter().chain(self.answer.iter()).map(String::as_str)
    }

    /// Tab-joined output line.
    pub fn to_tsv(&self) -> String {
        self.fields().collect::<Vec<_>>().join("\t")
    }
}

/// Statistics for an inference run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Rows read from the dataset
    pub total_rows: usize,

    /// Batches sent to the scorer
    pub total_batches: usize,

    /// Rows whose answer span decoded to something non-empty
    pub answered: usize,

    /// Rows whose answer span was empty (inverted or all special tokens)
    pub unanswered: usize,

    /// When the run started
    pub started_at: Option<DateTime<Utc>>,

    /// Total runtime in seconds
    pub runtime_secs: f64,

    /// Rows per second throughput
    pub rows_per_sec: f64,

    /// Answered fraction (0.0 - 1.0)
    pub answer_rate: f64,
}

impl RunStats {
    /// Calculate derived stats.
    pub fn finalize(&mut self) {
        let predicted = self.answered + self.unanswered;
        if predicted > 0 {
            self.answer_rate = self.answered as f64 / predicted as f64;
        }
        if self.runtime_secs > 0.0 {
            self.rows_per_sec = predicted as f64 / self.runtime_secs;
        }
    }
}
