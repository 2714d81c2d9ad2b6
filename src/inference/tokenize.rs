//! Tokenizer wrapper for question/context batches.
//!
//! K_i: Sequences are truncated to `max_seq_length` and padded to the
//!      longest row of each batch.
//! B_i: The tokenizer defines CLS/SEP/PAD tokens → Result

use crate::models::{EncodedBatch, QaError, Result};
use std::path::Path;
use tokenizers::{
    EncodeInput, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams, TruncationStrategy,
};
use tracing::debug;

/// Candidate spellings for special tokens, BART style first.
const CLS_CANDIDATES: [&str; 2] = ["<s>", "[CLS]"];
const SEP_CANDIDATES: [&str; 2] = ["</s>", "[SEP]"];
const PAD_CANDIDATES: [&str; 2] = ["<pad>", "[PAD]"];

/// Meta tokens stripped from decoded text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialTokens {
    pub cls: String,
    pub sep: String,
    pub pad: String,
    pub pad_id: u32,
}

/// A `tokenizers::Tokenizer` configured for extractive QA.
pub struct QaTokenizer {
    tokenizer: Tokenizer,
    special: SpecialTokens,
    max_seq_length: usize,
}

impl QaTokenizer {
    /// Load a HuggingFace `tokenizer.json`.
    pub fn from_file(path: &Path, max_seq_length: usize) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            QaError::Tokenizer(format!("cannot load {}: {}", path.display(), e))
        })?;
        Self::new(tokenizer, max_seq_length)
    }

    /// Configure truncation and padding on an existing tokenizer.
    pub fn new(mut tokenizer: Tokenizer, max_seq_length: usize) -> Result<Self> {
        if max_seq_length == 0 {
            return Err(QaError::InvalidInput(
                "max_seq_length must be a positive integer".to_string(),
            ));
        }

        let find = |candidates: &[&str], role: &str| -> Result<(String, u32)> {
            candidates
                .iter()
                .find_map(|t| tokenizer.token_to_id(t).map(|id| (t.to_string(), id)))
                .ok_or_else(|| {
                    QaError::Tokenizer(format!("no {role} token (tried {candidates:?})"))
                })
        };
        let (cls, _) = find(&CLS_CANDIDATES, "CLS")?;
        let (sep, _) = find(&SEP_CANDIDATES, "SEP")?;
        let (pad, pad_id) = find(&PAD_CANDIDATES, "PAD")?;

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_seq_length,
                strategy: TruncationStrategy::LongestFirst,
                ..Default::default()
            }))
            .map_err(QaError::tokenizer)?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            pad_id,
            pad_token: pad.clone(),
            ..Default::default()
        }));

        debug!(%cls, %sep, %pad, pad_id, max_seq_length, "Tokenizer configured");

        Ok(Self {
            tokenizer,
            special: SpecialTokens {
                cls,
                sep,
                pad,
                pad_id,
            },
            max_seq_length,
        })
    }

    pub fn special_tokens(&self) -> &SpecialTokens {
        &self.special
    }

    pub fn max_seq_length(&self) -> usize {
        self.max_seq_length
    }

    /// Tokenize a batch. Each row holds one text (single) or two (pair).
    pub fn encode_batch(&self, rows: &[Vec<&str>]) -> Result<EncodedBatch> {
        let inputs = rows
            .iter()
            .enumerate()
            .map(|(i, texts)| match texts.as_slice() {
                [single] => Ok(EncodeInput::Single((*single).into())),
                [first, second] => Ok(EncodeInput::Dual((*first).into(), (*second).into())),
                other => Err(QaError::InvalidInput(format!(
                    "Row {}: expected 1 or 2 texts, got {}",
                    i + 1,
                    other.len()
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(QaError::tokenizer)?;

        Ok(EncodedBatch {
            input_ids: encodings.iter().map(|e| e.get_ids().to_vec()).collect(),
            attention_mask: encodings
                .iter()
                .map(|e| e.get_attention_mask().to_vec())
                .collect(),
        })
    }

    /// Decode every row, keeping special tokens.
    pub fn decode_batch(&self, ids: &[Vec<u32>]) -> Result<Vec<String>> {
        let rows: Vec<&[u32]> = ids.iter().map(Vec::as_slice).collect();
        self.tokenizer
            .decode_batch(&rows, false)
            .map_err(QaError::tokenizer)
    }
}
