//! Detokenization and cleanup of decoded batches.

use super::{QaTokenizer, SpecialTokens};
use crate::models::{QaError, Result};
use regex::Regex;

/// Build a pattern matching any of the tokenizer's meta tokens.
pub fn cleaning_pattern(special: &SpecialTokens) -> Result<Regex> {
    let alternation = [&special.cls, &special.pad, &special.sep]
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&alternation).map_err(|e| QaError::Internal(format!("cleaning pattern: {e}")))
}

/// Decode a batch of IDs and split every row on the separator token.
///
/// A question/context pair decodes to several parts (question, empty gaps
/// between doubled separators, context); `clean_decoded_batch` drops the
/// empty ones.
pub fn decode_input(input_ids: &[Vec<u32>], tokenizer: &QaTokenizer) -> Result<Vec<Vec<String>>> {
    let sep = &tokenizer.special_tokens().sep;
    Ok(tokenizer
        .decode_batch(input_ids)?
        .iter()
        .map(|seq| seq.split(sep.as_str()).map(str::to_string).collect())
        .collect())
}

/// Remove meta tokens, trim, and drop parts left empty.
///
/// Row structure is otherwise unchanged.
pub fn clean_decoded_batch(decoded: Vec<Vec<String>>, pattern: &Regex) -> Vec<Vec<String>> {
    decoded
        .into_iter()
        .map(|parts| {
            parts
                .iter()
                .map(|part| pattern.replace_all(part, "").trim().to_string())
                .filter(|part| !part.is_empty())
                .collect()
        })
        .collect()
}
