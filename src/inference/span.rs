//! Answer span extraction from start/end scores.
//!
//! K_i: The answer is the token range [argmax(start), argmax(end)].
//! K_i: The output keeps the input's shape; tokens outside the span
//!      become padding.

use crate::models::{EncodedBatch, QaError, Result, SpanScores};

/// Index of the largest score; the first one wins on ties.
///
/// NaN scores never win. Returns `None` for an empty or all-NaN slice.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i)
}

/// Check that `scores` has one row per batch row, each `seq_len` wide.
pub fn check_scores_shape(batch: &EncodedBatch, scores: &SpanScores) -> Result<()> {
    let expected = format!("{} x {}", batch.len(), batch.seq_len());
    for (name, matrix) in [("start", &scores.start), ("end", &scores.end)] {
        let rows_ok = matrix.len() == batch.len();
        let cols_ok = matrix
            .iter()
            .zip(&batch.input_ids)
            .all(|(scores_row, ids_row)| scores_row.len() == ids_row.len());
        if !rows_ok || !cols_ok {
            let widths: Vec<usize> = matrix.iter().map(Vec::len).collect();
            return Err(QaError::ShapeMismatch {
                expected: format!("{name} scores {expected}"),
                actual: format!("{} rows with widths {:?}", matrix.len(), widths),
            });
        }
    }
    Ok(())
}

/// Extract answer token IDs from input IDs.
///
/// For each row the positions `argmax(start) ..= argmax(end)` keep their
/// token; every other position is replaced with `pad_id`. An inverted span
/// (end before start) yields a row of padding.
pub fn extract_answer(input_ids: &[Vec<u32>], scores: &SpanScores, pad_id: u32) -> Result<Vec<Vec<u32>>> {
    if scores.start.len() != input_ids.len() || scores.end.len() != input_ids.len() {
        return Err(QaError::ShapeMismatch {
            expected: format!("{} score rows", input_ids.len()),
            actual: format!("{} start / {} end", scores.start.len(), scores.end.len()),
        });
    }

    input_ids
        .iter()
        .zip(scores.start.iter().zip(&scores.end))
        .map(|(ids, (start_row, end_row))| {
            if start_row.len() != ids.len() || end_row.len() != ids.len() {
                return Err(QaError::ShapeMismatch {
                    expected: format!("{} scores per row", ids.len()),
                    actual: format!("{} start / {} end", start_row.len(), end_row.len()),
                });
            }
            let span = argmax(start_row).zip(argmax(end_row));
            Ok(ids
                .iter()
                .enumerate()
                .map(|(pos, &id)| match span {
                    Some((start, end)) if start <= pos && pos <= end => id,
                    _ => pad_id,
                })
                .collect())
        })
        .collect()
}
