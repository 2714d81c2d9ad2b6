//! Extractive QA inference pipeline.
//!
//! Pipeline flow:
//! Records → Tokenize (batch) → Span Scorer → Extract Answer → Decode/Clean → TSV

use super::{
    QaTokenizer, clean_decoded_batch, cleaning_pattern, decode_input, extract_answer, text_fields,
    validate_text_columns,
};
use crate::client::SpanScorer;
use crate::models::{Prediction, QaError, QaRecord, Result, RunStats};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use std::io::Write;
use std::time::Instant;
use tracing::info;

/// QA pipeline over a loaded dataset.
pub struct QaPipeline<S: SpanScorer> {
    tokenizer: QaTokenizer,
    scorer: S,
    columns: Vec<String>,
    batch_size: usize,
    pattern: Regex,
}

impl<S: SpanScorer> QaPipeline<S> {
    /// Create a new pipeline.
    ///
    /// Fails if the text columns are invalid or `batch_size` is zero.
    pub fn new(
        tokenizer: QaTokenizer,
        scorer: S,
        columns: Vec<String>,
        batch_size: usize,
    ) -> Result<Self> {
        validate_text_columns(&columns)?;
        if batch_size == 0 {
            return Err(QaError::InvalidInput(
                "batch_size must be a positive integer".to_string(),
            ));
        }
        let pattern = cleaning_pattern(tokenizer.special_tokens())?;

        Ok(Self {
            tokenizer,
            scorer,
            columns,
            batch_size,
            pattern,
        })
    }

    /// Predict answers for one batch of records.
    ///
    /// `offset` is the index of the first record, used in error messages.
    pub async fn predict_batch(&self, records: &[QaRecord], offset: usize) -> Result<Vec<Prediction>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let texts = records
            .iter()
            .enumerate()
            .map(|(i, record)| text_fields(record, &self.columns, offset + i))
            .collect::<Result<Vec<_>>>()?;

        let batch = self.tokenizer.encode_batch(&texts)?;
        let scores = self.scorer.score(&batch).await?;
        let pad_id = self.tokenizer.special_tokens().pad_id;
        let answers = extract_answer(&batch.input_ids, &scores, pad_id)?;

        let inputs = clean_decoded_batch(decode_input(&batch.input_ids, &self.tokenizer)?, &self.pattern);
        let answers = clean_decoded_batch(decode_input(&answers, &self.tokenizer)?, &self.pattern);

        Ok(inputs
            .into_iter()
            .zip(answers)
            .map(|(input, answer)| Prediction { input, answer })
            .collect())
    }

    /// Run over every record, writing one tab-separated line per row.
    pub async fn run<W: Write>(&self, records: &[QaRecord], out: &mut W) -> Result<RunStats> {
        let start = Instant::now();
        let total = records.len();

        let mut stats = RunStats {
            total_rows: total,
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        info!(
            total_rows = total,
            batch_size = self.batch_size,
            columns = ?self.columns,
            "Starting QA inference"
        );

        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
                .map_err(|e| QaError::Internal(format!("progress template: {e}")))?
                .progress_chars("##-"),
        );

        for (batch_idx, chunk) in records.chunks(self.batch_size).enumerate() {
            let offset = batch_idx * self.batch_size;
            let predictions = self.predict_batch(chunk, offset).await?;
            stats.total_batches += 1;

            for prediction in &predictions {
                if prediction.answer.is_empty() {
                    stats.unanswered += 1;
                } else {
                    stats.answered += 1;
                }
                writeln!(out, "{}", prediction.to_tsv())
                    .map_err(|e| QaError::io("writing predictions", e))?;
            }

            out.flush()
                .map_err(|e| QaError::io("flushing predictions", e))?;

            pb.set_position((offset + chunk.len()) as u64);
            pb.set_message(format!("answered: {}", stats.answered));
        }

        pb.finish_with_message(format!(
            "Done! {} answered, {} without answer",
            stats.answered, stats.unanswered
        ));

        stats.runtime_secs = start.elapsed().as_secs_f64();
        stats.finalize();

        info!(
            answered = stats.answered,
            unanswered = stats.unanswered,
            answer_rate = format!("{:.1}%", stats.answer_rate * 100.0),
            throughput = format!("{:.1} rows/s", stats.rows_per_sec),
            "QA inference complete"
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::test_support::{PointAtToken, word_level_tokenizer};

    fn record(question: &str, context: &str) -> QaRecord {
        let mut record = QaRecord::new();
        record.insert("question".to_string(), question.into());
        record.insert("context".to_string(), context.into());
        record
    }

    fn columns() -> Vec<String> {
        vec!["question".to_string(), "context".to_string()]
    }

    #[tokio::test]
    async fn test_predicts_question_context_answer() {
        // Span = first "shakespeare" (id 7) through first "hamlet" (id 8).
        let scorer = PointAtToken { start: 7, end: 8 };
        let pipeline = QaPipeline::new(word_level_tokenizer(64), scorer, columns(), 8).unwrap();

        let predictions = pipeline
            .predict_batch(&[record("who wrote it", "shakespeare wrote hamlet")], 0)
            .await
            .unwrap();

        assert_eq!(predictions.len(), 1);
        assert_eq!(
            predictions[0].to_tsv(),
            "who wrote it\tshakespeare wrote hamlet\tshakespeare wrote hamlet"
        );
    }

    #[tokio::test]
    async fn test_inverted_span_gives_no_answer() {
        // "hamlet" comes after "wrote", so start > end.
        let scorer = PointAtToken { start: 8, end: 4 };
        let pipeline = QaPipeline::new(word_level_tokenizer(64), scorer, columns(), 8).unwrap();

        let predictions = pipeline
            .predict_batch(&[record("who wrote it", "shakespeare wrote hamlet")], 0)
            .await
            .unwrap();

        assert!(predictions[0].answer.is_empty());
        assert_eq!(predictions[0].input, vec!["who wrote it", "shakespeare wrote hamlet"]);
    }

    #[tokio::test]
    async fn test_run_writes_one_line_per_row_across_batches() {
        let scorer = PointAtToken { start: 10, end: 10 };
        let pipeline = QaPipeline::new(word_level_tokenizer(64), scorer, columns(), 2).unwrap();
        let records = vec![
            record("what is the capital", "paris is the capital"),
            record("what is it", "it is paris"),
            record("who wrote hamlet", "shakespeare wrote hamlet"),
        ];

        let mut out = Vec::new();
        let stats = pipeline.run(&records, &mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "what is the capital\tparis is the capital\tparis");
        assert_eq!(lines[1], "what is it\tit is paris\tparis");
        assert_eq!(lines[2], "who wrote hamlet\tshakespeare wrote hamlet");
        assert_eq!(stats.total_rows, 3);
        assert_eq!(stats.total_batches, 2);
        assert_eq!(stats.answered, 2);
        assert_eq!(stats.unanswered, 1);
    }

    #[tokio::test]
    async fn test_missing_column_reports_row() {
        let scorer = PointAtToken { start: 7, end: 7 };
        let pipeline = QaPipeline::new(word_level_tokenizer(64), scorer, columns(), 2).unwrap();
        let mut broken = QaRecord::new();
        broken.insert("question".to_string(), "who".into());
        let records = vec![record("who", "hamlet"), record("who", "it"), broken];

        let err = pipeline.run(&records, &mut Vec::new()).await.unwrap_err();
        assert!(err.to_string().contains("Row 3: missing column 'context'"));
    }

    #[test]
    fn test_rejects_tokenizer_output_column() {
        let scorer = PointAtToken { start: 0, end: 0 };
        let result = QaPipeline::new(
            word_level_tokenizer(64),
            scorer,
            vec!["input_ids".to_string()],
            8,
        );
        assert!(matches!(result, Err(QaError::InvalidColumns { .. })));
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let scorer = PointAtToken { start: 0, end: 0 };
        assert!(QaPipeline::new(word_level_tokenizer(64), scorer, columns(), 0).is_err());
    }
}
