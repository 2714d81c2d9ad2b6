//! Error types for squad-qa.
//!
//! Epistemic taxonomy:
//! - B_i falsified: Expected failures (bad input, failed step)
//! - I^B materialized: Infrastructure failures (network, timeout, spawn)
//! - K_i violated: Internal invariant violations (bugs)

use thiserror::Error;

/// Top-level error type for squad-qa.
#[derive(Debug, Error)]
pub enum QaError {
    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED: Belief proven wrong (expected failures)
    // ═══════════════════════════════════════════════════════════════════
    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid text column names {columns:?}: {reason}")]
    InvalidColumns {
        columns: Vec<String>,
        reason: String,
    },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Step '{step}' failed with {}", describe_code(.code))]
    StepFailed { step: String, code: Option<i32> },

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    // ═══════════════════════════════════════════════════════════════════
    // I^B MATERIALIZED: Bounded ignorance became known-bad
    // ═══════════════════════════════════════════════════════════════════
    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Scorer API error: {0}")]
    ScorerApi(#[from] ScorerError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("GET {url} returned status {status}: {message}")]
    Download {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // K_i VIOLATED: Invariant broken (bug, should not happen)
    // ═══════════════════════════════════════════════════════════════════
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Span scoring endpoint errors.
#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    #[error("Model not found at endpoint: {0}")]
    ModelNotFound(String),

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request failed after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl QaError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a tokenizer error from the `tokenizers` crate's boxed error.
    pub fn tokenizer(err: impl std::fmt::Display) -> Self {
        Self::Tokenizer(err.to_string())
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::RateLimited { .. }
                | Self::Network(_)
                | Self::ScorerApi(ScorerError::ApiError { status: 500..=599, .. })
        )
    }

    /// Exit code to hand back to the shell for this error.
    ///
    /// Failed steps propagate their own code; everything else is 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::StepFailed { code: Some(c), .. } if *c != 0 => *c,
            _ => 1,
        }
    }
}

/// Result type alias for squad-qa.
pub type Result<T> = std::result::Result<T, QaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_failed_message() {
        let err = QaError::StepFailed {
            step: "test".to_string(),
            code: Some(2),
        };
        assert_eq!(err.to_string(), "Step 'test' failed with exit code 2");
        assert_eq!(err.exit_code(), 2);

        let err = QaError::StepFailed {
            step: "qa".to_string(),
            code: None,
        };
        assert!(err.to_string().contains("terminated by signal"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_retryable() {
        assert!(QaError::RateLimited {
            retry_after_secs: 1.0
        }
        .is_retryable());
        assert!(
            QaError::ScorerApi(ScorerError::ApiError {
                status: 503,
                message: "busy".to_string()
            })
            .is_retryable()
        );
        assert!(!QaError::ScorerApi(ScorerError::AuthenticationFailed).is_retryable());
        assert!(!QaError::InvalidInput("x".to_string()).is_retryable());
    }
}
