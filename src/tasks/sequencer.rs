//! Task sequencer: dataset sample, then test, then QA.
//!
//! Flow:
//! sample missing? → download → test → (exit 0?) → QA inference
//!
//! K_i: Steps run one at a time, each awaited to completion.
//! K_i: QA inference never runs after a failed test step.

use super::{CommandLine, DownloadRequest, Placeholders, ProcessRunner, StepKind};
use crate::models::{Config, QaError, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Whether the dataset sample had to be downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStatus {
    /// The sample file already existed; the downloader was not invoked
    Present,
    /// The downloader ran and exited 0
    Downloaded,
}

/// Result of one external step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step: StepKind,
    /// Exit code, `None` when the process died from a signal
    pub code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl StepOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Convert a failed outcome into an error.
    pub fn into_result(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(QaError::StepFailed {
                step: self.step.to_string(),
                code: self.code,
            })
        }
    }
}

/// Result of the test-then-QA pipeline.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub test: StepOutcome,
    /// `None` exactly when the test step failed
    pub qa: Option<StepOutcome>,
}

impl PipelineReport {
    /// Tests passed and QA inference exited 0.
    pub fn is_success(&self) -> bool {
        self.test.success() && self.qa.as_ref().is_some_and(StepOutcome::success)
    }

    /// Exit code for the whole pipeline: the first failing step's code,
    /// 1 if that step has none, 0 on success.
    pub fn exit_code(&self) -> i32 {
        let failed = std::iter::once(&self.test)
            .chain(self.qa.as_ref())
            .find(|outcome| !outcome.success());
        match failed {
            None => 0,
            Some(outcome) => match outcome.code {
                Some(c) if c != 0 => c,
                _ => 1,
            },
        }
    }
}

/// Sequences the download, test and QA steps.
pub struct TaskSequencer<R: ProcessRunner> {
    config: Config,
    runner: R,
    placeholders: Placeholders,
}

impl<R: ProcessRunner> TaskSequencer<R> {
    pub fn new(config: Config, runner: R) -> Self {
        let placeholders = Placeholders::from_config(&config);
        Self {
            config,
            runner,
            placeholders,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Sample path as passed to external steps (relative to the workdir).
    pub fn sample_path(&self) -> PathBuf {
        self.config.sample_path()
    }

    /// Resolve a workdir-relative path for filesystem checks.
    fn on_disk(&self, path: &Path) -> PathBuf {
        self.config.layout.workdir.join(path)
    }

    /// Ensure the stock dataset sample exists.
    pub async fn fetch(&self) -> Result<SampleStatus> {
        let request = DownloadRequest::from_config(&self.config);
        self.ensure_dataset_sample(&request).await
    }

    /// Ensure `request.output` exists, downloading it if absent.
    ///
    /// B_i(sample exists) → skip the downloader entirely
    /// B_i(downloader succeeds) → Result
    pub async fn ensure_dataset_sample(&self, request: &DownloadRequest) -> Result<SampleStatus> {
        let target = self.on_disk(&request.output);
        if target.exists() {
            info!(path = %request.output.display(), "Dataset sample present, skipping download");
            return Ok(SampleStatus::Present);
        }

        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| QaError::io(format!("creating {}", parent.display()), e))?;
        }

        info!(
            dataset = %request.dataset,
            split = %request.split,
            sample_size = request.sample_size,
            path = %request.output.display(),
            "Downloading dataset sample"
        );

        let command =
            self.placeholders
                .render(StepKind::Download, &self.config.steps.download, request.to_args());
        self.run_step(&command).await?.into_result()?;
        Ok(SampleStatus::Downloaded)
    }

    /// Run the test step, then QA inference on the sample if tests pass.
    pub async fn run_qa_pipeline(&self) -> Result<PipelineReport> {
        let test_cmd = self
            .placeholders
            .render(StepKind::Test, &self.config.steps.test, std::iter::empty());
        let test = self.run_step(&test_cmd).await?;

        if !test.success() {
            warn!(code = ?test.code, "Tests failed, skipping QA inference");
            return Ok(PipelineReport { test, qa: None });
        }

        let sample = self.sample_path().to_string_lossy().into_owned();
        let qa_cmd = self
            .placeholders
            .render(StepKind::Qa, &self.config.steps.qa, [sample]);
        let qa = self.run_step(&qa_cmd).await?;

        if !qa.success() {
            warn!(code = ?qa.code, "QA inference failed");
        }
        Ok(PipelineReport { test, qa: Some(qa) })
    }

    /// `fetch` followed by `run_qa_pipeline`.
    pub async fn qa_on_squad(&self) -> Result<PipelineReport> {
        self.fetch().await?;
        self.run_qa_pipeline().await
    }

    async fn run_step(&self, command: &CommandLine) -> Result<StepOutcome> {
        let started_at = Utc::now();
        let start = Instant::now();
        info!(step = %command.step, "Running {}", command.display());

        let code = self.runner.run(command).await?;
        let outcome = StepOutcome {
            step: command.step,
            code,
            started_at,
            duration: start.elapsed(),
        };

        info!(
            step = %outcome.step,
            code = ?outcome.code,
            elapsed_ms = outcome.duration.as_millis() as u64,
            "Step finished"
        );
        Ok(outcome)
    }
}
