//! Rendering of external step commands.
//!
//! K_i: Every external step is a program plus an argv; nothing goes
//! through a shell, so arguments never need quoting.

use crate::models::{Config, StepCommand, expand_env_vars};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The external steps the sequencer knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Materialize the dataset sample
    Download,
    /// Run the test suite
    Test,
    /// Run QA inference on the sample
    Qa,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Test => "test",
            Self::Qa => "qa",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully rendered command, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub step: StepKind,
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    /// Human-readable rendering for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Arguments handed to the dataset downloader.
///
/// Rendered as `dataset output --split <split> [--shuffle] --sample-size <n>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub dataset: String,
    pub output: PathBuf,
    pub split: String,
    pub shuffle: bool,
    pub sample_size: usize,
}

impl DownloadRequest {
    pub fn from_config(config: &Config) -> Self {
        Self {
            dataset: config.dataset.name.clone(),
            output: config.sample_path(),
            split: config.dataset.split.clone(),
            shuffle: config.dataset.shuffle,
            sample_size: config.dataset.sample_size,
        }
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            self.dataset.clone(),
            path_arg(&self.output),
            "--split".to_string(),
            self.split.clone(),
        ];
        if self.shuffle {
            args.push("--shuffle".to_string());
        }
        args.push("--sample-size".to_string());
        args.push(self.sample_size.to_string());
        args
    }
}

/// Values substituted into configured step arguments.
#[derive(Debug, Clone)]
pub struct Placeholders {
    data_dir: String,
    tests_dir: String,
    src_dir: String,
    sample: String,
}

impl Placeholders {
    pub fn from_config(config: &Config) -> Self {
        Self {
            data_dir: path_arg(&config.layout.data_dir),
            tests_dir: path_arg(&config.layout.tests_dir),
            src_dir: path_arg(&config.layout.src_dir),
            sample: path_arg(&config.sample_path()),
        }
    }

    /// Expand `{name}` placeholders, then `${ENV}` variables.
    pub fn expand(&self, arg: &str) -> String {
        let replaced = arg
            .replace("{data_dir}", &self.data_dir)
            .replace("{tests_dir}", &self.tests_dir)
            .replace("{src_dir}", &self.src_dir)
            .replace("{sample}", &self.sample);
        expand_env_vars(&replaced)
    }

    /// Render a configured step into a command line, appending `extra`
    /// verbatim after the configured arguments.
    pub fn render<I>(&self, step: StepKind, command: &StepCommand, extra: I) -> CommandLine
    where
        I: IntoIterator<Item = String>,
    {
        let mut args: Vec<String> = command.args.iter().map(|a| self.expand(a)).collect();
        args.extend(extra);
        CommandLine {
            step,
            program: self.expand(&command.program),
            args,
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_args_stock() {
        let request = DownloadRequest::from_config(&Config::default());
        assert_eq!(
            request.to_args(),
            vec![
                "squad",
                "data/squad_sample.jsonl",
                "--split",
                "validation",
                "--shuffle",
                "--sample-size",
                "10"
            ]
        );
    }

    #[test]
    fn test_download_args_without_shuffle() {
        let mut config = Config::default();
        config.dataset.shuffle = false;
        config.dataset.sample_size = 3;
        let args = DownloadRequest::from_config(&config).to_args();
        assert!(!args.contains(&"--shuffle".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("3"));
    }

    #[test]
    fn test_render_expands_layout() {
        let config = Config::default();
        let placeholders = Placeholders::from_config(&config);
        let line = placeholders.render(
            StepKind::Qa,
            &config.steps.qa,
            ["data/squad_sample.jsonl".to_string()],
        );
        assert_eq!(line.program, "python");
        assert_eq!(line.args, vec!["src/transformer_qa.py", "data/squad_sample.jsonl"]);
        assert_eq!(line.display(), "python src/transformer_qa.py data/squad_sample.jsonl");
    }

    #[test]
    fn test_sample_placeholder() {
        let placeholders = Placeholders::from_config(&Config::default());
        assert_eq!(placeholders.expand("--input={sample}"), "--input=data/squad_sample.jsonl");
    }
}
