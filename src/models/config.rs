//! Configuration models for squad-qa.
//!
//! All I^R (resolvable ignorance) is parameterized here.
//! Every section has defaults, so running without a config file
//! reproduces the stock `fetch` / `run` targets.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Top-level configuration for squad-qa.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Directory layout of the project being driven
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Dataset sample settings
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// External step commands
    #[serde(default)]
    pub steps: StepsConfig,

    /// Native inference settings
    #[serde(default)]
    pub inference: InferenceConfig,
}

/// Directory layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Directory holding data artifacts
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory holding the test scripts
    #[serde(default = "default_tests_dir")]
    pub tests_dir: PathBuf,

    /// Directory holding the source scripts
    #[serde(default = "default_src_dir")]
    pub src_dir: PathBuf,

    /// Working directory for every external step
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_tests_dir() -> PathBuf {
    PathBuf::from("tests")
}

fn default_src_dir() -> PathBuf {
    PathBuf::from("src")
}

fn default_workdir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            tests_dir: default_tests_dir(),
            src_dir: default_src_dir(),
            workdir: default_workdir(),
        }
    }
}

/// Dataset sample configuration.
///
/// K_i: The stock sample is 10 shuffled rows of the SQuAD validation split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Dataset identifier passed to the downloader
    #[serde(default = "default_dataset_name")]
    pub name: String,

    /// Sample file name, relative to `layout.data_dir`
    #[serde(default = "default_sample_file")]
    pub sample_file: PathBuf,

    /// Split to sample from
    #[serde(default = "default_split")]
    pub split: String,

    /// Shuffle before sampling
    #[serde(default = "default_true")]
    pub shuffle: bool,

    /// Number of rows to sample
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

fn default_dataset_name() -> String {
    "squad".to_string()
}

fn default_sample_file() -> PathBuf {
    PathBuf::from("squad_sample.jsonl")
}

fn default_split() -> String {
    "validation".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sample_size() -> usize {
    10
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            name: default_dataset_name(),
            sample_file: default_sample_file(),
            split: default_split(),
            shuffle: default_true(),
            sample_size: default_sample_size(),
        }
    }
}

/// An external program plus its leading arguments.
///
/// Arguments may reference `{data_dir}`, `{tests_dir}`, `{src_dir}`,
/// `{sample}` and `${ENV_VAR}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCommand {
    /// Program to execute (looked up on PATH)
    pub program: String,

    /// Arguments placed before any step-specific arguments
    #[serde(default)]
    pub args: Vec<String>,
}

impl StepCommand {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Commands for the three external steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepsConfig {
    /// Dataset downloader
    #[serde(default = "default_download_step")]
    pub download: StepCommand,

    /// Test runner
    #[serde(default = "default_test_step")]
    pub test: StepCommand,

    /// QA inference tool (the sample path is appended)
    #[serde(default = "default_qa_step")]
    pub qa: StepCommand,
}

fn default_download_step() -> StepCommand {
    StepCommand::new("python", &["{src_dir}/download_dataset.py"])
}

fn default_test_step() -> StepCommand {
    StepCommand::new("python", &["{tests_dir}/test_transformer_qa.py"])
}

fn default_qa_step() -> StepCommand {
    StepCommand::new("python", &["{src_dir}/transformer_qa.py"])
}

impl Default for StepsConfig {
    fn default() -> Self {
        Self {
            download: default_download_step(),
            test: default_test_step(),
            qa: default_qa_step(),
        }
    }
}

/// Native inference configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Model identifier sent to the scoring endpoint
    #[serde(default = "default_model")]
    pub model: String,

    /// Span scoring endpoint URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// API key (can also be set via `api_key_env`)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable name for the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum attempts per batch
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Local tokenizer file (HuggingFace `tokenizer.json`)
    #[serde(default = "default_tokenizer_path")]
    pub tokenizer_path: PathBuf,

    /// Where to fetch the tokenizer from when `tokenizer_path` is missing
    #[serde(default = "default_tokenizer_url")]
    pub tokenizer_url: String,

    /// Rows per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Sequences longer than this many tokens are truncated
    #[serde(default = "default_max_seq_length")]
    pub max_seq_length: usize,

    /// Dataset columns fed to the tokenizer, in order
    #[serde(default = "default_text_columns")]
    pub text_columns: Vec<String>,
}

fn default_model() -> String {
    "a-ware/bart-squadv2".to_string()
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8080/v1/span-scores".to_string()
}

fn default_api_key_env() -> String {
    "QA_SCORER_API_KEY".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_tokenizer_path() -> PathBuf {
    PathBuf::from("data/tokenizer.json")
}

fn default_tokenizer_url() -> String {
    "https://huggingface.co/facebook/bart-large/resolve/main/tokenizer.json".to_string()
}

fn default_batch_size() -> usize {
    8
}

fn default_max_seq_length() -> usize {
    256
}

fn default_text_columns() -> Vec<String> {
    vec!["question".to_string(), "context".to_string()]
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            endpoint: default_endpoint(),
            api_key: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            tokenizer_path: default_tokenizer_path(),
            tokenizer_url: default_tokenizer_url(),
            batch_size: default_batch_size(),
            max_seq_length: default_max_seq_length(),
            text_columns: default_text_columns(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::ParseStr(source) => ConfigError::Parse {
                path: path.to_owned(),
                source,
            },
            other => other,
        })
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::ParseStr)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dataset.sample_size == 0 {
            return Err(ConfigError::Invalid(
                "dataset.sample_size must be a positive integer".to_string(),
            ));
        }
        if self.inference.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "inference.batch_size must be a positive integer".to_string(),
            ));
        }
        if self.inference.max_seq_length == 0 {
            return Err(ConfigError::Invalid(
                "inference.max_seq_length must be a positive integer".to_string(),
            ));
        }
        if !(1..=2).contains(&self.inference.text_columns.len()) {
            return Err(ConfigError::Invalid(format!(
                "inference.text_columns must name 1 or 2 columns, got {}",
                self.inference.text_columns.len()
            )));
        }
        for (name, step) in [
            ("download", &self.steps.download),
            ("test", &self.steps.test),
            ("qa", &self.steps.qa),
        ] {
            if step.program.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "steps.{name}.program must not be empty"
                )));
            }
        }
        Ok(())
    }

    /// Path of the dataset sample file.
    pub fn sample_path(&self) -> PathBuf {
        self.layout.data_dir.join(&self.dataset.sample_file)
    }

    /// Resolve the scorer API key from config or environment.
    ///
    /// B_i(api key available) → Option: local scorers need none.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = &self.inference.api_key {
            return Some(expand_env_vars(key));
        }
        std::env::var(&self.inference.api_key_env).ok()
    }
}

static ENV_VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    ENV_VAR_PATTERN
        .replace_all(s, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Configuration errors.
///
/// Epistemic origin:
/// - B_i falsified: File not found, parse error
/// - I^B materialized: Out-of-range values
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to parse config: {0}")]
    ParseStr(toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_stock_targets() {
        let config = Config::default();
        assert_eq!(config.sample_path(), PathBuf::from("data/squad_sample.jsonl"));
        assert_eq!(config.dataset.name, "squad");
        assert_eq!(config.dataset.split, "validation");
        assert!(config.dataset.shuffle);
        assert_eq!(config.dataset.sample_size, 10);
        assert_eq!(config.inference.batch_size, 8);
        assert_eq!(config.inference.max_seq_length, 256);
        assert_eq!(config.inference.text_columns, vec!["question", "context"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.steps, StepsConfig::default());
        assert_eq!(config.layout.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_partial_override() {
        let config = Config::from_toml(
            r#"
[layout]
data_dir = "cache"

[dataset]
sample_size = 25
shuffle = false

[steps.test]
program = "pytest"
args = ["-q", "{tests_dir}"]
"#,
        )
        .unwrap();

        assert_eq!(config.sample_path(), PathBuf::from("cache/squad_sample.jsonl"));
        assert_eq!(config.dataset.sample_size, 25);
        assert!(!config.dataset.shuffle);
        assert_eq!(config.dataset.split, "validation");
        assert_eq!(config.steps.test, StepCommand::new("pytest", &["-q", "{tests_dir}"]));
        assert_eq!(config.steps.qa, default_qa_step());
    }

    #[test]
    fn test_rejects_zero_sample_size() {
        let err = Config::from_toml("[dataset]\nsample_size = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_three_text_columns() {
        let err = Config::from_toml("[inference]\ntext_columns = [\"a\", \"b\", \"c\"]\n")
            .unwrap_err();
        assert!(err.to_string().contains("1 or 2 columns"));
    }

    #[test]
    fn test_from_file_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[dataset\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_expand_env_vars_leaves_unknown() {
        assert_eq!(
            expand_env_vars("token-${SQUAD_QA_SURELY_UNSET_VAR}"),
            "token-${SQUAD_QA_SURELY_UNSET_VAR}"
        );
        assert_eq!(expand_env_vars("plain"), "plain");
    }
}
