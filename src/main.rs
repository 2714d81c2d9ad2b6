//! squad-qa CLI - SQuAD sample download, test gating and QA inference.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use squad_qa::tasks::SampleStatus;
use squad_qa::{
    Config, DryRunner, HttpSpanScorer, ProcessRunner, QaError, QaPipeline, QaTokenizer,
    SystemRunner, TaskSequencer, ensure_tokenizer, load_jsonl_dataset,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "squad-qa")]
#[command(version)]
#[command(about = "Download a SQuAD sample, run the tests, then extractive QA on it")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print external commands instead of running them
    #[arg(short = 'n', long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the dataset sample if it is missing
    Fetch,

    /// Fetch the sample, run the tests, then QA inference if tests pass
    Run,

    /// Run extractive QA over a JSON-lines dataset
    Infer {
        /// Path to the JSON-lines dataset
        dataset: PathBuf,

        /// Text columns to encode (one, or a question/context pair)
        #[arg(num_args = 0..=2)]
        columns: Vec<String>,

        /// Maximum tokens per encoded row
        #[arg(long, value_parser = positive_usize)]
        max_seq_length: Option<usize>,

        /// Rows per scorer request
        #[arg(long, value_parser = positive_usize)]
        batch_size: Option<usize>,

        /// Write predictions here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

/// Subcommands driven by the task sequencer.
#[derive(Clone, Copy)]
enum Target {
    Fetch,
    Run,
}

fn positive_usize(s: &str) -> std::result::Result<usize, String> {
    match s.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        Ok(_) => Err("must be a positive integer".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn print_example_config() {
    let example = r#"# squad-qa configuration file
# Every key is optional; the values below are the defaults.

[layout]
data_dir = "data"
tests_dir = "tests"
src_dir = "src"
# Directory external steps run in
workdir = "."

[dataset]
name = "squad"
sample_file = "squad_sample.jsonl"
split = "validation"
shuffle = true
sample_size = 10

# Placeholders: {data_dir} {tests_dir} {src_dir} {sample}, plus ${ENV_VAR}
[steps.download]
program = "python"
args = ["{src_dir}/download_dataset.py"]

[steps.test]
program = "python"
args = ["{tests_dir}/test_transformer_qa.py"]

# The sample path is appended as the last argument
[steps.qa]
program = "python"
args = ["{src_dir}/transformer_qa.py"]

[inference]
model = "a-ware/bart-squadv2"
endpoint = "http://127.0.0.1:8080/v1/span-scores"
# API key (can also use the env var named by api_key_env)
# api_key = "${QA_SCORER_API_KEY}"
api_key_env = "QA_SCORER_API_KEY"
timeout_secs = 60
max_retries = 3
tokenizer_path = "data/tokenizer.json"
tokenizer_url = "https://huggingface.co/facebook/bart-large/resolve/main/tokenizer.json"
batch_size = 8
max_seq_length = 256
text_columns = ["question", "context"]
"#;
    println!("{example}");
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    Config::load(path.map(PathBuf::as_path))
        .with_context(|| format!("Failed to load config from {path:?}"))
}

/// Codes outside 0..=255 (negative or too large) become 1.
fn shell_code(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(shell_code(code))
}

/// Report a library error, returning the shell exit code it maps to.
fn report_failure(err: &QaError) -> ExitCode {
    error!("{err}");
    exit_code(err.exit_code())
}

async fn run_tasks<R: ProcessRunner>(target: Target, config: Config, runner: R) -> ExitCode {
    let sequencer = TaskSequencer::new(config, runner);

    match target {
        Target::Fetch => match sequencer.fetch().await {
            Ok(SampleStatus::Present) => {
                info!(path = %sequencer.sample_path().display(), "Sample already present");
                ExitCode::SUCCESS
            }
            Ok(SampleStatus::Downloaded) => {
                info!(path = %sequencer.sample_path().display(), "Sample downloaded");
                ExitCode::SUCCESS
            }
            Err(e) => report_failure(&e),
        },

        Target::Run => match sequencer.qa_on_squad().await {
            Ok(report) => {
                println!("\n=== QA on SQuAD ===");
                println!(
                    "Tests:   {} ({:.1}s)",
                    describe(report.test.code),
                    report.test.duration.as_secs_f64()
                );
                match &report.qa {
                    Some(qa) => println!(
                        "QA:      {} ({:.1}s)",
                        describe(qa.code),
                        qa.duration.as_secs_f64()
                    ),
                    None => println!("QA:      skipped"),
                }
                if !report.is_success() {
                    warn!("Pipeline failed");
                }
                exit_code(report.exit_code())
            }
            Err(e) => report_failure(&e),
        },
    }
}

async fn run_target(target: Target, config_path: Option<&PathBuf>, dry_run: bool) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let code = if dry_run {
        run_tasks(target, config, DryRunner).await
    } else {
        let runner = SystemRunner::new(config.layout.workdir.clone());
        run_tasks(target, config, runner).await
    };
    Ok(code)
}

fn describe(code: Option<i32>) -> String {
    match code {
        Some(0) => "ok".to_string(),
        Some(c) => format!("failed (exit {c})"),
        None => "failed (signal)".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Example => {
            print_example_config();
            Ok(ExitCode::SUCCESS)
        }

        Commands::Validate => {
            let config = load_config(cli.config.as_ref())?;

            info!("Configuration is valid");
            info!("  Sample: {}", config.sample_path().display());
            info!(
                "  Dataset: {} ({}, {} rows, shuffle={})",
                config.dataset.name,
                config.dataset.split,
                config.dataset.sample_size,
                config.dataset.shuffle
            );
            info!("  Test step: {}", config.steps.test.program);
            info!("  QA step: {}", config.steps.qa.program);
            info!(
                "  Scorer: {} at {} (api key: {})",
                config.inference.model,
                config.inference.endpoint,
                if config.resolve_api_key().is_some() { "set" } else { "none" }
            );
            Ok(ExitCode::SUCCESS)
        }

        Commands::Fetch => run_target(Target::Fetch, cli.config.as_ref(), cli.dry_run).await,

        Commands::Run => run_target(Target::Run, cli.config.as_ref(), cli.dry_run).await,

        Commands::Infer {
            dataset,
            columns,
            max_seq_length,
            batch_size,
            output,
        } => {
            let mut config = load_config(cli.config.as_ref())?;

            // CLI overrides config
            if !columns.is_empty() {
                config.inference.text_columns = columns;
            }
            if let Some(n) = max_seq_length {
                config.inference.max_seq_length = n;
            }
            if let Some(n) = batch_size {
                config.inference.batch_size = n;
            }

            let records = load_jsonl_dataset(&dataset)
                .with_context(|| format!("Failed to load dataset from {dataset:?}"))?;

            let tokenizer_path = ensure_tokenizer(&config.inference)
                .await
                .context("Failed to obtain tokenizer")?;
            let tokenizer =
                QaTokenizer::from_file(&tokenizer_path, config.inference.max_seq_length)?;

            let scorer =
                HttpSpanScorer::from_config(&config.inference, config.resolve_api_key())?;

            let pipeline = QaPipeline::new(
                tokenizer,
                scorer,
                config.inference.text_columns.clone(),
                config.inference.batch_size,
            )?;

            let stats = match &output {
                Some(path) => {
                    let file = File::create(path)
                        .with_context(|| format!("Failed to create output {path:?}"))?;
                    let mut writer = BufWriter::new(file);
                    let stats = pipeline.run(&records, &mut writer).await?;
                    writer.flush().context("Failed to flush output")?;
                    stats
                }
                None => {
                    let stdout = std::io::stdout();
                    let mut writer = stdout.lock();
                    pipeline.run(&records, &mut writer).await?
                }
            };

            eprintln!("\n=== QA Inference Complete ===");
            eprintln!("Rows:        {}", stats.total_rows);
            eprintln!("Batches:     {}", stats.total_batches);
            eprintln!("Answered:    {}", stats.answered);
            eprintln!("No answer:   {}", stats.unanswered);
            eprintln!("Answer rate: {:.1}%", stats.answer_rate * 100.0);
            eprintln!("Throughput:  {:.1} rows/s", stats.rows_per_sec);
            eprintln!("Runtime:     {:.1}s", stats.runtime_secs);
            if let Some(path) = &output {
                eprintln!("Output:      {path:?}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_code() {
        assert_eq!(shell_code(0), 0);
        assert_eq!(shell_code(4), 4);
        assert_eq!(shell_code(-1), 1);
        assert_eq!(shell_code(300), 1);
    }

    #[test]
    fn test_task_subcommands_parse() {
        let cli = Cli::try_parse_from(["squad-qa", "--dry-run", "fetch"]).unwrap();
        assert!(cli.dry_run);
        assert!(matches!(cli.command, Commands::Fetch));

        let cli = Cli::try_parse_from(["squad-qa", "run", "-c", "qa.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::Run));
        assert_eq!(cli.config, Some(PathBuf::from("qa.toml")));
    }

    #[test]
    fn test_infer_rejects_zero_batch_size() {
        assert!(Cli::try_parse_from(["squad-qa", "infer", "d.jsonl", "--batch-size", "0"]).is_err());

        let cli = Cli::try_parse_from(["squad-qa", "infer", "d.jsonl", "question"]).unwrap();
        match cli.command {
            Commands::Infer { columns, batch_size, .. } => {
                assert_eq!(columns, vec!["question"]);
                assert_eq!(batch_size, None);
            }
            _ => panic!("expected infer"),
        }
    }
}
