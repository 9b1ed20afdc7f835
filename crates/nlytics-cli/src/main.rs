//! NLytics CLI - guarded execution of generated analysis programs
//!
//! The `nlytics` command drives the validate, execute and retry pipeline
//! against JSON datasets and program files.
//!
//! ## Commands
//!
//! - `validate`: Statically check a program
//! - `exec`: Run a program in the sandbox
//! - `replay`: Run the retry pipeline over a fixed sequence of programs
//! - `config`: Print the effective configuration

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};

use nlytics_core::render;
use nlytics_core::{
    AnalysisRequest, DataFrame, DatasetSource, GeneratedProgram, JsonFileSource, PipelineConfig,
    PipelineOutcome, RetryOrchestrator, SandboxExecutor, ScriptedProducer, StaticValidator,
};

#[derive(Parser)]
#[command(name = "nlytics")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Validate, sandbox and retry generated analysis programs", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output and JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Pipeline configuration file (JSON, overrides the standard preset)
    #[arg(short, long, global = true, env = "NLYTICS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Statically validate a program without running it
    Validate {
        /// Program file
        #[arg(long)]
        code: PathBuf,

        /// Known column names, comma separated
        #[arg(long, value_delimiter = ',', conflicts_with = "data")]
        columns: Vec<String>,

        /// Dataset file to take column names from
        #[arg(long)]
        data: Option<PathBuf>,
    },

    /// Run a program in the sandbox against a dataset
    Exec {
        /// Program file
        #[arg(long)]
        code: PathBuf,

        /// Dataset file (JSON columns object or record array)
        #[arg(long)]
        data: PathBuf,

        /// Wall-clock limit (default: executor.default_timeout_ms)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Run the retry pipeline, answering each attempt with the next program
    Replay {
        /// Dataset file (JSON columns object or record array)
        #[arg(long)]
        data: PathBuf,

        /// The analysis question
        #[arg(long)]
        query: String,

        /// Program files, one per attempt (`.json` files hold a full program)
        #[arg(required = true)]
        programs: Vec<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

/// Rendered command output plus whether the command's subject succeeded.
struct Report {
    text: String,
    success: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    nlytics_core::telemetry::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;

    let report = match cli.command {
        Commands::Validate {
            code,
            columns,
            data,
        } => cmd_validate(&config, &code, columns, data.as_deref(), cli.json)?,
        Commands::Exec {
            code,
            data,
            timeout_ms,
        } => cmd_exec(&config, &code, &data, timeout_ms, cli.json)?,
        Commands::Replay {
            data,
            query,
            programs,
        } => cmd_replay(&config, &data, &query, &programs, cli.json).await?,
        Commands::Config => Report {
            text: serde_json::to_string_pretty(&config)?,
            success: true,
        },
    };

    println!("{}", report.text);
    Ok(if report.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path)),
        None => Ok(PipelineConfig::standard()),
    }
}

fn load_dataset(path: &Path) -> Result<DataFrame> {
    let source = JsonFileSource::new(path);
    let frame = source
        .load()
        .with_context(|| format!("Failed to load dataset {}", source.describe()))?;
    info!(rows = frame.n_rows(), cols = frame.n_cols(), "dataset ready");
    Ok(frame)
}

/// Plain files hold program text; `.json` files hold a serialized program.
fn load_program(path: &Path, config: &PipelineConfig) -> Result<GeneratedProgram> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read program {:?}", path))?;
    if path.extension().is_some_and(|e| e == "json") {
        serde_json::from_str(&text).with_context(|| format!("Invalid program file {:?}", path))
    } else {
        Ok(GeneratedProgram::new(text, config.executor.result_name.clone()))
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize output")
}

fn cmd_validate(
    config: &PipelineConfig,
    code: &Path,
    columns: Vec<String>,
    data: Option<&Path>,
    json: bool,
) -> Result<Report> {
    let program = load_program(code, config)?;
    let columns = match data {
        Some(path) => load_dataset(path)?.column_names(),
        None => columns,
    };
    let validator = StaticValidator::new(config.validator.clone())?;
    let report = validator.validate_program(&program, &columns);
    let text = if json {
        to_json(&report)?
    } else {
        render::validation_markdown(&report)
    };
    Ok(Report {
        text,
        success: report.valid,
    })
}

fn cmd_exec(
    config: &PipelineConfig,
    code: &Path,
    data: &Path,
    timeout_ms: Option<u64>,
    json: bool,
) -> Result<Report> {
    let program = load_program(code, config)?;
    let dataset = load_dataset(data)?;
    let executor = SandboxExecutor::new(config.executor.clone())?;
    let timeout_ms = timeout_ms.unwrap_or(config.executor.default_timeout_ms);
    let outcome = executor.execute_program(&program, &dataset, timeout_ms);
    let text = if json {
        to_json(&outcome)?
    } else {
        render::outcome_markdown(&outcome)
    };
    Ok(Report {
        text,
        success: outcome.success,
    })
}

async fn cmd_replay(
    config: &PipelineConfig,
    data: &Path,
    query: &str,
    programs: &[PathBuf],
    json: bool,
) -> Result<Report> {
    let dataset = Arc::new(load_dataset(data)?);
    let programs = programs
        .iter()
        .map(|p| load_program(p, config))
        .collect::<Result<Vec<_>>>()?;
    let producer = Arc::new(ScriptedProducer::new(programs));
    let orchestrator = RetryOrchestrator::new(config.clone(), producer)?;
    let report = orchestrator
        .run(&AnalysisRequest::new(query), dataset)
        .await
        .context("Pipeline aborted")?;
    let success = report.outcome.is_success();

    if json {
        return Ok(Report {
            text: to_json(&report)?,
            success,
        });
    }

    let max_attempts = config.retry.max_attempts;
    let mut sections = Vec::new();
    for attempt in &report.attempts {
        sections.push(format!("## Attempt {}/{}", attempt.attempt, max_attempts));
        sections.push(render::validation_markdown(&attempt.validation));
        if let Some(execution) = &attempt.execution {
            sections.push(render::outcome_markdown(execution));
        }
        if let Some(feedback) = &attempt.feedback {
            sections.push(render::retry_notice(attempt.attempt + 1, max_attempts, feedback));
        }
    }
    sections.push(match &report.outcome {
        PipelineOutcome::Succeeded { attempts, .. } => {
            format!("Run {} succeeded after {} attempt(s)", report.run_id, attempts)
        }
        PipelineOutcome::Failed { attempts, .. } => {
            format!("Run {} failed after {} attempt(s)", report.run_id, attempts)
        }
    });
    Ok(Report {
        text: sections.join("\n\n"),
        success,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    const DATA: &str = r#"{"price": [10, 20, 30], "region": ["north", "south", "north"]}"#;

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "nlytics", "validate", "--code", "p.py", "--columns", "a,b", "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Validate { columns, .. } => assert_eq!(columns, ["a", "b"]),
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_replay_requires_programs() {
        assert!(Cli::try_parse_from(["nlytics", "replay", "--data", "d.json", "--query", "q"]).is_err());
    }

    #[test]
    fn test_cmd_validate_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let code = write(dir.path(), "p.py", "import socket\nresult = 1");
        let report = cmd_validate(&PipelineConfig::standard(), &code, Vec::new(), None, false).unwrap();
        assert!(!report.success);
        assert!(report.text.contains("Unauthorized import: socket"));
    }

    #[test]
    fn test_cmd_exec_json() {
        let dir = tempfile::tempdir().unwrap();
        let code = write(dir.path(), "p.py", "result = df['price'].sum()");
        let data = write(dir.path(), "d.json", DATA);
        let report = cmd_exec(&PipelineConfig::standard(), &code, &data, Some(1_000), true).unwrap();
        assert!(report.success);
        let value: serde_json::Value = serde_json::from_str(&report.text).unwrap();
        assert_eq!(value["result"]["value"], 60);
    }

    #[test]
    fn test_program_json_file_keeps_result_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "p.json",
            r#"{"code": "answer = 1", "result_name": "answer"}"#,
        );
        let program = load_program(&path, &PipelineConfig::standard()).unwrap();
        assert_eq!(program.result_name, "answer");
    }

    #[tokio::test]
    async fn test_cmd_replay_retries_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let data = write(dir.path(), "d.json", DATA);
        let first = write(dir.path(), "1.py", "total = df['price'].sum()");
        let second = write(dir.path(), "2.py", "result = df['price'].sum()");
        let report = cmd_replay(
            &PipelineConfig::standard(),
            &data,
            "total price",
            &[first, second],
            false,
        )
        .await
        .unwrap();
        assert!(report.success);
        assert!(report.text.contains("## Attempt 1/3"));
        assert!(report.text.contains("**Retrying** (Attempt 2/3)"));
        assert!(report.text.contains("succeeded after 2 attempt(s)"));
    }

    #[test]
    fn test_load_config_overrides_preset() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "c.json", r#"{"retry": {"max_attempts": 5, "timeout_ms": 500}}"#);
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.executor.dataset_name, "df");
    }
}
