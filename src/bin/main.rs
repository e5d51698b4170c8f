//! metricq CLI - Compile metric queries to ClickHouse SQL
//!
//! Usage:
//!   metricq compile <query.json> --start <ms> --end <ms> [--keys <keys.json>]
//!                   [--variables <vars.json>] [--signal metrics|meter] [--output sql|json]
//!   metricq validate <query.json>
//!
//! Examples:
//!   metricq compile demos/calls_rate.json --start 1747872045000 --end 1747958445000
//!   metricq compile demos/calls_rate.json --start 0 --end 3600000 --output json

use clap::{Parser, Subcommand, ValueEnum};
use metricq::config::Settings;
use metricq::filter::parse;
use metricq::having;
use metricq::metadata::{InMemoryMetadataStore, KeyEntry};
use metricq::meter::MeterStatementBuilder;
use metricq::metrics::{MetricStatementBuilder, MetricsConditionBuilder, MetricsFieldMapper};
use metricq::types::{Query, Signal, Statement, Variables};
use metricq::BuildResult;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "metricq")]
#[command(about = "metricq - Compile metric queries to tiered ClickHouse SQL")]
#[command(version)]
struct Cli {
    /// Path to a settings file (defaults to METRICQ_CONFIG, ./metricq.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a query to SQL
    Compile {
        /// Path to the query JSON file
        file: PathBuf,

        /// Window start, epoch milliseconds
        #[arg(long)]
        start: u64,

        /// Window end, epoch milliseconds
        #[arg(long)]
        end: u64,

        /// JSON list of known field keys
        #[arg(short, long)]
        keys: Option<PathBuf>,

        /// JSON map of variable values
        #[arg(short, long)]
        variables: Option<PathBuf>,

        /// Signal to compile for (defaults to the query's own signal)
        #[arg(short, long)]
        signal: Option<SignalArg>,

        /// Output format
        #[arg(short, long, default_value = "sql")]
        output: OutputFormat,
    },

    /// Check a query file and its filter expression without generating SQL
    Validate {
        /// Path to the query JSON file
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SignalArg {
    Metrics,
    Meter,
}

impl From<SignalArg> for Signal {
    fn from(arg: SignalArg) -> Self {
        match arg {
            SignalArg::Metrics => Signal::Metrics,
            SignalArg::Meter => Signal::Meter,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// SQL text followed by the bound arguments
    Sql,
    /// The statement as JSON
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    };
    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Compile {
            file,
            start,
            end,
            keys,
            variables,
            signal,
            output,
        } => cmd_compile(
            &settings,
            CompileArgs {
                file,
                start,
                end,
                keys,
                variables,
                signal,
            },
            output,
        ),
        Commands::Validate { file } => cmd_validate(file),
    }
}

struct CompileArgs {
    file: PathBuf,
    start: u64,
    end: u64,
    keys: Option<PathBuf>,
    variables: Option<PathBuf>,
    signal: Option<SignalArg>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    let source = fs::read_to_string(path)
        .map_err(|e| format!("Error reading file '{}': {}", path.display(), e))?;
    serde_json::from_str(&source)
        .map_err(|e| format!("Error parsing '{}': {}", path.display(), e))
}

fn cmd_compile(settings: &Settings, args: CompileArgs, output: OutputFormat) -> ExitCode {
    let loaded = (|| -> Result<(Query, Vec<KeyEntry>, Variables), String> {
        let query: Query = read_json(&args.file)?;
        let keys = match &args.keys {
            Some(path) => read_json(path)?,
            None => Vec::new(),
        };
        let variables = match &args.variables {
            Some(path) => read_json(path)?,
            None => Variables::new(),
        };
        Ok((query, keys, variables))
    })();
    let (query, keys, variables) = match loaded {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let signal = args.signal.map(Signal::from).unwrap_or(query.signal);
    let result = runtime.block_on(compile(
        settings, signal, args.start, args.end, &query, keys, &variables,
    ));

    match result {
        Ok(statement) => {
            match output {
                OutputFormat::Sql => {
                    println!("{}", statement.query);
                    println!();
                    for (i, arg) in statement.args.iter().enumerate() {
                        println!("-- ${}: {}", i + 1, arg);
                    }
                    for warning in &statement.warnings {
                        eprintln!("warning: {}", warning);
                    }
                }
                OutputFormat::Json => match serde_json::to_string_pretty(&statement) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Error serializing statement: {}", e);
                        return ExitCode::FAILURE;
                    }
                },
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Compilation error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn compile(
    settings: &Settings,
    signal: Signal,
    start: u64,
    end: u64,
    query: &Query,
    keys: Vec<KeyEntry>,
    variables: &Variables,
) -> BuildResult<Statement> {
    let metadata = Arc::new(InMemoryMetadataStore::from_entries(keys));
    let condition_builder = Arc::new(MetricsConditionBuilder::new(MetricsFieldMapper));

    match signal {
        Signal::Metrics => {
            MetricStatementBuilder::with_settings(
                metadata,
                Arc::new(MetricsFieldMapper),
                condition_builder,
                settings.metrics.clone(),
            )
            .build(start, end, query, variables)
            .await
        }
        Signal::Meter => {
            MeterStatementBuilder::with_settings(
                metadata,
                Arc::new(MetricsFieldMapper),
                condition_builder,
                settings.meter.clone(),
            )
            .build(start, end, query, variables)
            .await
        }
    }
}

fn cmd_validate(file: PathBuf) -> ExitCode {
    let query: Query = match read_json(&file) {
        Ok(q) => q,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if query.aggregations.len() != 1 {
        eprintln!(
            "Validation error: exactly one aggregation is required, got {}",
            query.aggregations.len()
        );
        return ExitCode::FAILURE;
    }

    if let Some(expression) = query.filter_expression() {
        if let Err(errors) = parse(expression) {
            eprintln!("Filter errors:");
            for e in &errors {
                eprintln!("  {}", e);
            }
            return ExitCode::FAILURE;
        }
    }

    if let Some(expression) = query.having_expression() {
        if let Err(e) = having::rewrite_for_metrics(expression, &query.aggregations[0]) {
            eprintln!("Having error: {}", e);
            return ExitCode::FAILURE;
        }
    }

    println!("OK: {} is valid", file.display());
    ExitCode::SUCCESS
}
