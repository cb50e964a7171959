use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tk_core::{extract_all, OsEntropy, SignatureSynthesizer, ThinkingExtractor};

mod config;
mod replay;

use config::Config;
use replay::{chunk_text, replay};

/// Log level for tracing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Most verbose: per-chunk scan details
    Trace,
    /// Verbose: block open/close events
    Debug,
    /// Standard: high-level flow
    Info,
    /// Quiet: only warnings and errors
    Warn,
    /// Minimal: only errors
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Parser)]
#[command(name = "tk")]
#[command(author, version, about = "Split <thinking> blocks out of LLM responses", long_about = None)]
pub struct Cli {
    /// Config file (defaults to ~/.config/tk/config.toml if present)
    #[arg(short, long, env = "TK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Replay chunk size in bytes (overrides config)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    /// Write debug logs to file (JSON-lines format)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a response body through the streaming extractor
    Stream {
        /// Input file (reads stdin when omitted)
        file: Option<PathBuf>,

        /// Print one aggregated JSON object instead of per-event lines
        #[arg(long)]
        summary: bool,
    },
    /// Extract all thinking blocks from a complete response body
    Batch {
        /// Input file (reads stdin when omitted)
        file: Option<PathBuf>,
    },
    /// Print a freshly synthesized signature for a block of LEN bytes
    Signature { len: usize },
    /// Show the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::new(cli.log_level.as_filter());
    if let Some(log_path) = &cli.log_file {
        let file = std::fs::File::create(log_path)
            .with_context(|| format!("Failed to create log file: {:?}", log_path))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::sync::Mutex::new(file)))
            .init();
    } else {
        // Logs go to stderr so stdout stays machine-readable
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(chunk_size) = cli.chunk_size {
        config.chunk_size = chunk_size;
        config.validate()?;
    }

    match &cli.command {
        Commands::Stream { file, summary } => stream_mode(&config, file.as_deref(), *summary),
        Commands::Batch { file } => batch_mode(file.as_deref()),
        Commands::Signature { len } => {
            let signer = synthesizer(&config)?;
            println!("{}", signer.synthesize(*len)?);
            Ok(())
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn synthesizer(config: &Config) -> Result<SignatureSynthesizer> {
    Ok(SignatureSynthesizer::new(
        config.signature.clone(),
        Arc::new(OsEntropy),
    )?)
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {:?}", path)),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn stream_mode(config: &Config, file: Option<&Path>, summary: bool) -> Result<()> {
    let body = read_input(file)?;
    let chunks = chunk_text(&body, config.chunk_size);
    info!(bytes = body.len(), chunks = chunks.len(), "Replaying response body");

    let mut extractor = ThinkingExtractor::with_synthesizer(synthesizer(config)?);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if summary {
        let result = replay(&mut extractor, chunks, None)?;
        writeln!(out, "{}", serde_json::to_string_pretty(&result)?)?;
    } else {
        replay(&mut extractor, chunks, Some(&mut out as &mut dyn Write))?;
    }
    Ok(())
}

fn batch_mode(file: Option<&Path>) -> Result<()> {
    let body = read_input(file)?;
    let extracted = extract_all(&body);
    info!(blocks = extracted.blocks.len(), "Extracted thinking blocks");

    let output = serde_json::json!({
        "blocks": extracted.blocks,
        "clean_text": extracted.clean_text,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
