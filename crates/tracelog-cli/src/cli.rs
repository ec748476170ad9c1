use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tracelog",
    about = "tracelog: best-effort event tracing with a durable, tailable log",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML configuration file; defaults apply when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Follow the trace log and print records as they arrive
    Tail(TailArgs),
    /// Emit demo records through a pipeline into the trace log
    Emit(EmitArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct TailArgs {
    /// Start time (RFC 3339); defaults to just after now
    #[arg(long, value_parser = parse_time)]
    pub from: Option<DateTime<Utc>>,
    /// Stop after this many seconds; runs until killed when omitted
    #[arg(long = "for", value_name = "SECONDS")]
    pub duration: Option<u64>,
}

#[derive(Args)]
pub struct EmitArgs {
    #[arg(short = 'n', long, default_value_t = 10)]
    pub count: u64,
    /// Owner recorded on every emitted record
    #[arg(long, default_value = "tracelog-cli")]
    pub owner: String,
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 time '{s}': {e}"))
}
