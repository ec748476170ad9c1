use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use colored::Colorize;
use tracing::debug;

use tracelog_log::{DurableLogWriter, TraceLogConfig, TraceReader};
use tracelog_pipeline::{tracer_interface, LoggingHandler, Pipeline};
use tracelog_store::SegmentTraceStore;
use tracelog_types::TraceRecord;

use crate::cli::*;

/// Upper bound on waiting for the dispatcher to drain after `emit`.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

tracer_interface! {
    /// Events raised by `tracelog emit`.
    pub struct DemoEvents {
        fn started(count: u64);
        fn tick(index: u64, label: String);
        fn finished(count: u64);
    }
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Tail(args) => cmd_tail(&config, args, &cli.format),
        Command::Emit(args) => cmd_emit(&config, args, cli.verbose),
        Command::Config => cmd_config(&config),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<TraceLogConfig> {
    match path {
        Some(path) => TraceLogConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(TraceLogConfig::default()),
    }
}

fn open_store(config: &TraceLogConfig) -> anyhow::Result<Arc<SegmentTraceStore>> {
    let path = &config.store.path;
    let store = SegmentTraceStore::open(path, config.store.segment_config())
        .with_context(|| format!("opening trace store {}", path.display()))?;
    debug!(path = %path.display(), namespace = %config.store.namespace(), "trace store ready");
    Ok(Arc::new(store))
}

fn cmd_tail(config: &TraceLogConfig, args: TailArgs, format: &OutputFormat) -> anyhow::Result<()> {
    if !config.read_enabled {
        println!("{} Reads are disabled by configuration.", "!".yellow().bold());
        return Ok(());
    }
    let store = open_store(config)?;
    let mut reader = TraceReader::with_json(store, config.reader.clone(), true)?;
    let checkpoint = reader.move_to(args.from)?;
    eprintln!(
        "Tailing {} from {}",
        config.store.path.display().to_string().bold(),
        checkpoint.to_string().yellow()
    );

    let deadline = args.duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    let poll = config.reader.poll_interval();
    let mut seen = 0u64;
    loop {
        for record in reader.get_traces(None) {
            print_record(&record, format)?;
            seen += 1;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        thread::sleep(poll);
    }
    reader.close();
    eprintln!("{} {} records, {} resyncs", "✓".green(), seen, reader.recovery_count());
    Ok(())
}

fn print_record(record: &TraceRecord, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(record)?),
        OutputFormat::Text => println!(
            "{} {} {}.{}({})",
            record.time.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string().dimmed(),
            record.owner.cyan(),
            record.interface,
            record.method.bold(),
            record
                .args
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
    Ok(())
}

fn cmd_emit(config: &TraceLogConfig, args: EmitArgs, verbose: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let writer = Arc::new(DurableLogWriter::with_json(store, config.write_enabled));
    let pipeline = Pipeline::new(config.pipeline.clone());
    pipeline.register_handler(writer.clone());
    if verbose {
        pipeline.register_handler(Arc::new(LoggingHandler::default()));
    }
    pipeline.enable(true)?;

    let events: DemoEvents = pipeline.create_tracer(&args.owner);
    events.started(args.count);
    for index in 0..args.count {
        events.tick(index, format!("tick-{index}"));
    }
    events.finished(args.count);

    let deadline = Instant::now() + DRAIN_TIMEOUT;
    while pipeline.pending() > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    pipeline.enable(false)?;

    println!(
        "{} Emitted {} records: {} persisted, {} failed, {} dropped",
        "✓".green().bold(),
        args.count + 2,
        writer.written().to_string().green(),
        writer.failed().to_string().red(),
        pipeline.lost_events().to_string().yellow()
    );
    if !config.write_enabled {
        println!("  Writes are disabled by configuration.");
    }
    Ok(())
}

fn cmd_config(config: &TraceLogConfig) -> anyhow::Result<()> {
    print!("{}", config.to_toml_redacted()?);
    Ok(())
}
