use anyhow::Context;
use clap::Parser;
use std::fs;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use query_analyzer::config::{CommandLineArgs, Config};
use query_analyzer::services::QueryAnalyzer;
use query_analyzer::services::query_analyzer::RecordFilter;
use query_analyzer::services::query_analyzer::parser::core::ValueParser;

fn main() -> Result<(), anyhow::Error> {
    let args = CommandLineArgs::parse();

    // Load configuration first
    let config = Config::load(&args)?;

    // Initialize logging; console output goes to stderr so stdout carries the report
    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    let _guard = if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).filter(|p| !p.is_empty()).unwrap_or("logs");
        let file_name = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("query-analyzer.log");
        // Rolling appender adds the date suffix
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        registry
            .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
        Some(guard)
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)).init();
        None
    };

    tracing::info!("Query analyzer starting up");
    tracing::debug!("Analysis configuration: {:?}", config.analysis);

    let mut analyzer = QueryAnalyzer::new(&config.analysis);

    let requests = fs::read_to_string(&args.requests)
        .with_context(|| format!("reading requests file {}", args.requests))?;
    let loaded = analyzer
        .load_records(&requests)
        .with_context(|| format!("parsing requests file {}", args.requests))?;
    tracing::info!("Loaded {} requests from {}", loaded, args.requests);

    if let Some(path) = &args.indexes {
        let indexes =
            fs::read_to_string(path).with_context(|| format!("reading indexes file {}", path))?;
        let loaded = analyzer
            .load_catalog(&indexes)
            .with_context(|| format!("parsing indexes file {}", path))?;
        tracing::info!("Loaded {} index definitions from {}", loaded, path);
    }

    let filter = build_filter(&args, analyzer.default_filter())?;
    let report = analyzer.report(&filter, args.details);

    let output = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", output);

    for index in &report.indexes {
        tracing::debug!(
            "Index {}: {} uses, avg scan service time {:.3}ms",
            index.key,
            index.usage_count,
            index.avg_scan_service_time_ms()
        );
    }

    tracing::info!(
        "Report written: {} of {} records, {} query groups, {} indexes",
        report.analyzed_records,
        report.total_records,
        report.queries.len(),
        report.indexes.len()
    );
    Ok(())
}

fn build_filter(args: &CommandLineArgs, base: RecordFilter) -> Result<RecordFilter, anyhow::Error> {
    let from = args
        .from
        .as_deref()
        .map(ValueParser::parse_timestamp)
        .transpose()
        .context("invalid --from timestamp")?;
    let to = args
        .to
        .as_deref()
        .map(ValueParser::parse_timestamp)
        .transpose()
        .context("invalid --to timestamp")?;

    if let (Some(from), Some(to)) = (from, to)
        && from > to
    {
        anyhow::bail!("--from ({}) is after --to ({})", from, to);
    }

    Ok(RecordFilter { from, to, sql_contains: args.sql_filter.clone(), ..base })
}
