use crate::services::query_analyzer::models::TimeGrouping;
use crate::services::query_analyzer::models::constants::limits::{DEFAULT_CACHE_CAPACITY, DEFAULT_MAX_DEPTH};
use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// Analysis pass configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Operator depth beyond which plan traversal stops (default: 50)
    pub max_walk_depth: usize,
    /// Entries per memoization cache (default: 10000)
    pub cache_capacity: usize,
    /// Records aggregated per batch (default: 500)
    pub batch_size: usize,
    /// Drop statements against `system:` keyspaces (default: false)
    pub exclude_system_queries: bool,
    /// Timeline slot width (default: minute)
    pub time_grouping: TimeGrouping,
}

/// Command line arguments
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "query-analyzer")]
#[command(version, about = "Completed-request analyzer for N1QL query logs")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Completed-requests dump (JSON array of system:completed_requests rows)
    #[arg(long, value_name = "FILE")]
    pub requests: String,

    /// Index catalog dump (JSON array of system:indexes rows)
    #[arg(long, value_name = "FILE")]
    pub indexes: Option<String>,

    /// Keep requests at or after this time (RFC 3339 or query-log format)
    #[arg(long, value_name = "TIME")]
    pub from: Option<String>,

    /// Keep requests at or before this time
    #[arg(long, value_name = "TIME")]
    pub to: Option<String>,

    /// Keep statements containing this text (case-insensitive)
    #[arg(long, value_name = "TEXT")]
    pub sql_filter: Option<String>,

    /// Exclude statements against system keyspaces (overrides config file)
    #[arg(long)]
    pub exclude_system: bool,

    /// Include per-record statistics and plan graphs in the report
    #[arg(long)]
    pub details: bool,

    /// Pretty-print the JSON report
    #[arg(long)]
    pub pretty: bool,

    /// Logging level (overrides config file, e.g., "info,query_analyzer=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Maximum plan traversal depth (overrides config file)
    #[arg(long, value_name = "DEPTH")]
    pub max_depth: Option<usize>,

    /// Timeline grouping: second, minute, hour or day (overrides config file)
    #[arg(long, value_name = "GROUPING")]
    pub time_grouping: Option<String>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables (prefixed with APP_, `.env` honored)
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load(cli_args: &CommandLineArgs) -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.apply_cli_overrides(cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - APP_LOG_LEVEL: Logging level (e.g., "info,query_analyzer=debug")
    /// - APP_LOG_FILE: Rolling log file path
    /// - APP_ANALYSIS_MAX_DEPTH: Maximum plan traversal depth
    /// - APP_ANALYSIS_CACHE_CAPACITY: Entries per memoization cache
    /// - APP_ANALYSIS_BATCH_SIZE: Records per aggregation batch
    /// - APP_ANALYSIS_EXCLUDE_SYSTEM: Exclude system keyspace queries (true/false)
    /// - APP_ANALYSIS_TIME_GROUPING: Timeline grouping (second/minute/hour/day)
    fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("APP_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }

        if let Some(file) = lookup("APP_LOG_FILE") {
            tracing::info!("Override logging.file from env: {}", file);
            self.logging.file = Some(file).filter(|f| !f.is_empty());
        }

        if let Some(depth) = lookup("APP_ANALYSIS_MAX_DEPTH") {
            match depth.parse() {
                Ok(val) => {
                    self.analysis.max_walk_depth = val;
                    tracing::info!(
                        "Override analysis.max_walk_depth from env: {}",
                        self.analysis.max_walk_depth
                    );
                },
                Err(e) => tracing::warn!(
                    "Invalid APP_ANALYSIS_MAX_DEPTH '{}': {} (keep {})",
                    depth,
                    e,
                    self.analysis.max_walk_depth
                ),
            }
        }

        if let Some(capacity) = lookup("APP_ANALYSIS_CACHE_CAPACITY")
            && let Ok(val) = capacity.parse()
        {
            self.analysis.cache_capacity = val;
            tracing::info!(
                "Override analysis.cache_capacity from env: {}",
                self.analysis.cache_capacity
            );
        }

        if let Some(batch) = lookup("APP_ANALYSIS_BATCH_SIZE")
            && let Ok(val) = batch.parse()
        {
            self.analysis.batch_size = val;
            tracing::info!("Override analysis.batch_size from env: {}", self.analysis.batch_size);
        }

        if let Some(exclude) = lookup("APP_ANALYSIS_EXCLUDE_SYSTEM")
            && let Ok(val) = exclude.parse()
        {
            self.analysis.exclude_system_queries = val;
            tracing::info!(
                "Override analysis.exclude_system_queries from env: {}",
                self.analysis.exclude_system_queries
            );
        }

        if let Some(grouping) = lookup("APP_ANALYSIS_TIME_GROUPING") {
            match grouping.parse() {
                Ok(val) => {
                    self.analysis.time_grouping = val;
                    tracing::info!(
                        "Override analysis.time_grouping from env: {:?}",
                        self.analysis.time_grouping
                    );
                },
                Err(e) => tracing::warn!(
                    "Invalid APP_ANALYSIS_TIME_GROUPING '{}': {} (keep {:?})",
                    grouping,
                    e,
                    self.analysis.time_grouping
                ),
            }
        }
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
            tracing::info!("Override logging.level from CLI: {}", self.logging.level);
        }

        if let Some(depth) = args.max_depth {
            self.analysis.max_walk_depth = depth;
            tracing::info!("Override analysis.max_walk_depth from CLI: {}", depth);
        }

        if args.exclude_system {
            self.analysis.exclude_system_queries = true;
            tracing::info!("Override analysis.exclude_system_queries from CLI: true");
        }

        if let Some(grouping) = &args.time_grouping {
            match grouping.parse() {
                Ok(val) => {
                    self.analysis.time_grouping = val;
                    tracing::info!("Override analysis.time_grouping from CLI: {:?}", val);
                },
                Err(e) => tracing::warn!(
                    "Invalid --time-grouping '{}': {} (keep {:?})",
                    grouping,
                    e,
                    self.analysis.time_grouping
                ),
            }
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.analysis.max_walk_depth == 0 {
            anyhow::bail!("analysis.max_walk_depth must be > 0");
        }
        if self.analysis.cache_capacity == 0 {
            anyhow::bail!("analysis.cache_capacity must be > 0");
        }
        if self.analysis.batch_size == 0 {
            anyhow::bail!("analysis.batch_size must be > 0");
        }
        if self.analysis.max_walk_depth > 1_000 {
            tracing::warn!(
                "analysis.max_walk_depth {} is unusually large; deep plans will be slow to walk",
                self.analysis.max_walk_depth
            );
        }

        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content =
            fs::read_to_string(path).with_context(|| format!("reading config file {}", path))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing config file {}", path))?;
        Ok(config)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,query_analyzer=debug".to_string(), file: None }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_walk_depth: DEFAULT_MAX_DEPTH,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            batch_size: 500,
            exclude_system_queries: false,
            time_grouping: TimeGrouping::Minute,
        }
    }
}
