//! N1QL Completed-Request Analyzer
//!
//! Parses `system:completed_requests` dumps and turns them into per-plan
//! statistics, normalized query groups and the index/query usage graph.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      QueryAnalyzer                          │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │       load_records() / analyze() / report()          │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! │                           │                                 │
//! │           ┌───────────────┼───────────────┐                │
//! │           ▼               ▼               ▼                │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐        │
//! │  │   Parser    │  │  Analyzer   │  │   Models    │        │
//! │  │  ┌───────┐  │  │  ┌───────┐  │  │             │        │
//! │  │  │Composer│  │  │  │ Graph │  │  │  PlanTree   │        │
//! │  │  └───────┘  │  │  │Builder│  │  │  QueryGroup │        │
//! │  │  ┌───────┐  │  │  └───────┘  │  │  IndexUsage │        │
//! │  │  │ Plan  │  │  │  ┌───────┐  │  │  PlanGraph  │        │
//! │  │  │Parser │  │  │  │ Stats │  │  │  ...        │        │
//! │  │  └───────┘  │  │  └───────┘  │  │             │        │
//! │  │  ┌───────┐  │  │  ┌───────┐  │  │             │        │
//! │  │  │Keyspace│ │  │  │ Pass  │  │  │             │        │
//! │  │  │Parser │  │  │  │ Cache │  │  │             │        │
//! │  │  └───────┘  │  │  └───────┘  │  │             │        │
//! │  └─────────────┘  └─────────────┘  └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use query_analyzer::config::AnalysisConfig;
//! use query_analyzer::services::query_analyzer::{QueryAnalyzer, RecordFilter};
//!
//! let mut analyzer = QueryAnalyzer::new(&AnalysisConfig::default());
//! analyzer.load_records(&dump)?;
//! let state = analyzer.analyze(&RecordFilter::default());
//! for index in state.sorted_indexes() {
//!     println!("{}: {}", index.key, index.usage_count);
//! }
//! ```

pub mod analyzer;
pub mod models;
pub mod parser;


pub use analyzer::{AnalysisState, GraphBuilder, PassCache, RecordFilter};
pub use models::*;
pub use parser::{ParseError, ParseResult, RecordComposer};

use crate::config::AnalysisConfig;
use analyzer::{StatisticsAggregator, TimelineBuilder};
use chrono::{DateTime, Utc};
use parser::core::{CatalogParser, TreeBuilder, WalkScope};
use serde::Serialize;
use std::rc::Rc;

/// Per-record plan details for diagram consumers
#[derive(Debug, Clone, Serialize)]
pub struct RecordDetail {
    pub index: usize,
    pub request_id: Option<String>,
    pub statement: Option<String>,
    pub bsc: String,
    pub statistics: Option<PlanStatistics>,
    pub graph: Option<PlanGraph>,
}

/// Everything one pass computes, ready for rendering collaborators
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub total_records: usize,
    pub analyzed_records: usize,
    pub catalog_indexes: usize,
    pub indexes: Vec<IndexUsageRecord>,
    pub queries: Vec<QueryGroup>,
    pub connections: Vec<Connection>,
    pub timeline: Vec<TimelineBucket>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<RecordDetail>,
}

/// Analysis session over one loaded dump
///
/// Owns the records, the optional index catalog and the pass caches.
/// Loading a new dump discards every memoized value.
pub struct QueryAnalyzer {
    cache: PassCache,
    builder: GraphBuilder,
    max_walk_depth: usize,
    exclude_system: bool,
    time_grouping: TimeGrouping,
    records: Vec<AnalyzedRecord>,
    catalog: IndexCatalog,
}

impl QueryAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            cache: PassCache::new(config.max_walk_depth, config.cache_capacity),
            builder: GraphBuilder::new(config.batch_size),
            max_walk_depth: config.max_walk_depth,
            exclude_system: config.exclude_system_queries,
            time_grouping: config.time_grouping,
            records: Vec::new(),
            catalog: IndexCatalog::default(),
        }
    }

    /// Replace the loaded records; returns how many were ingested
    pub fn load_records(&mut self, text: &str) -> ParseResult<usize> {
        self.cache.reset();
        self.records = RecordComposer::parse_records(text, &mut self.cache.durations)?;
        Ok(self.records.len())
    }

    /// Replace the index catalog used for primary resolution
    pub fn load_catalog(&mut self, text: &str) -> ParseResult<usize> {
        self.catalog = CatalogParser::parse(text)?;
        Ok(self.catalog.len())
    }

    pub fn records(&self) -> &[AnalyzedRecord] {
        &self.records
    }

    pub fn catalog(&self) -> &IndexCatalog {
        &self.catalog
    }

    /// Filter seeded from configuration
    pub fn default_filter(&self) -> RecordFilter {
        RecordFilter { exclude_system: self.exclude_system, ..Default::default() }
    }

    /// Run one aggregation pass over the records `filter` keeps
    pub fn analyze(&mut self, filter: &RecordFilter) -> AnalysisState {
        let selected = filter.apply(&self.records);
        self.builder.build(&selected, &self.catalog, &mut self.cache)
    }

    /// Operators of a record's plan in walk order
    pub fn operators(&mut self, index: usize, scope: WalkScope) -> Option<Rc<[OperatorId]>> {
        let tree = self.records.get(index)?.plan.as_ref()?;
        Some(self.cache.walker.walk_plan(tree, scope))
    }

    pub fn plan_statistics(&mut self, index: usize) -> Option<Rc<PlanStatistics>> {
        let tree = self.records.get(index)?.plan.as_ref()?;
        Some(StatisticsAggregator::compute(tree, &mut self.cache))
    }

    pub fn plan_graph(&self, index: usize) -> Option<PlanGraph> {
        let tree = self.records.get(index)?.plan.as_ref()?;
        Some(TreeBuilder::build(tree, self.max_walk_depth))
    }

    /// Timeline with the configured grouping
    pub fn timeline(&mut self, filter: &RecordFilter) -> Vec<TimelineBucket> {
        self.timeline_with(filter, self.time_grouping)
    }

    pub fn timeline_with(&mut self, filter: &RecordFilter, grouping: TimeGrouping) -> Vec<TimelineBucket> {
        let selected = filter.apply(&self.records);
        TimelineBuilder::build(&selected, grouping, &mut self.cache)
    }

    /// Full report for one pass; `details` adds per-record statistics and graphs
    pub fn report(&mut self, filter: &RecordFilter, details: bool) -> AnalysisReport {
        let state = self.analyze(filter);
        let timeline = self.timeline(filter);

        let selected: Vec<usize> = filter.apply(&self.records).iter().map(|r| r.index).collect();
        let details = if details {
            selected.iter().filter_map(|&index| self.record_detail(index)).collect()
        } else {
            Vec::new()
        };

        AnalysisReport {
            generated_at: Utc::now(),
            total_records: self.records.len(),
            analyzed_records: selected.len(),
            catalog_indexes: self.catalog.len(),
            indexes: state.sorted_indexes().into_iter().cloned().collect(),
            queries: state.sorted_queries().into_iter().cloned().collect(),
            connections: state.sorted_connections().into_iter().cloned().collect(),
            timeline,
            details,
        }
    }

    fn record_detail(&mut self, index: usize) -> Option<RecordDetail> {
        let statistics = self.plan_statistics(index).map(|s| (*s).clone());
        let graph = self.plan_graph(index);
        let record = self.records.get(index)?;

        Some(RecordDetail {
            index,
            request_id: record.raw.request_id.clone(),
            statement: record.statement.clone(),
            bsc: record.bsc.to_string(),
            statistics,
            graph,
        })
    }
}
