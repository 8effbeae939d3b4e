//! Query analyzer passes
//!
//! Aggregation over ingested records: groups, index usage, connections,
//! per-plan statistics and the request timeline.

pub mod graph_builder;
pub mod index_usage;
pub mod pass_cache;
pub mod record_filter;
pub mod statistics;
pub mod timeline;

pub use graph_builder::{AnalysisState, GraphBuilder};
pub use index_usage::{IndexUsage, IndexUsageExtractor, IndexUsageSample};
pub use pass_cache::PassCache;
pub use record_filter::RecordFilter;
pub use statistics::StatisticsAggregator;
pub use timeline::TimelineBuilder;
