//! Pass-scoped memoization
//!
//! Every cache the pipeline uses lives here, owned by the analyzer session
//! and dropped wholesale when a new dump is loaded. All cached values are
//! pure functions of their key, so filter passes over the same dump share
//! them.

use crate::services::query_analyzer::models::{PlanStatistics, PlanToken, TimeGrouping};
use crate::services::query_analyzer::parser::core::{
    DurationParser, OperatorWalker, StatementNormalizer,
};
use crate::utils::BoundedCache;
use std::rc::Rc;

/// Caches shared by one analysis session
#[derive(Debug)]
pub struct PassCache {
    pub durations: DurationParser,
    pub statements: StatementNormalizer,
    pub walker: OperatorWalker,
    pub statistics: BoundedCache<PlanToken, Rc<PlanStatistics>>,
    /// (timestamp ms, grouping) -> bucket start ms
    pub timestamps: BoundedCache<(i64, TimeGrouping), i64>,
}

impl PassCache {
    pub fn new(max_walk_depth: usize, capacity: usize) -> Self {
        Self {
            durations: DurationParser::new(capacity),
            statements: StatementNormalizer::new(capacity),
            walker: OperatorWalker::new(max_walk_depth, capacity),
            statistics: BoundedCache::new(capacity),
            timestamps: BoundedCache::new(capacity),
        }
    }

    /// Drop every memoized value
    pub fn reset(&mut self) {
        self.durations.clear();
        self.statements.clear();
        self.walker.clear();
        self.statistics.clear();
        self.timestamps.clear();
    }
}
