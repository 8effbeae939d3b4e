//! Statistics aggregator
//!
//! Derives per-plan totals and per-operator display metrics from the walked
//! operator list. Results are memoized per plan token.

use crate::services::query_analyzer::analyzer::PassCache;
use crate::services::query_analyzer::models::{
    OperatorDisplayMetrics, OperatorStats, PlanStatistics, PlanTree, constants::stats_keys,
};
use crate::services::query_analyzer::parser::core::{DurationParser, WalkScope};
use std::rc::Rc;

pub struct StatisticsAggregator;

impl StatisticsAggregator {
    /// Statistics for a plan, including its subquery executions
    pub fn compute(tree: &PlanTree, cache: &mut PassCache) -> Rc<PlanStatistics> {
        if let Some(stats) = cache.statistics.get(&tree.token) {
            return Rc::clone(stats);
        }

        let walked = cache.walker.walk_plan(tree, WalkScope::IncludeSubqueries);
        let durations = &mut cache.durations;

        let mut stats = PlanStatistics { operator_count: walked.len(), ..Default::default() };
        let mut operators = Vec::with_capacity(walked.len());

        for id in walked.iter() {
            let Some(op) = tree.get(*id) else { continue };
            let counters = op.stats.as_ref();

            let exec_time_ms = Self::duration(counters, stats_keys::EXEC_TIME, durations);
            let kern_time_ms = Self::duration(counters, stats_keys::KERN_TIME, durations);
            let serv_time_ms = Self::duration(counters, stats_keys::SERV_TIME, durations);
            let used_memory = counters.and_then(|c| c.count(stats_keys::USED_MEMORY));

            stats.max_kern_time_ms = stats.max_kern_time_ms.max(kern_time_ms);
            stats.total_exec_time_ms += exec_time_ms;
            stats.total_serv_time_ms += serv_time_ms;
            stats.total_used_memory = stats.total_used_memory.saturating_add(used_memory.unwrap_or(0));

            operators.push(OperatorDisplayMetrics {
                operator_id: *id,
                kind: op.kind_str().to_string(),
                exec_time_ms,
                kern_time_ms,
                serv_time_ms,
                items_in: counters.and_then(|c| c.count(stats_keys::ITEMS_IN)),
                items_out: counters.and_then(|c| c.count(stats_keys::ITEMS_OUT)),
                used_memory,
                time_percentage: 0.0,
            });
        }

        let total_time_ms = stats.total_exec_time_ms + stats.total_serv_time_ms;
        if total_time_ms > 0.0 {
            for metrics in &mut operators {
                let percentage = (metrics.exec_time_ms + metrics.serv_time_ms) / total_time_ms * 100.0;
                if percentage.is_finite() {
                    // Round to 2 decimal places
                    metrics.time_percentage = (percentage * 100.0).round() / 100.0;
                }
            }
        }

        stats.operators = operators;
        let stats = Rc::new(stats);
        cache.statistics.insert(tree.token, Rc::clone(&stats));
        stats
    }

    fn duration(counters: Option<&OperatorStats>, name: &str, durations: &mut DurationParser) -> f64 {
        counters
            .and_then(|c| c.raw(name))
            .map(|value| durations.parse_value_ms(value))
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::query_analyzer::parser::core::PlanParser;
    use serde_json::json;

    fn plan() -> PlanTree {
        PlanParser::parse(&json!({
            "#operator": "Sequence",
            "#stats": {"execTime": "1ms"},
            "~children": [
                {"#operator": "IndexScan3", "index": "def_city",
                 "#stats": {"execTime": "2ms", "servTime": "5ms", "kernTime": "800µs", "#itemsOut": 10}},
                {"#operator": "Fetch",
                 "#stats": {"execTime": "1ms", "servTime": "1ms", "kernTime": "3ms", "#itemsIn": 10, "#itemsOut": 10, "usedMemory": 2048}},
                {"#operator": "Stream"}
            ],
            "~subqueries": [{
                "executionTimings": {"#operator": "PrimaryScan3", "#stats": {"execTime": "0.5ms", "usedMemory": 1024}},
                "subquery": "select 1 from b"
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_totals_and_percentages() {
        let tree = plan();
        let mut cache = PassCache::new(50, 64);
        let stats = StatisticsAggregator::compute(&tree, &mut cache);

        assert_eq!(stats.operator_count, 5);
        assert!((stats.total_exec_time_ms - 4.5).abs() < 1e-9);
        assert!((stats.total_serv_time_ms - 6.0).abs() < 1e-9);
        assert!((stats.max_kern_time_ms - 3.0).abs() < 1e-9);
        assert_eq!(stats.total_used_memory, 3072);

        let scan = stats.operators.iter().find(|m| m.kind == "IndexScan3").unwrap();
        assert_eq!(scan.items_out, Some(10));
        // (2 + 5) / 10.5
        assert_eq!(scan.time_percentage, 66.67);

        let stream = stats.operators.iter().find(|m| m.kind == "Stream").unwrap();
        assert_eq!(stream.time_percentage, 0.0);
        assert_eq!(stream.items_in, None);
    }

    #[test]
    fn test_statistics_are_memoized() {
        let tree = plan();
        let mut cache = PassCache::new(50, 64);
        let first = StatisticsAggregator::compute(&tree, &mut cache);
        let second = StatisticsAggregator::compute(&tree, &mut cache);
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_plan_without_stats() {
        let tree = PlanParser::parse(&json!({"#operator": "Sequence", "~children": [{"#operator": "Stream"}]})).unwrap();
        let mut cache = PassCache::new(50, 64);
        let stats = StatisticsAggregator::compute(&tree, &mut cache);
        assert_eq!(stats.operator_count, 2);
        assert_eq!(stats.total_exec_time_ms, 0.0);
        assert!(stats.operators.iter().all(|m| m.time_percentage == 0.0));
    }

    #[test]
    fn test_used_memory_total_saturates() {
        let tree = PlanParser::parse(&json!({
            "#operator": "Sequence",
            "~children": [
                {"#operator": "Fetch", "#stats": {"usedMemory": 18446744073709551615u64}},
                {"#operator": "Filter", "#stats": {"usedMemory": 10}}
            ]
        }))
        .unwrap();
        let mut cache = PassCache::new(50, 64);
        let stats = StatisticsAggregator::compute(&tree, &mut cache);
        assert_eq!(stats.total_used_memory, u64::MAX);
        assert_eq!(stats.operators[1].used_memory, Some(u64::MAX));
    }
}
