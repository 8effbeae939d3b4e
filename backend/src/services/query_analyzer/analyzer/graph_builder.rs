//! Index-usage & graph builder
//!
//! Aggregates, across a record set, which indexes are used by which
//! normalized query groups. Each pass builds a fresh [`AnalysisState`], so
//! re-running over the same records yields the same maps.

use crate::services::query_analyzer::analyzer::{IndexUsageExtractor, PassCache};
use crate::services::query_analyzer::models::{
    AnalyzedRecord, Connection, IndexCatalog, IndexUsageRecord, QueryGroup,
    constants::{DEFAULT_SCAN_CONSISTENCY, KEY_SEPARATOR},
};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Aggregates of one pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisState {
    /// By `indexName::bsc`
    pub indexes: HashMap<String, IndexUsageRecord>,
    /// By normalized statement
    pub queries: HashMap<String, QueryGroup>,
    /// By `normalizedStatement::indexKey`
    pub connections: HashMap<String, Connection>,
}

impl AnalysisState {
    /// Indexes by usage count, descending; key breaks ties
    pub fn sorted_indexes(&self) -> Vec<&IndexUsageRecord> {
        let mut indexes: Vec<_> = self.indexes.values().collect();
        indexes.sort_by(|a, b| b.usage_count.cmp(&a.usage_count).then_with(|| a.key.cmp(&b.key)));
        indexes
    }

    /// Query groups by execution count, descending
    pub fn sorted_queries(&self) -> Vec<&QueryGroup> {
        let mut queries: Vec<_> = self.queries.values().collect();
        queries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.normalized.cmp(&b.normalized)));
        queries
    }

    /// Edges by count, descending
    pub fn sorted_connections(&self) -> Vec<&Connection> {
        let mut connections: Vec<_> = self.connections.values().collect();
        connections.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
        connections
    }
}

/// Builder for the index/query bipartite graph
pub struct GraphBuilder {
    batch_size: usize,
}

impl GraphBuilder {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size: batch_size.max(1) }
    }

    /// Aggregate `records` into a fresh state
    pub fn build(
        &self,
        records: &[&AnalyzedRecord],
        catalog: &IndexCatalog,
        cache: &mut PassCache,
    ) -> AnalysisState {
        let mut state = AnalysisState::default();

        for (batch_no, batch) in records.chunks(self.batch_size).enumerate() {
            tracing::debug!("Aggregating batch {} ({} records)", batch_no + 1, batch.len());
            for record in batch {
                Self::add_record(&mut state, record, catalog, cache);
            }
        }

        tracing::info!(
            "Aggregated {} records: {} query groups, {} indexes, {} connections",
            records.len(),
            state.queries.len(),
            state.indexes.len(),
            state.connections.len()
        );
        state
    }

    fn add_record(
        state: &mut AnalysisState,
        record: &AnalyzedRecord,
        catalog: &IndexCatalog,
        cache: &mut PassCache,
    ) {
        let Some(statement) = record.statement.as_deref() else {
            return;
        };
        let normalized = cache.statements.normalize(statement);

        let group = state.queries.entry(normalized.clone()).or_insert_with(|| QueryGroup {
            normalized: normalized.clone(),
            representative: statement.to_string(),
            count: 0,
            total_service_time_ms: 0.0,
            total_elapsed_time_ms: 0.0,
            records: Vec::new(),
            scan_consistencies: BTreeSet::new(),
        });
        group.count += 1;
        group.total_service_time_ms += record.service_ms;
        group.total_elapsed_time_ms += record.elapsed_ms;
        group.records.push(record.index);
        if let Some(consistency) = record.raw.scan_consistency.as_deref()
            && !consistency.is_empty()
            && !consistency.eq_ignore_ascii_case(DEFAULT_SCAN_CONSISTENCY)
        {
            group.scan_consistencies.insert(consistency.to_string());
        }

        let Some(plan) = record.plan.as_ref() else {
            return;
        };

        let usages = IndexUsageExtractor::extract(
            plan,
            &record.bsc,
            catalog,
            &mut cache.walker,
            &mut cache.durations,
        );

        for usage in usages {
            let index_key = usage.key();

            let index = state.indexes.entry(index_key.clone()).or_insert_with(|| IndexUsageRecord {
                key: index_key.clone(),
                name: usage.name.clone(),
                bsc: usage.bsc.clone(),
                is_primary: usage.is_primary,
                resolution: usage.resolution,
                usage_count: 0,
                scan_service_times_ms: Vec::new(),
                items_scanned: Vec::new(),
                items_fetched: Vec::new(),
            });
            index.usage_count += 1;
            if let Some(sample) = usage.sample {
                index.scan_service_times_ms.push(sample.serv_time_ms);
                index.items_scanned.push(sample.items_scanned);
                index.items_fetched.push(sample.items_fetched);
            }

            let edge_key = format!("{}{}{}", normalized, KEY_SEPARATOR, index_key);
            state
                .connections
                .entry(edge_key.clone())
                .or_insert_with(|| Connection {
                    key: edge_key,
                    statement: normalized.clone(),
                    index_key,
                    count: 0,
                })
                .count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::query_analyzer::models::{ChildSlots, OperatorId, PlanOperator, PlanTree};
    use crate::services::query_analyzer::parser::RecordComposer;
    use crate::services::query_analyzer::parser::core::DurationParser;

    fn records() -> Vec<AnalyzedRecord> {
        let text = r##"[
            {"statement": "SELECT * FROM hotel WHERE city = 'Paris'", "serviceTime": "10ms", "elapsedTime": "11ms",
             "scanConsistency": "scan_plus", "plan": {"#operator": "Sequence", "~children": [
                {"#operator": "IndexScan3", "index": "def_city", "#stats": {"servTime": "2ms", "#itemsOut": 4}},
                {"#operator": "Fetch", "#stats": {"#itemsOut": 4}}]}},
            {"statement": "SELECT * FROM hotel WHERE city = 'Rome'", "serviceTime": "20ms", "elapsedTime": "21ms",
             "scanConsistency": "unbounded", "plan": {"#operator": "Sequence", "~children": [
                {"#operator": "IndexScan3", "index": "def_city"},
                {"#operator": "Fetch"}]}},
            {"statement": "SELECT * FROM airline", "serviceTime": "1ms",
             "plan": {"#operator": "PrimaryScan3", "index": "#primary"}},
            {"statement": "SELECT 1"}
        ]"##;
        RecordComposer::parse_records(text, &mut DurationParser::new(64)).unwrap()
    }

    fn build(records: &[AnalyzedRecord]) -> AnalysisState {
        let refs: Vec<&AnalyzedRecord> = records.iter().collect();
        GraphBuilder::new(2).build(&refs, &IndexCatalog::default(), &mut PassCache::new(50, 64))
    }

    #[test]
    fn test_literal_variants_share_a_group() {
        let state = build(&records());

        let group = &state.queries["SELECT * FROM hotel WHERE city = ?"];
        assert_eq!(group.count, 2);
        assert_eq!(group.records, vec![0, 1]);
        assert_eq!(group.representative, "SELECT * FROM hotel WHERE city = 'Paris'");
        assert!((group.total_service_time_ms - 30.0).abs() < 1e-9);
        assert!((group.avg_service_time_ms() - 15.0).abs() < 1e-9);
        assert_eq!(group.scan_consistencies.iter().collect::<Vec<_>>(), vec!["scan_plus"]);
    }

    #[test]
    fn test_index_usage_and_connections() {
        let state = build(&records());

        let city = &state.indexes["def_city::hotel._default._default"];
        assert_eq!(city.usage_count, 2);
        // Only the first record carried scan stats
        assert_eq!(city.scan_service_times_ms, vec![2.0]);
        assert_eq!(city.items_scanned, vec![4]);
        assert_eq!(city.items_fetched, vec![4]);

        let primary = &state.indexes["#primary::airline._default._default"];
        assert!(primary.is_primary);

        let edge = &state.connections["SELECT * FROM hotel WHERE city = ?::def_city::hotel._default._default"];
        assert_eq!(edge.count, 2);
        assert_eq!(state.connections.len(), 2);

        // Records without a plan contribute only statement data
        assert_eq!(state.queries["SELECT ?"].count, 1);
    }

    #[test]
    fn test_sorted_outputs() {
        let state = build(&records());
        let indexes: Vec<&str> = state.sorted_indexes().into_iter().map(|i| i.key.as_str()).collect();
        assert_eq!(indexes, vec!["def_city::hotel._default._default", "#primary::airline._default._default"]);

        let queries: Vec<u64> = state.sorted_queries().iter().map(|q| q.count).collect();
        assert_eq!(queries, vec![2, 1, 1]);
        let ties: Vec<&str> = state.sorted_queries().into_iter().skip(1).map(|q| q.normalized.as_str()).collect();
        assert_eq!(ties, vec!["SELECT * FROM airline", "SELECT ?"]);
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let records = records();
        let refs: Vec<&AnalyzedRecord> = records.iter().collect();
        let builder = GraphBuilder::new(500);
        let mut cache = PassCache::new(50, 64);

        let first = builder.build(&refs, &IndexCatalog::default(), &mut cache);
        let second = builder.build(&refs, &IndexCatalog::default(), &mut cache);
        assert_eq!(first, second);
    }

    #[test]
    fn test_cyclic_plan_counts_scan_once() {
        let operators = vec![
            PlanOperator::new("Sequence")
                .with_children(ChildSlots::List { children: vec![OperatorId(1), OperatorId(0)] }),
            PlanOperator::new("IndexScan3").with_index("idx"),
        ];
        let mut record = records().remove(3);
        record.plan = Some(PlanTree::from_operators(operators, OperatorId(0)));

        let state = build(&[record]);
        assert_eq!(state.indexes["idx::_default._default._default"].usage_count, 1);
    }
}
