//! Index-usage extraction and primary-index resolution
//!
//! Finds the scans of a plan and keys each one by `indexName::bucket.scope.collection`.
//! Operators naming their own keyspace override the statement's target, and
//! subquery executions re-derive the target from their own text.

use crate::services::query_analyzer::models::{
    Bsc, IndexCatalog, OperatorFamily, OperatorId, OperatorStats, PlanTree, PrimaryResolution,
    constants::{KEY_SEPARATOR, PRIMARY_PLACEHOLDER, stats_keys},
};
use crate::services::query_analyzer::parser::core::{
    DurationParser, KeyspaceParser, OperatorParser, OperatorWalker, WalkScope,
};
use std::collections::HashSet;

/// Timing / cardinality observed for one scan
#[derive(Debug, Clone, PartialEq)]
pub struct IndexUsageSample {
    pub serv_time_ms: f64,
    pub items_scanned: u64,
    /// `#itemsOut` of the matching `Fetch`, 0 for covering scans
    pub items_fetched: u64,
}

/// One scan found in a plan
#[derive(Debug, Clone, PartialEq)]
pub struct IndexUsage {
    pub name: String,
    pub bsc: Bsc,
    pub is_primary: bool,
    pub resolution: PrimaryResolution,
    pub sample: Option<IndexUsageSample>,
}

impl IndexUsage {
    /// Composite identity `indexName::bsc`
    pub fn key(&self) -> String {
        format!("{}{}{}", self.name, KEY_SEPARATOR, self.bsc)
    }
}

/// Extractor for index usages
pub struct IndexUsageExtractor<'a> {
    tree: &'a PlanTree,
    catalog: &'a IndexCatalog,
    walker: &'a mut OperatorWalker,
    durations: &'a mut DurationParser,
    /// Subquery roots already expanded
    expanded: HashSet<OperatorId>,
    usages: Vec<IndexUsage>,
}

impl<'a> IndexUsageExtractor<'a> {
    /// Every scan of `tree`, main plan first, then its subqueries
    pub fn extract(
        tree: &'a PlanTree,
        statement_bsc: &Bsc,
        catalog: &'a IndexCatalog,
        walker: &'a mut OperatorWalker,
        durations: &'a mut DurationParser,
    ) -> Vec<IndexUsage> {
        let mut extractor = Self {
            tree,
            catalog,
            walker,
            durations,
            expanded: HashSet::new(),
            usages: Vec::new(),
        };
        extractor.expanded.insert(tree.root);
        extractor.extract_from(tree.root, statement_bsc);
        extractor.usages
    }

    fn extract_from(&mut self, root: OperatorId, inherited: &Bsc) {
        let tree = self.tree;
        // Each walk has its own visited set
        let walked = self.walker.walk(tree, root, WalkScope::MainPlanOnly);
        let mut pending = Vec::new();

        for (position, id) in walked.iter().enumerate() {
            let Some(op) = tree.get(*id) else { continue };
            let family = OperatorParser::determine_family(op.kind_str());

            if family.is_scan() {
                let index = match (&op.index, family) {
                    (Some(index), _) => Some(index.as_str()),
                    (None, OperatorFamily::PrimaryScan) => Some(PRIMARY_PLACEHOLDER),
                    (None, _) => None,
                };

                if let Some(index) = index {
                    let bsc = op.keyspace.explicit_bsc().unwrap_or_else(|| inherited.clone());
                    let sample = match op.stats.as_ref() {
                        Some(stats) => Some(IndexUsageSample {
                            serv_time_ms: self.duration(stats, stats_keys::SERV_TIME),
                            items_scanned: stats.count(stats_keys::ITEMS_OUT).unwrap_or(0),
                            items_fetched: self.fetched_after(&walked[position + 1..], &bsc),
                        }),
                        None => None,
                    };
                    let usage = self.resolve(index, family, bsc, sample);
                    self.usages.push(usage);
                }
            }

            for sub in &op.subqueries {
                if self.expanded.insert(sub.root) {
                    let sub_bsc = sub
                        .statement
                        .as_deref()
                        .map(KeyspaceParser::parse_target)
                        .unwrap_or_else(|| inherited.clone());
                    pending.push((sub.root, sub_bsc));
                }
            }
        }

        for (sub_root, sub_bsc) in pending {
            self.extract_from(sub_root, &sub_bsc);
        }
    }

    /// Name the usage, substituting the catalog's primary index for `#primary`
    fn resolve(
        &self,
        index: &str,
        family: OperatorFamily,
        bsc: Bsc,
        sample: Option<IndexUsageSample>,
    ) -> IndexUsage {
        if index == PRIMARY_PLACEHOLDER {
            return match self.catalog.primary_for(&bsc) {
                Some(entry) => IndexUsage {
                    name: entry.name.clone(),
                    bsc,
                    is_primary: true,
                    resolution: PrimaryResolution::Resolved,
                    sample,
                },
                None => IndexUsage {
                    name: PRIMARY_PLACEHOLDER.to_string(),
                    bsc,
                    is_primary: true,
                    resolution: PrimaryResolution::Unresolved,
                    sample,
                },
            };
        }

        let catalog_primary = self
            .catalog
            .entries
            .iter()
            .any(|entry| entry.is_primary && entry.name == index && entry.bsc == bsc);
        let is_primary = family == OperatorFamily::PrimaryScan || catalog_primary;

        IndexUsage {
            name: index.to_string(),
            bsc,
            is_primary,
            resolution: if is_primary { PrimaryResolution::Named } else { PrimaryResolution::NotPrimary },
            sample,
        }
    }

    /// `#itemsOut` of the next `Fetch` on the same keyspace
    fn fetched_after(&self, rest: &[OperatorId], scan_bsc: &Bsc) -> u64 {
        rest.iter()
            .filter_map(|id| self.tree.get(*id))
            .filter(|op| OperatorParser::determine_family(op.kind_str()) == OperatorFamily::Fetch)
            .find(|op| op.keyspace.explicit_bsc().is_none_or(|fetch_bsc| fetch_bsc == *scan_bsc))
            .and_then(|op| op.stats.as_ref())
            .and_then(|stats| stats.count(stats_keys::ITEMS_OUT))
            .unwrap_or(0)
    }

    fn duration(&mut self, stats: &OperatorStats, name: &str) -> f64 {
        stats.raw(name).map(|value| self.durations.parse_value_ms(value)).unwrap_or(0.0)
    }
}
