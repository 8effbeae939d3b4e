//! Operator parser for N1QL execution plans
//!
//! Handles operator kind classification.

use crate::services::query_analyzer::models::OperatorFamily;

/// Parser for operator-related operations
pub struct OperatorParser;

impl OperatorParser {
    /// Determine the structural family from an `#operator` tag
    pub fn determine_family(kind: &str) -> OperatorFamily {
        match kind {
            "Sequence" => OperatorFamily::Sequence,
            "Parallel" => OperatorFamily::Parallel,
            "Authorize" => OperatorFamily::Authorize,
            "DistinctScan" => OperatorFamily::DistinctScan,
            "Merge" => OperatorFamily::Merge,
            "Fetch" => OperatorFamily::Fetch,
            "UnionScan" | "IntersectScan" | "OrderedIntersectScan" => OperatorFamily::SetOperation,
            "Unnest" => OperatorFamily::Join,
            k if k.starts_with("Union") || k.starts_with("Intersect") || k.starts_with("Except") => {
                OperatorFamily::SetOperation
            },
            k if k.ends_with("Join") || k.ends_with("Nest") => OperatorFamily::Join,
            k if k.starts_with("PrimaryScan") => OperatorFamily::PrimaryScan,
            k if Self::is_index_scan_kind(k) => OperatorFamily::IndexScan,
            _ => OperatorFamily::Other,
        }
    }

    /// Secondary-index scan kinds across engine versions (`IndexScan3`, `IndexCountScan2`, ...)
    fn is_index_scan_kind(kind: &str) -> bool {
        ["IndexScan", "IndexCountScan", "IndexCountDistinctScan", "IndexFtsSearch"]
            .iter()
            .any(|prefix| kind.starts_with(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determine_family() {
        assert_eq!(OperatorParser::determine_family("Sequence"), OperatorFamily::Sequence);
        assert_eq!(OperatorParser::determine_family("Authorize"), OperatorFamily::Authorize);
        assert_eq!(OperatorParser::determine_family("UnionAll"), OperatorFamily::SetOperation);
        assert_eq!(OperatorParser::determine_family("ExceptAll"), OperatorFamily::SetOperation);
        assert_eq!(OperatorParser::determine_family("IntersectScan"), OperatorFamily::SetOperation);
        assert_eq!(OperatorParser::determine_family("NestedLoopJoin"), OperatorFamily::Join);
        assert_eq!(OperatorParser::determine_family("HashNest"), OperatorFamily::Join);
        assert_eq!(OperatorParser::determine_family("Unnest"), OperatorFamily::Join);
        assert_eq!(OperatorParser::determine_family("DistinctScan"), OperatorFamily::DistinctScan);
        assert_eq!(OperatorParser::determine_family("PrimaryScan3"), OperatorFamily::PrimaryScan);
        assert_eq!(OperatorParser::determine_family("IndexScan3"), OperatorFamily::IndexScan);
        assert_eq!(OperatorParser::determine_family("IndexCountScan2"), OperatorFamily::IndexScan);
        assert_eq!(OperatorParser::determine_family("Fetch"), OperatorFamily::Fetch);
        assert_eq!(OperatorParser::determine_family("ExpressionScan"), OperatorFamily::Other);
        assert_eq!(OperatorParser::determine_family("InitialProject"), OperatorFamily::Other);
    }

    #[test]
    fn test_scan_families() {
        assert!(OperatorParser::determine_family("IndexScan2").is_scan());
        assert!(OperatorParser::determine_family("PrimaryScan").is_scan());
        assert!(!OperatorParser::determine_family("DistinctScan").is_scan());
    }
}
