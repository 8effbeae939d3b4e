//! Record filter
//!
//! Selects the records a pass aggregates: request-time range, a
//! case-insensitive statement substring, and exclusion of queries against
//! the `system:` catalog keyspaces.

use crate::services::query_analyzer::models::AnalyzedRecord;
use chrono::{DateTime, Utc};

/// Spellings of the system namespace prefix
const SYSTEM_PREFIXES: &[&str] = &["system:", "`system`:"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    /// Inclusive lower bound on request time
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on request time
    pub to: Option<DateTime<Utc>>,
    pub sql_contains: Option<String>,
    pub exclude_system: bool,
}

impl RecordFilter {
    /// Records passing the filter, in input order
    pub fn apply<'r>(&self, records: &'r [AnalyzedRecord]) -> Vec<&'r AnalyzedRecord> {
        let needle = self.sql_contains.as_deref().map(str::to_lowercase).filter(|n| !n.is_empty());
        records.iter().filter(|record| self.matches_with(record, needle.as_deref())).collect()
    }

    pub fn matches(&self, record: &AnalyzedRecord) -> bool {
        let needle = self.sql_contains.as_deref().map(str::to_lowercase).filter(|n| !n.is_empty());
        self.matches_with(record, needle.as_deref())
    }

    fn matches_with(&self, record: &AnalyzedRecord, needle: Option<&str>) -> bool {
        if self.from.is_some() || self.to.is_some() {
            // Records without a parsable time cannot be placed in a range
            let Some(time) = record.request_time else {
                return false;
            };
            if self.from.is_some_and(|from| time < from) || self.to.is_some_and(|to| time > to) {
                return false;
            }
        }

        let statement = record.statement.as_deref().unwrap_or("").to_lowercase();

        if let Some(needle) = needle
            && !statement.contains(needle)
        {
            return false;
        }

        !(self.exclude_system && Self::is_system_statement(&statement))
    }

    /// True when the statement touches a `system:` keyspace
    pub fn is_system_statement(statement: &str) -> bool {
        let lowered = statement.to_lowercase();
        SYSTEM_PREFIXES.iter().any(|prefix| lowered.contains(prefix))
    }
}
