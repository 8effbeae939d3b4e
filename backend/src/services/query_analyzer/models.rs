//! Query analysis data models
//!
//! These models represent the structured data extracted from completed-request
//! dumps. They are serializable so rendering collaborators can consume them
//! directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Constants
// ============================================================================

pub mod constants {
    /// Default scope / collection / bucket name
    pub const DEFAULT_KEYSPACE_PART: &str = "_default";

    /// Placeholder index name emitted by primary scans
    pub const PRIMARY_PLACEHOLDER: &str = "#primary";

    /// Scan consistency that is not worth reporting
    pub const DEFAULT_SCAN_CONSISTENCY: &str = "unbounded";

    /// Separator used in composite keys
    pub const KEY_SEPARATOR: &str = "::";

    /// Well-known counter names inside `#stats`
    pub mod stats_keys {
        pub const EXEC_TIME: &str = "execTime";
        pub const KERN_TIME: &str = "kernTime";
        pub const SERV_TIME: &str = "servTime";
        pub const ITEMS_IN: &str = "#itemsIn";
        pub const ITEMS_OUT: &str = "#itemsOut";
        pub const USED_MEMORY: &str = "usedMemory";
    }

    /// Walker / normalizer limits
    pub mod limits {
        /// Default depth budget for plan traversal
        pub const DEFAULT_MAX_DEPTH: usize = 50;

        /// Default entry count for every bounded cache
        pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;
    }
}

// ============================================================================
// Keyspace
// ============================================================================

/// `bucket.scope.collection` triple identifying a statement's target keyspace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bsc {
    pub bucket: String,
    pub scope: String,
    pub collection: String,
}

impl Bsc {
    /// Build a triple, filling missing parts with `_default`
    pub fn from_parts(bucket: &str, scope: Option<&str>, collection: Option<&str>) -> Self {
        Self {
            bucket: bucket.to_string(),
            scope: scope.unwrap_or(constants::DEFAULT_KEYSPACE_PART).to_string(),
            collection: collection.unwrap_or(constants::DEFAULT_KEYSPACE_PART).to_string(),
        }
    }

    /// True for `_default._default._default`, which means "unknown target"
    pub fn is_default(&self) -> bool {
        self.bucket == constants::DEFAULT_KEYSPACE_PART
            && self.scope == constants::DEFAULT_KEYSPACE_PART
            && self.collection == constants::DEFAULT_KEYSPACE_PART
    }
}

impl Default for Bsc {
    fn default() -> Self {
        Self::from_parts(constants::DEFAULT_KEYSPACE_PART, None, None)
    }
}

impl fmt::Display for Bsc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.bucket, self.scope, self.collection)
    }
}

// ============================================================================
// Plan Tree (ingested, canonical shape)
// ============================================================================

/// Index of an operator inside its [`PlanTree`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperatorId(pub usize);

/// Identity of one ingested plan, used as the memoization key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PlanToken(u64);

impl PlanToken {
    /// Issue a fresh token; tokens are unique for the life of the process
    pub fn issue() -> Self {
        static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

/// Canonical child layout of an operator
///
/// Every engine-specific slot name (`~child`, `~children`, `input`, `left`,
/// `first`, `scans`, ...) is mapped onto one of these variants at ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ChildSlots {
    #[default]
    None,
    Single { child: OperatorId },
    List { children: Vec<OperatorId> },
    /// Outer / inner pair (`left`/`right`, `first`/`second`, `outer`/`inner`)
    Binary { first: OperatorId, second: OperatorId },
    Merge {
        insert: Option<OperatorId>,
        delete: Option<OperatorId>,
        update: Option<OperatorId>,
    },
}

impl ChildSlots {
    /// All children in declaration order
    pub fn ids(&self) -> Vec<OperatorId> {
        match self {
            ChildSlots::None => Vec::new(),
            ChildSlots::Single { child } => vec![*child],
            ChildSlots::List { children } => children.clone(),
            ChildSlots::Binary { first, second } => vec![*first, *second],
            ChildSlots::Merge { insert, delete, update } => {
                [*insert, *delete, *update].into_iter().flatten().collect()
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ChildSlots::None)
    }
}

/// A `WITH`/subquery execution attached to an operator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubqueryExecution {
    /// Subquery text, used to re-derive the subquery's own keyspace
    pub statement: Option<String>,
    pub root: OperatorId,
}

/// Explicit keyspace fields an operator may carry
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct KeyspaceFields {
    pub namespace: Option<String>,
    pub bucket: Option<String>,
    pub scope: Option<String>,
    pub keyspace: Option<String>,
}

impl KeyspaceFields {
    /// Keyspace named by the operator itself, if any
    ///
    /// Full form is bucket/scope/keyspace; the legacy form only carries a
    /// bucket-level `keyspace`.
    pub fn explicit_bsc(&self) -> Option<Bsc> {
        match (&self.bucket, &self.scope, &self.keyspace) {
            (Some(bucket), scope, Some(keyspace)) => Some(Bsc::from_parts(
                bucket,
                Some(scope.as_deref().unwrap_or(constants::DEFAULT_KEYSPACE_PART)),
                Some(keyspace),
            )),
            (None, _, Some(keyspace)) => Some(Bsc::from_parts(keyspace, None, None)),
            (Some(bucket), scope, None) => Some(Bsc::from_parts(bucket, scope.as_deref(), None)),
            (None, _, None) => None,
        }
    }
}

/// Named counters from an operator's `#stats` block (raw strings or numbers)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OperatorStats(pub HashMap<String, serde_json::Value>);

impl OperatorStats {
    pub fn raw(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    /// Counter as an unsigned integer (JSON number or numeric string)
    pub fn count(&self, name: &str) -> Option<u64> {
        match self.0.get(name)? {
            serde_json::Value::Number(n) => {
                n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            },
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One operator of an ingested plan
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PlanOperator {
    /// Operator-kind tag (`#operator`); container objects have none
    pub kind: Option<String>,
    pub children: ChildSlots,
    pub subqueries: Vec<SubqueryExecution>,
    pub stats: Option<OperatorStats>,
    /// Target index identifier for scans
    pub index: Option<String>,
    pub keyspace: KeyspaceFields,
    /// Remaining scalar properties, kept for display
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl PlanOperator {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: Some(kind.into()), ..Default::default() }
    }

    pub fn with_children(mut self, children: ChildSlots) -> Self {
        self.children = children;
        self
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn kind_str(&self) -> &str {
        self.kind.as_deref().unwrap_or("")
    }
}

/// Structural family of an operator kind, drives traversal policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorFamily {
    Sequence,
    Parallel,
    Authorize,
    /// `UnionAll`, `IntersectAll`, `ExceptAll` and the scan combinators
    SetOperation,
    /// Binary joins and nests
    Join,
    DistinctScan,
    Merge,
    IndexScan,
    PrimaryScan,
    Fetch,
    Other,
}

impl OperatorFamily {
    pub fn is_scan(&self) -> bool {
        matches!(self, OperatorFamily::IndexScan | OperatorFamily::PrimaryScan)
    }
}

/// Arena holding one ingested plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanTree {
    pub token: PlanToken,
    pub root: OperatorId,
    pub operators: Vec<PlanOperator>,
}

impl PlanTree {
    /// Wrap an operator arena; links are not validated, so cycles are possible
    pub fn from_operators(operators: Vec<PlanOperator>, root: OperatorId) -> Self {
        Self { token: PlanToken::issue(), root, operators }
    }

    pub fn get(&self, id: OperatorId) -> Option<&PlanOperator> {
        self.operators.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

// ============================================================================
// Input Records
// ============================================================================

/// One row of a completed-request dump
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestRecord {
    pub request_id: Option<String>,
    pub request_time: Option<String>,
    pub statement: Option<String>,
    pub prepared_text: Option<String>,
    pub prepared_name: Option<String>,
    pub elapsed_time: Option<String>,
    pub service_time: Option<String>,
    pub result_count: Option<i64>,
    pub state: Option<String>,
    pub scan_consistency: Option<String>,
    pub users: Option<String>,
    /// Plan object or JSON-encoded plan string
    pub plan: Option<serde_json::Value>,
}

/// A record after ingestion: statement chosen, plan ingested, timings parsed
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzedRecord {
    /// Position among the ingested records
    pub index: usize,
    pub raw: RequestRecord,
    /// `preparedText` when present, otherwise `statement`
    pub statement: Option<String>,
    pub bsc: Bsc,
    #[serde(skip)]
    pub plan: Option<PlanTree>,
    pub elapsed_ms: f64,
    pub service_ms: f64,
    pub request_time: Option<DateTime<Utc>>,
}

// ============================================================================
// Index Catalog
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    #[default]
    Gsi,
    Fts,
    Other,
}

/// One index definition from a `system:indexes` dump
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexCatalogEntry {
    pub name: String,
    pub bsc: Bsc,
    pub is_primary: bool,
    pub index_type: IndexType,
    pub num_replica: u32,
    pub last_scan_time: Option<String>,
    pub definition: Option<String>,
}

/// Index definitions available for primary-scan resolution
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexCatalog {
    pub entries: Vec<IndexCatalogEntry>,
}

impl IndexCatalog {
    pub fn new(entries: Vec<IndexCatalogEntry>) -> Self {
        Self { entries }
    }

    /// Primary index targeting exactly `bsc`
    pub fn primary_for(&self, bsc: &Bsc) -> Option<&IndexCatalogEntry> {
        self.entries.iter().find(|entry| entry.is_primary && entry.bsc == *bsc)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Aggregates
// ============================================================================

/// Outcome of primary-index name resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryResolution {
    /// Not a primary scan
    NotPrimary,
    /// The plan already named the real index
    Named,
    /// Placeholder replaced from the index catalog
    Resolved,
    /// No catalog match; the placeholder name was kept
    Unresolved,
}

/// Usage of one index against one collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexUsageRecord {
    /// `indexName::bucket.scope.collection`
    pub key: String,
    pub name: String,
    pub bsc: Bsc,
    pub is_primary: bool,
    pub resolution: PrimaryResolution,
    pub usage_count: u64,
    pub scan_service_times_ms: Vec<f64>,
    pub items_scanned: Vec<u64>,
    pub items_fetched: Vec<u64>,
}

impl IndexUsageRecord {
    pub fn avg_scan_service_time_ms(&self) -> f64 {
        if self.scan_service_times_ms.is_empty() {
            0.0
        } else {
            self.scan_service_times_ms.iter().sum::<f64>()
                / self.scan_service_times_ms.len() as f64
        }
    }
}

/// Statements that differ only by literal values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryGroup {
    pub normalized: String,
    /// First statement seen for the group
    pub representative: String,
    pub count: u64,
    pub total_service_time_ms: f64,
    pub total_elapsed_time_ms: f64,
    /// Indices into the analyzed record list
    pub records: Vec<usize>,
    /// Scan consistencies other than `unbounded`
    pub scan_consistencies: BTreeSet<String>,
}

impl QueryGroup {
    pub fn avg_service_time_ms(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.total_service_time_ms / self.count as f64 }
    }
}

/// Edge of the index/query bipartite graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    /// `normalizedStatement::indexKey`
    pub key: String,
    pub statement: String,
    pub index_key: String,
    pub count: u64,
}

// ============================================================================
// Statistics
// ============================================================================

/// Display metrics for one operator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperatorDisplayMetrics {
    pub operator_id: OperatorId,
    pub kind: String,
    pub exec_time_ms: f64,
    pub kern_time_ms: f64,
    pub serv_time_ms: f64,
    pub items_in: Option<u64>,
    pub items_out: Option<u64>,
    pub used_memory: Option<u64>,
    /// (exec + serv) share of the plan total, rounded to 2 decimals
    pub time_percentage: f64,
}

/// Per-plan totals plus the per-operator breakdown
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PlanStatistics {
    pub operator_count: usize,
    pub max_kern_time_ms: f64,
    pub total_serv_time_ms: f64,
    pub total_exec_time_ms: f64,
    pub total_used_memory: u64,
    pub operators: Vec<OperatorDisplayMetrics>,
}

// ============================================================================
// Normalized Plan Graph
// ============================================================================

/// Index of a node inside its [`PlanGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PlanNodeId(pub usize);

/// One node of the normalized, diagram-ready plan structure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanNode {
    pub id: PlanNodeId,
    pub operator_id: OperatorId,
    pub kind: String,
    /// Previous node of the linear execution sequence (back-reference)
    pub predecessor: Option<PlanNodeId>,
    /// Next linear segment, for `Parallel` / `Authorize`
    pub subsequence: Option<PlanNodeId>,
    /// Branches, for joins / unions / merges
    pub children: Vec<PlanNodeId>,
}

/// Arena of normalized plan nodes
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PlanGraph {
    pub root: Option<PlanNodeId>,
    pub nodes: Vec<PlanNode>,
}

impl PlanGraph {
    pub fn get(&self, id: PlanNodeId) -> Option<&PlanNode> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// ============================================================================
// Timeline
// ============================================================================

/// Rounding granularity for timeline buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeGrouping {
    Second,
    #[default]
    Minute,
    Hour,
    Day,
}

impl TimeGrouping {
    pub fn bucket_millis(&self) -> i64 {
        match self {
            TimeGrouping::Second => 1_000,
            TimeGrouping::Minute => 60_000,
            TimeGrouping::Hour => 3_600_000,
            TimeGrouping::Day => 86_400_000,
        }
    }
}

impl std::str::FromStr for TimeGrouping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "second" | "seconds" | "s" => Ok(TimeGrouping::Second),
            "minute" | "minutes" | "m" => Ok(TimeGrouping::Minute),
            "hour" | "hours" | "h" => Ok(TimeGrouping::Hour),
            "day" | "days" | "d" => Ok(TimeGrouping::Day),
            other => Err(format!("unsupported time grouping: {}", other)),
        }
    }
}

/// Requests that started within one rounded time slot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineBucket {
    pub start: DateTime<Utc>,
    pub count: u64,
    pub total_elapsed_ms: f64,
}
