//! Plan parser for N1QL execution plans
//!
//! Ingests the heterogeneous plan JSON (object, JSON-encoded string, or an
//! explain wrapper) into a [`PlanTree`] arena with canonical [`ChildSlots`].
//! Every other module relies on the canonical slots only.

use crate::services::query_analyzer::models::*;
use crate::services::query_analyzer::parser::error::{ParseError, ParseResult};
use serde_json::{Map, Value};

/// Slots holding one child operator
const SINGLE_SLOTS: &[&str] = &["~child", "child", "input", "scan"];

/// Slots holding a list of child operators
const LIST_SLOTS: &[&str] = &["~children", "children", "inputs", "scans"];

/// Outer / inner slot pairs
const BINARY_SLOTS: &[(&str, &str)] = &[("first", "second"), ("left", "right"), ("outer", "inner")];

const MERGE_SLOTS: &[&str] = &["insert", "delete", "update"];

const SUBQUERIES_FIELD: &str = "~subqueries";
const OPERATOR_FIELD: &str = "#operator";
const STATS_FIELD: &str = "#stats";
const INDEX_FIELD: &str = "index";
const KEYSPACE_FIELDS: &[&str] = &["namespace", "bucket", "scope", "keyspace"];

/// Parser turning plan JSON into an operator arena
pub struct PlanParser;

impl PlanParser {
    /// Parse a plan value: object, JSON-encoded string, or `{"plan": ...}` wrapper
    pub fn parse(value: &Value) -> ParseResult<PlanTree> {
        match value {
            Value::String(text) => Self::parse_str(text),
            Value::Object(obj) => {
                let root_obj = Self::unwrap_explain(obj);
                let mut builder = ArenaBuilder::default();
                let root = builder.ingest(root_obj);
                Ok(PlanTree::from_operators(builder.operators, root))
            },
            other => Err(ParseError::UnexpectedShape(format!(
                "plan must be an object or string, got {}",
                Self::type_name(other)
            ))),
        }
    }

    /// Parse a JSON-encoded plan string
    pub fn parse_str(text: &str) -> ParseResult<PlanTree> {
        let value: Value = serde_json::from_str(text)?;
        match value {
            // Doubly-encoded plans are not a valid shape
            Value::String(_) => Err(ParseError::UnexpectedShape(
                "plan string decoded to another string".to_string(),
            )),
            other => Self::parse(&other),
        }
    }

    /// Descend through `{"plan": {...}}` explain wrappers without an operator tag
    fn unwrap_explain(obj: &Map<String, Value>) -> &Map<String, Value> {
        let mut current = obj;
        while !current.contains_key(OPERATOR_FIELD) {
            match current.get("plan") {
                Some(Value::Object(inner)) => current = inner,
                _ => break,
            }
        }
        current
    }

    fn type_name(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

// ============================================================================
// Arena Builder
// ============================================================================

#[derive(Default)]
struct ArenaBuilder {
    operators: Vec<PlanOperator>,
}

impl ArenaBuilder {
    /// Ingest one object, pre-order: the parent id is reserved before children
    fn ingest(&mut self, obj: &Map<String, Value>) -> OperatorId {
        let id = OperatorId(self.operators.len());
        self.operators.push(PlanOperator::default());

        let kind = obj.get(OPERATOR_FIELD).and_then(Value::as_str).map(str::to_string);
        let children = self.ingest_children(obj);
        let subqueries = self.ingest_subqueries(obj);

        let stats = match obj.get(STATS_FIELD) {
            Some(Value::Object(map)) => {
                Some(OperatorStats(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()))
            },
            _ => None,
        };

        let text_field = |name: &str| obj.get(name).and_then(Value::as_str).map(str::to_string);
        let keyspace = KeyspaceFields {
            namespace: text_field("namespace"),
            bucket: text_field("bucket"),
            scope: text_field("scope"),
            keyspace: text_field("keyspace"),
        };

        let properties = obj
            .iter()
            .filter(|(key, value)| !Self::is_structural(key, value))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        self.operators[id.0] = PlanOperator {
            kind,
            children,
            subqueries,
            stats,
            index: text_field(INDEX_FIELD),
            keyspace,
            properties,
        };
        id
    }

    fn ingest_children(&mut self, obj: &Map<String, Value>) -> ChildSlots {
        if MERGE_SLOTS.iter().any(|slot| matches!(obj.get(*slot), Some(Value::Object(_)))) {
            let mut merge_child = |slot: &str| match obj.get(slot) {
                Some(Value::Object(child)) => Some(self.ingest(child)),
                _ => None,
            };
            let insert = merge_child("insert");
            let delete = merge_child("delete");
            let update = merge_child("update");
            return ChildSlots::Merge { insert, delete, update };
        }

        let mut collected = Vec::new();
        let mut binary = None;

        for (first_slot, second_slot) in BINARY_SLOTS {
            match (obj.get(*first_slot), obj.get(*second_slot)) {
                (Some(Value::Object(first)), Some(Value::Object(second))) if binary.is_none() => {
                    let first = self.ingest(first);
                    let second = self.ingest(second);
                    binary = Some((first, second));
                },
                (first, second) => {
                    for value in [first, second].into_iter().flatten() {
                        self.ingest_slot_value(value, &mut collected);
                    }
                },
            }
        }

        for slot in SINGLE_SLOTS.iter().chain(LIST_SLOTS) {
            if let Some(value) = obj.get(*slot) {
                self.ingest_slot_value(value, &mut collected);
            }
        }

        match (binary, collected.len()) {
            (Some((first, second)), 0) => ChildSlots::Binary { first, second },
            (Some((first, second)), _) => {
                let mut children = vec![first, second];
                children.extend(collected);
                ChildSlots::List { children }
            },
            (None, 0) => ChildSlots::None,
            (None, 1) => ChildSlots::Single { child: collected[0] },
            (None, _) => ChildSlots::List { children: collected },
        }
    }

    /// Objects and arrays of objects count as children; anything else is ignored
    fn ingest_slot_value(&mut self, value: &Value, collected: &mut Vec<OperatorId>) {
        match value {
            Value::Object(child) => collected.push(self.ingest(child)),
            Value::Array(items) => {
                for item in items {
                    if let Value::Object(child) = item {
                        collected.push(self.ingest(child));
                    }
                }
            },
            _ => {},
        }
    }

    fn ingest_subqueries(&mut self, obj: &Map<String, Value>) -> Vec<SubqueryExecution> {
        let Some(Value::Array(entries)) = obj.get(SUBQUERIES_FIELD) else {
            return Vec::new();
        };

        let mut subqueries = Vec::new();
        for entry in entries {
            let Value::Object(entry) = entry else { continue };
            let Some(Value::Object(timings)) = entry.get("executionTimings") else { continue };
            let root = self.ingest(timings);
            let statement = entry.get("subquery").and_then(Value::as_str).map(str::to_string);
            subqueries.push(SubqueryExecution { statement, root });
        }
        subqueries
    }

    fn is_structural(key: &str, value: &Value) -> bool {
        let is_child_slot = SINGLE_SLOTS.contains(&key)
            || LIST_SLOTS.contains(&key)
            || MERGE_SLOTS.contains(&key)
            || BINARY_SLOTS.iter().any(|(a, b)| *a == key || *b == key);

        if is_child_slot {
            return matches!(value, Value::Object(_) | Value::Array(_));
        }

        key == OPERATOR_FIELD
            || key == STATS_FIELD
            || key == SUBQUERIES_FIELD
            || key == INDEX_FIELD
            || KEYSPACE_FIELDS.contains(&key)
    }
}
