//! Index catalog parser
//!
//! Reads `system:indexes` dumps into an [`IndexCatalog`] used to resolve
//! primary-scan placeholders.

use crate::services::query_analyzer::models::{Bsc, IndexCatalog, IndexCatalogEntry, IndexType};
use crate::services::query_analyzer::parser::core::{KeyspaceParser, RowReader};
use crate::services::query_analyzer::parser::error::ParseResult;
use serde::Deserialize;

const INDEXES_WRAPPER: &str = "indexes";

/// One `system:indexes` row
#[derive(Debug, Deserialize)]
struct IndexRow {
    name: String,
    #[serde(default)]
    is_primary: bool,
    bucket_id: Option<String>,
    scope_id: Option<String>,
    keyspace_id: Option<String>,
    using: Option<String>,
    #[serde(rename = "indexType")]
    index_type: Option<String>,
    #[serde(rename = "type")]
    type_name: Option<String>,
    num_replica: Option<u32>,
    last_scan_time: Option<String>,
    #[serde(rename = "indexString")]
    index_string: Option<String>,
    statement: Option<String>,
}

pub struct CatalogParser;

impl CatalogParser {
    /// Parse a dump; malformed rows are skipped
    pub fn parse(text: &str) -> ParseResult<IndexCatalog> {
        let rows = RowReader::read_rows(text, INDEXES_WRAPPER)?;
        let mut entries = Vec::with_capacity(rows.len());

        for (position, row) in rows.into_iter().enumerate() {
            match serde_json::from_value::<IndexRow>(row) {
                Ok(row) => entries.push(Self::to_entry(row)),
                Err(e) => tracing::warn!("Skipping index row {}: {}", position, e),
            }
        }

        tracing::debug!("Loaded {} index definitions", entries.len());
        Ok(IndexCatalog::new(entries))
    }

    fn to_entry(row: IndexRow) -> IndexCatalogEntry {
        let definition = row.index_string.or(row.statement);
        let bsc = Self::resolve_bsc(
            row.bucket_id.as_deref(),
            row.scope_id.as_deref(),
            row.keyspace_id.as_deref(),
            definition.as_deref(),
        );

        let is_primary =
            row.is_primary || definition.as_deref().is_some_and(KeyspaceParser::is_primary_definition);

        let declared_type = row.using.or(row.index_type).or(row.type_name);
        let index_type = match declared_type.as_deref().map(str::to_lowercase).as_deref() {
            None | Some("gsi") => IndexType::Gsi,
            Some("fts") => IndexType::Fts,
            Some(_) => IndexType::Other,
        };

        IndexCatalogEntry {
            name: row.name,
            bsc,
            is_primary,
            index_type,
            num_replica: row.num_replica.unwrap_or(0),
            last_scan_time: row.last_scan_time,
            definition,
        }
    }

    /// Collection indexes carry `bucket_id`; bucket-level ones only `keyspace_id`
    fn resolve_bsc(
        bucket_id: Option<&str>,
        scope_id: Option<&str>,
        keyspace_id: Option<&str>,
        definition: Option<&str>,
    ) -> Bsc {
        match (bucket_id, keyspace_id) {
            (Some(bucket), collection) => Bsc::from_parts(bucket, scope_id, collection),
            (None, Some(keyspace)) => Bsc::from_parts(keyspace, None, None),
            (None, None) => definition.and_then(KeyspaceParser::parse_index_target).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_collection_and_bucket_indexes() {
        let text = r##"[
            {"indexes": {"name": "#primary", "is_primary": true, "bucket_id": "travel-sample",
                         "scope_id": "inventory", "keyspace_id": "hotel", "using": "gsi"}},
            {"indexes": {"name": "beer_primary", "is_primary": true, "keyspace_id": "beer-sample",
                         "num_replica": 1, "using": "gsi"}},
            {"name": "fts_idx", "using": "fts", "indexString": "CREATE INDEX fts_idx ON `b`.`s`.`c`(x)"}
        ]"##;

        let catalog = CatalogParser::parse(text).unwrap();
        assert_eq!(catalog.len(), 3);

        let hotel = &catalog.entries[0];
        assert_eq!(hotel.bsc.to_string(), "travel-sample.inventory.hotel");
        assert!(hotel.is_primary);

        let beer = &catalog.entries[1];
        assert_eq!(beer.bsc.to_string(), "beer-sample._default._default");
        assert_eq!(beer.num_replica, 1);

        let fts = &catalog.entries[2];
        assert_eq!(fts.index_type, IndexType::Fts);
        assert_eq!(fts.bsc.to_string(), "b.s.c");
        assert!(!fts.is_primary);
    }

    #[test]
    fn test_primary_lookup() {
        let text = r#"[{"name": "beer_primary", "is_primary": true, "keyspace_id": "beer-sample"}]"#;
        let catalog = CatalogParser::parse(text).unwrap();

        let found = catalog.primary_for(&Bsc::from_parts("beer-sample", None, None));
        assert_eq!(found.map(|e| e.name.as_str()), Some("beer_primary"));
        assert!(catalog.primary_for(&Bsc::from_parts("other", None, None)).is_none());
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let text = r#"[{"is_primary": true}, {"name": "ok"}]"#;
        let catalog = CatalogParser::parse(text).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.entries[0].name, "ok");
    }

    #[test]
    fn test_primary_from_definition_and_type_aliases() {
        let text = r##"[
            {"name": "#primary", "indexString": "CREATE PRIMARY INDEX `#primary` ON `beer-sample`"},
            {"name": "by_style", "indexType": "FTS", "statement": "create index by_style on `beer-sample`(style)"},
            {"name": "by_abv", "type": "gsi", "statement": "CREATE INDEX by_abv ON `beer-sample`(abv)"}
        ]"##;
        let catalog = CatalogParser::parse(text).unwrap();

        let primary = catalog.primary_for(&Bsc::from_parts("beer-sample", None, None));
        assert_eq!(primary.map(|e| e.name.as_str()), Some("#primary"));

        assert_eq!(catalog.entries[1].index_type, IndexType::Fts);
        assert!(!catalog.entries[1].is_primary);
        assert_eq!(catalog.entries[2].index_type, IndexType::Gsi);
        assert!(!catalog.entries[2].is_primary);
    }
}
