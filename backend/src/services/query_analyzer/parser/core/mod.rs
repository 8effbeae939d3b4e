//! Core parsing components for completed-request analysis

pub mod catalog_parser;
pub mod keyspace_parser;
pub mod operator_parser;
pub mod operator_walker;
pub mod plan_parser;
pub mod row_reader;
pub mod statement_normalizer;
pub mod tree_builder;
pub mod value_parser;

pub use catalog_parser::CatalogParser;
pub use keyspace_parser::KeyspaceParser;
pub use operator_parser::OperatorParser;
pub use operator_walker::{OperatorWalker, WalkScope};
pub use plan_parser::PlanParser;
pub use row_reader::RowReader;
pub use statement_normalizer::StatementNormalizer;
pub use tree_builder::TreeBuilder;
pub use value_parser::{DurationParser, ValueParser};
