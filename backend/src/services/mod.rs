pub mod query_analyzer;

pub use query_analyzer::{AnalysisReport, QueryAnalyzer};
