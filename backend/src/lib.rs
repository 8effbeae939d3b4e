//! Query Analyzer Library
//!
//! Core modules for analyzing N1QL completed-request dumps.

pub mod config;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use services::{AnalysisReport, QueryAnalyzer};
