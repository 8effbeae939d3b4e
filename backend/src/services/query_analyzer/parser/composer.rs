//! Record composer - main entry point for completed-request ingestion
//!
//! Turns a raw `system:completed_requests` dump into [`AnalyzedRecord`]s:
//! statement chosen, target keyspace recovered, plan ingested, timings parsed.

use crate::services::query_analyzer::models::{AnalyzedRecord, Bsc, RequestRecord};
use crate::services::query_analyzer::parser::core::{
    DurationParser, KeyspaceParser, PlanParser, RowReader, ValueParser,
};
use crate::services::query_analyzer::parser::error::ParseResult;

const COMPLETED_REQUESTS_WRAPPER: &str = "completed_requests";

/// Composer orchestrating per-record parsing
pub struct RecordComposer;

impl RecordComposer {
    /// Parse a dump; rows that are not request objects are skipped
    pub fn parse_records(
        text: &str,
        durations: &mut DurationParser,
    ) -> ParseResult<Vec<AnalyzedRecord>> {
        let rows = RowReader::read_rows(text, COMPLETED_REQUESTS_WRAPPER)?;
        let total = rows.len();
        let mut records = Vec::with_capacity(total);

        for (position, row) in rows.into_iter().enumerate() {
            match serde_json::from_value::<RequestRecord>(row) {
                Ok(raw) => {
                    let index = records.len();
                    records.push(Self::compose(index, raw, durations));
                },
                Err(e) => tracing::warn!("Skipping request row {}: {}", position, e),
            }
        }

        tracing::info!("Ingested {} of {} request rows", records.len(), total);
        Ok(records)
    }

    /// Build one analyzed record
    pub fn compose(index: usize, raw: RequestRecord, durations: &mut DurationParser) -> AnalyzedRecord {
        let statement = Self::choose_statement(&raw);
        let bsc = statement.as_deref().map(KeyspaceParser::parse_target).unwrap_or_else(Bsc::default);

        let plan = match raw.plan.as_ref().filter(|p| !p.is_null()) {
            Some(value) => match PlanParser::parse(value) {
                Ok(tree) => Some(tree),
                Err(e) => {
                    tracing::debug!(
                        "Ignoring plan of request {}: {}",
                        raw.request_id.as_deref().unwrap_or("<unknown>"),
                        e
                    );
                    None
                },
            },
            None => None,
        };

        let elapsed_ms = raw.elapsed_time.as_deref().map(|t| durations.parse_ms(t)).unwrap_or(0.0);
        let service_ms = raw.service_time.as_deref().map(|t| durations.parse_ms(t)).unwrap_or(0.0);
        let request_time =
            raw.request_time.as_deref().and_then(|t| ValueParser::parse_timestamp(t).ok());

        AnalyzedRecord { index, raw, statement, bsc, plan, elapsed_ms, service_ms, request_time }
    }

    /// `preparedText` wins over the `EXECUTE name` statement of prepared requests
    fn choose_statement(raw: &RequestRecord) -> Option<String> {
        [&raw.prepared_text, &raw.statement]
            .into_iter()
            .flatten()
            .find(|text| !text.trim().is_empty())
            .cloned()
    }
}
