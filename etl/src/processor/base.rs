use crate::error::EtlResult;
use crate::types::{Record, RecordError, Row};

/// Records accepted from a chunk and the rows that were dropped.
///
/// Positions are 1-based within the chunk given to [`Processor::validate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationOutcome {
    pub records: Vec<Record>,
    /// Position of the source row of each record in `records`.
    pub row_positions: Vec<usize>,
    pub errors: Vec<RecordError>,
}

impl ValidationOutcome {
    pub fn accept(&mut self, record: Record, position: usize) {
        self.records.push(record);
        self.row_positions.push(position);
    }
}

/// Turns raw source rows into canonical records of one entity.
pub trait Processor: Send + Sync {
    fn entity(&self) -> &str;

    /// Maps `rows` without validating them, failing on the first transform error.
    fn process(&self, rows: &[Row]) -> EtlResult<Vec<Record>>;

    /// Maps and validates `rows`. Failing rows are reported in the outcome and never abort the
    /// chunk.
    fn validate(&self, rows: &[Row]) -> ValidationOutcome;
}
