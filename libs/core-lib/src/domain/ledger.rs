use super::aggregate::{dedupe_by_key, filter, sort_by_date_descending, stats};
use super::attendance::{AttendanceRecord, AttendanceStats, ModuleScope};
use super::normalize::NormalizedBatch;

/// The canonical, deduplicated set of attendance records for one query scope.
///
/// A ledger is a value: fetching again builds a new one and merging returns a
/// new one, so a view holding an older ledger never sees it change underneath.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttendanceLedger {
    records: Vec<AttendanceRecord>,
    dropped: usize,
}

impl AttendanceLedger {
    /// Builds a ledger from batches in arrival order. Later batches win on key clashes.
    pub fn rebuild(batches: impl IntoIterator<Item = NormalizedBatch>) -> Self {
        let mut records = Vec::new();
        let mut dropped = 0;
        for batch in batches {
            dropped += batch.dropped.len();
            records.extend(batch.records);
        }
        Self {
            records: dedupe_by_key(records),
            dropped,
        }
    }

    pub fn from_records(records: Vec<AttendanceRecord>) -> Self {
        Self {
            records: dedupe_by_key(records),
            dropped: 0,
        }
    }

    /// Returns a new ledger with `newer` applied on top of this one.
    pub fn merge(&self, newer: NormalizedBatch) -> Self {
        let mut records = self.records.clone();
        let dropped = self.dropped + newer.dropped.len();
        records.extend(newer.records);
        Self {
            records: dedupe_by_key(records),
            dropped,
        }
    }

    /// Records in arrival order.
    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    /// How many server items were discarded as malformed while building this ledger.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Filtered records in display order (newest first).
    pub fn view(&self, scope: &ModuleScope) -> Vec<AttendanceRecord> {
        sort_by_date_descending(filter(&self.records, scope))
    }

    pub fn stats(&self, scope: &ModuleScope) -> AttendanceStats {
        stats(&filter(&self.records, scope))
    }
}
