//! Pure aggregation and ordering over attendance records.
//!
//! Nothing here holds state: every function takes a collection and returns a new
//! one (or a summary), so the same inputs produce the same view no matter which
//! role asked for it.

use super::attendance::{
    AttendanceKey, AttendanceRecord, AttendanceStats, AttendanceStatus, ModuleScope,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Keeps the records the scope matches, in their original order.
pub fn filter(records: &[AttendanceRecord], scope: &ModuleScope) -> Vec<AttendanceRecord> {
    records
        .iter()
        .filter(|record| scope.matches(record))
        .cloned()
        .collect()
}

pub fn stats(records: &[AttendanceRecord]) -> AttendanceStats {
    let mut summary = AttendanceStats {
        total: records.len(),
        ..AttendanceStats::default()
    };
    for record in records {
        match record.status {
            AttendanceStatus::Present => summary.present += 1,
            AttendanceStatus::Absent => summary.absent += 1,
            AttendanceStatus::Late => summary.late += 1,
        }
    }
    summary.present_percentage = percentage(summary.present, summary.total);
    summary.attendance_rate = percentage(summary.present + summary.late, summary.total);
    summary
}

/// `part / total` as a percentage rounded to one decimal; zero when `total` is zero.
fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = part as f64 / total as f64 * 100.0;
    (raw * 10.0).round() / 10.0
}

/// Newest first. Records sharing a date keep their arrival order.
pub fn sort_by_date_descending(mut records: Vec<AttendanceRecord>) -> Vec<AttendanceRecord> {
    // sort_by is stable
    records.sort_by(|a, b| b.date.cmp(&a.date));
    records
}

/// Enforces one record per (student, module, date).
///
/// The later record in arrival order wins and takes the slot where the key was
/// first seen, so a re-mark does not reshuffle the collection.
pub fn dedupe_by_key(records: Vec<AttendanceRecord>) -> Vec<AttendanceRecord> {
    let mut slots: HashMap<AttendanceKey, usize> = HashMap::with_capacity(records.len());
    let mut deduped: Vec<AttendanceRecord> = Vec::with_capacity(records.len());

    for record in records {
        match slots.get(&record.key()) {
            Some(&slot) => deduped[slot] = record,
            None => {
                slots.insert(record.key(), deduped.len());
                deduped.push(record);
            }
        }
    }
    deduped
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    Date,
    Status,
    Module,
    Student,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

/// Stable sort on a single column, as the log tables offer it.
/// Module and student columns sort by display name, falling back to the id.
pub fn sort_by(
    mut records: Vec<AttendanceRecord>,
    field: SortField,
    direction: SortDirection,
) -> Vec<AttendanceRecord> {
    let compare = |a: &AttendanceRecord, b: &AttendanceRecord| -> Ordering {
        match field {
            SortField::Date => a.date.cmp(&b.date),
            SortField::Status => a.status.cmp(&b.status),
            SortField::Module => module_label(a).cmp(module_label(b)),
            SortField::Student => student_label(a).cmp(student_label(b)),
        }
    };
    match direction {
        SortDirection::Asc => records.sort_by(compare),
        SortDirection::Desc => records.sort_by(|a, b| compare(b, a)),
    }
    records
}

fn module_label(record: &AttendanceRecord) -> &str {
    record.module_title.as_deref().unwrap_or(&record.module_id)
}

fn student_label(record: &AttendanceRecord) -> &str {
    record.student_name.as_deref().unwrap_or(&record.student_id)
}

/// Stats per student id, keys in ascending order.
pub fn stats_by_student(records: &[AttendanceRecord]) -> BTreeMap<String, AttendanceStats> {
    grouped_stats(records, |record| record.student_id.clone())
}

/// Stats per module id, keys in ascending order.
pub fn stats_by_module(records: &[AttendanceRecord]) -> BTreeMap<String, AttendanceStats> {
    grouped_stats(records, |record| record.module_id.clone())
}

fn grouped_stats<F>(records: &[AttendanceRecord], key: F) -> BTreeMap<String, AttendanceStats>
where
    F: Fn(&AttendanceRecord) -> String,
{
    let mut groups: BTreeMap<String, Vec<AttendanceRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(key(record)).or_default().push(record.clone());
    }
    groups
        .into_iter()
        .map(|(group, members)| (group, stats(&members)))
        .collect()
}
