use super::role::Role;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Display name used when the server does not say who marked a record.
pub const SYSTEM_MARKER: &str = "System";

// --- Status ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    /// Boolean payloads only know present/absent. There is no boolean "late".
    pub fn from_present_flag(present: bool) -> Self {
        if present {
            AttendanceStatus::Present
        } else {
            AttendanceStatus::Absent
        }
    }

    /// Inverse of [`from_present_flag`](Self::from_present_flag); `None` for late.
    pub fn as_present_flag(&self) -> Option<bool> {
        match self {
            AttendanceStatus::Present => Some(true),
            AttendanceStatus::Absent => Some(false),
            AttendanceStatus::Late => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown attendance status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for AttendanceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "late" => Ok(AttendanceStatus::Late),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

// --- Record ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkedBy {
    pub role: Option<Role>,
    pub id: Option<String>,
    pub name: String,
}

impl MarkedBy {
    pub fn system() -> Self {
        Self {
            role: None,
            id: None,
            name: SYSTEM_MARKER.to_string(),
        }
    }
}

impl Default for MarkedBy {
    fn default() -> Self {
        Self::system()
    }
}

/// Identity of an attendance event. Two records with the same key describe the
/// same event and the later one overwrites the earlier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttendanceKey {
    pub student_id: String,
    pub module_id: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    pub module_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub marked_by: MarkedBy,
    pub remarks: Option<String>,
    // Display fields, attached when the server provides them
    pub student_name: Option<String>,
    pub roll_number: Option<String>,
    pub module_title: Option<String>,
    /// Full timestamp when the server sent one. Not part of the identity key.
    pub marked_at: Option<DateTime<Utc>>,
}

impl AttendanceRecord {
    pub fn new(
        id: impl Into<String>,
        student_id: impl Into<String>,
        module_id: impl Into<String>,
        date: NaiveDate,
        status: AttendanceStatus,
    ) -> Self {
        Self {
            id: id.into(),
            student_id: student_id.into(),
            module_id: module_id.into(),
            date,
            status,
            marked_by: MarkedBy::system(),
            remarks: None,
            student_name: None,
            roll_number: None,
            module_title: None,
            marked_at: None,
        }
    }

    pub fn key(&self) -> AttendanceKey {
        AttendanceKey {
            student_id: self.student_id.clone(),
            module_id: self.module_id.clone(),
            date: self.date,
        }
    }
}

// --- Scope ---

/// Status part of a scope. `All` behaves like no status filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    All,
    Present,
    Absent,
    Late,
}

impl StatusFilter {
    pub fn accepts(&self, status: AttendanceStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Present => status == AttendanceStatus::Present,
            StatusFilter::Absent => status == AttendanceStatus::Absent,
            StatusFilter::Late => status == AttendanceStatus::Late,
        }
    }
}

impl From<AttendanceStatus> for StatusFilter {
    fn from(status: AttendanceStatus) -> Self {
        match status {
            AttendanceStatus::Present => StatusFilter::Present,
            AttendanceStatus::Absent => StatusFilter::Absent,
            AttendanceStatus::Late => StatusFilter::Late,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(StatusFilter::All);
        }
        s.parse::<AttendanceStatus>().map(StatusFilter::from)
    }
}

/// Inclusive calendar range. An open end matches everything on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|start| date >= start) && self.end.is_none_or(|end| date <= end)
    }
}

/// Filter key applied to a ledger to produce a view.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleScope {
    pub module_id: Option<String>,
    pub date_range: Option<DateRange>,
    pub status: Option<StatusFilter>,
}

impl ModuleScope {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_module(module_id: impl Into<String>) -> Self {
        Self {
            module_id: Some(module_id.into()),
            ..Self::default()
        }
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        self.module_id
            .as_deref()
            .is_none_or(|module_id| record.module_id == module_id)
            && self
                .date_range
                .is_none_or(|range| range.contains(record.date))
            && self
                .status
                .is_none_or(|status| status.accepts(record.status))
    }
}

// --- Stats ---

/// Derived counts over a record collection. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceStats {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    /// present / total, percent, one decimal.
    pub present_percentage: f64,
    /// (present + late) / total, percent, one decimal.
    pub attendance_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    #[test]
    fn test_present_flag_has_no_late_form() {
        assert_eq!(
            AttendanceStatus::from_present_flag(true),
            AttendanceStatus::Present
        );
        assert_eq!(
            AttendanceStatus::from_present_flag(false),
            AttendanceStatus::Absent
        );
        assert_eq!(AttendanceStatus::Late.as_present_flag(), None);
        assert_eq!(AttendanceStatus::Absent.as_present_flag(), Some(false));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Late".parse(), Ok(AttendanceStatus::Late));
        assert_eq!(" present".parse(), Ok(AttendanceStatus::Present));
        assert!("excused".parse::<AttendanceStatus>().is_err());
        assert_eq!("ALL".parse(), Ok(StatusFilter::All));
        assert_eq!("absent".parse(), Ok(StatusFilter::Absent));
    }

    #[test]
    fn test_date_range_is_inclusive_and_open_ended() {
        let range = DateRange::between(day(2), day(4));
        assert!(!range.contains(day(1)));
        assert!(range.contains(day(2)));
        assert!(range.contains(day(4)));
        assert!(!range.contains(day(5)));

        let open = DateRange {
            start: Some(day(3)),
            end: None,
        };
        assert!(open.contains(day(31)));
        assert!(!open.contains(day(2)));
    }

    #[test]
    fn test_scope_matches_every_clause() {
        let record = AttendanceRecord::new("r1", "S1", "M1", day(2), AttendanceStatus::Late);

        assert!(ModuleScope::all().matches(&record));
        assert!(ModuleScope::for_module("M1").matches(&record));
        assert!(!ModuleScope::for_module("M2").matches(&record));
        assert!(ModuleScope::all()
            .with_status(StatusFilter::All)
            .matches(&record));
        assert!(!ModuleScope::all()
            .with_status(StatusFilter::Present)
            .matches(&record));
        assert!(!ModuleScope::for_module("M1")
            .with_date_range(DateRange::between(day(3), day(9)))
            .matches(&record));
    }

    #[test]
    fn test_new_record_defaults_to_system_marker() {
        let record = AttendanceRecord::new("r1", "S1", "M1", day(1), AttendanceStatus::Present);
        assert_eq!(record.marked_by.name, SYSTEM_MARKER);
        assert_eq!(record.marked_by.role, None);
    }
}
