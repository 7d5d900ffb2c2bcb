//! Normalization of attendance payloads into canonical [`AttendanceRecord`]s.
//!
//! Endpoints disagree on shape: some send `present: bool`, some `status: "late"`,
//! student and module references arrive as bare ids or as nested objects, and the
//! list itself may be bare or wrapped in `{ "data": [...] }`. Each item is
//! converted on its own; an item that cannot be converted is dropped and reported,
//! never allowed to fail the whole batch.

use super::attendance::{AttendanceRecord, AttendanceStatus, MarkedBy, SYSTEM_MARKER};
use super::role::parse_role;
use crate::CoreError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

// --- Wire shapes ---

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope {
    Bare(Vec<Value>),
    Wrapped { data: Option<Vec<Value>> },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(text) => text,
            RawId::Number(number) => number.to_string(),
        }
    }
}

// `_id` and `id` are separate fields: documents serialized with virtuals carry both.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRefObject {
    #[serde(rename = "_id")]
    object_id: Option<RawId>,
    id: Option<RawId>,
    name: Option<String>,
    title: Option<String>,
    roll_number: Option<String>,
}

/// A student/module reference: either a bare id or a populated object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRef {
    Id(RawId),
    Object(RawRefObject),
}

impl RawRef {
    fn into_object(self) -> RawRefObject {
        match self {
            RawRef::Id(id) => RawRefObject {
                object_id: Some(id),
                ..RawRefObject::default()
            },
            RawRef::Object(object) => object,
        }
    }
}

/// `_id` wins over `id` when a document carries both.
fn identity(object_id: Option<RawId>, id: Option<RawId>) -> Option<String> {
    object_id.or(id).map(RawId::into_string)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawMarker {
    Name(String),
    Object {
        #[serde(rename = "_id")]
        object_id: Option<RawId>,
        id: Option<RawId>,
        name: Option<String>,
        role: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAttendanceItem {
    #[serde(rename = "_id")]
    object_id: Option<RawId>,
    id: Option<RawId>,
    student_id: Option<RawRef>,
    student: Option<RawRef>,
    student_name: Option<String>,
    roll_number: Option<String>,
    module_id: Option<RawRef>,
    module: Option<RawRef>,
    module_title: Option<String>,
    date: Option<String>,
    status: Option<String>,
    present: Option<bool>,
    marked_by: Option<RawMarker>,
    remarks: Option<String>,
}

// --- Public types ---

/// Identity the query already knows, used when an item leaves it out
/// (a student's own log omits `studentId`, a module listing may omit `moduleId`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeContext {
    pub student_id: Option<String>,
    pub module_id: Option<String>,
}

impl NormalizeContext {
    pub fn for_student(student_id: impl Into<String>) -> Self {
        Self {
            student_id: Some(student_id.into()),
            module_id: None,
        }
    }

    pub fn for_module(module_id: impl Into<String>) -> Self {
        Self {
            student_id: None,
            module_id: Some(module_id.into()),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    #[error("item is not an attendance object: {0}")]
    Malformed(String),
    #[error("no status or present field")]
    MissingStatus,
    #[error("unknown status {0:?}")]
    UnknownStatus(String),
    #[error("no date")]
    MissingDate,
    #[error("unparseable date {0:?}")]
    InvalidDate(String),
    #[error("no student reference")]
    MissingStudent,
    #[error("no module reference")]
    MissingModule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedItem {
    /// Position of the item in the server payload.
    pub index: usize,
    pub reason: DropReason,
}

/// Result of normalizing one payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    pub records: Vec<AttendanceRecord>,
    pub dropped: Vec<DroppedItem>,
}

impl NormalizedBatch {
    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }
}

// --- Normalization ---

/// Normalizes a whole response body: a bare array, `{ "data": [...] }` or
/// `{ "data": null }`. Anything else is a decode error for the response itself.
pub fn normalize_payload(body: &Value, ctx: &NormalizeContext) -> Result<NormalizedBatch, CoreError> {
    let items = match Envelope::deserialize(body) {
        Ok(Envelope::Bare(items)) => items,
        Ok(Envelope::Wrapped { data }) => data.unwrap_or_default(),
        Err(e) => {
            return Err(CoreError::Deserialization(format!(
                "attendance payload is neither a list nor a data envelope: {}",
                e
            )));
        }
    };
    Ok(normalize_items(items, ctx))
}

pub fn normalize_items(items: Vec<Value>, ctx: &NormalizeContext) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for (index, item) in items.into_iter().enumerate() {
        match normalize_item(item, ctx) {
            Ok(record) => batch.records.push(record),
            Err(reason) => {
                debug!(index, %reason, "Dropping attendance item");
                batch.dropped.push(DroppedItem { index, reason });
            }
        }
    }

    if !batch.dropped.is_empty() {
        warn!(
            kept = batch.records.len(),
            dropped = batch.dropped.len(),
            "Attendance payload contained malformed items"
        );
    }
    batch
}

fn normalize_item(item: Value, ctx: &NormalizeContext) -> Result<AttendanceRecord, DropReason> {
    let raw: RawAttendanceItem =
        serde_json::from_value(item).map_err(|e| DropReason::Malformed(e.to_string()))?;

    let status = resolve_status(raw.status.as_deref(), raw.present)?;

    let raw_date = raw.date.ok_or(DropReason::MissingDate)?;
    let (date, marked_at) =
        parse_calendar_date(&raw_date).ok_or_else(|| DropReason::InvalidDate(raw_date.clone()))?;

    let student = raw
        .student_id
        .or(raw.student)
        .map(RawRef::into_object)
        .unwrap_or_default();
    let student_id = identity(student.object_id, student.id)
        .or_else(|| ctx.student_id.clone())
        .ok_or(DropReason::MissingStudent)?;

    let module = raw
        .module_id
        .or(raw.module)
        .map(RawRef::into_object)
        .unwrap_or_default();
    let module_id = identity(module.object_id, module.id)
        .or_else(|| ctx.module_id.clone())
        .ok_or(DropReason::MissingModule)?;

    Ok(AttendanceRecord {
        id: identity(raw.object_id, raw.id).unwrap_or_else(|| Uuid::new_v4().to_string()),
        student_id,
        module_id,
        date,
        status,
        marked_by: resolve_marker(raw.marked_by),
        remarks: raw.remarks.filter(|r| !r.trim().is_empty()),
        student_name: student.name.or(raw.student_name),
        roll_number: student.roll_number.or(raw.roll_number),
        module_title: module.title.or(module.name).or(raw.module_title),
        marked_at,
    })
}

/// String status wins over the boolean flag. `late` has no boolean form.
fn resolve_status(status: Option<&str>, present: Option<bool>) -> Result<AttendanceStatus, DropReason> {
    match (status, present) {
        (Some(text), _) => text
            .parse::<AttendanceStatus>()
            .map_err(|_| DropReason::UnknownStatus(text.to_string())),
        (None, Some(flag)) => Ok(AttendanceStatus::from_present_flag(flag)),
        (None, None) => Err(DropReason::MissingStatus),
    }
}

fn resolve_marker(marker: Option<RawMarker>) -> MarkedBy {
    match marker {
        None => MarkedBy::system(),
        Some(RawMarker::Name(name)) => MarkedBy {
            role: None,
            id: None,
            name: non_blank(Some(name)).unwrap_or_else(|| SYSTEM_MARKER.to_string()),
        },
        Some(RawMarker::Object {
            object_id,
            id,
            name,
            role,
        }) => MarkedBy {
            role: role.as_deref().and_then(parse_role),
            id: identity(object_id, id),
            name: non_blank(name).unwrap_or_else(|| SYSTEM_MARKER.to_string()),
        },
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parses an ISO datetime or a date-only string into its calendar day.
///
/// The day is taken in the offset the value was written with (`Z` being UTC);
/// values without an offset are read as UTC. Datetimes are also returned in
/// full, converted to UTC.
pub fn parse_calendar_date(raw: &str) -> Option<(NaiveDate, Option<DateTime<Utc>>)> {
    let raw = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some((parsed.date_naive(), Some(parsed.with_timezone(&Utc))));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            let utc = naive.and_utc();
            return Some((utc.date_naive(), Some(utc)));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|date| (date, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::role::Role;
    use serde_json::json;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn single(item: Value) -> Result<AttendanceRecord, DropReason> {
        normalize_item(item, &NormalizeContext::default())
    }

    #[test]
    fn test_boolean_present_maps_to_present_and_absent() {
        let present = single(json!({
            "_id": "r1", "studentId": "S1", "moduleId": "M1",
            "date": "2025-01-01", "present": true
        }))
        .unwrap();
        assert_eq!(present.status, AttendanceStatus::Present);

        let absent = single(json!({
            "_id": "r2", "studentId": "S1", "moduleId": "M1",
            "date": "2025-01-01", "present": false
        }))
        .unwrap();
        assert_eq!(absent.status, AttendanceStatus::Absent);
    }

    #[test]
    fn test_string_late_is_preserved() {
        let late = single(json!({
            "_id": "r3", "studentId": "S1", "moduleId": "M1",
            "date": "2025-01-02", "status": "late"
        }))
        .unwrap();
        assert_eq!(late.status, AttendanceStatus::Late);
        assert_eq!(late.status.as_present_flag(), None);
    }

    #[test]
    fn test_string_status_wins_over_flag() {
        let record = single(json!({
            "studentId": "S1", "moduleId": "M1", "date": "2025-01-02",
            "status": "Late", "present": true
        }))
        .unwrap();
        assert_eq!(record.status, AttendanceStatus::Late);
    }

    #[test]
    fn test_missing_marker_defaults_to_system() {
        let record = single(json!({
            "studentId": "S1", "moduleId": "M1", "date": "2025-01-01", "status": "present"
        }))
        .unwrap();
        assert_eq!(record.marked_by.name, "System");
        assert_eq!(record.marked_by.id, None);

        let blank = single(json!({
            "studentId": "S1", "moduleId": "M1", "date": "2025-01-01",
            "status": "present", "markedBy": { "_id": "st1", "name": "  " }
        }))
        .unwrap();
        assert_eq!(blank.marked_by.name, "System");
        assert_eq!(blank.marked_by.id.as_deref(), Some("st1"));
    }

    #[test]
    fn test_marker_object_and_name_forms() {
        let object = single(json!({
            "studentId": "S1", "moduleId": "M1", "date": "2025-01-01", "status": "absent",
            "markedBy": { "_id": "st9", "name": "Priya", "role": "Staff" }
        }))
        .unwrap();
        assert_eq!(object.marked_by.role, Some(Role::Staff));
        assert_eq!(object.marked_by.name, "Priya");

        let name_only = single(json!({
            "studentId": "S1", "moduleId": "M1", "date": "2025-01-01", "status": "absent",
            "markedBy": "Admin Desk"
        }))
        .unwrap();
        assert_eq!(name_only.marked_by.name, "Admin Desk");
        assert_eq!(name_only.marked_by.role, None);
    }

    #[test]
    fn test_nested_and_flat_display_fields() {
        let nested = single(json!({
            "_id": "r1",
            "studentId": { "_id": "S1", "name": "Asha", "rollNumber": "R-101" },
            "moduleId": { "_id": "M1", "title": "Safety Basics" },
            "date": "2025-01-03T09:30:00.000Z",
            "status": "present",
            "remarks": "on time"
        }))
        .unwrap();
        assert_eq!(nested.student_id, "S1");
        assert_eq!(nested.student_name.as_deref(), Some("Asha"));
        assert_eq!(nested.roll_number.as_deref(), Some("R-101"));
        assert_eq!(nested.module_title.as_deref(), Some("Safety Basics"));
        assert_eq!(nested.remarks.as_deref(), Some("on time"));

        let flat = single(json!({
            "_id": "r2", "studentId": "S2", "studentName": "Ben",
            "moduleId": "M1", "moduleTitle": "Safety Basics",
            "date": "2025-01-03", "status": "absent"
        }))
        .unwrap();
        assert_eq!(flat.student_name.as_deref(), Some("Ben"));
        assert_eq!(flat.module_title.as_deref(), Some("Safety Basics"));

        let staff_shape = single(json!({
            "_id": "r3",
            "student": { "_id": "S3", "name": "Chen" },
            "module": { "_id": "M2", "name": "Forklift" },
            "date": "2025-01-04", "status": "late"
        }))
        .unwrap();
        assert_eq!(staff_shape.student_id, "S3");
        assert_eq!(staff_shape.module_id, "M2");
        assert_eq!(staff_shape.module_title.as_deref(), Some("Forklift"));
    }

    #[test]
    fn test_datetime_is_reduced_to_calendar_day() {
        let record = single(json!({
            "studentId": "S1", "moduleId": "M1",
            "date": "2025-01-02T23:15:00.000Z", "status": "present"
        }))
        .unwrap();
        assert_eq!(record.date, day(2));
        assert!(record.marked_at.is_some());

        let date_only = single(json!({
            "studentId": "S1", "moduleId": "M1", "date": "2025-01-02", "status": "present"
        }))
        .unwrap();
        assert_eq!(date_only.key(), record.key());
        assert_eq!(date_only.marked_at, None);
    }

    #[test]
    fn test_parse_calendar_date_formats() {
        assert_eq!(parse_calendar_date("2025-01-05").map(|p| p.0), Some(day(5)));
        assert_eq!(
            parse_calendar_date("2025-01-05T10:00:00").map(|p| p.0),
            Some(day(5))
        );
        assert_eq!(
            parse_calendar_date("2025-01-05T10:00:00.250").map(|p| p.0),
            Some(day(5))
        );
        assert_eq!(parse_calendar_date("05/01/2025"), None);
    }

    #[test]
    fn test_offset_datetime_keeps_the_writers_day() {
        let (date, at) = parse_calendar_date("2025-01-05T01:00:00+05:30").unwrap();
        assert_eq!(date, day(5));
        assert_eq!(at.unwrap().date_naive(), day(4));

        let (date, _) = parse_calendar_date("2025-01-05T23:30:00-05:00").unwrap();
        assert_eq!(date, day(5));

        let (date, _) = parse_calendar_date("2025-01-05T23:30:00Z").unwrap();
        assert_eq!(date, day(5));
    }

    #[test]
    fn test_context_fills_missing_identity() {
        let ctx = NormalizeContext::for_student("S7");
        let record = normalize_item(
            json!({ "moduleId": "M1", "date": "2025-01-01", "status": "present" }),
            &ctx,
        )
        .unwrap();
        assert_eq!(record.student_id, "S7");

        let ctx = NormalizeContext::for_module("M4");
        let record = normalize_item(
            json!({ "studentId": "S1", "date": "2025-01-01", "present": true }),
            &ctx,
        )
        .unwrap();
        assert_eq!(record.module_id, "M4");
    }

    #[test]
    fn test_documents_with_both_id_keys_are_kept() {
        let body = json!([{
            "_id": "r1", "id": "r1",
            "studentId": { "_id": "S1", "id": "S1", "name": "Asha" },
            "moduleId": { "_id": "M1", "id": "M1", "title": "Networks" },
            "markedBy": { "_id": "T1", "id": "T1", "name": "Ravi", "role": "staff" },
            "date": "2025-01-02", "status": "present"
        }]);

        let batch = normalize_payload(&body, &NormalizeContext::default()).unwrap();
        assert_eq!(batch.dropped_count(), 0);
        let record = &batch.records[0];
        assert_eq!(record.id, "r1");
        assert_eq!(record.student_id, "S1");
        assert_eq!(record.module_id, "M1");
        assert_eq!(record.marked_by.id.as_deref(), Some("T1"));
        assert_eq!(record.student_name.as_deref(), Some("Asha"));
    }

    #[test]
    fn test_object_id_wins_over_virtual_id() {
        let record = single(json!({
            "_id": "r1", "id": "virtual",
            "studentId": "S1", "moduleId": "M1", "date": "2025-01-02", "status": "late"
        }))
        .unwrap();
        assert_eq!(record.id, "r1");
    }

    #[test]
    fn test_numeric_ids_are_accepted() {
        let record = single(json!({
            "id": 17, "studentId": 42, "moduleId": { "id": 7 },
            "date": "2025-01-01", "status": "present"
        }))
        .unwrap();
        assert_eq!(record.id, "17");
        assert_eq!(record.student_id, "42");
        assert_eq!(record.module_id, "7");
    }

    #[test]
    fn test_missing_id_gets_generated() {
        let record = single(json!({
            "studentId": "S1", "moduleId": "M1", "date": "2025-01-01", "status": "present"
        }))
        .unwrap();
        assert!(Uuid::parse_str(&record.id).is_ok());
    }

    #[test]
    fn test_malformed_items_are_dropped_and_counted() {
        let body = json!({
            "data": [
                { "_id": "ok", "studentId": "S1", "moduleId": "M1", "date": "2025-01-01", "status": "present" },
                { "_id": "no-status", "studentId": "S1", "moduleId": "M1", "date": "2025-01-02" },
                { "_id": "bad-status", "studentId": "S1", "moduleId": "M1", "date": "2025-01-02", "status": "excused" },
                { "_id": "no-date", "studentId": "S1", "moduleId": "M1", "status": "present" },
                { "_id": "bad-date", "studentId": "S1", "moduleId": "M1", "date": "yesterday", "status": "present" },
                { "_id": "no-student", "moduleId": "M1", "date": "2025-01-02", "status": "present" },
                "not an object",
                { "_id": "ok2", "studentId": "S2", "moduleId": "M1", "date": "2025-01-01", "present": false }
            ]
        });

        let batch = normalize_payload(&body, &NormalizeContext::default()).unwrap();
        assert_eq!(
            batch.records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["ok", "ok2"]
        );
        assert_eq!(batch.dropped_count(), 6);
        let reasons: Vec<&DropReason> = batch.dropped.iter().map(|d| &d.reason).collect();
        assert_eq!(reasons[0], &DropReason::MissingStatus);
        assert_eq!(reasons[1], &DropReason::UnknownStatus("excused".into()));
        assert_eq!(reasons[2], &DropReason::MissingDate);
        assert_eq!(reasons[3], &DropReason::InvalidDate("yesterday".into()));
        assert_eq!(reasons[4], &DropReason::MissingStudent);
        assert!(matches!(reasons[5], DropReason::Malformed(_)));
        assert_eq!(batch.dropped[5].index, 6);
    }

    #[test]
    fn test_envelope_shapes() {
        let ctx = NormalizeContext::default();
        let item = json!({ "studentId": "S1", "moduleId": "M1", "date": "2025-01-01", "status": "present" });

        let bare = normalize_payload(&json!([item.clone()]), &ctx).unwrap();
        assert_eq!(bare.records.len(), 1);

        let wrapped = normalize_payload(&json!({ "success": true, "data": [item] }), &ctx).unwrap();
        assert_eq!(wrapped.records.len(), 1);

        let null_data = normalize_payload(&json!({ "data": null }), &ctx).unwrap();
        assert!(null_data.records.is_empty());
        assert_eq!(null_data.dropped_count(), 0);

        assert!(matches!(
            normalize_payload(&json!("oops"), &ctx),
            Err(CoreError::Deserialization(_))
        ));
    }
}
