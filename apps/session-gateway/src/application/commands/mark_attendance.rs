use chrono::NaiveDate;
use core_lib::domain::attendance::AttendanceStatus;
use core_lib::domain::role::Role;
use core_lib::{Command, CommandHandler, CoreError};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::application::GatewayError;
use crate::application::router::{ApiRequest, RequestRouter};

const SINGLE_MARK_PATH: &str = "/attendance/mark";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentMark {
    pub student_id: String,
    pub status: AttendanceStatus,
    pub remarks: Option<String>,
}

impl StudentMark {
    pub fn new(student_id: impl Into<String>, status: AttendanceStatus) -> Self {
        Self {
            student_id: student_id.into(),
            status,
            remarks: None,
        }
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    fn remarks(&self) -> Option<&str> {
        self.remarks.as_deref().map(str::trim).filter(|r| !r.is_empty())
    }
}

/// One logical "mark this module's attendance for a day" action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkAttendanceCommand {
    /// Whose batch endpoint to use. Students cannot mark.
    pub caller: Role,
    pub module_id: String,
    pub date: NaiveDate,
    pub marks: Vec<StudentMark>,
}

impl Command for MarkAttendanceCommand {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MarkReceipt {
    pub present: usize,
    pub absent: usize,
    pub single: usize,
    pub calls: usize,
}

/// Splits a mark into server calls, in send order: the present batch, the
/// absent batch, then one call per late or annotated mark.
///
/// Batch calls carry only a boolean, so late marks and marks with remarks go
/// through the single-mark endpoint. Empty groups produce no call. When a
/// student appears twice, the last mark counts.
pub fn plan(command: &MarkAttendanceCommand) -> Result<Vec<ApiRequest>, GatewayError> {
    let batch_path = match command.caller {
        Role::Staff | Role::Admin => format!("/{}/attendance", command.caller.as_str()),
        Role::Student => {
            return Err(CoreError::Validation("Students cannot mark attendance".to_string()).into());
        }
    };
    if command.module_id.trim().is_empty() {
        return Err(CoreError::Validation("Module id is required".to_string()).into());
    }

    let date = command.date.format("%Y-%m-%d").to_string();
    let marks = last_mark_per_student(&command.marks);

    let mut present = Vec::new();
    let mut absent = Vec::new();
    let mut singles = Vec::new();
    for mark in marks {
        match (mark.status.as_present_flag(), mark.remarks()) {
            (Some(true), None) => present.push(mark.student_id.clone()),
            (Some(false), None) => absent.push(mark.student_id.clone()),
            (_, remarks) => singles.push(ApiRequest::post(
                SINGLE_MARK_PATH,
                json!({
                    "studentId": mark.student_id,
                    "moduleId": command.module_id,
                    "date": date,
                    "status": mark.status.as_str(),
                    "remarks": remarks,
                }),
            )),
        }
    }

    let mut requests = Vec::new();
    for (student_ids, flag) in [(present, true), (absent, false)] {
        if student_ids.is_empty() {
            continue;
        }
        requests.push(ApiRequest::post(
            batch_path.as_str(),
            json!({
                "moduleId": command.module_id,
                "studentIds": student_ids,
                "date": date,
                "attendanceStatus": flag,
            }),
        ));
    }
    requests.extend(singles);
    Ok(requests)
}

// keeps first-seen order, last value
fn last_mark_per_student(marks: &[StudentMark]) -> Vec<&StudentMark> {
    let mut slots: HashMap<&str, usize> = HashMap::new();
    let mut ordered: Vec<&StudentMark> = Vec::new();
    for mark in marks {
        match slots.get(mark.student_id.as_str()) {
            Some(&slot) => ordered[slot] = mark,
            None => {
                slots.insert(mark.student_id.as_str(), ordered.len());
                ordered.push(mark);
            }
        }
    }
    ordered
}

pub struct MarkAttendanceHandler {
    router: Arc<RequestRouter>,
}

impl MarkAttendanceHandler {
    pub fn new(router: Arc<RequestRouter>) -> Self {
        Self { router }
    }

    /// Sends the planned calls in order and stops at the first failure.
    /// Calls already sent stay applied on the server.
    pub async fn mark(&self, command: MarkAttendanceCommand) -> Result<MarkReceipt, GatewayError> {
        let requests = plan(&command)?;
        let mut receipt = MarkReceipt::default();
        for request in requests {
            let counted = counted_students(&request);
            self.router.dispatch(request).await?;
            match counted {
                Counted::Present(n) => receipt.present += n,
                Counted::Absent(n) => receipt.absent += n,
                Counted::Single => receipt.single += 1,
            }
            receipt.calls += 1;
            debug!(calls = receipt.calls, "Attendance call accepted");
        }
        info!(
            module_id = %command.module_id,
            date = %command.date,
            present = receipt.present,
            absent = receipt.absent,
            single = receipt.single,
            "Attendance marked"
        );
        Ok(receipt)
    }
}

enum Counted {
    Present(usize),
    Absent(usize),
    Single,
}

fn counted_students(request: &ApiRequest) -> Counted {
    let Some(body) = &request.body else {
        return Counted::Single;
    };
    let students = body
        .get("studentIds")
        .and_then(|ids| ids.as_array())
        .map(Vec::len);
    match (students, body.get("attendanceStatus").and_then(|f| f.as_bool())) {
        (Some(n), Some(true)) => Counted::Present(n),
        (Some(n), Some(false)) => Counted::Absent(n),
        _ => Counted::Single,
    }
}

impl CommandHandler<MarkAttendanceCommand> for MarkAttendanceHandler {
    type Error = GatewayError;

    async fn handle(&self, command: MarkAttendanceCommand) -> Result<(), GatewayError> {
        self.mark(command).await.map(|_| ())
    }
}
