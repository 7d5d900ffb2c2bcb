use chrono::NaiveDate;
use core_lib::SessionStore;
use core_lib::domain::attendance::DateRange;
use core_lib::domain::ledger::AttendanceLedger;
use core_lib::domain::normalize::{NormalizeContext, normalize_payload};
use core_lib::domain::role::Role;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::GatewayError;
use super::router::{ApiRequest, ApiResponse, RequestRouter};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Filters for the staff view of one student's history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentLogQuery {
    pub module_id: Option<String>,
    pub range: DateRange,
}

/// A teaching module as listed for staff or admin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawModule")]
pub struct ModuleSummary {
    pub id: String,
    pub title: String,
    pub code: Option<String>,
}

// Module documents may carry `_id` next to `id`, and `title` next to `name`.
#[derive(Deserialize)]
struct RawModule {
    #[serde(rename = "_id")]
    object_id: Option<String>,
    id: Option<String>,
    title: Option<String>,
    name: Option<String>,
    code: Option<String>,
}

impl TryFrom<RawModule> for ModuleSummary {
    type Error = String;

    fn try_from(raw: RawModule) -> Result<Self, Self::Error> {
        let id = raw
            .object_id
            .or(raw.id)
            .ok_or_else(|| "module has no _id or id".to_string())?;
        Ok(ModuleSummary {
            id,
            title: raw.title.or(raw.name).unwrap_or_default(),
            code: raw.code,
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ModuleEnvelope {
    Bare(Vec<ModuleSummary>),
    // before Wrapped, which accepts any object since `data` is optional
    Named { modules: Vec<ModuleSummary> },
    Wrapped { data: Option<Vec<ModuleSummary>> },
}

fn into_ledger(response: ApiResponse, ctx: &NormalizeContext) -> Result<AttendanceLedger, GatewayError> {
    let batch =
        normalize_payload(&response.body, ctx).map_err(|e| GatewayError::Decode(e.to_string()))?;
    info!(
        role = %response.role,
        records = batch.records.len(),
        dropped = batch.dropped_count(),
        "Attendance fetched"
    );
    Ok(AttendanceLedger::rebuild([batch]))
}

/// The logged-in student's own attendance.
///
/// The path lives under `/attendance`, so it travels with the admin credential.
/// The student's subject id fills in items that leave it out.
pub async fn my_attendance(
    router: &RequestRouter,
    session_store: &dyn SessionStore,
) -> Result<AttendanceLedger, GatewayError> {
    let ctx = match session_store.snapshot(Role::Student).await?.credential {
        Some(credential) => NormalizeContext::for_student(credential.subject_id),
        None => NormalizeContext::default(),
    };
    let response = router
        .dispatch(ApiRequest::get("/attendance/my-attendance"))
        .await?;
    into_ledger(response, &ctx)
}

pub async fn module_attendance(
    router: &RequestRouter,
    module_id: &str,
    date: Option<NaiveDate>,
) -> Result<AttendanceLedger, GatewayError> {
    let request = ApiRequest::get(format!("/attendance/module/{}", module_id))
        .query_opt("date", date.map(|d| d.format(DATE_FORMAT)));
    let response = router.dispatch(request).await?;
    into_ledger(response, &NormalizeContext::for_module(module_id))
}

/// Every attendance log, unscoped. The admin's main view.
pub async fn all_attendance_logs(router: &RequestRouter) -> Result<AttendanceLedger, GatewayError> {
    let response = router.dispatch(ApiRequest::get("/attendance/logs")).await?;
    into_ledger(response, &NormalizeContext::default())
}

pub async fn student_attendance(
    router: &RequestRouter,
    student_id: &str,
) -> Result<AttendanceLedger, GatewayError> {
    let response = router
        .dispatch(ApiRequest::get(format!("/attendance/student/{}", student_id)))
        .await?;
    into_ledger(response, &NormalizeContext::for_student(student_id))
}

pub async fn staff_student_logs(
    router: &RequestRouter,
    student_id: &str,
    query: &StudentLogQuery,
) -> Result<AttendanceLedger, GatewayError> {
    let request = ApiRequest::get(format!("/staff/student/{}/logs", student_id))
        .query_opt("moduleId", query.module_id.as_deref())
        .query_opt("startDate", query.range.start.map(|d| d.format(DATE_FORMAT)))
        .query_opt("endDate", query.range.end.map(|d| d.format(DATE_FORMAT)));
    let response = router.dispatch(request).await?;
    let ctx = NormalizeContext {
        student_id: Some(student_id.to_string()),
        module_id: query.module_id.clone(),
    };
    into_ledger(response, &ctx)
}

/// Modules visible to `role`. Students have no module listing.
pub async fn modules(router: &RequestRouter, role: Role) -> Result<Vec<ModuleSummary>, GatewayError> {
    let path = match role {
        Role::Staff => "/staff/modules",
        Role::Admin => "/admin/modules",
        Role::Student => {
            return Err(core_lib::CoreError::Validation(
                "Students have no module listing".to_string(),
            )
            .into());
        }
    };
    let response = router.dispatch(ApiRequest::get(path)).await?;
    let modules = parse_modules(response.body)?;
    debug!(count = modules.len(), %role, "Modules fetched");
    Ok(modules)
}

fn parse_modules(body: Value) -> Result<Vec<ModuleSummary>, GatewayError> {
    match serde_json::from_value::<ModuleEnvelope>(body) {
        Ok(ModuleEnvelope::Bare(modules)) | Ok(ModuleEnvelope::Named { modules }) => Ok(modules),
        Ok(ModuleEnvelope::Wrapped { data }) => Ok(data.unwrap_or_default()),
        Err(e) => Err(GatewayError::Decode(format!("module list: {}", e))),
    }
}
