use actix_web::{HttpResponse, Responder, web};
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::auth::user::AuthUser;
use crate::engine::{AttendanceEngine, MarkRequest};
use crate::repo::LedgerScope;
use crate::utils::report_cache;

#[derive(Debug, Deserialize, ToSchema)]
pub struct LogsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub employee_id: Option<u64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ScopeQuery {
    pub employee_id: Option<u64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MonthlyQuery {
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub employee_id: Option<u64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RangeQuery {
    #[schema(example = "2026-08-01", format = "date", value_type = String)]
    pub start: NaiveDate,
    #[schema(example = "2026-08-31", format = "date", value_type = String)]
    pub end: NaiveDate,
    pub employee_id: Option<u64>,
}

/// Whose ledgers a report request targets. Reading another employee's
/// records is an Hr/Admin privilege; everyone else is pinned to the
/// employee record on their own token.
fn resolve_employee(auth: &AuthUser, requested: Option<u64>) -> actix_web::Result<u64> {
    match requested {
        Some(id) if auth.employee_id != Some(id) => {
            auth.require_hr_or_admin()?;
            Ok(id)
        }
        Some(id) => Ok(id),
        None => auth.require_employee_id(),
    }
}

/// Mark attendance (Check-In / Check-Out)
#[utoipa::path(
    post,
    path = "/api/v1/attendance/mark",
    request_body = MarkRequest,
    responses(
        (status = 200, description = "Attendance recorded", body = Object, example = json!({
            "success": true,
            "message": "Check-In recorded successfully",
            "data": { "employeeId": 1000, "day": "2026-08-25", "sessions": [], "revision": 0 }
        })),
        (status = 400, description = "Validation or session-state failure", body = Object, example = json!({
            "success": false,
            "code": "AlreadyCheckedIn",
            "message": "You are already checked in. Check out first."
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Outside the geofence", body = Object, example = json!({
            "success": false,
            "code": "OutOfRange",
            "message": "Too far: 5000m from office. Must be within 200m.",
            "distanceMeters": 5000.0
        })),
        (status = 503, description = "Concurrent writes exhausted retries"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn mark_attendance(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    payload: web::Json<MarkRequest>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.require_employee_id()?;

    let ledger = engine.mark_attendance(employee_id, &payload).await?;

    report_cache::invalidate_month(employee_id, ledger.day.year(), ledger.day.month()).await;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": format!("{} recorded successfully", payload.check_type),
        "data": ledger
    })))
}

/// Paginated attendance logs, newest day first
#[utoipa::path(
    get,
    path = "/api/v1/attendance/logs",
    params(
        ("page", Query, description = "Page number, 1-based"),
        ("limit", Query, description = "Ledgers per page, clamped to 1..=50"),
        ("employee_id", Query, description = "Another employee's logs (Hr/Admin only)")
    ),
    responses(
        (status = 200, description = "One page of day ledgers", body = Object, example = json!({
            "success": true,
            "pagination": {
                "currentPage": 1,
                "totalPages": 3,
                "totalLogs": 21,
                "hasNext": true,
                "hasPrev": false
            },
            "results": 10,
            "data": []
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn attendance_logs(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    query: web::Query<LogsQuery>,
) -> actix_web::Result<impl Responder> {
    let employee_id = resolve_employee(&auth, query.employee_id)?;

    let page = engine
        .attendance_logs(LedgerScope::Employee(employee_id), query.page, query.limit)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "pagination": {
            "currentPage": page.page,
            "totalPages": page.total_pages(),
            "totalLogs": page.total_count,
            "hasNext": page.has_next(),
            "hasPrev": page.has_prev(),
        },
        "results": page.items.len(),
        "data": page.items
    })))
}

/// Total worked hours per day, newest day first
#[utoipa::path(
    get,
    path = "/api/v1/attendance/daily-report",
    params(
        ("employee_id", Query, description = "Another employee's report (Hr/Admin only)")
    ),
    responses(
        (status = 200, description = "Daily hour buckets", body = Object, example = json!({
            "success": true,
            "report": [
                { "date": "2026-08-25", "totalHours": 7.5 },
                { "date": "2026-08-24", "totalHours": 8.0 }
            ]
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn daily_report(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    query: web::Query<ScopeQuery>,
) -> actix_web::Result<impl Responder> {
    let employee_id = resolve_employee(&auth, query.employee_id)?;

    let report = engine.daily_report(employee_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "report": report
    })))
}

/// Worked hours per day within one month, oldest day first
#[utoipa::path(
    get,
    path = "/api/v1/attendance/monthly-summary",
    params(
        ("month", Query, description = "Month number, 1..=12"),
        ("year", Query, description = "Four-digit year"),
        ("employee_id", Query, description = "Another employee's summary (Hr/Admin only)")
    ),
    responses(
        (status = 200, description = "Monthly hour buckets", body = Object, example = json!({
            "success": true,
            "month": "2026-08",
            "summary": [
                { "date": "2026-08-03", "totalHours": 8.25 },
                { "date": "2026-08-04", "totalHours": 7.0 }
            ]
        })),
        (status = 400, description = "Missing or invalid month/year", body = Object, example = json!({
            "success": false,
            "message": "month and year query params are required"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn monthly_summary(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    query: web::Query<MonthlyQuery>,
) -> actix_web::Result<impl Responder> {
    let employee_id = resolve_employee(&auth, query.employee_id)?;

    let (Some(month), Some(year)) = (query.month, query.year) else {
        return Ok(HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "month and year query params are required"
        })));
    };
    if !(1..=12).contains(&month) {
        return Ok(HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "Invalid month or year"
        })));
    }

    let summary = match report_cache::get_monthly(employee_id, year, month).await {
        Some(cached) => cached,
        None => {
            let fresh = engine.monthly_summary(employee_id, year, month).await?;
            report_cache::put_monthly(employee_id, year, month, fresh).await
        }
    };

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "month": format!("{year:04}-{month:02}"),
        "summary": summary.as_slice()
    })))
}

/// Raw ledgers in a date range (Hr/Admin)
#[utoipa::path(
    get,
    path = "/api/v1/attendance/report",
    params(
        ("start", Query, description = "First day, inclusive (YYYY-MM-DD)"),
        ("end", Query, description = "Last day, inclusive (YYYY-MM-DD)"),
        ("employee_id", Query, description = "Restrict to one employee")
    ),
    responses(
        (status = 200, description = "Ledgers in range, newest day first", body = Object, example = json!({
            "success": true,
            "results": 2,
            "data": []
        })),
        (status = 400, description = "end precedes start", body = Object, example = json!({
            "success": false,
            "message": "end must not be before start"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn range_report(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    query: web::Query<RangeQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    if query.end < query.start {
        return Ok(HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "end must not be before start"
        })));
    }

    let scope = match query.employee_id {
        Some(id) => LedgerScope::Employee(id),
        None => LedgerScope::All,
    };
    let ledgers = engine.range_report(scope, query.start, query.end).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "results": ledgers.len(),
        "data": ledgers
    })))
}
