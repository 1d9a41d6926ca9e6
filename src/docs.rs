use crate::aggregate::DailyBucket;
use crate::api::attendance::{LogsQuery, MonthlyQuery, RangeQuery, ScopeQuery};
use crate::engine::MarkRequest;
use crate::geofence::GeoJsonPoint;
use crate::ledger::{CheckType, DayLedger, Session};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Precore Attendance API",
        version = "1.0.0",
        description = r#"
## Geofenced Attendance Tracking

This API powers **Precore**, a geofenced attendance service for field and office staff.

### 🔹 Key Features
- **Attendance Marking**
  - Check-in / check-out with live coordinates, proof-of-presence URL and a geofence gate
- **Session Ledger**
  - Multiple work sessions per day, auto-closed at end of day if left open
- **Reports**
  - Paginated logs, daily totals, and a per-month summary of worked hours

### 🔐 Security
All endpoints require **JWT Bearer authentication** issued by the identity provider.
Reading another employee's records requires an **Admin** or **HR** role.

### 📦 Response Format
- JSON-based RESTful responses with a `success` flag
- Pagination supported for log listings

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::attendance::mark_attendance,
        crate::api::attendance::attendance_logs,
        crate::api::attendance::daily_report,
        crate::api::attendance::monthly_summary,
        crate::api::attendance::range_report
    ),
    components(
        schemas(
            MarkRequest,
            CheckType,
            DayLedger,
            Session,
            GeoJsonPoint,
            DailyBucket,
            LogsQuery,
            ScopeQuery,
            MonthlyQuery,
            RangeQuery
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Geofenced attendance marking and reports"),
    )
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
