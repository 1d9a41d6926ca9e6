use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use serde_json::json;

/// Domain error for the attendance engine.
///
/// Everything a mark-attendance request can fail with, plus the storage-level
/// conflicts the repository surfaces. Implements [`actix_web::ResponseError`]
/// so handlers can bubble these straight out with `?`.
#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    #[error("Invalid latitude or longitude")]
    InvalidCoordinates,

    #[error("Proof image is required")]
    ProofRequired,

    #[error(
        "Too far: {}m from office. Must be within {}m.",
        .distance_meters.round(),
        .radius_meters.round()
    )]
    OutOfRange {
        distance_meters: f64,
        radius_meters: f64,
    },

    #[error("You are already checked in. Check out first.")]
    AlreadyCheckedIn,

    #[error("No active check-in session to check out.")]
    NoActiveSession,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Attendance record was updated concurrently, please retry")]
    WriteConflict,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Convenience alias for fallible attendance operations.
pub type AttendanceResult<T> = Result<T, AttendanceError>;

impl AttendanceError {
    /// Machine-readable reason code exposed in error responses.
    pub fn reason_code(&self) -> &'static str {
        match self {
            AttendanceError::InvalidCoordinates => "InvalidCoordinates",
            AttendanceError::ProofRequired => "ProofRequired",
            AttendanceError::OutOfRange { .. } => "OutOfRange",
            AttendanceError::AlreadyCheckedIn => "AlreadyCheckedIn",
            AttendanceError::NoActiveSession => "NoActiveSession",
            AttendanceError::Forbidden(_) => "Forbidden",
            AttendanceError::WriteConflict => "WriteConflict",
            AttendanceError::Database(_) => "ServerError",
        }
    }

    /// Message safe to show to the caller. Database detail stays in the logs.
    fn public_message(&self) -> String {
        match self {
            AttendanceError::Database(_) => "Server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl actix_web::error::ResponseError for AttendanceError {
    fn status_code(&self) -> StatusCode {
        match self {
            AttendanceError::InvalidCoordinates
            | AttendanceError::ProofRequired
            | AttendanceError::AlreadyCheckedIn
            | AttendanceError::NoActiveSession => StatusCode::BAD_REQUEST,
            AttendanceError::OutOfRange { .. } | AttendanceError::Forbidden(_) => {
                StatusCode::FORBIDDEN
            }
            AttendanceError::WriteConflict => StatusCode::SERVICE_UNAVAILABLE,
            AttendanceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let AttendanceError::Database(e) = self {
            tracing::error!(error = %e, "Database error");
        }

        let mut body = json!({
            "success": false,
            "code": self.reason_code(),
            "message": self.public_message(),
        });
        if let AttendanceError::OutOfRange {
            distance_meters, ..
        } = self
        {
            body["distanceMeters"] = json!(distance_meters.round());
        }

        HttpResponse::build(self.status_code()).json(body)
    }
}
