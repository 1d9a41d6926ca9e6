use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use crate::error::{AttendanceError, AttendanceResult};
use crate::geofence::{GeoJsonPoint, GeoPoint};

/// Requested transition, wire strings `"Check-In"` / `"Check-Out"`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
pub enum CheckType {
    #[serde(rename = "Check-In")]
    #[strum(serialize = "Check-In")]
    CheckIn,
    #[serde(rename = "Check-Out")]
    #[strum(serialize = "Check-Out")]
    CheckOut,
}

/// One check-in/check-out pair inside a [`DayLedger`].
///
/// Serialized field names are the persisted sub-record shape: camelCase, with
/// absent endpoint fields omitted entirely. The check-out fields are
/// all-absent or all-present together; a session with `checkIn` but no
/// `checkOut` is the (single) open session of its ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "2026-08-25T04:12:00Z", value_type = Option<String>, format = "date-time")]
    pub check_in: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "https://media.example.com/a1b2.jpg")]
    pub check_in_proof: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_in_location: Option<GeoJsonPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "within-geofence")]
    pub check_in_status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "2026-08-25T12:30:00Z", value_type = Option<String>, format = "date-time")]
    pub check_out: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_out_proof: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_out_location: Option<GeoJsonPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_out_status: Option<String>,
}

impl Session {
    fn open_at(at: DateTime<Utc>, proof: String, location: GeoPoint, status: String) -> Self {
        Self {
            check_in: Some(at),
            check_in_proof: Some(proof),
            check_in_location: Some(location.into()),
            check_in_status: Some(status),
            check_out: None,
            check_out_proof: None,
            check_out_location: None,
            check_out_status: None,
        }
    }

    /// Has a check-in but no check-out yet.
    pub fn is_open(&self) -> bool {
        self.check_in.is_some() && self.check_out.is_none()
    }

    /// Has both endpoints.
    pub fn is_closed(&self) -> bool {
        self.check_in.is_some() && self.check_out.is_some()
    }

    /// Whole minutes between check-in and check-out, `None` until closed.
    pub fn duration_minutes(&self) -> Option<i64> {
        match (self.check_in, self.check_out) {
            (Some(check_in), Some(check_out)) => Some((check_out - check_in).num_minutes()),
            _ => None,
        }
    }
}

/// Attendance record for one employee on one calendar day: the aggregate
/// root of the engine, unique on `(employee_id, day)`.
///
/// The session sequence is append-only; the only permitted mutation of an
/// existing element is closing the last open session. `revision` is the
/// optimistic-concurrency counter the repository checks on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DayLedger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = 42)]
    pub id: Option<u64>,
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = "2026-08-25", value_type = String, format = "date")]
    pub day: NaiveDate,
    pub sessions: Vec<Session>,
    #[schema(example = 2)]
    pub revision: u64,
}

impl DayLedger {
    /// Fresh, unpersisted ledger in the Closed state.
    pub fn new(employee_id: u64, day: NaiveDate) -> Self {
        Self {
            id: None,
            employee_id,
            day,
            sessions: Vec::new(),
            revision: 0,
        }
    }

    pub fn last_session(&self) -> Option<&Session> {
        self.sessions.last()
    }

    /// The ledger is Open when its last session lacks a check-out. In every
    /// other case (no sessions yet, or last session closed) it is Closed.
    pub fn is_open(&self) -> bool {
        self.sessions.last().is_some_and(Session::is_open)
    }

    /// Closed → Open: append a new session checked in at `at`.
    ///
    /// Fails with [`AttendanceError::AlreadyCheckedIn`] if a session is
    /// still open, leaving the ledger untouched.
    pub fn apply_check_in(
        &mut self,
        at: DateTime<Utc>,
        proof: String,
        location: GeoPoint,
        status: String,
    ) -> AttendanceResult<()> {
        if self.is_open() {
            return Err(AttendanceError::AlreadyCheckedIn);
        }
        self.sessions
            .push(Session::open_at(at, proof, location, status));
        Ok(())
    }

    /// Open → Closed: set the check-out endpoint of the last session.
    ///
    /// Fails with [`AttendanceError::NoActiveSession`] if no session is
    /// open, leaving the ledger untouched. The close instant is clamped to
    /// the session's check-in so `checkOut >= checkIn` holds even when the
    /// clock reports an earlier time.
    pub fn apply_check_out(
        &mut self,
        at: DateTime<Utc>,
        proof: String,
        location: GeoPoint,
        status: String,
    ) -> AttendanceResult<()> {
        let session = match self.sessions.last_mut() {
            Some(s) if s.is_open() => s,
            _ => return Err(AttendanceError::NoActiveSession),
        };
        session.check_out = Some(clamp_to_check_in(session, at));
        session.check_out_proof = Some(proof);
        session.check_out_location = Some(location.into());
        session.check_out_status = Some(status);
        Ok(())
    }

    /// Force-close the last open session, the sweep's transition.
    ///
    /// No proof is attached and the check-out location is copied from the
    /// check-in location, since no new sample exists. Returns `false`
    /// without mutating when the ledger is already Closed, so repeated
    /// sweeps are no-ops.
    pub fn close_last_open_session(&mut self, at: DateTime<Utc>, status: &str) -> bool {
        let session = match self.sessions.last_mut() {
            Some(s) if s.is_open() => s,
            _ => return false,
        };
        session.check_out = Some(clamp_to_check_in(session, at));
        session.check_out_location = session.check_in_location.clone();
        session.check_out_status = Some(status.to_string());
        true
    }

    /// Sum of whole minutes over closed sessions. Open sessions contribute
    /// zero until closed.
    pub fn closed_minutes(&self) -> i64 {
        self.sessions
            .iter()
            .filter_map(Session::duration_minutes)
            .sum()
    }
}

fn clamp_to_check_in(session: &Session, at: DateTime<Utc>) -> DateTime<Utc> {
    match session.check_in {
        Some(check_in) if at < check_in => check_in,
        _ => at,
    }
}
