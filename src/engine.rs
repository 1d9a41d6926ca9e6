use std::sync::Arc;

use chrono::{FixedOffset, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use crate::aggregate::{self, DailyBucket};
use crate::clock::{Clock, local_day};
use crate::error::{AttendanceError, AttendanceResult};
use crate::geofence::{GeoPoint, GeofencePolicy};
use crate::ledger::{CheckType, DayLedger};
use crate::repo::{LedgerScope, LedgerStore, Page, clamp_page, clamp_page_size};

/// How many times a mark request re-reads and re-applies after losing a
/// write race before giving up with `WriteConflict`.
pub const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Body of a mark-attendance request. `proofUrl` is the durable URL the
/// media collaborator returned for the proof-of-presence image; this
/// service never receives the raw bytes.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkRequest {
    #[schema(example = "Check-In")]
    pub check_type: CheckType,
    #[schema(example = 25.6100)]
    pub latitude: f64,
    #[schema(example = 85.1414)]
    pub longitude: f64,
    #[schema(example = "within-geofence")]
    pub location_status: String,
    #[serde(default)]
    #[schema(example = "https://media.example.com/a1b2.jpg")]
    pub proof_url: Option<String>,
}

/// The attendance engine: geofence gate, per-day session state machine and
/// retrying persistence, plus the read-only report paths over the store.
///
/// Cheap to clone; handlers share one instance through `web::Data`.
#[derive(Clone)]
pub struct AttendanceEngine {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    policy: GeofencePolicy,
    utc_offset: FixedOffset,
}

impl AttendanceEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        policy: GeofencePolicy,
        utc_offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            clock,
            policy,
            utc_offset,
        }
    }

    /// Apply one check-in/check-out to the employee's ledger for "today".
    ///
    /// Validation and the geofence gate run before any store access, so
    /// every failure up to the persist step leaves no trace. The
    /// find-or-create-then-write sequence retries a bounded number of
    /// times when a concurrent writer wins the `(employee, day)` key.
    #[instrument(
        name = "mark_attendance",
        skip(self, request),
        fields(check_type = %request.check_type)
    )]
    pub async fn mark_attendance(
        &self,
        employee_id: u64,
        request: &MarkRequest,
    ) -> AttendanceResult<DayLedger> {
        let location = GeoPoint::new(request.longitude, request.latitude)?;
        let proof = match request.proof_url.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => return Err(AttendanceError::ProofRequired),
        };

        let decision = self.policy.admit(location)?;
        debug!(
            distance_m = decision.distance_meters,
            within_fence = decision.within_fence,
            "Geofence evaluated"
        );

        let mut attempt = 1;
        loop {
            let now = self.clock.now();
            let day = local_day(now, self.utc_offset);

            let mut ledger = match self.store.find_ledger(employee_id, day).await? {
                Some(existing) => existing,
                None => DayLedger::new(employee_id, day),
            };
            if ledger.employee_id != employee_id {
                return Err(AttendanceError::Forbidden(
                    "attendance record belongs to another employee".to_string(),
                ));
            }

            match request.check_type {
                CheckType::CheckIn => ledger.apply_check_in(
                    now,
                    proof.clone(),
                    location,
                    request.location_status.clone(),
                )?,
                CheckType::CheckOut => ledger.apply_check_out(
                    now,
                    proof.clone(),
                    location,
                    request.location_status.clone(),
                )?,
            }

            let persisted = if ledger.id.is_none() {
                self.store.insert_ledger(&ledger).await
            } else {
                self.store.update_ledger(&ledger).await
            };

            match persisted {
                Ok(stored) => {
                    info!(
                        day = %stored.day,
                        sessions = stored.sessions.len(),
                        "{} recorded",
                        request.check_type
                    );
                    return Ok(stored);
                }
                Err(AttendanceError::WriteConflict) if attempt < MAX_WRITE_ATTEMPTS => {
                    warn!(attempt, "Ledger write conflict, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One page of ledger history, newest day first.
    pub async fn attendance_logs(
        &self,
        scope: LedgerScope,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> AttendanceResult<Page<DayLedger>> {
        self.store
            .paginate(scope, clamp_page(page), clamp_page_size(page_size))
            .await
    }

    /// Hours per day over the employee's whole history, newest day first.
    pub async fn daily_report(&self, employee_id: u64) -> AttendanceResult<Vec<DailyBucket>> {
        let ledgers = self
            .store
            .find_all(LedgerScope::Employee(employee_id))
            .await?;
        Ok(aggregate::daily_report(&ledgers))
    }

    /// Hours per day within one month, oldest day first.
    pub async fn monthly_summary(
        &self,
        employee_id: u64,
        year: i32,
        month: u32,
    ) -> AttendanceResult<Vec<DailyBucket>> {
        let Some((start, end)) = month_bounds(year, month) else {
            return Ok(Vec::new());
        };
        let ledgers = self
            .store
            .find_in_range(LedgerScope::Employee(employee_id), start, end)
            .await?;
        Ok(aggregate::monthly_summary(&ledgers, year, month))
    }

    /// Raw ledgers within a date range, newest day first.
    pub async fn range_report(
        &self,
        scope: LedgerScope,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AttendanceResult<Vec<DayLedger>> {
        self.store.find_in_range(scope, start, end).await
    }
}

fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = start.checked_add_months(Months::new(1))?.pred_opt()?;
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::clock::FixedClock;
    use crate::repo::InMemoryLedgerStore;

    const OFFICE_LAT: f64 = 25.6100;
    const OFFICE_LNG: f64 = 85.1414;
    // 5000m along the meridian, in degrees of latitude.
    const FIVE_KM_LAT: f64 = 0.0449661;

    fn policy(enabled: bool) -> GeofencePolicy {
        GeofencePolicy::new(
            GeoPoint::new(OFFICE_LNG, OFFICE_LAT).unwrap(),
            200.0,
            enabled,
        )
    }

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(330 * 60).unwrap()
    }

    fn nine_am_ist() -> DateTime<Utc> {
        // 03:30 UTC is 09:00 at +05:30.
        Utc.with_ymd_and_hms(2026, 8, 25, 3, 30, 0).unwrap()
    }

    fn check_in_request() -> MarkRequest {
        MarkRequest {
            check_type: CheckType::CheckIn,
            latitude: OFFICE_LAT,
            longitude: OFFICE_LNG,
            location_status: "within-geofence".to_string(),
            proof_url: Some("https://media.example.com/in.jpg".to_string()),
        }
    }

    fn check_out_request() -> MarkRequest {
        MarkRequest {
            check_type: CheckType::CheckOut,
            ..check_in_request()
        }
    }

    fn engine_with(
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        policy: GeofencePolicy,
    ) -> AttendanceEngine {
        AttendanceEngine::new(store, clock, policy, ist())
    }

    #[actix_web::test]
    async fn office_check_in_and_out_records_a_closed_session() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let clock = Arc::new(FixedClock::at(nine_am_ist()));
        let engine = engine_with(store.clone(), clock.clone(), policy(true));

        let ledger = engine
            .mark_attendance(1000, &check_in_request())
            .await
            .unwrap();
        assert!(ledger.is_open());
        assert_eq!(ledger.day, NaiveDate::from_ymd_opt(2026, 8, 25).unwrap());
        assert_eq!(ledger.sessions.len(), 1);

        // Second check-in without an intervening check-out is a conflict
        // and leaves the stored ledger untouched.
        let err = engine.mark_attendance(1000, &check_in_request()).await;
        assert_matches!(err, Err(AttendanceError::AlreadyCheckedIn));
        let stored = store.find_ledger(1000, ledger.day).await.unwrap().unwrap();
        assert_eq!(stored.sessions.len(), 1);
        assert!(stored.is_open());

        clock.advance(Duration::minutes(90));
        let ledger = engine
            .mark_attendance(1000, &check_out_request())
            .await
            .unwrap();
        assert!(!ledger.is_open());
        let session = ledger.last_session().unwrap();
        assert!(session.check_out.unwrap() >= session.check_in.unwrap());

        let report = engine.daily_report(1000).await.unwrap();
        assert_eq!(report.len(), 1);
        assert!(report[0].total_hours > 0.0);
        assert_eq!(report[0].total_hours, 1.5);
    }

    #[actix_web::test]
    async fn out_of_range_check_in_creates_no_ledger() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let clock = Arc::new(FixedClock::at(nine_am_ist()));
        let engine = engine_with(store.clone(), clock, policy(true));

        let request = MarkRequest {
            latitude: OFFICE_LAT + FIVE_KM_LAT,
            ..check_in_request()
        };
        let err = engine.mark_attendance(1000, &request).await.unwrap_err();
        assert_matches!(
            err,
            AttendanceError::OutOfRange { distance_meters, .. }
                if (distance_meters - 5000.0).abs() < 50.0
        );

        assert!(store.find_all(LedgerScope::All).await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn disabled_fence_admits_far_coordinates() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let clock = Arc::new(FixedClock::at(nine_am_ist()));
        let engine = engine_with(store.clone(), clock, policy(false));

        let request = MarkRequest {
            latitude: OFFICE_LAT + FIVE_KM_LAT,
            location_status: "remote-override".to_string(),
            ..check_in_request()
        };
        let ledger = engine.mark_attendance(1000, &request).await.unwrap();

        assert!(ledger.is_open());
        assert_eq!(
            ledger.last_session().unwrap().check_in_status.as_deref(),
            Some("remote-override")
        );
    }

    #[actix_web::test]
    async fn check_out_without_open_session_persists_nothing() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let clock = Arc::new(FixedClock::at(nine_am_ist()));
        let engine = engine_with(store.clone(), clock, policy(true));

        let err = engine.mark_attendance(1000, &check_out_request()).await;
        assert_matches!(err, Err(AttendanceError::NoActiveSession));
        assert!(store.find_all(LedgerScope::All).await.unwrap().is_empty());
    }

    /// Every method panics: validation failures must return before the
    /// store is ever touched.
    struct UnreachableStore;

    #[async_trait]
    impl LedgerStore for UnreachableStore {
        async fn find_ledger(
            &self,
            _employee_id: u64,
            _day: NaiveDate,
        ) -> AttendanceResult<Option<DayLedger>> {
            unreachable!("store touched before validation finished")
        }
        async fn insert_ledger(&self, _ledger: &DayLedger) -> AttendanceResult<DayLedger> {
            unreachable!("store touched before validation finished")
        }
        async fn update_ledger(&self, _ledger: &DayLedger) -> AttendanceResult<DayLedger> {
            unreachable!("store touched before validation finished")
        }
        async fn find_all(&self, _scope: LedgerScope) -> AttendanceResult<Vec<DayLedger>> {
            unreachable!("store touched before validation finished")
        }
        async fn find_in_range(
            &self,
            _scope: LedgerScope,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> AttendanceResult<Vec<DayLedger>> {
            unreachable!("store touched before validation finished")
        }
        async fn find_for_day(
            &self,
            _scope: LedgerScope,
            _day: NaiveDate,
        ) -> AttendanceResult<Vec<DayLedger>> {
            unreachable!("store touched before validation finished")
        }
        async fn paginate(
            &self,
            _scope: LedgerScope,
            _page: u32,
            _page_size: u32,
        ) -> AttendanceResult<Page<DayLedger>> {
            unreachable!("store touched before validation finished")
        }
    }

    #[actix_web::test]
    async fn validation_failures_precede_store_access() {
        let clock = Arc::new(FixedClock::at(nine_am_ist()));
        let engine = engine_with(Arc::new(UnreachableStore), clock, policy(true));

        let bad_coords = MarkRequest {
            latitude: 90.5,
            ..check_in_request()
        };
        assert_matches!(
            engine.mark_attendance(1000, &bad_coords).await,
            Err(AttendanceError::InvalidCoordinates)
        );

        let no_proof = MarkRequest {
            proof_url: None,
            ..check_in_request()
        };
        assert_matches!(
            engine.mark_attendance(1000, &no_proof).await,
            Err(AttendanceError::ProofRequired)
        );

        let blank_proof = MarkRequest {
            proof_url: Some("   ".to_string()),
            ..check_in_request()
        };
        assert_matches!(
            engine.mark_attendance(1000, &blank_proof).await,
            Err(AttendanceError::ProofRequired)
        );

        let too_far = MarkRequest {
            latitude: OFFICE_LAT + FIVE_KM_LAT,
            ..check_in_request()
        };
        assert_matches!(
            engine.mark_attendance(1000, &too_far).await,
            Err(AttendanceError::OutOfRange { .. })
        );
    }

    /// Delegates to an in-memory store but yields after every read, so two
    /// concurrent marks interleave their read-modify-write sequences.
    struct RacingStore(InMemoryLedgerStore);

    #[async_trait]
    impl LedgerStore for RacingStore {
        async fn find_ledger(
            &self,
            employee_id: u64,
            day: NaiveDate,
        ) -> AttendanceResult<Option<DayLedger>> {
            let found = self.0.find_ledger(employee_id, day).await;
            actix_web::rt::task::yield_now().await;
            found
        }
        async fn insert_ledger(&self, ledger: &DayLedger) -> AttendanceResult<DayLedger> {
            self.0.insert_ledger(ledger).await
        }
        async fn update_ledger(&self, ledger: &DayLedger) -> AttendanceResult<DayLedger> {
            self.0.update_ledger(ledger).await
        }
        async fn find_all(&self, scope: LedgerScope) -> AttendanceResult<Vec<DayLedger>> {
            self.0.find_all(scope).await
        }
        async fn find_in_range(
            &self,
            scope: LedgerScope,
            start: NaiveDate,
            end: NaiveDate,
        ) -> AttendanceResult<Vec<DayLedger>> {
            self.0.find_in_range(scope, start, end).await
        }
        async fn find_for_day(
            &self,
            scope: LedgerScope,
            day: NaiveDate,
        ) -> AttendanceResult<Vec<DayLedger>> {
            self.0.find_for_day(scope, day).await
        }
        async fn paginate(
            &self,
            scope: LedgerScope,
            page: u32,
            page_size: u32,
        ) -> AttendanceResult<Page<DayLedger>> {
            self.0.paginate(scope, page, page_size).await
        }
    }

    #[actix_web::test]
    async fn racing_check_ins_resolve_to_one_session() {
        let store = Arc::new(RacingStore(InMemoryLedgerStore::new()));
        let clock = Arc::new(FixedClock::at(nine_am_ist()));
        let engine = engine_with(store.clone(), clock, policy(true));

        let (first, second) = futures::future::join(
            engine.mark_attendance(1000, &check_in_request()),
            engine.mark_attendance(1000, &check_in_request()),
        )
        .await;

        // The insert race has one winner; the loser retries, sees the open
        // session, and fails the state machine instead of duplicating it.
        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes.iter().any(|r| matches!(
            r,
            Err(AttendanceError::AlreadyCheckedIn)
        )));

        let ledgers = store.find_all(LedgerScope::All).await.unwrap();
        assert_eq!(ledgers.len(), 1);
        assert_eq!(ledgers[0].sessions.len(), 1);
    }

    /// Loses every write: exercises retry exhaustion.
    struct AlwaysConflictingStore {
        finds: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl LedgerStore for AlwaysConflictingStore {
        async fn find_ledger(
            &self,
            _employee_id: u64,
            _day: NaiveDate,
        ) -> AttendanceResult<Option<DayLedger>> {
            self.finds
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(None)
        }
        async fn insert_ledger(&self, _ledger: &DayLedger) -> AttendanceResult<DayLedger> {
            Err(AttendanceError::WriteConflict)
        }
        async fn update_ledger(&self, _ledger: &DayLedger) -> AttendanceResult<DayLedger> {
            Err(AttendanceError::WriteConflict)
        }
        async fn find_all(&self, _scope: LedgerScope) -> AttendanceResult<Vec<DayLedger>> {
            Ok(Vec::new())
        }
        async fn find_in_range(
            &self,
            _scope: LedgerScope,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> AttendanceResult<Vec<DayLedger>> {
            Ok(Vec::new())
        }
        async fn find_for_day(
            &self,
            _scope: LedgerScope,
            _day: NaiveDate,
        ) -> AttendanceResult<Vec<DayLedger>> {
            Ok(Vec::new())
        }
        async fn paginate(
            &self,
            _scope: LedgerScope,
            page: u32,
            page_size: u32,
        ) -> AttendanceResult<Page<DayLedger>> {
            Ok(Page {
                items: Vec::new(),
                total_count: 0,
                page,
                page_size,
            })
        }
    }

    #[actix_web::test]
    async fn write_conflicts_retry_a_bounded_number_of_times() {
        let store = Arc::new(AlwaysConflictingStore {
            finds: std::sync::atomic::AtomicU32::new(0),
        });
        let clock = Arc::new(FixedClock::at(nine_am_ist()));
        let engine = engine_with(store.clone(), clock, policy(true));

        let err = engine.mark_attendance(1000, &check_in_request()).await;
        assert_matches!(err, Err(AttendanceError::WriteConflict));
        assert_eq!(
            store.finds.load(std::sync::atomic::Ordering::SeqCst),
            MAX_WRITE_ATTEMPTS
        );
    }

    #[actix_web::test]
    async fn monthly_summary_spans_exactly_the_month() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let clock = Arc::new(FixedClock::at(nine_am_ist()));
        let engine = engine_with(store.clone(), clock.clone(), policy(true));

        engine
            .mark_attendance(1000, &check_in_request())
            .await
            .unwrap();
        clock.advance(Duration::minutes(120));
        engine
            .mark_attendance(1000, &check_out_request())
            .await
            .unwrap();

        let summary = engine.monthly_summary(1000, 2026, 8).await.unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].total_hours, 2.00);

        assert!(engine.monthly_summary(1000, 2026, 7).await.unwrap().is_empty());
        // Nonsense months resolve to an empty summary rather than an error.
        assert!(engine.monthly_summary(1000, 2026, 13).await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn attendance_logs_clamp_pagination_inputs() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let clock = Arc::new(FixedClock::at(nine_am_ist()));
        let engine = engine_with(store.clone(), clock, policy(true));

        engine
            .mark_attendance(1000, &check_in_request())
            .await
            .unwrap();

        let page = engine
            .attendance_logs(LedgerScope::Employee(1000), Some(0), Some(500))
            .await
            .unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 50);
        assert_eq!(page.total_count, 1);
    }
}
