use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clock::{Clock, local_day, local_end_of_day, until_next_local_midnight};
use crate::engine::MAX_WRITE_ATTEMPTS;
use crate::error::{AttendanceError, AttendanceResult};
use crate::ledger::DayLedger;
use crate::repo::{LedgerScope, LedgerStore};

/// Check-out status stamped on sessions the sweep closes.
pub const AUTO_CLOSEOUT_STATUS: &str = "auto-closeout";

/// Counts from one sweep run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepOutcome {
    /// Ledgers dated yesterday that were inspected.
    pub scanned: usize,
    /// Ledgers whose open session was force-closed.
    pub closed: usize,
    /// Ledgers whose closeout failed; the rest of the batch still ran.
    pub failures: usize,
}

/// Force-close every session still open on yesterday's ledgers.
///
/// The check-out lands on 23:59:59.999 local time of that day with status
/// [`AUTO_CLOSEOUT_STATUS`] and the check-in location copied over. Already
/// closed ledgers are untouched, so re-running over the same data is a
/// no-op. One ledger failing is counted and skipped, not propagated; only
/// a failure of the scan itself errors the run.
pub async fn run_once(
    store: &dyn LedgerStore,
    clock: &dyn Clock,
    offset: FixedOffset,
) -> AttendanceResult<SweepOutcome> {
    let yesterday = local_day(clock.now(), offset) - Duration::days(1);
    let close_at = local_end_of_day(yesterday, offset);

    let ledgers = store.find_for_day(LedgerScope::All, yesterday).await?;
    let mut outcome = SweepOutcome {
        scanned: ledgers.len(),
        ..SweepOutcome::default()
    };

    for ledger in ledgers {
        if !ledger.is_open() {
            continue;
        }
        let employee_id = ledger.employee_id;
        match close_ledger(store, ledger, close_at).await {
            Ok(true) => outcome.closed += 1,
            Ok(false) => {}
            Err(e) => {
                error!(
                    employee_id,
                    day = %yesterday,
                    error = %e,
                    "Auto-closeout failed for ledger"
                );
                outcome.failures += 1;
            }
        }
    }

    Ok(outcome)
}

/// Close one ledger's open session and persist it, re-reading and
/// re-applying on a lost write race. Returns whether anything was closed.
async fn close_ledger(
    store: &dyn LedgerStore,
    mut ledger: DayLedger,
    close_at: DateTime<Utc>,
) -> AttendanceResult<bool> {
    let mut attempt = 1;
    loop {
        if !ledger.close_last_open_session(close_at, AUTO_CLOSEOUT_STATUS) {
            return Ok(false);
        }
        match store.update_ledger(&ledger).await {
            Ok(_) => return Ok(true),
            Err(AttendanceError::WriteConflict) if attempt < MAX_WRITE_ATTEMPTS => {
                warn!(
                    employee_id = ledger.employee_id,
                    attempt, "Sweep write conflict, re-reading ledger"
                );
                attempt += 1;
                ledger = store
                    .find_ledger(ledger.employee_id, ledger.day)
                    .await?
                    .ok_or(AttendanceError::WriteConflict)?;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Run the sweep at every local midnight until the task is dropped.
///
/// Spawned once at startup; the single sequential loop is what keeps runs
/// from overlapping.
pub async fn run_scheduler(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>, offset: FixedOffset) {
    info!("Auto-closeout sweep scheduler started");
    loop {
        let sleep = until_next_local_midnight(clock.now(), offset);
        info!(
            sleep_secs = sleep.as_secs(),
            "Sweep sleeping until next local midnight"
        );
        actix_web::rt::time::sleep(sleep).await;

        let run_id = Uuid::new_v4();
        match run_once(store.as_ref(), clock.as_ref(), offset).await {
            Ok(outcome) => info!(
                %run_id,
                scanned = outcome.scanned,
                closed = outcome.closed,
                failures = outcome.failures,
                "Auto-closeout sweep finished"
            ),
            Err(e) => error!(%run_id, error = %e, "Auto-closeout sweep failed"),
        }
    }
}
