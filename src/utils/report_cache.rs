use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{Datelike, Days, NaiveDate};
use moka::future::Cache;
use once_cell::sync::Lazy;
use tracing::info;

use crate::aggregate::{self, DailyBucket};
use crate::repo::{LedgerScope, LedgerStore};

fn cache_ttl() -> Duration {
    let secs = std::env::var("REPORT_CACHE_TTL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(300);
    Duration::from_secs(secs)
}

/// Monthly summaries keyed by `(employee_id, year, month)`. Entries expire
/// on a short TTL; writes for the affected month invalidate eagerly.
pub static REPORT_CACHE: Lazy<Cache<(u64, i32, u32), Arc<Vec<DailyBucket>>>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(100_000)
        .time_to_live(cache_ttl())
        .build()
});

/// Cached summary for one employee-month, if fresh.
pub async fn get_monthly(employee_id: u64, year: i32, month: u32) -> Option<Arc<Vec<DailyBucket>>> {
    REPORT_CACHE.get(&(employee_id, year, month)).await
}

/// Cache a freshly computed summary and hand back the shared copy.
pub async fn put_monthly(
    employee_id: u64,
    year: i32,
    month: u32,
    summary: Vec<DailyBucket>,
) -> Arc<Vec<DailyBucket>> {
    let summary = Arc::new(summary);
    REPORT_CACHE
        .insert((employee_id, year, month), summary.clone())
        .await;
    summary
}

/// Drop the cached summary for the month a write just touched.
pub async fn invalidate_month(employee_id: u64, year: i32, month: u32) {
    REPORT_CACHE.invalidate(&(employee_id, year, month)).await;
}

/// Pre-compute summaries for every employee-month seen in the recent
/// window. Fetches from the first day of the window's earliest month so
/// each cached month is complete.
pub async fn warmup_report_cache(
    store: &dyn LedgerStore,
    today: NaiveDate,
    days: u32,
) -> Result<()> {
    let window_start = today
        .checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(today);
    let start = window_start.with_day(1).unwrap_or(window_start);

    let ledgers = store.find_in_range(LedgerScope::All, start, today).await?;

    let mut months: BTreeMap<(u64, i32, u32), Vec<_>> = BTreeMap::new();
    for ledger in ledgers {
        months
            .entry((ledger.employee_id, ledger.day.year(), ledger.day.month()))
            .or_default()
            .push(ledger);
    }

    let inserts: Vec<_> = months
        .iter()
        .map(|((employee_id, year, month), ledgers)| {
            let summary = Arc::new(aggregate::monthly_summary(ledgers, *year, *month));
            REPORT_CACHE.insert((*employee_id, *year, *month), summary)
        })
        .collect();
    let total = inserts.len();

    // Await all insertions concurrently
    futures::future::join_all(inserts).await;

    info!(
        "Report cache warmup complete: {} employee-months (last {} days)",
        total, days
    );

    Ok(())
}
