use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::ledger::{DayLedger, Session};

/// Hours worked on one calendar day, derived from closed sessions.
/// Recomputed on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DailyBucket {
    #[serde(rename = "date")]
    #[schema(example = "2026-08-25", value_type = String, format = "date")]
    pub day: NaiveDate,
    #[schema(example = 7.5)]
    pub total_hours: f64,
}

/// Total hours per day over every ledger given, newest day first.
///
/// Only sessions with both endpoints count; a day whose sessions are all
/// still open produces no bucket at all.
pub fn daily_report(ledgers: &[DayLedger]) -> Vec<DailyBucket> {
    group_closed_minutes(ledgers.iter())
        .into_iter()
        .rev()
        .map(|(day, minutes)| DailyBucket {
            day,
            total_hours: minutes as f64 / 60.0,
        })
        .collect()
}

/// Hours per day restricted to one month, oldest day first, rounded to two
/// decimals for display.
pub fn monthly_summary(ledgers: &[DayLedger], year: i32, month: u32) -> Vec<DailyBucket> {
    let in_month = ledgers
        .iter()
        .filter(|ledger| ledger.day.year() == year && ledger.day.month() == month);

    group_closed_minutes(in_month)
        .into_iter()
        .map(|(day, minutes)| DailyBucket {
            day,
            total_hours: round_two_decimals(minutes as f64 / 60.0),
        })
        .collect()
}

fn group_closed_minutes<'a>(
    ledgers: impl Iterator<Item = &'a DayLedger>,
) -> BTreeMap<NaiveDate, i64> {
    let mut minutes_by_day = BTreeMap::new();
    for ledger in ledgers {
        if ledger.sessions.iter().any(Session::is_closed) {
            *minutes_by_day.entry(ledger.day).or_insert(0) += ledger.closed_minutes();
        }
    }
    minutes_by_day
}

fn round_two_decimals(hours: f64) -> f64 {
    (hours * 100.0).round() / 100.0
}
