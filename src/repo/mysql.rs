use async_trait::async_trait;
use chrono::NaiveDate;
use futures_util::TryStreamExt;
use sqlx::MySqlPool;
use sqlx::types::Json;
use tracing::debug;

use crate::error::{AttendanceError, AttendanceResult};
use crate::ledger::{DayLedger, Session};
use crate::repo::{LedgerScope, LedgerStore, Page};

/// Column list for `attendance_ledgers` queries.
const COLUMNS: &str = "id, employee_id, ledger_date, sessions, revision";

/// [`LedgerStore`] over the `attendance_ledgers` table (see `schema.sql`).
///
/// The `(employee_id, ledger_date)` unique key rejects duplicate inserts and
/// updates are conditional on `revision`, so concurrent writers for the same
/// employee-day serialize into one winner; losers see
/// [`AttendanceError::WriteConflict`] and retry at the engine.
pub struct MySqlLedgerStore {
    pool: MySqlPool,
}

#[derive(sqlx::FromRow)]
struct LedgerRow {
    id: u64,
    employee_id: u64,
    ledger_date: NaiveDate,
    sessions: Json<Vec<Session>>,
    revision: u64,
}

impl From<LedgerRow> for DayLedger {
    fn from(row: LedgerRow) -> Self {
        DayLedger {
            id: Some(row.id),
            employee_id: row.employee_id,
            day: row.ledger_date,
            sessions: row.sessions.0,
            revision: row.revision,
        }
    }
}

impl MySqlLedgerStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn fetch_sorted(&self, sql: &str, scope: LedgerScope, dates: &[NaiveDate]) -> AttendanceResult<Vec<DayLedger>> {
        let mut query = sqlx::query_as::<_, LedgerRow>(sql);
        for date in dates {
            query = query.bind(date);
        }
        if let Some(id) = scope.employee_id() {
            query = query.bind(id);
        }

        let mut rows = query.fetch(&self.pool);
        let mut ledgers = Vec::new();
        while let Some(row) = rows.try_next().await? {
            ledgers.push(row.into());
        }
        Ok(ledgers)
    }
}

fn is_duplicate_key(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23000"),
        _ => false,
    }
}

fn scope_condition(scope: LedgerScope) -> &'static str {
    match scope {
        LedgerScope::Employee(_) => " AND employee_id = ?",
        LedgerScope::All => "",
    }
}

#[async_trait]
impl LedgerStore for MySqlLedgerStore {
    async fn find_ledger(
        &self,
        employee_id: u64,
        day: NaiveDate,
    ) -> AttendanceResult<Option<DayLedger>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM attendance_ledgers WHERE employee_id = ? AND ledger_date = ?"
        );
        let row = sqlx::query_as::<_, LedgerRow>(&sql)
            .bind(employee_id)
            .bind(day)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(DayLedger::from))
    }

    async fn insert_ledger(&self, ledger: &DayLedger) -> AttendanceResult<DayLedger> {
        let result = sqlx::query(
            "INSERT INTO attendance_ledgers (employee_id, ledger_date, sessions, revision) \
             VALUES (?, ?, ?, 0)",
        )
        .bind(ledger.employee_id)
        .bind(ledger.day)
        .bind(Json(&ledger.sessions))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_duplicate_key(&e) {
                debug!(
                    employee_id = ledger.employee_id,
                    day = %ledger.day,
                    "Duplicate ledger insert lost the race"
                );
                AttendanceError::WriteConflict
            } else {
                AttendanceError::Database(e)
            }
        })?;

        let mut stored = ledger.clone();
        stored.id = Some(result.last_insert_id());
        stored.revision = 0;
        Ok(stored)
    }

    async fn update_ledger(&self, ledger: &DayLedger) -> AttendanceResult<DayLedger> {
        let result = sqlx::query(
            "UPDATE attendance_ledgers SET sessions = ?, revision = revision + 1 \
             WHERE employee_id = ? AND ledger_date = ? AND revision = ?",
        )
        .bind(Json(&ledger.sessions))
        .bind(ledger.employee_id)
        .bind(ledger.day)
        .bind(ledger.revision)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(
                employee_id = ledger.employee_id,
                day = %ledger.day,
                revision = ledger.revision,
                "Stale ledger update lost the race"
            );
            return Err(AttendanceError::WriteConflict);
        }

        let mut updated = ledger.clone();
        updated.revision = ledger.revision + 1;
        Ok(updated)
    }

    async fn find_all(&self, scope: LedgerScope) -> AttendanceResult<Vec<DayLedger>> {
        let where_clause = match scope {
            LedgerScope::Employee(_) => "WHERE employee_id = ?",
            LedgerScope::All => "",
        };
        let sql = format!(
            "SELECT {COLUMNS} FROM attendance_ledgers {where_clause} \
             ORDER BY ledger_date DESC, employee_id ASC"
        );
        self.fetch_sorted(&sql, scope, &[]).await
    }

    async fn find_in_range(
        &self,
        scope: LedgerScope,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AttendanceResult<Vec<DayLedger>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM attendance_ledgers WHERE ledger_date BETWEEN ? AND ?{} \
             ORDER BY ledger_date DESC, employee_id ASC",
            scope_condition(scope)
        );
        self.fetch_sorted(&sql, scope, &[start, end]).await
    }

    async fn find_for_day(
        &self,
        scope: LedgerScope,
        day: NaiveDate,
    ) -> AttendanceResult<Vec<DayLedger>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM attendance_ledgers WHERE ledger_date = ?{} \
             ORDER BY ledger_date DESC, employee_id ASC",
            scope_condition(scope)
        );
        self.fetch_sorted(&sql, scope, &[day]).await
    }

    async fn paginate(
        &self,
        scope: LedgerScope,
        page: u32,
        page_size: u32,
    ) -> AttendanceResult<Page<DayLedger>> {
        let where_clause = match scope {
            LedgerScope::Employee(_) => "WHERE employee_id = ?",
            LedgerScope::All => "",
        };

        let count_sql = format!("SELECT COUNT(*) FROM attendance_ledgers {where_clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(id) = scope.employee_id() {
            count_query = count_query.bind(id);
        }
        let total_count = count_query.fetch_one(&self.pool).await?;

        let offset = i64::from(page - 1) * i64::from(page_size);
        let data_sql = format!(
            "SELECT {COLUMNS} FROM attendance_ledgers {where_clause} \
             ORDER BY ledger_date DESC, employee_id ASC LIMIT ? OFFSET ?"
        );
        debug!(sql = %data_sql, page, page_size, offset, "Paginating ledgers");

        let mut data_query = sqlx::query_as::<_, LedgerRow>(&data_sql);
        if let Some(id) = scope.employee_id() {
            data_query = data_query.bind(id);
        }
        let rows = data_query
            .bind(i64::from(page_size))
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            items: rows.into_iter().map(DayLedger::from).collect(),
            total_count,
            page,
            page_size,
        })
    }
}
