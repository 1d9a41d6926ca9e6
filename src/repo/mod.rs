pub mod memory;
pub mod mysql;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::AttendanceResult;
use crate::ledger::DayLedger;

pub use memory::InMemoryLedgerStore;
pub use mysql::MySqlLedgerStore;

/// Smallest page size accepted by [`LedgerStore::paginate`].
pub const MIN_PAGE_SIZE: u32 = 1;
/// Largest page size accepted by [`LedgerStore::paginate`].
pub const MAX_PAGE_SIZE: u32 = 50;
/// Page size used when the caller does not supply one.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Which employees a query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerScope {
    Employee(u64),
    All,
}

impl LedgerScope {
    pub fn employee_id(self) -> Option<u64> {
        match self {
            LedgerScope::Employee(id) => Some(id),
            LedgerScope::All => None,
        }
    }
}

/// One page of a descending-by-day ledger listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: i64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> i64 {
        if self.total_count == 0 {
            0
        } else {
            (self.total_count + i64::from(self.page_size) - 1) / i64::from(self.page_size)
        }
    }

    pub fn has_next(&self) -> bool {
        i64::from(self.page) < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

/// Clamp a requested page number to 1 or greater.
pub fn clamp_page(page: Option<u32>) -> u32 {
    page.unwrap_or(1).max(1)
}

/// Clamp a requested page size into `[MIN_PAGE_SIZE, MAX_PAGE_SIZE]`,
/// defaulting when absent.
pub fn clamp_page_size(page_size: Option<u32>) -> u32 {
    page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
}

/// Durable storage for [`DayLedger`]s, keyed uniquely by
/// `(employee_id, day)`.
///
/// Concurrent writes for the same key must serialize: `insert_ledger` fails
/// on a duplicate key and `update_ledger` is a compare-and-swap on
/// `revision`, both surfacing [`crate::error::AttendanceError::WriteConflict`]
/// for the caller to retry. Two ledgers for one employee-day can never
/// coexist.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// The ledger for one employee-day, if any.
    async fn find_ledger(
        &self,
        employee_id: u64,
        day: NaiveDate,
    ) -> AttendanceResult<Option<DayLedger>>;

    /// Persist a new ledger. Fails with `WriteConflict` when a ledger for
    /// the same `(employee_id, day)` already exists.
    async fn insert_ledger(&self, ledger: &DayLedger) -> AttendanceResult<DayLedger>;

    /// Persist changes to an existing ledger, conditional on `revision`
    /// being unchanged since it was read. Fails with `WriteConflict` when a
    /// concurrent writer got there first.
    async fn update_ledger(&self, ledger: &DayLedger) -> AttendanceResult<DayLedger>;

    /// Every ledger in scope, newest day first.
    async fn find_all(&self, scope: LedgerScope) -> AttendanceResult<Vec<DayLedger>>;

    /// Ledgers dated within `[start, end]` inclusive, newest day first.
    async fn find_in_range(
        &self,
        scope: LedgerScope,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AttendanceResult<Vec<DayLedger>>;

    /// Every ledger dated exactly `day`. The sweep's scan input.
    async fn find_for_day(&self, scope: LedgerScope, day: NaiveDate)
    -> AttendanceResult<Vec<DayLedger>>;

    /// One page of the scope's ledgers, newest day first. `page` and
    /// `page_size` are expected to be pre-clamped via [`clamp_page`] and
    /// [`clamp_page_size`].
    async fn paginate(
        &self,
        scope: LedgerScope,
        page: u32,
        page_size: u32,
    ) -> AttendanceResult<Page<DayLedger>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_clamps_into_bounds() {
        assert_eq!(clamp_page_size(None), 10);
        assert_eq!(clamp_page_size(Some(0)), 1);
        assert_eq!(clamp_page_size(Some(1)), 1);
        assert_eq!(clamp_page_size(Some(50)), 50);
        assert_eq!(clamp_page_size(Some(500)), 50);
    }

    #[test]
    fn page_clamps_to_one_or_greater() {
        assert_eq!(clamp_page(None), 1);
        assert_eq!(clamp_page(Some(0)), 1);
        assert_eq!(clamp_page(Some(7)), 7);
    }

    #[test]
    fn page_envelope_math() {
        let page = Page::<u32> {
            items: vec![],
            total_count: 21,
            page: 2,
            page_size: 10,
        };
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_next());
        assert!(page.has_prev());

        let last = Page::<u32> {
            items: vec![],
            total_count: 21,
            page: 3,
            page_size: 10,
        };
        assert!(!last.has_next());

        let empty = Page::<u32> {
            items: vec![],
            total_count: 0,
            page: 1,
            page_size: 10,
        };
        assert_eq!(empty.total_pages(), 0);
        assert!(!empty.has_next());
        assert!(!empty.has_prev());
    }
}
