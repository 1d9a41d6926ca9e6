use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::{AttendanceError, AttendanceResult};
use crate::ledger::DayLedger;
use crate::repo::{LedgerScope, LedgerStore, Page};

/// In-memory [`LedgerStore`] with the same conflict semantics as the MySQL
/// store: duplicate-key rejection on insert and revision compare-and-swap
/// on update. Backs the engine and sweep tests.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    ledgers: HashMap<(u64, NaiveDate), DayLedger>,
    next_id: u64,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("ledger store mutex poisoned")
    }

    fn collect_sorted(&self, scope: LedgerScope, mut keep: impl FnMut(&DayLedger) -> bool) -> Vec<DayLedger> {
        let inner = self.locked();
        let mut ledgers: Vec<DayLedger> = inner
            .ledgers
            .values()
            .filter(|l| scope.employee_id().is_none_or(|id| l.employee_id == id))
            .filter(|l| keep(l))
            .cloned()
            .collect();
        ledgers.sort_by(|a, b| b.day.cmp(&a.day).then(a.employee_id.cmp(&b.employee_id)));
        ledgers
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn find_ledger(
        &self,
        employee_id: u64,
        day: NaiveDate,
    ) -> AttendanceResult<Option<DayLedger>> {
        Ok(self.locked().ledgers.get(&(employee_id, day)).cloned())
    }

    async fn insert_ledger(&self, ledger: &DayLedger) -> AttendanceResult<DayLedger> {
        let mut inner = self.locked();
        let key = (ledger.employee_id, ledger.day);
        if inner.ledgers.contains_key(&key) {
            return Err(AttendanceError::WriteConflict);
        }

        inner.next_id += 1;
        let mut stored = ledger.clone();
        stored.id = Some(inner.next_id);
        stored.revision = 0;
        inner.ledgers.insert(key, stored.clone());
        Ok(stored)
    }

    async fn update_ledger(&self, ledger: &DayLedger) -> AttendanceResult<DayLedger> {
        let mut inner = self.locked();
        let key = (ledger.employee_id, ledger.day);
        let stored = match inner.ledgers.get_mut(&key) {
            Some(stored) if stored.revision == ledger.revision => stored,
            _ => return Err(AttendanceError::WriteConflict),
        };

        let mut updated = ledger.clone();
        updated.id = stored.id;
        updated.revision = ledger.revision + 1;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn find_all(&self, scope: LedgerScope) -> AttendanceResult<Vec<DayLedger>> {
        Ok(self.collect_sorted(scope, |_| true))
    }

    async fn find_in_range(
        &self,
        scope: LedgerScope,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AttendanceResult<Vec<DayLedger>> {
        Ok(self.collect_sorted(scope, |l| l.day >= start && l.day <= end))
    }

    async fn find_for_day(
        &self,
        scope: LedgerScope,
        day: NaiveDate,
    ) -> AttendanceResult<Vec<DayLedger>> {
        Ok(self.collect_sorted(scope, |l| l.day == day))
    }

    async fn paginate(
        &self,
        scope: LedgerScope,
        page: u32,
        page_size: u32,
    ) -> AttendanceResult<Page<DayLedger>> {
        let all = self.collect_sorted(scope, |_| true);
        let total_count = all.len() as i64;
        let offset = (page as usize - 1) * page_size as usize;
        let items = all
            .into_iter()
            .skip(offset)
            .take(page_size as usize)
            .collect();

        Ok(Page {
            items,
            total_count,
            page,
            page_size,
        })
    }
}
