use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

use crate::types::LoanId;

type Slot = Arc<Mutex<()>>;

/// per-loan mutexes, created on first use and dropped with their last guard
#[derive(Debug, Default)]
pub struct LoanLocks {
    slots: Mutex<HashMap<LoanId, Slot>>,
}

/// exclusive section held while one loan is read, changed and written back
pub struct LoanGuard<'a> {
    locks: &'a LoanLocks,
    loan_id: LoanId,
    held: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl LoanLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// block until the section for `loan_id` is free, then hold it until the guard drops
    pub fn acquire(&self, loan_id: LoanId) -> LoanGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(loan_id).or_default())
        };

        LoanGuard {
            locks: self,
            loan_id,
            held: Some(slot.lock_arc()),
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.slots.lock().len()
    }

    /// forget the slot unless another caller still holds or waits on it
    fn release(&self, loan_id: LoanId) {
        let mut slots = self.slots.lock();
        if slots.get(&loan_id).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(&loan_id);
        }
    }
}

impl Drop for LoanGuard<'_> {
    fn drop(&mut self) {
        // unlock first so the map only sees the references of other callers
        drop(self.held.take());
        self.locks.release(self.loan_id);
    }
}
