use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::loan::Loan;
use crate::storage::{LoanStore, StorageError, StorageResult};
use crate::types::{InstallmentId, LoanId};

#[derive(Debug)]
struct Tables {
    loans: HashMap<LoanId, Loan>,
    next_loan_id: LoanId,
    next_installment_id: InstallmentId,
}

/// process-local store, ids assigned sequentially from 1
#[derive(Debug)]
pub struct InMemoryLoanStore {
    tables: RwLock<Tables>,
}

impl Default for InMemoryLoanStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLoanStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables {
                loans: HashMap::new(),
                next_loan_id: 1,
                next_installment_id: 1,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.tables.read().loans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LoanStore for InMemoryLoanStore {
    fn save(&self, mut loan: Loan) -> StorageResult<Loan> {
        if loan.is_persisted() {
            return Err(StorageError::AlreadyPersisted { loan_id: loan.id });
        }

        let mut tables = self.tables.write();
        let loan_id = tables.next_loan_id;
        tables.next_loan_id += 1;

        loan.id = loan_id;
        loan.version = 0;
        loan.normalize();
        for inst in loan.installments.iter_mut() {
            inst.id = tables.next_installment_id;
            inst.loan_id = loan_id;
            tables.next_installment_id += 1;
        }

        tables.loans.insert(loan_id, loan.clone());
        debug!(loan_id, installments = loan.installments.len(), "loan saved in memory");

        Ok(loan)
    }

    fn find_by_id(&self, id: LoanId) -> StorageResult<Loan> {
        self.tables
            .read()
            .loans
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound { loan_id: id })
    }

    fn update(&self, loan: &Loan) -> StorageResult<()> {
        let mut tables = self.tables.write();
        let stored = tables
            .loans
            .get_mut(&loan.id)
            .ok_or(StorageError::NotFound { loan_id: loan.id })?;

        if stored.version != loan.version {
            return Err(StorageError::VersionConflict {
                loan_id: loan.id,
                expected: loan.version,
                found: stored.version,
            });
        }

        // validate every row before writing any, so a failed update leaves the record intact
        let mut positions = Vec::with_capacity(loan.installments.len());
        for inst in &loan.installments {
            let pos = stored
                .installments
                .iter()
                .position(|s| s.week_number == inst.week_number)
                .ok_or(StorageError::UnknownInstallment {
                    loan_id: loan.id,
                    week_number: inst.week_number,
                })?;
            positions.push(pos);
        }

        stored.status = loan.status;
        for (inst, pos) in loan.installments.iter().zip(positions) {
            let row = &mut stored.installments[pos];
            row.is_paid = inst.is_paid;
            row.paid_at = inst.paid_at;
        }
        stored.version += 1;

        debug!(loan_id = loan.id, version = stored.version, status = %loan.status, "loan updated in memory");
        Ok(())
    }
}
