pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use thiserror::Error;

use crate::config::StorageConfig;
use crate::loan::Loan;
use crate::types::LoanId;

pub use memory::InMemoryLoanStore;
pub use sqlite::SqliteLoanStore;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("loan not found: {loan_id}")]
    NotFound {
        loan_id: LoanId,
    },

    #[error("loan {loan_id} is already persisted")]
    AlreadyPersisted {
        loan_id: LoanId,
    },

    #[error("version conflict on loan {loan_id}: expected {expected}, found {found}")]
    VersionConflict {
        loan_id: LoanId,
        expected: u32,
        found: u32,
    },

    #[error("installment week {week_number} does not exist on loan {loan_id}")]
    UnknownInstallment {
        loan_id: LoanId,
        week_number: u32,
    },

    #[error("corrupt record: {message}")]
    Corrupt {
        message: String,
    },

    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
    },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// loan persistence capability; save and update are atomic over the whole schedule
pub trait LoanStore: Send + Sync {
    /// persist a new loan and its installments, returning it with assigned ids
    fn save(&self, loan: Loan) -> StorageResult<Loan>;

    /// load a loan with installments in ascending week order
    fn find_by_id(&self, id: LoanId) -> StorageResult<Loan>;

    /// persist status and installment payment state; `loan.version` must match the stored one
    fn update(&self, loan: &Loan) -> StorageResult<()>;
}

impl<S: LoanStore + ?Sized> LoanStore for Box<S> {
    fn save(&self, loan: Loan) -> StorageResult<Loan> {
        (**self).save(loan)
    }

    fn find_by_id(&self, id: LoanId) -> StorageResult<Loan> {
        (**self).find_by_id(id)
    }

    fn update(&self, loan: &Loan) -> StorageResult<()> {
        (**self).update(loan)
    }
}

impl<S: LoanStore + ?Sized> LoanStore for Arc<S> {
    fn save(&self, loan: Loan) -> StorageResult<Loan> {
        (**self).save(loan)
    }

    fn find_by_id(&self, id: LoanId) -> StorageResult<Loan> {
        (**self).find_by_id(id)
    }

    fn update(&self, loan: &Loan) -> StorageResult<()> {
        (**self).update(loan)
    }
}

/// open the backend selected by configuration
pub fn open_store(config: &StorageConfig) -> StorageResult<Box<dyn LoanStore>> {
    match config {
        StorageConfig::Memory => Ok(Box::new(InMemoryLoanStore::new())),
        StorageConfig::Sqlite { path } => Ok(Box::new(SqliteLoanStore::open(path)?)),
    }
}
