use thiserror::Error;

use crate::decimal::{Money, Rate};
use crate::storage::StorageError;
use crate::types::LoanId;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("invalid principal: {amount}, must be greater than zero")]
    InvalidPrincipal {
        amount: Money,
    },

    #[error("invalid duration: {weeks} weeks, must be between 1 and {}", crate::schedule::MAX_WEEKS_DURATION)]
    InvalidDuration {
        weeks: u32,
    },

    #[error("invalid interest rate: {rate}")]
    InvalidInterestRate {
        rate: Rate,
    },

    #[error("amount out of range: {amount}")]
    AmountOutOfRange {
        amount: Money,
    },

    #[error("invalid request: {message}")]
    InvalidRequest {
        message: String,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("loan not found: {loan_id}")]
    LoanNotFound {
        loan_id: LoanId,
    },

    #[error("loan {loan_id} is already fully paid")]
    AlreadySettled {
        loan_id: LoanId,
    },

    #[error("payment rejected: amount must be exactly {expected}, provided {provided}")]
    AmountMismatch {
        expected: Money,
        provided: Money,
    },

    #[error("persistence failure: {source}")]
    Persistence {
        #[from]
        source: StorageError,
    },
}

/// coarse classification used at the transport boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    AlreadySettled,
    AmountMismatch,
    Persistence,
}

impl BillingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BillingError::InvalidPrincipal { .. }
            | BillingError::InvalidDuration { .. }
            | BillingError::InvalidInterestRate { .. }
            | BillingError::AmountOutOfRange { .. }
            | BillingError::InvalidRequest { .. }
            | BillingError::InvalidConfiguration { .. } => ErrorKind::Validation,
            BillingError::LoanNotFound { .. } => ErrorKind::NotFound,
            BillingError::AlreadySettled { .. } => ErrorKind::AlreadySettled,
            BillingError::AmountMismatch { .. } => ErrorKind::AmountMismatch,
            BillingError::Persistence { .. } => ErrorKind::Persistence,
        }
    }

    /// map a lookup failure, keeping "not found" distinct from backend failures
    pub(crate) fn from_lookup(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { loan_id } => BillingError::LoanNotFound { loan_id },
            other => BillingError::Persistence { source: other },
        }
    }
}

pub type Result<T> = std::result::Result<T, BillingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_mapping() {
        let err = BillingError::from_lookup(StorageError::NotFound { loan_id: 7 });
        assert!(matches!(err, BillingError::LoanNotFound { loan_id: 7 }));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = BillingError::from_lookup(StorageError::VersionConflict {
            loan_id: 7,
            expected: 1,
            found: 2,
        });
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }

    #[test]
    fn test_mismatch_message() {
        let err = BillingError::AmountMismatch {
            expected: Money::from_major(110_000),
            provided: Money::from_major(100_000),
        };
        assert_eq!(
            err.to_string(),
            "payment rejected: amount must be exactly 110000, provided 100000"
        );
    }
}
