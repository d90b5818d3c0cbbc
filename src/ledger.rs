use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::loan::Loan;
use crate::types::LoanStatus;

/// outcome of evaluating a loan's installments against a reference instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelinquencyAssessment {
    pub as_of: DateTime<Utc>,
    pub missed_payments: u32,
    pub is_delinquent: bool,
    /// status the loan should move to, `None` when no transition applies
    pub next_status: Option<LoanStatus>,
}

/// outstanding balance, the sum of unpaid installments
pub fn outstanding(loan: &Loan) -> Money {
    loan.outstanding()
}

/// count missed installments and derive the status transition, if any.
///
/// Only Active <-> Delinquent transitions are produced; a closed loan keeps its status.
pub fn assess_delinquency(loan: &Loan, as_of: DateTime<Utc>, threshold: u32) -> DelinquencyAssessment {
    let missed_payments = loan.missed_payments(as_of);
    let is_delinquent = missed_payments >= threshold;

    let next_status = match (loan.status, is_delinquent) {
        (status, _) if status.is_terminal() => None,
        (LoanStatus::Active, true) => Some(LoanStatus::Delinquent),
        (LoanStatus::Delinquent, false) => Some(LoanStatus::Active),
        _ => None,
    };

    DelinquencyAssessment {
        as_of,
        missed_payments,
        is_delinquent,
        next_status,
    }
}
