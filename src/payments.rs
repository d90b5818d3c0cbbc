use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::loan::Loan;
use crate::types::{LoanId, LoanStatus};

/// confirmation of an accepted payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub loan_id: LoanId,
    pub week_number: u32,
    pub amount: Money,
    pub paid_at: DateTime<Utc>,
    pub reference: Uuid,
    pub loan_status: LoanStatus,
    pub remaining_installments: usize,
}

/// next loan state plus the receipt describing the transition
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub loan: Loan,
    pub receipt: PaymentReceipt,
}

impl PaymentOutcome {
    pub fn closed_loan(&self) -> bool {
        self.loan.status == LoanStatus::Closed
    }
}

/// applies exact-amount payments to the earliest unpaid installment
#[derive(Debug, Clone, Copy)]
pub struct PaymentProcessor {
    tolerance: Money,
}

impl Default for PaymentProcessor {
    fn default() -> Self {
        Self::new(Money::CENT)
    }
}

impl PaymentProcessor {
    pub fn new(tolerance: Money) -> Self {
        Self { tolerance }
    }

    /// compute the loan state after paying `amount` at `now`.
    ///
    /// The input snapshot is never modified; on error nothing changes.
    pub fn apply(&self, loan: &Loan, amount: Money, now: DateTime<Utc>) -> Result<PaymentOutcome> {
        let position = loan
            .installments
            .iter()
            .position(|i| !i.is_paid)
            .ok_or(BillingError::AlreadySettled { loan_id: loan.id })?;

        let expected = loan.installments[position].amount_due;
        // a non-positive amount never settles an installment, however small
        if !amount.is_positive() || !amount.within(expected, self.tolerance) {
            return Err(BillingError::AmountMismatch {
                expected,
                provided: amount,
            });
        }

        let mut next = loan.clone();
        next.installments[position].mark_paid(now);

        if next.is_fully_paid() {
            next.status = LoanStatus::Closed;
        }

        let receipt = PaymentReceipt {
            loan_id: next.id,
            week_number: next.installments[position].week_number,
            amount,
            paid_at: now,
            reference: Uuid::new_v4(),
            loan_status: next.status,
            remaining_installments: next.unpaid_count(),
        };

        Ok(PaymentOutcome { loan: next, receipt })
    }
}
