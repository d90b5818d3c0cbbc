use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{BillingError, Result};
use crate::loan::{Installment, Loan};
use crate::types::LoanStatus;

pub const DAYS_PER_WEEK: i64 = 7;

/// longest schedule accepted at origination (100 years)
pub const MAX_WEEKS_DURATION: u32 = 5_200;

/// origination terms of a flat-interest weekly loan
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub principal: Money,
    pub interest_rate: Rate,
    pub weeks_duration: u32,
}

impl LoanTerms {
    pub fn new(principal: Money, interest_rate: Rate, weeks_duration: u32) -> Self {
        Self {
            principal,
            interest_rate,
            weeks_duration,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.principal.is_positive() {
            return Err(BillingError::InvalidPrincipal {
                amount: self.principal,
            });
        }

        if self.weeks_duration == 0 || self.weeks_duration > MAX_WEEKS_DURATION {
            return Err(BillingError::InvalidDuration {
                weeks: self.weeks_duration,
            });
        }

        if self.interest_rate.is_negative() {
            return Err(BillingError::InvalidInterestRate {
                rate: self.interest_rate,
            });
        }

        Ok(())
    }

    /// principal x rate, never compounded
    pub fn total_interest(&self) -> Result<Money> {
        self.principal
            .apply_rate(self.interest_rate)
            .ok_or(BillingError::AmountOutOfRange {
                amount: self.principal,
            })
    }

    pub fn total_payable(&self) -> Result<Money> {
        self.principal
            .checked_add(self.total_interest()?)
            .ok_or(BillingError::AmountOutOfRange {
                amount: self.principal,
            })
    }

    /// equal weekly share of the total payable.
    ///
    /// Rejects shares whose full schedule would not be representable, so summing
    /// installments later cannot overflow.
    pub fn weekly_amount(&self) -> Result<Money> {
        let total = self.total_payable()?;
        let share = total.split(self.weeks_duration).ok_or(BillingError::InvalidDuration {
            weeks: self.weeks_duration,
        })?;

        match share.checked_mul(self.weeks_duration) {
            Some(_) => Ok(share),
            None => Err(BillingError::AmountOutOfRange { amount: total }),
        }
    }
}

/// due date of a 1-based week relative to the loan start
pub fn due_date(start_date: DateTime<Utc>, week_number: u32) -> Result<DateTime<Utc>> {
    start_date
        .checked_add_signed(Duration::days(DAYS_PER_WEEK * i64::from(week_number)))
        .ok_or(BillingError::InvalidDuration { weeks: week_number })
}

/// build an unpersisted, active loan with its full weekly schedule
pub fn generate(terms: LoanTerms, start_date: DateTime<Utc>) -> Result<Loan> {
    terms.validate()?;

    let total_payable = terms.total_payable()?;
    let weekly_amount = terms.weekly_amount()?;

    let installments = (1..=terms.weeks_duration)
        .map(|week| -> Result<Installment> {
            Ok(Installment::scheduled(week, due_date(start_date, week)?, weekly_amount))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Loan {
        id: 0,
        principal: terms.principal,
        interest_rate: terms.interest_rate,
        total_payable,
        weeks_duration: terms.weeks_duration,
        start_date,
        status: LoanStatus::Active,
        version: 0,
        installments,
    })
}
