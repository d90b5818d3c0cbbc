use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::types::{InstallmentId, LoanId, LoanStatus};

/// one scheduled weekly repayment obligation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub id: InstallmentId,
    pub loan_id: LoanId,
    pub week_number: u32,
    pub due_date: DateTime<Utc>,
    pub amount_due: Money,
    pub is_paid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl Installment {
    /// unpersisted, unpaid installment
    pub fn scheduled(week_number: u32, due_date: DateTime<Utc>, amount_due: Money) -> Self {
        Self {
            id: 0,
            loan_id: 0,
            week_number,
            due_date,
            amount_due,
            is_paid: false,
            paid_at: None,
        }
    }

    /// paid flag and timestamp always move together
    pub fn mark_paid(&mut self, at: DateTime<Utc>) {
        self.is_paid = true;
        self.paid_at = Some(at);
    }

    /// past due and still unpaid as of `as_of`
    pub fn is_missed(&self, as_of: DateTime<Utc>) -> bool {
        !self.is_paid && self.due_date < as_of
    }
}

/// fixed-term flat-interest loan and its installment schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub principal: Money,
    pub interest_rate: Rate,
    pub total_payable: Money,
    pub weeks_duration: u32,
    pub start_date: DateTime<Utc>,
    pub status: LoanStatus,
    #[serde(default)]
    pub version: u32,
    pub installments: Vec<Installment>,
}

impl Loan {
    /// whether storage has assigned an id yet
    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }

    /// earliest unpaid installment by week number
    pub fn first_unpaid(&self) -> Option<&Installment> {
        self.installments.iter().find(|i| !i.is_paid)
    }

    pub fn unpaid_count(&self) -> usize {
        self.installments.iter().filter(|i| !i.is_paid).count()
    }

    pub fn is_fully_paid(&self) -> bool {
        self.installments.iter().all(|i| i.is_paid)
    }

    /// sum of amounts due on unpaid installments
    pub fn outstanding(&self) -> Money {
        self.installments
            .iter()
            .filter(|i| !i.is_paid)
            .map(|i| i.amount_due)
            .sum()
    }

    /// number of installments past due and unpaid as of `as_of`
    pub fn missed_payments(&self, as_of: DateTime<Utc>) -> u32 {
        self.installments.iter().filter(|i| i.is_missed(as_of)).count() as u32
    }

    /// sort installments into week order, stores may return rows unordered
    pub fn normalize(&mut self) {
        self.installments.sort_by_key(|i| i.week_number);
    }

    /// check the schedule invariants, returning a description of the first violation
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        if self.installments.len() != self.weeks_duration as usize {
            return Err(format!(
                "expected {} installments, found {}",
                self.weeks_duration,
                self.installments.len()
            ));
        }

        for (idx, inst) in self.installments.iter().enumerate() {
            let expected_week = idx as u32 + 1;
            if inst.week_number != expected_week {
                return Err(format!(
                    "installment at position {} has week {}, expected {}",
                    idx, inst.week_number, expected_week
                ));
            }
            if inst.is_paid != inst.paid_at.is_some() {
                return Err(format!(
                    "installment for week {} has inconsistent paid state",
                    inst.week_number
                ));
            }
        }

        let scheduled = self
            .installments
            .iter()
            .try_fold(Money::ZERO, |acc, i| acc.checked_add(i.amount_due))
            .ok_or_else(|| "installment amounts overflow".to_string())?;
        if !scheduled.within(self.total_payable, Money::CENT) {
            return Err(format!(
                "installments sum to {}, total payable is {}",
                scheduled, self.total_payable
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample_loan() -> Loan {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let installments = (1..=4)
            .map(|week| {
                Installment::scheduled(
                    week,
                    start + Duration::days(7 * week as i64),
                    Money::from_major(250),
                )
            })
            .collect();

        Loan {
            id: 0,
            principal: Money::from_major(1_000),
            interest_rate: Rate::ZERO,
            total_payable: Money::from_major(1_000),
            weeks_duration: 4,
            start_date: start,
            status: LoanStatus::Active,
            version: 0,
            installments,
        }
    }

    #[test]
    fn test_outstanding_ignores_paid() {
        let mut loan = sample_loan();
        assert_eq!(loan.outstanding(), Money::from_major(1_000));

        let paid_at = loan.start_date + Duration::days(3);
        loan.installments[0].mark_paid(paid_at);
        assert_eq!(loan.outstanding(), Money::from_major(750));
        assert_eq!(loan.first_unpaid().unwrap().week_number, 2);
        assert_eq!(loan.unpaid_count(), 3);
        assert!(loan.check_invariants().is_ok());
    }

    #[test]
    fn test_missed_payments_strictly_before() {
        let loan = sample_loan();
        let week_two_due = loan.installments[1].due_date;

        // due exactly at the reference instant is not yet missed
        assert_eq!(loan.missed_payments(week_two_due), 1);
        assert_eq!(loan.missed_payments(week_two_due + Duration::seconds(1)), 2);
        assert_eq!(loan.missed_payments(loan.start_date), 0);
    }

    #[test]
    fn test_invariant_violations() {
        let mut loan = sample_loan();
        loan.installments.swap(0, 1);
        assert!(loan.check_invariants().is_err());

        loan.normalize();
        assert!(loan.check_invariants().is_ok());

        loan.installments[2].is_paid = true;
        assert!(loan.check_invariants().is_err());

        let mut short = sample_loan();
        short.installments.pop();
        assert!(short.check_invariants().is_err());
    }
}
