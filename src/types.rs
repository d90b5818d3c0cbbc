use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// storage-assigned loan identifier, 0 until the loan is persisted
pub type LoanId = i64;

/// storage-assigned installment identifier
pub type InstallmentId = i64;

/// loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    /// performing, fewer than two missed installments
    Active,
    /// every installment paid, terminal
    Closed,
    /// two or more installments past due and unpaid
    Delinquent,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "ACTIVE",
            LoanStatus::Closed => "CLOSED",
            LoanStatus::Delinquent => "DELINQUENT",
        }
    }

    /// closed loans never change status again
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Closed)
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown loan status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for LoanStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(LoanStatus::Active),
            "CLOSED" => Ok(LoanStatus::Closed),
            "DELINQUENT" => Ok(LoanStatus::Delinquent),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
