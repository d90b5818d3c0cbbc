use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::decimal::{Money, Rate};
use crate::errors::{BillingError, Result};

/// bound on `delinquency_lookahead_days` in either direction
pub const MAX_LOOKAHEAD_DAYS: i64 = 36_500;

/// billing policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// flat rate applied when a request carries no rate
    pub default_interest_rate: Rate,
    /// maximum difference between a payment and the installment due
    pub payment_tolerance: Money,
    /// missed installments at which a loan turns delinquent
    pub delinquency_threshold: u32,
    /// days added to the clock when evaluating delinquency
    pub delinquency_lookahead_days: i64,
    pub storage: StorageConfig,
}

/// where loans are persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    Memory,
    Sqlite { path: PathBuf },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl BillingConfig {
    /// 10% flat rate, one cent tolerance, delinquent at two missed installments
    pub fn standard() -> Self {
        Self {
            default_interest_rate: Rate::from_decimal(dec!(0.10)),
            payment_tolerance: Money::CENT,
            delinquency_threshold: 2,
            delinquency_lookahead_days: 0,
            storage: StorageConfig::Memory,
        }
    }

    /// standard policy persisted to a sqlite file
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig::Sqlite { path: path.into() },
            ..Self::standard()
        }
    }

    pub fn with_lookahead_days(mut self, days: i64) -> Self {
        self.delinquency_lookahead_days = days;
        self
    }

    pub fn with_interest_rate(mut self, rate: Rate) -> Self {
        self.default_interest_rate = rate;
        self
    }

    /// parse and validate a json document, missing fields take standard values
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: BillingConfig =
            serde_json::from_str(json).map_err(|e| BillingError::InvalidConfiguration {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| BillingError::InvalidConfiguration {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_interest_rate.is_negative() {
            return Err(BillingError::InvalidInterestRate {
                rate: self.default_interest_rate,
            });
        }

        if self.payment_tolerance.is_negative() {
            return Err(BillingError::InvalidConfiguration {
                message: format!("payment tolerance must not be negative: {}", self.payment_tolerance),
            });
        }

        if self.delinquency_threshold == 0 {
            return Err(BillingError::InvalidConfiguration {
                message: "delinquency threshold must be at least one installment".to_string(),
            });
        }

        if !(-MAX_LOOKAHEAD_DAYS..=MAX_LOOKAHEAD_DAYS).contains(&self.delinquency_lookahead_days) {
            return Err(BillingError::InvalidConfiguration {
                message: format!(
                    "delinquency lookahead must be within {} days: {}",
                    MAX_LOOKAHEAD_DAYS, self.delinquency_lookahead_days
                ),
            });
        }

        Ok(())
    }
}
