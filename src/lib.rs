pub mod api;
pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod loan;
pub mod locks;
pub mod payments;
pub mod schedule;
pub mod service;
pub mod storage;
pub mod types;

// re-export key types
pub use config::{BillingConfig, StorageConfig};
pub use decimal::{Money, Rate};
pub use errors::{BillingError, ErrorKind, Result};
pub use events::{Event, EventStore};
pub use ledger::DelinquencyAssessment;
pub use loan::{Installment, Loan};
pub use payments::{PaymentProcessor, PaymentReceipt};
pub use schedule::LoanTerms;
pub use service::LoanService;
pub use storage::{InMemoryLoanStore, LoanStore, SqliteLoanStore, StorageError};
pub use types::{InstallmentId, LoanId, LoanStatus};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
