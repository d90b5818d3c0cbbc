use chrono::{DateTime, Duration, Utc};
use hourglass_rs::{SafeTimeProvider, TimeSource};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::BillingConfig;
use crate::decimal::{Money, Rate};
use crate::errors::{BillingError, Result};
use crate::events::{Event, EventStore};
use crate::ledger::{self, DelinquencyAssessment};
use crate::loan::Loan;
use crate::locks::LoanLocks;
use crate::payments::{PaymentProcessor, PaymentReceipt};
use crate::schedule::{self, LoanTerms};
use crate::storage::{self, LoanStore};
use crate::types::LoanId;

/// billing operations over a loan store
pub struct LoanService<S: LoanStore> {
    store: S,
    time: SafeTimeProvider,
    config: BillingConfig,
    processor: PaymentProcessor,
    locks: LoanLocks,
    events: Mutex<EventStore>,
}

impl LoanService<Box<dyn LoanStore>> {
    /// open the configured backend and run on system time
    pub fn from_config(config: BillingConfig) -> Result<Self> {
        let store = storage::open_store(&config.storage)?;
        Self::new(store, config)
    }
}

impl<S: LoanStore> LoanService<S> {
    /// service on system time
    pub fn new(store: S, config: BillingConfig) -> Result<Self> {
        Self::with_time(store, config, SafeTimeProvider::new(TimeSource::System))
    }

    /// service with an explicit time provider
    pub fn with_time(store: S, config: BillingConfig, time: SafeTimeProvider) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            store,
            time,
            processor: PaymentProcessor::new(config.payment_tolerance),
            config,
            locks: LoanLocks::new(),
            events: Mutex::new(EventStore::new()),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.time.now()
    }

    /// instant delinquency is evaluated against by default
    pub fn reference_instant(&self) -> DateTime<Utc> {
        self.time.now() + Duration::days(self.config.delinquency_lookahead_days)
    }

    /// originate a loan at the configured default rate
    pub fn create_loan(&self, principal: Money, weeks: u32) -> Result<Loan> {
        self.create_loan_with_rate(principal, self.config.default_interest_rate, weeks)
    }

    /// originate a loan, build its schedule and persist both together
    pub fn create_loan_with_rate(&self, principal: Money, rate: Rate, weeks: u32) -> Result<Loan> {
        let now = self.time.now();
        let draft = schedule::generate(LoanTerms::new(principal, rate, weeks), now)?;

        let loan = self.store.save(draft).map_err(|e| {
            warn!(%principal, weeks, error = %e, "failed to persist new loan");
            BillingError::Persistence { source: e }
        })?;

        info!(
            loan_id = loan.id,
            %principal,
            total_payable = %loan.total_payable,
            weeks,
            "loan originated"
        );

        self.events.lock().emit(Event::LoanOriginated {
            loan_id: loan.id,
            principal: loan.principal,
            interest_rate: loan.interest_rate,
            total_payable: loan.total_payable,
            weeks_duration: loan.weeks_duration,
            timestamp: now,
        });

        Ok(loan)
    }

    /// load a loan snapshot
    pub fn find_loan(&self, loan_id: LoanId) -> Result<Loan> {
        let loan = self.store.find_by_id(loan_id).map_err(BillingError::from_lookup)?;
        debug!(loan_id, status = %loan.status, "loan loaded");
        Ok(loan)
    }

    /// sum of unpaid installments
    pub fn get_outstanding(&self, loan_id: LoanId) -> Result<Money> {
        let loan = self.find_loan(loan_id)?;
        Ok(ledger::outstanding(&loan))
    }

    /// evaluate delinquency at the reference instant, persisting any status change
    pub fn check_delinquency(&self, loan_id: LoanId) -> Result<bool> {
        self.check_delinquency_at(loan_id, self.reference_instant())
    }

    pub fn check_delinquency_at(&self, loan_id: LoanId, as_of: DateTime<Utc>) -> Result<bool> {
        Ok(self.assess_delinquency_at(loan_id, as_of)?.is_delinquent)
    }

    /// full assessment at `as_of`; a status transition is written before returning
    pub fn assess_delinquency_at(
        &self,
        loan_id: LoanId,
        as_of: DateTime<Utc>,
    ) -> Result<DelinquencyAssessment> {
        let _guard = self.locks.acquire(loan_id);

        let mut loan = self.find_loan(loan_id)?;
        let assessment =
            ledger::assess_delinquency(&loan, as_of, self.config.delinquency_threshold);

        if let Some(new_status) = assessment.next_status {
            let old_status = loan.status;
            loan.status = new_status;
            self.store.update(&loan)?;

            info!(
                loan_id,
                %old_status,
                %new_status,
                missed_payments = assessment.missed_payments,
                "loan status changed"
            );

            self.events.lock().emit(Event::StatusChanged {
                loan_id,
                old_status,
                new_status,
                missed_payments: assessment.missed_payments,
                timestamp: self.time.now(),
            });
        }

        Ok(assessment)
    }

    /// pay the earliest unpaid installment; the amount must match it within tolerance
    pub fn make_payment(&self, loan_id: LoanId, amount: Money) -> Result<PaymentReceipt> {
        let _guard = self.locks.acquire(loan_id);

        let loan = self.find_loan(loan_id)?;
        let now = self.time.now();

        let outcome = match self.processor.apply(&loan, amount, now) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(loan_id, %amount, error = %err, "payment rejected");
                if let BillingError::AmountMismatch { expected, provided } = &err {
                    let week_number = loan.first_unpaid().map(|i| i.week_number).unwrap_or(0);
                    self.events.lock().emit(Event::PaymentRejected {
                        loan_id,
                        week_number,
                        expected: *expected,
                        provided: *provided,
                        timestamp: now,
                    });
                }
                return Err(err);
            }
        };

        self.store.update(&outcome.loan)?;

        let closed_loan = outcome.closed_loan();
        let receipt = outcome.receipt;
        info!(
            loan_id,
            week_number = receipt.week_number,
            %amount,
            reference = %receipt.reference,
            remaining = receipt.remaining_installments,
            "payment applied"
        );

        let mut events = self.events.lock();
        events.emit(Event::PaymentReceived {
            loan_id,
            week_number: receipt.week_number,
            amount,
            reference: receipt.reference,
            timestamp: now,
        });

        if closed_loan {
            info!(loan_id, "loan closed");
            events.emit(Event::LoanClosed {
                loan_id,
                final_payment: amount,
                timestamp: now,
            });
        }

        Ok(receipt)
    }

    /// drain events emitted so far
    pub fn take_events(&self) -> Vec<Event> {
        self.events.lock().take_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryLoanStore, SqliteLoanStore, StorageError, StorageResult};
    use crate::types::LoanStatus;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn service_at(
        store: InMemoryLoanStore,
        config: BillingConfig,
    ) -> (LoanService<InMemoryLoanStore>, SafeTimeProvider) {
        let time = SafeTimeProvider::new(TimeSource::Test(start()));
        let service = LoanService::with_time(store, config, time.clone()).unwrap();
        (service, time)
    }

    fn weekly() -> Money {
        Money::from_major(110_000)
    }

    /// store whose writes can be switched off
    struct FlakyStore {
        inner: InMemoryLoanStore,
        fail_save: AtomicBool,
        fail_update: AtomicBool,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: InMemoryLoanStore::new(),
                fail_save: AtomicBool::new(false),
                fail_update: AtomicBool::new(false),
            }
        }
    }

    impl LoanStore for FlakyStore {
        fn save(&self, loan: Loan) -> StorageResult<Loan> {
            if self.fail_save.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable {
                    message: "disk full".to_string(),
                });
            }
            self.inner.save(loan)
        }

        fn find_by_id(&self, id: LoanId) -> StorageResult<Loan> {
            self.inner.find_by_id(id)
        }

        fn update(&self, loan: &Loan) -> StorageResult<()> {
            if self.fail_update.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable {
                    message: "connection reset".to_string(),
                });
            }
            self.inner.update(loan)
        }
    }

    #[test]
    fn test_create_reference_loan() {
        let (service, _time) = service_at(InMemoryLoanStore::new(), BillingConfig::standard());

        let loan = service.create_loan(Money::from_major(5_000_000), 50).unwrap();
        assert_eq!(loan.id, 1);
        assert_eq!(loan.interest_rate, Rate::from_percentage(10));
        assert_eq!(loan.total_payable, Money::from_major(5_500_000));
        assert_eq!(loan.start_date, start());
        assert_eq!(loan.installments[0].due_date, start() + Duration::days(7));
        assert_eq!(loan.installments[0].amount_due, weekly());

        assert_eq!(service.get_outstanding(loan.id).unwrap(), Money::from_major(5_500_000));

        let events = service.take_events();
        assert!(matches!(events[0], Event::LoanOriginated { loan_id: 1, weeks_duration: 50, .. }));
    }

    #[test]
    fn test_create_rejects_invalid_terms_without_saving() {
        let (service, _time) = service_at(InMemoryLoanStore::new(), BillingConfig::standard());

        assert!(matches!(
            service.create_loan(Money::ZERO, 10),
            Err(BillingError::InvalidPrincipal { .. })
        ));
        assert!(matches!(
            service.create_loan(Money::from_major(100), 0),
            Err(BillingError::InvalidDuration { .. })
        ));
        assert!(service.store().is_empty());
    }

    #[test]
    fn test_single_payment() {
        let (service, _time) = service_at(InMemoryLoanStore::new(), BillingConfig::standard());
        let loan = service.create_loan(Money::from_major(5_000_000), 50).unwrap();

        let receipt = service.make_payment(loan.id, weekly()).unwrap();
        assert_eq!(receipt.week_number, 1);
        assert_eq!(receipt.loan_status, LoanStatus::Active);

        let stored = service.find_loan(loan.id).unwrap();
        assert!(stored.installments[0].is_paid);
        assert_eq!(stored.installments[0].paid_at, Some(start()));
        assert_eq!(stored.status, LoanStatus::Active);
        assert_eq!(service.get_outstanding(loan.id).unwrap(), Money::from_major(5_390_000));
    }

    #[test]
    fn test_pay_off_every_installment() {
        let (service, _time) = service_at(InMemoryLoanStore::new(), BillingConfig::standard());
        let loan = service.create_loan(Money::from_major(5_000_000), 50).unwrap();

        for week in 1..=50 {
            let receipt = service.make_payment(loan.id, weekly()).unwrap();
            assert_eq!(receipt.week_number, week);
        }

        let stored = service.find_loan(loan.id).unwrap();
        assert_eq!(stored.status, LoanStatus::Closed);
        assert_eq!(service.get_outstanding(loan.id).unwrap(), Money::ZERO);

        assert!(matches!(
            service.make_payment(loan.id, weekly()),
            Err(BillingError::AlreadySettled { .. })
        ));

        let events = service.take_events();
        assert!(matches!(events.last(), Some(Event::LoanClosed { .. })));
    }

    #[test]
    fn test_mismatched_payment_changes_nothing() {
        let (service, _time) = service_at(InMemoryLoanStore::new(), BillingConfig::standard());
        let loan = service.create_loan(Money::from_major(5_000_000), 50).unwrap();
        service.take_events();

        let err = service
            .make_payment(loan.id, Money::from_major(100_000))
            .unwrap_err();
        assert!(matches!(err, BillingError::AmountMismatch { .. }));

        let stored = service.find_loan(loan.id).unwrap();
        assert_eq!(stored, loan);
        assert!(matches!(
            service.take_events().as_slice(),
            [Event::PaymentRejected { week_number: 1, .. }]
        ));
    }

    #[test]
    fn test_unknown_loan() {
        let (service, _time) = service_at(InMemoryLoanStore::new(), BillingConfig::standard());

        assert!(matches!(
            service.make_payment(404, weekly()),
            Err(BillingError::LoanNotFound { loan_id: 404 })
        ));
        assert!(matches!(
            service.get_outstanding(404),
            Err(BillingError::LoanNotFound { .. })
        ));
        assert!(matches!(
            service.check_delinquency(404),
            Err(BillingError::LoanNotFound { .. })
        ));
    }

    #[test]
    fn test_lock_slots_do_not_accumulate() {
        let (service, _time) = service_at(InMemoryLoanStore::new(), BillingConfig::standard());
        let loan = service.create_loan(Money::from_major(5_000_000), 50).unwrap();

        for id in 1_000..2_000 {
            assert!(service.check_delinquency(id).is_err());
        }
        service.make_payment(loan.id, weekly()).unwrap();
        service.check_delinquency(loan.id).unwrap();

        assert_eq!(service.locks.tracked(), 0);
    }

    #[test]
    fn test_create_rejects_oversized_loans() {
        let (service, _time) = service_at(InMemoryLoanStore::new(), BillingConfig::standard());
        let huge = Money::from_str_exact("79228162514264337593543950335").unwrap();

        assert!(matches!(
            service.create_loan(huge, 1),
            Err(BillingError::AmountOutOfRange { .. })
        ));
        assert!(matches!(
            service.create_loan(Money::from_major(100), u32::MAX),
            Err(BillingError::InvalidDuration { .. })
        ));
        assert!(service.store().is_empty());
    }

    #[test]
    fn test_delinquency_follows_the_clock() {
        let (service, time) = service_at(InMemoryLoanStore::new(), BillingConfig::standard());
        let control = time.test_control().unwrap();
        let loan = service.create_loan(Money::from_major(5_000_000), 50).unwrap();

        assert!(!service.check_delinquency(loan.id).unwrap());

        // weeks 1 and 2 fall due on days 7 and 14
        control.advance(Duration::days(15));
        assert!(service.check_delinquency(loan.id).unwrap());
        assert_eq!(service.find_loan(loan.id).unwrap().status, LoanStatus::Delinquent);

        // repeated checks do not toggle or rewrite
        let version = service.find_loan(loan.id).unwrap().version;
        assert!(service.check_delinquency(loan.id).unwrap());
        assert_eq!(service.find_loan(loan.id).unwrap().version, version);

        // paying week 1 leaves a single missed installment
        service.make_payment(loan.id, weekly()).unwrap();
        assert_eq!(service.find_loan(loan.id).unwrap().status, LoanStatus::Delinquent);
        assert!(!service.check_delinquency(loan.id).unwrap());
        assert_eq!(service.find_loan(loan.id).unwrap().status, LoanStatus::Active);

        let changes: Vec<_> = service
            .take_events()
            .into_iter()
            .filter(|e| matches!(e, Event::StatusChanged { .. }))
            .collect();
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn test_lookahead_policy() {
        let config = BillingConfig::standard().with_lookahead_days(35);
        let (service, _time) = service_at(InMemoryLoanStore::new(), config);
        let loan = service.create_loan(Money::from_major(5_000_000), 50).unwrap();

        assert_eq!(service.reference_instant(), start() + Duration::days(35));
        let assessment = service
            .assess_delinquency_at(loan.id, service.reference_instant())
            .unwrap();
        assert_eq!(assessment.missed_payments, 4);
        assert!(assessment.is_delinquent);
    }

    #[test]
    fn test_closed_loan_stays_closed() {
        let (service, time) = service_at(InMemoryLoanStore::new(), BillingConfig::standard());
        let loan = service.create_loan(Money::from_major(1_000), 2).unwrap();
        let amount = loan.installments[0].amount_due;
        service.make_payment(loan.id, amount).unwrap();
        service.make_payment(loan.id, amount).unwrap();

        time.test_control().unwrap().advance(Duration::days(365));
        assert!(!service.check_delinquency(loan.id).unwrap());
        assert_eq!(service.find_loan(loan.id).unwrap().status, LoanStatus::Closed);
    }

    #[test]
    fn test_storage_failures_surface() {
        let time = SafeTimeProvider::new(TimeSource::Test(start()));
        let service =
            LoanService::with_time(FlakyStore::new(), BillingConfig::standard(), time.clone()).unwrap();

        service.store().fail_save.store(true, Ordering::SeqCst);
        assert!(matches!(
            service.create_loan(Money::from_major(1_000), 4),
            Err(BillingError::Persistence { .. })
        ));
        service.store().fail_save.store(false, Ordering::SeqCst);

        let loan = service.create_loan(Money::from_major(1_000), 4).unwrap();
        let amount = loan.installments[0].amount_due;

        service.store().fail_update.store(true, Ordering::SeqCst);
        assert!(matches!(
            service.make_payment(loan.id, amount),
            Err(BillingError::Persistence { .. })
        ));

        // the delinquency write is not best-effort
        time.test_control().unwrap().advance(Duration::days(30));
        assert!(matches!(
            service.check_delinquency(loan.id),
            Err(BillingError::Persistence { .. })
        ));
        assert_eq!(service.find_loan(loan.id).unwrap().status, LoanStatus::Active);
        assert!(!service.find_loan(loan.id).unwrap().installments[0].is_paid);
    }

    #[test]
    fn test_concurrent_payments_on_one_loan() {
        let (service, _time) = service_at(InMemoryLoanStore::new(), BillingConfig::standard());
        let loan = service.create_loan(Money::from_major(5_000_000), 50).unwrap();

        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| service.make_payment(loan.id, weekly())))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.iter().all(|r| r.is_ok()));
        let mut weeks: Vec<u32> = results
            .into_iter()
            .map(|r| r.unwrap().week_number)
            .collect();
        weeks.sort_unstable();
        assert_eq!(weeks, (1..=8).collect::<Vec<_>>());

        let stored = service.find_loan(loan.id).unwrap();
        assert_eq!(stored.version, 8);
        assert_eq!(stored.unpaid_count(), 42);
        assert_eq!(service.locks.tracked(), 0);
    }

    #[test]
    fn test_sqlite_backed_service() {
        let time = SafeTimeProvider::new(TimeSource::Test(start()));
        let service = LoanService::with_time(
            SqliteLoanStore::in_memory().unwrap(),
            BillingConfig::standard(),
            time,
        )
        .unwrap();

        let loan = service.create_loan(Money::from_major(5_000_000), 50).unwrap();
        service.make_payment(loan.id, weekly()).unwrap();
        assert_eq!(service.get_outstanding(loan.id).unwrap(), Money::from_major(5_390_000));
    }

    #[test]
    fn test_from_config_memory() {
        let service = LoanService::from_config(BillingConfig::standard()).unwrap();
        let loan = service.create_loan(Money::from_major(500), 5).unwrap();
        assert_eq!(service.get_outstanding(loan.id).unwrap(), Money::from_major(550));
    }
}
