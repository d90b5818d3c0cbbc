/// time control - deterministic delinquency with a test clock
use chrono::{Duration, TimeZone, Utc};
use loan_billing_rs::{BillingConfig, InMemoryLoanStore, LoanService, Money, SafeTimeProvider, TimeSource};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("debug").init();

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();

    let service = LoanService::with_time(InMemoryLoanStore::new(), BillingConfig::standard(), time.clone())?;
    let loan = service.create_loan(Money::from_major(1_000_000), 10)?;
    let weekly = loan.installments[0].amount_due;

    println!("start: {}", time.now().format("%Y-%m-%d"));

    // skip two due dates
    controller.advance(Duration::days(15));
    println!("\nadvanced to: {}", time.now().format("%Y-%m-%d"));
    println!("delinquent: {}", service.check_delinquency(loan.id)?);
    println!("status: {}", service.find_loan(loan.id)?.status);

    // catch up on week 1
    service.make_payment(loan.id, weekly)?;
    println!("\nafter paying week 1");
    println!("delinquent: {}", service.check_delinquency(loan.id)?);
    println!("status: {}", service.find_loan(loan.id)?.status);

    for event in service.take_events() {
        println!("event: {:?}", event);
    }

    Ok(())
}
