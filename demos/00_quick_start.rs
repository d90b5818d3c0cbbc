/// quick start - create a loan, pay the first installment, read the balance
use loan_billing_rs::{BillingConfig, InMemoryLoanStore, LoanService, Money};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let service = LoanService::new(InMemoryLoanStore::new(), BillingConfig::standard())?;

    // 5,000,000 over 50 weeks at the standard 10% flat rate
    let loan = service.create_loan(Money::from_major(5_000_000), 50)?;
    println!("loan {} total payable: {}", loan.id, loan.total_payable);
    println!("weekly installment: {}", loan.installments[0].amount_due);

    let receipt = service.make_payment(loan.id, loan.installments[0].amount_due)?;
    println!("paid week {} (ref {})", receipt.week_number, receipt.reference);

    println!("outstanding: {}", service.get_outstanding(loan.id)?);

    Ok(())
}
