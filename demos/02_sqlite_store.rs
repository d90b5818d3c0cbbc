/// sqlite store - persist loans to a file and drive them through the request handlers
use loan_billing_rs::api::{self, Method};
use loan_billing_rs::{BillingConfig, LoanService};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let path = std::env::temp_dir().join("loan-billing-demo.db");
    let service = LoanService::from_config(BillingConfig::sqlite(&path))?;
    println!("database: {}", path.display());

    let created = api::handle(&service, Method::Post, "/loans/create", r#"{"principal": 5000000, "weeks": 50}"#);
    println!("create -> {} {}", created.status, created.body["id"]);

    let target = format!("/loans/pay?id={}", created.body["id"]);
    let paid = api::handle(&service, Method::Post, &target, r#"{"amount": 110000}"#);
    println!("pay -> {} {}", paid.status, paid.body);

    let rejected = api::handle(&service, Method::Post, &target, r#"{"amount": 100000}"#);
    println!("pay -> {} {}", rejected.status, rejected.body);

    let target = format!("/loans/status?id={}", created.body["id"]);
    let status = api::handle(&service, Method::Get, &target, "");
    println!("status -> {} outstanding {}", status.status, status.body["outstanding"]);

    Ok(())
}
