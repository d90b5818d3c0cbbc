use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::decimal::Money;
use crate::errors::{BillingError, ErrorKind};
use crate::loan::Installment;
use crate::service::LoanService;
use crate::storage::LoanStore;
use crate::types::{LoanId, LoanStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }

    fn from_error(err: &BillingError) -> Self {
        Self::error(status_code(err), err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLoanRequest {
    pub principal: Money,
    pub weeks: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    pub amount: Money,
}

/// response of the status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanStatusView {
    pub loan_id: LoanId,
    pub status: LoanStatus,
    pub outstanding: Money,
    pub is_delinquent: bool,
    pub installments: Vec<Installment>,
}

/// http status for a domain error
pub fn status_code(err: &BillingError) -> u16 {
    match err.kind() {
        ErrorKind::Validation => 400,
        ErrorKind::NotFound => 404,
        ErrorKind::AlreadySettled => 409,
        ErrorKind::AmountMismatch => 422,
        ErrorKind::Persistence => 500,
    }
}

/// route one request; a server adapter passes method, path with query and raw body,
/// then writes back the status and JSON body
pub fn handle<S: LoanStore>(
    service: &LoanService<S>,
    method: Method,
    target: &str,
    body: &str,
) -> ApiResponse {
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    debug!(?method, path, "handling request");

    match (path, method) {
        ("/loans/create", Method::Post) => create_loan(service, body),
        ("/loans/status", Method::Get) => loan_status(service, query),
        ("/loans/pay", Method::Post) => make_payment(service, query, body),
        ("/loans/create", _) | ("/loans/pay", _) | ("/loans/status", _) => {
            ApiResponse::error(405, "Method not allowed")
        }
        _ => ApiResponse::error(404, format!("no route for {}", path)),
    }
}

pub fn create_loan<S: LoanStore>(service: &LoanService<S>, body: &str) -> ApiResponse {
    let request: CreateLoanRequest = match serde_json::from_str(body) {
        Ok(request) => request,
        Err(_) => return ApiResponse::error(400, "Invalid request body"),
    };

    match service.create_loan(request.principal, request.weeks) {
        Ok(loan) => match serde_json::to_value(&loan) {
            Ok(body) => ApiResponse::ok(201, body),
            Err(e) => ApiResponse::error(500, e.to_string()),
        },
        Err(err) => ApiResponse::from_error(&err),
    }
}

/// runs the delinquency check first, so the reported status reflects it
pub fn loan_status<S: LoanStore>(service: &LoanService<S>, query: &str) -> ApiResponse {
    let loan_id = match parse_id(query) {
        Ok(id) => id,
        Err(err) => return ApiResponse::from_error(&err),
    };

    let view = service.check_delinquency(loan_id).and_then(|is_delinquent| {
        let loan = service.find_loan(loan_id)?;
        Ok(LoanStatusView {
            loan_id,
            status: loan.status,
            outstanding: loan.outstanding(),
            is_delinquent,
            installments: loan.installments,
        })
    });

    match view {
        Ok(view) => match serde_json::to_value(&view) {
            Ok(body) => ApiResponse::ok(200, body),
            Err(e) => ApiResponse::error(500, e.to_string()),
        },
        Err(err) => ApiResponse::from_error(&err),
    }
}

pub fn make_payment<S: LoanStore>(service: &LoanService<S>, query: &str, body: &str) -> ApiResponse {
    let loan_id = match parse_id(query) {
        Ok(id) => id,
        Err(err) => return ApiResponse::from_error(&err),
    };

    let request: PaymentRequest = match serde_json::from_str(body) {
        Ok(request) => request,
        Err(_) => return ApiResponse::error(400, "Invalid request body"),
    };

    match service.make_payment(loan_id, request.amount) {
        Ok(receipt) => ApiResponse::ok(
            200,
            json!({
                "status": "Payment Accepted",
                "week_number": receipt.week_number,
                "reference": receipt.reference,
                "loan_status": receipt.loan_status,
            }),
        ),
        Err(err) => ApiResponse::from_error(&err),
    }
}

fn parse_id(query: &str) -> Result<LoanId, BillingError> {
    let raw = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "id")
        .map(|(_, value)| value)
        .ok_or_else(|| BillingError::InvalidRequest {
            message: "missing id".to_string(),
        })?;

    raw.parse::<LoanId>().map_err(|_| BillingError::InvalidRequest {
        message: format!("Invalid ID: {}", raw),
    })
}
