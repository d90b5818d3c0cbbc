use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::decimal::{Money, Rate};
use crate::loan::{Installment, Loan};
use crate::storage::{LoanStore, StorageError, StorageResult};
use crate::types::{LoanId, LoanStatus};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS loans(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        principal_amount TEXT NOT NULL,
        interest_rate TEXT NOT NULL,
        total_payable TEXT NOT NULL,
        weeks_duration INTEGER NOT NULL,
        start_date TEXT NOT NULL,
        status TEXT NOT NULL CHECK(status IN ('ACTIVE','CLOSED','DELINQUENT')),
        version INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS installments(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        loan_id INTEGER NOT NULL,
        week_number INTEGER NOT NULL,
        due_date TEXT NOT NULL,
        amount_due TEXT NOT NULL,
        is_paid INTEGER NOT NULL DEFAULT 0,
        paid_at TEXT,
        UNIQUE(loan_id, week_number),
        FOREIGN KEY(loan_id) REFERENCES loans(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_installments_loan ON installments(loan_id, week_number);
"#;

/// sqlite-backed store; a single connection guarded by a mutex
pub struct SqliteLoanStore {
    conn: Mutex<Connection>,
}

impl SqliteLoanStore {
    /// open (or create) the database at `path` and apply the schema
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    /// open an in-memory database
    pub fn in_memory() -> StorageResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn parse_money(column: &str, raw: &str) -> StorageResult<Money> {
    Money::from_str(raw).map_err(|e| StorageError::Corrupt {
        message: format!("{} '{}': {}", column, raw, e),
    })
}

struct LoanRow {
    id: LoanId,
    principal: String,
    interest_rate: String,
    total_payable: String,
    weeks_duration: u32,
    start_date: DateTime<Utc>,
    status: String,
    version: u32,
}

struct InstallmentRow {
    id: i64,
    loan_id: LoanId,
    week_number: u32,
    due_date: DateTime<Utc>,
    amount_due: String,
    is_paid: bool,
    paid_at: Option<DateTime<Utc>>,
}

impl LoanStore for SqliteLoanStore {
    fn save(&self, mut loan: Loan) -> StorageResult<Loan> {
        if loan.is_persisted() {
            return Err(StorageError::AlreadyPersisted { loan_id: loan.id });
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO loans(principal_amount, interest_rate, total_payable, weeks_duration, start_date, status, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            params![
                loan.principal.to_string(),
                loan.interest_rate.as_decimal().to_string(),
                loan.total_payable.to_string(),
                loan.weeks_duration,
                loan.start_date,
                loan.status.as_str(),
            ],
        )?;
        let loan_id = tx.last_insert_rowid();

        loan.id = loan_id;
        loan.version = 0;
        loan.normalize();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO installments(loan_id, week_number, due_date, amount_due, is_paid, paid_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for inst in loan.installments.iter_mut() {
                stmt.execute(params![
                    loan_id,
                    inst.week_number,
                    inst.due_date,
                    inst.amount_due.to_string(),
                    inst.is_paid,
                    inst.paid_at,
                ])?;
                inst.id = tx.last_insert_rowid();
                inst.loan_id = loan_id;
            }
        }

        tx.commit()?;
        debug!(loan_id, installments = loan.installments.len(), "loan saved to sqlite");

        Ok(loan)
    }

    fn find_by_id(&self, id: LoanId) -> StorageResult<Loan> {
        let conn = self.conn.lock();

        let header = conn
            .query_row(
                "SELECT id, principal_amount, interest_rate, total_payable, weeks_duration, start_date, status, version
                 FROM loans WHERE id = ?1",
                params![id],
                |row| {
                    Ok(LoanRow {
                        id: row.get(0)?,
                        principal: row.get(1)?,
                        interest_rate: row.get(2)?,
                        total_payable: row.get(3)?,
                        weeks_duration: row.get(4)?,
                        start_date: row.get(5)?,
                        status: row.get(6)?,
                        version: row.get(7)?,
                    })
                },
            )
            .optional()?
            .ok_or(StorageError::NotFound { loan_id: id })?;

        let mut stmt = conn.prepare(
            "SELECT id, loan_id, week_number, due_date, amount_due, is_paid, paid_at
             FROM installments WHERE loan_id = ?1 ORDER BY week_number ASC",
        )?;
        let rows = stmt
            .query_map(params![id], |row| {
                Ok(InstallmentRow {
                    id: row.get(0)?,
                    loan_id: row.get(1)?,
                    week_number: row.get(2)?,
                    due_date: row.get(3)?,
                    amount_due: row.get(4)?,
                    is_paid: row.get(5)?,
                    paid_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let installments = rows
            .into_iter()
            .map(|r| {
                Ok(Installment {
                    id: r.id,
                    loan_id: r.loan_id,
                    week_number: r.week_number,
                    due_date: r.due_date,
                    amount_due: parse_money("amount_due", &r.amount_due)?,
                    is_paid: r.is_paid,
                    paid_at: r.paid_at,
                })
            })
            .collect::<StorageResult<Vec<_>>>()?;

        let status = LoanStatus::from_str(&header.status).map_err(|e| StorageError::Corrupt {
            message: e.to_string(),
        })?;
        let interest_rate = Rate::from_str(&header.interest_rate).map_err(|e| StorageError::Corrupt {
            message: format!("interest_rate '{}': {}", header.interest_rate, e),
        })?;

        let loan = Loan {
            id: header.id,
            principal: parse_money("principal_amount", &header.principal)?,
            interest_rate,
            total_payable: parse_money("total_payable", &header.total_payable)?,
            weeks_duration: header.weeks_duration,
            start_date: header.start_date,
            status,
            version: header.version,
            installments,
        };

        loan.check_invariants().map_err(|message| StorageError::Corrupt {
            message: format!("loan {}: {}", id, message),
        })?;

        Ok(loan)
    }

    fn update(&self, loan: &Loan) -> StorageResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let changed = tx.execute(
            "UPDATE loans SET status = ?1, version = version + 1 WHERE id = ?2 AND version = ?3",
            params![loan.status.as_str(), loan.id, loan.version],
        )?;

        if changed == 0 {
            let found: Option<u32> = tx
                .query_row("SELECT version FROM loans WHERE id = ?1", params![loan.id], |row| row.get(0))
                .optional()?;
            return Err(match found {
                Some(found) => StorageError::VersionConflict {
                    loan_id: loan.id,
                    expected: loan.version,
                    found,
                },
                None => StorageError::NotFound { loan_id: loan.id },
            });
        }

        {
            let mut stmt = tx.prepare(
                "UPDATE installments SET is_paid = ?1, paid_at = ?2 WHERE loan_id = ?3 AND week_number = ?4",
            )?;
            for inst in &loan.installments {
                let rows = stmt.execute(params![inst.is_paid, inst.paid_at, loan.id, inst.week_number])?;
                if rows == 0 {
                    // dropping the transaction rolls back the status change
                    return Err(StorageError::UnknownInstallment {
                        loan_id: loan.id,
                        week_number: inst.week_number,
                    });
                }
            }
        }

        tx.commit()?;
        debug!(loan_id = loan.id, status = %loan.status, "loan updated in sqlite");
        Ok(())
    }
}
