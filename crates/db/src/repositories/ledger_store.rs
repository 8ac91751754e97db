//! PostgreSQL implementation of the ledger store.
//!
//! One [`PgLedgerTx`] is one database transaction:
//!
//! - `SET LOCAL lock_timeout` bounds every lock wait; SQLSTATE `55P03`
//!   becomes `PostingTimeout`
//! - period postability is a transaction-scoped advisory lock, shared for
//!   postings and exclusive for close, reopen and repair
//! - account rows are locked with `SELECT ... ORDER BY code FOR UPDATE`
//! - balances move with `UPDATE ... SET balance = balance + $delta`
//! - dropping the transaction rolls it back

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use saldo_core::fiscal::AccountingPeriod;
use saldo_core::ledger::{
    Account, AccountIssue, BalanceCorrection, ChartOfAccounts, JournalEntry, JournalLine,
    LedgerError, LedgerStore, LedgerTx, LockScope, ReferenceType, StatusChange,
    EntryStatus as Status,
};
use saldo_shared::types::{AccountingPeriodId, JournalEntryId};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbBackend, DbErr, EntityTrait, JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    RelationTrait, RuntimeErr, SqlErr, Statement, TransactionTrait,
};
use tracing::{debug, warn};

use crate::entities::{
    accounting_periods, accounts, balance_corrections, journal_entries, journal_lines,
    sea_orm_active_enums::{self as db_enums, EntryStatus},
};

/// Advisory lock key guarding period postability.
const POSTABILITY_LOCK_KEY: i64 = 0x5341_4C44_4F50_4552;

/// SQLSTATE `lock_not_available`.
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// SQLSTATE `numeric_value_out_of_range`.
const NUMERIC_OUT_OF_RANGE: &str = "22003";

/// [`LedgerStore`] backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    db: DatabaseConnection,
    lock_timeout: Duration,
}

impl PgLedgerStore {
    /// Creates a store that waits at most `lock_timeout` for any lock.
    #[must_use]
    pub const fn new(db: DatabaseConnection, lock_timeout: Duration) -> Self {
        Self { db, lock_timeout }
    }

    /// The underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    fn waited_ms(&self) -> u64 {
        u64::try_from(self.lock_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

/// SQLSTATE of a database-side error, if the error came from the server.
fn sqlstate(err: &DbErr) -> Option<String> {
    let runtime = match err {
        DbErr::Exec(e) | DbErr::Query(e) | DbErr::Conn(e) => e,
        _ => return None,
    };
    match runtime {
        RuntimeErr::SqlxError(e) => e
            .as_database_error()
            .and_then(|d| d.code())
            .map(|code| code.into_owned()),
        _ => None,
    }
}

/// Maps a database error, turning lock timeouts into `PostingTimeout` and
/// `NUMERIC(20, 2)` overflows into `AmountOverflow`.
fn map_db_err(err: DbErr, waited_ms: u64) -> LedgerError {
    match sqlstate(&err).as_deref() {
        Some(LOCK_NOT_AVAILABLE) => {
            warn!(waited_ms, "database lock wait timed out");
            LedgerError::PostingTimeout { waited_ms }
        }
        Some(NUMERIC_OUT_OF_RANGE) => {
            LedgerError::AmountOverflow(format!("writing to the database: {err}"))
        }
        _ => LedgerError::Storage(err.to_string()),
    }
}

pub(crate) fn account_from_model(model: accounts::Model) -> Account {
    Account {
        code: model.code,
        name: model.name,
        account_type: model.account_type.into(),
        parent_code: model.parent_code,
        is_header: model.is_header,
        is_active: model.is_active,
        balance: model.balance,
    }
}

fn line_from_model(model: journal_lines::Model) -> JournalLine {
    JournalLine {
        line_number: u32::try_from(model.line_number).unwrap_or_default(),
        account_code: model.account_code,
        debit_amount: model.debit_amount,
        credit_amount: model.credit_amount,
        description: model.description,
    }
}

fn entry_from_models(model: journal_entries::Model, lines: Vec<journal_lines::Model>) -> JournalEntry {
    JournalEntry {
        id: JournalEntryId::from_uuid(model.id),
        entry_date: model.entry_date,
        description: model.description,
        reference: model.reference,
        reference_type: model.reference_type.into(),
        source_id: model.source_id,
        status: model.status.into(),
        total_debit: model.total_debit,
        total_credit: model.total_credit,
        reverses_entry_id: model.reverses_entry_id.map(JournalEntryId::from_uuid),
        reversed_by_entry_id: model.reversed_by_entry_id.map(JournalEntryId::from_uuid),
        posted_at: model.posted_at.map(|t| t.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
        lines: lines.into_iter().map(line_from_model).collect(),
    }
}

fn period_from_model(model: accounting_periods::Model) -> AccountingPeriod {
    AccountingPeriod {
        id: AccountingPeriodId::from_uuid(model.id),
        start_date: model.start_date,
        end_date: model.end_date,
        description: model.description,
        is_closed: model.is_closed,
        closing_journal_id: model.closing_journal_id.map(JournalEntryId::from_uuid),
        total_revenue: model.total_revenue,
        total_expense: model.total_expense,
        net_income: model.net_income,
        closed_at: model.closed_at.map(|t| t.with_timezone(&Utc)),
        reopened_at: model.reopened_at.map(|t| t.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn correction_from_model(model: balance_corrections::Model) -> BalanceCorrection {
    BalanceCorrection {
        id: model.id.into(),
        account_code: model.account_code,
        recorded_balance: model.recorded_balance,
        derived_balance: model.derived_balance,
        difference: model.difference,
        reason: model.reason,
        corrected_at: model.corrected_at.with_timezone(&Utc),
    }
}

async fn load_entry<C: ConnectionTrait>(
    conn: &C,
    id: JournalEntryId,
) -> Result<Option<JournalEntry>, DbErr> {
    let Some(header) = journal_entries::Entity::find_by_id(id.into_inner())
        .one(conn)
        .await?
    else {
        return Ok(None);
    };
    let lines = journal_lines::Entity::find()
        .filter(journal_lines::Column::JournalEntryId.eq(header.id))
        .order_by_asc(journal_lines::Column::LineNumber)
        .all(conn)
        .await?;
    Ok(Some(entry_from_models(header, lines)))
}

async fn load_periods<C: ConnectionTrait>(
    conn: &C,
    range: Option<(NaiveDate, NaiveDate)>,
) -> Result<Vec<AccountingPeriod>, DbErr> {
    let mut query = accounting_periods::Entity::find();
    if let Some((start, end)) = range {
        query = query
            .filter(accounting_periods::Column::StartDate.lte(end))
            .filter(accounting_periods::Column::EndDate.gte(start));
    }
    let periods = query
        .order_by_asc(accounting_periods::Column::StartDate)
        .all(conn)
        .await?;
    Ok(periods.into_iter().map(period_from_model).collect())
}

async fn count_drafts<C: ConnectionTrait>(
    conn: &C,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<usize, DbErr> {
    let count = journal_entries::Entity::find()
        .filter(journal_entries::Column::Status.eq(EntryStatus::Draft))
        .filter(journal_entries::Column::EntryDate.between(start, end))
        .count(conn)
        .await?;
    Ok(usize::try_from(count).unwrap_or(usize::MAX))
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Tx = PgLedgerTx;

    async fn begin(&self, scope: LockScope) -> Result<PgLedgerTx, LedgerError> {
        let waited_ms = self.waited_ms();
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| map_db_err(e, waited_ms))?;

        txn.execute_unprepared(&format!("SET LOCAL lock_timeout = '{waited_ms}ms'"))
            .await
            .map_err(|e| map_db_err(e, waited_ms))?;

        let sql = match scope {
            LockScope::Posting => "SELECT pg_advisory_xact_lock_shared($1)",
            LockScope::Exclusive => "SELECT pg_advisory_xact_lock($1)",
        };
        txn.execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            [POSTABILITY_LOCK_KEY.into()],
        ))
        .await
        .map_err(|e| map_db_err(e, waited_ms))?;

        debug!(?scope, "ledger transaction started");
        Ok(PgLedgerTx {
            txn,
            waited_ms,
            locked: BTreeSet::new(),
        })
    }

    async fn load_chart(&self) -> Result<ChartOfAccounts, LedgerError> {
        let models = accounts::Entity::find()
            .order_by_asc(accounts::Column::Code)
            .all(&self.db)
            .await
            .map_err(|e| map_db_err(e, self.waited_ms()))?;
        ChartOfAccounts::new(models.into_iter().map(account_from_model))
    }

    async fn find_entry(&self, id: JournalEntryId) -> Result<Option<JournalEntry>, LedgerError> {
        load_entry(&self.db, id)
            .await
            .map_err(|e| map_db_err(e, self.waited_ms()))
    }

    async fn list_periods(&self) -> Result<Vec<AccountingPeriod>, LedgerError> {
        load_periods(&self.db, None)
            .await
            .map_err(|e| map_db_err(e, self.waited_ms()))
    }

    async fn list_corrections(&self) -> Result<Vec<BalanceCorrection>, LedgerError> {
        let models = balance_corrections::Entity::find()
            .order_by_asc(balance_corrections::Column::CorrectedAt)
            .all(&self.db)
            .await
            .map_err(|e| map_db_err(e, self.waited_ms()))?;
        Ok(models.into_iter().map(correction_from_model).collect())
    }

    async fn count_drafts(&self, start: NaiveDate, end: NaiveDate) -> Result<usize, LedgerError> {
        count_drafts(&self.db, start, end)
            .await
            .map_err(|e| map_db_err(e, self.waited_ms()))
    }
}

/// One ledger unit of work inside a PostgreSQL transaction.
pub struct PgLedgerTx {
    txn: DatabaseTransaction,
    waited_ms: u64,
    locked: BTreeSet<String>,
}

impl PgLedgerTx {
    fn err(&self, err: DbErr) -> LedgerError {
        map_db_err(err, self.waited_ms)
    }

    fn ensure_locked(&self, code: &str) -> Result<(), LedgerError> {
        if self.locked.contains(code) {
            Ok(())
        } else {
            Err(LedgerError::Storage(format!("account {code} is not locked")))
        }
    }

    async fn insert_rows(txn: &DatabaseTransaction, entry: &JournalEntry) -> Result<(), DbErr> {
        let header = journal_entries::ActiveModel {
            id: Set(entry.id.into_inner()),
            entry_date: Set(entry.entry_date),
            description: Set(entry.description.clone()),
            reference: Set(entry.reference.clone()),
            reference_type: Set(entry.reference_type.into()),
            source_id: Set(entry.source_id.clone()),
            status: Set(entry.status.into()),
            total_debit: Set(entry.total_debit),
            total_credit: Set(entry.total_credit),
            reverses_entry_id: Set(entry.reverses_entry_id.map(JournalEntryId::into_inner)),
            reversed_by_entry_id: Set(entry.reversed_by_entry_id.map(JournalEntryId::into_inner)),
            posted_at: Set(entry.posted_at.map(Into::into)),
            created_at: Set(entry.created_at.into()),
        };
        journal_entries::Entity::insert(header).exec(txn).await?;

        let lines = entry.lines.iter().map(|line| journal_lines::ActiveModel {
            journal_entry_id: Set(entry.id.into_inner()),
            line_number: Set(i32::try_from(line.line_number).unwrap_or(i32::MAX)),
            account_code: Set(line.account_code.clone()),
            debit_amount: Set(line.debit_amount),
            credit_amount: Set(line.credit_amount),
            description: Set(line.description.clone()),
        });
        journal_lines::Entity::insert_many(lines).exec(txn).await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_accounts(&mut self, codes: &BTreeSet<String>) -> Result<Vec<Account>, LedgerError> {
        let models = accounts::Entity::find()
            .filter(accounts::Column::Code.is_in(codes.iter().cloned()))
            .order_by_asc(accounts::Column::Code)
            .lock_exclusive()
            .all(&self.txn)
            .await
            .map_err(|e| self.err(e))?;

        if let Some(missing) = codes
            .iter()
            .find(|code| !models.iter().any(|m| &m.code == *code))
        {
            return Err(LedgerError::invalid_account(missing, AccountIssue::NotFound));
        }
        self.locked.extend(models.iter().map(|m| m.code.clone()));
        Ok(models.into_iter().map(account_from_model).collect())
    }

    async fn lock_all_accounts(&mut self) -> Result<ChartOfAccounts, LedgerError> {
        let models = accounts::Entity::find()
            .order_by_asc(accounts::Column::Code)
            .lock_exclusive()
            .all(&self.txn)
            .await
            .map_err(|e| self.err(e))?;
        self.locked.extend(models.iter().map(|m| m.code.clone()));
        ChartOfAccounts::new(models.into_iter().map(account_from_model))
    }

    async fn find_entry(&mut self, id: JournalEntryId) -> Result<Option<JournalEntry>, LedgerError> {
        load_entry(&self.txn, id).await.map_err(|e| self.err(e))
    }

    async fn find_by_source(
        &mut self,
        reference_type: ReferenceType,
        source_id: &str,
    ) -> Result<Option<JournalEntryId>, LedgerError> {
        let found = journal_entries::Entity::find()
            .filter(
                journal_entries::Column::ReferenceType
                    .eq(db_enums::ReferenceType::from(reference_type)),
            )
            .filter(journal_entries::Column::SourceId.eq(source_id))
            .filter(journal_entries::Column::Status.is_in(EntryStatus::BALANCE_AFFECTING))
            .one(&self.txn)
            .await
            .map_err(|e| self.err(e))?;
        Ok(found.map(|m| JournalEntryId::from_uuid(m.id)))
    }

    async fn periods_overlapping(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AccountingPeriod>, LedgerError> {
        load_periods(&self.txn, Some((start, end)))
            .await
            .map_err(|e| self.err(e))
    }

    async fn list_periods(&mut self) -> Result<Vec<AccountingPeriod>, LedgerError> {
        load_periods(&self.txn, None).await.map_err(|e| self.err(e))
    }

    async fn find_period(
        &mut self,
        id: AccountingPeriodId,
    ) -> Result<Option<AccountingPeriod>, LedgerError> {
        let model = accounting_periods::Entity::find_by_id(id.into_inner())
            .one(&self.txn)
            .await
            .map_err(|e| self.err(e))?;
        Ok(model.map(period_from_model))
    }

    async fn count_drafts(&mut self, start: NaiveDate, end: NaiveDate) -> Result<usize, LedgerError> {
        count_drafts(&self.txn, start, end)
            .await
            .map_err(|e| self.err(e))
    }

    async fn balance_affecting_lines(&mut self) -> Result<Vec<JournalLine>, LedgerError> {
        let models = journal_lines::Entity::find()
            .join(JoinType::InnerJoin, journal_lines::Relation::JournalEntries.def())
            .filter(journal_entries::Column::Status.is_in(EntryStatus::BALANCE_AFFECTING))
            .order_by_asc(journal_lines::Column::JournalEntryId)
            .order_by_asc(journal_lines::Column::LineNumber)
            .all(&self.txn)
            .await
            .map_err(|e| self.err(e))?;
        Ok(models.into_iter().map(line_from_model).collect())
    }

    async fn insert_entry(&mut self, entry: &JournalEntry) -> Result<(), LedgerError> {
        let savepoint = self.txn.begin().await.map_err(|e| self.err(e))?;
        match Self::insert_rows(&savepoint, entry).await {
            Ok(()) => savepoint.commit().await.map_err(|e| self.err(e)),
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                savepoint.rollback().await.map_err(|e| self.err(e))?;
                let holder = match entry.source_key() {
                    Some((reference_type, source_id)) => {
                        self.find_by_source(reference_type, source_id).await?
                    }
                    None => None,
                };
                Err(match holder {
                    Some(existing) => LedgerError::AlreadyPosted { entry_id: existing },
                    None if entry.status.affects_balance() => {
                        LedgerError::AlreadyPosted { entry_id: entry.id }
                    }
                    None => LedgerError::DuplicateEntry(entry.id),
                })
            }
            Err(err) => Err(self.err(err)),
        }
    }

    async fn change_status(&mut self, change: &StatusChange) -> Result<(), LedgerError> {
        let mut update = journal_entries::ActiveModel {
            status: Set(change.to.into()),
            ..Default::default()
        };
        match change.to {
            Status::Posted => update.posted_at = Set(Some(change.at.into())),
            Status::Reversed => {
                update.reversed_by_entry_id = Set(change.reversed_by.map(JournalEntryId::into_inner));
            }
            _ => {}
        }

        let result = journal_entries::Entity::update_many()
            .set(update)
            .filter(journal_entries::Column::Id.eq(change.entry_id.into_inner()))
            .filter(journal_entries::Column::Status.eq(EntryStatus::from(change.from)))
            .exec(&self.txn)
            .await;
        let result = match result {
            Ok(r) => r,
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                return Err(LedgerError::AlreadyPosted {
                    entry_id: change.entry_id,
                });
            }
            Err(err) => return Err(self.err(err)),
        };

        if result.rows_affected == 1 {
            return Ok(());
        }
        let current = load_entry(&self.txn, change.entry_id)
            .await
            .map_err(|e| self.err(e))?
            .ok_or(LedgerError::EntryNotFound(change.entry_id))?;
        Err(LedgerError::InvalidTransition {
            entry_id: change.entry_id,
            from: current.status,
            action: "change status of",
        })
    }

    async fn apply_balance_delta(&mut self, code: &str, delta: Decimal) -> Result<(), LedgerError> {
        self.ensure_locked(code)?;
        let result = accounts::Entity::update_many()
            .col_expr(
                accounts::Column::Balance,
                Expr::col(accounts::Column::Balance).add(delta),
            )
            .filter(accounts::Column::Code.eq(code))
            .filter(accounts::Column::IsHeader.eq(false))
            .exec(&self.txn)
            .await
            .map_err(|e| self.err(e))?;
        if result.rows_affected != 1 {
            return Err(LedgerError::invalid_account(code, AccountIssue::Header));
        }
        Ok(())
    }

    async fn record_correction(&mut self, correction: &BalanceCorrection) -> Result<(), LedgerError> {
        self.ensure_locked(&correction.account_code)?;
        accounts::Entity::update_many()
            .col_expr(
                accounts::Column::Balance,
                Expr::value(correction.derived_balance),
            )
            .filter(accounts::Column::Code.eq(correction.account_code.as_str()))
            .exec(&self.txn)
            .await
            .map_err(|e| self.err(e))?;

        balance_corrections::Entity::insert(balance_corrections::ActiveModel {
            id: Set(correction.id.into_inner()),
            account_code: Set(correction.account_code.clone()),
            recorded_balance: Set(correction.recorded_balance),
            derived_balance: Set(correction.derived_balance),
            difference: Set(correction.difference),
            reason: Set(correction.reason.clone()),
            corrected_at: Set(correction.corrected_at.into()),
        })
        .exec(&self.txn)
        .await
        .map_err(|e| self.err(e))?;
        Ok(())
    }

    async fn save_period(&mut self, period: &AccountingPeriod) -> Result<(), LedgerError> {
        let model = accounting_periods::ActiveModel {
            id: Set(period.id.into_inner()),
            start_date: Set(period.start_date),
            end_date: Set(period.end_date),
            description: Set(period.description.clone()),
            is_closed: Set(period.is_closed),
            closing_journal_id: Set(period.closing_journal_id.map(JournalEntryId::into_inner)),
            total_revenue: Set(period.total_revenue),
            total_expense: Set(period.total_expense),
            net_income: Set(period.net_income),
            closed_at: Set(period.closed_at.map(Into::into)),
            reopened_at: Set(period.reopened_at.map(Into::into)),
            created_at: Set(period.created_at.into()),
        };
        accounting_periods::Entity::insert(model)
            .on_conflict(
                OnConflict::column(accounting_periods::Column::Id)
                    .update_columns([
                        accounting_periods::Column::Description,
                        accounting_periods::Column::IsClosed,
                        accounting_periods::Column::ClosingJournalId,
                        accounting_periods::Column::TotalRevenue,
                        accounting_periods::Column::TotalExpense,
                        accounting_periods::Column::NetIncome,
                        accounting_periods::Column::ClosedAt,
                        accounting_periods::Column::ReopenedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.txn)
            .await
            .map_err(|e| self.err(e))?;
        Ok(())
    }

    async fn commit(self) -> Result<(), LedgerError> {
        let waited_ms = self.waited_ms;
        self.txn
            .commit()
            .await
            .map_err(|e| map_db_err(e, waited_ms))?;
        debug!("ledger transaction committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_server_errors_become_storage() {
        let err = map_db_err(DbErr::Custom("boom".into()), 5000);
        assert!(matches!(err, LedgerError::Storage(ref m) if m.contains("boom")));
    }

    #[test]
    fn test_postability_key_is_stable() {
        assert_eq!(POSTABILITY_LOCK_KEY, 0x5341_4C44_4F50_4552);
    }
}
