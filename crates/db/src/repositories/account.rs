//! Chart of accounts maintenance.
//!
//! Postings never go through this repository; it only creates accounts and
//! toggles their active flag. Balances are owned by the ledger store.

use chrono::Utc;
use rust_decimal::Decimal;
use saldo_core::ledger::{Account, ChartOfAccounts, LedgerError};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use tracing::info;

use super::ledger_store::account_from_model as to_account;
use crate::entities::accounts;

/// Error types for account operations.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    /// The resulting chart would be structurally invalid.
    #[error(transparent)]
    InvalidChart(#[from] LedgerError),

    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// Repository for the `accounts` table.
#[derive(Debug, Clone)]
pub struct AccountRepository {
    db: DatabaseConnection,
}

impl AccountRepository {
    /// Creates a new account repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Lists every account ordered by code.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list(&self) -> Result<Vec<Account>, AccountError> {
        let models = accounts::Entity::find()
            .order_by_asc(accounts::Column::Code)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(to_account).collect())
    }

    /// Finds one account by code.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn find(&self, code: &str) -> Result<Option<Account>, AccountError> {
        Ok(accounts::Entity::find_by_id(code.to_string())
            .one(&self.db)
            .await?
            .map(to_account))
    }

    /// Inserts the accounts that do not exist yet and returns how many were
    /// created. Existing codes are left untouched, so seeding is repeatable.
    ///
    /// New accounts always start with a zero balance.
    ///
    /// # Errors
    ///
    /// `InvalidChart` if the merged chart breaks a hierarchy rule.
    pub async fn create_missing(&self, new_accounts: Vec<Account>) -> Result<usize, AccountError> {
        let txn = self.db.begin().await?;

        let existing: Vec<Account> = accounts::Entity::find()
            .all(&txn)
            .await?
            .into_iter()
            .map(to_account)
            .collect();
        let missing: Vec<Account> = new_accounts
            .into_iter()
            .filter(|a| !existing.iter().any(|e| e.code == a.code))
            .map(|a| Account {
                balance: Decimal::ZERO,
                ..a
            })
            .collect();
        if missing.is_empty() {
            return Ok(0);
        }
        ChartOfAccounts::new(existing.iter().cloned().chain(missing.iter().cloned()))?;

        let now = Utc::now().into();
        let rows = missing.iter().map(|a| accounts::ActiveModel {
            code: Set(a.code.clone()),
            name: Set(a.name.clone()),
            account_type: Set(a.account_type.into()),
            parent_code: Set(a.parent_code.clone()),
            is_header: Set(a.is_header),
            is_active: Set(a.is_active),
            balance: Set(Decimal::ZERO),
            created_at: Set(now),
            updated_at: Set(now),
        });
        accounts::Entity::insert_many(rows)
            .on_conflict(
                OnConflict::column(accounts::Column::Code)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;
        txn.commit().await?;

        info!(created = missing.len(), "accounts created");
        Ok(missing.len())
    }

    /// Activates or deactivates a leaf account. Deactivated accounts reject
    /// new postings but keep their history and balance.
    ///
    /// # Errors
    ///
    /// `AccountNotFound` if no account has this code.
    pub async fn set_active(&self, code: &str, active: bool) -> Result<(), AccountError> {
        let result = accounts::Entity::update_many()
            .set(accounts::ActiveModel {
                is_active: Set(active),
                ..Default::default()
            })
            .filter(accounts::Column::Code.eq(code))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(AccountError::AccountNotFound(code.to_string()));
        }
        info!(code, active, "account active flag changed");
        Ok(())
    }
}
