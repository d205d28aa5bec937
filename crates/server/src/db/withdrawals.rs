//! Withdrawal repository.

use sqlx::PgPool;
use uuid::Uuid;

use unimarket_core::{DisbursementProvider, UserId, WithdrawalId, WithdrawalStatus};

use super::RepositoryError;
use super::notifications::insert_with;
use crate::models::{NewNotification, NewWithdrawal, Notification, Withdrawal};

const WITHDRAWAL_COLUMNS: &str = "id, reference, user_id, amount, provider, bank_code, \
                                  account_number, account_holder, status, provider_id, \
                                  failure_reason, processed_by, source_transaction_id, \
                                  created_at, updated_at";

/// Repository for seller withdrawals.
pub struct WithdrawalRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> WithdrawalRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// The user's withdrawals, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>, RepositoryError> {
        let withdrawals = sqlx::query_as::<_, Withdrawal>(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals
             WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(withdrawals)
    }

    /// All withdrawals, optionally filtered by status, oldest first so the
    /// review queue is worked in order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        status: Option<WithdrawalStatus>,
    ) -> Result<Vec<Withdrawal>, RepositoryError> {
        let withdrawals = sqlx::query_as::<_, Withdrawal>(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals
             WHERE ($1::withdrawal_status IS NULL OR status = $1)
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(status)
        .fetch_all(self.pool)
        .await?;

        Ok(withdrawals)
    }

    /// A withdrawal by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: WithdrawalId) -> Result<Option<Withdrawal>, RepositoryError> {
        let withdrawal = sqlx::query_as::<_, Withdrawal>(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(withdrawal)
    }

    /// A withdrawal by the disbursement id the provider assigned.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_provider_id(
        &self,
        provider: DisbursementProvider,
        provider_id: &str,
    ) -> Result<Option<Withdrawal>, RepositoryError> {
        let withdrawal = sqlx::query_as::<_, Withdrawal>(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals
             WHERE provider = $1 AND provider_id = $2"
        ))
        .bind(provider)
        .bind(provider_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(withdrawal)
    }

    /// A withdrawal by its reference (idempotency key / external id).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_reference(&self, reference: Uuid) -> Result<Option<Withdrawal>, RepositoryError> {
        let withdrawal = sqlx::query_as::<_, Withdrawal>(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE reference = $1"
        ))
        .bind(reference)
        .fetch_optional(self.pool)
        .await?;

        Ok(withdrawal)
    }

    /// Debit the user's balance and record the withdrawal.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the balance does not cover the
    /// amount; nothing is written in that case.
    pub async fn create(
        &self,
        new: &NewWithdrawal,
        notifications: &[NewNotification],
    ) -> Result<(Withdrawal, Vec<Notification>), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let debited = sqlx::query(
            "UPDATE users SET balance = balance - $2, updated_at = now()
             WHERE id = $1 AND balance >= $2",
        )
        .bind(new.user_id)
        .bind(new.amount)
        .execute(&mut *tx)
        .await?;

        if debited.rows_affected() == 0 {
            return Err(RepositoryError::Conflict("insufficient balance".to_owned()));
        }

        let withdrawal = sqlx::query_as::<_, Withdrawal>(&format!(
            "INSERT INTO withdrawals
                 (reference, user_id, amount, provider, bank_code, account_number,
                  account_holder, status, source_transaction_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {WITHDRAWAL_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.amount)
        .bind(new.provider)
        .bind(&new.account.bank_code)
        .bind(&new.account.account_number)
        .bind(&new.account.account_holder)
        .bind(new.status)
        .bind(new.source_transaction_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut written = Vec::with_capacity(notifications.len());
        for notification in notifications {
            written.push(insert_with(&mut *tx, notification).await?);
        }

        tx.commit().await?;

        Ok((withdrawal, written))
    }

    /// Claim a pending withdrawal for disbursement.
    ///
    /// Returns `None` if the withdrawal is not pending.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn start_processing(
        &self,
        id: WithdrawalId,
        admin_id: UserId,
    ) -> Result<Option<Withdrawal>, RepositoryError> {
        let withdrawal = sqlx::query_as::<_, Withdrawal>(&format!(
            "UPDATE withdrawals
             SET status = 'processing', processed_by = $2, updated_at = now()
             WHERE id = $1 AND status = 'pending'
             RETURNING {WITHDRAWAL_COLUMNS}"
        ))
        .bind(id)
        .bind(admin_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(withdrawal)
    }

    /// Store the provider's disbursement id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the withdrawal does not exist.
    pub async fn record_provider_id(
        &self,
        id: WithdrawalId,
        provider_id: &str,
    ) -> Result<Withdrawal, RepositoryError> {
        sqlx::query_as::<_, Withdrawal>(&format!(
            "UPDATE withdrawals SET provider_id = $2, updated_at = now()
             WHERE id = $1
             RETURNING {WITHDRAWAL_COLUMNS}"
        ))
        .bind(id)
        .bind(provider_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Move a withdrawal from `from` to `to`.
    ///
    /// When `to` ends the withdrawal without paying out, the amount goes back
    /// to the user's balance in the same database transaction. Returns `None`
    /// if the withdrawal was no longer in `from`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    pub async fn transition(
        &self,
        id: WithdrawalId,
        from: WithdrawalStatus,
        to: WithdrawalStatus,
        failure_reason: Option<&str>,
        notifications: &[NewNotification],
    ) -> Result<Option<(Withdrawal, Vec<Notification>)>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let Some(withdrawal) = sqlx::query_as::<_, Withdrawal>(&format!(
            "UPDATE withdrawals
             SET status = $3, failure_reason = COALESCE($4, failure_reason), updated_at = now()
             WHERE id = $1 AND status = $2
             RETURNING {WITHDRAWAL_COLUMNS}"
        ))
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(failure_reason)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        if to.refunds_balance() {
            sqlx::query("UPDATE users SET balance = balance + $2, updated_at = now() WHERE id = $1")
                .bind(withdrawal.user_id)
                .bind(withdrawal.amount)
                .execute(&mut *tx)
                .await?;
        }

        let mut written = Vec::with_capacity(notifications.len());
        for notification in notifications {
            written.push(insert_with(&mut *tx, notification).await?);
        }

        tx.commit().await?;

        Ok(Some((withdrawal, written)))
    }
}
