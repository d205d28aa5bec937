//! Account settings.

use axum::{Json, extract::State};
use tracing::instrument;

use crate::db::UserRepository;
use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::{PayoutAccount, User};
use crate::state::AppState;

/// Set the bank account that receives payouts.
///
/// Withdrawals snapshot the account when requested, so changing it does not
/// affect withdrawals already in flight.
#[instrument(skip(state, user, account), fields(user_id = %user.id))]
pub async fn update_payout(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(account): Json<PayoutAccount>,
) -> Result<Json<User>, AppError> {
    let account = account.validate()?;
    let updated = UserRepository::new(state.pool())
        .update_payout_account(user.id, &account)
        .await?;
    tracing::info!(bank_code = %account.bank_code, "Payout account updated");
    Ok(Json(updated))
}
