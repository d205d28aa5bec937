//! Xendit disbursement client.

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use unimarket_core::{DisbursementProvider, WithdrawalStatus};

use super::{
    DisbursementGateway, DisbursementReceipt, DisbursementRequest, GatewayError, api_error,
    constant_time_compare,
};
use crate::config::XenditConfig;

const PROVIDER: &str = "xendit";

/// Xendit disbursement client.
#[derive(Clone)]
pub struct XenditClient {
    client: Client,
    secret_key: SecretString,
    callback_token: SecretString,
    api_url: String,
}

impl std::fmt::Debug for XenditClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XenditClient")
            .field("secret_key", &"[REDACTED]")
            .field("callback_token", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Body of `POST /disbursements`.
#[derive(Debug, Serialize)]
struct CreateDisbursement<'a> {
    external_id: String,
    amount: i64,
    bank_code: String,
    account_holder_name: &'a str,
    account_number: &'a str,
    description: &'a str,
}

/// Disbursement as returned by Xendit, both from the create call and in
/// callbacks.
#[derive(Debug, Clone, Deserialize)]
pub struct XenditDisbursement {
    pub id: String,
    pub external_id: String,
    pub status: String,
    #[serde(default)]
    pub failure_code: Option<String>,
}

impl XenditClient {
    /// Create a new Xendit client.
    #[must_use]
    pub fn new(client: Client, config: &XenditConfig) -> Self {
        Self {
            client,
            secret_key: config.secret_key.clone(),
            callback_token: config.callback_token.clone(),
            api_url: config.api_url.clone(),
        }
    }

    /// Whether a callback's `x-callback-token` header matches ours.
    #[must_use]
    pub fn verify_callback_token(&self, token: &str) -> bool {
        !token.is_empty() && constant_time_compare(token, self.callback_token.expose_secret())
    }
}

impl DisbursementGateway for XenditClient {
    fn provider(&self) -> DisbursementProvider {
        DisbursementProvider::Xendit
    }

    #[instrument(skip(self, request), fields(reference = %request.reference, amount = %request.amount))]
    async fn disburse(
        &self,
        request: &DisbursementRequest,
    ) -> Result<DisbursementReceipt, GatewayError> {
        let reference = request.reference.to_string();
        let body = CreateDisbursement {
            external_id: reference.clone(),
            amount: request.amount.as_i64(),
            bank_code: request.account.bank_code.to_ascii_uppercase(),
            account_holder_name: &request.account.account_holder,
            account_number: &request.account.account_number,
            description: &request.remark,
        };

        let response = self
            .client
            .post(format!("{}/disbursements", self.api_url))
            .basic_auth(self.secret_key.expose_secret(), Some(""))
            .header("X-IDEMPOTENCY-KEY", reference)
            .json(&body)
            .send()
            .await
            .map_err(|source| GatewayError::Http {
                provider: PROVIDER,
                source,
            })?;

        if !response.status().is_success() {
            let err = api_error(PROVIDER, response).await;
            warn!(error = %err, "Xendit disbursement rejected");
            return Err(err);
        }

        let disbursement: XenditDisbursement =
            response.json().await.map_err(|e| GatewayError::Decode {
                provider: PROVIDER,
                message: e.to_string(),
            })?;

        let status = WithdrawalStatus::from_xendit(&disbursement.status).ok_or_else(|| {
            GatewayError::Accepted {
                provider: PROVIDER,
                provider_id: disbursement.id.clone(),
                status: disbursement.status.clone(),
            }
        })?;

        info!(provider_id = %disbursement.id, status = %disbursement.status, "Xendit disbursement created");

        Ok(DisbursementReceipt {
            provider_id: disbursement.id,
            status,
        })
    }
}
