//! Flip for Business disbursement client (API v3).

use chrono::Utc;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use unimarket_core::{DisbursementProvider, WithdrawalStatus};

use super::{
    DisbursementGateway, DisbursementReceipt, DisbursementRequest, GatewayError, api_error,
    constant_time_compare, string_or_number,
};
use crate::config::FlipConfig;

const PROVIDER: &str = "flip";

/// Flip rejects remarks longer than this.
const MAX_REMARK_CHARS: usize = 18;

/// Flip disbursement client.
#[derive(Clone)]
pub struct FlipClient {
    client: Client,
    secret_key: SecretString,
    validation_token: SecretString,
    api_url: String,
}

impl std::fmt::Debug for FlipClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlipClient")
            .field("secret_key", &"[REDACTED]")
            .field("validation_token", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Disbursement as returned by `POST /v3/disbursement` and carried in the
/// `data` field of callbacks.
#[derive(Debug, Clone, Deserialize)]
pub struct FlipDisbursement {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Form body of a disbursement callback: `data=<json>&token=<validation token>`.
#[derive(Debug, Deserialize)]
pub struct FlipCallbackForm {
    pub data: String,
    #[serde(default)]
    pub token: String,
}

impl FlipCallbackForm {
    /// Decode the JSON carried in `data`.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Decode` if `data` is not a disbursement object.
    pub fn disbursement(&self) -> Result<FlipDisbursement, GatewayError> {
        serde_json::from_str(&self.data).map_err(|e| GatewayError::Decode {
            provider: PROVIDER,
            message: e.to_string(),
        })
    }
}

impl FlipClient {
    /// Create a new Flip client.
    #[must_use]
    pub fn new(client: Client, config: &FlipConfig) -> Self {
        Self {
            client,
            secret_key: config.secret_key.clone(),
            validation_token: config.validation_token.clone(),
            api_url: config.api_url.clone(),
        }
    }

    /// Whether a callback carries our validation token.
    #[must_use]
    pub fn verify_callback_token(&self, token: &str) -> bool {
        !token.is_empty() && constant_time_compare(token, self.validation_token.expose_secret())
    }
}

impl DisbursementGateway for FlipClient {
    fn provider(&self) -> DisbursementProvider {
        DisbursementProvider::Flip
    }

    #[instrument(skip(self, request), fields(reference = %request.reference, amount = %request.amount))]
    async fn disburse(
        &self,
        request: &DisbursementRequest,
    ) -> Result<DisbursementReceipt, GatewayError> {
        let amount = request.amount.as_i64().to_string();
        let remark: String = request.remark.chars().take(MAX_REMARK_CHARS).collect();
        let form = [
            ("account_number", request.account.account_number.as_str()),
            ("bank_code", request.account.bank_code.as_str()),
            ("amount", amount.as_str()),
            ("remark", remark.as_str()),
        ];

        let response = self
            .client
            .post(format!("{}/v3/disbursement", self.api_url))
            .basic_auth(self.secret_key.expose_secret(), Some(""))
            .header("idempotency-key", request.reference.to_string())
            .header("X-TIMESTAMP", Utc::now().format("%Y-%m-%dT%H:%M:%S%z").to_string())
            .form(&form)
            .send()
            .await
            .map_err(|source| GatewayError::Http {
                provider: PROVIDER,
                source,
            })?;

        if !response.status().is_success() {
            let err = api_error(PROVIDER, response).await;
            warn!(error = %err, "Flip disbursement rejected");
            return Err(err);
        }

        let disbursement: FlipDisbursement =
            response.json().await.map_err(|e| GatewayError::Decode {
                provider: PROVIDER,
                message: e.to_string(),
            })?;

        let status = WithdrawalStatus::from_flip(&disbursement.status).ok_or_else(|| {
            GatewayError::Accepted {
                provider: PROVIDER,
                provider_id: disbursement.id.clone(),
                status: disbursement.status.clone(),
            }
        })?;

        info!(provider_id = %disbursement.id, status = %disbursement.status, "Flip disbursement created");

        Ok(DisbursementReceipt {
            provider_id: disbursement.id,
            status,
        })
    }
}
