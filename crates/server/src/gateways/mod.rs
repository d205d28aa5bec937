//! Payment gateway clients.
//!
//! - [`MidtransClient`] - Snap checkout, transaction status, notification signatures
//! - [`FlipClient`] / [`XenditClient`] - Seller disbursements
//!
//! Both disbursement clients implement [`DisbursementGateway`]; [`Disburser`]
//! picks one at runtime from the provider recorded on a withdrawal.

pub mod flip;
pub mod midtrans;
pub mod xendit;

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use uuid::Uuid;

use unimarket_core::{DisbursementProvider, Rupiah, WithdrawalStatus};

use crate::models::PayoutAccount;

pub use flip::FlipClient;
pub use midtrans::MidtransClient;
pub use xendit::XenditClient;

/// Timeout for every outbound gateway call.
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors returned by gateway clients.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request could not be sent or the connection failed.
    #[error("{provider} request failed: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The gateway answered with an error status.
    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    /// The gateway answered with a body we could not understand.
    #[error("{provider} response could not be decoded: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },

    /// The gateway took the disbursement but reported a status we do not map.
    #[error("{provider} accepted disbursement {provider_id} with unknown status {status}")]
    Accepted {
        provider: &'static str,
        provider_id: String,
        status: String,
    },
}

impl GatewayError {
    /// Whether the gateway answered that it did not take the request.
    ///
    /// Only an error status is a refusal. A transport failure or an
    /// unreadable success may hide a disbursement the provider is already
    /// paying out.
    #[must_use]
    pub const fn is_refusal(&self) -> bool {
        matches!(self, Self::Api { .. })
    }

    /// Disbursement id assigned by the provider, when it is known.
    #[must_use]
    pub fn provider_id(&self) -> Option<&str> {
        match self {
            Self::Accepted { provider_id, .. } => Some(provider_id),
            _ => None,
        }
    }
}

/// A payout to send to a seller's bank account.
#[derive(Debug, Clone)]
pub struct DisbursementRequest {
    /// Withdrawal reference, sent as the idempotency key.
    pub reference: Uuid,
    pub amount: Rupiah,
    pub account: PayoutAccount,
    /// Short note shown on the recipient's statement.
    pub remark: String,
}

/// The provider's acknowledgement of a disbursement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisbursementReceipt {
    /// Disbursement id assigned by the provider.
    pub provider_id: String,
    /// Provider status mapped to ours (usually `Processing`).
    pub status: WithdrawalStatus,
}

/// A service that can pay out to a bank account.
pub trait DisbursementGateway {
    /// Which provider this is.
    fn provider(&self) -> DisbursementProvider;

    /// Submit a disbursement.
    fn disburse(
        &self,
        request: &DisbursementRequest,
    ) -> impl Future<Output = Result<DisbursementReceipt, GatewayError>> + Send;
}

/// Runtime choice between the configured disbursement clients.
#[derive(Debug, Clone, Copy)]
pub enum Disburser<'a> {
    Flip(&'a FlipClient),
    Xendit(&'a XenditClient),
}

impl DisbursementGateway for Disburser<'_> {
    fn provider(&self) -> DisbursementProvider {
        match self {
            Self::Flip(client) => client.provider(),
            Self::Xendit(client) => client.provider(),
        }
    }

    async fn disburse(
        &self,
        request: &DisbursementRequest,
    ) -> Result<DisbursementReceipt, GatewayError> {
        match self {
            Self::Flip(client) => client.disburse(request).await,
            Self::Xendit(client) => client.disburse(request).await,
        }
    }
}

/// Build the HTTP client shared by all gateway clients.
///
/// # Errors
///
/// Returns `reqwest::Error` if the TLS backend cannot be initialized.
pub fn http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(GATEWAY_TIMEOUT)
        .user_agent(concat!("unimarket/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Turn a non-success response into `GatewayError::Api`, pulling a readable
/// message out of the common error body shapes.
async fn api_error(provider: &'static str, response: reqwest::Response) -> GatewayError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    GatewayError::Api {
        provider,
        status,
        message: error_message(&body),
    }
}

/// Extract an error message from a gateway error body.
///
/// Understands Midtrans (`error_messages`), Xendit (`message`) and Flip
/// (`errors[].message`) shapes; falls back to the raw body.
fn error_message(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return truncate(body.trim(), 200);
    };

    if let Some(messages) = json.get("error_messages").and_then(|v| v.as_array()) {
        let joined: Vec<&str> = messages.iter().filter_map(|m| m.as_str()).collect();
        if !joined.is_empty() {
            return joined.join("; ");
        }
    }
    if let Some(errors) = json.get("errors").and_then(|v| v.as_array()) {
        let joined: Vec<&str> = errors
            .iter()
            .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
            .collect();
        if !joined.is_empty() {
            return joined.join("; ");
        }
    }
    for key in ["message", "status_message", "error_code", "code"] {
        if let Some(message) = json.get(key).and_then(|v| v.as_str()) {
            return message.to_string();
        }
    }
    truncate(body.trim(), 200)
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Constant-time string comparison to prevent timing attacks.
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

/// Accept an id sent either as a JSON number or a string.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Num(n) => n.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("token", "token"));
        assert!(constant_time_compare("", ""));
        assert!(!constant_time_compare("token", "tokem"));
        assert!(!constant_time_compare("token", "token2"));
    }

    #[test]
    fn test_only_api_errors_are_refusals() {
        let refused = GatewayError::Api {
            provider: "flip",
            status: 422,
            message: "bank code is not valid".to_string(),
        };
        assert!(refused.is_refusal());
        assert_eq!(refused.provider_id(), None);

        let accepted = GatewayError::Accepted {
            provider: "flip",
            provider_id: "9911".to_string(),
            status: "QUEUED".to_string(),
        };
        assert!(!accepted.is_refusal());
        assert_eq!(accepted.provider_id(), Some("9911"));

        let unreadable = GatewayError::Decode {
            provider: "xendit",
            message: "expected value at line 1 column 1".to_string(),
        };
        assert!(!unreadable.is_refusal());
        assert_eq!(unreadable.provider_id(), None);
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(
            error_message(r#"{"error_messages":["transaction_details.gross_amount is required"]}"#),
            "transaction_details.gross_amount is required"
        );
        assert_eq!(
            error_message(
                r#"{"code":"VALIDATION_ERROR","errors":[{"attribute":"bank_code","code":1021,"message":"bank code is not valid"}]}"#
            ),
            "bank code is not valid"
        );
        assert_eq!(
            error_message(r#"{"error_code":"INVALID_API_KEY","message":"API key is not authorized"}"#),
            "API key is not authorized"
        );
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_string_or_number() {
        #[derive(Deserialize)]
        struct Wrapper {
            #[serde(deserialize_with = "string_or_number")]
            id: String,
        }

        let numeric: Wrapper = serde_json::from_str(r#"{"id": 12345}"#).unwrap();
        assert_eq!(numeric.id, "12345");
        let text: Wrapper = serde_json::from_str(r#"{"id": "disb-1"}"#).unwrap();
        assert_eq!(text.id, "disb-1");
    }
}
