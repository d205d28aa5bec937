//! Midtrans Snap and Core API client.
//!
//! Snap creates the hosted checkout the buyer pays on; the Core API status
//! endpoint lets a buyer re-sync a transaction whose notification was lost.
//! Notifications are authenticated with
//! `SHA512(order_id + status_code + gross_amount + server_key)`.

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use tracing::{debug, instrument, warn};

use super::{GatewayError, api_error, constant_time_compare};
use crate::config::MidtransConfig;

const PROVIDER: &str = "midtrans";

/// Midtrans rejects item names longer than this.
const MAX_ITEM_NAME_CHARS: usize = 50;

/// Midtrans API client.
#[derive(Clone)]
pub struct MidtransClient {
    client: Client,
    server_key: SecretString,
    snap_url: String,
    api_url: String,
}

impl std::fmt::Debug for MidtransClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidtransClient")
            .field("server_key", &"[REDACTED]")
            .field("snap_url", &self.snap_url)
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

/// Body of `POST /snap/v1/transactions`.
#[derive(Debug, Clone, Serialize)]
pub struct SnapRequest {
    pub transaction_details: TransactionDetails,
    pub item_details: Vec<ItemDetail>,
    pub customer_details: CustomerDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callbacks: Option<SnapCallbacks>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionDetails {
    pub order_id: String,
    pub gross_amount: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemDetail {
    pub id: String,
    pub price: i64,
    pub quantity: u32,
    pub name: String,
}

impl ItemDetail {
    /// A single-quantity item; the name is cut to Midtrans' limit.
    #[must_use]
    pub fn single(id: impl Into<String>, price: i64, name: &str) -> Self {
        Self {
            id: id.into(),
            price,
            quantity: 1,
            name: name.chars().take(MAX_ITEM_NAME_CHARS).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerDetails {
    pub first_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapCallbacks {
    /// Where Snap sends the buyer after payment.
    pub finish: String,
}

/// Response of a successful Snap transaction creation.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapToken {
    pub token: String,
    pub redirect_url: String,
}

/// A transaction as reported by Midtrans, either in an HTTP notification or
/// from the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MidtransTransaction {
    pub order_id: String,
    pub status_code: String,
    pub gross_amount: String,
    #[serde(default)]
    pub signature_key: Option<String>,
    #[serde(default)]
    pub transaction_status: Option<String>,
    #[serde(default)]
    pub fraud_status: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
}

impl MidtransClient {
    /// Create a new Midtrans client.
    #[must_use]
    pub fn new(client: Client, config: &MidtransConfig) -> Self {
        Self {
            client,
            server_key: config.server_key.clone(),
            snap_url: config.snap_url.clone(),
            api_url: config.api_url.clone(),
        }
    }

    /// Create a Snap checkout.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` if the request fails, Midtrans rejects it, or
    /// the response has no token.
    #[instrument(skip(self, request), fields(order_id = %request.transaction_details.order_id))]
    pub async fn create_snap_transaction(
        &self,
        request: &SnapRequest,
    ) -> Result<SnapToken, GatewayError> {
        let response = self
            .client
            .post(format!("{}/snap/v1/transactions", self.snap_url))
            .basic_auth(self.server_key.expose_secret(), Some(""))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(request)
            .send()
            .await
            .map_err(|source| GatewayError::Http {
                provider: PROVIDER,
                source,
            })?;

        if !response.status().is_success() {
            let err = api_error(PROVIDER, response).await;
            warn!(error = %err, "Snap transaction rejected");
            return Err(err);
        }

        let token: SnapToken = response.json().await.map_err(|e| GatewayError::Decode {
            provider: PROVIDER,
            message: e.to_string(),
        })?;

        debug!("Snap transaction created");
        Ok(token)
    }

    /// Fetch the current status of a transaction.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Api` when Midtrans does not know the order.
    #[instrument(skip(self))]
    pub async fn transaction_status(
        &self,
        order_id: &str,
    ) -> Result<MidtransTransaction, GatewayError> {
        let response = self
            .client
            .get(format!("{}/v2/{order_id}/status", self.api_url))
            .basic_auth(self.server_key.expose_secret(), Some(""))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| GatewayError::Http {
                provider: PROVIDER,
                source,
            })?;

        if !response.status().is_success() {
            return Err(api_error(PROVIDER, response).await);
        }

        let body: serde_json::Value = response.json().await.map_err(|e| GatewayError::Decode {
            provider: PROVIDER,
            message: e.to_string(),
        })?;

        // Unknown orders come back as HTTP 200 with an error status_code
        if body.get("transaction_status").is_none() {
            let status = body
                .get("status_code")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(502);
            let message = body
                .get("status_message")
                .and_then(|v| v.as_str())
                .unwrap_or("transaction not found")
                .to_string();
            return Err(GatewayError::Api {
                provider: PROVIDER,
                status,
                message,
            });
        }

        serde_json::from_value(body).map_err(|e| GatewayError::Decode {
            provider: PROVIDER,
            message: e.to_string(),
        })
    }

    /// Expected `signature_key` for a notification.
    #[must_use]
    pub fn signature_for(&self, order_id: &str, status_code: &str, gross_amount: &str) -> String {
        signature_key(
            order_id,
            status_code,
            gross_amount,
            self.server_key.expose_secret(),
        )
    }

    /// Whether a notification carries a valid signature.
    #[must_use]
    pub fn verify_notification_signature(&self, notification: &MidtransTransaction) -> bool {
        let Some(received) = notification.signature_key.as_deref() else {
            return false;
        };
        let expected = self.signature_for(
            &notification.order_id,
            &notification.status_code,
            &notification.gross_amount,
        );
        constant_time_compare(&expected, &received.to_ascii_lowercase())
    }
}

/// `hex(SHA512(order_id + status_code + gross_amount + server_key))`.
#[must_use]
pub fn signature_key(order_id: &str, status_code: &str, gross_amount: &str, server_key: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> MidtransClient {
        MidtransClient::new(
            Client::new(),
            &MidtransConfig {
                server_key: SecretString::from("SB-Mid-server-TEST"),
                is_production: false,
                snap_url: "http://127.0.0.1:1".to_string(),
                api_url: "http://127.0.0.1:1".to_string(),
            },
        )
    }

    fn notification(signature: Option<String>) -> MidtransTransaction {
        MidtransTransaction {
            order_id: "UM-7-a1b2c3d4e5f6".to_string(),
            status_code: "200".to_string(),
            gross_amount: "150000.00".to_string(),
            signature_key: signature,
            transaction_status: Some("settlement".to_string()),
            fraud_status: Some("accept".to_string()),
            payment_type: Some("bank_transfer".to_string()),
            transaction_id: Some("9aed5972-5b6a-401e-894b-a32c91ed1a3a".to_string()),
            status_message: None,
        }
    }

    #[test]
    fn test_signature_key_is_sha512_hex() {
        let sig = signature_key("order", "200", "1000.00", "key");
        assert_eq!(sig.len(), 128);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(sig, signature_key("order", "200", "1000.00", "key"));
        assert_ne!(sig, signature_key("order", "201", "1000.00", "key"));
    }

    #[test]
    fn test_verify_notification_signature() {
        let client = client();
        let valid = client.signature_for("UM-7-a1b2c3d4e5f6", "200", "150000.00");

        assert!(client.verify_notification_signature(&notification(Some(valid.clone()))));
        assert!(client.verify_notification_signature(&notification(Some(valid.to_uppercase()))));
        assert!(!client.verify_notification_signature(&notification(Some("0".repeat(128)))));
        assert!(!client.verify_notification_signature(&notification(None)));

        let mut tampered = notification(Some(valid));
        tampered.gross_amount = "1000.00".to_string();
        assert!(!client.verify_notification_signature(&tampered));
    }

    #[test]
    fn test_item_name_is_truncated() {
        let item = ItemDetail::single("P-7", 150_000, &"Buku ".repeat(20));
        assert_eq!(item.name.chars().count(), MAX_ITEM_NAME_CHARS);
        assert_eq!(item.quantity, 1);
    }

    #[test]
    fn test_notification_deserializes_with_optional_fields() {
        let parsed: MidtransTransaction = serde_json::from_str(
            r#"{
                "transaction_time": "2026-10-19 10:12:40",
                "transaction_status": "expire",
                "transaction_id": "513f1f01-c9da-474c-9fc9-d5c64364b709",
                "status_message": "midtrans payment notification",
                "status_code": "407",
                "signature_key": "abc",
                "payment_type": "gopay",
                "order_id": "UM-3-000000000001",
                "merchant_id": "G123456789",
                "gross_amount": "25000.00",
                "currency": "IDR"
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.transaction_status.as_deref(), Some("expire"));
        assert_eq!(parsed.fraud_status, None);
        assert_eq!(parsed.status_code, "407");
    }

    #[test]
    fn test_debug_redacts_server_key() {
        let output = format!("{:?}", client());
        assert!(output.contains("[REDACTED]"));
        assert!(!output.contains("SB-Mid-server-TEST"));
    }
}
