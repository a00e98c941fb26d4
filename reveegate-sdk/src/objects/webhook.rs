//! Provider callback payloads.
//!
//! Only the fields the gateway reads are typed; everything else is kept in
//! the raw body that gets stored alongside the payment.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Midtrans HTTP notification body (also the shape of `GET /v2/{order_id}/status`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidtransNotification {
    pub order_id: String,
    #[serde(default)]
    pub transaction_id: String,
    pub transaction_status: String,
    #[serde(default)]
    pub transaction_time: Option<String>,
    #[serde(default)]
    pub settlement_time: Option<String>,
    pub status_code: String,
    pub gross_amount: String,
    #[serde(default)]
    pub signature_key: String,
    #[serde(default)]
    pub fraud_status: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
}

/// Xendit invoice/payment callback body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XenditCallback {
    /// Xendit's own id, used as the transaction id.
    pub id: String,
    /// The order id we assigned when creating the charge.
    pub external_id: String,
    pub status: String,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub paid_at: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub payment_channel: Option<String>,
}

/// Response body returned to providers.
///
/// Anything except an authentication failure is acknowledged with HTTP 200
/// so providers do not enter retry storms; `status` tells operators what happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAck {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WebhookAck {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_midtrans_settlement() {
        let json = r#"{
            "transaction_time": "2024-01-15 17:20:11",
            "transaction_status": "settlement",
            "transaction_id": "513f1f01-c9da-474c-9fc9-d5c64364b709",
            "status_message": "midtrans payment notification",
            "status_code": "200",
            "signature_key": "abc",
            "settlement_time": "2024-01-15 17:21:00",
            "payment_type": "qris",
            "order_id": "DON-abc",
            "merchant_id": "G123",
            "gross_amount": "50000.00",
            "fraud_status": "accept",
            "currency": "IDR"
        }"#;
        let n: MidtransNotification = serde_json::from_str(json).unwrap();
        assert_eq!(n.order_id, "DON-abc");
        assert_eq!(n.gross_amount, "50000.00");
        assert_eq!(n.settlement_time.as_deref(), Some("2024-01-15 17:21:00"));
        assert_eq!(n.fraud_status.as_deref(), Some("accept"));
    }

    #[test]
    fn parses_xendit_numeric_amount() {
        let json = r#"{"id":"inv-1","external_id":"DON-xyz","status":"PAID","amount":75000,"paid_at":"2024-01-15T10:30:00.000Z","payment_method":"EWALLET"}"#;
        let c: XenditCallback = serde_json::from_str(json).unwrap();
        assert_eq!(c.external_id, "DON-xyz");
        assert_eq!(c.amount, Some(Decimal::from(75_000)));
    }

    #[test]
    fn ack_omits_empty_message() {
        assert_eq!(
            serde_json::to_string(&WebhookAck::ok()).unwrap(),
            r#"{"status":"ok"}"#
        );
    }
}
