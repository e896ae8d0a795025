use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("invalid webhook signature")]
    SignatureInvalid,
    #[error("malformed webhook payload: {0}")]
    Malformed(String),
}

/// Verifies the `stripe-signature` header (`t=<ts>,v1=<hex hmac>`) against
/// the raw body. Must run before any JSON decoding of the payload.
pub fn verify_signature(
    payload: &[u8],
    signature_header: &str,
    webhook_secret: &str,
) -> Result<(), WebhookError> {
    let parts: HashMap<&str, &str> = signature_header
        .split(',')
        .filter_map(|part| {
            let mut kv = part.splitn(2, '=');
            Some((kv.next()?.trim(), kv.next()?))
        })
        .collect();

    let timestamp = parts.get("t").ok_or(WebhookError::SignatureInvalid)?;
    let signature = parts.get("v1").ok_or(WebhookError::SignatureInvalid)?;

    let body = std::str::from_utf8(payload).map_err(|_| WebhookError::SignatureInvalid)?;
    let signed_payload = format!("{timestamp}.{body}");

    let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())
        .map_err(|_| WebhookError::SignatureInvalid)?;
    mac.update(signed_payload.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    if expected.as_bytes().ct_eq(signature.as_bytes()).into() {
        Ok(())
    } else {
        Err(WebhookError::SignatureInvalid)
    }
}

/// Test helper producing a header that `verify_signature` accepts.
pub fn sign_payload(payload: &[u8], timestamp: i64, webhook_secret: &str) -> String {
    let body = std::str::from_utf8(payload).expect("utf8 payload");
    let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes()).expect("hmac key");
    mac.update(format!("{timestamp}.{body}").as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

// ============================================================================
// Event payloads
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct IntentObject {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub transfer_data: Option<TransferData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferData {
    pub destination: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferObject {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayoutObject {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub failure_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountObject {
    pub id: String,
    #[serde(default)]
    pub charges_enabled: bool,
    #[serde(default)]
    pub payouts_enabled: bool,
    #[serde(default)]
    pub requirements: AccountRequirements,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountRequirements {
    #[serde(default)]
    pub currently_due: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChargeObject {
    pub id: String,
    pub amount_refunded: i64,
    #[serde(default)]
    pub payment_intent: Option<String>,
}

/// The provider events the reconciler reacts to. Anything else parses to
/// `Ignored` and is acknowledged without effect.
#[derive(Debug, Clone)]
pub enum PspEvent {
    IntentSucceeded(IntentObject),
    IntentFailed(IntentObject),
    TransferCreated(TransferObject),
    PayoutPaid(PayoutObject),
    PayoutFailed(PayoutObject),
    AccountUpdated(AccountObject),
    ChargeRefunded(ChargeObject),
    Ignored(String),
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

/// Parses a verified raw body into `(event_id, event)`.
pub fn parse_event(payload: &[u8]) -> Result<(String, PspEvent), WebhookError> {
    let raw: RawEvent =
        serde_json::from_slice(payload).map_err(|e| WebhookError::Malformed(e.to_string()))?;

    let object = raw.data.object;
    let event = match raw.event_type.as_str() {
        "payment_intent.succeeded" => PspEvent::IntentSucceeded(decode(object)?),
        "payment_intent.payment_failed" => PspEvent::IntentFailed(decode(object)?),
        "transfer.created" => PspEvent::TransferCreated(decode(object)?),
        "payout.paid" => PspEvent::PayoutPaid(decode(object)?),
        "payout.failed" => PspEvent::PayoutFailed(decode(object)?),
        "account.updated" => PspEvent::AccountUpdated(decode(object)?),
        "charge.refunded" => PspEvent::ChargeRefunded(decode(object)?),
        other => PspEvent::Ignored(other.to_string()),
    };
    Ok((raw.id, event))
}

fn decode<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, WebhookError> {
    serde_json::from_value(value).map_err(|e| WebhookError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trip() {
        let secret = "whsec_test";
        let payload = br#"{"id":"evt_1","type":"payout.paid","data":{"object":{"id":"po_1","amount":500}}}"#;
        let header = sign_payload(payload, 1_700_000_000, secret);
        assert!(verify_signature(payload, &header, secret).is_ok());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let secret = "whsec_test";
        let header = sign_payload(b"{\"a\":1}", 1_700_000_000, secret);
        assert_eq!(
            verify_signature(b"{\"a\":2}", &header, secret),
            Err(WebhookError::SignatureInvalid)
        );
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = b"{}";
        let header = sign_payload(payload, 1, "whsec_a");
        assert_eq!(
            verify_signature(payload, &header, "whsec_b"),
            Err(WebhookError::SignatureInvalid)
        );
    }

    #[test]
    fn header_without_v1_is_rejected() {
        assert_eq!(
            verify_signature(b"{}", "t=123", "whsec"),
            Err(WebhookError::SignatureInvalid)
        );
    }

    #[test]
    fn parses_intent_succeeded() {
        let payload = serde_json::json!({
            "id": "evt_9",
            "type": "payment_intent.succeeded",
            "data": {"object": {
                "id": "pi_9",
                "amount": 4000,
                "metadata": {"ride_id": "r", "seats": "2"},
                "transfer_data": {"destination": "acct_1"}
            }}
        });
        let (id, event) = parse_event(payload.to_string().as_bytes()).unwrap();
        assert_eq!(id, "evt_9");
        match event {
            PspEvent::IntentSucceeded(intent) => {
                assert_eq!(intent.amount, 4000);
                assert_eq!(intent.metadata["seats"], "2");
                assert!(intent.transfer_data.is_some());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn unknown_events_are_ignored_not_errors() {
        let payload = serde_json::json!({
            "id": "evt_x",
            "type": "customer.created",
            "data": {"object": {}}
        });
        let (_, event) = parse_event(payload.to_string().as_bytes()).unwrap();
        assert!(matches!(event, PspEvent::Ignored(t) if t == "customer.created"));
    }

    #[test]
    fn garbage_payload_is_malformed() {
        assert!(matches!(
            parse_event(b"not json"),
            Err(WebhookError::Malformed(_))
        ));
    }
}
