//! Webhook signature verification and event parsing.
//!
//! Payloads arrive signed with a `Stripe-Signature` header of the form
//! `t=<unix ts>,v1=<hex hmac>` where the HMAC-SHA256 is computed over
//! `"{t}.{raw body}"` with the shared webhook secret. Verification is the
//! sole authenticity gate protecting order mutation, so failures must be
//! rejected outright rather than acknowledged.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::ServiceError;
use crate::payments::SENTINEL_ORDER_MARKER;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Session metadata carried on checkout-session events. `order_id` is the
/// join key back to the internal order, or the sentinel marker for
/// standalone single-product sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetadata {
    pub order_id: Option<String>,
    pub user_id: Option<String>,
}

impl SessionMetadata {
    pub fn is_sentinel(&self) -> bool {
        self.order_id.as_deref() == Some(SENTINEL_ORDER_MARKER)
    }
}

/// A verified, typed payment-provider event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    CheckoutSessionCompleted {
        session_id: String,
        payment_intent_id: Option<String>,
        metadata: SessionMetadata,
    },
    CheckoutSessionExpired {
        session_id: String,
        metadata: SessionMetadata,
    },
    PaymentIntentSucceeded {
        payment_intent_id: String,
    },
    PaymentIntentFailed {
        payment_intent_id: String,
    },
    /// Event types this service does not consume. Acknowledged, never acted
    /// on.
    Ignored {
        event_type: String,
    },
}

/// Verifies the signature header against the raw payload.
pub fn verify_signature(
    header: &str,
    payload: &[u8],
    secret: &str,
    tolerance_secs: i64,
) -> Result<(), ServiceError> {
    let mut timestamp = "";
    let mut signature = "";
    for part in header.split(',') {
        let mut kv = part.trim().splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(value)) => timestamp = value,
            (Some("v1"), Some(value)) => signature = value,
            _ => {}
        }
    }

    if timestamp.is_empty() || signature.is_empty() {
        return Err(ServiceError::InvalidSignature(
            "missing t or v1 component".to_string(),
        ));
    }

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| ServiceError::InvalidSignature("non-numeric timestamp".to_string()))?;
    let now = Utc::now().timestamp();
    if (now - ts).abs() > tolerance_secs {
        return Err(ServiceError::InvalidSignature(
            "timestamp outside tolerance".to_string(),
        ));
    }

    let expected = compute_signature(secret, timestamp, payload);
    if !constant_time_eq(&expected, signature) {
        return Err(ServiceError::InvalidSignature(
            "signature mismatch".to_string(),
        ));
    }
    Ok(())
}

/// Builds a valid signature header value for the given payload. Used by the
/// test harness and local tooling to exercise the webhook endpoint.
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let ts = timestamp.to_string();
    let mac = compute_signature(secret, &ts, payload);
    format!("t={ts},v1={mac}")
}

fn compute_signature(secret: &str, timestamp: &str, payload: &[u8]) -> String {
    // Keyed with the shared secret, so new_from_slice cannot fail on any
    // non-empty key; an empty secret is rejected at config load.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| HmacSha256::new_from_slice(b"-").unwrap());
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Parses a verified payload into a typed event.
pub fn parse_event(payload: &[u8]) -> Result<PaymentEvent, ServiceError> {
    let json: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| ServiceError::ValidationError(format!("invalid webhook json: {e}")))?;

    let event_type = json
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ServiceError::ValidationError("webhook event has no type".to_string()))?;
    let object = json
        .get("data")
        .and_then(|d| d.get("object"))
        .ok_or_else(|| ServiceError::ValidationError("webhook event has no object".to_string()))?;

    let object_id = || {
        object
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ServiceError::ValidationError("event object has no id".to_string()))
    };

    let metadata = || {
        let meta = object.get("metadata");
        SessionMetadata {
            order_id: meta
                .and_then(|m| m.get("order_id"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
            user_id: meta
                .and_then(|m| m.get("user_id"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
        }
    };

    match event_type {
        "checkout.session.completed" => Ok(PaymentEvent::CheckoutSessionCompleted {
            session_id: object_id()?,
            // May be a string id or an expanded object; only the id is kept.
            payment_intent_id: object
                .get("payment_intent")
                .and_then(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .or_else(|| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
                }),
            metadata: metadata(),
        }),
        "checkout.session.expired" => Ok(PaymentEvent::CheckoutSessionExpired {
            session_id: object_id()?,
            metadata: metadata(),
        }),
        "payment_intent.succeeded" => Ok(PaymentEvent::PaymentIntentSucceeded {
            payment_intent_id: object_id()?,
        }),
        "payment_intent.payment_failed" => Ok(PaymentEvent::PaymentIntentFailed {
            payment_intent_id: object_id()?,
        }),
        other => Ok(PaymentEvent::Ignored {
            event_type: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    const SECRET: &str = "whsec_unit_test";

    #[test]
    fn valid_signature_passes() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = signature_header(SECRET, Utc::now().timestamp(), payload);
        assert!(verify_signature(&header, payload, SECRET, 300).is_ok());
    }

    #[test]
    fn tampered_payload_fails() {
        let payload = br#"{"amount":1}"#;
        let header = signature_header(SECRET, Utc::now().timestamp(), payload);
        let result = verify_signature(&header, br#"{"amount":999}"#, SECRET, 300);
        assert_matches!(result, Err(ServiceError::InvalidSignature(_)));
    }

    #[test]
    fn wrong_secret_fails() {
        let payload = b"{}";
        let header = signature_header("other_secret", Utc::now().timestamp(), payload);
        assert_matches!(
            verify_signature(&header, payload, SECRET, 300),
            Err(ServiceError::InvalidSignature(_))
        );
    }

    #[test]
    fn stale_timestamp_fails() {
        let payload = b"{}";
        let header = signature_header(SECRET, Utc::now().timestamp() - 3600, payload);
        assert_matches!(
            verify_signature(&header, payload, SECRET, 300),
            Err(ServiceError::InvalidSignature(_))
        );
    }

    #[test]
    fn malformed_header_fails() {
        assert_matches!(
            verify_signature("v1=deadbeef", b"{}", SECRET, 300),
            Err(ServiceError::InvalidSignature(_))
        );
        assert_matches!(
            verify_signature("", b"{}", SECRET, 300),
            Err(ServiceError::InvalidSignature(_))
        );
    }

    #[test]
    fn parses_completed_session_with_metadata() {
        let payload = json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_123",
                "payment_intent": "pi_456",
                "metadata": { "order_id": "8e1c0be0-7d4e-4e6a-9be1-76f3a40c2ad6", "user_id": "u1" }
            }}
        });
        let event = parse_event(payload.to_string().as_bytes()).unwrap();
        assert_matches!(event, PaymentEvent::CheckoutSessionCompleted { session_id, payment_intent_id, metadata } => {
            assert_eq!(session_id, "cs_123");
            assert_eq!(payment_intent_id.as_deref(), Some("pi_456"));
            assert_eq!(metadata.order_id.as_deref(), Some("8e1c0be0-7d4e-4e6a-9be1-76f3a40c2ad6"));
            assert!(!metadata.is_sentinel());
        });
    }

    #[test]
    fn parses_expanded_payment_intent_object() {
        let payload = json!({
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_9",
                "payment_intent": { "id": "pi_expanded" },
                "metadata": { "order_id": SENTINEL_ORDER_MARKER }
            }}
        });
        let event = parse_event(payload.to_string().as_bytes()).unwrap();
        assert_matches!(event, PaymentEvent::CheckoutSessionCompleted { payment_intent_id, metadata, .. } => {
            assert_eq!(payment_intent_id.as_deref(), Some("pi_expanded"));
            assert!(metadata.is_sentinel());
        });
    }

    #[test]
    fn parses_intent_events() {
        let succeeded = json!({
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_1" } }
        });
        assert_eq!(
            parse_event(succeeded.to_string().as_bytes()).unwrap(),
            PaymentEvent::PaymentIntentSucceeded {
                payment_intent_id: "pi_1".into()
            }
        );

        let failed = json!({
            "type": "payment_intent.payment_failed",
            "data": { "object": { "id": "pi_2" } }
        });
        assert_eq!(
            parse_event(failed.to_string().as_bytes()).unwrap(),
            PaymentEvent::PaymentIntentFailed {
                payment_intent_id: "pi_2".into()
            }
        );
    }

    #[test]
    fn unknown_event_types_are_ignored_not_errors() {
        let payload = json!({
            "type": "invoice.created",
            "data": { "object": { "id": "in_1" } }
        });
        assert_eq!(
            parse_event(payload.to_string().as_bytes()).unwrap(),
            PaymentEvent::Ignored {
                event_type: "invoice.created".into()
            }
        );
    }

    #[test]
    fn garbage_payload_is_a_validation_error() {
        assert_matches!(
            parse_event(b"not json"),
            Err(ServiceError::ValidationError(_))
        );
    }
}
