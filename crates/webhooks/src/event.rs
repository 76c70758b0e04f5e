//! Webhook event model and envelope parsing.

use chrono::{DateTime, Utc};
use common::WebhookEventId;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WebhookError};

/// The minimal shape ingestion needs from a raw webhook body: the
/// provider's event id and the event type. Everything else stays opaque
/// bytes until processing.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
}

impl Envelope {
    /// Parses the envelope out of a raw body. The body is not trusted and
    /// not verified here; only the two routing fields are read.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let envelope: Envelope = serde_json::from_slice(raw)
            .map_err(|e| WebhookError::InvalidEnvelope(e.to_string()))?;
        if envelope.id.is_empty() {
            return Err(WebhookError::InvalidEnvelope(
                "empty event id".to_string(),
            ));
        }
        if envelope.event_type.is_empty() {
            return Err(WebhookError::InvalidEnvelope(
                "empty event type".to_string(),
            ));
        }
        Ok(envelope)
    }
}

/// A durably stored inbound webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: WebhookEventId,
    pub provider: String,
    /// The provider's own event id; unique per provider.
    pub provider_event_id: String,
    pub event_type: String,
    /// Raw body bytes exactly as received. Signature verification runs
    /// against these, so they are never re-serialized.
    pub payload: Vec<u8>,
    pub signature_header: String,
    pub signature_verified: bool,
    pub processed: bool,
    pub error: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl WebhookEvent {
    pub fn new(
        provider: impl Into<String>,
        envelope: &Envelope,
        payload: Vec<u8>,
        signature_header: impl Into<String>,
    ) -> Self {
        Self {
            id: WebhookEventId::new(),
            provider: provider.into(),
            provider_event_id: envelope.id.clone(),
            event_type: envelope.event_type.clone(),
            payload,
            signature_header: signature_header.into(),
            signature_verified: false,
            processed: false,
            error: None,
            received_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_parses_routing_fields_only() {
        let body = br#"{"id":"evt_123","type":"payment.succeeded","data":{"object":{"id":"pi_9"}}}"#;
        let envelope = Envelope::parse(body).unwrap();
        assert_eq!(envelope.id, "evt_123");
        assert_eq!(envelope.event_type, "payment.succeeded");
    }

    #[test]
    fn test_envelope_rejects_garbage() {
        assert!(matches!(
            Envelope::parse(b"not json"),
            Err(WebhookError::InvalidEnvelope(_))
        ));
        assert!(matches!(
            Envelope::parse(br#"{"id":"","type":"payment.succeeded"}"#),
            Err(WebhookError::InvalidEnvelope(_))
        ));
        assert!(matches!(
            Envelope::parse(br#"{"id":"evt_1"}"#),
            Err(WebhookError::InvalidEnvelope(_))
        ));
    }

    #[test]
    fn test_new_event_keeps_raw_payload() {
        let body = br#"{"id":"evt_1","type":"payment.failed"}"#.to_vec();
        let envelope = Envelope::parse(&body).unwrap();
        let event = WebhookEvent::new("stripe", &envelope, body.clone(), "t=1,v1=abc");

        assert_eq!(event.payload, body);
        assert_eq!(event.provider_event_id, "evt_1");
        assert!(!event.signature_verified);
        assert!(!event.processed);
    }
}
