//! Payment provider capability trait and its in-memory double.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, RefundId};
use domain::Transaction;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tokio::sync::RwLock;

type HmacSha256 = Hmac<Sha256>;

/// Provider-side failure, classified for the retry policy.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Worth retrying: network trouble, rate limits, 5xx responses.
    #[error("transient provider error: {0}")]
    Transient(String),
    /// Retrying cannot help: declined card, invalid request, voided
    /// intent. The caller settles the affected row instead.
    #[error("permanent provider error: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// A successfully registered payment intent.
#[derive(Debug, Clone)]
pub struct IntentCreated {
    pub reference: String,
    pub client_secret: String,
}

/// Everything the system asks of the external payment provider.
///
/// Implementations make no local state changes; webhooks are the source
/// of truth for settlement.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Registers a payment intent for the transaction.
    async fn create_intent(&self, tx: &Transaction)
        -> Result<IntentCreated, ProviderError>;

    /// Captures a previously authorized deferred intent.
    async fn capture_intent(&self, reference: &str) -> Result<(), ProviderError>;

    /// Voids an intent before settlement.
    async fn cancel_intent(&self, reference: &str) -> Result<(), ProviderError>;

    /// Submits a refund against a captured intent. Returns the provider's
    /// refund reference.
    async fn create_refund(
        &self,
        intent_reference: &str,
        refund_id: RefundId,
        amount: Money,
    ) -> Result<String, ProviderError>;

    /// Verifies a webhook body against its signature header.
    fn verify_signature(&self, payload: &[u8], signature_header: &str) -> bool;
}

#[derive(Default)]
struct FakeState {
    create_intent_calls: u32,
    capture_calls: u32,
    cancel_calls: u32,
    refund_calls: u32,
    /// Number of upcoming create_intent calls that fail transiently.
    transient_failures: u32,
    /// If set, create_intent fails permanently with this message.
    permanent_failure: Option<String>,
    intents: HashMap<String, String>,
}

/// In-memory provider double with fault injection.
///
/// Signatures are real HMAC-SHA256 over the payload with the configured
/// secret, formatted as `v1=<hex>`, so the verification path is exercised
/// end to end in tests.
#[derive(Clone)]
pub struct InMemoryPaymentProvider {
    secret: Vec<u8>,
    state: Arc<RwLock<FakeState>>,
}

impl InMemoryPaymentProvider {
    pub fn new(webhook_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: webhook_secret.into(),
            state: Arc::new(RwLock::new(FakeState::default())),
        }
    }

    /// The next `count` create_intent calls fail transiently.
    pub async fn fail_transiently(&self, count: u32) {
        self.state.write().await.transient_failures = count;
    }

    /// All further create_intent calls fail permanently.
    pub async fn fail_permanently(&self, message: impl Into<String>) {
        self.state.write().await.permanent_failure = Some(message.into());
    }

    pub async fn create_intent_calls(&self) -> u32 {
        self.state.read().await.create_intent_calls
    }

    pub async fn capture_calls(&self) -> u32 {
        self.state.read().await.capture_calls
    }

    pub async fn cancel_calls(&self) -> u32 {
        self.state.read().await.cancel_calls
    }

    pub async fn refund_calls(&self) -> u32 {
        self.state.read().await.refund_calls
    }

    /// Signs a payload the way the fake provider's webhooks would.
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key length");
        mac.update(payload);
        format!("v1={}", hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl PaymentProvider for InMemoryPaymentProvider {
    async fn create_intent(
        &self,
        tx: &Transaction,
    ) -> Result<IntentCreated, ProviderError> {
        let mut state = self.state.write().await;
        state.create_intent_calls += 1;

        if let Some(message) = &state.permanent_failure {
            return Err(ProviderError::Permanent(message.clone()));
        }
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(ProviderError::Transient(
                "simulated provider outage".to_string(),
            ));
        }

        let reference = format!("pi_{}", tx.id.as_uuid().simple());
        let client_secret = format!("{reference}_secret");
        state.intents.insert(reference.clone(), client_secret.clone());
        Ok(IntentCreated {
            reference,
            client_secret,
        })
    }

    async fn capture_intent(&self, reference: &str) -> Result<(), ProviderError> {
        let mut state = self.state.write().await;
        state.capture_calls += 1;
        if !state.intents.contains_key(reference) {
            return Err(ProviderError::Permanent(format!(
                "no such intent: {reference}"
            )));
        }
        Ok(())
    }

    async fn cancel_intent(&self, reference: &str) -> Result<(), ProviderError> {
        let mut state = self.state.write().await;
        state.cancel_calls += 1;
        if !state.intents.contains_key(reference) {
            return Err(ProviderError::Permanent(format!(
                "no such intent: {reference}"
            )));
        }
        Ok(())
    }

    async fn create_refund(
        &self,
        intent_reference: &str,
        refund_id: RefundId,
        _amount: Money,
    ) -> Result<String, ProviderError> {
        let mut state = self.state.write().await;
        state.refund_calls += 1;
        if !state.intents.contains_key(intent_reference) {
            return Err(ProviderError::Permanent(format!(
                "no such intent: {intent_reference}"
            )));
        }
        Ok(format!("re_{}", refund_id.as_uuid().simple()))
    }

    fn verify_signature(&self, payload: &[u8], signature_header: &str) -> bool {
        let Some(hex_digest) = signature_header.strip_prefix("v1=") else {
            return false;
        };
        let Ok(expected) = hex::decode(hex_digest) else {
            return false;
        };
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key length");
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use common::{TransactionId, UserId};
    use domain::{CaptureMode, TargetRef};
    use uuid::Uuid;

    use super::*;

    fn tx() -> Transaction {
        Transaction::new(
            UserId::new(),
            TargetRef::new("invoice", Uuid::new_v4()),
            Money::from_cents(5000),
            "usd",
            CaptureMode::Immediate,
            None,
        )
    }

    #[tokio::test]
    async fn test_create_intent_returns_reference_and_secret() {
        let provider = InMemoryPaymentProvider::new("whsec_test");
        let intent = provider.create_intent(&tx()).await.unwrap();
        assert!(intent.reference.starts_with("pi_"));
        assert!(intent.client_secret.ends_with("_secret"));
        assert_eq!(provider.create_intent_calls().await, 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_consumed_in_order() {
        let provider = InMemoryPaymentProvider::new("whsec_test");
        provider.fail_transiently(2).await;

        for _ in 0..2 {
            let err = provider.create_intent(&tx()).await.unwrap_err();
            assert!(err.is_transient());
        }
        assert!(provider.create_intent(&tx()).await.is_ok());
        assert_eq!(provider.create_intent_calls().await, 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_sticks() {
        let provider = InMemoryPaymentProvider::new("whsec_test");
        provider.fail_permanently("card declined").await;

        let err = provider.create_intent(&tx()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Permanent(_)));
    }

    #[tokio::test]
    async fn test_operations_on_unknown_intent_are_permanent_errors() {
        let provider = InMemoryPaymentProvider::new("whsec_test");
        let err = provider.capture_intent("pi_missing").await.unwrap_err();
        assert!(matches!(err, ProviderError::Permanent(_)));
        let err = provider.cancel_intent("pi_missing").await.unwrap_err();
        assert!(matches!(err, ProviderError::Permanent(_)));
    }

    #[test]
    fn test_signature_round_trip() {
        let provider = InMemoryPaymentProvider::new("whsec_test");
        let payload = br#"{"id":"evt_1","type":"payment.succeeded"}"#;
        let header = provider.sign(payload);

        assert!(provider.verify_signature(payload, &header));
        assert!(!provider.verify_signature(b"tampered", &header));
        assert!(!provider.verify_signature(payload, "v1=deadbeef"));
        assert!(!provider.verify_signature(payload, "garbage"));

        let other = InMemoryPaymentProvider::new("whsec_other");
        assert!(!other.verify_signature(payload, &header));
    }
}
