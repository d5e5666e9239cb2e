//! Gateway webhooks
//!
//! Incoming events are verified against the signing secret before anything
//! in the payload is interpreted. Verified events are de-duplicated by event
//! id and dispatched to the handler for their type. Unknown event types are
//! acknowledged without running a handler.
//!
//! Payment intent status changes go through [`PaymentLifecycle`](crate::intent::PaymentLifecycle), so a
//! redelivered `payment_intent.succeeded` is a no-op and an out-of-order
//! event that would leave `failed` or `refunded` is rejected and audited.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, info, warn};

use core_kernel::{ConnectedAccountId, EventId, PaymentIntentId, PriceId, SubscriptionId, TenantId};

use crate::error::ProcessorError;
use crate::events::{emit, PaymentEvent, SubscriptionAction, TransitionSource};
use crate::intent::{PaymentStatus, METADATA_TENANT_ID};
use crate::services::PaymentContext;
use crate::subscription::SubscriptionStatus;

type HmacSha256 = Hmac<Sha256>;

pub const PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const PAYMENT_FAILED: &str = "payment_intent.payment_failed";
pub const CHARGE_REFUNDED: &str = "charge.refunded";
pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";
pub const ACCOUNT_UPDATED: &str = "account.updated";

/// Default allowed clock skew between the signature timestamp and now
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

/// Why a signature header was rejected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("webhook signing secret is not configured")]
    MissingSecret,

    #[error("malformed signature header: {0}")]
    Malformed(String),

    #[error("signature timestamp {timestamp} is {skew_secs}s away from now")]
    OutsideTolerance { timestamp: i64, skew_secs: u64 },

    #[error("no signature matched the payload")]
    Mismatch,
}

impl From<SignatureError> for ProcessorError {
    fn from(_: SignatureError) -> Self {
        ProcessorError::SignatureInvalid
    }
}

/// Verifies `t=<unix>,v1=<hex>` signature headers
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance: Duration,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance", &self.tolerance)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance,
        }
    }

    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), SignatureError> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    /// Verifies against an explicit current time in unix seconds
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<(), SignatureError> {
        if self.secret.is_empty() {
            return Err(SignatureError::MissingSecret);
        }

        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => {
                    timestamp = Some(
                        value
                            .parse::<i64>()
                            .map_err(|_| SignatureError::Malformed("timestamp is not an integer".into()))?,
                    );
                }
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| SignatureError::Malformed("missing timestamp".into()))?;
        if signatures.is_empty() {
            return Err(SignatureError::Malformed("missing v1 signature".into()));
        }

        // the header is unauthenticated here; a skew that overflows is never within tolerance
        let skew_secs = now.checked_sub(timestamp).map_or(u64::MAX, i64::unsigned_abs);
        if skew_secs > self.tolerance.as_secs() {
            return Err(SignatureError::OutsideTolerance { timestamp, skew_secs });
        }

        let mac = self.mac_for(payload, timestamp)?;
        let matched = signatures.iter().any(|candidate| match hex::decode(candidate) {
            Ok(bytes) => mac.clone().verify_slice(&bytes).is_ok(),
            Err(_) => false,
        });
        if !matched {
            return Err(SignatureError::Mismatch);
        }

        debug!(timestamp, skew_secs, "webhook signature verified");
        Ok(())
    }

    /// Builds a signature header for `payload` at `timestamp`
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, SignatureError> {
        let mac = self.mac_for(payload, timestamp)?;
        Ok(format!(
            "t={},v1={}",
            timestamp,
            hex::encode(mac.finalize().into_bytes())
        ))
    }

    fn mac_for(&self, payload: &[u8], timestamp: i64) -> Result<HmacSha256, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).map_err(|_| SignatureError::MissingSecret)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

/// Envelope of a gateway event
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayEvent {
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: Option<i64>,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventData {
    pub object: Value,
}

/// Result of handling one delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookOutcome {
    pub event_id: EventId,
    pub event_type: String,
    /// Internal handlers that ran, empty for duplicates and unknown types
    pub handlers_triggered: Vec<String>,
    pub duplicate: bool,
    /// Intents whose observed status was an illegal transition
    pub rejected_transitions: Vec<PaymentIntentId>,
}

#[derive(Debug, Deserialize)]
struct IntentObject {
    id: PaymentIntentId,
}

#[derive(Debug, Deserialize)]
struct ChargeObject {
    payment_intent: Option<PaymentIntentId>,
    #[serde(default)]
    refunded: bool,
}

#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    id: SubscriptionId,
    status: String,
    #[serde(default)]
    cancel_at_period_end: bool,
    canceled_at: Option<i64>,
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
    items: Option<ItemList>,
}

#[derive(Debug, Deserialize)]
struct ItemList {
    data: Vec<SubscriptionItemObject>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionItemObject {
    price: PriceObject,
}

#[derive(Debug, Deserialize)]
struct PriceObject {
    id: PriceId,
}

#[derive(Debug, Deserialize)]
struct AccountObject {
    id: ConnectedAccountId,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    charges_enabled: bool,
    #[serde(default)]
    payouts_enabled: bool,
    #[serde(default)]
    details_submitted: bool,
    requirements: Option<RequirementsObject>,
}

#[derive(Debug, Deserialize)]
struct RequirementsObject {
    #[serde(default)]
    currently_due: Vec<String>,
}

fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| Utc.timestamp_opt(s, 0).single())
}

fn object<T: serde::de::DeserializeOwned>(event: &GatewayEvent) -> Result<T, ProcessorError> {
    serde_json::from_value(event.data.object.clone()).map_err(|e| {
        ProcessorError::MalformedPayload(format!("{} object: {}", event.event_type, e))
    })
}

/// Verifies and dispatches gateway webhooks
pub struct WebhookProcessor {
    ctx: PaymentContext,
    verifier: WebhookVerifier,
}

impl WebhookProcessor {
    pub fn new(ctx: PaymentContext, verifier: WebhookVerifier) -> Self {
        Self { ctx, verifier }
    }

    pub fn verifier(&self) -> &WebhookVerifier {
        &self.verifier
    }

    /// Handles one delivery of a raw webhook body.
    ///
    /// Fails with `SignatureInvalid` before the payload is parsed when the
    /// signature does not verify.
    pub async fn handle_webhook(&self, raw_payload: &[u8], signature: &str) -> Result<WebhookOutcome, ProcessorError> {
        if let Err(error) = self.verifier.verify(raw_payload, signature) {
            warn!(error = %error, "webhook signature rejected");
            return Err(error.into());
        }

        let event: GatewayEvent = serde_json::from_slice(raw_payload)
            .map_err(|e| ProcessorError::MalformedPayload(format!("JSON parse error: {e}")))?;

        if self.ctx.store.is_webhook_event_processed(&event.id).await? {
            info!(event_id = %event.id, event_type = %event.event_type, "duplicate webhook delivery acknowledged");
            return Ok(WebhookOutcome {
                event_id: event.id,
                event_type: event.event_type,
                handlers_triggered: Vec::new(),
                duplicate: true,
                rejected_transitions: Vec::new(),
            });
        }

        let mut outcome = WebhookOutcome {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            handlers_triggered: Vec::new(),
            duplicate: false,
            rejected_transitions: Vec::new(),
        };

        match event.event_type.as_str() {
            PAYMENT_SUCCEEDED => {
                let intent: IntentObject = object(&event)?;
                self.apply(&intent.id, PaymentStatus::Succeeded, &mut outcome).await?;
                outcome.handlers_triggered.push("payment_succeeded".to_string());
            }
            PAYMENT_FAILED => {
                let intent: IntentObject = object(&event)?;
                self.apply(&intent.id, PaymentStatus::Failed, &mut outcome).await?;
                outcome.handlers_triggered.push("payment_failed".to_string());
            }
            CHARGE_REFUNDED => {
                let charge: ChargeObject = object(&event)?;
                if let (Some(payment_intent_id), true) = (charge.payment_intent, charge.refunded) {
                    self.apply(&payment_intent_id, PaymentStatus::Refunded, &mut outcome).await?;
                }
                outcome.handlers_triggered.push("charge_refunded".to_string());
            }
            SUBSCRIPTION_UPDATED => {
                self.sync_subscription(object(&event)?).await?;
                outcome.handlers_triggered.push("subscription_updated".to_string());
            }
            SUBSCRIPTION_DELETED => {
                self.sync_subscription(object(&event)?).await?;
                outcome.handlers_triggered.push("subscription_deleted".to_string());
            }
            ACCOUNT_UPDATED => {
                self.account_updated(object(&event)?).await;
                outcome.handlers_triggered.push("account_updated".to_string());
            }
            other => {
                debug!(event_id = %event.id, event_type = other, "no handler for webhook event type");
            }
        }

        self.ctx.store.record_webhook_event(&event.id, &event.event_type).await?;

        info!(
            event_id = %outcome.event_id,
            event_type = %outcome.event_type,
            handlers = ?outcome.handlers_triggered,
            rejected = outcome.rejected_transitions.len(),
            "webhook processed"
        );
        emit(
            self.ctx.audit.as_ref(),
            PaymentEvent::WebhookProcessed {
                event_id: outcome.event_id.clone(),
                webhook_type: outcome.event_type.clone(),
                handlers: outcome.handlers_triggered.clone(),
                duplicate: false,
            },
        )
        .await;

        Ok(outcome)
    }

    async fn apply(
        &self,
        id: &PaymentIntentId,
        observed: PaymentStatus,
        outcome: &mut WebhookOutcome,
    ) -> Result<(), ProcessorError> {
        match self.ctx.lifecycle.apply_status(id, observed, TransitionSource::Webhook).await {
            Ok(_) => Ok(()),
            Err(ProcessorError::InvalidStatusTransition { .. }) => {
                outcome.rejected_transitions.push(id.clone());
                Ok(())
            }
            Err(ProcessorError::NotFound { .. }) => {
                debug!(payment_intent_id = %id, "webhook for a payment intent with no local record");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn sync_subscription(&self, update: SubscriptionObject) -> Result<(), ProcessorError> {
        let Some(mut subscription) = self.ctx.store.find_subscription(&update.id).await? else {
            debug!(subscription_id = %update.id, "webhook for a subscription with no local record");
            return Ok(());
        };

        match SubscriptionStatus::parse(&update.status) {
            Some(status) => subscription.status = status,
            None => warn!(subscription_id = %update.id, status = %update.status, "unknown subscription status"),
        }
        subscription.cancel_at_period_end = update.cancel_at_period_end;
        if let Some(canceled_at) = timestamp(update.canceled_at) {
            subscription.canceled_at = Some(canceled_at);
        }
        if let Some(start) = timestamp(update.current_period_start) {
            subscription.current_period_start = start;
        }
        if let Some(end) = timestamp(update.current_period_end) {
            subscription.current_period_end = end;
        }
        if let Some(price) = update.items.and_then(|items| items.data.into_iter().next()) {
            subscription.plan_id = price.price.id;
        }

        self.ctx.store.save_subscription(&subscription).await?;
        info!(
            tenant_id = %subscription.tenant_id,
            subscription_id = %subscription.id,
            status = %subscription.status,
            "subscription synced from webhook"
        );
        emit(
            self.ctx.audit.as_ref(),
            PaymentEvent::SubscriptionChanged {
                tenant_id: subscription.tenant_id,
                subscription_id: subscription.id.clone(),
                plan_id: subscription.plan_id.clone(),
                status: subscription.status,
                action: SubscriptionAction::SyncedFromWebhook,
            },
        )
        .await;
        Ok(())
    }

    async fn account_updated(&self, account: AccountObject) {
        let Some(tenant_id) = account
            .metadata
            .get(METADATA_TENANT_ID)
            .and_then(|v| v.parse::<TenantId>().ok())
        else {
            debug!(account_id = %account.id, "account update without tenant metadata");
            return;
        };

        let due = account.requirements.map(|r| r.currently_due).unwrap_or_default();
        let is_active = account.charges_enabled && account.payouts_enabled;
        let onboarding_complete = account.details_submitted && due.is_empty();

        info!(
            tenant_id = %tenant_id,
            account_id = %account.id,
            is_active,
            onboarding_complete,
            "connected account updated"
        );
        emit(
            self.ctx.audit.as_ref(),
            PaymentEvent::ConnectedAccountChanged {
                tenant_id,
                account_id: account.id,
                is_active,
                onboarding_complete,
            },
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new("whsec_test", DEFAULT_TOLERANCE)
    }

    #[test]
    fn test_signed_payload_verifies() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = verifier().sign(payload, NOW).unwrap();
        assert!(verifier().verify_at(payload, &header, NOW + 10).is_ok());
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let header = verifier().sign(br#"{"amount":100}"#, NOW).unwrap();
        assert_eq!(
            verifier().verify_at(br#"{"amount":999}"#, &header, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let payload = b"{}";
        let header = WebhookVerifier::new("other", DEFAULT_TOLERANCE).sign(payload, NOW).unwrap();
        assert_eq!(verifier().verify_at(payload, &header, NOW), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let payload = b"{}";
        let header = verifier().sign(payload, NOW).unwrap();
        let result = verifier().verify_at(payload, &header, NOW + 301);
        assert!(matches!(result, Err(SignatureError::OutsideTolerance { .. })));
    }

    #[test]
    fn test_extreme_timestamps_are_outside_tolerance() {
        for timestamp in [i64::MIN, i64::MAX] {
            let header = format!("t={timestamp},v1=00");
            let result = verifier().verify_at(b"{}", &header, NOW);
            assert!(
                matches!(result, Err(SignatureError::OutsideTolerance { timestamp: t, .. }) if t == timestamp),
                "t={timestamp}: {result:?}"
            );
        }
    }

    #[test]
    fn test_any_matching_v1_is_accepted() {
        let payload = b"{}";
        let good = verifier().sign(payload, NOW).unwrap();
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v1=deadbeef,v1={good_sig}");
        assert!(verifier().verify_at(payload, &header, NOW).is_ok());
    }

    #[test]
    fn test_malformed_headers() {
        assert!(matches!(verifier().verify_at(b"{}", "garbage", NOW), Err(SignatureError::Malformed(_))));
        assert!(matches!(
            verifier().verify_at(b"{}", &format!("t={NOW}"), NOW),
            Err(SignatureError::Malformed(_))
        ));
    }

    #[test]
    fn test_empty_secret_never_verifies() {
        let empty = WebhookVerifier::new("", DEFAULT_TOLERANCE);
        assert_eq!(empty.verify_at(b"{}", "t=1,v1=00", 1), Err(SignatureError::MissingSecret));
    }

    #[test]
    fn test_signature_errors_map_to_invalid_signature() {
        let error: ProcessorError = SignatureError::Mismatch.into();
        assert_eq!(error.to_string(), "Invalid signature");
    }
}
