//! Platform subscriptions
//!
//! Tenants pay for the platform through a gateway subscription attached to a
//! gateway customer tagged with the tenant id. Subscriptions are never
//! deleted: plan changes swap the price on the existing subscription item
//! and cancellation leaves the record in place.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use core_kernel::{
    GatewayCustomerId, Money, MoneyError, PriceId, SubscriptionId, SubscriptionItemId, TenantId,
};

use crate::error::{store_error, ProcessorError};
use crate::events::{emit, PaymentEvent, SubscriptionAction};
use crate::ports::{CreateCustomerRequest, CreateSubscriptionRequest, PaymentStorePortExt};
use crate::services::PaymentContext;
use crate::tenant::Tenant;

/// Subscription status as reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Incomplete,
    IncompleteExpired,
    Trialing,
    Active,
    PastDue,
    Unpaid,
    Canceled,
    Paused,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Paused => "paused",
        }
    }

    /// Parses a gateway status string
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "incomplete" => SubscriptionStatus::Incomplete,
            "incomplete_expired" => SubscriptionStatus::IncompleteExpired,
            "trialing" => SubscriptionStatus::Trialing,
            "active" => SubscriptionStatus::Active,
            "past_due" => SubscriptionStatus::PastDue,
            "unpaid" => SubscriptionStatus::Unpaid,
            "canceled" => SubscriptionStatus::Canceled,
            "paused" => SubscriptionStatus::Paused,
            _ => return None,
        })
    }

    /// No further billing can happen on this subscription
    pub fn is_ended(&self) -> bool {
        matches!(self, SubscriptionStatus::Canceled | SubscriptionStatus::IncompleteExpired)
    }

    /// Counts toward recurring revenue
    pub fn is_billing(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing | SubscriptionStatus::PastDue
        )
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing interval of a price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Day,
    Week,
    Month,
    Year,
}

impl BillingInterval {
    /// Factor converting one period's amount into a monthly amount
    pub fn monthly_factor(&self) -> Decimal {
        match self {
            BillingInterval::Day => Decimal::new(3044, 2),
            BillingInterval::Week => Decimal::new(4348, 3),
            BillingInterval::Month => Decimal::ONE,
            BillingInterval::Year => Decimal::ONE / Decimal::from(12),
        }
    }
}

/// A tenant's platform billing subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub tenant_id: TenantId,
    pub customer_id: GatewayCustomerId,
    /// Item carrying the price; plan changes replace its price in place
    pub item_id: SubscriptionItemId,
    pub plan_id: PriceId,
    pub status: SubscriptionStatus,
    pub unit_amount: Money,
    pub interval: BillingInterval,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    /// Client secret of the first invoice's payment intent
    pub client_secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Normalized monthly amount for recurring revenue figures
    pub fn monthly_amount(&self) -> Result<Money, MoneyError> {
        self.unit_amount.multiply(self.interval.monthly_factor())
    }
}

/// A gateway customer record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayCustomer {
    pub id: GatewayCustomerId,
    pub tenant_id: Option<TenantId>,
    pub business_name: Option<String>,
    pub email: Option<String>,
}

/// Customer details used when a tenant has no gateway customer yet
#[derive(Debug, Clone)]
pub struct CustomerInfo {
    pub business_name: String,
    pub email: Option<String>,
}

/// A newly created subscription with the secret needed to pay its first invoice
#[derive(Debug, Clone)]
pub struct SubscriptionCreated {
    pub subscription: Subscription,
    pub client_secret: Option<String>,
    pub customer_created: bool,
}

/// Stable across retries of one request, but distinct once the tenant's
/// previous subscription has ended
fn subscription_idempotency_key(tenant_id: TenantId, price_id: &PriceId, previous: Option<&Subscription>) -> String {
    match previous {
        Some(previous) => format!("subscription-{}-{}-after-{}", tenant_id.as_uuid(), price_id, previous.id),
        None => format!("subscription-{}-{}", tenant_id.as_uuid(), price_id),
    }
}

/// Creates and maintains platform subscriptions
pub struct SubscriptionManager {
    ctx: PaymentContext,
}

impl SubscriptionManager {
    pub fn new(ctx: PaymentContext) -> Self {
        Self { ctx }
    }

    /// Subscribes a tenant to a platform price.
    ///
    /// Refused while the tenant's previous subscription is still live; plan
    /// changes go through [`SubscriptionManager::update_platform_subscription`].
    pub async fn create_platform_subscription(
        &self,
        tenant_id: TenantId,
        price_id: PriceId,
        customer_info: CustomerInfo,
    ) -> Result<SubscriptionCreated, ProcessorError> {
        if customer_info.business_name.trim().is_empty() {
            return Err(ProcessorError::validation("Business name is required"));
        }

        let mut tenant = match self.ctx.store.find_tenant(tenant_id).await? {
            Some(tenant) => tenant,
            None => Tenant::new(tenant_id, customer_info.business_name.clone()),
        };

        let previous = match &tenant.subscription_id {
            Some(_) => Some(self.current_subscription(tenant_id).await?),
            None => None,
        };
        if let Some(live) = previous.as_ref().filter(|s| !s.status.is_ended()) {
            return Err(ProcessorError::validation(format!(
                "Tenant already has a {} subscription {}",
                live.status, live.id
            )));
        }

        let existing = self
            .ctx
            .retry
            .execute_with_retry("find_customer", || self.ctx.gateway.find_customer_by_tenant(tenant_id))
            .await
            .into_result()?;

        let (customer, customer_created) = match existing {
            Some(customer) => (customer, false),
            None => {
                let request = CreateCustomerRequest {
                    tenant_id,
                    business_name: customer_info.business_name.clone(),
                    email: customer_info.email.clone(),
                };
                let customer = self
                    .ctx
                    .retry
                    .execute_with_retry("create_customer", || self.ctx.gateway.create_customer(request.clone()))
                    .await
                    .into_result()?;
                (customer, true)
            }
        };

        let request = CreateSubscriptionRequest {
            tenant_id,
            customer_id: customer.id.clone(),
            price_id: price_id.clone(),
            idempotency_key: Some(subscription_idempotency_key(tenant_id, &price_id, previous.as_ref())),
        };
        let subscription = self
            .ctx
            .retry
            .execute_with_retry("create_subscription", || {
                self.ctx.gateway.create_subscription(request.clone())
            })
            .await
            .into_result()?;

        tenant.gateway_customer_id = Some(customer.id.clone());
        tenant.subscription_id = Some(subscription.id.clone());
        if tenant.email.is_none() {
            tenant.email = customer_info.email;
        }
        tenant.touch();
        self.ctx.store.save_tenant(&tenant).await?;
        self.ctx.store.save_subscription(&subscription).await?;

        info!(
            tenant_id = %tenant_id,
            subscription_id = %subscription.id,
            plan_id = %subscription.plan_id,
            customer_created,
            "platform subscription created"
        );
        self.audit(&subscription, SubscriptionAction::Created).await;

        Ok(SubscriptionCreated {
            client_secret: subscription.client_secret.clone(),
            subscription,
            customer_created,
        })
    }

    /// Moves the tenant's subscription to a new price
    pub async fn update_platform_subscription(
        &self,
        tenant_id: TenantId,
        new_price_id: PriceId,
    ) -> Result<Subscription, ProcessorError> {
        let current = self.current_subscription(tenant_id).await?;
        if current.status == SubscriptionStatus::Canceled {
            return Err(ProcessorError::validation(
                "Cannot change the plan of a canceled subscription",
            ));
        }
        if current.plan_id == new_price_id {
            return Ok(current);
        }

        let updated = self
            .ctx
            .retry
            .execute_with_retry("update_subscription", || {
                self.ctx
                    .gateway
                    .update_subscription_price(&current.id, &current.item_id, &new_price_id)
            })
            .await
            .into_result()?;

        self.ctx.store.save_subscription(&updated).await?;
        info!(
            tenant_id = %tenant_id,
            subscription_id = %updated.id,
            from_plan = %current.plan_id,
            to_plan = %updated.plan_id,
            "platform subscription plan changed"
        );
        self.audit(&updated, SubscriptionAction::PlanChanged).await;
        Ok(updated)
    }

    /// Cancels the tenant's subscription, now or at the end of the period
    pub async fn cancel_platform_subscription(
        &self,
        tenant_id: TenantId,
        at_period_end: bool,
    ) -> Result<Subscription, ProcessorError> {
        let current = self.current_subscription(tenant_id).await?;
        if current.status == SubscriptionStatus::Canceled {
            return Ok(current);
        }

        let canceled = self
            .ctx
            .retry
            .execute_with_retry("cancel_subscription", || {
                self.ctx.gateway.cancel_subscription(&current.id, at_period_end)
            })
            .await
            .into_result()?;

        self.ctx.store.save_subscription(&canceled).await?;
        info!(
            tenant_id = %tenant_id,
            subscription_id = %canceled.id,
            at_period_end,
            "platform subscription canceled"
        );
        self.audit(&canceled, SubscriptionAction::Canceled).await;
        Ok(canceled)
    }

    /// Current gateway view of the tenant's subscription, if any
    pub async fn get_platform_subscription(&self, tenant_id: TenantId) -> Result<Option<Subscription>, ProcessorError> {
        match self.current_subscription(tenant_id).await {
            Ok(subscription) => Ok(Some(subscription)),
            Err(ProcessorError::SubscriptionMissing { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn current_subscription(&self, tenant_id: TenantId) -> Result<Subscription, ProcessorError> {
        let tenant = self.ctx.store.get_tenant(tenant_id).await.map_err(|e| {
            if e.is_not_found() {
                ProcessorError::SubscriptionMissing { tenant_id }
            } else {
                store_error(e)
            }
        })?;
        let subscription_id = tenant
            .subscription_id
            .ok_or(ProcessorError::SubscriptionMissing { tenant_id })?;

        Ok(self
            .ctx
            .retry
            .execute_with_retry("retrieve_subscription", || {
                self.ctx.gateway.retrieve_subscription(&subscription_id)
            })
            .await
            .into_result()?)
    }

    async fn audit(&self, subscription: &Subscription, action: SubscriptionAction) {
        emit(
            self.ctx.audit.as_ref(),
            PaymentEvent::SubscriptionChanged {
                tenant_id: subscription.tenant_id,
                subscription_id: subscription.id.clone(),
                plan_id: subscription.plan_id.clone(),
                status: subscription.status,
                action,
            },
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;

    #[test]
    fn test_status_parsing() {
        assert_eq!(SubscriptionStatus::parse("past_due"), Some(SubscriptionStatus::PastDue));
        assert_eq!(SubscriptionStatus::parse("something_new"), None);
        assert!(SubscriptionStatus::Active.is_billing());
        assert!(!SubscriptionStatus::Canceled.is_billing());
        assert!(SubscriptionStatus::IncompleteExpired.is_ended());
        assert!(!SubscriptionStatus::PastDue.is_ended());
    }

    #[test]
    fn test_idempotency_key_changes_after_previous_subscription() {
        let tenant_id = TenantId::new();
        let price_id = PriceId::new("price_basic");
        let first = subscription_idempotency_key(tenant_id, &price_id, None);
        assert_eq!(first, subscription_idempotency_key(tenant_id, &price_id, None));

        let now = Utc::now();
        let previous = Subscription {
            id: SubscriptionId::new("sub_1"),
            tenant_id,
            customer_id: GatewayCustomerId::new("cus_1"),
            item_id: SubscriptionItemId::new("si_1"),
            plan_id: price_id.clone(),
            status: SubscriptionStatus::Canceled,
            unit_amount: Money::from_minor(2_900, Currency::USD),
            interval: BillingInterval::Month,
            current_period_start: now,
            current_period_end: now,
            cancel_at_period_end: false,
            canceled_at: Some(now),
            client_secret: None,
            created_at: now,
        };
        let again = subscription_idempotency_key(tenant_id, &price_id, Some(&previous));
        assert_ne!(first, again);
        assert!(again.ends_with("after-sub_1"));
    }

    #[test]
    fn test_yearly_price_normalizes_to_monthly() {
        let now = Utc::now();
        let subscription = Subscription {
            id: SubscriptionId::new("sub_1"),
            tenant_id: TenantId::new(),
            customer_id: GatewayCustomerId::new("cus_1"),
            item_id: SubscriptionItemId::new("si_1"),
            plan_id: PriceId::new("price_yearly"),
            status: SubscriptionStatus::Active,
            unit_amount: Money::from_minor(120_000, Currency::USD),
            interval: BillingInterval::Year,
            current_period_start: now,
            current_period_end: now,
            cancel_at_period_end: false,
            canceled_at: None,
            client_secret: None,
            created_at: now,
        };
        assert_eq!(subscription.monthly_amount().unwrap().minor_units(), 10_000);
    }
}
