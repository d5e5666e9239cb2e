//! Tenant records as seen by the payments domain

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{ConnectedAccountId, GatewayCustomerId, SubscriptionId, TenantId};

/// A business on the platform that takes payments and pays for a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub business_name: String,
    pub email: Option<String>,
    /// Sub-merchant account receiving booking payments
    pub connected_account_id: Option<ConnectedAccountId>,
    /// Customer record used for the tenant's own platform billing
    pub gateway_customer_id: Option<GatewayCustomerId>,
    pub subscription_id: Option<SubscriptionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(id: TenantId, business_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            business_name: business_name.into(),
            email: None,
            connected_account_id: None,
            gateway_customer_id: None,
            subscription_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_connected_account(mut self, account_id: ConnectedAccountId) -> Self {
        self.connected_account_id = Some(account_id);
        self
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
