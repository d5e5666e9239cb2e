//! Platform subscription DTOs

use serde::{Deserialize, Serialize};
use validator::Validate;

use core_kernel::PriceId;
use domain_payments::Subscription;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubscriptionRequest {
    pub price_id: PriceId,
    #[validate(length(min = 1, max = 200, message = "Business name is required"))]
    pub business_name: String,
    #[validate(email)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSubscriptionRequest {
    pub price_id: PriceId,
}

#[derive(Debug, Deserialize)]
pub struct CancelSubscriptionQuery {
    /// Cancel at the end of the current period instead of immediately
    #[serde(default = "default_at_period_end")]
    pub at_period_end: bool,
}

fn default_at_period_end() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub subscription: Subscription,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_created: Option<bool>,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(subscription: Subscription) -> Self {
        Self {
            subscription,
            client_secret: None,
            customer_created: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OptionalSubscriptionResponse {
    pub subscription: Option<Subscription>,
}
