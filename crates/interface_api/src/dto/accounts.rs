//! Connected account DTOs

use serde::{Deserialize, Serialize};
use validator::Validate;

use domain_payments::{AccountLink, ConnectedAccountStatus};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAccountRequest {
    #[validate(length(min = 1, max = 200))]
    pub business_name: String,
    #[validate(email)]
    pub email: Option<String>,
    /// ISO 3166-1 alpha-2 country code
    #[validate(length(equal = 2))]
    pub country: String,
    pub business_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccountCreatedResponse {
    pub account: ConnectedAccountStatus,
    pub onboarding_url: String,
    pub reused: bool,
}

#[derive(Debug, Serialize)]
pub struct AccountStatusResponse {
    pub account: Option<ConnectedAccountStatus>,
}

#[derive(Debug, Serialize)]
pub struct OnboardingLinkResponse {
    pub link: AccountLink,
}
