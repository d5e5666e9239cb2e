//! Connected accounts
//!
//! A tenant is onboarded as a sub-merchant so booking payments can be
//! transferred to it. Whether the account is usable is always derived from
//! the gateway's current flags and never cached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use core_kernel::{ConnectedAccountId, TenantId};

use crate::error::{store_error, ProcessorError};
use crate::events::{emit, PaymentEvent};
use crate::ports::{CreateAccountRequest, PaymentStorePortExt};
use crate::services::PaymentContext;
use crate::tenant::Tenant;

/// A tenant's sub-merchant account at the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedAccount {
    pub id: ConnectedAccountId,
    pub tenant_id: Option<TenantId>,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
    /// Requirements the gateway still needs from the tenant
    #[serde(default)]
    pub requirements_due: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl ConnectedAccount {
    /// Can take charges and receive payouts
    pub fn is_active(&self) -> bool {
        self.charges_enabled && self.payouts_enabled
    }

    /// All details submitted and nothing outstanding
    pub fn onboarding_complete(&self) -> bool {
        self.details_submitted && self.requirements_due.is_empty()
    }

    pub fn status(&self) -> ConnectedAccountStatus {
        ConnectedAccountStatus {
            account_id: self.id.clone(),
            charges_enabled: self.charges_enabled,
            payouts_enabled: self.payouts_enabled,
            details_submitted: self.details_submitted,
            requirements_due: self.requirements_due.clone(),
            is_active: self.is_active(),
            onboarding_complete: self.onboarding_complete(),
        }
    }
}

/// Snapshot of a connected account with its derived flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedAccountStatus {
    pub account_id: ConnectedAccountId,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
    pub requirements_due: Vec<String>,
    pub is_active: bool,
    pub onboarding_complete: bool,
}

/// A hosted onboarding link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLink {
    pub url: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Business details for a new connected account
#[derive(Debug, Clone)]
pub struct BusinessInfo {
    pub business_name: String,
    pub email: Option<String>,
    /// ISO 3166-1 alpha-2 country code
    pub country: String,
    pub business_type: Option<String>,
}

/// Where the hosted onboarding flow sends the tenant back to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingUrls {
    pub refresh_url: String,
    pub return_url: String,
}

impl Default for OnboardingUrls {
    fn default() -> Self {
        Self {
            refresh_url: "http://localhost:3000/onboarding/refresh".to_string(),
            return_url: "http://localhost:3000/onboarding/complete".to_string(),
        }
    }
}

/// Result of onboarding a tenant
#[derive(Debug, Clone)]
pub struct ConnectedAccountCreated {
    pub account: ConnectedAccount,
    pub onboarding_url: String,
    /// The tenant already had an account; only a new link was issued
    pub reused: bool,
}

/// Onboards tenants as sub-merchants
pub struct ConnectedAccountManager {
    ctx: PaymentContext,
    urls: OnboardingUrls,
}

impl ConnectedAccountManager {
    pub fn new(ctx: PaymentContext, urls: OnboardingUrls) -> Self {
        Self { ctx, urls }
    }

    /// Creates a connected account and onboarding link for a tenant.
    ///
    /// A tenant that already has an account keeps it and gets a fresh link.
    pub async fn create_connected_account(
        &self,
        tenant_id: TenantId,
        business_info: BusinessInfo,
    ) -> Result<ConnectedAccountCreated, ProcessorError> {
        let mut errors = Vec::new();
        if business_info.business_name.trim().is_empty() {
            errors.push("Business name is required".to_string());
        }
        if business_info.country.len() != 2 || !business_info.country.chars().all(|c| c.is_ascii_alphabetic()) {
            errors.push("Country must be a two-letter ISO code".to_string());
        }
        if !errors.is_empty() {
            return Err(ProcessorError::ValidationFailed(errors));
        }

        let mut tenant = match self.ctx.store.find_tenant(tenant_id).await? {
            Some(tenant) => tenant,
            None => Tenant::new(tenant_id, business_info.business_name.clone()),
        };

        let (account, reused) = match tenant.connected_account_id.clone() {
            Some(account_id) => (self.retrieve(&account_id).await?, true),
            None => {
                let request = CreateAccountRequest {
                    tenant_id,
                    business_name: business_info.business_name.clone(),
                    email: business_info.email.clone(),
                    country: business_info.country.to_ascii_uppercase(),
                    business_type: business_info.business_type.clone(),
                };
                let account = self
                    .ctx
                    .retry
                    .execute_with_retry("create_connected_account", || {
                        self.ctx.gateway.create_connected_account(request.clone())
                    })
                    .await
                    .into_result()?;

                tenant.connected_account_id = Some(account.id.clone());
                if tenant.email.is_none() {
                    tenant.email = business_info.email.clone();
                }
                tenant.touch();
                self.ctx.store.save_tenant(&tenant).await?;
                (account, false)
            }
        };

        let link = self.link_for(&account.id).await?;

        info!(
            tenant_id = %tenant_id,
            account_id = %account.id,
            reused,
            "connected account onboarding link issued"
        );
        emit(
            self.ctx.audit.as_ref(),
            PaymentEvent::ConnectedAccountChanged {
                tenant_id,
                account_id: account.id.clone(),
                is_active: account.is_active(),
                onboarding_complete: account.onboarding_complete(),
            },
        )
        .await;

        Ok(ConnectedAccountCreated {
            account,
            onboarding_url: link.url,
            reused,
        })
    }

    /// Current status of the tenant's account, or `None` without one
    pub async fn get_connected_account_status(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<ConnectedAccountStatus>, ProcessorError> {
        let Some(tenant) = self.ctx.store.find_tenant(tenant_id).await? else {
            return Ok(None);
        };
        let Some(account_id) = tenant.connected_account_id else {
            return Ok(None);
        };
        let account = self.retrieve(&account_id).await?;
        Ok(Some(account.status()))
    }

    /// Issues a new onboarding link for an existing account
    pub async fn refresh_onboarding_link(&self, tenant_id: TenantId) -> Result<AccountLink, ProcessorError> {
        let tenant = self.ctx.store.get_tenant(tenant_id).await.map_err(store_error)?;
        let account_id = tenant
            .connected_account_id
            .ok_or(ProcessorError::ConnectedAccountMissing { tenant_id })?;
        self.link_for(&account_id).await
    }

    async fn retrieve(&self, account_id: &ConnectedAccountId) -> Result<ConnectedAccount, ProcessorError> {
        Ok(self
            .ctx
            .retry
            .execute_with_retry("retrieve_connected_account", || {
                self.ctx.gateway.retrieve_connected_account(account_id)
            })
            .await
            .into_result()?)
    }

    async fn link_for(&self, account_id: &ConnectedAccountId) -> Result<AccountLink, ProcessorError> {
        Ok(self
            .ctx
            .retry
            .execute_with_retry("create_account_link", || {
                self.ctx
                    .gateway
                    .create_account_link(account_id, &self.urls.refresh_url, &self.urls.return_url)
            })
            .await
            .into_result()?)
    }
}
