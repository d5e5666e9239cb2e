//! REST gateway adapter
//!
//! Talks to a Stripe-compatible REST API with form-encoded requests and
//! bearer authentication. The adapter makes exactly one HTTP request per
//! port call; retries belong to the [`RetryExecutor`](crate::retry::RetryExecutor).
//!
//! # Error mapping
//!
//! Error envelopes (`{"error": {"type", "code", "decline_code", "message", "param"}}`)
//! are mapped onto [`GatewayError`]:
//! - `card_error` -> `Card`
//! - `rate_limit_error` or HTTP 429 -> `RateLimit`
//! - `api_connection_error` -> `Connection`
//! - `authentication_error` or HTTP 401 -> `Authentication`
//! - `invalid_request_error` -> `InvalidRequest`
//! - anything else -> `Api`
//!
//! Transport failures become `Connection`, or `Timeout` when reqwest gives up.
//!
//! Every object the adapter creates is tagged with `metadata[tenant_id]`;
//! list calls filter on that tag. A list longer than the page limit fails
//! with an `Api` error coded `list_truncated`.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use core_kernel::{
    AdapterHealth, ConnectedAccountId, Currency, DomainPort, GatewayCustomerId, HealthCheckResult,
    HealthCheckable, Money, PaymentIntentId, PriceId, RefundId, SubscriptionId, SubscriptionItemId,
    TenantId,
};

use crate::connected_account::{AccountLink, ConnectedAccount};
use crate::error::GatewayError;
use crate::intent::{PaymentIntent, PaymentStatus, METADATA_TENANT_ID};
use crate::ports::{
    CreateAccountRequest, CreateCustomerRequest, CreateIntentRequest, CreateRefundRequest,
    CreateSubscriptionRequest, GatewayQuery, PaymentGatewayPort,
};
use crate::refund::{Refund, RefundReason, RefundStatus};
use crate::subscription::{BillingInterval, GatewayCustomer, Subscription, SubscriptionStatus};

pub const DEFAULT_BASE_URL: &str = "https://api.stripe.com";
const PAGE_LIMIT: u32 = 100;
const MAX_PAGES: usize = 50;

/// Connection settings for the REST gateway
#[derive(Clone)]
pub struct RestGatewayConfig {
    pub base_url: String,
    pub api_key: String,
    /// Pinned API version header, if any
    pub api_version: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for RestGatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestGatewayConfig")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Default for RestGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            api_version: None,
            timeout: Duration::from_secs(30),
        }
    }
}

type Form = Vec<(String, String)>;

/// Payment gateway client over the REST API
#[derive(Debug, Clone)]
pub struct RestGatewayClient {
    http: Client,
    config: RestGatewayConfig,
}

impl RestGatewayClient {
    pub fn new(config: RestGatewayConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::connection(format!("failed to build http client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        form: Option<&Form>,
        query: &Form,
        idempotency_key: Option<&str>,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut req = self
            .http
            .request(method.clone(), url)
            .bearer_auth(&self.config.api_key)
            .query(query);
        if let Some(form) = form {
            req = req.form(form);
        }
        if let Some(key) = idempotency_key {
            req = req.header("Idempotency-Key", key);
        }
        if let Some(version) = self.config.api_version.as_deref().filter(|v| !v.is_empty()) {
            req = req.header("Stripe-Version", version);
        }

        debug!(method = %method, path, idempotency_key = idempotency_key.unwrap_or(""), "gateway request");

        let started = Instant::now();
        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout {
                    operation: path.to_string(),
                    after_ms: started.elapsed().as_millis() as u64,
                }
            } else {
                GatewayError::connection(e.to_string())
            }
        })?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| GatewayError::connection(format!("failed to read response body: {e}")))?;

        if status.is_success() {
            serde_json::from_str::<T>(&text).map_err(|e| GatewayError::Decode(e.to_string()))
        } else {
            let error = map_error(status, &text);
            warn!(method = %method, path, status = status.as_u16(), error = %error, "gateway request failed");
            Err(error)
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &Form) -> Result<T, GatewayError> {
        self.request(Method::GET, path, None, query, None).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, form: &Form, idempotency_key: Option<&str>) -> Result<T, GatewayError> {
        self.request(Method::POST, path, Some(form), &Vec::new(), idempotency_key).await
    }

    /// Follows `has_more` pagination until the list is exhausted
    async fn list_all<W>(&self, path: &str, mut query: Form, id_of: fn(&W) -> &str) -> Result<Vec<W>, GatewayError>
    where
        W: DeserializeOwned,
    {
        query.push(("limit".into(), PAGE_LIMIT.to_string()));
        drain_pages(path, MAX_PAGES, id_of, |cursor| {
            let mut page_query = query.clone();
            if let Some(last) = cursor {
                page_query.push(("starting_after".into(), last));
            }
            async move { self.get::<ListPage<W>>(path, &page_query).await }
        })
        .await
    }

    async fn customer_for(&self, tenant_id: TenantId) -> Result<Option<WireCustomer>, GatewayError> {
        let query = vec![(
            "query".to_string(),
            format!("metadata['{}']:'{}'", METADATA_TENANT_ID, tenant_id),
        )];
        let page: ListPage<WireCustomer> = self.get("/v1/customers/search", &query).await?;
        Ok(page.data.into_iter().next())
    }
}

/// Collects every page of a cursor-paginated list.
///
/// A list that still has more pages after `max_pages` is an error rather than
/// a short result, so totals computed from it are never silently low.
async fn drain_pages<W, F, Fut>(
    path: &str,
    max_pages: usize,
    id_of: fn(&W) -> &str,
    mut fetch: F,
) -> Result<Vec<W>, GatewayError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<ListPage<W>, GatewayError>>,
{
    let mut items = Vec::new();
    let mut cursor = None;
    for _ in 0..max_pages {
        let page = fetch(cursor.take()).await?;
        let next = page.data.last().map(|w| id_of(w).to_string());
        items.extend(page.data);
        match next {
            Some(last) if page.has_more => cursor = Some(last),
            _ => return Ok(items),
        }
    }
    warn!(path, pages = max_pages, items = items.len(), "gateway list exceeds the page limit");
    Err(GatewayError::Api {
        status: None,
        code: Some("list_truncated".to_string()),
        message: format!("{path} returned more than {max_pages} pages"),
    })
}

fn map_error(status: StatusCode, body: &str) -> GatewayError {
    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) else {
        return match status {
            StatusCode::TOO_MANY_REQUESTS => GatewayError::rate_limit(),
            StatusCode::UNAUTHORIZED => GatewayError::Authentication {
                message: body.to_string(),
            },
            _ => GatewayError::Api {
                status: Some(status.as_u16()),
                code: None,
                message: format!("unexpected response body: {body}"),
            },
        };
    };

    let detail = envelope.error;
    let message = detail.message.unwrap_or_else(|| detail.error_type.clone());
    match detail.error_type.as_str() {
        "card_error" => GatewayError::Card {
            code: detail.code,
            decline_code: detail.decline_code,
            message,
        },
        "rate_limit_error" => GatewayError::RateLimit { message },
        "api_connection_error" => GatewayError::Connection { message },
        "authentication_error" => GatewayError::Authentication { message },
        "invalid_request_error" if status == StatusCode::TOO_MANY_REQUESTS => GatewayError::RateLimit { message },
        "invalid_request_error" => GatewayError::InvalidRequest {
            code: detail.code,
            param: detail.param,
            message,
        },
        _ => GatewayError::Api {
            status: Some(status.as_u16()),
            code: detail.code,
            message,
        },
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, GatewayError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| GatewayError::Decode(format!("invalid timestamp {secs}")))
}

fn currency(code: &str) -> Result<Currency, GatewayError> {
    code.parse().map_err(|e| GatewayError::Decode(format!("{e}")))
}

fn tenant_tag(metadata: &HashMap<String, String>) -> Option<TenantId> {
    metadata.get(METADATA_TENANT_ID).and_then(|v| v.parse().ok())
}

fn window(query: &GatewayQuery) -> Form {
    vec![
        ("created[gte]".into(), query.created_from.timestamp().to_string()),
        ("created[lt]".into(), query.created_before.timestamp().to_string()),
    ]
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    error_type: String,
    code: Option<String>,
    decline_code: Option<String>,
    message: Option<String>,
    param: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListPage<T> {
    data: Vec<T>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct WireIntent {
    id: String,
    amount: i64,
    currency: String,
    status: String,
    client_secret: Option<String>,
    application_fee_amount: Option<i64>,
    transfer_data: Option<WireTransferData>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    last_payment_error: Option<serde_json::Value>,
    latest_charge: Option<WireChargeRef>,
    created: i64,
}

#[derive(Debug, Deserialize)]
struct WireTransferData {
    destination: String,
}

/// `latest_charge` is an id unless expanded
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireChargeRef {
    Expanded { refunded: bool },
    Id(String),
}

impl WireIntent {
    fn status(&self) -> PaymentStatus {
        match self.status.as_str() {
            "succeeded" => match &self.latest_charge {
                Some(WireChargeRef::Expanded { refunded: true }) => PaymentStatus::Refunded,
                _ => PaymentStatus::Succeeded,
            },
            "canceled" => PaymentStatus::Failed,
            "requires_payment_method" if self.last_payment_error.is_some() => PaymentStatus::Failed,
            _ => PaymentStatus::Pending,
        }
    }

    fn into_domain(self, fallback_tenant: Option<TenantId>) -> Result<PaymentIntent, GatewayError> {
        let status = self.status();
        let currency = currency(&self.currency)?;
        let tenant_id = tenant_tag(&self.metadata)
            .or(fallback_tenant)
            .ok_or_else(|| GatewayError::Decode(format!("payment intent {} has no tenant metadata", self.id)))?;
        let created_at = timestamp(self.created)?;
        Ok(PaymentIntent {
            id: PaymentIntentId::new(self.id),
            tenant_id,
            amount: Money::from_minor(self.amount, currency),
            status,
            destination: self.transfer_data.map(|t| ConnectedAccountId::new(t.destination)),
            application_fee: self.application_fee_amount.map(|fee| Money::from_minor(fee, currency)),
            metadata: self.metadata,
            client_secret: self.client_secret,
            created_at,
            updated_at: Utc::now(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireRefund {
    id: String,
    amount: i64,
    currency: String,
    status: Option<String>,
    reason: Option<String>,
    payment_intent: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    created: i64,
}

impl WireRefund {
    fn into_domain(self, fallback_tenant: Option<TenantId>) -> Result<Refund, GatewayError> {
        let status = match self.status.as_deref() {
            Some("succeeded") => RefundStatus::Succeeded,
            Some("failed") => RefundStatus::Failed,
            Some("canceled") => RefundStatus::Canceled,
            _ => RefundStatus::Pending,
        };
        let reason = match self.reason.as_deref() {
            Some("duplicate") => Some(RefundReason::Duplicate),
            Some("fraudulent") => Some(RefundReason::Fraudulent),
            Some("requested_by_customer") => Some(RefundReason::RequestedByCustomer),
            _ => None,
        };
        let tenant_id = tenant_tag(&self.metadata)
            .or(fallback_tenant)
            .ok_or_else(|| GatewayError::Decode(format!("refund {} has no tenant metadata", self.id)))?;
        let payment_intent_id = self
            .payment_intent
            .ok_or_else(|| GatewayError::Decode(format!("refund {} has no payment intent", self.id)))?;
        Ok(Refund {
            id: RefundId::new(self.id),
            payment_intent_id: PaymentIntentId::new(payment_intent_id),
            tenant_id,
            amount: Money::from_minor(self.amount, currency(&self.currency)?),
            status,
            reason,
            initiated_by: self.metadata.get("initiated_by").cloned(),
            metadata: self.metadata,
            created_at: timestamp(self.created)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireCustomer {
    id: String,
    name: Option<String>,
    email: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl From<WireCustomer> for GatewayCustomer {
    fn from(wire: WireCustomer) -> Self {
        GatewayCustomer {
            tenant_id: tenant_tag(&wire.metadata),
            id: GatewayCustomerId::new(wire.id),
            business_name: wire.name,
            email: wire.email,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireSubscription {
    id: String,
    customer: String,
    status: String,
    items: ListPage<WireSubscriptionItem>,
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
    #[serde(default)]
    cancel_at_period_end: bool,
    canceled_at: Option<i64>,
    created: i64,
    #[serde(default)]
    metadata: HashMap<String, String>,
    latest_invoice: Option<WireInvoiceRef>,
}

#[derive(Debug, Deserialize)]
struct WireSubscriptionItem {
    id: String,
    price: WirePrice,
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WirePrice {
    id: String,
    unit_amount: Option<i64>,
    currency: String,
    recurring: Option<WireRecurring>,
}

#[derive(Debug, Deserialize)]
struct WireRecurring {
    interval: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireInvoiceRef {
    Expanded { payment_intent: Option<WireInvoiceIntent> },
    Id(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireInvoiceIntent {
    Expanded { client_secret: Option<String> },
    Id(String),
}

impl WireSubscription {
    fn into_domain(self, fallback_tenant: Option<TenantId>) -> Result<Subscription, GatewayError> {
        let tenant_id = tenant_tag(&self.metadata)
            .or(fallback_tenant)
            .ok_or_else(|| GatewayError::Decode(format!("subscription {} has no tenant metadata", self.id)))?;
        let item = self
            .items
            .data
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Decode(format!("subscription {} has no items", self.id)))?;
        let status = SubscriptionStatus::parse(&self.status)
            .ok_or_else(|| GatewayError::Decode(format!("unknown subscription status {}", self.status)))?;
        let interval = match item.price.recurring.as_ref().map(|r| r.interval.as_str()) {
            Some("day") => BillingInterval::Day,
            Some("week") => BillingInterval::Week,
            Some("year") => BillingInterval::Year,
            _ => BillingInterval::Month,
        };
        let client_secret = match self.latest_invoice {
            Some(WireInvoiceRef::Expanded {
                payment_intent: Some(WireInvoiceIntent::Expanded { client_secret }),
            }) => client_secret,
            _ => None,
        };
        let created_at = timestamp(self.created)?;
        let period_start = self.current_period_start.or(item.current_period_start).unwrap_or(self.created);
        let period_end = self.current_period_end.or(item.current_period_end).unwrap_or(self.created);

        Ok(Subscription {
            id: SubscriptionId::new(self.id),
            tenant_id,
            customer_id: GatewayCustomerId::new(self.customer),
            item_id: SubscriptionItemId::new(item.id),
            plan_id: PriceId::new(item.price.id),
            status,
            unit_amount: Money::from_minor(item.price.unit_amount.unwrap_or(0), currency(&item.price.currency)?),
            interval,
            current_period_start: timestamp(period_start)?,
            current_period_end: timestamp(period_end)?,
            cancel_at_period_end: self.cancel_at_period_end,
            canceled_at: self.canceled_at.map(timestamp).transpose()?,
            client_secret,
            created_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireAccount {
    id: String,
    #[serde(default)]
    charges_enabled: bool,
    #[serde(default)]
    payouts_enabled: bool,
    #[serde(default)]
    details_submitted: bool,
    requirements: Option<WireRequirements>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    created: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WireRequirements {
    #[serde(default)]
    currently_due: Vec<String>,
}

impl From<WireAccount> for ConnectedAccount {
    fn from(wire: WireAccount) -> Self {
        ConnectedAccount {
            tenant_id: tenant_tag(&wire.metadata),
            id: ConnectedAccountId::new(wire.id),
            charges_enabled: wire.charges_enabled,
            payouts_enabled: wire.payouts_enabled,
            details_submitted: wire.details_submitted,
            requirements_due: wire.requirements.map(|r| r.currently_due).unwrap_or_default(),
            created_at: wire.created.and_then(|c| Utc.timestamp_opt(c, 0).single()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireAccountLink {
    url: String,
    expires_at: Option<i64>,
}

fn expand_charge() -> Form {
    vec![("expand[]".into(), "latest_charge".into())]
}

// ============================================================================
// Port implementation
// ============================================================================

impl DomainPort for RestGatewayClient {}

#[async_trait]
impl HealthCheckable for RestGatewayClient {
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let result = self.get::<serde_json::Value>("/v1/balance", &Vec::new()).await;
        let latency_ms = start.elapsed().as_millis() as u64;
        let (status, message) = match result {
            Ok(_) => (AdapterHealth::Healthy, None),
            Err(GatewayError::RateLimit { .. }) => (AdapterHealth::Degraded, Some("rate limited".to_string())),
            Err(e) => (AdapterHealth::Unhealthy, Some(e.to_string())),
        };
        HealthCheckResult {
            adapter_id: "rest-payment-gateway".to_string(),
            status,
            latency_ms,
            message,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl PaymentGatewayPort for RestGatewayClient {
    #[instrument(skip(self, request), fields(tenant_id = %request.tenant_id, amount = request.amount.minor_units()))]
    async fn create_payment_intent(&self, request: CreateIntentRequest) -> Result<PaymentIntent, GatewayError> {
        let mut form: Form = vec![
            ("amount".into(), request.amount.minor_units().to_string()),
            ("currency".into(), request.amount.currency().gateway_code()),
            ("automatic_payment_methods[enabled]".into(), "true".into()),
            (format!("metadata[{}]", METADATA_TENANT_ID), request.tenant_id.to_string()),
        ];
        for (key, value) in &request.metadata {
            if key != METADATA_TENANT_ID {
                form.push((format!("metadata[{key}]"), value.clone()));
            }
        }
        if let Some(destination) = &request.destination {
            form.push(("transfer_data[destination]".into(), destination.to_string()));
        }
        if let Some(fee) = &request.application_fee {
            form.push(("application_fee_amount".into(), fee.minor_units().to_string()));
        }

        let wire: WireIntent = self
            .post("/v1/payment_intents", &form, request.idempotency_key.as_deref())
            .await?;
        info!(payment_intent_id = %wire.id, "payment intent created");
        wire.into_domain(Some(request.tenant_id))
    }

    async fn retrieve_payment_intent(&self, id: &PaymentIntentId) -> Result<PaymentIntent, GatewayError> {
        let wire: WireIntent = self.get(&format!("/v1/payment_intents/{id}"), &expand_charge()).await?;
        wire.into_domain(None)
    }

    async fn confirm_payment_intent(&self, id: &PaymentIntentId) -> Result<PaymentIntent, GatewayError> {
        let wire: WireIntent = self
            .post(&format!("/v1/payment_intents/{id}/confirm"), &expand_charge(), None)
            .await?;
        wire.into_domain(None)
    }

    async fn list_payment_intents(&self, query: &GatewayQuery) -> Result<Vec<PaymentIntent>, GatewayError> {
        let mut params = window(query);
        params.push(("expand[]".into(), "data.latest_charge".into()));
        let wires = self.list_all::<WireIntent>("/v1/payment_intents", params, |w| &w.id).await?;
        wires
            .into_iter()
            .filter(|w| tenant_tag(&w.metadata) == Some(query.tenant_id))
            .map(|w| w.into_domain(Some(query.tenant_id)))
            .collect()
    }

    #[instrument(skip(self, request), fields(tenant_id = %request.tenant_id, payment_intent_id = %request.payment_intent_id))]
    async fn create_refund(&self, request: CreateRefundRequest) -> Result<Refund, GatewayError> {
        let mut form: Form = vec![
            ("payment_intent".into(), request.payment_intent_id.to_string()),
            ("reason".into(), request.reason.as_str().to_string()),
            (format!("metadata[{}]", METADATA_TENANT_ID), request.tenant_id.to_string()),
        ];
        if let Some(amount) = &request.amount {
            form.push(("amount".into(), amount.minor_units().to_string()));
        }
        for (key, value) in &request.metadata {
            if key != METADATA_TENANT_ID {
                form.push((format!("metadata[{key}]"), value.clone()));
            }
        }

        let wire: WireRefund = self
            .post("/v1/refunds", &form, request.idempotency_key.as_deref())
            .await?;
        wire.into_domain(Some(request.tenant_id))
    }

    async fn list_refunds_for_payment(&self, payment_intent_id: &PaymentIntentId) -> Result<Vec<Refund>, GatewayError> {
        let params = vec![("payment_intent".to_string(), payment_intent_id.to_string())];
        let wires = self.list_all::<WireRefund>("/v1/refunds", params, |w| &w.id).await?;
        let owner = match wires.iter().find_map(|w| tenant_tag(&w.metadata)) {
            Some(tenant) => Some(tenant),
            None if wires.is_empty() => return Ok(Vec::new()),
            None => Some(self.retrieve_payment_intent(payment_intent_id).await?.tenant_id),
        };
        wires.into_iter().map(|w| w.into_domain(owner)).collect()
    }

    async fn list_refunds(&self, query: &GatewayQuery) -> Result<Vec<Refund>, GatewayError> {
        let wires = self.list_all::<WireRefund>("/v1/refunds", window(query), |w| &w.id).await?;
        wires
            .into_iter()
            .filter(|w| tenant_tag(&w.metadata) == Some(query.tenant_id))
            .map(|w| w.into_domain(Some(query.tenant_id)))
            .collect()
    }

    async fn find_customer_by_tenant(&self, tenant_id: TenantId) -> Result<Option<GatewayCustomer>, GatewayError> {
        Ok(self.customer_for(tenant_id).await?.map(GatewayCustomer::from))
    }

    async fn create_customer(&self, request: CreateCustomerRequest) -> Result<GatewayCustomer, GatewayError> {
        let mut form: Form = vec![
            ("name".into(), request.business_name),
            (format!("metadata[{}]", METADATA_TENANT_ID), request.tenant_id.to_string()),
        ];
        if let Some(email) = request.email {
            form.push(("email".into(), email));
        }
        let wire: WireCustomer = self.post("/v1/customers", &form, None).await?;
        Ok(wire.into())
    }

    #[instrument(skip(self, request), fields(tenant_id = %request.tenant_id, price_id = %request.price_id))]
    async fn create_subscription(&self, request: CreateSubscriptionRequest) -> Result<Subscription, GatewayError> {
        let form: Form = vec![
            ("customer".into(), request.customer_id.to_string()),
            ("items[0][price]".into(), request.price_id.to_string()),
            ("payment_behavior".into(), "default_incomplete".into()),
            ("expand[]".into(), "latest_invoice.payment_intent".into()),
            (format!("metadata[{}]", METADATA_TENANT_ID), request.tenant_id.to_string()),
        ];
        let wire: WireSubscription = self
            .post("/v1/subscriptions", &form, request.idempotency_key.as_deref())
            .await?;
        wire.into_domain(Some(request.tenant_id))
    }

    async fn retrieve_subscription(&self, id: &SubscriptionId) -> Result<Subscription, GatewayError> {
        let wire: WireSubscription = self.get(&format!("/v1/subscriptions/{id}"), &Vec::new()).await?;
        wire.into_domain(None)
    }

    async fn update_subscription_price(
        &self,
        id: &SubscriptionId,
        item_id: &SubscriptionItemId,
        price_id: &PriceId,
    ) -> Result<Subscription, GatewayError> {
        let form: Form = vec![
            ("items[0][id]".into(), item_id.to_string()),
            ("items[0][price]".into(), price_id.to_string()),
            ("proration_behavior".into(), "create_prorations".into()),
        ];
        let wire: WireSubscription = self.post(&format!("/v1/subscriptions/{id}"), &form, None).await?;
        wire.into_domain(None)
    }

    async fn cancel_subscription(&self, id: &SubscriptionId, at_period_end: bool) -> Result<Subscription, GatewayError> {
        let path = format!("/v1/subscriptions/{id}");
        let wire: WireSubscription = if at_period_end {
            let form: Form = vec![("cancel_at_period_end".into(), "true".into())];
            self.post(&path, &form, None).await?
        } else {
            self.request(Method::DELETE, &path, None, &Vec::new(), None).await?
        };
        wire.into_domain(None)
    }

    async fn list_subscriptions(&self, tenant_id: TenantId) -> Result<Vec<Subscription>, GatewayError> {
        let Some(customer) = self.customer_for(tenant_id).await? else {
            return Ok(Vec::new());
        };
        let params = vec![
            ("customer".to_string(), customer.id),
            ("status".to_string(), "all".to_string()),
        ];
        let wires = self.list_all::<WireSubscription>("/v1/subscriptions", params, |w| &w.id).await?;
        wires.into_iter().map(|w| w.into_domain(Some(tenant_id))).collect()
    }

    #[instrument(skip(self, request), fields(tenant_id = %request.tenant_id))]
    async fn create_connected_account(&self, request: CreateAccountRequest) -> Result<ConnectedAccount, GatewayError> {
        let mut form: Form = vec![
            ("type".into(), "express".into()),
            ("country".into(), request.country),
            ("business_profile[name]".into(), request.business_name),
            ("capabilities[card_payments][requested]".into(), "true".into()),
            ("capabilities[transfers][requested]".into(), "true".into()),
            (format!("metadata[{}]", METADATA_TENANT_ID), request.tenant_id.to_string()),
        ];
        if let Some(email) = request.email {
            form.push(("email".into(), email));
        }
        if let Some(business_type) = request.business_type {
            form.push(("business_type".into(), business_type));
        }
        let wire: WireAccount = self.post("/v1/accounts", &form, None).await?;
        Ok(wire.into())
    }

    async fn retrieve_connected_account(&self, id: &ConnectedAccountId) -> Result<ConnectedAccount, GatewayError> {
        let wire: WireAccount = self.get(&format!("/v1/accounts/{id}"), &Vec::new()).await?;
        Ok(wire.into())
    }

    async fn create_account_link(
        &self,
        account_id: &ConnectedAccountId,
        refresh_url: &str,
        return_url: &str,
    ) -> Result<AccountLink, GatewayError> {
        let form: Form = vec![
            ("account".into(), account_id.to_string()),
            ("refresh_url".into(), refresh_url.to_string()),
            ("return_url".into(), return_url.to_string()),
            ("type".into(), "account_onboarding".into()),
        ];
        let wire: WireAccountLink = self.post("/v1/account_links", &form, None).await?;
        Ok(AccountLink {
            url: wire.url,
            expires_at: wire.expires_at.and_then(|t| Utc.timestamp_opt(t, 0).single()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(ids: &[&str], has_more: bool) -> ListPage<String> {
        ListPage {
            data: ids.iter().map(|id| id.to_string()).collect(),
            has_more,
        }
    }

    #[allow(clippy::ptr_arg)]
    fn id(w: &String) -> &str {
        w
    }

    #[tokio::test]
    async fn test_pages_are_followed_by_cursor() {
        let mut cursors = Vec::new();
        let items = drain_pages("/v1/refunds", 5, id, |cursor| {
            cursors.push(cursor.clone());
            let result = match cursor.as_deref() {
                None => page(&["re_1", "re_2"], true),
                Some("re_2") => page(&["re_3"], false),
                Some(other) => panic!("unexpected cursor {other}"),
            };
            async move { Ok(result) }
        })
        .await
        .unwrap();

        assert_eq!(items, vec!["re_1", "re_2", "re_3"]);
        assert_eq!(cursors, vec![None, Some("re_2".to_string())]);
    }

    #[tokio::test]
    async fn test_list_beyond_page_limit_is_an_error() {
        let mut fetched = 0;
        let result = drain_pages("/v1/payment_intents", 3, id, |_| {
            fetched += 1;
            let last = format!("pi_{fetched}");
            let next = page(&[last.as_str()], true);
            async move { Ok(next) }
        })
        .await;

        assert_eq!(fetched, 3);
        match result {
            Err(GatewayError::Api { code, .. }) => assert_eq!(code.as_deref(), Some("list_truncated")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_card_error_envelope() {
        let body = r#"{"error":{"type":"card_error","code":"card_declined","decline_code":"insufficient_funds","message":"Your card has insufficient funds."}}"#;
        match map_error(StatusCode::PAYMENT_REQUIRED, body) {
            GatewayError::Card { decline_code, .. } => assert_eq!(decline_code.as_deref(), Some("insufficient_funds")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rate_limit_without_envelope() {
        assert_eq!(map_error(StatusCode::TOO_MANY_REQUESTS, "slow down"), GatewayError::rate_limit());
    }

    #[test]
    fn test_server_error_maps_to_api() {
        let error = map_error(StatusCode::INTERNAL_SERVER_ERROR, "<html>");
        assert!(matches!(error, GatewayError::Api { status: Some(500), .. }));
    }

    #[test]
    fn test_intent_status_mapping() {
        let json = r#"{"id":"pi_1","amount":5000,"currency":"usd","status":"succeeded","client_secret":null,
            "application_fee_amount":175,"transfer_data":{"destination":"acct_1"},
            "metadata":{"tenant_id":"TEN-6f1c2f8e-8f4e-4b8a-9b0e-3c1d2e4f5a6b"},
            "last_payment_error":null,"latest_charge":{"refunded":true},"created":1700000000}"#;
        let wire: WireIntent = serde_json::from_str(json).unwrap();
        let intent = wire.into_domain(None).unwrap();
        assert_eq!(intent.status, PaymentStatus::Refunded);
        assert_eq!(intent.amount.minor_units(), 5000);
        assert_eq!(intent.application_fee.unwrap().minor_units(), 175);
    }

    #[test]
    fn test_failed_attempt_maps_to_failed() {
        let json = r#"{"id":"pi_2","amount":100,"currency":"eur","status":"requires_payment_method",
            "last_payment_error":{"code":"card_declined"},"latest_charge":"ch_1","created":1700000000,
            "metadata":{"tenant_id":"6f1c2f8e-8f4e-4b8a-9b0e-3c1d2e4f5a6b"}}"#;
        let wire: WireIntent = serde_json::from_str(json).unwrap();
        assert_eq!(wire.status(), PaymentStatus::Failed);
    }

    #[test]
    fn test_intent_without_tenant_is_rejected() {
        let json = r#"{"id":"pi_3","amount":100,"currency":"usd","status":"processing","created":1700000000}"#;
        let wire: WireIntent = serde_json::from_str(json).unwrap();
        assert!(matches!(wire.into_domain(None), Err(GatewayError::Decode(_))));
    }
}
