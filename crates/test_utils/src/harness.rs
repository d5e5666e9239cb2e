//! Service Test Harness
//!
//! Wires the payment components to the mock gateway, the in-memory store
//! and a recording audit sink, and keeps handles on all three so tests can
//! script the gateway and inspect what was stored and audited.

use std::sync::Arc;

use core_kernel::{Currency, TenantId};
use domain_payments::adapters::InMemoryPaymentStore;
use domain_payments::ports::mock::{MockPaymentGateway, RecordingAuditSink};
use domain_payments::{
    BillingInterval, PaymentServices, PaymentSettings, PaymentStorePort, RetryOptions, Tenant,
};
use domain_reconciliation::adapters::InMemoryArtifactStore;
use domain_reconciliation::{ReconciliationEngine, ReportGenerator};

use crate::fixtures::{IdFixtures, MoneyFixtures, StringFixtures};

/// Base URL the harness' artifact store hands out
pub const ARTIFACT_BASE_URL: &str = "http://reports.test";

/// Payment services over in-memory adapters
pub struct TestHarness {
    pub services: PaymentServices,
    pub gateway: Arc<MockPaymentGateway>,
    pub store: Arc<InMemoryPaymentStore>,
    pub audit: Arc<RecordingAuditSink>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Harness with immediate retries (three attempts) and the shared webhook secret
    pub fn new() -> Self {
        Self::with_retry(RetryOptions::immediate(3))
    }

    pub fn with_retry(retry: RetryOptions) -> Self {
        let settings = PaymentSettings {
            retry,
            webhook_secret: StringFixtures::webhook_secret().to_string(),
            ..PaymentSettings::default()
        };
        Self::with_settings(settings)
    }

    pub fn with_settings(settings: PaymentSettings) -> Self {
        let gateway = Arc::new(MockPaymentGateway::new());
        let store = Arc::new(InMemoryPaymentStore::new());
        let audit = Arc::new(RecordingAuditSink::new());
        let services = PaymentServices::new(gateway.clone(), store.clone(), audit.clone(), settings);
        Self {
            services,
            gateway,
            store,
            audit,
        }
    }

    /// Stores the fixture tenant with a connected account so it can take payments
    pub async fn onboarded_tenant(&self) -> TenantId {
        let tenant_id = IdFixtures::tenant_id();
        let tenant = Tenant::new(tenant_id, StringFixtures::business_name())
            .with_email(StringFixtures::email())
            .with_connected_account(IdFixtures::connected_account_id());
        self.store
            .save_tenant(&tenant)
            .await
            .expect("in-memory store accepts tenants");
        tenant_id
    }

    /// Registers the basic and pro plan prices at the mock gateway
    pub async fn with_plans(&self) {
        self.gateway
            .add_price(IdFixtures::basic_price_id(), MoneyFixtures::plan_price(), BillingInterval::Month)
            .await;
        self.gateway
            .add_price(IdFixtures::pro_price_id(), MoneyFixtures::pro_plan_price(), BillingInterval::Month)
            .await;
    }

    /// Reconciliation engine over the same context, reporting in USD
    pub fn reconciliation(&self) -> ReconciliationEngine {
        ReconciliationEngine::new(self.services.context.clone(), Currency::USD)
    }

    /// Report generator with an in-memory artifact store
    pub fn reports(&self) -> (ReportGenerator, Arc<InMemoryArtifactStore>) {
        let artifacts = Arc::new(InMemoryArtifactStore::new(ARTIFACT_BASE_URL));
        let generator = ReportGenerator::new(self.reconciliation().analytics().clone(), artifacts.clone());
        (generator, artifacts)
    }
}
