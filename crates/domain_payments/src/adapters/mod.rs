//! Adapters for the payments ports
//!
//! # Available Adapters
//!
//! - **RestGatewayClient**: `PaymentGatewayPort` over a Stripe-compatible REST API
//! - **InMemoryPaymentStore**: `PaymentStorePort` held in process memory
//! - **TracingAuditSink**: `AuditSinkPort` that writes structured log events
//! - **MockPaymentGateway** / **RecordingAuditSink**: test doubles in
//!   `ports::mock`, behind the `mock` feature
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_payments::adapters::{InMemoryPaymentStore, RestGatewayClient, RestGatewayConfig, TracingAuditSink};
//! use domain_payments::PaymentServices;
//! use std::sync::Arc;
//!
//! let gateway = RestGatewayClient::new(RestGatewayConfig {
//!     api_key: "sk_test_...".to_string(),
//!     ..Default::default()
//! })?;
//! let services = PaymentServices::new(
//!     Arc::new(gateway),
//!     Arc::new(InMemoryPaymentStore::new()),
//!     Arc::new(TracingAuditSink::new()),
//!     settings,
//! );
//! ```

pub mod audit;
pub mod memory;
pub mod rest;

pub use audit::TracingAuditSink;
pub use memory::InMemoryPaymentStore;
pub use rest::{RestGatewayClient, RestGatewayConfig};
