//! Core Kernel - Foundational types for the payments engine
//!
//! This crate provides the building blocks shared by every domain crate:
//! - Money held in integer minor units, and decimal rates
//! - Strongly typed platform and gateway identifiers
//! - Calendar date ranges for analytics and reconciliation
//! - Port infrastructure for the hexagonal adapters

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod error;
pub mod ports;

pub use money::{Money, Currency, MoneyError, Rate};
pub use temporal::{DateRange, TemporalError};
pub use identifiers::{
    TenantId, BookingId, CustomerId, ReportId, AuditEventId,
    PaymentIntentId, RefundId, SubscriptionId, SubscriptionItemId, PriceId,
    GatewayCustomerId, ConnectedAccountId, EventId,
};
pub use error::PortError;
pub use ports::{AdapterHealth, DomainPort, HealthCheckResult, HealthCheckable};
