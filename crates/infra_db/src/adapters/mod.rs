//! Domain Adapters
//!
//! Port implementations backed by PostgreSQL.
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresPaymentStore;
//! use domain_payments::PaymentStorePort;
//!
//! let store = PostgresPaymentStore::new(pool);
//! let tenant = store.get_tenant(tenant_id).await?;
//! ```

pub mod payments;

pub use payments::PostgresPaymentStore;
