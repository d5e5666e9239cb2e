//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the payments store using SQLx: connection
//! pooling, embedded migrations, repositories and the
//! [`PostgresPaymentStore`] adapter for the `PaymentStorePort`.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, DatabaseConfig, PostgresPaymentStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/payments")).await?;
//! let store = PostgresPaymentStore::new(pool);
//! ```

pub mod adapters;
pub mod error;
pub mod pool;
pub mod repositories;

pub use adapters::PostgresPaymentStore;
pub use error::DatabaseError;
pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool};
pub use repositories::PaymentRepository;
