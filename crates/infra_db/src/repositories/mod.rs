//! Repository implementations
//!
//! Repositories own the SQL and map result sets onto row types; adapters
//! translate rows into domain records.

pub mod payments;

pub use payments::PaymentRepository;
