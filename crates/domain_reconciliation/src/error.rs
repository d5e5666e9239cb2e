//! Reconciliation domain errors

use thiserror::Error;

use core_kernel::{MoneyError, PortError, TemporalError};
use domain_payments::{PaymentError, ProcessorError};

/// Errors that can occur while computing analytics, reports or reconciliations
#[derive(Debug, Error)]
pub enum ReconciliationError {
    /// Reading gateway records failed; analytics reads are not retried
    #[error("Gateway error: {0}")]
    Gateway(#[from] PaymentError),

    #[error("Store error: {0}")]
    Store(#[from] PortError),

    #[error("Invalid period: {0}")]
    Period(#[from] TemporalError),

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error("Unsupported report format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to render report: {0}")]
    Render(String),

    #[error("Repair failed: {0}")]
    Repair(#[from] ProcessorError),
}

impl ReconciliationError {
    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            ReconciliationError::Gateway(e) => e.error_type.as_str(),
            ReconciliationError::Store(_) => "store_error",
            ReconciliationError::Period(_) => "invalid_period",
            ReconciliationError::Money(_) => "money_error",
            ReconciliationError::UnsupportedFormat(_) => "unsupported_format",
            ReconciliationError::Render(_) => "render_error",
            ReconciliationError::Repair(e) => e.code(),
        }
    }
}
