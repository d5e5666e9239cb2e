//! Tests for kernel error types

use chrono::NaiveDate;
use core_kernel::{Currency, DateRange, Money, MoneyError, PortError, TemporalError};

// ============================================================================
// Port Errors
// ============================================================================

mod port_error_tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(PortError::unavailable("connection refused").is_retryable());
        assert!(!PortError::conflict("duplicate refund idempotency key").is_retryable());
        assert!(!PortError::decode("unknown payment status 'settled'").is_retryable());
        assert!(!PortError::internal("disk full").is_retryable());
        assert!(!PortError::not_found("PaymentIntent", "pi_1").is_retryable());
    }

    #[test]
    fn test_not_found_keeps_entity_and_id() {
        match PortError::not_found("Tenant", "TEN-42") {
            PortError::NotFound { entity_type, id } => {
                assert_eq!(entity_type, "Tenant");
                assert_eq!(id, "TEN-42");
            }
            other => panic!("Expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_conflict_message() {
        let error = PortError::conflict("remaining balance already succeeded");
        assert_eq!(error.to_string(), "Conflicting write: remaining balance already succeeded");
        assert!(!error.is_not_found());
    }
}

// ============================================================================
// Money and Temporal Errors
// ============================================================================

mod value_error_tests {
    use super::*;

    #[test]
    fn test_mixed_currency_subtraction_names_both() {
        let usd = Money::from_minor(100, Currency::USD);
        let eur = Money::from_minor(100, Currency::EUR);
        let error = usd.checked_sub(&eur).unwrap_err();
        assert!(matches!(error, MoneyError::CurrencyMismatch(_, _)));
        assert!(error.to_string().contains("USD"));
        assert!(error.to_string().contains("EUR"));
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let error = DateRange::new(start, end).unwrap_err();
        assert!(matches!(error, TemporalError::InvalidPeriod { .. }));
        assert!(error.to_string().contains("2024-03-02"));
    }
}
