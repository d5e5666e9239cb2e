//! Custom Test Assertions
//!
//! Provides specialized assertion helpers for domain types that give
//! more meaningful error messages than standard assertions.

use core_kernel::Money;
use domain_payments::{PaymentIntent, PaymentStatus, ProcessorError};

/// Asserts two Money values are identical, printing both in display form
pub fn assert_money_eq(actual: &Money, expected: &Money) {
    assert_eq!(
        actual.currency(),
        expected.currency(),
        "Currency mismatch: actual={}, expected={}",
        actual.currency(),
        expected.currency()
    );
    assert_eq!(
        actual.minor_units(),
        expected.minor_units(),
        "Money mismatch: actual={}, expected={}",
        actual,
        expected
    );
}

/// Asserts that a Money value is zero
pub fn assert_money_zero(money: &Money) {
    assert!(money.is_zero(), "Expected zero money, got {}", money);
}

/// Asserts that money values sum to a total
///
/// # Panics
///
/// Panics if the currencies differ or the sum doesn't equal the total
pub fn assert_money_sum_equals(parts: &[Money], total: &Money) {
    let sum = Money::sum(parts.iter(), total.currency())
        .unwrap_or_else(|e| panic!("Parts cannot be summed in {}: {}", total.currency(), e));
    assert_eq!(
        sum.minor_units(),
        total.minor_units(),
        "Sum of parts {} does not equal total {}",
        sum,
        total
    );
}

/// Asserts a payment intent is in `expected` status
pub fn assert_status(intent: &PaymentIntent, expected: PaymentStatus) {
    assert_eq!(
        intent.status, expected,
        "Payment {} is {}, expected {}",
        intent.id, intent.status, expected
    );
}

/// Asserts a validation failure carrying `message` and returns every message
pub fn assert_validation_error(error: &ProcessorError, message: &str) -> Vec<String> {
    let errors = error.validation_errors();
    assert!(
        !errors.is_empty(),
        "Expected a validation failure, got {:?}",
        error
    );
    assert!(
        errors.iter().any(|e| e == message),
        "Validation errors {:?} do not contain {:?}",
        errors,
        message
    );
    errors.to_vec()
}

/// Asserts that a Result is Ok and returns the value
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $msg, e),
        }
    };
}

/// Asserts that a Result is Err and returns the error
#[macro_export]
macro_rules! assert_err {
    ($result:expr) => {
        match $result {
            Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
            Err(e) => e,
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(value) => panic!("{}: got Ok({:?})", $msg, value),
            Err(e) => e,
        }
    };
}

/// Asserts that an error matches a specific variant
#[macro_export]
macro_rules! assert_err_variant {
    ($result:expr, $pattern:pat) => {
        match $result {
            Ok(value) => panic!("Expected Err matching {}, got Ok({:?})", stringify!($pattern), value),
            Err(ref e) => {
                assert!(
                    matches!(e, $pattern),
                    "Error {:?} does not match pattern {}",
                    e,
                    stringify!($pattern)
                );
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;

    #[test]
    fn test_assert_money_eq_passes() {
        let m = Money::from_minor(3000, Currency::USD);
        assert_money_eq(&m, &Money::from_minor(3000, Currency::USD));
    }

    #[test]
    #[should_panic(expected = "Currency mismatch")]
    fn test_assert_money_eq_currency_mismatch() {
        let m1 = Money::from_minor(100, Currency::USD);
        let m2 = Money::from_minor(100, Currency::EUR);
        assert_money_eq(&m1, &m2);
    }

    #[test]
    fn test_assert_money_sum_equals() {
        let parts = vec![
            Money::from_minor(3000, Currency::USD),
            Money::from_minor(7000, Currency::USD),
        ];
        assert_money_sum_equals(&parts, &Money::from_minor(10_000, Currency::USD));
    }

    #[test]
    #[should_panic(expected = "do not contain")]
    fn test_assert_validation_error_checks_message() {
        let error = ProcessorError::validation("Refund amount must be greater than 0");
        assert_validation_error(&error, "Payment must be succeeded to process refund");
    }

    #[test]
    fn test_assert_ok_macro() {
        let value: Result<u32, String> = Ok(7);
        assert_eq!(assert_ok!(value), 7);
    }
}
