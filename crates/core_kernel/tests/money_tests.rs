//! Integration tests for money, rates, identifiers and date ranges

use chrono::NaiveDate;
use core_kernel::{BookingId, Currency, DateRange, Money, MoneyError, PaymentIntentId, Rate};
use rust_decimal_macros::dec;

mod money {
    use super::*;

    #[test]
    fn test_sum_of_amounts() {
        let amounts = vec![
            Money::from_minor(3000, Currency::USD),
            Money::from_minor(7000, Currency::USD),
        ];
        let total = Money::sum(&amounts, Currency::USD).unwrap();
        assert_eq!(total.minor_units(), 10000);
    }

    #[test]
    fn test_sum_of_empty_is_zero() {
        let total = Money::sum(Vec::<Money>::new().iter(), Currency::EUR).unwrap();
        assert!(total.is_zero());
        assert_eq!(total.currency(), Currency::EUR);
    }

    #[test]
    fn test_sum_rejects_mixed_currencies() {
        let amounts = vec![
            Money::from_minor(100, Currency::USD),
            Money::from_minor(100, Currency::GBP),
        ];
        assert!(matches!(
            Money::sum(&amounts, Currency::USD),
            Err(MoneyError::CurrencyMismatch(_, _))
        ));
    }

    #[test]
    fn test_overflow_is_reported() {
        let big = Money::from_minor(i64::MAX, Currency::USD);
        let one = Money::from_minor(1, Currency::USD);
        assert_eq!(big.checked_add(&one), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_jpy_has_no_minor_digits() {
        let yen = Money::from_minor(1500, Currency::JPY);
        assert_eq!(yen.to_decimal(), dec!(1500));
    }

    #[test]
    fn test_serialization_keeps_minor_units() {
        let m = Money::from_minor(10050, Currency::USD);
        let json = serde_json::to_value(m).unwrap();
        assert_eq!(json["minor_units"], 10050);
        assert_eq!(json["currency"], "USD");
    }
}

mod rates {
    use super::*;

    #[test]
    fn test_thirty_percent_deposit() {
        let total = Money::from_minor(10000, Currency::USD);
        let deposit = Rate::new(dec!(0.3)).apply(&total).unwrap();
        assert_eq!(deposit.minor_units(), 3000);
        assert_eq!(total.checked_sub(&deposit).unwrap().minor_units(), 7000);
    }

    #[test]
    fn test_partial_share_bounds() {
        assert!(Rate::new(dec!(0.3)).is_partial_share());
        assert!(Rate::new(dec!(1)).is_partial_share());
        assert!(!Rate::new(dec!(0)).is_partial_share());
        assert!(!Rate::new(dec!(1.5)).is_partial_share());
        assert!(!Rate::new(dec!(-0.1)).is_partial_share());
    }

    #[test]
    fn test_percentage_round_trip() {
        let rate = Rate::from_percentage(dec!(2.9));
        assert_eq!(rate.as_decimal(), dec!(0.029));
        assert_eq!(rate.as_percentage(), dec!(2.9));
    }
}

mod identifiers {
    use super::*;

    #[test]
    fn test_booking_ids_are_unique() {
        assert_ne!(BookingId::new(), BookingId::new());
    }

    #[test]
    fn test_gateway_ids_compare_by_value() {
        assert_eq!(PaymentIntentId::from("pi_1"), PaymentIntentId::new("pi_1".to_string()));
        assert_eq!(PaymentIntentId::from("pi_1").as_str(), "pi_1");
    }
}

mod date_ranges {
    use super::*;

    #[test]
    fn test_month_range_covers_all_days() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
        )
        .unwrap();
        assert_eq!(range.days(), 29);
    }

    #[test]
    fn test_range_serializes_as_dates() {
        let range = DateRange::single_day(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let json = serde_json::to_value(range).unwrap();
        assert_eq!(json["start"], "2024-03-01");
        assert_eq!(json["end"], "2024-03-01");
    }
}
