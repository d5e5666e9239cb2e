//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data for common entities across the payments core.
//! These fixtures are designed to be consistent and predictable for unit tests.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use core_kernel::{
    BookingId, ConnectedAccountId, Currency, CustomerId, DateRange, Money, PriceId, Rate, TenantId,
};
use rust_decimal_macros::dec;
use uuid::Uuid;

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// Standard booking total: 100.00 USD
    pub fn booking_total() -> Money {
        Money::from_minor(10_000, Currency::USD)
    }

    /// 30% deposit of [`MoneyFixtures::booking_total`]
    pub fn deposit() -> Money {
        Money::from_minor(3_000, Currency::USD)
    }

    /// What is left after [`MoneyFixtures::deposit`]
    pub fn remaining_balance() -> Money {
        Money::from_minor(7_000, Currency::USD)
    }

    /// Monthly platform plan price
    pub fn plan_price() -> Money {
        Money::from_minor(2_900, Currency::USD)
    }

    pub fn pro_plan_price() -> Money {
        Money::from_minor(8_700, Currency::USD)
    }

    pub fn usd_zero() -> Money {
        Money::zero(Currency::USD)
    }

    /// A EUR amount for currency mismatch tests
    pub fn eur_100() -> Money {
        Money::from_minor(10_000, Currency::EUR)
    }

    /// A JPY amount (zero decimal places)
    pub fn jpy_10000() -> Money {
        Money::from_minor(10_000, Currency::JPY)
    }
}

/// Fixture for rate test data
pub struct RateFixtures;

impl RateFixtures {
    /// Default deposit share (30%)
    pub fn deposit() -> Rate {
        Rate::new(dec!(0.30))
    }

    /// Half up front
    pub fn half() -> Rate {
        Rate::new(dec!(0.50))
    }
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// First day of the standard reporting month (Jan 1, 2024)
    pub fn month_start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    /// Last day of the standard reporting month (Jan 31, 2024)
    pub fn month_end() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
    }

    /// Mid-month timestamp inside [`TemporalFixtures::january`]
    pub fn mid_month() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    /// Timestamp after the standard reporting month
    pub fn after_month() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
    }

    /// January 2024 as an inclusive date range
    pub fn january() -> DateRange {
        DateRange::new(Self::month_start(), Self::month_end()).unwrap()
    }

    /// Today's UTC date, for reconciling records created by a test
    pub fn today() -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Fixture for identifier test data
pub struct IdFixtures;

impl IdFixtures {
    /// Creates a deterministic tenant ID for testing
    pub fn tenant_id() -> TenantId {
        TenantId::from_uuid(Uuid::parse_str("7c9e6679-7425-40de-944b-e07fc1f90ae1").unwrap())
    }

    /// A second tenant for isolation tests
    pub fn other_tenant_id() -> TenantId {
        TenantId::from_uuid(Uuid::parse_str("7c9e6679-7425-40de-944b-e07fc1f90ae2").unwrap())
    }

    /// Creates a deterministic booking ID for testing
    pub fn booking_id() -> BookingId {
        BookingId::from_uuid(Uuid::parse_str("7c9e6679-7425-40de-944b-e07fc1f90ae3").unwrap())
    }

    /// Creates a deterministic customer ID for testing
    pub fn customer_id() -> CustomerId {
        CustomerId::from_uuid(Uuid::parse_str("7c9e6679-7425-40de-944b-e07fc1f90ae4").unwrap())
    }

    pub fn connected_account_id() -> ConnectedAccountId {
        ConnectedAccountId::new("acct_test_harbor")
    }

    pub fn basic_price_id() -> PriceId {
        PriceId::new("price_basic_monthly")
    }

    pub fn pro_price_id() -> PriceId {
        PriceId::new("price_pro_monthly")
    }
}

/// Fixture for string test data
pub struct StringFixtures;

impl StringFixtures {
    /// Webhook signing secret shared by the harness and the signed builders
    pub fn webhook_secret() -> &'static str {
        "whsec_test_payments_core"
    }

    pub fn business_name() -> &'static str {
        "Harbor Yoga Studio"
    }

    /// Test email address
    pub fn email() -> &'static str {
        "owner@harbor-yoga.test"
    }

    /// Staff member issuing refunds
    pub fn staff_user() -> &'static str {
        "staff-42"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deposit_and_remaining_add_up() {
        let total = MoneyFixtures::deposit()
            .checked_add(&MoneyFixtures::remaining_balance())
            .unwrap();
        assert_eq!(total, MoneyFixtures::booking_total());
        assert_eq!(RateFixtures::deposit().apply(&total).unwrap(), MoneyFixtures::deposit());
    }

    #[test]
    fn test_temporal_fixtures_ordering() {
        let january = TemporalFixtures::january();
        assert!(january.contains(TemporalFixtures::mid_month()));
        assert!(!january.contains(TemporalFixtures::after_month()));
        assert_eq!(january.days(), 31);
    }

    #[test]
    fn test_id_fixtures_are_deterministic() {
        assert_eq!(IdFixtures::tenant_id(), IdFixtures::tenant_id());
        assert_ne!(IdFixtures::tenant_id(), IdFixtures::other_tenant_id());
    }
}
