//! API configuration
//!
//! Loaded from `PAYMENTS_`-prefixed environment variables with `__` between
//! section and key, e.g. `PAYMENTS_GATEWAY__API_KEY` or
//! `PAYMENTS_SERVER__PORT`. Every field has a default, so the service boots
//! with only a gateway key.

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use core_kernel::{Currency, Rate};
use domain_payments::adapters::RestGatewayConfig;
use domain_payments::{
    BookingSettings, ExponentialBackoff, FeeSchedule, FixedBackoff, OnboardingUrls, PaymentSettings,
    RetryOptions,
};

/// API configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub retry: RetryConfig,
    pub fees: FeesConfig,
    pub payments: PaymentsConfig,
    pub database: DatabaseConfig,
    pub reports: ReportsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Log filter; `RUST_LOG` takes precedence
    pub log_level: String,
    /// Emit logs as JSON lines
    pub log_json: bool,
    /// JWT secret for authentication
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            log_json: false,
            jwt_secret: "change-me-in-production".to_string(),
            jwt_expiration_secs: 3600,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub api_key: String,
    pub base_url: String,
    pub api_version: Option<String>,
    /// Signing secret for incoming webhooks
    pub webhook_secret: String,
    pub webhook_tolerance_secs: u64,
    /// Transport timeout for a single gateway request
    pub request_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let rest = RestGatewayConfig::default();
        Self {
            api_key: String::new(),
            base_url: rest.base_url,
            api_version: None,
            webhook_secret: String::new(),
            webhook_tolerance_secs: 300,
            request_timeout_ms: 30_000,
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("webhook_tolerance_secs", &self.webhook_tolerance_secs)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Exponential backoff with jitter when true, a fixed delay otherwise
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeesConfig {
    /// Platform fee percentage, e.g. 2.9
    pub percentage: Decimal,
    pub flat_minor_units: i64,
}

impl Default for FeesConfig {
    fn default() -> Self {
        Self {
            percentage: dec!(2.9),
            flat_minor_units: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaymentsConfig {
    /// Currency analytics and reconciliation are computed in
    pub currency: Currency,
    /// Deposit share in percent when a request names none
    pub default_deposit_percentage: Decimal,
    pub onboarding_refresh_url: String,
    pub onboarding_return_url: String,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        let urls = OnboardingUrls::default();
        Self {
            currency: Currency::USD,
            default_deposit_percentage: dec!(30),
            onboarding_refresh_url: urls.refresh_url,
            onboarding_return_url: urls.return_url,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL URL; the in-memory store is used when absent
    pub url: Option<String>,
    pub max_connections: u32,
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            run_migrations: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    /// Directory for report artifacts; kept in memory when absent
    pub artifact_dir: Option<String>,
    /// Base of the download URLs handed out for reports
    pub public_base_url: String,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            artifact_dir: None,
            public_base_url: "http://localhost:8080/api/v1".to_string(),
        }
    }
}

impl ApiConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("PAYMENTS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn gateway_client_config(&self) -> RestGatewayConfig {
        RestGatewayConfig {
            base_url: self.gateway.base_url.clone(),
            api_key: self.gateway.api_key.clone(),
            api_version: self.gateway.api_version.clone(),
            timeout: Duration::from_millis(self.gateway.request_timeout_ms),
        }
    }

    pub fn retry_options(&self) -> RetryOptions {
        let base = Duration::from_millis(self.retry.base_delay_ms);
        let options = RetryOptions::new(self.retry.max_attempts)
            .with_timeout(Duration::from_millis(self.gateway.request_timeout_ms));
        if self.retry.jitter {
            options.with_backoff(ExponentialBackoff::new(base, Duration::from_millis(self.retry.max_delay_ms)))
        } else {
            options.with_backoff(FixedBackoff(base))
        }
    }

    pub fn payment_settings(&self) -> PaymentSettings {
        PaymentSettings {
            booking: BookingSettings {
                fees: FeeSchedule {
                    percentage: Rate::from_percentage(self.fees.percentage),
                    flat_minor_units: self.fees.flat_minor_units,
                },
                default_deposit: Rate::from_percentage(self.payments.default_deposit_percentage),
            },
            retry: self.retry_options(),
            webhook_secret: self.gateway.webhook_secret.clone(),
            webhook_tolerance: Duration::from_secs(self.gateway.webhook_tolerance_secs),
            onboarding: OnboardingUrls {
                refresh_url: self.payments.onboarding_refresh_url.clone(),
                return_url: self.payments.onboarding_return_url.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_boot_without_environment() {
        let config = ApiConfig::default();
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
        assert!(config.database.url.is_none());
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_payment_settings_use_percentages() {
        let config = ApiConfig::default();
        let settings = config.payment_settings();
        assert_eq!(settings.booking.default_deposit, Rate::new(dec!(0.30)));
        assert_eq!(settings.booking.fees.flat_minor_units, 30);
        assert_eq!(settings.retry.max_retries, 3);
        assert_eq!(settings.webhook_tolerance, Duration::from_secs(300));
    }

    #[test]
    fn test_gateway_debug_hides_secrets() {
        let mut config = ApiConfig::default();
        config.gateway.api_key = "sk_live_secret".to_string();
        config.gateway.webhook_secret = "whsec_secret".to_string();
        let debug = format!("{:?}", config.gateway);
        assert!(!debug.contains("sk_live_secret"));
        assert!(!debug.contains("whsec_secret"));
    }
}
