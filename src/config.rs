use std::{env, str::FromStr, time::Duration};

use anyhow::{Context, bail};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub request_timeout: Duration,
    pub pricing: PricingConfig,
}

/// Inputs to the default pricing rules.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingConfig {
    pub shipping_base_fee: Decimal,
    pub shipping_promo: Decimal,
    pub shipping_promo_enabled: bool,
    pub tax_rate: Decimal,
    pub discount_rate: Decimal,
    pub currency: String,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            shipping_base_fee: Decimal::new(10_000, 0),
            shipping_promo: Decimal::new(2_000, 0),
            shipping_promo_enabled: true,
            tax_rate: Decimal::new(10, 2),
            discount_rate: Decimal::new(5, 2),
            currency: "IDR".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt_secret = lookup("JWT_SECRET").context("JWT_SECRET is not set")?;
        let host = lookup("APP_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port: u16 = parse_or(&lookup, "APP_PORT", 3000)?;
        let jwt_ttl_hours = parse_or(&lookup, "JWT_TTL_HOURS", 24)?;
        let timeout_ms: u64 = parse_or(&lookup, "REQUEST_TIMEOUT_MS", 5_000)?;

        Ok(Self {
            database_url,
            host,
            port,
            jwt_secret,
            jwt_ttl_hours,
            request_timeout: Duration::from_millis(timeout_ms),
            pricing: PricingConfig::from_lookup(&lookup)?,
        })
    }
}

impl PricingConfig {
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let config = Self {
            shipping_base_fee: parse_or(lookup, "SHIPPING_BASE_FEE", defaults.shipping_base_fee)?,
            shipping_promo: parse_or(lookup, "SHIPPING_PROMO", defaults.shipping_promo)?,
            shipping_promo_enabled: parse_or(
                lookup,
                "SHIPPING_PROMO_ENABLED",
                defaults.shipping_promo_enabled,
            )?,
            tax_rate: parse_or(lookup, "TAX_RATE", defaults.tax_rate)?,
            discount_rate: parse_or(lookup, "DISCOUNT_RATE", defaults.discount_rate)?,
            currency: lookup("CURRENCY").unwrap_or(defaults.currency),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.shipping_base_fee.is_sign_negative() || self.shipping_promo.is_sign_negative() {
            bail!("shipping fees must not be negative");
        }
        for (name, rate) in [("TAX_RATE", self.tax_rate), ("DISCOUNT_RATE", self.discount_rate)] {
            if rate < Decimal::ZERO || rate > Decimal::ONE {
                bail!("{name} must be between 0 and 1, got {rate}");
            }
        }
        Ok(())
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value `{raw}`")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_required_keys_are_set() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/checkout"),
            ("JWT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.request_timeout, Duration::from_millis(5_000));
        assert_eq!(config.pricing, PricingConfig::default());
    }

    #[test]
    fn missing_secret_is_an_error() {
        let result = AppConfig::from_lookup(lookup_from(&[(
            "DATABASE_URL",
            "postgres://localhost/checkout",
        )]));
        assert!(result.is_err());
    }

    #[test]
    fn pricing_overrides_are_parsed_as_decimals() {
        let pricing = PricingConfig::from_lookup(&lookup_from(&[
            ("TAX_RATE", "0.11"),
            ("SHIPPING_PROMO_ENABLED", "false"),
            ("CURRENCY", "USD"),
        ]))
        .unwrap();

        assert_eq!(pricing.tax_rate, Decimal::new(11, 2));
        assert!(!pricing.shipping_promo_enabled);
        assert_eq!(pricing.currency, "USD");
    }

    #[test]
    fn invalid_port_is_an_error() {
        let result = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/checkout"),
            ("JWT_SECRET", "secret"),
            ("APP_PORT", "eighty"),
        ]));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("APP_PORT"));
    }

    #[test]
    fn out_of_range_rate_is_rejected() {
        let result = PricingConfig::from_lookup(&lookup_from(&[("DISCOUNT_RATE", "1.5")]));
        assert!(result.is_err());
    }
}
