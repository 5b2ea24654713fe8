use crate::resilience::breaker::BreakerConfig;
use crate::resilience::retry::RetryPolicy;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

#[derive(Clone)]
pub struct OrderServiceConfig {
    pub base_url: String,
    pub service_token: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Clone)]
pub struct StripeConfig {
    pub base_url: String,
    pub secret_key: String,
    pub webhook_secret: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Clone)]
pub struct PaypalConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub webhook_secret: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Clone)]
pub struct EngineConfig {
    pub environment: Environment,
    pub provider: String,
    pub idempotency_ttl_hours: i64,
    pub amount_tolerance: Decimal,
    pub order_service: OrderServiceConfig,
    pub stripe: StripeConfig,
    pub paypal: PaypalConfig,
    pub retry: RetryPolicy,
    pub breaker: BreakerConfig,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            environment: match env_or("APP_ENV", "development").as_str() {
                "production" => Environment::Production,
                _ => Environment::Development,
            },
            provider: env_or("PAYMENT_PROVIDER", "mock"),
            idempotency_ttl_hours: env_parse("IDEMPOTENCY_TTL_HOURS", 24),
            amount_tolerance: std::env::var("AMOUNT_TOLERANCE")
                .ok()
                .and_then(|s| Decimal::from_str(&s).ok())
                .unwrap_or_else(|| Decimal::new(1, 2)),
            order_service: OrderServiceConfig {
                base_url: env_or("ORDER_SERVICE_URL", "http://localhost:4001"),
                service_token: std::env::var("ORDER_SERVICE_TOKEN").ok(),
                timeout_ms: env_parse("ORDER_SERVICE_TIMEOUT_MS", 3000),
            },
            stripe: StripeConfig {
                base_url: env_or("STRIPE_BASE_URL", "https://api.stripe.com"),
                secret_key: env_or("STRIPE_SECRET_KEY", ""),
                webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET").ok(),
                timeout_ms: env_parse("PROVIDER_TIMEOUT_MS", 5000),
            },
            paypal: PaypalConfig {
                base_url: env_or("PAYPAL_BASE_URL", "https://api-m.paypal.com"),
                client_id: env_or("PAYPAL_CLIENT_ID", ""),
                client_secret: env_or("PAYPAL_CLIENT_SECRET", ""),
                webhook_secret: std::env::var("PAYPAL_WEBHOOK_SECRET").ok(),
                timeout_ms: env_parse("PROVIDER_TIMEOUT_MS", 5000),
            },
            retry: RetryPolicy {
                max_attempts: env_parse("RETRY_MAX_ATTEMPTS", 3),
                base_delay_ms: env_parse("RETRY_BASE_DELAY_MS", 200),
                exponential: env_parse("RETRY_EXPONENTIAL", true),
            },
            breaker: BreakerConfig {
                failure_threshold: env_parse("BREAKER_FAILURE_THRESHOLD", 5),
                reset_timeout_secs: env_parse("BREAKER_RESET_TIMEOUT_SECS", 30),
                success_threshold: env_parse("BREAKER_SUCCESS_THRESHOLD", 2),
            },
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.amount_tolerance < Decimal::ZERO {
            anyhow::bail!("AMOUNT_TOLERANCE must not be negative");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("RETRY_MAX_ATTEMPTS must be at least 1");
        }
        if self.is_production() {
            if self.provider == "stripe" && self.stripe.webhook_secret.is_none() {
                anyhow::bail!("STRIPE_WEBHOOK_SECRET is required in production");
            }
            if self.provider == "paypal" && self.paypal.webhook_secret.is_none() {
                anyhow::bail!("PAYPAL_WEBHOOK_SECRET is required in production");
            }
        }
        Ok(())
    }

    pub fn webhook_secrets(&self) -> HashMap<String, String> {
        let mut secrets = HashMap::new();
        if let Some(secret) = &self.stripe.webhook_secret {
            secrets.insert("stripe".to_string(), secret.clone());
        }
        if let Some(secret) = &self.paypal.webhook_secret {
            secrets.insert("paypal".to_string(), secret.clone());
        }
        secrets
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|s| s.parse::<T>().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> EngineConfig {
        let mut cfg = EngineConfig::from_env();
        cfg.environment = Environment::Production;
        cfg.provider = "stripe".to_string();
        cfg.stripe.webhook_secret = None;
        cfg
    }

    #[test]
    fn production_requires_webhook_secret_for_active_provider() {
        let cfg = base();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn secret_satisfies_production_validation() {
        let mut cfg = base();
        cfg.stripe.webhook_secret = Some("whsec_x".to_string());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn development_tolerates_missing_secret() {
        let mut cfg = base();
        cfg.environment = Environment::Development;
        assert!(cfg.validate().is_ok());
    }
}
