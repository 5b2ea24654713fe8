use crate::config::EngineConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub mod mock;
pub mod paypal;
pub mod stripe;

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub amount: Decimal,
    pub currency: String,
    pub payment_method_id: Option<String>,
    pub metadata: serde_json::Value,
    pub reference: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderChargeStatus {
    Succeeded,
    Pending,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ChargeOutcome {
    pub status: ProviderChargeStatus,
    pub provider_payment_id: Option<String>,
    pub provider_transaction_id: Option<String>,
    pub error: Option<String>,
    pub raw_response: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ProviderRefundRequest {
    pub provider_payment_id: String,
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRefundStatus {
    Completed,
    Pending,
    Failed,
}

#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub status: ProviderRefundStatus,
    pub provider_refund_id: Option<String>,
    pub error: Option<String>,
    pub raw_response: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct WebhookVerification {
    pub valid: bool,
    pub error: Option<String>,
}

#[async_trait::async_trait]
pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn charge(&self, request: ChargeRequest) -> ChargeOutcome;

    async fn refund(&self, request: ProviderRefundRequest) -> RefundOutcome;

    fn verify_webhook(
        &self,
        _payload: &serde_json::Value,
        _raw: Option<&[u8]>,
        _signature: &str,
        _secret: &str,
    ) -> Option<WebhookVerification> {
        None
    }

    fn extract_payment_reference(&self, payload: &serde_json::Value) -> Option<String> {
        payload
            .get("provider_payment_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn PaymentProvider>>,
    fallback: Arc<dyn PaymentProvider>,
}

impl ProviderRegistry {
    pub fn from_config(config: &EngineConfig) -> Self {
        let fallback: Arc<dyn PaymentProvider> = Arc::new(mock::MockProvider::default());
        let mut providers: HashMap<String, Arc<dyn PaymentProvider>> = HashMap::new();
        providers.insert("mock".to_string(), fallback.clone());

        match stripe::StripeProvider::from_config(&config.stripe) {
            Ok(provider) => {
                providers.insert("stripe".to_string(), Arc::new(provider));
            }
            Err(e) => tracing::warn!(error = %e, "stripe adapter unavailable, requests will fall back to mock"),
        }
        match paypal::PaypalProvider::from_config(&config.paypal) {
            Ok(provider) => {
                providers.insert("paypal".to_string(), Arc::new(provider));
            }
            Err(e) => tracing::warn!(error = %e, "paypal adapter unavailable, requests will fall back to mock"),
        }

        Self { providers, fallback }
    }

    pub fn with_mock_fallback() -> Self {
        let fallback: Arc<dyn PaymentProvider> = Arc::new(mock::MockProvider::default());
        let mut providers: HashMap<String, Arc<dyn PaymentProvider>> = HashMap::new();
        providers.insert("mock".to_string(), fallback.clone());
        Self { providers, fallback }
    }

    pub fn register(&mut self, name: &str, provider: Arc<dyn PaymentProvider>) {
        self.providers.insert(name.to_string(), provider);
    }

    pub fn resolve(&self, name: &str) -> Arc<dyn PaymentProvider> {
        match self.providers.get(name) {
            Some(provider) => provider.clone(),
            None => {
                tracing::warn!(provider = name, "unknown payment provider, using mock");
                self.fallback.clone()
            }
        }
    }
}
