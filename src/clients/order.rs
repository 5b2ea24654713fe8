use crate::domain::order::{Order, OrderPaymentStatus};
use crate::ports::OrderClient;
use crate::resilience::guard::{CallError, CallFailure, CallGuard};
use serde_json::json;
use std::sync::Arc;

#[async_trait::async_trait]
pub trait OrderTransport: Send + Sync {
    async fn get_order(&self, order_id: &str, token: Option<&str>) -> Result<Option<Order>, CallFailure>;

    async fn update_payment_status(
        &self,
        order_id: &str,
        status: OrderPaymentStatus,
        reason: Option<&str>,
        token: Option<&str>,
    ) -> Result<(), CallFailure>;
}

pub struct HttpOrderClient {
    pub base_url: String,
    pub service_token: Option<String>,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

impl HttpOrderClient {
    fn bearer<'a>(&'a self, token: Option<&'a str>) -> Option<&'a str> {
        token.or(self.service_token.as_deref())
    }
}

fn classify(e: reqwest::Error) -> CallFailure {
    if e.is_timeout() || e.is_connect() {
        CallFailure::transient(e.to_string())
    } else {
        CallFailure::permanent(e.to_string())
    }
}

#[async_trait::async_trait]
impl OrderTransport for HttpOrderClient {
    async fn get_order(&self, order_id: &str, token: Option<&str>) -> Result<Option<Order>, CallFailure> {
        let mut req = self
            .client
            .get(format!("{}/orders/{}", self.base_url, order_id))
            .timeout(std::time::Duration::from_millis(self.timeout_ms));
        if let Some(token) = self.bearer(token) {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(classify)?;
        match resp.status() {
            s if s.is_success() => {
                let order = resp.json::<Order>().await.map_err(|e| CallFailure::permanent(e.to_string()))?;
                Ok(Some(order))
            }
            s if s == reqwest::StatusCode::NOT_FOUND => Ok(None),
            s if s.is_server_error() => Err(CallFailure::transient(format!("order service returned {}", s))),
            s => Err(CallFailure::permanent(format!("order service returned {}", s))),
        }
    }

    async fn update_payment_status(
        &self,
        order_id: &str,
        status: OrderPaymentStatus,
        reason: Option<&str>,
        token: Option<&str>,
    ) -> Result<(), CallFailure> {
        let mut req = self
            .client
            .patch(format!("{}/orders/{}/payment-status", self.base_url, order_id))
            .json(&json!({
                "payment_status": status.as_str(),
                "reason": reason,
            }))
            .timeout(std::time::Duration::from_millis(self.timeout_ms));
        if let Some(token) = self.bearer(token) {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(classify)?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            s if s.is_server_error() => Err(CallFailure::transient(format!("order service returned {}", s))),
            s => Err(CallFailure::permanent(format!("order service returned {}", s))),
        }
    }
}

#[derive(Clone)]
pub struct ResilientOrderClient {
    inner: Arc<dyn OrderTransport>,
    guard: CallGuard,
}

impl ResilientOrderClient {
    pub fn new(inner: Arc<dyn OrderTransport>, guard: CallGuard) -> Self {
        Self { inner, guard }
    }
}

#[async_trait::async_trait]
impl OrderClient for ResilientOrderClient {
    async fn get_order(&self, order_id: &str, token: Option<&str>) -> Result<Option<Order>, CallError> {
        self.guard.run(|| self.inner.get_order(order_id, token)).await
    }

    async fn update_payment_status(
        &self,
        order_id: &str,
        status: OrderPaymentStatus,
        reason: Option<&str>,
        token: Option<&str>,
    ) -> Result<(), CallError> {
        self.guard
            .run(|| self.inner.update_payment_status(order_id, status, reason, token))
            .await
    }
}
