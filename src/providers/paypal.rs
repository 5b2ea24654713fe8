use crate::config::PaypalConfig;
use crate::providers::{
    ChargeOutcome, ChargeRequest, PaymentProvider, ProviderChargeStatus, ProviderRefundRequest,
    ProviderRefundStatus, RefundOutcome, WebhookVerification,
};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub struct PaypalProvider {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

impl PaypalProvider {
    pub fn from_config(config: &PaypalConfig) -> anyhow::Result<Self> {
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            anyhow::bail!("PAYPAL_CLIENT_ID/PAYPAL_CLIENT_SECRET are not configured");
        }
        Ok(Self {
            base_url: config.base_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            timeout_ms: config.timeout_ms,
            client: reqwest::Client::new(),
        })
    }
}

fn map_capture_status(status: &str) -> ProviderChargeStatus {
    match status {
        "COMPLETED" => ProviderChargeStatus::Succeeded,
        "PENDING" | "IN_PROGRESS" => ProviderChargeStatus::Pending,
        _ => ProviderChargeStatus::Failed,
    }
}

#[async_trait::async_trait]
impl PaymentProvider for PaypalProvider {
    fn name(&self) -> &'static str {
        "paypal"
    }

    async fn charge(&self, request: ChargeRequest) -> ChargeOutcome {
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": request.reference,
                "amount": {
                    "currency_code": request.currency,
                    "value": request.amount.to_string(),
                }
            }]
        });

        let resp = self
            .client
            .post(format!("{}/v2/checkout/orders", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .json(&body)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => {
                let v: serde_json::Value = r.json().await.unwrap_or_default();
                let status = v
                    .get("status")
                    .and_then(|s| s.as_str())
                    .map(map_capture_status)
                    .unwrap_or(ProviderChargeStatus::Failed);
                ChargeOutcome {
                    status,
                    provider_payment_id: v.get("id").and_then(|s| s.as_str()).map(str::to_string),
                    provider_transaction_id: v
                        .pointer("/purchase_units/0/payments/captures/0/id")
                        .and_then(|s| s.as_str())
                        .map(str::to_string),
                    error: None,
                    raw_response: v,
                }
            }
            Ok(r) => {
                let status = r.status();
                let body: serde_json::Value = r.json().await.unwrap_or_default();
                let message = body
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("order rejected")
                    .to_string();
                ChargeOutcome {
                    status: ProviderChargeStatus::Failed,
                    provider_payment_id: None,
                    provider_transaction_id: None,
                    error: Some(format!("HTTP_{}: {}", status.as_u16(), message)),
                    raw_response: body,
                }
            }
            Err(e) if e.is_timeout() => ChargeOutcome {
                status: ProviderChargeStatus::Pending,
                provider_payment_id: None,
                provider_transaction_id: None,
                error: Some("gateway timeout".to_string()),
                raw_response: serde_json::Value::Null,
            },
            Err(e) => ChargeOutcome {
                status: ProviderChargeStatus::Failed,
                provider_payment_id: None,
                provider_transaction_id: None,
                error: Some(e.to_string()),
                raw_response: serde_json::Value::Null,
            },
        }
    }

    async fn refund(&self, request: ProviderRefundRequest) -> RefundOutcome {
        let mut body = json!({});
        if let Some(amount) = request.amount {
            body["amount"] = json!({ "value": amount.to_string() });
        }
        if let Some(reason) = &request.reason {
            body["note_to_payer"] = json!(reason);
        }

        let resp = self
            .client
            .post(format!(
                "{}/v2/payments/captures/{}/refund",
                self.base_url, request.provider_payment_id
            ))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .json(&body)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => {
                let v: serde_json::Value = r.json().await.unwrap_or_default();
                let status = match v.get("status").and_then(|s| s.as_str()) {
                    Some("COMPLETED") => ProviderRefundStatus::Completed,
                    Some("PENDING") => ProviderRefundStatus::Pending,
                    _ => ProviderRefundStatus::Failed,
                };
                RefundOutcome {
                    status,
                    provider_refund_id: v.get("id").and_then(|s| s.as_str()).map(str::to_string),
                    error: None,
                    raw_response: v,
                }
            }
            Ok(r) => {
                let status = r.status();
                let body: serde_json::Value = r.json().await.unwrap_or_default();
                RefundOutcome {
                    status: ProviderRefundStatus::Failed,
                    provider_refund_id: None,
                    error: Some(format!("HTTP_{}", status.as_u16())),
                    raw_response: body,
                }
            }
            Err(e) => RefundOutcome {
                status: ProviderRefundStatus::Failed,
                provider_refund_id: None,
                error: Some(e.to_string()),
                raw_response: serde_json::Value::Null,
            },
        }
    }

    // paypal deliveries are verified against the re-serialized event object,
    // not the wire bytes: signature = hex(HMAC-SHA256(secret, canonical_json))
    fn verify_webhook(
        &self,
        payload: &serde_json::Value,
        _raw: Option<&[u8]>,
        signature: &str,
        secret: &str,
    ) -> Option<WebhookVerification> {
        let canonical = match serde_json::to_vec(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                return Some(WebhookVerification {
                    valid: false,
                    error: Some(e.to_string()),
                })
            }
        };
        let Ok(provided) = hex::decode(signature.trim()) else {
            return Some(WebhookVerification {
                valid: false,
                error: None,
            });
        };

        let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
            Ok(mac) => mac,
            Err(e) => {
                return Some(WebhookVerification {
                    valid: false,
                    error: Some(e.to_string()),
                })
            }
        };
        mac.update(&canonical);

        Some(WebhookVerification {
            valid: mac.verify_slice(&provided).is_ok(),
            error: None,
        })
    }

    fn extract_payment_reference(&self, payload: &serde_json::Value) -> Option<String> {
        payload
            .pointer("/resource/id")
            .or_else(|| payload.get("id"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}
