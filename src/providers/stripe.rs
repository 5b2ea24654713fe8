use crate::config::StripeConfig;
use crate::providers::{
    ChargeOutcome, ChargeRequest, PaymentProvider, ProviderChargeStatus, ProviderRefundRequest,
    ProviderRefundStatus, RefundOutcome, WebhookVerification,
};
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub struct StripeProvider {
    pub base_url: String,
    pub secret_key: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

impl StripeProvider {
    pub fn from_config(config: &StripeConfig) -> anyhow::Result<Self> {
        if config.secret_key.is_empty() {
            anyhow::bail!("STRIPE_SECRET_KEY is not configured");
        }
        Ok(Self {
            base_url: config.base_url.clone(),
            secret_key: config.secret_key.clone(),
            timeout_ms: config.timeout_ms,
            client: reqwest::Client::new(),
        })
    }
}

fn amount_minor(amount: Decimal) -> Option<i64> {
    (amount * Decimal::from(100)).round_dp(0).to_i64()
}

fn map_intent_status(status: &str) -> ProviderChargeStatus {
    match status {
        "succeeded" => ProviderChargeStatus::Succeeded,
        "processing" | "requires_action" | "requires_capture" => ProviderChargeStatus::Pending,
        _ => ProviderChargeStatus::Failed,
    }
}

#[async_trait::async_trait]
impl PaymentProvider for StripeProvider {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn charge(&self, request: ChargeRequest) -> ChargeOutcome {
        let Some(minor) = amount_minor(request.amount) else {
            return ChargeOutcome {
                status: ProviderChargeStatus::Failed,
                provider_payment_id: None,
                provider_transaction_id: None,
                error: Some("amount out of representable range".to_string()),
                raw_response: serde_json::Value::Null,
            };
        };

        let mut form = vec![
            ("amount".to_string(), minor.to_string()),
            ("currency".to_string(), request.currency.to_lowercase()),
            ("confirm".to_string(), "true".to_string()),
            ("metadata[reference]".to_string(), request.reference.clone()),
        ];
        if let Some(method) = &request.payment_method_id {
            form.push(("payment_method".to_string(), method.clone()));
        }

        let resp = self
            .client
            .post(format!("{}/v1/payment_intents", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => {
                let v: serde_json::Value = r.json().await.unwrap_or_default();
                let status = v
                    .get("status")
                    .and_then(|s| s.as_str())
                    .map(map_intent_status)
                    .unwrap_or(ProviderChargeStatus::Failed);
                ChargeOutcome {
                    status,
                    provider_payment_id: v.get("id").and_then(|s| s.as_str()).map(str::to_string),
                    provider_transaction_id: v
                        .get("latest_charge")
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
                    .pointer("/error/message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("charge rejected")
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
                // outcome unknown, leave the charge open for webhook reconciliation
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
        let mut form = vec![("payment_intent".to_string(), request.provider_payment_id.clone())];
        if let Some(amount) = request.amount {
            if let Some(minor) = amount_minor(amount) {
                form.push(("amount".to_string(), minor.to_string()));
            }
        }
        if let Some(reason) = &request.reason {
            form.push(("metadata[reason]".to_string(), reason.clone()));
        }

        let resp = self
            .client
            .post(format!("{}/v1/refunds", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => {
                let v: serde_json::Value = r.json().await.unwrap_or_default();
                let status = match v.get("status").and_then(|s| s.as_str()) {
                    Some("succeeded") => ProviderRefundStatus::Completed,
                    Some("pending") => ProviderRefundStatus::Pending,
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

    // stripe signs the exact wire bytes: v1 = HMAC-SHA256(secret, "{t}.{raw_body}")
    fn verify_webhook(
        &self,
        _payload: &serde_json::Value,
        raw: Option<&[u8]>,
        signature: &str,
        secret: &str,
    ) -> Option<WebhookVerification> {
        let Some(raw) = raw else {
            return Some(WebhookVerification {
                valid: false,
                error: Some("raw payload required for signature verification".to_string()),
            });
        };

        let mut timestamp = None;
        let mut provided = None;
        for part in signature.split(',') {
            match part.split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => provided = Some(value),
                _ => {}
            }
        }
        let (Some(timestamp), Some(provided)) = (timestamp, provided) else {
            return Some(WebhookVerification {
                valid: false,
                error: Some("malformed signature header".to_string()),
            });
        };
        let Ok(provided) = hex::decode(provided) else {
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
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(raw);

        Some(WebhookVerification {
            valid: mac.verify_slice(&provided).is_ok(),
            error: None,
        })
    }

    fn extract_payment_reference(&self, payload: &serde_json::Value) -> Option<String> {
        payload
            .pointer("/data/object/payment_intent")
            .or_else(|| payload.pointer("/data/object/id"))
            .or_else(|| payload.get("id"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}
