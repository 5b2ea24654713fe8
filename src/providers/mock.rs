use crate::providers::{
    ChargeOutcome, ChargeRequest, PaymentProvider, ProviderChargeStatus, ProviderRefundRequest,
    ProviderRefundStatus, RefundOutcome,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::sync::Mutex;
use uuid::Uuid;

pub struct MockProvider {
    pub failure_rate: f64,
    force: Option<ProviderChargeStatus>,
    rng: Mutex<StdRng>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl MockProvider {
    pub fn new(failure_rate: f64) -> Self {
        Self {
            failure_rate,
            force: None,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(failure_rate: f64, seed: u64) -> Self {
        Self {
            failure_rate,
            force: None,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn always_succeed() -> Self {
        Self {
            force: Some(ProviderChargeStatus::Succeeded),
            ..Self::new(0.0)
        }
    }

    pub fn always_fail() -> Self {
        Self {
            force: Some(ProviderChargeStatus::Failed),
            ..Self::new(1.0)
        }
    }

    pub fn always_pending() -> Self {
        Self {
            force: Some(ProviderChargeStatus::Pending),
            ..Self::new(0.0)
        }
    }

    fn roll_failure(&self) -> bool {
        let mut rng = self.rng.lock().expect("mock rng lock poisoned");
        rng.gen::<f64>() < self.failure_rate
    }
}

#[async_trait::async_trait]
impl PaymentProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn charge(&self, request: ChargeRequest) -> ChargeOutcome {
        let status = match self.force {
            Some(forced) => forced,
            None if self.roll_failure() => ProviderChargeStatus::Failed,
            None => ProviderChargeStatus::Succeeded,
        };

        match status {
            ProviderChargeStatus::Succeeded => ChargeOutcome {
                status,
                provider_payment_id: Some(format!("mock_pay_{}", Uuid::new_v4())),
                provider_transaction_id: Some(format!("mock_txn_{}", Uuid::new_v4())),
                error: None,
                raw_response: json!({
                    "simulated": true,
                    "result": "succeeded",
                    "reference": request.reference,
                }),
            },
            ProviderChargeStatus::Pending => ChargeOutcome {
                status,
                provider_payment_id: Some(format!("mock_pay_{}", Uuid::new_v4())),
                provider_transaction_id: None,
                error: None,
                raw_response: json!({
                    "simulated": true,
                    "result": "pending",
                    "reference": request.reference,
                }),
            },
            ProviderChargeStatus::Failed => ChargeOutcome {
                status,
                provider_payment_id: None,
                provider_transaction_id: None,
                error: Some("mock decline".to_string()),
                raw_response: json!({
                    "simulated": true,
                    "result": "failed",
                    "decline_code": "generic_decline",
                    "reference": request.reference,
                }),
            },
        }
    }

    async fn refund(&self, request: ProviderRefundRequest) -> RefundOutcome {
        let failed = match self.force {
            Some(ProviderChargeStatus::Failed) => true,
            Some(_) => false,
            None => self.roll_failure(),
        };

        if failed {
            RefundOutcome {
                status: ProviderRefundStatus::Failed,
                provider_refund_id: None,
                error: Some("mock refund decline".to_string()),
                raw_response: json!({
                    "simulated": true,
                    "result": "failed",
                    "payment": request.provider_payment_id,
                }),
            }
        } else {
            RefundOutcome {
                status: ProviderRefundStatus::Completed,
                provider_refund_id: Some(format!("mock_ref_{}", Uuid::new_v4())),
                error: None,
                raw_response: json!({
                    "simulated": true,
                    "result": "completed",
                    "payment": request.provider_payment_id,
                }),
            }
        }
    }

    fn extract_payment_reference(&self, payload: &serde_json::Value) -> Option<String> {
        payload
            .get("provider_payment_id")
            .or_else(|| payload.get("payment_id"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}
