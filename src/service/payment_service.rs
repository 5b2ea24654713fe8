use crate::domain::order::{Order, OrderPaymentStatus};
use crate::domain::payment::{IdempotencyRecord, Payment, PaymentStatus};
use crate::domain::transaction::PaymentTransaction;
use crate::error::PaymentError;
use crate::events::{AuditEntry, DomainEvent, PaymentEventBody};
use crate::ports::{
    AuditLog, ChargeFinalization, ChargeResolution, CreateOutcome, IdempotencyRepo, OrderClient, PaymentRepo,
    StateClaim, TransactionRepo,
};
use crate::providers::{ChargeOutcome, ChargeRequest, ProviderChargeStatus, ProviderRegistry};
use crate::service::notifier::PaymentNotifier;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentRequest {
    pub order_id: String,
    pub user_id: String,
    pub amount: Decimal,
    pub currency: Option<String>,
    pub payment_method_id: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
    pub auth_token: Option<String>,
}

#[derive(Clone)]
pub struct PaymentService {
    pub payments: Arc<dyn PaymentRepo>,
    pub transactions: Arc<dyn TransactionRepo>,
    pub idempotency: Arc<dyn IdempotencyRepo>,
    pub orders: Arc<dyn OrderClient>,
    pub providers: Arc<ProviderRegistry>,
    pub notifier: PaymentNotifier,
    pub audit: Arc<dyn AuditLog>,
    pub provider_name: String,
    pub idempotency_ttl_hours: i64,
    pub amount_tolerance: Decimal,
}

impl PaymentService {
    pub async fn create_payment(&self, req: CreatePaymentRequest) -> Result<Payment, PaymentError> {
        validate_request(&req)?;

        let key = req
            .idempotency_key
            .clone()
            .unwrap_or_else(|| derive_idempotency_key(&req.user_id, &req.order_id, req.amount, req.payment_method_id.as_deref()));

        let now = Utc::now();
        if let Some(record) = self.idempotency.find_valid(&key, now).await? {
            if let Some(existing) = self.payments.get(record.payment_id).await? {
                return Ok(existing);
            }
        }

        let order = self.fetch_order(&req.order_id, req.auth_token.as_deref()).await?;
        if order.user_id != req.user_id {
            return Err(PaymentError::Forbidden("caller does not own the order".to_string()));
        }
        if let Some(active) = self.payments.find_active_for_order(&req.order_id).await? {
            return Err(PaymentError::Conflict(format!(
                "order {} already has payment {} in status {}",
                req.order_id,
                active.id,
                active.status.as_str()
            )));
        }
        if (order.total_amount - req.amount).abs() > self.amount_tolerance {
            return Err(PaymentError::Validation(format!(
                "amount {} does not match order total {}",
                req.amount, order.total_amount
            )));
        }
        if let Some(currency) = &req.currency {
            if !currency.eq_ignore_ascii_case(&order.currency) {
                return Err(PaymentError::Validation(format!(
                    "currency {} does not match order currency {}",
                    currency, order.currency
                )));
            }
        }

        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            order_id: req.order_id.clone(),
            user_id: req.user_id.clone(),
            payment_method_id: req.payment_method_id.clone(),
            status: PaymentStatus::Pending,
            provider: self.provider_name.clone(),
            provider_payment_id: None,
            amount: req.amount,
            currency: order.currency.clone(),
            description: req.description.clone(),
            metadata: req.metadata.clone().unwrap_or_else(|| serde_json::json!({})),
            processed_at: None,
            created_at: now,
            updated_at: now,
        };
        let record = IdempotencyRecord {
            key,
            payment_id: payment.id,
            user_id: req.user_id.clone(),
            created_at: now,
            expires_at: now + chrono::Duration::hours(self.idempotency_ttl_hours),
        };
        let charge = PaymentTransaction::pending_charge(payment.id, payment.amount, &payment.currency, now);

        let payment = match self.payments.create_with_charge(&payment, &record, &charge).await? {
            CreateOutcome::Created(payment) => payment,
            CreateOutcome::Existing(id) => {
                // lost the race on the key, converge on the winner
                return self
                    .payments
                    .get(id)
                    .await?
                    .ok_or_else(|| PaymentError::Storage(anyhow::anyhow!("idempotency key points at missing payment {id}")));
            }
        };

        self.append_audit(&payment.user_id, "payment.created", &payment).await;
        Ok(payment)
    }

    pub async fn process(&self, payment_id: Uuid) -> Result<Payment, PaymentError> {
        let payment = self
            .payments
            .get(payment_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("payment {payment_id}")))?;
        if payment.status != PaymentStatus::Pending {
            return Err(PaymentError::Conflict(format!(
                "payment {} is {}, only PENDING payments can be processed",
                payment_id,
                payment.status.as_str()
            )));
        }

        self.fetch_order(&payment.order_id, None).await?;

        let payment = match self.payments.begin_processing(payment_id).await? {
            StateClaim::Claimed(payment) => payment,
            StateClaim::WrongState(status) => {
                return Err(PaymentError::Conflict(format!(
                    "payment {} is {}, only PENDING payments can be processed",
                    payment_id,
                    status.as_str()
                )))
            }
            StateClaim::Missing => return Err(PaymentError::NotFound(format!("payment {payment_id}"))),
        };

        let provider = self.providers.resolve(&payment.provider);
        let outcome = provider
            .charge(ChargeRequest {
                amount: payment.amount,
                currency: payment.currency.clone(),
                payment_method_id: payment.payment_method_id.clone(),
                metadata: payment.metadata.clone(),
                reference: payment.id.to_string(),
            })
            .await;

        let finalization = charge_finalization(&outcome);
        let updated = self.payments.finalize_charge(payment_id, &finalization).await?;

        match updated.status {
            PaymentStatus::Succeeded => {
                let body = PaymentEventBody::from_payment(&updated, Utc::now());
                self.notifier
                    .settle(&updated, OrderPaymentStatus::Paid, None, DomainEvent::PaymentSucceeded(body))
                    .await;
            }
            PaymentStatus::Failed => {
                let body = PaymentEventBody::from_payment(&updated, Utc::now());
                self.notifier
                    .settle(
                        &updated,
                        OrderPaymentStatus::Failed,
                        outcome.error.as_deref(),
                        DomainEvent::PaymentFailed {
                            body,
                            error: outcome.error.clone(),
                        },
                    )
                    .await;
            }
            _ => {
                tracing::info!(
                    payment_id = %updated.id,
                    provider = %updated.provider,
                    "charge left pending, awaiting provider webhook"
                );
            }
        }

        Ok(updated)
    }

    pub async fn cancel(&self, payment_id: Uuid, reason: Option<&str>) -> Result<Payment, PaymentError> {
        match self.payments.cancel(payment_id).await? {
            StateClaim::Claimed(payment) => {
                tracing::info!(payment_id = %payment.id, reason, "payment cancelled");
                self.append_audit(&payment.user_id, "payment.cancelled", &payment).await;
                Ok(payment)
            }
            StateClaim::WrongState(status) => Err(PaymentError::Conflict(format!(
                "payment {} is {}, only PENDING or PROCESSING payments can be cancelled",
                payment_id,
                status.as_str()
            ))),
            StateClaim::Missing => Err(PaymentError::NotFound(format!("payment {payment_id}"))),
        }
    }

    pub async fn get(&self, payment_id: Uuid) -> Result<Payment, PaymentError> {
        self.payments
            .get(payment_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("payment {payment_id}")))
    }

    pub async fn transactions(&self, payment_id: Uuid) -> Result<Vec<PaymentTransaction>, PaymentError> {
        Ok(self.transactions.list_for_payment(payment_id).await?)
    }

    async fn fetch_order(&self, order_id: &str, token: Option<&str>) -> Result<Order, PaymentError> {
        match self.orders.get_order(order_id, token).await {
            Ok(Some(order)) => Ok(order),
            Ok(None) => Err(PaymentError::NotFound(format!("order {order_id}"))),
            Err(e) => Err(PaymentError::CollaboratorUnavailable(e.to_string())),
        }
    }

    async fn append_audit(&self, actor: &str, action: &str, payment: &Payment) {
        let entry = AuditEntry {
            actor: actor.to_string(),
            action: action.to_string(),
            entity: "payment",
            entity_id: payment.id.to_string(),
            detail: serde_json::json!({
                "order_id": payment.order_id,
                "amount": payment.amount,
                "currency": payment.currency,
                "status": payment.status.as_str(),
            }),
            at: Utc::now(),
        };
        if let Err(e) = self.audit.append(entry).await {
            tracing::warn!(payment_id = %payment.id, error = %e, "audit append failed");
        }
    }
}

pub fn derive_idempotency_key(
    user_id: &str,
    order_id: &str,
    amount: Decimal,
    payment_method_id: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b"|");
    hasher.update(order_id.as_bytes());
    hasher.update(b"|");
    hasher.update(amount.normalize().to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(payment_method_id.unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}

fn charge_finalization(outcome: &ChargeOutcome) -> ChargeFinalization {
    let resolution = match outcome.status {
        ProviderChargeStatus::Succeeded => ChargeResolution::Succeeded,
        ProviderChargeStatus::Failed => ChargeResolution::Failed,
        ProviderChargeStatus::Pending => ChargeResolution::StillPending,
    };
    ChargeFinalization {
        resolution,
        provider_payment_id: outcome.provider_payment_id.clone(),
        provider_transaction_id: outcome.provider_transaction_id.clone(),
        error: outcome.error.clone(),
        raw_response: outcome.raw_response.clone(),
        at: Utc::now(),
    }
}

fn validate_request(req: &CreatePaymentRequest) -> Result<(), PaymentError> {
    if req.amount <= Decimal::ZERO {
        return Err(PaymentError::Validation("amount must be greater than zero".to_string()));
    }
    if req.order_id.is_empty() {
        return Err(PaymentError::Validation("order_id is required".to_string()));
    }
    if req.user_id.is_empty() {
        return Err(PaymentError::Validation("user_id is required".to_string()));
    }
    if let Some(currency) = &req.currency {
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(PaymentError::Validation(format!("invalid currency code {currency}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_keys_are_stable() {
        let a = derive_idempotency_key("u1", "o1", Decimal::new(10000, 2), Some("pm_1"));
        let b = derive_idempotency_key("u1", "o1", Decimal::new(10000, 2), Some("pm_1"));
        assert_eq!(a, b);
    }

    #[test]
    fn derived_keys_ignore_decimal_scale() {
        let a = derive_idempotency_key("u1", "o1", Decimal::new(100, 0), None);
        let b = derive_idempotency_key("u1", "o1", Decimal::new(10000, 2), None);
        assert_eq!(a, b);
    }

    #[test]
    fn derived_keys_differ_per_input() {
        let base = derive_idempotency_key("u1", "o1", Decimal::new(10000, 2), Some("pm_1"));
        assert_ne!(base, derive_idempotency_key("u2", "o1", Decimal::new(10000, 2), Some("pm_1")));
        assert_ne!(base, derive_idempotency_key("u1", "o2", Decimal::new(10000, 2), Some("pm_1")));
        assert_ne!(base, derive_idempotency_key("u1", "o1", Decimal::new(10001, 2), Some("pm_1")));
        assert_ne!(base, derive_idempotency_key("u1", "o1", Decimal::new(10000, 2), None));
    }
}
