use crate::domain::order::OrderPaymentStatus;
use crate::domain::payment::PaymentStatus;
use crate::domain::refund::{Refund, RefundStatus};
use crate::error::PaymentError;
use crate::events::{AuditEntry, DomainEvent, RefundEventBody};
use crate::ports::{AuditLog, PaymentRepo, RefundFinalization, RefundRepo, RefundReservation, RefundResolution};
use crate::providers::{ProviderRefundRequest, ProviderRefundStatus, ProviderRegistry, RefundOutcome};
use crate::service::notifier::PaymentNotifier;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct RefundRequest {
    pub payment_id: Uuid,
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct RefundService {
    pub payments: Arc<dyn PaymentRepo>,
    pub refunds: Arc<dyn RefundRepo>,
    pub providers: Arc<ProviderRegistry>,
    pub notifier: PaymentNotifier,
    pub audit: Arc<dyn AuditLog>,
}

impl RefundService {
    pub async fn refund(&self, req: RefundRequest) -> Result<Refund, PaymentError> {
        let payment = self
            .payments
            .get(req.payment_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("payment {}", req.payment_id)))?;

        if !payment.can_be_refunded() {
            return Err(PaymentError::Conflict(format!(
                "payment {} is {}, only SUCCEEDED payments can be refunded",
                payment.id,
                payment.status.as_str()
            )));
        }
        let provider_payment_id = payment
            .provider_payment_id
            .clone()
            .ok_or_else(|| PaymentError::Conflict(format!("payment {} has no provider reference", payment.id)))?;

        let completed = self.refunds.completed_total(payment.id).await?;
        let remaining = payment.amount - completed;
        let amount = req.amount.unwrap_or(remaining);

        if amount <= Decimal::ZERO {
            return Err(PaymentError::Validation("refund amount must be greater than zero".to_string()));
        }
        if amount > payment.amount {
            return Err(PaymentError::Validation(format!(
                "refund amount {} exceeds payment amount {}",
                amount, payment.amount
            )));
        }
        if completed + amount > payment.amount {
            return Err(PaymentError::Conflict(format!(
                "refund amount {} exceeds remaining refundable balance {}",
                amount, remaining
            )));
        }

        let now = Utc::now();
        let refund = Refund {
            id: Uuid::new_v4(),
            payment_id: payment.id,
            order_id: payment.order_id.clone(),
            reason: req.reason.clone(),
            amount,
            status: RefundStatus::Pending,
            provider_refund_id: None,
            metadata: req.metadata.clone().unwrap_or_else(|| serde_json::json!({})),
            processed_at: None,
            created_at: now,
            updated_at: now,
        };

        let refund = match self.refunds.create_pending(&refund, payment.amount).await? {
            RefundReservation::Reserved(refund) => refund,
            RefundReservation::ExceedsBalance => {
                return Err(PaymentError::Conflict(format!(
                    "refund amount {} exceeds remaining refundable balance",
                    amount
                )))
            }
        };

        let provider = self.providers.resolve(&payment.provider);
        let outcome = provider
            .refund(ProviderRefundRequest {
                provider_payment_id,
                amount: Some(amount),
                reason: req.reason.clone(),
                metadata: refund.metadata.clone(),
            })
            .await;

        let finalization = refund_finalization(&outcome);
        let updated = self.refunds.record_outcome(refund.id, &finalization).await?;

        if updated.status == RefundStatus::Completed {
            if let Some(payment) = self.payments.get(payment.id).await? {
                if payment.status == PaymentStatus::Refunded {
                    let body = RefundEventBody::from_refund(&payment, &updated, Utc::now());
                    self.notifier
                        .settle(
                            &payment,
                            OrderPaymentStatus::Refunded,
                            updated.reason.as_deref(),
                            DomainEvent::PaymentRefunded(body),
                        )
                        .await;
                }
            }
        }

        let entry = AuditEntry {
            actor: payment.user_id.clone(),
            action: "payment.refund".to_string(),
            entity: "refund",
            entity_id: updated.id.to_string(),
            detail: serde_json::json!({
                "payment_id": payment.id,
                "amount": updated.amount,
                "status": updated.status.as_str(),
            }),
            at: Utc::now(),
        };
        if let Err(e) = self.audit.append(entry).await {
            tracing::warn!(refund_id = %updated.id, error = %e, "audit append failed");
        }

        Ok(updated)
    }

    pub async fn get(&self, refund_id: Uuid) -> Result<Refund, PaymentError> {
        self.refunds
            .get(refund_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("refund {refund_id}")))
    }
}

fn refund_finalization(outcome: &RefundOutcome) -> RefundFinalization {
    let resolution = match outcome.status {
        ProviderRefundStatus::Completed => RefundResolution::Completed,
        ProviderRefundStatus::Failed => RefundResolution::Failed,
        ProviderRefundStatus::Pending => RefundResolution::StillProcessing,
    };
    RefundFinalization {
        resolution,
        provider_refund_id: outcome.provider_refund_id.clone(),
        error: outcome.error.clone(),
        raw_response: outcome.raw_response.clone(),
        at: Utc::now(),
    }
}
