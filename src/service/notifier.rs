use crate::domain::order::OrderPaymentStatus;
use crate::domain::payment::Payment;
use crate::events::{AuditEntry, DomainEvent};
use crate::ports::{AuditLog, EventPublisher, OrderClient};
use anyhow::Result;
use std::sync::Arc;

// post-commit fan-out: the payment record is already authoritative, so every
// failure here is logged and swallowed
#[derive(Clone)]
pub struct PaymentNotifier {
    pub orders: Arc<dyn OrderClient>,
    pub publisher: Arc<dyn EventPublisher>,
}

impl PaymentNotifier {
    pub async fn settle(
        &self,
        payment: &Payment,
        order_status: OrderPaymentStatus,
        reason: Option<&str>,
        event: DomainEvent,
    ) {
        if let Err(e) = self
            .orders
            .update_payment_status(&payment.order_id, order_status, reason, None)
            .await
        {
            tracing::warn!(
                payment_id = %payment.id,
                order_id = %payment.order_id,
                error = %e,
                "order payment-status notification failed"
            );
        }

        if let Err(e) = self.publisher.publish(&event).await {
            tracing::warn!(
                payment_id = %payment.id,
                event = event.event_type(),
                error = %e,
                "domain event publish failed"
            );
        }
    }
}

pub struct LogPublisher;

#[async_trait::async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        tracing::info!(event = event.event_type(), payload = %event.payload(), "domain event");
        Ok(())
    }
}

pub struct LogAudit;

#[async_trait::async_trait]
impl AuditLog for LogAudit {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        tracing::info!(
            actor = %entry.actor,
            action = %entry.action,
            entity = entry.entity,
            entity_id = %entry.entity_id,
            detail = %entry.detail,
            "audit"
        );
        Ok(())
    }
}
