use crate::domain::payment::Payment;
use crate::domain::refund::Refund;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

pub const EVENT_SOURCE: &str = "payments-engine";

#[derive(Debug, Clone, Serialize)]
pub struct PaymentEventBody {
    pub payment_id: Uuid,
    pub order_id: String,
    pub user_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method_id: Option<String>,
    pub provider_payment_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub source: &'static str,
}

impl PaymentEventBody {
    pub fn from_payment(payment: &Payment, timestamp: DateTime<Utc>) -> Self {
        Self {
            payment_id: payment.id,
            order_id: payment.order_id.clone(),
            user_id: payment.user_id.clone(),
            amount: payment.amount,
            currency: payment.currency.clone(),
            payment_method_id: payment.payment_method_id.clone(),
            provider_payment_id: payment.provider_payment_id.clone(),
            timestamp,
            source: EVENT_SOURCE,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundEventBody {
    pub payment_id: Uuid,
    pub refund_id: Uuid,
    pub order_id: String,
    pub user_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub source: &'static str,
}

impl RefundEventBody {
    pub fn from_refund(payment: &Payment, refund: &Refund, timestamp: DateTime<Utc>) -> Self {
        Self {
            payment_id: payment.id,
            refund_id: refund.id,
            order_id: payment.order_id.clone(),
            user_id: payment.user_id.clone(),
            amount: refund.amount,
            currency: payment.currency.clone(),
            reason: refund.reason.clone(),
            timestamp,
            source: EVENT_SOURCE,
        }
    }
}

#[derive(Debug, Clone)]
pub enum DomainEvent {
    PaymentSucceeded(PaymentEventBody),
    PaymentFailed { body: PaymentEventBody, error: Option<String> },
    PaymentRefunded(RefundEventBody),
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::PaymentSucceeded(_) => "payment.succeeded",
            DomainEvent::PaymentFailed { .. } => "payment.failed",
            DomainEvent::PaymentRefunded(_) => "payment.refunded",
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        match self {
            DomainEvent::PaymentSucceeded(body) => serde_json::to_value(body).unwrap_or_default(),
            DomainEvent::PaymentFailed { body, error } => {
                let mut value = serde_json::to_value(body).unwrap_or_default();
                if let serde_json::Value::Object(map) = &mut value {
                    map.insert("error".to_string(), serde_json::json!(error));
                }
                value
            }
            DomainEvent::PaymentRefunded(body) => serde_json::to_value(body).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub actor: String,
    pub action: String,
    pub entity: &'static str,
    pub entity_id: String,
    pub detail: serde_json::Value,
    pub at: DateTime<Utc>,
}
