use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookStatus {
    Pending,
    Processed,
    Failed,
}

impl WebhookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookStatus::Pending => "PENDING",
            WebhookStatus::Processed => "PROCESSED",
            WebhookStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(WebhookStatus::Pending),
            "PROCESSED" => Some(WebhookStatus::Processed),
            "FAILED" => Some(WebhookStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentWebhook {
    pub id: Uuid,
    pub provider: String,
    pub event_type: String,
    pub provider_event_id: String,
    pub payload: serde_json::Value,
    pub status: WebhookStatus,
    pub error: Option<String>,
    pub payment_id: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEvent {
    PaymentSucceeded,
    PaymentFailed,
    PaymentRefunded,
    Unknown,
}

pub fn normalize_event_type(event_type: &str) -> WebhookEvent {
    match event_type {
        "payment.succeeded" | "charge.succeeded" => WebhookEvent::PaymentSucceeded,
        "payment.failed" | "charge.failed" => WebhookEvent::PaymentFailed,
        "payment.refunded" | "refund.succeeded" => WebhookEvent::PaymentRefunded,
        _ => WebhookEvent::Unknown,
    }
}
