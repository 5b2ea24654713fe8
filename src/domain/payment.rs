use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Succeeded => "SUCCEEDED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(PaymentStatus::Pending),
            "PROCESSING" => Some(PaymentStatus::Processing),
            "SUCCEEDED" => Some(PaymentStatus::Succeeded),
            "FAILED" => Some(PaymentStatus::Failed),
            "CANCELLED" => Some(PaymentStatus::Cancelled),
            "REFUNDED" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Succeeded | PaymentStatus::Failed | PaymentStatus::Cancelled | PaymentStatus::Refunded
        )
    }
}

pub fn can_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
    use PaymentStatus::*;
    matches!(
        (from, to),
        (Pending, Processing)
            | (Processing, Succeeded)
            | (Processing, Failed)
            | (Pending, Succeeded)
            | (Pending, Failed)
            | (Pending, Cancelled)
            | (Processing, Cancelled)
            | (Succeeded, Refunded)
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: String,
    pub user_id: String,
    pub payment_method_id: Option<String>,
    pub status: PaymentStatus,
    pub provider: String,
    pub provider_payment_id: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn can_be_refunded(&self) -> bool {
        self.status == PaymentStatus::Succeeded
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub payment_id: Uuid,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_only_transitions() {
        assert!(can_transition(PaymentStatus::Pending, PaymentStatus::Processing));
        assert!(can_transition(PaymentStatus::Processing, PaymentStatus::Succeeded));
        assert!(can_transition(PaymentStatus::Succeeded, PaymentStatus::Refunded));
        assert!(!can_transition(PaymentStatus::Succeeded, PaymentStatus::Pending));
        assert!(!can_transition(PaymentStatus::Failed, PaymentStatus::Succeeded));
        assert!(!can_transition(PaymentStatus::Cancelled, PaymentStatus::Processing));
        assert!(!can_transition(PaymentStatus::Refunded, PaymentStatus::Succeeded));
    }

    #[test]
    fn cancellation_only_from_in_flight_states() {
        assert!(can_transition(PaymentStatus::Pending, PaymentStatus::Cancelled));
        assert!(can_transition(PaymentStatus::Processing, PaymentStatus::Cancelled));
        assert!(!can_transition(PaymentStatus::Succeeded, PaymentStatus::Cancelled));
        assert!(!can_transition(PaymentStatus::Failed, PaymentStatus::Cancelled));
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Processing,
            PaymentStatus::Succeeded,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
            PaymentStatus::Refunded,
        ] {
            assert_eq!(PaymentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PaymentStatus::parse("SETTLED"), None);
    }
}
