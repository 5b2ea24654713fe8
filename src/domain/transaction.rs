use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Charge,
    Refund,
    Void,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Charge => "CHARGE",
            TransactionType::Refund => "REFUND",
            TransactionType::Void => "VOID",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CHARGE" => Some(TransactionType::Charge),
            "REFUND" => Some(TransactionType::Refund),
            "VOID" => Some(TransactionType::Void),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Succeeded,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Succeeded => "SUCCEEDED",
            TransactionStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TransactionStatus::Pending),
            "SUCCEEDED" => Some(TransactionStatus::Succeeded),
            "FAILED" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub payment_id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub provider_transaction_id: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub provider_response: serde_json::Value,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PaymentTransaction {
    pub fn pending_charge(payment_id: Uuid, amount: Decimal, currency: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_id,
            kind: TransactionType::Charge,
            status: TransactionStatus::Pending,
            provider_transaction_id: None,
            amount,
            currency: currency.to_string(),
            provider_response: serde_json::Value::Null,
            processed_at: None,
            created_at: now,
        }
    }
}
