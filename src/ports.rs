use crate::domain::order::{Order, OrderPaymentStatus};
use crate::domain::payment::{IdempotencyRecord, Payment, PaymentStatus};
use crate::domain::refund::Refund;
use crate::domain::transaction::PaymentTransaction;
use crate::domain::webhook::PaymentWebhook;
use crate::events::{AuditEntry, DomainEvent};
use crate::resilience::guard::CallError;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(Payment),
    Existing(Uuid),
}

#[derive(Debug, Clone)]
pub enum StateClaim {
    Claimed(Payment),
    WrongState(PaymentStatus),
    Missing,
}

#[derive(Debug, Clone)]
pub enum RefundReservation {
    Reserved(Refund),
    ExceedsBalance,
}

#[derive(Debug, Clone)]
pub enum WebhookUpsert {
    AlreadyProcessed(PaymentWebhook),
    Pending(PaymentWebhook),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeResolution {
    Succeeded,
    Failed,
    StillPending,
}

#[derive(Debug, Clone)]
pub struct ChargeFinalization {
    pub resolution: ChargeResolution,
    pub provider_payment_id: Option<String>,
    pub provider_transaction_id: Option<String>,
    pub error: Option<String>,
    pub raw_response: serde_json::Value,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundResolution {
    Completed,
    Failed,
    StillProcessing,
}

#[derive(Debug, Clone)]
pub struct RefundFinalization {
    pub resolution: RefundResolution,
    pub provider_refund_id: Option<String>,
    pub error: Option<String>,
    pub raw_response: serde_json::Value,
    pub at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait PaymentRepo: Send + Sync {
    async fn create_with_charge(
        &self,
        payment: &Payment,
        record: &IdempotencyRecord,
        charge: &PaymentTransaction,
    ) -> Result<CreateOutcome>;

    async fn get(&self, id: Uuid) -> Result<Option<Payment>>;

    async fn find_active_for_order(&self, order_id: &str) -> Result<Option<Payment>>;

    async fn find_by_provider_payment_id(&self, provider_payment_id: &str) -> Result<Option<Payment>>;

    async fn begin_processing(&self, id: Uuid) -> Result<StateClaim>;

    async fn finalize_charge(&self, id: Uuid, finalization: &ChargeFinalization) -> Result<Payment>;

    async fn cancel(&self, id: Uuid) -> Result<StateClaim>;
}

#[async_trait::async_trait]
pub trait TransactionRepo: Send + Sync {
    async fn list_for_payment(&self, payment_id: Uuid) -> Result<Vec<PaymentTransaction>>;
}

#[async_trait::async_trait]
pub trait RefundRepo: Send + Sync {
    async fn create_pending(&self, refund: &Refund, payment_amount: Decimal) -> Result<RefundReservation>;

    async fn record_outcome(&self, refund_id: Uuid, finalization: &RefundFinalization) -> Result<Refund>;

    async fn completed_total(&self, payment_id: Uuid) -> Result<Decimal>;

    async fn get(&self, id: Uuid) -> Result<Option<Refund>>;
}

#[async_trait::async_trait]
pub trait WebhookRepo: Send + Sync {
    async fn find_by_event_id(&self, provider: &str, provider_event_id: &str) -> Result<Option<PaymentWebhook>>;

    async fn upsert_pending(&self, webhook: &PaymentWebhook) -> Result<WebhookUpsert>;

    async fn mark_processed(&self, id: Uuid, payment_id: Option<Uuid>) -> Result<PaymentWebhook>;

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<PaymentWebhook>;
}

#[async_trait::async_trait]
pub trait IdempotencyRepo: Send + Sync {
    async fn find_valid(&self, key: &str, now: DateTime<Utc>) -> Result<Option<IdempotencyRecord>>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[async_trait::async_trait]
pub trait OrderClient: Send + Sync {
    async fn get_order(&self, order_id: &str, token: Option<&str>) -> Result<Option<Order>, CallError>;

    async fn update_payment_status(
        &self,
        order_id: &str,
        status: OrderPaymentStatus,
        reason: Option<&str>,
        token: Option<&str>,
    ) -> Result<(), CallError>;
}

#[async_trait::async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<()>;
}

#[async_trait::async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<()>;
}
