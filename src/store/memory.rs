use crate::domain::payment::{can_transition, IdempotencyRecord, Payment, PaymentStatus};
use crate::domain::refund::{Refund, RefundStatus};
use crate::domain::transaction::{PaymentTransaction, TransactionStatus, TransactionType};
use crate::domain::webhook::{PaymentWebhook, WebhookStatus};
use crate::ports::{
    ChargeFinalization, ChargeResolution, CreateOutcome, IdempotencyRepo, PaymentRepo, RefundFinalization,
    RefundRepo, RefundReservation, RefundResolution, StateClaim, TransactionRepo, WebhookRepo, WebhookUpsert,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct MemoryInner {
    payments: HashMap<Uuid, Payment>,
    transactions: Vec<PaymentTransaction>,
    refunds: HashMap<Uuid, Refund>,
    webhooks: HashMap<(String, String), PaymentWebhook>,
    idempotency: HashMap<String, IdempotencyRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock(store: &MemoryStore) -> std::sync::MutexGuard<'_, MemoryInner> {
    store.inner.lock().expect("memory store lock poisoned")
}

#[async_trait::async_trait]
impl PaymentRepo for MemoryStore {
    async fn create_with_charge(
        &self,
        payment: &Payment,
        record: &IdempotencyRecord,
        charge: &PaymentTransaction,
    ) -> Result<CreateOutcome> {
        let mut inner = lock(self);
        if let Some(existing) = inner.idempotency.get(&record.key) {
            if !existing.is_expired(Utc::now()) {
                return Ok(CreateOutcome::Existing(existing.payment_id));
            }
        }
        inner.idempotency.insert(record.key.clone(), record.clone());
        inner.payments.insert(payment.id, payment.clone());
        inner.transactions.push(charge.clone());
        Ok(CreateOutcome::Created(payment.clone()))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Payment>> {
        Ok(lock(self).payments.get(&id).cloned())
    }

    async fn find_active_for_order(&self, order_id: &str) -> Result<Option<Payment>> {
        Ok(lock(self)
            .payments
            .values()
            .find(|p| p.order_id == order_id && !p.status.is_terminal())
            .cloned())
    }

    async fn find_by_provider_payment_id(&self, provider_payment_id: &str) -> Result<Option<Payment>> {
        Ok(lock(self)
            .payments
            .values()
            .find(|p| p.provider_payment_id.as_deref() == Some(provider_payment_id))
            .cloned())
    }

    async fn begin_processing(&self, id: Uuid) -> Result<StateClaim> {
        let mut inner = lock(self);
        let Some(payment) = inner.payments.get_mut(&id) else {
            return Ok(StateClaim::Missing);
        };
        if payment.status != PaymentStatus::Pending {
            return Ok(StateClaim::WrongState(payment.status));
        }
        payment.status = PaymentStatus::Processing;
        payment.updated_at = Utc::now();
        Ok(StateClaim::Claimed(payment.clone()))
    }

    async fn finalize_charge(&self, id: Uuid, finalization: &ChargeFinalization) -> Result<Payment> {
        let mut inner = lock(self);
        let Some(payment) = inner.payments.get(&id).cloned() else {
            anyhow::bail!("payment {} does not exist", id);
        };
        if payment.status.is_terminal() {
            return Ok(payment);
        }

        let target = match finalization.resolution {
            ChargeResolution::Succeeded => Some(PaymentStatus::Succeeded),
            ChargeResolution::Failed => Some(PaymentStatus::Failed),
            ChargeResolution::StillPending => None,
        };

        if let Some(tx) = inner
            .transactions
            .iter_mut()
            .find(|t| t.payment_id == id && t.kind == TransactionType::Charge && t.status == TransactionStatus::Pending)
        {
            tx.provider_transaction_id = finalization
                .provider_transaction_id
                .clone()
                .or(tx.provider_transaction_id.take());
            tx.provider_response = finalization.raw_response.clone();
            match finalization.resolution {
                ChargeResolution::Succeeded => {
                    tx.status = TransactionStatus::Succeeded;
                    tx.processed_at = Some(finalization.at);
                }
                ChargeResolution::Failed => {
                    tx.status = TransactionStatus::Failed;
                    tx.processed_at = Some(finalization.at);
                }
                ChargeResolution::StillPending => {}
            }
        }

        let Some(payment) = inner.payments.get_mut(&id) else {
            anyhow::bail!("payment {} does not exist", id);
        };
        if payment.provider_payment_id.is_none() {
            payment.provider_payment_id = finalization.provider_payment_id.clone();
        }
        if let Some(target) = target {
            if can_transition(payment.status, target) {
                payment.status = target;
                if target == PaymentStatus::Succeeded {
                    payment.processed_at = Some(finalization.at);
                }
            }
        }
        payment.updated_at = finalization.at;
        Ok(payment.clone())
    }

    async fn cancel(&self, id: Uuid) -> Result<StateClaim> {
        let mut inner = lock(self);
        let Some(payment) = inner.payments.get_mut(&id) else {
            return Ok(StateClaim::Missing);
        };
        if !can_transition(payment.status, PaymentStatus::Cancelled) {
            return Ok(StateClaim::WrongState(payment.status));
        }
        payment.status = PaymentStatus::Cancelled;
        payment.updated_at = Utc::now();
        Ok(StateClaim::Claimed(payment.clone()))
    }
}

#[async_trait::async_trait]
impl TransactionRepo for MemoryStore {
    async fn list_for_payment(&self, payment_id: Uuid) -> Result<Vec<PaymentTransaction>> {
        Ok(lock(self)
            .transactions
            .iter()
            .filter(|t| t.payment_id == payment_id)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl RefundRepo for MemoryStore {
    async fn create_pending(&self, refund: &Refund, payment_amount: Decimal) -> Result<RefundReservation> {
        let mut inner = lock(self);
        let reserved: Decimal = inner
            .refunds
            .values()
            .filter(|r| r.payment_id == refund.payment_id && r.status.reserves_balance())
            .map(|r| r.amount)
            .sum();
        if reserved + refund.amount > payment_amount {
            return Ok(RefundReservation::ExceedsBalance);
        }
        inner.refunds.insert(refund.id, refund.clone());
        Ok(RefundReservation::Reserved(refund.clone()))
    }

    async fn record_outcome(&self, refund_id: Uuid, finalization: &RefundFinalization) -> Result<Refund> {
        let mut inner = lock(self);
        let Some(mut refund) = inner.refunds.get(&refund_id).cloned() else {
            anyhow::bail!("refund {} does not exist", refund_id);
        };

        refund.provider_refund_id = finalization
            .provider_refund_id
            .clone()
            .or(refund.provider_refund_id.take());
        refund.status = match finalization.resolution {
            RefundResolution::Completed => RefundStatus::Completed,
            RefundResolution::Failed => RefundStatus::Failed,
            RefundResolution::StillProcessing => RefundStatus::Processing,
        };
        if refund.status == RefundStatus::Completed {
            refund.processed_at = Some(finalization.at);
        }
        refund.updated_at = finalization.at;
        inner.refunds.insert(refund.id, refund.clone());

        let tx_status = match finalization.resolution {
            RefundResolution::Completed => TransactionStatus::Succeeded,
            RefundResolution::Failed => TransactionStatus::Failed,
            RefundResolution::StillProcessing => TransactionStatus::Pending,
        };
        let currency = inner
            .payments
            .get(&refund.payment_id)
            .map(|p| p.currency.clone())
            .unwrap_or_default();
        inner.transactions.push(PaymentTransaction {
            id: Uuid::new_v4(),
            payment_id: refund.payment_id,
            kind: TransactionType::Refund,
            status: tx_status,
            provider_transaction_id: refund.provider_refund_id.clone(),
            amount: refund.amount,
            currency,
            provider_response: finalization.raw_response.clone(),
            processed_at: refund.processed_at,
            created_at: finalization.at,
        });

        if refund.status == RefundStatus::Completed {
            let completed: Decimal = inner
                .refunds
                .values()
                .filter(|r| r.payment_id == refund.payment_id && r.status == RefundStatus::Completed)
                .map(|r| r.amount)
                .sum();
            if let Some(payment) = inner.payments.get_mut(&refund.payment_id) {
                if completed == payment.amount && can_transition(payment.status, PaymentStatus::Refunded) {
                    payment.status = PaymentStatus::Refunded;
                    payment.updated_at = finalization.at;
                }
            }
        }

        Ok(refund)
    }

    async fn completed_total(&self, payment_id: Uuid) -> Result<Decimal> {
        Ok(lock(self)
            .refunds
            .values()
            .filter(|r| r.payment_id == payment_id && r.status == RefundStatus::Completed)
            .map(|r| r.amount)
            .sum())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Refund>> {
        Ok(lock(self).refunds.get(&id).cloned())
    }
}

#[async_trait::async_trait]
impl WebhookRepo for MemoryStore {
    async fn find_by_event_id(&self, provider: &str, provider_event_id: &str) -> Result<Option<PaymentWebhook>> {
        Ok(lock(self)
            .webhooks
            .get(&(provider.to_string(), provider_event_id.to_string()))
            .cloned())
    }

    async fn upsert_pending(&self, webhook: &PaymentWebhook) -> Result<WebhookUpsert> {
        let mut inner = lock(self);
        let key = (webhook.provider.clone(), webhook.provider_event_id.clone());
        if let Some(existing) = inner.webhooks.get_mut(&key) {
            if existing.status == WebhookStatus::Processed {
                return Ok(WebhookUpsert::AlreadyProcessed(existing.clone()));
            }
            existing.status = WebhookStatus::Pending;
            existing.error = None;
            existing.payload = webhook.payload.clone();
            return Ok(WebhookUpsert::Pending(existing.clone()));
        }
        inner.webhooks.insert(key, webhook.clone());
        Ok(WebhookUpsert::Pending(webhook.clone()))
    }

    async fn mark_processed(&self, id: Uuid, payment_id: Option<Uuid>) -> Result<PaymentWebhook> {
        let mut inner = lock(self);
        let Some(webhook) = inner.webhooks.values_mut().find(|w| w.id == id) else {
            anyhow::bail!("webhook {} does not exist", id);
        };
        webhook.status = WebhookStatus::Processed;
        webhook.error = None;
        webhook.payment_id = payment_id.or(webhook.payment_id);
        webhook.processed_at = Some(Utc::now());
        Ok(webhook.clone())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<PaymentWebhook> {
        let mut inner = lock(self);
        let Some(webhook) = inner.webhooks.values_mut().find(|w| w.id == id) else {
            anyhow::bail!("webhook {} does not exist", id);
        };
        webhook.status = WebhookStatus::Failed;
        webhook.error = Some(error.to_string());
        Ok(webhook.clone())
    }
}

#[async_trait::async_trait]
impl IdempotencyRepo for MemoryStore {
    async fn find_valid(&self, key: &str, now: DateTime<Utc>) -> Result<Option<IdempotencyRecord>> {
        Ok(lock(self)
            .idempotency
            .get(key)
            .filter(|r| !r.is_expired(now))
            .cloned())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut inner = lock(self);
        let before = inner.idempotency.len();
        inner.idempotency.retain(|_, r| !r.is_expired(now));
        Ok((before - inner.idempotency.len()) as u64)
    }
}
