use crate::domain::payment::{IdempotencyRecord, Payment, PaymentStatus};
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
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgStore {
    pub pool: PgPool,
}

impl PgStore {
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

const PAYMENT_COLS: &str = "id, order_id, user_id, payment_method_id, status, provider, provider_payment_id, \
     amount, currency, description, metadata, processed_at, created_at, updated_at";

const REFUND_COLS: &str =
    "id, payment_id, order_id, reason, amount, status, provider_refund_id, metadata, processed_at, created_at, updated_at";

const WEBHOOK_COLS: &str =
    "id, provider, event_type, provider_event_id, payload, status, error, payment_id, processed_at, created_at";

fn payment_from_row(row: &PgRow) -> Result<Payment> {
    let status: String = row.get("status");
    Ok(Payment {
        id: row.get("id"),
        order_id: row.get("order_id"),
        user_id: row.get("user_id"),
        payment_method_id: row.get("payment_method_id"),
        status: PaymentStatus::parse(&status).ok_or_else(|| anyhow::anyhow!("unknown payment status {status}"))?,
        provider: row.get("provider"),
        provider_payment_id: row.get("provider_payment_id"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        description: row.get("description"),
        metadata: row.get("metadata"),
        processed_at: row.get("processed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn refund_from_row(row: &PgRow) -> Result<Refund> {
    let status: String = row.get("status");
    Ok(Refund {
        id: row.get("id"),
        payment_id: row.get("payment_id"),
        order_id: row.get("order_id"),
        reason: row.get("reason"),
        amount: row.get("amount"),
        status: RefundStatus::parse(&status).ok_or_else(|| anyhow::anyhow!("unknown refund status {status}"))?,
        provider_refund_id: row.get("provider_refund_id"),
        metadata: row.get("metadata"),
        processed_at: row.get("processed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn webhook_from_row(row: &PgRow) -> Result<PaymentWebhook> {
    let status: String = row.get("status");
    Ok(PaymentWebhook {
        id: row.get("id"),
        provider: row.get("provider"),
        event_type: row.get("event_type"),
        provider_event_id: row.get("provider_event_id"),
        payload: row.get("payload"),
        status: WebhookStatus::parse(&status).ok_or_else(|| anyhow::anyhow!("unknown webhook status {status}"))?,
        error: row.get("error"),
        payment_id: row.get("payment_id"),
        processed_at: row.get("processed_at"),
        created_at: row.get("created_at"),
    })
}

fn transaction_from_row(row: &PgRow) -> Result<PaymentTransaction> {
    let kind: String = row.get("type");
    let status: String = row.get("status");
    Ok(PaymentTransaction {
        id: row.get("id"),
        payment_id: row.get("payment_id"),
        kind: TransactionType::parse(&kind).ok_or_else(|| anyhow::anyhow!("unknown transaction type {kind}"))?,
        status: TransactionStatus::parse(&status)
            .ok_or_else(|| anyhow::anyhow!("unknown transaction status {status}"))?,
        provider_transaction_id: row.get("provider_transaction_id"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        provider_response: row
            .get::<Option<serde_json::Value>, _>("provider_response")
            .unwrap_or(serde_json::Value::Null),
        processed_at: row.get("processed_at"),
        created_at: row.get("created_at"),
    })
}

#[async_trait::async_trait]
impl PaymentRepo for PgStore {
    async fn create_with_charge(
        &self,
        payment: &Payment,
        record: &IdempotencyRecord,
        charge: &PaymentTransaction,
    ) -> Result<CreateOutcome> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (key, payment_id, user_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (key) DO UPDATE
                SET payment_id = EXCLUDED.payment_id, user_id = EXCLUDED.user_id,
                    created_at = EXCLUDED.created_at, expires_at = EXCLUDED.expires_at
                WHERE idempotency_keys.expires_at <= $4
            "#,
        )
        .bind(&record.key)
        .bind(record.payment_id)
        .bind(&record.user_id)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(tx.as_mut())
        .await?;

        if claimed.rows_affected() == 0 {
            let row = sqlx::query("SELECT payment_id FROM idempotency_keys WHERE key = $1")
                .bind(&record.key)
                .fetch_one(tx.as_mut())
                .await?;
            tx.rollback().await?;
            return Ok(CreateOutcome::Existing(row.get("payment_id")));
        }

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, order_id, user_id, payment_method_id, status, provider, provider_payment_id,
                amount, currency, description, metadata, processed_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(payment.id)
        .bind(&payment.order_id)
        .bind(&payment.user_id)
        .bind(&payment.payment_method_id)
        .bind(payment.status.as_str())
        .bind(&payment.provider)
        .bind(&payment.provider_payment_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(&payment.description)
        .bind(&payment.metadata)
        .bind(payment.processed_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(tx.as_mut())
        .await?;

        sqlx::query(
            r#"
            INSERT INTO payment_transactions (
                id, payment_id, type, status, provider_transaction_id, amount, currency,
                provider_response, processed_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(charge.id)
        .bind(charge.payment_id)
        .bind(charge.kind.as_str())
        .bind(charge.status.as_str())
        .bind(&charge.provider_transaction_id)
        .bind(charge.amount)
        .bind(&charge.currency)
        .bind(&charge.provider_response)
        .bind(charge.processed_at)
        .bind(charge.created_at)
        .execute(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(CreateOutcome::Created(payment.clone()))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!("SELECT {PAYMENT_COLS} FROM payments WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| payment_from_row(&r)).transpose()
    }

    async fn find_active_for_order(&self, order_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLS} FROM payments WHERE order_id = $1 AND status IN ('PENDING', 'PROCESSING')"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| payment_from_row(&r)).transpose()
    }

    async fn find_by_provider_payment_id(&self, provider_payment_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLS} FROM payments WHERE provider_payment_id = $1"
        ))
        .bind(provider_payment_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| payment_from_row(&r)).transpose()
    }

    async fn begin_processing(&self, id: Uuid) -> Result<StateClaim> {
        let row = sqlx::query(&format!(
            "UPDATE payments SET status = 'PROCESSING', updated_at = $2 WHERE id = $1 AND status = 'PENDING' \
             RETURNING {PAYMENT_COLS}"
        ))
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(StateClaim::Claimed(payment_from_row(&row)?));
        }

        let row = sqlx::query("SELECT status FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            None => Ok(StateClaim::Missing),
            Some(row) => {
                let status: String = row.get("status");
                Ok(StateClaim::WrongState(
                    PaymentStatus::parse(&status)
                        .ok_or_else(|| anyhow::anyhow!("unknown payment status {status}"))?,
                ))
            }
        }
    }

    async fn finalize_charge(&self, id: Uuid, finalization: &ChargeFinalization) -> Result<Payment> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!("SELECT {PAYMENT_COLS} FROM payments WHERE id = $1 FOR UPDATE"))
            .bind(id)
            .fetch_optional(tx.as_mut())
            .await?
            .ok_or_else(|| anyhow::anyhow!("payment {} does not exist", id))?;
        let payment = payment_from_row(&row)?;

        if payment.status.is_terminal() {
            tx.rollback().await?;
            return Ok(payment);
        }

        let (tx_status, payment_status) = match finalization.resolution {
            ChargeResolution::Succeeded => (TransactionStatus::Succeeded, PaymentStatus::Succeeded),
            ChargeResolution::Failed => (TransactionStatus::Failed, PaymentStatus::Failed),
            ChargeResolution::StillPending => (TransactionStatus::Pending, payment.status),
        };
        let tx_processed_at = match finalization.resolution {
            ChargeResolution::StillPending => None,
            _ => Some(finalization.at),
        };

        sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = $2, provider_transaction_id = COALESCE($3, provider_transaction_id),
                provider_response = $4, processed_at = $5
            WHERE payment_id = $1 AND type = 'CHARGE' AND status = 'PENDING'
            "#,
        )
        .bind(id)
        .bind(tx_status.as_str())
        .bind(&finalization.provider_transaction_id)
        .bind(&finalization.raw_response)
        .bind(tx_processed_at)
        .execute(tx.as_mut())
        .await?;

        let processed_at = if payment_status == PaymentStatus::Succeeded {
            Some(finalization.at)
        } else {
            None
        };
        let row = sqlx::query(&format!(
            "UPDATE payments SET status = $2, provider_payment_id = COALESCE(provider_payment_id, $3), \
             processed_at = COALESCE($4, processed_at), updated_at = $5 WHERE id = $1 RETURNING {PAYMENT_COLS}"
        ))
        .bind(id)
        .bind(payment_status.as_str())
        .bind(&finalization.provider_payment_id)
        .bind(processed_at)
        .bind(finalization.at)
        .fetch_one(tx.as_mut())
        .await?;
        let updated = payment_from_row(&row)?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn cancel(&self, id: Uuid) -> Result<StateClaim> {
        let row = sqlx::query(&format!(
            "UPDATE payments SET status = 'CANCELLED', updated_at = $2 \
             WHERE id = $1 AND status IN ('PENDING', 'PROCESSING') RETURNING {PAYMENT_COLS}"
        ))
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(StateClaim::Claimed(payment_from_row(&row)?));
        }

        let row = sqlx::query("SELECT status FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            None => Ok(StateClaim::Missing),
            Some(row) => {
                let status: String = row.get("status");
                Ok(StateClaim::WrongState(
                    PaymentStatus::parse(&status)
                        .ok_or_else(|| anyhow::anyhow!("unknown payment status {status}"))?,
                ))
            }
        }
    }
}

#[async_trait::async_trait]
impl TransactionRepo for PgStore {
    async fn list_for_payment(&self, payment_id: Uuid) -> Result<Vec<PaymentTransaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, payment_id, type, status, provider_transaction_id, amount, currency,
                   provider_response, processed_at, created_at
            FROM payment_transactions
            WHERE payment_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(transaction_from_row).collect()
    }
}

#[async_trait::async_trait]
impl RefundRepo for PgStore {
    async fn create_pending(&self, refund: &Refund, payment_amount: Decimal) -> Result<RefundReservation> {
        let mut tx = self.pool.begin().await?;

        // lock the payment row so concurrent refunds serialize on the balance check
        sqlx::query("SELECT id FROM payments WHERE id = $1 FOR UPDATE")
            .bind(refund.payment_id)
            .fetch_optional(tx.as_mut())
            .await?
            .ok_or_else(|| anyhow::anyhow!("payment {} does not exist", refund.payment_id))?;

        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount), 0) AS reserved
            FROM refunds
            WHERE payment_id = $1 AND status IN ('PENDING', 'PROCESSING', 'COMPLETED')
            "#,
        )
        .bind(refund.payment_id)
        .fetch_one(tx.as_mut())
        .await?;
        let reserved: Decimal = row.get("reserved");

        if reserved + refund.amount > payment_amount {
            tx.rollback().await?;
            return Ok(RefundReservation::ExceedsBalance);
        }

        sqlx::query(
            r#"
            INSERT INTO refunds (
                id, payment_id, order_id, reason, amount, status, provider_refund_id,
                metadata, processed_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(refund.id)
        .bind(refund.payment_id)
        .bind(&refund.order_id)
        .bind(&refund.reason)
        .bind(refund.amount)
        .bind(refund.status.as_str())
        .bind(&refund.provider_refund_id)
        .bind(&refund.metadata)
        .bind(refund.processed_at)
        .bind(refund.created_at)
        .bind(refund.updated_at)
        .execute(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(RefundReservation::Reserved(refund.clone()))
    }

    async fn record_outcome(&self, refund_id: Uuid, finalization: &RefundFinalization) -> Result<Refund> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!("SELECT {REFUND_COLS} FROM refunds WHERE id = $1 FOR UPDATE"))
            .bind(refund_id)
            .fetch_optional(tx.as_mut())
            .await?
            .ok_or_else(|| anyhow::anyhow!("refund {} does not exist", refund_id))?;
        let refund = refund_from_row(&row)?;

        let payment_row = sqlx::query(&format!("SELECT {PAYMENT_COLS} FROM payments WHERE id = $1 FOR UPDATE"))
            .bind(refund.payment_id)
            .fetch_one(tx.as_mut())
            .await?;
        let payment = payment_from_row(&payment_row)?;

        let status = match finalization.resolution {
            RefundResolution::Completed => RefundStatus::Completed,
            RefundResolution::Failed => RefundStatus::Failed,
            RefundResolution::StillProcessing => RefundStatus::Processing,
        };
        let processed_at = match status {
            RefundStatus::Completed => Some(finalization.at),
            _ => None,
        };

        let row = sqlx::query(&format!(
            "UPDATE refunds SET status = $2, provider_refund_id = COALESCE($3, provider_refund_id), \
             processed_at = COALESCE($4, processed_at), updated_at = $5 WHERE id = $1 RETURNING {REFUND_COLS}"
        ))
        .bind(refund_id)
        .bind(status.as_str())
        .bind(&finalization.provider_refund_id)
        .bind(processed_at)
        .bind(finalization.at)
        .fetch_one(tx.as_mut())
        .await?;
        let updated = refund_from_row(&row)?;

        let tx_status = match finalization.resolution {
            RefundResolution::Completed => TransactionStatus::Succeeded,
            RefundResolution::Failed => TransactionStatus::Failed,
            RefundResolution::StillProcessing => TransactionStatus::Pending,
        };
        sqlx::query(
            r#"
            INSERT INTO payment_transactions (
                id, payment_id, type, status, provider_transaction_id, amount, currency,
                provider_response, processed_at, created_at
            ) VALUES ($1, $2, 'REFUND', $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(refund.payment_id)
        .bind(tx_status.as_str())
        .bind(&updated.provider_refund_id)
        .bind(updated.amount)
        .bind(&payment.currency)
        .bind(&finalization.raw_response)
        .bind(processed_at)
        .bind(finalization.at)
        .execute(tx.as_mut())
        .await?;

        if updated.status == RefundStatus::Completed {
            let row = sqlx::query(
                "SELECT COALESCE(SUM(amount), 0) AS completed FROM refunds WHERE payment_id = $1 AND status = 'COMPLETED'",
            )
            .bind(refund.payment_id)
            .fetch_one(tx.as_mut())
            .await?;
            let completed: Decimal = row.get("completed");
            if completed == payment.amount {
                sqlx::query(
                    "UPDATE payments SET status = 'REFUNDED', updated_at = $2 WHERE id = $1 AND status = 'SUCCEEDED'",
                )
                .bind(refund.payment_id)
                .bind(finalization.at)
                .execute(tx.as_mut())
                .await?;
            }
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn completed_total(&self, payment_id: Uuid) -> Result<Decimal> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount), 0) AS completed FROM refunds WHERE payment_id = $1 AND status = 'COMPLETED'",
        )
        .bind(payment_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("completed"))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Refund>> {
        let row = sqlx::query(&format!("SELECT {REFUND_COLS} FROM refunds WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| refund_from_row(&r)).transpose()
    }
}

#[async_trait::async_trait]
impl WebhookRepo for PgStore {
    async fn find_by_event_id(&self, provider: &str, provider_event_id: &str) -> Result<Option<PaymentWebhook>> {
        let row = sqlx::query(&format!(
            "SELECT {WEBHOOK_COLS} FROM payment_webhooks WHERE provider = $1 AND provider_event_id = $2"
        ))
        .bind(provider)
        .bind(provider_event_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| webhook_from_row(&r)).transpose()
    }

    async fn upsert_pending(&self, webhook: &PaymentWebhook) -> Result<WebhookUpsert> {
        let row = sqlx::query(&format!(
            "INSERT INTO payment_webhooks (id, provider, event_type, provider_event_id, payload, status, error, \
             payment_id, processed_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, 'PENDING', NULL, NULL, NULL, $6) \
             ON CONFLICT (provider, provider_event_id) DO UPDATE \
                 SET status = 'PENDING', error = NULL, payload = EXCLUDED.payload \
                 WHERE payment_webhooks.status <> 'PROCESSED' \
             RETURNING {WEBHOOK_COLS}"
        ))
        .bind(webhook.id)
        .bind(&webhook.provider)
        .bind(&webhook.event_type)
        .bind(&webhook.provider_event_id)
        .bind(&webhook.payload)
        .bind(webhook.created_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(WebhookUpsert::Pending(webhook_from_row(&row)?));
        }

        let existing = self
            .find_by_event_id(&webhook.provider, &webhook.provider_event_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("webhook upsert returned no row and no existing record"))?;
        Ok(WebhookUpsert::AlreadyProcessed(existing))
    }

    async fn mark_processed(&self, id: Uuid, payment_id: Option<Uuid>) -> Result<PaymentWebhook> {
        let row = sqlx::query(&format!(
            "UPDATE payment_webhooks SET status = 'PROCESSED', error = NULL, \
             payment_id = COALESCE($2, payment_id), processed_at = $3 WHERE id = $1 RETURNING {WEBHOOK_COLS}"
        ))
        .bind(id)
        .bind(payment_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        webhook_from_row(&row)
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<PaymentWebhook> {
        let row = sqlx::query(&format!(
            "UPDATE payment_webhooks SET status = 'FAILED', error = $2 WHERE id = $1 RETURNING {WEBHOOK_COLS}"
        ))
        .bind(id)
        .bind(error)
        .fetch_one(&self.pool)
        .await?;
        webhook_from_row(&row)
    }
}

#[async_trait::async_trait]
impl IdempotencyRepo for PgStore {
    async fn find_valid(&self, key: &str, now: DateTime<Utc>) -> Result<Option<IdempotencyRecord>> {
        let row = sqlx::query(
            "SELECT key, payment_id, user_id, created_at, expires_at FROM idempotency_keys \
             WHERE key = $1 AND expires_at > $2",
        )
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| IdempotencyRecord {
            key: r.get("key"),
            payment_id: r.get("payment_id"),
            user_id: r.get("user_id"),
            created_at: r.get("created_at"),
            expires_at: r.get("expires_at"),
        }))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
