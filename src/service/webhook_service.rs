use crate::domain::order::OrderPaymentStatus;
use crate::domain::webhook::{normalize_event_type, PaymentWebhook, WebhookEvent, WebhookStatus};
use crate::error::PaymentError;
use crate::events::{DomainEvent, PaymentEventBody};
use crate::ports::{ChargeFinalization, ChargeResolution, PaymentRepo, WebhookRepo, WebhookUpsert};
use crate::providers::{PaymentProvider, ProviderRegistry};
use crate::service::notifier::PaymentNotifier;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    pub provider: String,
    pub event_type: String,
    pub provider_event_id: String,
    pub payload: serde_json::Value,
    pub signature: Option<String>,
    // exact wire bytes, required for providers that sign the raw body
    pub raw_payload: Option<Vec<u8>>,
}

#[derive(Clone)]
pub struct WebhookService {
    pub payments: Arc<dyn PaymentRepo>,
    pub webhooks: Arc<dyn WebhookRepo>,
    pub providers: Arc<ProviderRegistry>,
    pub notifier: PaymentNotifier,
    pub secrets: HashMap<String, String>,
    pub production: bool,
}

impl WebhookService {
    pub async fn handle(&self, delivery: WebhookDelivery) -> Result<PaymentWebhook, PaymentError> {
        if let Some(existing) = self
            .webhooks
            .find_by_event_id(&delivery.provider, &delivery.provider_event_id)
            .await?
        {
            if existing.status == WebhookStatus::Processed {
                return Ok(existing);
            }
        }

        let provider = self.providers.resolve(&delivery.provider);

        if let Some(signature) = &delivery.signature {
            match self.verify(&provider, &delivery, signature) {
                Verdict::Valid => {}
                Verdict::InvalidSignature => {
                    let record = self.store_record(&delivery).await?;
                    let failed = self.webhooks.mark_failed(record.id, "Invalid signature").await?;
                    tracing::warn!(
                        provider = %delivery.provider,
                        event_id = %delivery.provider_event_id,
                        "webhook rejected: invalid signature"
                    );
                    return Ok(failed);
                }
                Verdict::CannotVerify(reason) => {
                    if self.production {
                        let record = self.store_record(&delivery).await?;
                        let failed = self.webhooks.mark_failed(record.id, &reason).await?;
                        return Ok(failed);
                    }
                    tracing::warn!(
                        provider = %delivery.provider,
                        event_id = %delivery.provider_event_id,
                        reason = %reason,
                        "webhook verification bypassed outside production"
                    );
                }
            }
        }

        let record = self.store_record(&delivery).await?;

        match self.dispatch(&provider, &delivery).await {
            Ok(payment_id) => Ok(self.webhooks.mark_processed(record.id, payment_id).await?),
            Err(e) => {
                tracing::warn!(
                    provider = %delivery.provider,
                    event_id = %delivery.provider_event_id,
                    error = %e,
                    "webhook processing failed"
                );
                Ok(self.webhooks.mark_failed(record.id, &e.to_string()).await?)
            }
        }
    }

    async fn store_record(&self, delivery: &WebhookDelivery) -> Result<PaymentWebhook, PaymentError> {
        let webhook = PaymentWebhook {
            id: Uuid::new_v4(),
            provider: delivery.provider.clone(),
            event_type: delivery.event_type.clone(),
            provider_event_id: delivery.provider_event_id.clone(),
            payload: delivery.payload.clone(),
            status: WebhookStatus::Pending,
            error: None,
            payment_id: None,
            processed_at: None,
            created_at: Utc::now(),
        };
        match self.webhooks.upsert_pending(&webhook).await? {
            WebhookUpsert::AlreadyProcessed(existing) => Ok(existing),
            WebhookUpsert::Pending(record) => Ok(record),
        }
    }

    fn verify(&self, provider: &Arc<dyn PaymentProvider>, delivery: &WebhookDelivery, signature: &str) -> Verdict {
        let Some(secret) = self.secrets.get(&delivery.provider) else {
            return Verdict::CannotVerify(format!("no webhook secret configured for {}", delivery.provider));
        };
        let Some(verification) =
            provider.verify_webhook(&delivery.payload, delivery.raw_payload.as_deref(), signature, secret)
        else {
            return Verdict::CannotVerify(format!("provider {} cannot verify webhooks", delivery.provider));
        };
        if verification.valid {
            Verdict::Valid
        } else if let Some(error) = verification.error {
            Verdict::CannotVerify(error)
        } else {
            Verdict::InvalidSignature
        }
    }

    async fn dispatch(
        &self,
        provider: &Arc<dyn PaymentProvider>,
        delivery: &WebhookDelivery,
    ) -> anyhow::Result<Option<Uuid>> {
        let event = normalize_event_type(&delivery.event_type);
        match event {
            WebhookEvent::PaymentSucceeded | WebhookEvent::PaymentFailed => {
                let reference = provider
                    .extract_payment_reference(&delivery.payload)
                    .ok_or_else(|| anyhow::anyhow!("payload carries no payment reference"))?;

                let Some(payment) = self.payments.find_by_provider_payment_id(&reference).await? else {
                    tracing::warn!(
                        provider = %delivery.provider,
                        reference = %reference,
                        "webhook references unknown payment"
                    );
                    return Ok(None);
                };
                if payment.status.is_terminal() {
                    tracing::info!(
                        payment_id = %payment.id,
                        status = payment.status.as_str(),
                        "payment already settled, ignoring webhook"
                    );
                    return Ok(Some(payment.id));
                }

                let error = delivery
                    .payload
                    .get("error")
                    .and_then(|e| e.as_str())
                    .map(str::to_string);
                let finalization = ChargeFinalization {
                    resolution: if event == WebhookEvent::PaymentSucceeded {
                        ChargeResolution::Succeeded
                    } else {
                        ChargeResolution::Failed
                    },
                    provider_payment_id: Some(reference),
                    provider_transaction_id: None,
                    error: error.clone(),
                    raw_response: delivery.payload.clone(),
                    at: Utc::now(),
                };
                let updated = self.payments.finalize_charge(payment.id, &finalization).await?;

                if event == WebhookEvent::PaymentSucceeded {
                    let body = PaymentEventBody::from_payment(&updated, Utc::now());
                    self.notifier
                        .settle(&updated, OrderPaymentStatus::Paid, None, DomainEvent::PaymentSucceeded(body))
                        .await;
                } else {
                    let body = PaymentEventBody::from_payment(&updated, Utc::now());
                    self.notifier
                        .settle(
                            &updated,
                            OrderPaymentStatus::Failed,
                            error.as_deref(),
                            DomainEvent::PaymentFailed { body, error },
                        )
                        .await;
                }
                Ok(Some(updated.id))
            }
            WebhookEvent::PaymentRefunded => {
                // refund completion is authoritative from the refund flow, keep for reconciliation
                tracing::info!(
                    provider = %delivery.provider,
                    event_id = %delivery.provider_event_id,
                    "refund webhook recorded for reconciliation"
                );
                Ok(None)
            }
            WebhookEvent::Unknown => {
                tracing::info!(
                    provider = %delivery.provider,
                    event_type = %delivery.event_type,
                    "ignoring unrecognized webhook event type"
                );
                Ok(None)
            }
        }
    }
}

enum Verdict {
    Valid,
    InvalidSignature,
    CannotVerify(String),
}
