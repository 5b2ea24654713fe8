pub mod config;
pub mod error;
pub mod events;
pub mod ports;
pub mod providers;
pub mod domain {
    pub mod order;
    pub mod payment;
    pub mod refund;
    pub mod transaction;
    pub mod webhook;
}
pub mod resilience {
    pub mod breaker;
    pub mod guard;
    pub mod retry;
}
pub mod clients {
    pub mod order;
}
pub mod store {
    pub mod memory;
    pub mod postgres;
}
pub mod service {
    pub mod notifier;
    pub mod payment_service;
    pub mod refund_service;
    pub mod webhook_service;
}

use crate::clients::order::{HttpOrderClient, OrderTransport, ResilientOrderClient};
use crate::config::EngineConfig;
use crate::ports::{AuditLog, EventPublisher, IdempotencyRepo, OrderClient, PaymentRepo, RefundRepo, TransactionRepo, WebhookRepo};
use crate::providers::ProviderRegistry;
use crate::resilience::breaker::CircuitBreaker;
use crate::resilience::guard::CallGuard;
use crate::service::notifier::PaymentNotifier;
use crate::service::payment_service::PaymentService;
use crate::service::refund_service::RefundService;
use crate::service::webhook_service::WebhookService;
use crate::store::memory::MemoryStore;
use crate::store::postgres::PgStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct EngineStores {
    pub payments: Arc<dyn PaymentRepo>,
    pub transactions: Arc<dyn TransactionRepo>,
    pub refunds: Arc<dyn RefundRepo>,
    pub webhooks: Arc<dyn WebhookRepo>,
    pub idempotency: Arc<dyn IdempotencyRepo>,
}

impl EngineStores {
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            payments: store.clone(),
            transactions: store.clone(),
            refunds: store.clone(),
            webhooks: store.clone(),
            idempotency: store,
        }
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let store = Arc::new(PgStore { pool });
        Self {
            payments: store.clone(),
            transactions: store.clone(),
            refunds: store.clone(),
            webhooks: store.clone(),
            idempotency: store,
        }
    }
}

#[derive(Clone)]
pub struct PaymentEngine {
    pub payments: PaymentService,
    pub refunds: RefundService,
    pub webhooks: WebhookService,
}

impl PaymentEngine {
    pub fn new(
        config: &EngineConfig,
        stores: EngineStores,
        orders: Arc<dyn OrderClient>,
        publisher: Arc<dyn EventPublisher>,
        audit: Arc<dyn AuditLog>,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let providers = Arc::new(ProviderRegistry::from_config(config));
        let notifier = PaymentNotifier {
            orders: orders.clone(),
            publisher,
        };

        let payments = PaymentService {
            payments: stores.payments.clone(),
            transactions: stores.transactions.clone(),
            idempotency: stores.idempotency.clone(),
            orders,
            providers: providers.clone(),
            notifier: notifier.clone(),
            audit: audit.clone(),
            provider_name: config.provider.clone(),
            idempotency_ttl_hours: config.idempotency_ttl_hours,
            amount_tolerance: config.amount_tolerance,
        };

        let refunds = RefundService {
            payments: stores.payments.clone(),
            refunds: stores.refunds.clone(),
            providers: providers.clone(),
            notifier: notifier.clone(),
            audit,
        };

        let webhooks = WebhookService {
            payments: stores.payments,
            webhooks: stores.webhooks,
            providers,
            notifier,
            secrets: config.webhook_secrets(),
            production: config.is_production(),
        };

        Ok(Self {
            payments,
            refunds,
            webhooks,
        })
    }

    pub fn resilient_order_client(config: &EngineConfig) -> Arc<dyn OrderClient> {
        let transport: Arc<dyn OrderTransport> = Arc::new(HttpOrderClient {
            base_url: config.order_service.base_url.clone(),
            service_token: config.order_service.service_token.clone(),
            timeout_ms: config.order_service.timeout_ms,
            client: reqwest::Client::new(),
        });
        let breaker = Arc::new(CircuitBreaker::new("order-service", config.breaker.clone()));
        Arc::new(ResilientOrderClient::new(
            transport,
            CallGuard::new(config.retry.clone(), breaker),
        ))
    }
}
