#![allow(dead_code)]

use payments_engine::domain::order::{Order, OrderPaymentStatus};
use payments_engine::events::DomainEvent;
use payments_engine::ports::{AuditLog, EventPublisher, OrderClient};
use payments_engine::providers::{
    ChargeOutcome, ChargeRequest, PaymentProvider, ProviderRefundRequest, ProviderRegistry, RefundOutcome,
};
use payments_engine::resilience::guard::CallError;
use payments_engine::service::notifier::PaymentNotifier;
use payments_engine::service::payment_service::{CreatePaymentRequest, PaymentService};
use payments_engine::service::refund_service::RefundService;
use payments_engine::service::webhook_service::WebhookService;
use payments_engine::store::memory::MemoryStore;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct StubOrderClient {
    pub orders: Mutex<HashMap<String, Order>>,
    pub updates: Mutex<Vec<(String, String)>>,
}

impl StubOrderClient {
    pub fn with_order(order: Order) -> Arc<Self> {
        let client = Self::default();
        client.orders.lock().unwrap().insert(order.id.clone(), order);
        Arc::new(client)
    }

    pub fn insert(&self, order: Order) {
        self.orders.lock().unwrap().insert(order.id.clone(), order);
    }

    pub fn recorded_updates(&self) -> Vec<(String, String)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl OrderClient for StubOrderClient {
    async fn get_order(&self, order_id: &str, _token: Option<&str>) -> Result<Option<Order>, CallError> {
        Ok(self.orders.lock().unwrap().get(order_id).cloned())
    }

    async fn update_payment_status(
        &self,
        order_id: &str,
        status: OrderPaymentStatus,
        _reason: Option<&str>,
        _token: Option<&str>,
    ) -> Result<(), CallError> {
        self.updates
            .lock()
            .unwrap()
            .push((order_id.to_string(), status.as_str().to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub events: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingPublisher {
    pub fn recorded(&self) -> Vec<(String, serde_json::Value)> {
        self.events.lock().unwrap().clone()
    }

    pub fn count_of(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == event_type)
            .count()
    }
}

#[async_trait::async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push((event.event_type().to_string(), event.payload()));
        Ok(())
    }
}

pub struct NullAudit;

#[async_trait::async_trait]
impl AuditLog for NullAudit {
    async fn append(&self, _entry: payments_engine::events::AuditEntry) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct CountingProvider {
    pub inner: Arc<dyn PaymentProvider>,
    pub charges: AtomicUsize,
    pub refunds: AtomicUsize,
}

impl CountingProvider {
    pub fn wrapping(inner: Arc<dyn PaymentProvider>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            charges: AtomicUsize::new(0),
            refunds: AtomicUsize::new(0),
        })
    }

    pub fn charge_calls(&self) -> usize {
        self.charges.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PaymentProvider for CountingProvider {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn charge(&self, request: ChargeRequest) -> ChargeOutcome {
        self.charges.fetch_add(1, Ordering::SeqCst);
        self.inner.charge(request).await
    }

    async fn refund(&self, request: ProviderRefundRequest) -> RefundOutcome {
        self.refunds.fetch_add(1, Ordering::SeqCst);
        self.inner.refund(request).await
    }

    fn extract_payment_reference(&self, payload: &serde_json::Value) -> Option<String> {
        self.inner.extract_payment_reference(payload)
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub orders: Arc<StubOrderClient>,
    pub publisher: Arc<RecordingPublisher>,
    pub payments: PaymentService,
    pub refunds: RefundService,
    pub webhooks: WebhookService,
}

pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

pub fn harness(provider: Arc<dyn PaymentProvider>) -> Harness {
    harness_full(provider, Vec::new(), HashMap::new(), false)
}

pub fn harness_full(
    provider: Arc<dyn PaymentProvider>,
    extra_providers: Vec<(&str, Arc<dyn PaymentProvider>)>,
    secrets: HashMap<String, String>,
    production: bool,
) -> Harness {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    let orders = Arc::new(StubOrderClient::default());
    let publisher = Arc::new(RecordingPublisher::default());

    let mut registry = ProviderRegistry::with_mock_fallback();
    registry.register("mock", provider);
    for (name, provider) in extra_providers {
        registry.register(name, provider);
    }
    let registry = Arc::new(registry);

    let notifier = PaymentNotifier {
        orders: orders.clone(),
        publisher: publisher.clone(),
    };

    let payments = PaymentService {
        payments: store.clone(),
        transactions: store.clone(),
        idempotency: store.clone(),
        orders: orders.clone(),
        providers: registry.clone(),
        notifier: notifier.clone(),
        audit: Arc::new(NullAudit),
        provider_name: "mock".to_string(),
        idempotency_ttl_hours: 24,
        amount_tolerance: Decimal::new(1, 2),
    };

    let refunds = RefundService {
        payments: store.clone(),
        refunds: store.clone(),
        providers: registry.clone(),
        notifier: notifier.clone(),
        audit: Arc::new(NullAudit),
    };

    let webhooks = WebhookService {
        payments: store.clone(),
        webhooks: store.clone(),
        providers: registry,
        notifier,
        secrets,
        production,
    };

    Harness {
        store,
        orders,
        publisher,
        payments,
        refunds,
        webhooks,
    }
}

pub fn order(id: &str, user_id: &str, total: Decimal) -> Order {
    Order {
        id: id.to_string(),
        order_number: format!("ON-{id}"),
        user_id: user_id.to_string(),
        total_amount: total,
        currency: "USD".to_string(),
        status: "confirmed".to_string(),
        payment_status: "pending".to_string(),
    }
}

pub fn create_request(order_id: &str, user_id: &str, amount: Decimal) -> CreatePaymentRequest {
    CreatePaymentRequest {
        order_id: order_id.to_string(),
        user_id: user_id.to_string(),
        amount,
        currency: None,
        payment_method_id: Some("pm_test".to_string()),
        description: None,
        metadata: None,
        idempotency_key: None,
        auth_token: None,
    }
}
