mod common;

use common::{create_request, harness, order, CountingProvider};
use payments_engine::domain::payment::PaymentStatus;
use payments_engine::domain::transaction::{TransactionStatus, TransactionType};
use payments_engine::error::PaymentError;
use payments_engine::ports::TransactionRepo;
use payments_engine::providers::mock::MockProvider;
use rust_decimal_macros::dec;
use std::sync::Arc;

#[tokio::test]
async fn successful_charge_settles_payment_and_publishes_once() {
    let h = harness(Arc::new(MockProvider::always_succeed()));
    h.orders.insert(order("O1", "U1", dec!(100.00)));

    let payment = h.payments.create_payment(create_request("O1", "U1", dec!(100.00))).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);

    let settled = h.payments.process(payment.id).await.unwrap();
    assert_eq!(settled.status, PaymentStatus::Succeeded);
    assert!(settled.processed_at.is_some());
    assert!(settled.provider_payment_id.is_some());

    assert_eq!(h.publisher.count_of("payment.succeeded"), 1);
    assert_eq!(
        h.orders.recorded_updates(),
        vec![("O1".to_string(), "paid".to_string())]
    );

    let transactions = h.store.list_for_payment(payment.id).await.unwrap();
    let charge = transactions
        .iter()
        .find(|t| t.kind == TransactionType::Charge)
        .unwrap();
    assert_eq!(charge.status, TransactionStatus::Succeeded);
    assert!(charge.processed_at.is_some());
}

#[tokio::test]
async fn failed_charge_is_a_terminal_business_outcome() {
    let h = harness(Arc::new(MockProvider::always_fail()));
    h.orders.insert(order("O1", "U1", dec!(100.00)));

    let payment = h.payments.create_payment(create_request("O1", "U1", dec!(100.00))).await.unwrap();
    let settled = h.payments.process(payment.id).await.unwrap();

    assert_eq!(settled.status, PaymentStatus::Failed);
    assert!(settled.processed_at.is_none());
    assert_eq!(h.publisher.count_of("payment.failed"), 1);
    assert_eq!(
        h.orders.recorded_updates(),
        vec![("O1".to_string(), "failed".to_string())]
    );

    let transactions = h.store.list_for_payment(payment.id).await.unwrap();
    let charge = transactions
        .iter()
        .find(|t| t.kind == TransactionType::Charge)
        .unwrap();
    assert_eq!(charge.status, TransactionStatus::Failed);
}

#[tokio::test]
async fn processing_a_settled_payment_conflicts_without_touching_the_provider() {
    let counting = CountingProvider::wrapping(Arc::new(MockProvider::always_succeed()));
    let h = harness(counting.clone());
    h.orders.insert(order("O1", "U1", dec!(100.00)));

    let payment = h.payments.create_payment(create_request("O1", "U1", dec!(100.00))).await.unwrap();
    h.payments.process(payment.id).await.unwrap();
    assert_eq!(counting.charge_calls(), 1);

    let err = h.payments.process(payment.id).await.unwrap_err();
    assert!(matches!(err, PaymentError::Conflict(_)));
    assert_eq!(counting.charge_calls(), 1);
    assert_eq!(h.publisher.count_of("payment.succeeded"), 1);
}

#[tokio::test]
async fn processing_unknown_payment_is_not_found() {
    let h = harness(Arc::new(MockProvider::always_succeed()));

    let err = h.payments.process(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, PaymentError::NotFound(_)));
}

#[tokio::test]
async fn pending_charge_leaves_payment_processing() {
    let h = harness(Arc::new(MockProvider::always_pending()));
    h.orders.insert(order("O1", "U1", dec!(100.00)));

    let payment = h.payments.create_payment(create_request("O1", "U1", dec!(100.00))).await.unwrap();
    let in_flight = h.payments.process(payment.id).await.unwrap();

    assert_eq!(in_flight.status, PaymentStatus::Processing);
    assert!(in_flight.provider_payment_id.is_some());
    assert!(h.publisher.recorded().is_empty());

    let transactions = h.store.list_for_payment(payment.id).await.unwrap();
    let charge = transactions
        .iter()
        .find(|t| t.kind == TransactionType::Charge)
        .unwrap();
    assert_eq!(charge.status, TransactionStatus::Pending);
}

#[tokio::test]
async fn cancel_is_allowed_only_while_in_flight() {
    let h = harness(Arc::new(MockProvider::always_succeed()));
    h.orders.insert(order("O1", "U1", dec!(100.00)));

    let payment = h.payments.create_payment(create_request("O1", "U1", dec!(100.00))).await.unwrap();
    let cancelled = h.payments.cancel(payment.id, Some("order cancelled")).await.unwrap();
    assert_eq!(cancelled.status, PaymentStatus::Cancelled);

    h.orders.insert(order("O2", "U1", dec!(50.00)));
    let other = h.payments.create_payment(create_request("O2", "U1", dec!(50.00))).await.unwrap();
    h.payments.process(other.id).await.unwrap();
    let err = h.payments.cancel(other.id, None).await.unwrap_err();
    assert!(matches!(err, PaymentError::Conflict(_)));
}

#[tokio::test]
async fn cancelled_payment_cannot_be_processed() {
    let h = harness(Arc::new(MockProvider::always_succeed()));
    h.orders.insert(order("O1", "U1", dec!(100.00)));

    let payment = h.payments.create_payment(create_request("O1", "U1", dec!(100.00))).await.unwrap();
    h.payments.cancel(payment.id, None).await.unwrap();

    let err = h.payments.process(payment.id).await.unwrap_err();
    assert!(matches!(err, PaymentError::Conflict(_)));
}
