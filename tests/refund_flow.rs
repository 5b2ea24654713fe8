mod common;

use common::{create_request, harness, order, Harness};
use payments_engine::domain::payment::{Payment, PaymentStatus};
use payments_engine::domain::refund::RefundStatus;
use payments_engine::domain::transaction::{TransactionStatus, TransactionType};
use payments_engine::error::PaymentError;
use payments_engine::ports::{RefundRepo, TransactionRepo};
use payments_engine::providers::mock::MockProvider;
use payments_engine::service::refund_service::RefundRequest;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

async fn settled_payment(h: &Harness, order_id: &str, amount: Decimal) -> Payment {
    h.orders.insert(order(order_id, "U1", amount));
    let payment = h.payments.create_payment(create_request(order_id, "U1", amount)).await.unwrap();
    h.payments.process(payment.id).await.unwrap()
}

fn refund_request(payment_id: Uuid, amount: Option<Decimal>) -> RefundRequest {
    RefundRequest {
        payment_id,
        amount,
        reason: Some("customer request".to_string()),
        metadata: None,
    }
}

#[tokio::test]
async fn partial_refunds_cannot_exceed_the_payment_amount() {
    let h = harness(Arc::new(MockProvider::always_succeed()));
    let payment = settled_payment(&h, "O1", dec!(100.00)).await;

    let first = h.refunds.refund(refund_request(payment.id, Some(dec!(40.00)))).await.unwrap();
    assert_eq!(first.status, RefundStatus::Completed);

    let err = h.refunds.refund(refund_request(payment.id, Some(dec!(70.00)))).await.unwrap_err();
    assert!(matches!(err, PaymentError::Conflict(_)));

    let payment = h.payments.get(payment.id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Succeeded);
    assert_eq!(h.store.completed_total(payment.id).await.unwrap(), dec!(40.00));
}

#[tokio::test]
async fn full_refund_flips_payment_to_refunded_and_notifies() {
    let h = harness(Arc::new(MockProvider::always_succeed()));
    let payment = settled_payment(&h, "O1", dec!(100.00)).await;

    let refund = h.refunds.refund(refund_request(payment.id, None)).await.unwrap();
    assert_eq!(refund.status, RefundStatus::Completed);
    assert_eq!(refund.amount, dec!(100.00));
    assert!(refund.provider_refund_id.is_some());

    let payment = h.payments.get(payment.id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert_eq!(h.publisher.count_of("payment.refunded"), 1);
    assert!(h
        .orders
        .recorded_updates()
        .contains(&("O1".to_string(), "refunded".to_string())));
}

#[tokio::test]
async fn partial_then_remainder_completes_the_refund() {
    let h = harness(Arc::new(MockProvider::always_succeed()));
    let payment = settled_payment(&h, "O1", dec!(100.00)).await;

    h.refunds.refund(refund_request(payment.id, Some(dec!(40.00)))).await.unwrap();
    let payment_mid = h.payments.get(payment.id).await.unwrap();
    assert_eq!(payment_mid.status, PaymentStatus::Succeeded);
    assert_eq!(h.publisher.count_of("payment.refunded"), 0);

    h.refunds.refund(refund_request(payment.id, Some(dec!(60.00)))).await.unwrap();
    let payment_after = h.payments.get(payment.id).await.unwrap();
    assert_eq!(payment_after.status, PaymentStatus::Refunded);
    assert_eq!(h.publisher.count_of("payment.refunded"), 1);
}

#[tokio::test]
async fn refund_records_a_refund_transaction() {
    let h = harness(Arc::new(MockProvider::always_succeed()));
    let payment = settled_payment(&h, "O1", dec!(100.00)).await;

    h.refunds.refund(refund_request(payment.id, Some(dec!(25.00)))).await.unwrap();

    let transactions = h.store.list_for_payment(payment.id).await.unwrap();
    let refund_tx = transactions
        .iter()
        .find(|t| t.kind == TransactionType::Refund)
        .unwrap();
    assert_eq!(refund_tx.status, TransactionStatus::Succeeded);
    assert_eq!(refund_tx.amount, dec!(25.00));
    assert_eq!(refund_tx.currency, "USD");
}

#[tokio::test]
async fn unsettled_payment_cannot_be_refunded() {
    let h = harness(Arc::new(MockProvider::always_succeed()));
    h.orders.insert(order("O1", "U1", dec!(100.00)));
    let payment = h.payments.create_payment(create_request("O1", "U1", dec!(100.00))).await.unwrap();

    let err = h.refunds.refund(refund_request(payment.id, None)).await.unwrap_err();
    assert!(matches!(err, PaymentError::Conflict(_)));
}

#[tokio::test]
async fn refund_above_payment_amount_is_invalid() {
    let h = harness(Arc::new(MockProvider::always_succeed()));
    let payment = settled_payment(&h, "O1", dec!(100.00)).await;

    let err = h.refunds.refund(refund_request(payment.id, Some(dec!(150.00)))).await.unwrap_err();
    assert!(matches!(err, PaymentError::Validation(_)));
}

#[tokio::test]
async fn failed_provider_refund_releases_the_balance() {
    let h = harness(Arc::new(MockProvider::always_succeed()));
    let payment = settled_payment(&h, "O1", dec!(100.00)).await;

    // swap in a declining provider for the refund call
    let declining = harness(Arc::new(MockProvider::always_fail()));
    let refunds = payments_engine::service::refund_service::RefundService {
        payments: h.store.clone(),
        refunds: h.store.clone(),
        providers: declining.refunds.providers.clone(),
        notifier: h.refunds.notifier.clone(),
        audit: h.refunds.audit.clone(),
    };

    let refund = refunds.refund(refund_request(payment.id, Some(dec!(30.00)))).await.unwrap();
    assert_eq!(refund.status, RefundStatus::Failed);

    let payment = h.payments.get(payment.id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Succeeded);
    assert_eq!(h.store.completed_total(payment.id).await.unwrap(), dec!(0.00));

    // the failed attempt no longer reserves balance, a full refund still goes through
    let refund = h.refunds.refund(refund_request(payment.id, None)).await.unwrap();
    assert_eq!(refund.status, RefundStatus::Completed);
    assert_eq!(refund.amount, dec!(100.00));
}

#[tokio::test]
async fn refunding_a_missing_payment_is_not_found() {
    let h = harness(Arc::new(MockProvider::always_succeed()));

    let err = h.refunds.refund(refund_request(Uuid::new_v4(), None)).await.unwrap_err();
    assert!(matches!(err, PaymentError::NotFound(_)));
}
