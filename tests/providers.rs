use payments_engine::config::{PaypalConfig, StripeConfig};
use payments_engine::providers::mock::MockProvider;
use payments_engine::providers::paypal::PaypalProvider;
use payments_engine::providers::stripe::StripeProvider;
use payments_engine::providers::{ChargeRequest, PaymentProvider, ProviderChargeStatus, ProviderRegistry};
use rust_decimal_macros::dec;
use serde_json::json;

fn charge_request() -> ChargeRequest {
    ChargeRequest {
        amount: dec!(25.00),
        currency: "USD".to_string(),
        payment_method_id: Some("pm_test".to_string()),
        metadata: json!({}),
        reference: "ref-1".to_string(),
    }
}

#[tokio::test]
async fn seeded_mock_is_deterministic() {
    let a = MockProvider::seeded(0.5, 42);
    let b = MockProvider::seeded(0.5, 42);

    for _ in 0..20 {
        let left = a.charge(charge_request()).await;
        let right = b.charge(charge_request()).await;
        assert_eq!(left.status, right.status);
    }
}

#[tokio::test]
async fn mock_failure_rate_is_roughly_honored() {
    let provider = MockProvider::seeded(0.1, 7);
    let mut failures = 0;
    for _ in 0..200 {
        if provider.charge(charge_request()).await.status == ProviderChargeStatus::Failed {
            failures += 1;
        }
    }
    assert!((5..=50).contains(&failures), "unexpected failure count {failures}");
}

#[tokio::test]
async fn forced_modes_override_the_dice() {
    let succeed = MockProvider::always_succeed();
    let outcome = succeed.charge(charge_request()).await;
    assert_eq!(outcome.status, ProviderChargeStatus::Succeeded);
    assert!(outcome.provider_payment_id.is_some());

    let fail = MockProvider::always_fail();
    let outcome = fail.charge(charge_request()).await;
    assert_eq!(outcome.status, ProviderChargeStatus::Failed);
    assert!(outcome.error.is_some());
}

#[test]
fn unknown_provider_falls_back_to_mock() {
    let registry = ProviderRegistry::with_mock_fallback();
    let provider = registry.resolve("definitely-not-registered");
    assert_eq!(provider.name(), "mock");
}

#[test]
fn unconfigured_stripe_adapter_is_a_construction_error() {
    let result = StripeProvider::from_config(&StripeConfig {
        base_url: "https://api.stripe.com".to_string(),
        secret_key: String::new(),
        webhook_secret: None,
        timeout_ms: 1000,
    });
    assert!(result.is_err());
}

#[test]
fn unconfigured_paypal_adapter_is_a_construction_error() {
    let result = PaypalProvider::from_config(&PaypalConfig {
        base_url: "https://api-m.paypal.com".to_string(),
        client_id: String::new(),
        client_secret: String::new(),
        webhook_secret: None,
        timeout_ms: 1000,
    });
    assert!(result.is_err());
}

#[test]
fn paypal_verifies_the_reserialized_payload() {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let provider = PaypalProvider::from_config(&PaypalConfig {
        base_url: "https://paypal.invalid".to_string(),
        client_id: "cid".to_string(),
        client_secret: "csecret".to_string(),
        webhook_secret: Some("whsec".to_string()),
        timeout_ms: 1000,
    })
    .unwrap();

    let payload = json!({ "resource": { "id": "cap_1" }, "event_type": "payment.succeeded" });
    let canonical = serde_json::to_vec(&payload).unwrap();
    let mut mac = Hmac::<Sha256>::new_from_slice(b"whsec").unwrap();
    mac.update(&canonical);
    let signature = hex::encode(mac.finalize().into_bytes());

    let verification = provider
        .verify_webhook(&payload, None, &signature, "whsec")
        .unwrap();
    assert!(verification.valid);

    let verification = provider
        .verify_webhook(&payload, None, &signature, "other-secret")
        .unwrap();
    assert!(!verification.valid);
}

#[test]
fn stripe_requires_the_raw_body_for_verification() {
    let provider = StripeProvider::from_config(&StripeConfig {
        base_url: "https://stripe.invalid".to_string(),
        secret_key: "sk_test_x".to_string(),
        webhook_secret: Some("whsec".to_string()),
        timeout_ms: 1000,
    })
    .unwrap();

    let verification = provider
        .verify_webhook(&json!({}), None, "t=1,v1=00", "whsec")
        .unwrap();
    assert!(!verification.valid);
    assert!(verification.error.is_some());
}

#[test]
fn payment_reference_extraction_is_provider_specific() {
    let mock = MockProvider::always_succeed();
    assert_eq!(
        mock.extract_payment_reference(&json!({ "provider_payment_id": "mock_pay_1" })),
        Some("mock_pay_1".to_string())
    );

    let stripe = StripeProvider::from_config(&StripeConfig {
        base_url: "https://stripe.invalid".to_string(),
        secret_key: "sk_test_x".to_string(),
        webhook_secret: None,
        timeout_ms: 1000,
    })
    .unwrap();
    assert_eq!(
        stripe.extract_payment_reference(&json!({ "data": { "object": { "payment_intent": "pi_1" } } })),
        Some("pi_1".to_string())
    );

    let paypal = PaypalProvider::from_config(&PaypalConfig {
        base_url: "https://paypal.invalid".to_string(),
        client_id: "cid".to_string(),
        client_secret: "csecret".to_string(),
        webhook_secret: None,
        timeout_ms: 1000,
    })
    .unwrap();
    assert_eq!(
        paypal.extract_payment_reference(&json!({ "resource": { "id": "cap_1" } })),
        Some("cap_1".to_string())
    );
}
