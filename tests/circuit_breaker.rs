use payments_engine::resilience::breaker::{BreakerConfig, CircuitBreaker, CircuitState};
use payments_engine::resilience::guard::{CallError, CallFailure, CallGuard};
use payments_engine::resilience::retry::RetryPolicy;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay_ms: 1,
        exponential: false,
    }
}

fn breaker(failure_threshold: u32, reset_timeout_secs: i64) -> Arc<CircuitBreaker> {
    Arc::new(CircuitBreaker::new(
        "order-service",
        BreakerConfig {
            failure_threshold,
            reset_timeout_secs,
            success_threshold: 1,
        },
    ))
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let guard = CallGuard::new(policy(3), breaker(10, 60));
    let calls = AtomicUsize::new(0);

    let result: Result<&str, CallError> = guard
        .run(|| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(CallFailure::transient("connection reset"))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_budget_is_bounded() {
    let guard = CallGuard::new(policy(3), breaker(10, 60));
    let calls = AtomicUsize::new(0);

    let result: Result<(), CallError> = guard
        .run(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CallFailure::transient("timeout")) }
        })
        .await;

    assert!(matches!(result, Err(CallError::Exhausted { attempts: 3, .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn permanent_failures_are_not_retried() {
    let guard = CallGuard::new(policy(3), breaker(10, 60));
    let calls = AtomicUsize::new(0);

    let result: Result<(), CallError> = guard
        .run(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CallFailure::permanent("401 unauthorized")) }
        })
        .await;

    assert!(matches!(result, Err(CallError::Rejected { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn open_breaker_fails_fast_without_calling_out() {
    let breaker = breaker(3, 60);
    let guard = CallGuard::new(policy(1), breaker.clone());

    for _ in 0..3 {
        let _: Result<(), CallError> = guard
            .run(|| async { Err(CallFailure::transient("503")) })
            .await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let calls = AtomicUsize::new(0);
    let result: Result<(), CallError> = guard
        .run(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;

    assert!(matches!(result, Err(CallError::BreakerOpen { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn breaker_open_does_not_consume_the_retry_budget() {
    let breaker = breaker(1, 60);
    let guard = CallGuard::new(policy(5), breaker.clone());

    let _: Result<(), CallError> = guard
        .run(|| async { Err(CallFailure::permanent("boom")) })
        .await;
    assert_eq!(breaker.state(), CircuitState::Open);

    let calls = AtomicUsize::new(0);
    let result: Result<(), CallError> = guard
        .run(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;

    assert!(matches!(result, Err(CallError::BreakerOpen { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn elapsed_cooldown_admits_a_trial_call_and_recloses() {
    let breaker = breaker(1, 0);
    let guard = CallGuard::new(policy(1), breaker.clone());

    let _: Result<(), CallError> = guard
        .run(|| async { Err(CallFailure::transient("503")) })
        .await;
    assert_eq!(breaker.state(), CircuitState::Open);

    // reset timeout of zero has already elapsed, the next call is the trial
    let result: Result<&str, CallError> = guard.run(|| async { Ok("recovered") }).await;
    assert_eq!(result.unwrap(), "recovered");
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn failed_trial_reopens_the_breaker() {
    let breaker = breaker(1, 0);
    let guard = CallGuard::new(policy(1), breaker.clone());

    let _: Result<(), CallError> = guard
        .run(|| async { Err(CallFailure::transient("503")) })
        .await;
    let _: Result<(), CallError> = guard
        .run(|| async { Err(CallFailure::transient("503 again")) })
        .await;

    assert_eq!(breaker.state(), CircuitState::Open);
}
