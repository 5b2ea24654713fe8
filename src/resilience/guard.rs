use crate::resilience::breaker::{BreakerDecision, CircuitBreaker};
use crate::resilience::retry::RetryPolicy;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CallFailure {
    pub transient: bool,
    pub message: String,
}

impl CallFailure {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            transient: true,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            transient: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("{collaborator}: circuit breaker open")]
    BreakerOpen { collaborator: String },

    #[error("{collaborator}: {message} (gave up after {attempts} attempts)")]
    Exhausted {
        collaborator: String,
        attempts: u32,
        message: String,
    },

    #[error("{collaborator}: {message}")]
    Rejected { collaborator: String, message: String },
}

#[derive(Clone)]
pub struct CallGuard {
    pub retry: RetryPolicy,
    pub breaker: Arc<CircuitBreaker>,
}

impl CallGuard {
    pub fn new(retry: RetryPolicy, breaker: Arc<CircuitBreaker>) -> Self {
        Self { retry, breaker }
    }

    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, CallError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CallFailure>>,
    {
        let mut last = None;
        for attempt in 1..=self.retry.max_attempts {
            if self.breaker.check(Utc::now()) == BreakerDecision::Reject {
                return Err(CallError::BreakerOpen {
                    collaborator: self.breaker.name.clone(),
                });
            }

            match op().await {
                Ok(value) => {
                    self.breaker.record(true, Utc::now());
                    return Ok(value);
                }
                Err(failure) => {
                    self.breaker.record(false, Utc::now());
                    if !failure.transient {
                        return Err(CallError::Rejected {
                            collaborator: self.breaker.name.clone(),
                            message: failure.message,
                        });
                    }
                    tracing::warn!(
                        collaborator = %self.breaker.name,
                        attempt,
                        error = %failure.message,
                        "transient collaborator failure"
                    );
                    last = Some(failure);
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    }
                }
            }
        }

        Err(CallError::Exhausted {
            collaborator: self.breaker.name.clone(),
            attempts: self.retry.max_attempts,
            message: last.map(|f| f.message).unwrap_or_else(|| "no attempts made".to_string()),
        })
    }
}
