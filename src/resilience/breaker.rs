use chrono::{DateTime, Utc};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout_secs: i64,
    pub success_threshold: u32,
}

#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl BreakerSnapshot {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: None,
            cooldown_until: None,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakerDecision {
    Allow,
    Trial,
    Reject,
}

pub fn pre_call_decision(snapshot: &BreakerSnapshot, now: DateTime<Utc>) -> BreakerDecision {
    match snapshot.state {
        CircuitState::Closed => BreakerDecision::Allow,
        CircuitState::Open => {
            if snapshot.cooldown_until.is_some_and(|t| now >= t) {
                BreakerDecision::Trial
            } else {
                BreakerDecision::Reject
            }
        }
        CircuitState::HalfOpen => BreakerDecision::Trial,
    }
}

pub fn apply_result(
    mut snapshot: BreakerSnapshot,
    config: &BreakerConfig,
    success: bool,
    now: DateTime<Utc>,
) -> BreakerSnapshot {
    if success {
        snapshot.consecutive_failures = 0;
        snapshot.consecutive_successes += 1;
    } else {
        snapshot.consecutive_failures += 1;
        snapshot.consecutive_successes = 0;
    }

    match snapshot.state {
        CircuitState::Closed => {
            if snapshot.consecutive_failures >= config.failure_threshold {
                snapshot.state = CircuitState::Open;
                snapshot.opened_at = Some(now);
                snapshot.cooldown_until = Some(now + chrono::Duration::seconds(config.reset_timeout_secs));
                snapshot.consecutive_successes = 0;
            }
        }
        CircuitState::Open | CircuitState::HalfOpen => {
            if !success {
                snapshot.state = CircuitState::Open;
                snapshot.opened_at = Some(now);
                snapshot.cooldown_until = Some(now + chrono::Duration::seconds(config.reset_timeout_secs));
                snapshot.consecutive_successes = 0;
            } else if snapshot.consecutive_successes >= config.success_threshold {
                snapshot.state = CircuitState::Closed;
                snapshot.opened_at = None;
                snapshot.cooldown_until = None;
                snapshot.consecutive_failures = 0;
                snapshot.consecutive_successes = 0;
            } else {
                snapshot.state = CircuitState::HalfOpen;
            }
        }
    }

    snapshot.updated_at = now;
    snapshot
}

pub struct CircuitBreaker {
    pub name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerSnapshot>,
}

impl CircuitBreaker {
    pub fn new(name: &str, config: BreakerConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            inner: Mutex::new(BreakerSnapshot::new(Utc::now())),
        }
    }

    pub fn check(&self, now: DateTime<Utc>) -> BreakerDecision {
        let mut snapshot = self.inner.lock().expect("breaker lock poisoned");
        let decision = pre_call_decision(&snapshot, now);
        if decision == BreakerDecision::Trial && snapshot.state == CircuitState::Open {
            snapshot.state = CircuitState::HalfOpen;
            snapshot.consecutive_successes = 0;
            snapshot.updated_at = now;
        }
        decision
    }

    pub fn record(&self, success: bool, now: DateTime<Utc>) {
        let mut snapshot = self.inner.lock().expect("breaker lock poisoned");
        *snapshot = apply_result(snapshot.clone(), &self.config, success, now);
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("breaker lock poisoned").state
    }
}
