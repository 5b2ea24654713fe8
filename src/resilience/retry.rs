use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub exponential: bool,
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.exponential {
            let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
            Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
        } else {
            Duration::from_millis(self.base_delay_ms)
        }
    }
}
