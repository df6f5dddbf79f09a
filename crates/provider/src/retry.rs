//! Retry decorator for transient backend failures

use crate::*;
use std::time::Duration;
use tracing::warn;

const BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_DELAY: Duration = Duration::from_secs(8);

/// Wraps a provider and retries `Transient` errors with exponential backoff
pub struct RetryingProvider<P> {
    inner: P,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl<P: Provider> RetryingProvider<P> {
    pub fn new(inner: P, max_attempts: u32) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay: BASE_DELAY,
            max_delay: MAX_DELAY,
        }
    }

    pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = cap;
        self
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: Provider> Provider for RetryingProvider<P> {
    async fn send(&self, request: TurnRequest) -> Result<ModelResponse> {
        let mut attempt = 1;
        loop {
            match self.inner.send(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() => {
                    if attempt >= self.max_attempts {
                        return Err(ProviderError::RetriesExhausted {
                            attempts: attempt,
                            last: err.to_string(),
                        });
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        provider = %self.inner.id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient provider error, retrying: {}",
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn id(&self) -> String {
        self.inner.id()
    }
}
