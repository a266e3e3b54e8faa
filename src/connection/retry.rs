//! Bounded retry with exponential backoff.
//!
//! ```text
//! Attempting(n) --ok--------------------------> Succeeded
//! Attempting(n) --transient, n < max----------> BackingOff(n, delay) --sleep--> Attempting(n + 1)
//! Attempting(n) --permanent, or n == max------> Failed (last error)
//! ```
//!
//! Attempts after the first check the connection with `ping()` and `reconnect()` before
//! running the unit of work again. The unit of work may run more than once, so it has to be
//! idempotent.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use super::driver::GraphDriver;
use super::errors::ExecutionError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Scale each delay by a random factor in `[0.5, 1.5]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryState {
    Attempting { attempt: u32 },
    BackingOff { attempt: u32, delay: Duration },
    Failed { attempts: u32 },
}

impl RetryState {
    /// State entered once the backoff sleep is over.
    pub fn resume(self) -> RetryState {
        match self {
            RetryState::BackingOff { attempt, .. } => RetryState::Attempting {
                attempt: attempt + 1,
            },
            other => other,
        }
    }
}

impl RetryPolicy {
    /// Policy that runs the unit of work exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before the attempt following failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let mut secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);

        if self.jitter {
            let factor: f64 = rand::rng().random_range(0.5..=1.5);
            secs *= factor;
        }

        let cap = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= cap {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Next state after attempt `attempt` failed.
    pub fn transition(&self, attempt: u32, retryable: bool) -> RetryState {
        if retryable && attempt < self.max_attempts {
            RetryState::BackingOff {
                attempt,
                delay: self.delay_for(attempt),
            }
        } else {
            RetryState::Failed { attempts: attempt }
        }
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `operation` receives the 1-based attempt number. The error of the last attempt is
    /// returned on exhaustion.
    pub async fn run<T, F, Fut>(
        &self,
        driver: &dyn GraphDriver,
        mut operation: F,
    ) -> Result<T, ExecutionError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ExecutionError>>,
    {
        let mut attempt = 1;

        loop {
            let outcome = if attempt > 1 {
                match ensure_connected(driver).await {
                    Ok(()) => operation(attempt).await,
                    Err(err) => Err(err),
                }
            } else {
                operation(attempt).await
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !self.backoff(attempt, &error).await {
                        return Err(error.with_attempts(attempt));
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Decide what follows failed attempt `attempt`. Sleeps and returns `true` when another
    /// attempt should run.
    pub(crate) async fn backoff(&self, attempt: u32, error: &ExecutionError) -> bool {
        match self.transition(attempt, error.is_retryable()) {
            RetryState::BackingOff { delay, .. } => {
                log::warn!(
                    "Attempt {}/{} failed: {}; retrying in {:?}",
                    attempt,
                    self.max_attempts,
                    error,
                    delay
                );
                tokio::time::sleep(delay).await;
                true
            }
            _ => {
                if error.is_retryable() {
                    log::warn!("Giving up after {} attempt(s): {}", attempt, error);
                }
                false
            }
        }
    }
}

/// Ping, and reconnect when the connection is stale.
pub(crate) async fn ensure_connected(driver: &dyn GraphDriver) -> Result<(), ExecutionError> {
    if driver.ping().await {
        return Ok(());
    }

    let endpoint = driver.endpoint();
    log::info!("Connection to {} is stale, reconnecting", endpoint);
    driver
        .reconnect()
        .await
        .map_err(|source| ExecutionError::Connection {
            host: endpoint.host.clone(),
            port: endpoint.port,
            source,
            diagnostics: None,
        })
}
