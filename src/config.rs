use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Runtime configuration, sourced from the environment with safe defaults.
#[derive(Debug, Clone)]
pub struct RenewalConfig {
    /// Delay before a declined payment is retried.
    pub retry_interval: Duration,
    /// Hard timeout for a single gateway round-trip.
    pub gateway_timeout: Duration,
    /// Number of concurrent start-renewal consumers. Tune to the gateway's
    /// rate limit times the number of running instances.
    pub consumer_concurrency: usize,
    /// Maximum rows claimed per enqueue trigger.
    pub claim_batch_size: usize,
    /// Pacing for redeliveries caused by transient gateway failures.
    pub redelivery_backoff: RedeliveryBackoff,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(10),
            gateway_timeout: Duration::from_secs(10),
            consumer_concurrency: 8,
            claim_batch_size: 100,
            redelivery_backoff: RedeliveryBackoff::default(),
        }
    }
}

impl RenewalConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            retry_interval: Duration::from_secs(env_u64(
                "SUBRENEW_RETRY_INTERVAL_SECS",
                defaults.retry_interval.as_secs(),
            )),
            gateway_timeout: Duration::from_secs(env_u64(
                "SUBRENEW_GATEWAY_TIMEOUT_SECS",
                defaults.gateway_timeout.as_secs(),
            )),
            consumer_concurrency: env_u64(
                "SUBRENEW_CONSUMER_CONCURRENCY",
                defaults.consumer_concurrency as u64,
            ) as usize,
            claim_batch_size: env_u64(
                "SUBRENEW_CLAIM_BATCH_SIZE",
                defaults.claim_batch_size as u64,
            ) as usize,
            redelivery_backoff: RedeliveryBackoff::default(),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

/// Exponential, capped delay schedule applied when a transient gateway
/// failure forces a message back onto the queue. The cap keeps a flapping
/// gateway from producing thundering-herd redelivery.
#[derive(Debug, Clone)]
pub struct RedeliveryBackoff {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RedeliveryBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl RedeliveryBackoff {
    /// Delay before the given redelivery attempt, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let millis =
            self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt.min(30) as i32);
        Duration::from_millis(millis as u64).min(self.max_delay)
    }
}

/// Installs the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Call once, from the binary.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("subrenew=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
