use std::time::Duration;

/// Tunables for the payment-timeout sweep.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    interval: Duration,
    payment_timeout: Duration,
}

impl SweepConfig {
    pub fn new(interval: Duration, payment_timeout: Duration) -> Self {
        Self {
            interval,
            payment_timeout,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn payment_timeout(&self) -> Duration {
        self.payment_timeout
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            payment_timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Tunables for mirror synchronization.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    reconnect_delay: Duration,
}

impl SyncConfig {
    pub fn new(reconnect_delay: Duration) -> Self {
        Self { reconnect_delay }
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
        }
    }
}
