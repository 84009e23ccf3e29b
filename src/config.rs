//! Pool configuration.

use crate::error::PoolError;
use std::time::Duration;

/// Configuration for a [`PoolManager`](crate::PoolManager).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of simultaneously active lightweight resources across
    /// the whole pool. This is also the allocation cap of a single heavy
    /// resource: once a heavy resource has produced this many lightweight
    /// resources it is exhausted and will be retired when idle.
    pub concurrency: usize,

    /// Deadline for acquire requests. A request still queued when the
    /// deadline fires is removed and fails with
    /// [`PoolError::AcquireTimeout`](crate::PoolError::AcquireTimeout).
    pub acquire_timeout: Duration,

    /// Delay before the reconciliation loop retries after a failed pass.
    pub retry_backoff: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            acquire_timeout: Duration::from_secs(30),
            retry_backoff: Duration::from_secs(1),
        }
    }
}

impl PoolConfig {
    /// Validate the configuration.
    ///
    /// A concurrency ceiling below 1 can never satisfy any request, so it is
    /// rejected at construction rather than left to dead-lock acquires.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.concurrency < 1 {
            return Err(PoolError::Config(format!(
                "concurrency must be at least 1, got {}",
                self.concurrency
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PoolConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = PoolConfig {
            concurrency: 0,
            ..PoolConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PoolError::Config(_)));
    }
}
