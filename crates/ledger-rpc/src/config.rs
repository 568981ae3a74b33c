use std::time::Duration;

use ledger_ix::{Commitment, PollPolicy};

pub const DEVNET_URL: &str = "https://api.devnet.solana.com";

/// Connection settings for [`crate::RpcLedgerClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcConfig {
    pub endpoint: String,
    /// Commitment used for reads and preflight.
    pub commitment: Commitment,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Budget for waiting on a sent transaction.
    pub confirm: PollPolicy,
}

impl RpcConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn with_commitment(mut self, commitment: Commitment) -> Self {
        self.commitment = commitment;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_confirm_policy(mut self, confirm: PollPolicy) -> Self {
        self.confirm = confirm;
        self
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: DEVNET_URL.to_string(),
            commitment: Commitment::Confirmed,
            timeout: Duration::from_secs(30),
            confirm: PollPolicy::new(60, Duration::from_millis(500)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_devnet() {
        let config = RpcConfig::default();
        assert_eq!(config.endpoint, DEVNET_URL);
        assert_eq!(config.commitment, Commitment::Confirmed);
        assert_eq!(config.confirm.max_attempts, 60);
    }

    #[test]
    fn builders_override_fields() {
        let config = RpcConfig::new("http://127.0.0.1:8899")
            .with_commitment(Commitment::Finalized)
            .with_timeout(Duration::from_secs(5))
            .with_confirm_policy(PollPolicy::new(3, Duration::ZERO));

        assert_eq!(config.endpoint, "http://127.0.0.1:8899");
        assert_eq!(config.commitment, Commitment::Finalized);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.confirm.max_attempts, 3);
    }
}
